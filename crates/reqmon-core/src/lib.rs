//! # reqmon
//!
//! Request monitoring for web applications.
//!
//! reqmon times the requests of an application into named counters and
//! renders per-counter statistics as HTML report fragments.
//!
//! ## Architecture
//!
//! - **Collector**: Counters and request contexts recording one sample per request
//! - **Interceptor**: Timing of page includes and forwards into the `jsp` counter
//! - **Report**: HTML rendering of a counter over a period
//! - **API**: Monitoring endpoint and HTTP request middleware
//!
//! ## Quick Start
//!
//! ```bash
//! # Start the monitored server
//! reqmon serve
//!
//! # Print the effective configuration
//! reqmon config
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod models;
pub mod report;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::collector::{Counter, MonitoringRegistry, RequestContext};
    pub use crate::config::{Config, MonitoringConfig};
    pub use crate::error::{Error, Result};
    pub use crate::interceptor::{DispatchInterceptor, HostRequest, RequestDispatcher};
    pub use crate::models::*;
    pub use crate::report::HtmlCounterReport;
}

//! Data models for reqmon

mod aggregation;
mod counter_error;
mod range;
mod request;

pub use aggregation::*;
pub use counter_error::*;
pub use range::*;
pub use request::*;

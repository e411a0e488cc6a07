//! Dispatch interception
//!
//! Hosts expose request dispatching (include/forward to another request
//! processing unit) through [`HostRequest`] and [`RequestDispatcher`]. The
//! [`DispatchInterceptor`] wraps a host request so that every dispatch is timed
//! and recorded into the `jsp` counter.

mod jsp;

pub use jsp::{MonitoredDispatcher, MonitoredRequest, TimedDispatcher, WrapperKind};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::collector::Counter;
use crate::config::MonitoringConfig;

/// Oldest dispatch API version that can be wrapped
pub const MIN_DISPATCH_API_VERSION: u32 = 2;

/// First dispatch API version supporting asynchronous dispatch
pub const ASYNC_DISPATCH_API_VERSION: u32 = 3;

/// The dispatch operations that get timed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOperation {
    /// Include the target's output in the current response
    Include,
    /// Hand the request over to the target
    Forward,
}

/// Classification of dispatch failures.
///
/// Only system errors (unrecoverable host or runtime failures) are flagged in
/// the statistics; application failures count as ordinary hits. Which failures
/// are unrecoverable is decided by each host.
pub trait DispatchFailure {
    /// Whether this failure is an unrecoverable host-level error
    fn is_system_error(&self) -> bool;
}

/// Failure of a dispatch, for hosts without their own error type
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Unrecoverable host or runtime failure
    #[error("System error: {0}")]
    System(String),

    /// Ordinary application failure
    #[error("{0}")]
    Functional(String),
}

impl DispatchFailure for DispatchError {
    fn is_system_error(&self) -> bool {
        matches!(self, Self::System(_))
    }
}

/// A dispatch target obtained from a host request
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    /// Request/response pair handed to the target
    type Exchange: Send;

    /// Failure returned by the target
    type Error: DispatchFailure + Send;

    /// Include the target's output
    async fn include(&self, exchange: &mut Self::Exchange) -> Result<(), Self::Error>;

    /// Forward the request to the target
    async fn forward(&self, exchange: &mut Self::Exchange) -> Result<(), Self::Error>;
}

/// A host request able to look up dispatch targets by path
pub trait HostRequest: Send + Sync {
    /// Dispatch target type
    type Dispatcher: RequestDispatcher;

    /// Dispatch target for a path (which may carry a query string)
    fn request_dispatcher(&self, path: &str) -> Option<Self::Dispatcher>;

    /// Version of the host's dispatch API
    fn dispatch_api_version(&self) -> u32;

    /// Put the request into asynchronous processing and return the request
    /// the async context dispatches through. None when the host does not
    /// support it.
    fn start_async(&self) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }
}

/// Decides once per monitoring session whether requests get wrapped
#[derive(Debug, Clone)]
pub struct DispatchInterceptor {
    counter: Arc<Counter>,
    enabled: bool,
}

impl DispatchInterceptor {
    /// Create an interceptor recording into `jsp_counter`
    pub fn new(config: &MonitoringConfig, jsp_counter: Arc<Counter>) -> Self {
        let hidden = config.is_counter_hidden(jsp_counter.name());
        let enabled = !config.disabled && !hidden;
        debug!(
            counter = %jsp_counter.name(),
            enabled,
            "Dispatch interceptor configured"
        );
        Self {
            counter: jsp_counter,
            enabled,
        }
    }

    /// Whether requests get wrapped at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Counter receiving the dispatch samples
    pub fn counter(&self) -> &Arc<Counter> {
        &self.counter
    }

    /// Wrap a host request, or hand it back unwrapped when monitoring is off
    /// or the host's dispatch API is too old
    pub fn wrap<R: HostRequest>(&self, request: R) -> MonitoredRequest<R> {
        if !self.enabled {
            return MonitoredRequest::Unwrapped(request);
        }

        let version = request.dispatch_api_version();
        let kind = if version >= ASYNC_DISPATCH_API_VERSION {
            WrapperKind::AsyncAware
        } else if version >= MIN_DISPATCH_API_VERSION {
            WrapperKind::Basic
        } else {
            debug!(version, "Dispatch API too old, request left unwrapped");
            return MonitoredRequest::Unwrapped(request);
        };

        MonitoredRequest::Wrapped {
            inner: request,
            counter: Arc::clone(&self.counter),
            kind,
        }
    }
}

//! Timing decorators for page includes and forwards

use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;

use super::{DispatchFailure, DispatchOperation, HostRequest, RequestDispatcher};
use crate::collector::Counter;

/// Variant of the request wrapper, chosen from the host's dispatch API version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    /// Synchronous dispatch only; an async context started from the wrapper
    /// gets the unwrapped host request
    Basic,
    /// Host supports asynchronous dispatch; async contexts started from the
    /// wrapper keep dispatching through it
    AsyncAware,
}

/// Dispatcher decorator timing include/forward into a counter.
///
/// Every other operation of the wrapped dispatcher is reachable through
/// `Deref`.
#[derive(Debug)]
pub struct TimedDispatcher<D> {
    path: String,
    inner: D,
    counter: Arc<Counter>,
}

impl<D> TimedDispatcher<D> {
    /// Wrap `inner`, the dispatcher of `path`; marks the counter as used and
    /// displayed
    pub fn new(path: impl Into<String>, inner: D, counter: Arc<Counter>) -> Self {
        counter.set_displayed(true);
        counter.set_used(true);
        Self {
            path: path.into(),
            inner,
            counter,
        }
    }

    /// Dispatch path as requested, query string included
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name samples are recorded under: the path without its query string
    pub fn request_name(&self) -> &str {
        self.path
            .split_once('?')
            .map_or(self.path.as_str(), |(path, _)| path)
    }

    /// The wrapped dispatcher
    pub fn get_ref(&self) -> &D {
        &self.inner
    }

    /// Unwrap the dispatcher
    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: RequestDispatcher> TimedDispatcher<D> {
    async fn dispatch(
        &self,
        operation: DispatchOperation,
        exchange: &mut D::Exchange,
    ) -> Result<(), D::Error> {
        // records on drop as well, so a cancelled dispatch still counts
        let mut context = self.counter.bind_context_including_cpu(self.request_name());

        let call = match operation {
            DispatchOperation::Include => self.inner.include(exchange),
            DispatchOperation::Forward => self.inner.forward(exchange),
        };
        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                context.mark_system_error();
                context.finish();
                panic::resume_unwind(panic);
            }
        };

        if let Err(error) = &result {
            if error.is_system_error() {
                context.mark_system_error();
            }
        }
        context.finish();
        result
    }
}

impl<D> Deref for TimedDispatcher<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: RequestDispatcher> RequestDispatcher for TimedDispatcher<D> {
    type Exchange = D::Exchange;
    type Error = D::Error;

    async fn include(&self, exchange: &mut Self::Exchange) -> Result<(), Self::Error> {
        self.dispatch(DispatchOperation::Include, exchange).await
    }

    async fn forward(&self, exchange: &mut Self::Exchange) -> Result<(), Self::Error> {
        self.dispatch(DispatchOperation::Forward, exchange).await
    }
}

/// Dispatcher handed out by a [`MonitoredRequest`]
#[derive(Debug)]
pub enum MonitoredDispatcher<D> {
    /// Dispatcher of an unwrapped request
    Direct(D),
    /// Timed dispatcher of a wrapped request
    Timed(TimedDispatcher<D>),
}

impl<D> MonitoredDispatcher<D> {
    /// Whether dispatches are timed
    pub fn is_timed(&self) -> bool {
        matches!(self, Self::Timed(_))
    }
}

impl<D> Deref for MonitoredDispatcher<D> {
    type Target = D;

    fn deref(&self) -> &D {
        match self {
            Self::Direct(inner) => inner,
            Self::Timed(timed) => timed.get_ref(),
        }
    }
}

#[async_trait]
impl<D: RequestDispatcher> RequestDispatcher for MonitoredDispatcher<D> {
    type Exchange = D::Exchange;
    type Error = D::Error;

    async fn include(&self, exchange: &mut Self::Exchange) -> Result<(), Self::Error> {
        match self {
            Self::Direct(inner) => inner.include(exchange).await,
            Self::Timed(timed) => timed.include(exchange).await,
        }
    }

    async fn forward(&self, exchange: &mut Self::Exchange) -> Result<(), Self::Error> {
        match self {
            Self::Direct(inner) => inner.forward(exchange).await,
            Self::Timed(timed) => timed.forward(exchange).await,
        }
    }
}

/// A host request, wrapped so that its dispatchers are timed, or passed
/// through untouched.
///
/// Every operation of the host request other than dispatcher lookup is
/// reachable through `Deref`.
#[derive(Debug)]
pub enum MonitoredRequest<R> {
    /// Monitoring off: the original request
    Unwrapped(R),
    /// Dispatchers looked up through this request are timed
    Wrapped {
        /// The original request
        inner: R,
        /// Counter receiving the samples
        counter: Arc<Counter>,
        /// Wrapper variant
        kind: WrapperKind,
    },
}

impl<R> MonitoredRequest<R> {
    /// Whether dispatchers are timed
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Self::Wrapped { .. })
    }

    /// Wrapper variant, None when unwrapped
    pub fn kind(&self) -> Option<WrapperKind> {
        match self {
            Self::Unwrapped(_) => None,
            Self::Wrapped { kind, .. } => Some(*kind),
        }
    }

    /// The original request
    pub fn get_ref(&self) -> &R {
        match self {
            Self::Unwrapped(inner) | Self::Wrapped { inner, .. } => inner,
        }
    }

    /// Unwrap the original request
    pub fn into_inner(self) -> R {
        match self {
            Self::Unwrapped(inner) | Self::Wrapped { inner, .. } => inner,
        }
    }
}

impl<R> Deref for MonitoredRequest<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.get_ref()
    }
}

impl<R: HostRequest> HostRequest for MonitoredRequest<R> {
    type Dispatcher = MonitoredDispatcher<R::Dispatcher>;

    fn request_dispatcher(&self, path: &str) -> Option<Self::Dispatcher> {
        match self {
            Self::Unwrapped(inner) => inner
                .request_dispatcher(path)
                .map(MonitoredDispatcher::Direct),
            Self::Wrapped { inner, counter, .. } => {
                let dispatcher = inner.request_dispatcher(path)?;
                Some(MonitoredDispatcher::Timed(TimedDispatcher::new(
                    path,
                    dispatcher,
                    Arc::clone(counter),
                )))
            }
        }
    }

    fn dispatch_api_version(&self) -> u32 {
        self.get_ref().dispatch_api_version()
    }

    fn start_async(&self) -> Option<Self> {
        match self {
            Self::Wrapped {
                inner,
                counter,
                kind: WrapperKind::AsyncAware,
            } => inner.start_async().map(|inner| Self::Wrapped {
                inner,
                counter: Arc::clone(counter),
                kind: WrapperKind::AsyncAware,
            }),
            Self::Unwrapped(inner) | Self::Wrapped { inner, .. } => {
                inner.start_async().map(Self::Unwrapped)
            }
        }
    }
}

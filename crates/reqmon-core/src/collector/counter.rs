//! Named buckets of request statistics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::context::RequestContext;
use super::probe::{NoopProbe, ResourceProbe};
use crate::models::{CounterError, CounterRequest, RequestSample};

/// Counter of HTTP requests
pub const HTTP_COUNTER_NAME: &str = "http";
/// Counter of HTTP errors
pub const ERROR_COUNTER_NAME: &str = "error";
/// Counter of logged errors
pub const LOG_COUNTER_NAME: &str = "log";
/// Counter of SQL statements
pub const SQL_COUNTER_NAME: &str = "sql";
/// Counter of JPA queries
pub const JPA_COUNTER_NAME: &str = "jpa";
/// Counter of EJB calls
pub const EJB_COUNTER_NAME: &str = "ejb";
/// Counter of Spring bean calls
pub const SPRING_COUNTER_NAME: &str = "spring";
/// Counter of Guice bean calls
pub const GUICE_COUNTER_NAME: &str = "guice";
/// Counter of service calls
pub const SERVICES_COUNTER_NAME: &str = "services";
/// Counter of Struts actions
pub const STRUTS_COUNTER_NAME: &str = "struts";
/// Counter of JSF actions
pub const JSF_COUNTER_NAME: &str = "jsf";
/// Counter of page includes and forwards
pub const JSP_COUNTER_NAME: &str = "jsp";
/// Counter of scheduled jobs
pub const JOB_COUNTER_NAME: &str = "job";

/// Default number of errors kept by an error counter
pub const DEFAULT_MAX_ERRORS_COUNT: usize = 100;

/// Default number of distinct requests tracked before warning
pub const DEFAULT_MAX_REQUESTS_COUNT: usize = 10_000;

const BUSINESS_FACADE_COUNTER_NAMES: [&str; 5] = [
    SERVICES_COUNTER_NAME,
    EJB_COUNTER_NAME,
    SPRING_COUNTER_NAME,
    GUICE_COUNTER_NAME,
    JSF_COUNTER_NAME,
];

/// Named, concurrently-updated bucket of per-request statistics.
///
/// Each distinct request name gets one [`CounterRequest`]; updates to different
/// requests only contend on their map shard.
#[derive(Debug)]
pub struct Counter {
    name: String,
    icon_name: String,
    child_counter_name: Option<String>,
    requests: DashMap<String, CounterRequest>,
    errors: Option<Mutex<VecDeque<CounterError>>>,
    start_date: RwLock<DateTime<Utc>>,
    displayed: AtomicBool,
    used: AtomicBool,
    max_requests_count: usize,
    max_errors_count: usize,
    overflow_warned: AtomicBool,
    probe: Arc<dyn ResourceProbe>,
}

impl Counter {
    /// Create a counter; `error`, `log` and `job` counters keep an error log
    pub fn new(name: impl Into<String>, icon_name: impl Into<String>) -> Self {
        let name = name.into();
        let errors = matches!(
            name.as_str(),
            ERROR_COUNTER_NAME | LOG_COUNTER_NAME | JOB_COUNTER_NAME
        )
        .then(|| Mutex::new(VecDeque::new()));

        Self {
            name,
            icon_name: icon_name.into(),
            child_counter_name: None,
            requests: DashMap::new(),
            errors,
            start_date: RwLock::new(Utc::now()),
            displayed: AtomicBool::new(true),
            used: AtomicBool::new(false),
            max_requests_count: DEFAULT_MAX_REQUESTS_COUNT,
            max_errors_count: DEFAULT_MAX_ERRORS_COUNT,
            overflow_warned: AtomicBool::new(false),
            probe: Arc::new(NoopProbe),
        }
    }

    /// Name the counter whose calls are nested in this counter's requests
    pub fn with_child_counter(mut self, child_counter_name: impl Into<String>) -> Self {
        self.child_counter_name = Some(child_counter_name.into());
        self
    }

    /// Override the request and error limits
    pub fn with_limits(mut self, max_requests_count: usize, max_errors_count: usize) -> Self {
        self.max_requests_count = max_requests_count;
        self.max_errors_count = max_errors_count.max(1);
        self
    }

    /// Probe used by contexts bound with CPU tracking
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Counter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Icon shown next to the counter
    pub fn icon_name(&self) -> &str {
        &self.icon_name
    }

    /// Name of the child counter, if any
    pub fn child_counter_name(&self) -> Option<&str> {
        self.child_counter_name.as_deref()
    }

    /// When statistics started being collected
    pub fn start_date(&self) -> DateTime<Utc> {
        *self.start_date.read()
    }

    /// Move the start date (used when restoring or in tests)
    pub fn set_start_date(&self, start_date: DateTime<Utc>) {
        *self.start_date.write() = start_date;
    }

    /// Whether the counter is shown in reports
    pub fn is_displayed(&self) -> bool {
        self.displayed.load(Ordering::Relaxed)
    }

    /// Show or hide the counter
    pub fn set_displayed(&self, displayed: bool) {
        self.displayed.store(displayed, Ordering::Relaxed);
    }

    /// Whether anything ever records into this counter
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Relaxed)
    }

    /// Mark the counter as used
    pub fn set_used(&self, used: bool) {
        self.used.store(used, Ordering::Relaxed);
    }

    /// Maximum number of errors kept
    pub fn max_errors_count(&self) -> usize {
        self.max_errors_count
    }

    pub(crate) fn probe(&self) -> &dyn ResourceProbe {
        self.probe.as_ref()
    }

    /// Counters keeping an error log (`error`, `log`, `job`)
    pub fn is_error_counter(&self) -> bool {
        self.errors.is_some()
    }

    /// The job counter
    pub fn is_job_counter(&self) -> bool {
        self.name == JOB_COUNTER_NAME
    }

    /// JSP or Struts counters
    pub fn is_jsp_or_struts_counter(&self) -> bool {
        self.name == JSP_COUNTER_NAME || self.name == STRUTS_COUNTER_NAME
    }

    /// Counters of business method calls
    pub fn is_business_facade_counter(&self) -> bool {
        BUSINESS_FACADE_COUNTER_NAMES.contains(&self.name.as_str())
    }

    /// Start timing a request, wall clock only
    pub fn bind_context(self: &Arc<Self>, request_name: impl Into<String>) -> RequestContext {
        RequestContext::new(Arc::clone(self), request_name.into(), false)
    }

    /// Start timing a request, including CPU and allocation readings
    pub fn bind_context_including_cpu(
        self: &Arc<Self>,
        request_name: impl Into<String>,
    ) -> RequestContext {
        RequestContext::new(Arc::clone(self), request_name.into(), true)
    }

    /// Record one sample for the named request.
    ///
    /// Once `max_requests_count` distinct requests are tracked, samples of
    /// unknown requests are dropped until the counter is cleared.
    pub fn add_request(&self, request_name: &str, sample: &RequestSample) {
        if let Some(mut request) = self.requests.get_mut(request_name) {
            request.add_sample(sample);
            return;
        }

        if self.requests.len() >= self.max_requests_count {
            if !self.overflow_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    counter = %self.name,
                    max_requests_count = self.max_requests_count,
                    "Too many distinct requests, new ones are not recorded; request names may need normalizing"
                );
            }
            return;
        }

        self.requests
            .entry(request_name.to_string())
            .or_insert_with(|| CounterRequest::new(request_name, &self.name))
            .add_sample(sample);
    }

    /// Record a failed request and keep the error in the error log
    pub fn add_request_for_system_error(
        &self,
        request_name: &str,
        sample: &RequestSample,
        error: CounterError,
    ) {
        let sample = RequestSample {
            system_error: true,
            ..sample.clone()
        };
        self.add_request(request_name, &sample);
        self.add_error(error);
    }

    /// Append to the error log, dropping the oldest entries beyond the limit.
    ///
    /// Ignored by counters without an error log.
    pub fn add_error(&self, error: CounterError) {
        let Some(errors) = &self.errors else {
            debug!(counter = %self.name, "Counter keeps no error log");
            return;
        };
        let mut errors = errors.lock();
        errors.push_back(error);
        while errors.len() > self.max_errors_count {
            errors.pop_front();
        }
    }

    /// Copy of the error log, oldest first
    pub fn errors(&self) -> Vec<CounterError> {
        self.errors
            .as_ref()
            .map(|errors| errors.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of errors in the error log
    pub fn errors_count(&self) -> usize {
        self.errors.as_ref().map_or(0, |errors| errors.lock().len())
    }

    /// Number of distinct requests
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Statistics of one request, by name
    pub fn get_request(&self, request_name: &str) -> Option<CounterRequest> {
        self.requests.get(request_name).map(|entry| entry.value().clone())
    }

    /// Copy of every request's statistics, in no particular order
    pub fn requests_snapshot(&self) -> Vec<CounterRequest> {
        self.requests
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Requests ordered by cumulative duration, largest first
    pub fn ordered_requests(&self) -> Vec<CounterRequest> {
        let mut requests = self.requests_snapshot();
        requests.sort_by(|a, b| {
            b.durations_sum()
                .cmp(&a.durations_sum())
                .then_with(|| b.hits().cmp(&a.hits()))
                .then_with(|| a.name.cmp(&b.name))
        });
        requests
    }

    /// Requests ordered by hits, largest first
    pub fn ordered_by_hits_requests(&self) -> Vec<CounterRequest> {
        let mut requests = self.requests_snapshot();
        requests.sort_by(|a, b| {
            b.hits()
                .cmp(&a.hits())
                .then_with(|| a.name.cmp(&b.name))
        });
        requests
    }

    /// Reset statistics and errors, restarting the collection period
    pub fn clear(&self) {
        self.requests.clear();
        if let Some(errors) = &self.errors {
            errors.lock().clear();
        }
        self.overflow_warned.store(false, Ordering::Relaxed);
        *self.start_date.write() = Utc::now();
        debug!(counter = %self.name, "Counter cleared");
    }
}

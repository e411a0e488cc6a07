//! Timing scope of one monitored request

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

use super::counter::Counter;
use crate::models::RequestSample;

/// Measures one request and records it into its counter exactly once.
///
/// The sample is recorded by [`RequestContext::finish`] or, on any other exit
/// path, when the context is dropped. A drop during a panic records a system
/// error.
#[derive(Debug)]
pub struct RequestContext {
    counter: Arc<Counter>,
    request_name: String,
    started: Instant,
    cpu_start: Option<Duration>,
    allocated_start: Option<u64>,
    child_hits: u64,
    child_duration: Duration,
    response_size: Option<u64>,
    system_error: bool,
    recorded: bool,
}

impl RequestContext {
    pub(crate) fn new(counter: Arc<Counter>, request_name: String, including_cpu: bool) -> Self {
        let (cpu_start, allocated_start) = if including_cpu {
            let probe = counter.probe();
            (probe.cpu_time(), probe.allocated_bytes())
        } else {
            (None, None)
        };

        Self {
            counter,
            request_name,
            started: Instant::now(),
            cpu_start,
            allocated_start,
            child_hits: 0,
            child_duration: Duration::ZERO,
            response_size: None,
            system_error: false,
            recorded: false,
        }
    }

    /// Name the sample will be recorded under
    pub fn request_name(&self) -> &str {
        &self.request_name
    }

    /// Wall-clock time since the context was bound
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Attribute one child call (e.g. a SQL statement) to this request
    pub fn add_child_hit(&mut self, duration: Duration) {
        self.child_hits += 1;
        self.child_duration += duration;
    }

    /// Record the size of the response
    pub fn set_response_size(&mut self, bytes: u64) {
        self.response_size = Some(bytes);
    }

    /// Flag the request as failed with a system error
    pub fn mark_system_error(&mut self) {
        self.system_error = true;
    }

    /// Record the sample now
    pub fn finish(mut self) {
        self.record();
    }

    fn record(&mut self) {
        if self.recorded {
            return;
        }
        self.recorded = true;

        let probe = self.counter.probe();
        let cpu_time = self
            .cpu_start
            .zip(probe.cpu_time())
            .map(|(start, end)| end.saturating_sub(start));
        let allocated_bytes = self
            .allocated_start
            .zip(probe.allocated_bytes())
            .map(|(start, end)| end.saturating_sub(start));

        let sample = RequestSample {
            duration: Some(self.started.elapsed()),
            cpu_time,
            allocated_bytes,
            system_error: self.system_error,
            response_size: self.response_size,
            child_hits: self.child_hits,
            child_duration: self.child_duration,
        };

        trace!(
            counter = %self.counter.name(),
            request = %self.request_name,
            system_error = self.system_error,
            "Recording request"
        );
        self.counter.add_request(&self.request_name, &sample);
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if !self.recorded && std::thread::panicking() {
            self.system_error = true;
        }
        self.record();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::AssertUnwindSafe;

    #[test]
    fn test_finish_records_once() {
        let counter = Arc::new(Counter::new("jsp", "jsp.png"));
        let context = counter.bind_context("/index.jsp");
        context.finish();

        let requests = counter.requests_snapshot();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].hits(), 1);
    }

    #[test]
    fn test_drop_records() {
        let counter = Arc::new(Counter::new("jsp", "jsp.png"));
        {
            let mut context = counter.bind_context("/index.jsp");
            context.add_child_hit(Duration::from_millis(4));
            context.add_child_hit(Duration::from_millis(6));
        }

        let request = &counter.requests_snapshot()[0];
        assert_eq!(request.hits(), 1);
        assert_eq!(request.child_hits_mean(), 2);
        assert_eq!(request.child_durations_mean(), 10);
        assert_eq!(request.system_errors(), 0);
    }

    #[test]
    fn test_panic_records_system_error() {
        let counter = Arc::new(Counter::new("jsp", "jsp.png"));
        let shared = counter.clone();
        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let _context = shared.bind_context("/crash.jsp");
            panic!("view exploded");
        }));
        assert!(result.is_err());

        let request = &counter.requests_snapshot()[0];
        assert_eq!(request.hits(), 1);
        assert_eq!(request.system_errors(), 1);
    }
}

//! Derived view over a counter used by the reports

use std::collections::HashMap;

use crate::collector::Counter;
use crate::config::MonitoringConfig;
use crate::error::{Error, Result};

use super::CounterRequest;

/// Aggregated rows, thresholds and column flags of one counter snapshot
#[derive(Debug, Clone)]
pub struct CounterRequestAggregation {
    counter_name: String,
    requests: Vec<CounterRequest>,
    global_request: CounterRequest,
    warning_request: CounterRequest,
    severe_request: CounterRequest,
    warning_threshold: u64,
    severe_threshold: u64,
    times_displayed: bool,
    cpu_times_displayed: bool,
    allocated_kbytes_displayed: bool,
    response_size_displayed: bool,
    child_hits_displayed: bool,
}

impl CounterRequestAggregation {
    /// Snapshot and aggregate a counter
    pub fn new(counter: &Counter, config: &MonitoringConfig) -> Self {
        let counter_name = counter.name();
        let requests = if counter.is_error_counter() {
            counter.ordered_by_hits_requests()
        } else {
            counter.ordered_requests()
        };

        let mut global_request = CounterRequest::new(format!("{counter_name} global"), counter_name);
        for request in &requests {
            global_request.add_hits(request);
        }

        let global_mean = global_request.mean();
        let global_deviation = global_request.standard_deviation();
        let warning_threshold = config
            .warning_threshold_millis
            .and_then(|millis| u64::try_from(millis).ok())
            .unwrap_or(global_mean + global_deviation);
        let severe_threshold = config
            .severe_threshold_millis
            .and_then(|millis| u64::try_from(millis).ok())
            .unwrap_or(global_mean + 2 * global_deviation);

        let mut warning_request = CounterRequest::new(format!("{counter_name} warning"), counter_name);
        let mut severe_request = CounterRequest::new(format!("{counter_name} severe"), counter_name);
        for request in &requests {
            let mean = request.mean();
            if mean > severe_threshold {
                severe_request.add_hits(request);
            } else if mean > warning_threshold {
                warning_request.add_hits(request);
            }
        }

        Self {
            counter_name: counter_name.to_string(),
            times_displayed: global_request.has_durations(),
            cpu_times_displayed: global_request.cpu_time_mean().is_some(),
            allocated_kbytes_displayed: global_request.allocated_kbytes_mean().is_some(),
            response_size_displayed: global_request.response_size_mean().is_some(),
            child_hits_displayed: global_request.has_child_hits(),
            requests,
            global_request,
            warning_request,
            severe_request,
            warning_threshold,
            severe_threshold,
        }
    }

    /// Rows: by hits for error counters, by cumulative duration otherwise
    pub fn requests(&self) -> &[CounterRequest] {
        &self.requests
    }

    /// Sum of every row
    pub fn global_request(&self) -> &CounterRequest {
        &self.global_request
    }

    /// Sum of the rows whose mean is above the warning threshold only
    pub fn warning_request(&self) -> &CounterRequest {
        &self.warning_request
    }

    /// Sum of the rows whose mean is above the severe threshold
    pub fn severe_request(&self) -> &CounterRequest {
        &self.severe_request
    }

    /// Warning threshold of means, in milliseconds
    pub fn warning_threshold(&self) -> u64 {
        self.warning_threshold
    }

    /// Severe threshold of means, in milliseconds
    pub fn severe_threshold(&self) -> u64 {
        self.severe_threshold
    }

    /// Whether durations are tracked (false for error logs without timing)
    pub fn is_times_displayed(&self) -> bool {
        self.times_displayed
    }

    /// Whether CPU times are tracked
    pub fn is_cpu_times_displayed(&self) -> bool {
        self.cpu_times_displayed
    }

    /// Whether allocations are tracked
    pub fn is_allocated_kbytes_displayed(&self) -> bool {
        self.allocated_kbytes_displayed
    }

    /// Whether response sizes are known
    pub fn is_response_size_displayed(&self) -> bool {
        self.response_size_displayed
    }

    /// Whether child calls were recorded
    pub fn is_child_hits_displayed(&self) -> bool {
        self.child_hits_displayed
    }

    /// Rows summed per class name, or the rows of one class.
    ///
    /// Without `request_id`, returns one row per class (the part of the request
    /// name before its last `.`), by cumulative duration. With the id of such a
    /// class row, returns the rows belonging to that class.
    pub fn requests_aggregated_or_filtered_by_class_name(
        &self,
        request_id: Option<&str>,
    ) -> Result<Vec<CounterRequest>> {
        let by_class = self.requests_aggregated_by_class_name();
        let Some(request_id) = request_id else {
            return Ok(by_class);
        };

        let class_name = by_class
            .iter()
            .find(|request| request.id == request_id)
            .map(|request| request.name.clone())
            .ok_or_else(|| Error::not_found("request", request_id))?;

        Ok(self
            .requests
            .iter()
            .filter(|request| class_name_of(&request.name) == class_name)
            .cloned()
            .collect())
    }

    fn requests_aggregated_by_class_name(&self) -> Vec<CounterRequest> {
        let mut by_class: HashMap<&str, CounterRequest> = HashMap::new();
        for request in &self.requests {
            let class_name = class_name_of(&request.name);
            by_class
                .entry(class_name)
                .or_insert_with(|| CounterRequest::new(class_name, &self.counter_name))
                .add_hits(request);
        }

        let mut aggregated: Vec<_> = by_class.into_values().collect();
        aggregated.sort_by(|a, b| {
            b.durations_sum()
                .cmp(&a.durations_sum())
                .then_with(|| a.name.cmp(&b.name))
        });
        aggregated
    }
}

fn class_name_of(request_name: &str) -> &str {
    request_name
        .rfind('.')
        .map_or(request_name, |index| &request_name[..index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{ERROR_COUNTER_NAME, SERVICES_COUNTER_NAME};
    use crate::models::{CounterError, RequestSample};
    use std::time::Duration;

    fn sample(millis: u64) -> RequestSample {
        RequestSample::timed(Duration::from_millis(millis))
    }

    fn services_counter() -> Counter {
        let counter = Counter::new(SERVICES_COUNTER_NAME, "beans.png");
        counter.add_request("OrderService.list", &sample(100));
        counter.add_request("OrderService.create", &sample(300));
        counter.add_request("UserService.find", &sample(50));
        counter
    }

    #[test]
    fn test_global_and_thresholds() {
        let counter = Counter::new("http", "dbweb.png");
        for millis in [10, 10, 10, 10, 1000] {
            counter.add_request(&format!("/page{millis}"), &sample(millis));
        }

        let aggregation = CounterRequestAggregation::new(&counter, &MonitoringConfig::default());
        let global = aggregation.global_request();

        assert_eq!(global.hits(), 5);
        assert_eq!(global.mean(), 208);
        assert_eq!(
            aggregation.warning_threshold(),
            global.mean() + global.standard_deviation()
        );
        // mean 1000 sits between mean + stddev (650) and mean + 2 stddev (1092)
        assert_eq!(aggregation.warning_request().hits(), 1);
        assert_eq!(aggregation.severe_request().hits(), 0);
    }

    #[test]
    fn test_configured_thresholds() {
        let config = MonitoringConfig {
            warning_threshold_millis: Some(75),
            severe_threshold_millis: Some(200),
            ..MonitoringConfig::default()
        };
        let aggregation = CounterRequestAggregation::new(&services_counter(), &config);

        assert_eq!(aggregation.warning_threshold(), 75);
        assert_eq!(aggregation.severe_threshold(), 200);
        assert_eq!(aggregation.warning_request().name, "services warning");
        assert_eq!(aggregation.warning_request().hits(), 1);
        assert_eq!(aggregation.severe_request().hits(), 1);
    }

    #[test]
    fn test_flags() {
        let counter = Counter::new("http", "dbweb.png");
        counter.add_request(
            "/a",
            &RequestSample {
                duration: Some(Duration::from_millis(5)),
                allocated_bytes: Some(4096),
                ..RequestSample::default()
            },
        );

        let aggregation = CounterRequestAggregation::new(&counter, &MonitoringConfig::default());
        assert!(aggregation.is_times_displayed());
        assert!(!aggregation.is_cpu_times_displayed());
        assert!(aggregation.is_allocated_kbytes_displayed());
        assert!(!aggregation.is_response_size_displayed());
        assert!(!aggregation.is_child_hits_displayed());
    }

    #[test]
    fn test_error_counter_ordered_by_hits_without_times() {
        let counter = Counter::new(ERROR_COUNTER_NAME, "error.png");
        let untimed = RequestSample::default();
        counter.add_request_for_system_error("rare", &untimed, CounterError::new("rare"));
        for _ in 0..3 {
            counter.add_request_for_system_error("frequent", &untimed, CounterError::new("f"));
        }

        let aggregation = CounterRequestAggregation::new(&counter, &MonitoringConfig::default());
        assert_eq!(aggregation.requests()[0].name, "frequent");
        assert!(!aggregation.is_times_displayed());
    }

    #[test]
    fn test_summary_per_class() {
        let aggregation =
            CounterRequestAggregation::new(&services_counter(), &MonitoringConfig::default());

        let by_class = aggregation
            .requests_aggregated_or_filtered_by_class_name(None)
            .unwrap();
        let names: Vec<_> = by_class.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["OrderService", "UserService"]);
        assert_eq!(by_class[0].hits(), 2);

        let order_methods = aggregation
            .requests_aggregated_or_filtered_by_class_name(Some(&by_class[0].id))
            .unwrap();
        assert_eq!(order_methods.len(), 2);

        assert!(aggregation
            .requests_aggregated_or_filtered_by_class_name(Some("services-unknown"))
            .is_err());
    }
}

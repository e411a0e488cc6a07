//! Per-request statistics

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One timing observation pushed into a counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSample {
    /// Elapsed wall-clock time (None for errors logged without timing)
    pub duration: Option<Duration>,
    /// CPU time consumed, when tracked
    pub cpu_time: Option<Duration>,
    /// Bytes allocated, when tracked
    pub allocated_bytes: Option<u64>,
    /// Unrecoverable host-level failure
    pub system_error: bool,
    /// Size of the response body, when known
    pub response_size: Option<u64>,
    /// Number of child calls (e.g. SQL statements) made by the request
    pub child_hits: u64,
    /// Time spent in child calls
    pub child_duration: Duration,
}

impl RequestSample {
    /// A sample with only a wall-clock duration
    pub fn timed(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..Self::default()
        }
    }

    /// Flag the sample as a system error
    pub fn with_system_error(mut self, system_error: bool) -> Self {
        self.system_error = system_error;
        self
    }
}

/// Aggregated statistics for one request identity within a counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterRequest {
    /// Stable identifier: counter name followed by a hash of the name
    pub id: String,

    /// Request name (path, SQL statement, method...)
    pub name: String,

    hits: u64,
    durations_sum: Option<u64>,
    durations_square_sum: u64,
    maximum: u64,
    cpu_time_sum: Option<u64>,
    allocated_kbytes_sum: Option<u64>,
    system_errors: u64,
    response_sizes_sum: Option<u64>,
    child_hits: u64,
    child_durations_sum: u64,
}

impl CounterRequest {
    /// Create empty statistics for a request of the given counter
    pub fn new(name: impl Into<String>, counter_name: &str) -> Self {
        let name = name.into();
        Self {
            id: Self::build_id(&name, counter_name),
            name,
            hits: 0,
            durations_sum: None,
            durations_square_sum: 0,
            maximum: 0,
            cpu_time_sum: None,
            allocated_kbytes_sum: None,
            system_errors: 0,
            response_sizes_sum: None,
            child_hits: 0,
            child_durations_sum: 0,
        }
    }

    /// Build the id of a request: the counter name then 16 hex digits.
    ///
    /// The counter name prefix is what lets the report recognize SQL requests.
    pub fn build_id(name: &str, counter_name: &str) -> String {
        let digest = Sha256::digest(name.as_bytes());
        format!("{counter_name}{}", hex::encode(&digest[..8]))
    }

    /// Record one sample
    pub fn add_sample(&mut self, sample: &RequestSample) {
        self.hits += 1;
        if let Some(duration) = sample.duration {
            let millis = duration_millis(duration);
            self.durations_sum = Some(self.durations_sum.unwrap_or(0) + millis);
            self.durations_square_sum += millis * millis;
            self.maximum = self.maximum.max(millis);
        }
        if let Some(cpu_time) = sample.cpu_time {
            self.cpu_time_sum = Some(self.cpu_time_sum.unwrap_or(0) + duration_millis(cpu_time));
        }
        if let Some(bytes) = sample.allocated_bytes {
            self.allocated_kbytes_sum = Some(self.allocated_kbytes_sum.unwrap_or(0) + bytes / 1024);
        }
        if sample.system_error {
            self.system_errors += 1;
        }
        if let Some(size) = sample.response_size {
            self.response_sizes_sum = Some(self.response_sizes_sum.unwrap_or(0) + size);
        }
        self.child_hits += sample.child_hits;
        self.child_durations_sum += duration_millis(sample.child_duration);
    }

    /// Merge the statistics of another request into this one
    pub fn add_hits(&mut self, other: &CounterRequest) {
        self.hits += other.hits;
        self.durations_sum = add_tracked(self.durations_sum, other.durations_sum);
        self.durations_square_sum += other.durations_square_sum;
        self.maximum = self.maximum.max(other.maximum);
        self.cpu_time_sum = add_tracked(self.cpu_time_sum, other.cpu_time_sum);
        self.allocated_kbytes_sum = add_tracked(self.allocated_kbytes_sum, other.allocated_kbytes_sum);
        self.system_errors += other.system_errors;
        self.response_sizes_sum = add_tracked(self.response_sizes_sum, other.response_sizes_sum);
        self.child_hits += other.child_hits;
        self.child_durations_sum += other.child_durations_sum;
    }

    /// Number of recorded samples
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Whether any sample carried a duration
    pub fn has_durations(&self) -> bool {
        self.durations_sum.is_some()
    }

    /// Sum of durations in milliseconds
    pub fn durations_sum(&self) -> u64 {
        self.durations_sum.unwrap_or(0)
    }

    /// Longest duration in milliseconds
    pub fn maximum(&self) -> u64 {
        self.maximum
    }

    /// Mean duration in milliseconds (0 without hits)
    pub fn mean(&self) -> u64 {
        match self.hits {
            0 => 0,
            hits => self.durations_sum() / hits,
        }
    }

    /// Sample standard deviation of durations, in milliseconds
    pub fn standard_deviation(&self) -> u64 {
        if self.hits < 2 {
            return 0;
        }
        let hits = self.hits as f64;
        let sum = self.durations_sum() as f64;
        let variance = (self.durations_square_sum as f64 - sum * sum / hits) / (hits - 1.0);
        // rounding noise can push the variance slightly below zero
        variance.max(0.0).sqrt() as u64
    }

    /// Sum of CPU time in milliseconds
    pub fn cpu_time_sum(&self) -> u64 {
        self.cpu_time_sum.unwrap_or(0)
    }

    /// Mean CPU time in milliseconds, None when CPU time is not tracked
    pub fn cpu_time_mean(&self) -> Option<u64> {
        mean_of(self.cpu_time_sum, self.hits)
    }

    /// Mean allocated kilobytes, None when allocation is not tracked
    pub fn allocated_kbytes_mean(&self) -> Option<u64> {
        mean_of(self.allocated_kbytes_sum, self.hits)
    }

    /// Number of system errors
    pub fn system_errors(&self) -> u64 {
        self.system_errors
    }

    /// Share of hits that were system errors, between 0 and 100
    pub fn system_error_percentage(&self) -> f64 {
        if self.hits == 0 {
            return 0.0;
        }
        (100.0 * self.system_errors as f64 / self.hits as f64).min(100.0)
    }

    /// Mean response size in bytes, None when sizes are unknown
    pub fn response_size_mean(&self) -> Option<u64> {
        mean_of(self.response_sizes_sum, self.hits)
    }

    /// Whether child calls were recorded
    pub fn has_child_hits(&self) -> bool {
        self.child_hits > 0
    }

    /// Mean number of child calls per hit
    pub fn child_hits_mean(&self) -> u64 {
        mean_of(Some(self.child_hits), self.hits).unwrap_or(0)
    }

    /// Mean time spent in child calls per hit, in milliseconds
    pub fn child_durations_mean(&self) -> u64 {
        mean_of(Some(self.child_durations_sum), self.hits).unwrap_or(0)
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn add_tracked(left: Option<u64>, right: Option<u64>) -> Option<u64> {
    match (left, right) {
        (None, None) => None,
        (left, right) => Some(left.unwrap_or(0) + right.unwrap_or(0)),
    }
}

fn mean_of(sum: Option<u64>, hits: u64) -> Option<u64> {
    match hits {
        0 => None,
        hits => sum.map(|sum| sum / hits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(millis: u64) -> RequestSample {
        RequestSample::timed(Duration::from_millis(millis))
    }

    #[test]
    fn test_id_is_prefixed_by_counter_name() {
        let request = CounterRequest::new("select * from users", "sql");
        assert!(request.id.starts_with("sql"));
        assert_eq!(request.id.len(), "sql".len() + 16);
        assert_eq!(request.id, CounterRequest::build_id("select * from users", "sql"));
    }

    #[test]
    fn test_mean_max_and_deviation() {
        let mut request = CounterRequest::new("/index.jsp", "jsp");
        for millis in [100, 200, 300] {
            request.add_sample(&sample(millis));
        }

        assert_eq!(request.hits(), 3);
        assert_eq!(request.durations_sum(), 600);
        assert_eq!(request.mean(), 200);
        assert_eq!(request.maximum(), 300);
        assert_eq!(request.standard_deviation(), 100);
    }

    #[test]
    fn test_single_hit_has_no_deviation() {
        let mut request = CounterRequest::new("/a", "http");
        request.add_sample(&sample(42));
        assert_eq!(request.standard_deviation(), 0);
    }

    #[test]
    fn test_untracked_metrics_are_none() {
        let mut request = CounterRequest::new("/a", "http");
        request.add_sample(&sample(10));

        assert!(request.has_durations());
        assert_eq!(request.cpu_time_mean(), None);
        assert_eq!(request.allocated_kbytes_mean(), None);
        assert_eq!(request.response_size_mean(), None);
        assert!(!request.has_child_hits());
    }

    #[test]
    fn test_system_error_percentage() {
        let mut request = CounterRequest::new("/a", "http");
        assert_eq!(request.system_error_percentage(), 0.0);

        request.add_sample(&sample(1).with_system_error(true));
        request.add_sample(&sample(1));
        request.add_sample(&sample(1));
        request.add_sample(&sample(1));

        assert_eq!(request.system_errors(), 1);
        assert!((request.system_error_percentage() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_add_hits_merges_everything() {
        let mut first = CounterRequest::new("/a", "http");
        first.add_sample(&RequestSample {
            duration: Some(Duration::from_millis(100)),
            cpu_time: Some(Duration::from_millis(40)),
            child_hits: 2,
            child_duration: Duration::from_millis(30),
            ..RequestSample::default()
        });
        let mut second = CounterRequest::new("/b", "http");
        second.add_sample(&RequestSample {
            duration: Some(Duration::from_millis(300)),
            response_size: Some(2048),
            ..RequestSample::default()
        });

        let mut global = CounterRequest::new("http global", "http");
        global.add_hits(&first);
        global.add_hits(&second);

        assert_eq!(global.hits(), 2);
        assert_eq!(global.mean(), 200);
        assert_eq!(global.maximum(), 300);
        assert_eq!(global.cpu_time_mean(), Some(20));
        assert_eq!(global.response_size_mean(), Some(1024));
        assert_eq!(global.child_hits_mean(), 1);
        assert_eq!(global.child_durations_mean(), 15);
    }
}

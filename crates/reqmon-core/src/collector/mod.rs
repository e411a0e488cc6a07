//! Collector module - request statistics collection
//!
//! Counters receive one sample per monitored request, either directly or
//! through a [`RequestContext`] that times the request and records it when
//! it ends.

mod context;
mod counter;
mod probe;

pub use context::RequestContext;
pub use counter::*;
pub use probe::{NoopProbe, ResourceProbe, ThreadCpuProbe};

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::MonitoringConfig;

/// The counters of one monitoring session
#[derive(Debug)]
pub struct MonitoringRegistry {
    config: MonitoringConfig,
    counters: Vec<Arc<Counter>>,
}

impl MonitoringRegistry {
    /// Create the session counters, picking the probe from the configuration
    pub fn new(config: MonitoringConfig) -> Self {
        let probe: Arc<dyn ResourceProbe> = if config.cpu_tracking {
            Arc::new(ThreadCpuProbe)
        } else {
            Arc::new(NoopProbe)
        };
        if config.allocation_tracking {
            warn!("Allocation tracking needs a custom probe, see MonitoringRegistry::with_probe");
        }
        Self::with_probe(config, probe)
    }

    /// Create the session counters with a custom resource probe
    pub fn with_probe(config: MonitoringConfig, probe: Arc<dyn ResourceProbe>) -> Self {
        let build = |name: &str, icon: &str, child: Option<&str>| {
            let mut counter = Counter::new(name, icon)
                .with_limits(config.max_requests_count, config.max_error_count)
                .with_probe(probe.clone());
            if let Some(child) = child {
                counter = counter.with_child_counter(child);
            }
            counter.set_displayed(!config.is_counter_hidden(name));
            Arc::new(counter)
        };

        let counters = vec![
            build(HTTP_COUNTER_NAME, "dbweb.png", Some(SQL_COUNTER_NAME)),
            build(SQL_COUNTER_NAME, "db.png", None),
            build(JSP_COUNTER_NAME, "jsp.png", Some(SQL_COUNTER_NAME)),
            build(ERROR_COUNTER_NAME, "error.png", None),
            build(LOG_COUNTER_NAME, "log.png", None),
        ];

        info!(
            counters = counters.len(),
            disabled = config.disabled,
            cpu_tracking = config.cpu_tracking,
            "Monitoring session started"
        );

        Self { config, counters }
    }

    /// Configuration of the session
    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Every counter, in display order
    pub fn counters(&self) -> &[Arc<Counter>] {
        &self.counters
    }

    /// Counters that are displayed and have been used
    pub fn displayed_counters(&self) -> impl Iterator<Item = &Arc<Counter>> {
        self.counters
            .iter()
            .filter(|counter| counter.is_displayed() && counter.is_used())
    }

    /// Find a counter by name
    pub fn counter(&self, name: &str) -> Option<&Arc<Counter>> {
        self.counters.iter().find(|counter| counter.name() == name)
    }

    fn expect_counter(&self, name: &str) -> &Arc<Counter> {
        self.counter(name)
            .unwrap_or_else(|| unreachable!("counter {name} is created by every registry"))
    }

    /// The HTTP requests counter
    pub fn http_counter(&self) -> &Arc<Counter> {
        self.expect_counter(HTTP_COUNTER_NAME)
    }

    /// The SQL statements counter
    pub fn sql_counter(&self) -> &Arc<Counter> {
        self.expect_counter(SQL_COUNTER_NAME)
    }

    /// The page include/forward counter
    pub fn jsp_counter(&self) -> &Arc<Counter> {
        self.expect_counter(JSP_COUNTER_NAME)
    }

    /// The HTTP errors counter
    pub fn error_counter(&self) -> &Arc<Counter> {
        self.expect_counter(ERROR_COUNTER_NAME)
    }

    /// The logged errors counter
    pub fn log_counter(&self) -> &Arc<Counter> {
        self.expect_counter(LOG_COUNTER_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestSample;
    use std::time::Duration;

    #[test]
    fn test_registry_counters() {
        let registry = MonitoringRegistry::new(MonitoringConfig::default());

        assert_eq!(registry.http_counter().child_counter_name(), Some(SQL_COUNTER_NAME));
        assert!(registry.error_counter().is_error_counter());
        assert!(registry.counter("missing").is_none());
        assert_eq!(registry.displayed_counters().count(), 0);
    }

    #[test]
    fn test_displayed_counters_follow_config() {
        let config = MonitoringConfig {
            displayed_counters: Some(vec![HTTP_COUNTER_NAME.to_string()]),
            ..MonitoringConfig::default()
        };
        let registry = MonitoringRegistry::new(config);
        for counter in registry.counters() {
            counter.set_used(true);
        }
        registry
            .sql_counter()
            .add_request("select 1", &RequestSample::timed(Duration::from_millis(1)));

        let names: Vec<_> = registry.displayed_counters().map(|c| c.name()).collect();
        assert_eq!(names, [HTTP_COUNTER_NAME]);
    }
}

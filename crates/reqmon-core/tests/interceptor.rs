//! Dispatch interception through a host request

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqmon::collector::{Counter, JSP_COUNTER_NAME};
use reqmon::config::MonitoringConfig;
use reqmon::interceptor::{
    DispatchError, DispatchInterceptor, HostRequest, RequestDispatcher, WrapperKind,
};
use rstest::rstest;

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    FailFunctional,
    FailSystem,
    Panic,
    Hang,
}

#[derive(Debug)]
struct FakeDispatcher {
    behavior: Behavior,
}

#[async_trait]
impl RequestDispatcher for FakeDispatcher {
    type Exchange = Vec<String>;
    type Error = DispatchError;

    async fn include(&self, exchange: &mut Vec<String>) -> Result<(), DispatchError> {
        exchange.push("include".into());
        self.run().await
    }

    async fn forward(&self, exchange: &mut Vec<String>) -> Result<(), DispatchError> {
        exchange.push("forward".into());
        self.run().await
    }
}

impl FakeDispatcher {
    async fn run(&self) -> Result<(), DispatchError> {
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::FailFunctional => Err(DispatchError::Functional("bad input".into())),
            Behavior::FailSystem => Err(DispatchError::System("out of memory".into())),
            Behavior::Panic => panic!("dispatcher blew up"),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

#[derive(Debug)]
struct FakeRequest {
    version: u32,
    behavior: Behavior,
}

impl FakeRequest {
    fn new(version: u32, behavior: Behavior) -> Self {
        Self { version, behavior }
    }

    fn attribute(&self) -> &'static str {
        "host value"
    }
}

impl HostRequest for FakeRequest {
    type Dispatcher = FakeDispatcher;

    fn request_dispatcher(&self, path: &str) -> Option<FakeDispatcher> {
        (!path.starts_with("/missing")).then_some(FakeDispatcher {
            behavior: self.behavior,
        })
    }

    fn dispatch_api_version(&self) -> u32 {
        self.version
    }

    fn start_async(&self) -> Option<Self> {
        Some(Self::new(self.version, self.behavior))
    }
}

fn interceptor(config: &MonitoringConfig) -> DispatchInterceptor {
    DispatchInterceptor::new(config, Arc::new(Counter::new(JSP_COUNTER_NAME, "jsp.png")))
}

#[rstest]
#[case(1, None)]
#[case(2, Some(WrapperKind::Basic))]
#[case(3, Some(WrapperKind::AsyncAware))]
#[case(4, Some(WrapperKind::AsyncAware))]
fn test_wrapper_kind_follows_api_version(#[case] version: u32, #[case] expected: Option<WrapperKind>) {
    let interceptor = interceptor(&MonitoringConfig::default());
    let request = interceptor.wrap(FakeRequest::new(version, Behavior::Succeed));
    assert_eq!(request.kind(), expected);
    assert_eq!(request.dispatch_api_version(), version);
}

#[tokio::test]
async fn test_samples_update_hits_and_system_errors() {
    let interceptor = interceptor(&MonitoringConfig::default());
    let behaviors = [
        Behavior::Succeed,
        Behavior::FailSystem,
        Behavior::FailFunctional,
        Behavior::Succeed,
        Behavior::FailSystem,
    ];

    for behavior in behaviors {
        let request = interceptor.wrap(FakeRequest::new(3, behavior));
        let dispatcher = request.request_dispatcher("/order.jsp?id=1").unwrap();
        let mut exchange = Vec::new();
        let result = dispatcher.include(&mut exchange).await;
        assert_eq!(result.is_ok(), matches!(behavior, Behavior::Succeed));
        assert_eq!(exchange, ["include"]);
    }

    let recorded = interceptor.counter().get_request("/order.jsp").unwrap();
    assert_eq!(recorded.hits(), 5);
    assert_eq!(recorded.system_errors(), 2);
    assert!(interceptor.counter().is_used());
}

#[tokio::test]
async fn test_disabled_monitoring_passes_through() {
    let config = MonitoringConfig {
        disabled: true,
        ..MonitoringConfig::default()
    };
    let interceptor = interceptor(&config);
    let request = interceptor.wrap(FakeRequest::new(3, Behavior::Succeed));

    assert!(!request.is_wrapped());
    let dispatcher = request.request_dispatcher("/order.jsp").unwrap();
    assert!(!dispatcher.is_timed());
    dispatcher.forward(&mut Vec::new()).await.unwrap();
    assert_eq!(interceptor.counter().request_count(), 0);
}

#[test]
fn test_unknown_path_has_no_dispatcher() {
    let interceptor = interceptor(&MonitoringConfig::default());
    let request = interceptor.wrap(FakeRequest::new(3, Behavior::Succeed));
    assert!(request.request_dispatcher("/missing.jsp").is_none());
    assert_eq!(interceptor.counter().request_count(), 0);
}

#[test]
fn test_other_operations_reach_the_host_request() {
    let interceptor = interceptor(&MonitoringConfig::default());
    let request = interceptor.wrap(FakeRequest::new(2, Behavior::Succeed));
    assert_eq!(request.attribute(), "host value");
    assert_eq!(request.into_inner().version, 2);
}

#[tokio::test]
async fn test_panicking_dispatch_counts_as_system_error() {
    let interceptor = interceptor(&MonitoringConfig::default());
    let request = interceptor.wrap(FakeRequest::new(3, Behavior::Panic));
    let dispatcher = request.request_dispatcher("/crash.jsp").unwrap();

    let outcome = tokio::spawn(async move { dispatcher.forward(&mut Vec::new()).await }).await;

    assert!(outcome.unwrap_err().is_panic());
    let recorded = interceptor.counter().get_request("/crash.jsp").unwrap();
    assert_eq!(recorded.hits(), 1);
    assert_eq!(recorded.system_errors(), 1);
}

#[tokio::test]
async fn test_cancelled_dispatch_is_still_recorded() {
    let interceptor = interceptor(&MonitoringConfig::default());
    let request = interceptor.wrap(FakeRequest::new(3, Behavior::Hang));
    let dispatcher = request.request_dispatcher("/slow.jsp").unwrap();
    let mut exchange = Vec::new();

    let outcome =
        tokio::time::timeout(Duration::from_millis(20), dispatcher.include(&mut exchange)).await;

    assert!(outcome.is_err());
    let recorded = interceptor.counter().get_request("/slow.jsp").unwrap();
    assert_eq!(recorded.hits(), 1);
    assert_eq!(recorded.system_errors(), 0);
    assert!(recorded.maximum() >= 20);
}

#[rstest]
#[case(3, true, 1)]
#[case(2, false, 0)]
#[tokio::test]
async fn test_async_context_dispatch_follows_wrapper_kind(
    #[case] version: u32,
    #[case] wrapped: bool,
    #[case] expected_hits: u64,
) {
    let interceptor = interceptor(&MonitoringConfig::default());
    let request = interceptor.wrap(FakeRequest::new(version, Behavior::Succeed));
    assert!(request.is_wrapped());

    let async_request = request.start_async().unwrap();
    assert_eq!(async_request.is_wrapped(), wrapped);
    let dispatcher = async_request.request_dispatcher("/async.jsp").unwrap();
    dispatcher.forward(&mut Vec::new()).await.unwrap();

    let hits = interceptor
        .counter()
        .get_request("/async.jsp")
        .map_or(0, |r| r.hits());
    assert_eq!(hits, expected_hits);
}

//! HTTP request monitoring
//!
//! Times every request into the `http` counter under `"<path> <METHOD>"`.
//! Responses with a 4xx or 5xx status are also logged into the `error`
//! counter; 5xx responses count as system errors.

use axum::{
    extract::{Request, State},
    http::header::CONTENT_LENGTH,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::AppState;
use crate::models::{CounterError, RequestSample};

/// Whether `path` is the monitoring page or one of its sub-paths
fn is_monitoring_path(path: &str, monitoring_path: &str) -> bool {
    path.strip_prefix(monitoring_path)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Middleware recording requests into the session's `http` and `error`
/// counters
pub async fn monitor_http(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let registry = &state.registry;
    let path = request.uri().path().to_owned();
    let counter = registry.http_counter();
    if registry.config().disabled
        || !counter.is_displayed()
        || is_monitoring_path(&path, &state.monitoring_path)
    {
        return next.run(request).await;
    }
    counter.set_used(true);

    let request_name = format!("{path} {}", request.method());
    let mut context = counter.bind_context_including_cpu(request_name.as_str());
    let response = next.run(request).await;

    let status = response.status();
    if let Some(size) = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
    {
        context.set_response_size(size);
    }
    if status.is_server_error() {
        context.mark_system_error();
    }

    if status.is_client_error() || status.is_server_error() {
        let error_counter = registry.error_counter();
        error_counter.set_used(true);
        let sample = RequestSample::timed(context.elapsed());
        error_counter.add_request_for_system_error(
            &format!("Error {} {request_name}", status.as_u16()),
            &sample,
            CounterError::new(format!("Error {status}")).with_http_request(request_name.as_str()),
        );
        debug!(status = status.as_u16(), request = %request_name, "HTTP error recorded");
    }

    context.finish();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitoring_path_matches_whole_segments() {
        assert!(is_monitoring_path("/monitoring", "/monitoring"));
        assert!(is_monitoring_path("/monitoring/counters", "/monitoring"));
        assert!(!is_monitoring_path("/monitoringfoo", "/monitoring"));
        assert!(!is_monitoring_path("/monitoring-old/report", "/monitoring"));
        assert!(!is_monitoring_path("/health", "/monitoring"));
    }
}

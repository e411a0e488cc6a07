//! API handlers for the monitoring endpoints

use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::views::ViewRegistry;
use crate::collector::{Counter, MonitoringRegistry};
use crate::interceptor::DispatchInterceptor;
use crate::models::{Period, Range};
use crate::report::{html_encode_but_not_space, HtmlCounterReport, ReportOptions};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MonitoringRegistry>,
    pub interceptor: DispatchInterceptor,
    pub views: Arc<ViewRegistry>,
    pub csrf_token: Arc<str>,
    pub monitoring_path: Arc<str>,
}

impl AppState {
    /// Build the state of a monitoring session, with a fresh CSRF token
    pub fn new(registry: Arc<MonitoringRegistry>, monitoring_path: &str) -> Self {
        let interceptor =
            DispatchInterceptor::new(registry.config(), Arc::clone(registry.jsp_counter()));
        let token: [u8; 16] = rand::random();
        Self {
            registry,
            interceptor,
            views: Arc::new(ViewRegistry::default()),
            csrf_token: hex::encode(token).into(),
            monitoring_path: monitoring_path.into(),
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Query parameters of the monitoring page
#[derive(Debug, Default, Deserialize)]
pub struct MonitoringQuery {
    pub part: Option<String>,
    pub counter: Option<String>,
    pub graph: Option<String>,
    pub period: Option<String>,
    pub action: Option<String>,
    pub token: Option<String>,
}

/// Monitoring page: every displayed counter, one part, or an action
pub async fn monitoring(
    State(state): State<AppState>,
    Query(query): Query<MonitoringQuery>,
) -> Result<Html<String>, (StatusCode, String)> {
    let mut message = None;
    match query.action.as_deref() {
        None => {}
        Some("clear_counter") => message = Some(clear_counter(&state, &query)?),
        Some(action) => {
            return Err((StatusCode::BAD_REQUEST, format!("Unknown action: {action}")));
        }
    }

    let range = match query.period.as_deref() {
        Some(code) => Range::parse(code).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        None if message.is_some() => Range::period(Period::All),
        None => Range::default(),
    };

    let html = match query.part.as_deref() {
        None => render_page(&state, range, message.as_deref()),
        Some("counterSummaryPerClass") => {
            let counter = find_counter(&state, query.counter.as_deref())?;
            render_summary_per_class(&state, counter, range, query.graph.as_deref())
        }
        Some(part) => return Err((StatusCode::NOT_FOUND, format!("Unknown part: {part}"))),
    }
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Html(html))
}

/// Counter overview entry
#[derive(Debug, Serialize, Deserialize)]
pub struct CounterSummary {
    pub name: String,
    pub displayed: bool,
    pub used: bool,
    pub requests: usize,
    pub hits: u64,
    pub system_errors: u64,
    pub errors: usize,
}

/// JSON overview of every counter of the session
pub async fn list_counters(State(state): State<AppState>) -> Json<Vec<CounterSummary>> {
    let summaries = state
        .registry
        .counters()
        .iter()
        .map(|counter| {
            let requests = counter.requests_snapshot();
            CounterSummary {
                name: counter.name().to_string(),
                displayed: counter.is_displayed(),
                used: counter.is_used(),
                requests: requests.len(),
                hits: requests.iter().map(|request| request.hits()).sum(),
                system_errors: requests.iter().map(|request| request.system_errors()).sum(),
                errors: counter.errors_count(),
            }
        })
        .collect();
    Json(summaries)
}

fn clear_counter(state: &AppState, query: &MonitoringQuery) -> Result<String, (StatusCode, String)> {
    if query.token.as_deref() != Some(&*state.csrf_token) {
        warn!(counter = ?query.counter, "Clear rejected, invalid CSRF token");
        return Err((StatusCode::FORBIDDEN, "Invalid CSRF token".to_string()));
    }
    let counter = find_counter(state, query.counter.as_deref())?;
    counter.clear();
    info!(counter = %counter.name(), "Counter statistics cleared");
    Ok(format!("Statistics of counter {} cleared", counter.name()))
}

fn find_counter<'s>(
    state: &'s AppState,
    name: Option<&str>,
) -> Result<&'s Arc<Counter>, (StatusCode, String)> {
    let name = name.ok_or((StatusCode::BAD_REQUEST, "Missing counter".to_string()))?;
    state
        .registry
        .counter(name)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Counter not found: {name}")))
}

fn report_options(state: &AppState) -> ReportOptions<'_> {
    ReportOptions {
        csrf_token: Some(&*state.csrf_token),
        pdf_enabled: state.registry.config().pdf_enabled,
        ..ReportOptions::default()
    }
}

fn render_page(state: &AppState, range: Range, message: Option<&str>) -> crate::Result<String> {
    let options = report_options(state);
    let mut html = String::new();
    writeln!(html, "<html><head><title>Monitoring</title></head><body>")?;
    if let Some(message) = message {
        writeln!(html, "<div class='info'>{}</div>", html_encode_but_not_space(message))?;
    }
    for period in Period::ALL {
        write!(html, "<a href='?period={0}'>#{0}#</a> ", period.code())?;
    }
    writeln!(html)?;
    for counter in state.registry.displayed_counters() {
        writeln!(
            html,
            "<h3 id='{0}'><img src='?resource={1}' alt='{0}'/> #{0}_stats#</h3>",
            counter.name(),
            counter.icon_name()
        )?;
        HtmlCounterReport::new(counter, range, state.registry.config(), &options)
            .to_html(&mut html)?;
    }
    writeln!(html, "</body></html>")?;
    Ok(html)
}

fn render_summary_per_class(
    state: &AppState,
    counter: &Counter,
    range: Range,
    request_id: Option<&str>,
) -> crate::Result<String> {
    let options = report_options(state);
    let mut html = String::new();
    writeln!(html, "<html><head><title>Monitoring</title></head><body>")?;
    HtmlCounterReport::new(counter, range, state.registry.config(), &options)
        .write_requests_aggregated_or_filtered_by_class_name(&mut html, request_id)?;
    writeln!(html, "</body></html>")?;
    Ok(html)
}

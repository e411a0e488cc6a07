//! In-process page views dispatched through the interceptor
//!
//! A minimal host: `/views/<page>` forwards to the named view, and views may
//! include each other with `{{include /other.jsp}}` directives. Every
//! dispatch goes through the [`DispatchInterceptor`](crate::interceptor::DispatchInterceptor)
//! and is recorded in the `jsp` counter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
};
use tracing::debug;

use super::AppState;
use crate::interceptor::{
    DispatchError, HostRequest, RequestDispatcher, ASYNC_DISPATCH_API_VERSION,
};

const INCLUDE_START: &str = "{{include ";
const INCLUDE_END: &str = "}}";
const MAX_INCLUDES: usize = 32;

/// A registered view
#[derive(Debug, Clone)]
pub enum View {
    /// Template text, possibly with include directives
    Page(String),
    /// A view whose rendering always fails with a host-level error
    Broken(String),
}

/// Views by path
#[derive(Debug, Clone)]
pub struct ViewRegistry {
    views: HashMap<String, View>,
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::new()
            .with_view("/header.jsp", View::Page("<header>reqmon</header>".into()))
            .with_view("/footer.jsp", View::Page("<footer>reqmon</footer>".into()))
            .with_view(
                "/index.jsp",
                View::Page("{{include /header.jsp}}<main>Hello</main>{{include /footer.jsp}}".into()),
            )
            .with_view("/broken.jsp", View::Broken("template engine unavailable".into()))
    }
}

impl ViewRegistry {
    /// Registry without views
    pub fn new() -> Self {
        Self {
            views: HashMap::new(),
        }
    }

    /// Register a view under `path`
    pub fn with_view(mut self, path: impl Into<String>, view: View) -> Self {
        self.views.insert(path.into(), view);
        self
    }

    fn get(&self, path: &str) -> Option<&View> {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        self.views.get(path)
    }
}

/// Output being built by a chain of dispatches
#[derive(Debug, Default)]
pub struct ViewExchange {
    /// Rendered body
    pub body: String,
    includes: usize,
}

/// A request of the view host
#[derive(Debug, Clone)]
pub struct ViewRequest {
    views: Arc<ViewRegistry>,
    api_version: u32,
}

impl ViewRequest {
    /// Request over `views`, with the latest dispatch API
    pub fn new(views: Arc<ViewRegistry>) -> Self {
        Self {
            views,
            api_version: ASYNC_DISPATCH_API_VERSION,
        }
    }

    /// Request advertising another dispatch API version
    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }
}

impl HostRequest for ViewRequest {
    type Dispatcher = ViewDispatcher;

    fn request_dispatcher(&self, path: &str) -> Option<ViewDispatcher> {
        let view = self.views.get(path)?.clone();
        Some(ViewDispatcher {
            path: path.to_string(),
            view,
        })
    }

    fn dispatch_api_version(&self) -> u32 {
        self.api_version
    }

    fn start_async(&self) -> Option<Self> {
        (self.api_version >= ASYNC_DISPATCH_API_VERSION).then(|| self.clone())
    }
}

/// Dispatcher rendering one view
#[derive(Debug)]
pub struct ViewDispatcher {
    path: String,
    view: View,
}

impl ViewDispatcher {
    /// Path the dispatcher was looked up with
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl RequestDispatcher for ViewDispatcher {
    type Exchange = ViewExchange;
    type Error = DispatchError;

    async fn include(&self, exchange: &mut ViewExchange) -> Result<(), DispatchError> {
        match &self.view {
            View::Page(template) => {
                exchange.body.push_str(template);
                Ok(())
            }
            View::Broken(reason) => Err(DispatchError::System(reason.clone())),
        }
    }

    async fn forward(&self, exchange: &mut ViewExchange) -> Result<(), DispatchError> {
        exchange.body.clear();
        self.include(exchange).await
    }
}

/// Expand the include directives of the exchange body, dispatching each one
/// through `request`; included text is expanded in turn
async fn expand_includes<R>(request: &R, exchange: &mut ViewExchange) -> Result<(), DispatchError>
where
    R: HostRequest,
    R::Dispatcher: RequestDispatcher<Exchange = ViewExchange, Error = DispatchError>,
{
    while let Some(start) = exchange.body.find(INCLUDE_START) {
        let Some(length) = exchange.body[start..].find(INCLUDE_END) else {
            return Err(DispatchError::Functional("unterminated include".into()));
        };
        if exchange.includes >= MAX_INCLUDES {
            return Err(DispatchError::Functional("too many includes".into()));
        }
        exchange.includes += 1;
        let path = exchange.body[start + INCLUDE_START.len()..start + length]
            .trim()
            .to_string();
        let dispatcher = request
            .request_dispatcher(&path)
            .ok_or_else(|| DispatchError::Functional(format!("view not found: {path}")))?;

        let mut included = ViewExchange::default();
        dispatcher.include(&mut included).await?;
        exchange
            .body
            .replace_range(start..start + length + INCLUDE_END.len(), &included.body);
    }
    Ok(())
}

/// Render `/views/<page>` by forwarding to the view
pub async fn render_view(
    State(state): State<AppState>,
    Path(page): Path<String>,
) -> Result<Html<String>, (StatusCode, String)> {
    let request = state.interceptor.wrap(ViewRequest::new(Arc::clone(&state.views)));
    let path = format!("/{page}");
    let dispatcher = request
        .request_dispatcher(&path)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("View not found: {path}")))?;
    debug!(path = %path, timed = dispatcher.is_timed(), "Rendering view");

    let mut exchange = ViewExchange::default();
    let rendered = match dispatcher.forward(&mut exchange).await {
        Ok(()) => expand_includes(&request, &mut exchange).await,
        Err(error) => Err(error),
    };
    match rendered {
        Ok(()) => Ok(Html(exchange.body)),
        Err(error @ DispatchError::System(_)) => {
            Err((StatusCode::INTERNAL_SERVER_ERROR, error.to_string()))
        }
        Err(error @ DispatchError::Functional(_)) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, error.to_string()))
        }
    }
}

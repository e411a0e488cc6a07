//! Error log entries kept by error counters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest message kept, in characters
pub const MESSAGE_MAX_LENGTH: usize = 1000;

/// Longest stack trace kept, in characters
pub const STACK_TRACE_MAX_LENGTH: usize = 50_000;

/// An error recorded by an error counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterError {
    /// When the error happened
    pub time: DateTime<Utc>,

    /// Authenticated user of the failing request, if any
    pub remote_user: Option<String>,

    /// Failing HTTP request ("/path GET"), if any
    pub http_request: Option<String>,

    /// Error message
    pub message: String,

    /// Stack trace or error chain
    pub stack_trace: Option<String>,
}

impl CounterError {
    /// Create an error entry timestamped now
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            remote_user: None,
            http_request: None,
            message: truncate(message.into(), MESSAGE_MAX_LENGTH),
            stack_trace: None,
        }
    }

    /// Attach the failing HTTP request
    pub fn with_http_request(mut self, http_request: impl Into<String>) -> Self {
        self.http_request = Some(http_request.into());
        self
    }

    /// Attach the user of the failing request
    pub fn with_remote_user(mut self, remote_user: impl Into<String>) -> Self {
        self.remote_user = Some(remote_user.into());
        self
    }

    /// Attach a stack trace
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(truncate(stack_trace.into(), STACK_TRACE_MAX_LENGTH));
        self
    }

    /// Override the timestamp
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }
}

fn truncate(mut text: String, max_chars: usize) -> String {
    if let Some((index, _)) = text.char_indices().nth(max_chars) {
        text.truncate(index);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_message_is_truncated() {
        let error = CounterError::new("é".repeat(MESSAGE_MAX_LENGTH + 10));
        assert_eq!(error.message.chars().count(), MESSAGE_MAX_LENGTH);
    }

    #[test]
    fn test_builder() {
        let error = CounterError::new("boom")
            .with_http_request("/orders GET")
            .with_remote_user("alice")
            .with_stack_trace("at orders::list");

        assert_eq!(error.http_request.as_deref(), Some("/orders GET"));
        assert_eq!(error.remote_user.as_deref(), Some("alice"));
        assert_eq!(error.stack_trace.as_deref(), Some("at orders::list"));
    }
}

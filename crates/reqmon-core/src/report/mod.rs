//! HTML reports
//!
//! Reports write HTML fragments into any [`std::fmt::Write`] sink. Labels are
//! emitted as `#Key#` placeholder tokens, resolved by a later localization
//! step; messages taking arguments go through [`Messages`].

mod counter;
mod errors;
mod table;

pub use counter::{hits_per_minute, percentage, sla_html_class, HtmlCounterReport, SlaClass};
pub use errors::HtmlCounterErrorReport;
pub use table::HtmlTable;

use std::fmt::Write;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::collector::{Counter, SQL_COUNTER_NAME};
use crate::config::MonitoringConfig;
use crate::error::Result;
use crate::models::Range;

static SQL_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(select|from|where|order by|group by|update|delete|insert into|values)\b")
        .unwrap_or_else(|e| unreachable!("invalid SQL keywords pattern: {e}"))
});

/// Separator between links of the throughput line
pub(crate) const LINK_SEPARATOR: &str = "&nbsp;&nbsp;&nbsp;&nbsp;&nbsp;";

/// Render the report of one counter over a range
pub fn render(counter: &Counter, range: &Range, config: &MonitoringConfig) -> Result<String> {
    let options = ReportOptions {
        pdf_enabled: config.pdf_enabled,
        ..ReportOptions::default()
    };
    let mut html = String::new();
    HtmlCounterReport::new(counter, *range, config, &options).to_html(&mut html)?;
    Ok(html)
}

/// Resolution of messages taking arguments
pub trait Messages: Send + Sync {
    /// Message `key` with `{0}`, `{1}`... replaced by `args`
    fn formatted(&self, key: &str, args: &[&str]) -> String;
}

/// English messages; unknown keys are left as `#key#` tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMessages;

impl DefaultMessages {
    fn template(key: &str) -> Option<&'static str> {
        let template = match key {
            "nb_requests" => "{0} hits/min on {1} requests",
            "nb_jobs" => "{0} executions/min on {1} jobs",
            "nb_errors" => "{0} errors/min on {1} errors",
            "child_hits_mean" => "Mean {0} hits",
            "child_time_mean" => "Mean {0} time (ms)",
            "clear_stats" => "Clear {0} statistics",
            "confirm_clear_stats" => "Confirm clearing of {0} statistics?",
            "last_errors_only" => "Only the last {0} errors are shown",
            _ => return None,
        };
        Some(template)
    }
}

impl Messages for DefaultMessages {
    fn formatted(&self, key: &str, args: &[&str]) -> String {
        let Some(template) = Self::template(key) else {
            return format!("#{key}#");
        };
        args.iter()
            .enumerate()
            .fold(template.to_string(), |message, (index, arg)| {
                message.replace(&format!("{{{index}}}"), arg)
            })
    }
}

/// Rendering settings supplied by the caller
pub struct ReportOptions<'a> {
    /// CSRF token appended to state-changing links
    pub csrf_token: Option<&'a str>,
    /// Show the PDF dependencies link
    pub pdf_enabled: bool,
    /// Message resolution
    pub messages: &'a dyn Messages,
    /// Reference instant for throughput computations
    pub now: DateTime<Utc>,
}

impl Default for ReportOptions<'_> {
    fn default() -> Self {
        Self {
            csrf_token: None,
            pdf_enabled: false,
            messages: &DefaultMessages,
            now: Utc::now(),
        }
    }
}

impl ReportOptions<'_> {
    /// `&amp;token=...` URL part, empty without a token
    pub fn csrf_token_url_part(&self) -> String {
        self.csrf_token
            .map(|token| format!("&amp;token={}", html_encode_but_not_space(token)))
            .unwrap_or_default()
    }
}

pub(crate) fn writeln(out: &mut impl Write, html: &str) -> Result<()> {
    out.write_str(html)?;
    out.write_char('\n')?;
    Ok(())
}

pub(crate) fn write_show_hide_link(out: &mut impl Write, id_to_show: &str, label: &str) -> Result<()> {
    writeln(
        out,
        &format!(
            "<a href='' class='showHide noPrint' data-show-hide-id='{id_to_show}' id='{id_to_show}A'>\
             <img id='{id_to_show}Img' src='?resource=bullets/plus.png' alt=''/> {label}</a>"
        ),
    )
}

/// Escape for HTML, spaces become `&nbsp;` and newlines `<br/>`
pub fn html_encode(text: &str) -> String {
    html_encode_but_not_space(text).replace(' ', "&nbsp;")
}

/// Escape for HTML keeping spaces, newlines become `<br/>`
pub fn html_encode_but_not_space(text: &str) -> String {
    html_encode_but_not_space_and_newline(text).replace('\n', "<br/>")
}

/// Escape for HTML keeping spaces and newlines
pub fn html_encode_but_not_space_and_newline(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => encoded.push_str("&amp;"),
            '<' => encoded.push_str("&lt;"),
            '>' => encoded.push_str("&gt;"),
            '\'' => encoded.push_str("&#39;"),
            '"' => encoded.push_str("&quot;"),
            '\r' => {}
            c => encoded.push(c),
        }
    }
    encoded
}

/// Escape a request name, highlighting SQL keywords of SQL requests
pub fn html_encode_request_name(request_id: &str, request_name: &str) -> String {
    let encoded = html_encode_but_not_space(request_name);
    if request_id.starts_with(SQL_COUNTER_NAME) {
        SQL_KEYWORDS
            .replace_all(&encoded, "<span class='sqlKeyword'>$1</span>")
            .into_owned()
    } else {
        encoded
    }
}

/// Integer with `,` thousands separators
pub fn format_integer(value: u64) -> String {
    let digits = value.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(digit);
    }
    formatted
}

/// Percentage with two decimals
pub fn format_percent(value: f64) -> String {
    format!("{value:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sql_keywords_highlighted() {
        let id = format!("{SQL_COUNTER_NAME}0123456789abcdef");
        let html = html_encode_request_name(&id, "select * from T where id=1");
        assert_eq!(
            html,
            "<span class='sqlKeyword'>select</span> * <span class='sqlKeyword'>from</span> T \
             <span class='sqlKeyword'>where</span> id=1"
        );
    }

    #[test]
    fn test_sql_keywords_case_insensitive_whole_words() {
        let html = html_encode_request_name("sql1", "SELECT selected FROM fromage ORDER  BY x");
        assert_eq!(html.matches("sqlKeyword").count(), 2);
        assert!(html.contains("<span class='sqlKeyword'>SELECT</span> selected"));
        assert!(html.contains("fromage"));
    }

    #[test]
    fn test_non_sql_names_not_highlighted() {
        let html = html_encode_request_name("http1234", "/select/from <where>");
        assert_eq!(html, "/select/from &lt;where&gt;");
    }

    #[test]
    fn test_html_encoding_variants() {
        assert_eq!(html_encode("a <b>\nc"), "a&nbsp;&lt;b&gt;<br/>c");
        assert_eq!(html_encode_but_not_space("a 'b'\nc"), "a &#39;b&#39;<br/>c");
        assert_eq!(html_encode_but_not_space_and_newline("a & b\nc"), "a &amp; b\nc");
    }

    #[test]
    fn test_format_integer() {
        assert_eq!(format_integer(0), "0");
        assert_eq!(format_integer(999), "999");
        assert_eq!(format_integer(1_000), "1,000");
        assert_eq!(format_integer(12_345_678), "12,345,678");
    }

    #[test]
    fn test_default_messages() {
        let messages = DefaultMessages;
        assert_eq!(
            messages.formatted("nb_requests", &["120", "3"]),
            "120 hits/min on 3 requests"
        );
        assert_eq!(messages.formatted("unknown_key", &["x"]), "#unknown_key#");
    }

    #[test]
    fn test_csrf_token_url_part() {
        let options = ReportOptions {
            csrf_token: Some("abc"),
            ..ReportOptions::default()
        };
        assert_eq!(options.csrf_token_url_part(), "&amp;token=abc");
        assert_eq!(ReportOptions::default().csrf_token_url_part(), "");
    }
}

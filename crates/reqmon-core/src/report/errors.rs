//! Error log of an error counter

use std::fmt::Write;

use super::{html_encode, writeln, HtmlTable, ReportOptions};
use crate::collector::Counter;
use crate::error::Result;
use crate::models::CounterError;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Table of the most recent errors of a counter
pub struct HtmlCounterErrorReport<'a> {
    counter: &'a Counter,
    options: &'a ReportOptions<'a>,
}

impl<'a> HtmlCounterErrorReport<'a> {
    /// Create the report of `counter`
    pub fn new(counter: &'a Counter, options: &'a ReportOptions<'a>) -> Self {
        Self { counter, options }
    }

    /// Write the error table, most recent first
    pub fn to_html(&self, out: &mut impl Write) -> Result<()> {
        let mut errors = self.counter.errors();
        if errors.is_empty() {
            return writeln(out, "#No_errors#");
        }
        errors.reverse();
        self.write_errors(out, &errors)
    }

    fn write_errors(&self, out: &mut impl Write, errors: &[CounterError]) -> Result<()> {
        let display_user = errors.iter().any(|error| error.remote_user.is_some());
        let display_http_request = errors.iter().any(|error| error.http_request.is_some());

        let max_errors_count = self.counter.max_errors_count();
        if errors.len() >= max_errors_count {
            out.write_str("<div class='severe' align='left'>")?;
            writeln(
                out,
                &self
                    .options
                    .messages
                    .formatted("last_errors_only", &[max_errors_count.to_string().as_str()]),
            )?;
            out.write_str("</div>")?;
        }

        let mut table = HtmlTable::new();
        table.begin_table(out, self.counter.name())?;
        out.write_str("<th class='sorttable_date'>#Date#</th>")?;
        if display_http_request {
            out.write_str("<th>#Request#</th>")?;
        }
        if display_user {
            out.write_str("<th>#User#</th>")?;
        }
        out.write_str("<th>#Error#</th>")?;
        for error in errors {
            table.next_row(out)?;
            write_error(out, error, display_user, display_http_request)?;
        }
        table.end_table(out)
    }
}

fn write_error(
    out: &mut impl Write,
    error: &CounterError,
    display_user: bool,
    display_http_request: bool,
) -> Result<()> {
    write!(out, "<td align='right'>{}", error.time.format(DATE_FORMAT))?;
    if display_http_request {
        out.write_str("</td><td class='wrappedText'>")?;
        write_optional(out, error.http_request.as_deref())?;
    }
    if display_user {
        out.write_str("</td><td class='wrappedText'>")?;
        write_optional(out, error.remote_user.as_deref())?;
    }
    match &error.stack_trace {
        Some(stack_trace) => write!(
            out,
            "</td><td><a class='tooltip'><em>{}</em>{}</a>",
            html_encode(stack_trace),
            html_encode(&error.message)
        )?,
        None => write!(out, "</td><td>{}", html_encode(&error.message))?,
    }
    out.write_str("</td>")?;
    Ok(())
}

fn write_optional(out: &mut impl Write, text: Option<&str>) -> Result<()> {
    match text {
        Some(text) => out.write_str(&html_encode(text))?,
        None => out.write_str("&nbsp;")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ERROR_COUNTER_NAME;
    use crate::models::RequestSample;

    #[test]
    fn test_no_errors() {
        let counter = Counter::new(ERROR_COUNTER_NAME, "error.png");
        let options = ReportOptions::default();
        let mut html = String::new();
        HtmlCounterErrorReport::new(&counter, &options)
            .to_html(&mut html)
            .unwrap();
        assert_eq!(html, "#No_errors#\n");
    }

    #[test]
    fn test_errors_table_columns() {
        let counter = Counter::new(ERROR_COUNTER_NAME, "error.png");
        counter.add_request_for_system_error(
            "500 /orders GET",
            &RequestSample::default(),
            CounterError::new("db <down>")
                .with_http_request("/orders GET")
                .with_stack_trace("at orders\nat main"),
        );
        counter.add_error(CounterError::new("second"));

        let options = ReportOptions::default();
        let mut html = String::new();
        HtmlCounterErrorReport::new(&counter, &options)
            .to_html(&mut html)
            .unwrap();

        assert!(html.contains("<th>#Request#</th>"));
        assert!(!html.contains("<th>#User#</th>"));
        assert!(html.contains("<em>at&nbsp;orders<br/>at&nbsp;main</em>db&nbsp;&lt;down&gt;"));
        // most recent first
        assert!(html.find("second").unwrap() < html.find("db&nbsp;").unwrap());
        assert!(!html.contains("#last_errors_only#"));
    }

    #[test]
    fn test_truncation_warning() {
        let counter = Counter::new(ERROR_COUNTER_NAME, "error.png").with_limits(10, 2);
        for i in 0..3 {
            counter.add_error(CounterError::new(format!("e{i}")));
        }

        let options = ReportOptions::default();
        let mut html = String::new();
        HtmlCounterErrorReport::new(&counter, &options)
            .to_html(&mut html)
            .unwrap();

        assert!(html.contains("Only the last 2 errors are shown"));
    }
}

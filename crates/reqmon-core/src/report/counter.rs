//! Report of one counter: summary, throughput, details and error log

use std::fmt::Write;

use super::{
    format_integer, format_percent, html_encode_but_not_space,
    html_encode_but_not_space_and_newline, html_encode_request_name, write_show_hide_link,
    writeln, HtmlCounterErrorReport, HtmlTable, ReportOptions, LINK_SEPARATOR,
};
use crate::collector::Counter;
use crate::config::MonitoringConfig;
use crate::error::Result;
use crate::models::{CounterRequest, CounterRequestAggregation, Range};

const NEXT_COLUMN: &str = "</td> <td align='right'>";

/// Display tier of a mean duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaClass {
    /// Below the warning threshold
    Info,
    /// Between the warning and severe thresholds
    Warning,
    /// At or above the severe threshold
    Severe,
}

impl SlaClass {
    /// CSS class name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Severe => "severe",
        }
    }
}

/// Classify a mean against the thresholds; a zero mean is always `Info`
pub fn sla_html_class(mean: u64, warning_threshold: u64, severe_threshold: u64) -> SlaClass {
    if mean < warning_threshold || mean == 0 {
        SlaClass::Info
    } else if mean < severe_threshold {
        SlaClass::Warning
    } else {
        SlaClass::Severe
    }
}

/// `numerator` as a rounded percentage of `denominator`, 0 when it is 0
pub fn percentage(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        return 0;
    }
    (100.0 * numerator as f64 / denominator as f64).round() as u64
}

/// Hits per minute over an elapsed time, which is clamped to at least 1 ms
pub fn hits_per_minute(hits: u64, elapsed_millis: i64) -> u64 {
    let elapsed_millis = u64::try_from(elapsed_millis.max(1)).unwrap_or(1);
    60_000 * hits / elapsed_millis
}

/// How request names link to other parts of the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameLink {
    Plain,
    Graph,
    Detail,
    SummaryPerClass,
}

/// HTML report of one counter over a range
pub struct HtmlCounterReport<'a> {
    counter: &'a Counter,
    range: Range,
    aggregation: CounterRequestAggregation,
    options: &'a ReportOptions<'a>,
}

impl<'a> HtmlCounterReport<'a> {
    /// Aggregate `counter` and prepare its report
    pub fn new(
        counter: &'a Counter,
        range: Range,
        config: &MonitoringConfig,
        options: &'a ReportOptions<'a>,
    ) -> Self {
        Self {
            counter,
            range,
            aggregation: CounterRequestAggregation::new(counter, config),
            options,
        }
    }

    /// The aggregation the report is built from
    pub fn aggregation(&self) -> &CounterRequestAggregation {
        &self.aggregation
    }

    /// Whether detail rows carry a graph tooltip
    pub fn is_request_graph_displayed(counter: &Counter) -> bool {
        !(counter.is_error_counter() && !counter.is_job_counter())
            && !counter.is_jsp_or_struts_counter()
    }

    fn is_error_and_not_job_counter(&self) -> bool {
        self.counter.is_error_counter() && !self.counter.is_job_counter()
    }

    /// Write the whole counter report
    pub fn to_html(&self, out: &mut impl Write) -> Result<()> {
        let requests = self.aggregation.requests();
        if requests.is_empty() {
            return self.write_no_requests(out);
        }
        let counter_name = self.counter.name();

        if self.is_error_and_not_job_counter() {
            // rows are ordered by hits: the first one is the most frequent error
            self.write_requests(out, counter_name, &requests[..1], NameLink::Detail)?;
        } else {
            let global = self.aggregation.global_request();
            let summary = [
                global,
                self.aggregation.warning_request(),
                self.aggregation.severe_request(),
            ];
            self.write_requests(out, &global.name, summary, NameLink::Plain)?;
        }

        self.write_size_and_links(out, requests.len())?;

        writeln(out, &format!("<div id='details{counter_name}' class='displayNone'>"))?;
        let link = if Self::is_request_graph_displayed(self.counter) {
            NameLink::Graph
        } else {
            NameLink::Detail
        };
        self.write_requests(out, counter_name, requests, link)?;
        writeln(out, "</div>")?;

        if self.counter.is_error_counter() {
            writeln(out, &format!("<div id='logs{counter_name}' class='displayNone'><div>"))?;
            HtmlCounterErrorReport::new(self.counter, self.options).to_html(out)?;
            writeln(out, "</div></div>")?;
        }
        Ok(())
    }

    /// Write the summary per class, or the requests of one class
    pub fn write_requests_aggregated_or_filtered_by_class_name(
        &self,
        out: &mut impl Write,
        request_id: Option<&str>,
    ) -> Result<()> {
        let requests = self
            .aggregation
            .requests_aggregated_or_filtered_by_class_name(request_id)?;
        let link = match request_id {
            None => NameLink::SummaryPerClass,
            Some(_) => NameLink::Graph,
        };
        self.write_requests(out, self.counter.name(), &requests, link)
    }

    /// Hits per minute of the counter over the report range
    pub fn hits_per_minute(&self) -> u64 {
        let now = self.options.now;
        let end = self.range.end_date().map_or(now, |end| end.min(now));
        let elapsed = end - self.counter.start_date();
        hits_per_minute(self.aggregation.global_request().hits(), elapsed.num_milliseconds())
    }

    fn write_no_requests(&self, out: &mut impl Write) -> Result<()> {
        if self.counter.is_job_counter() {
            writeln(out, "#No_jobs#")
        } else if self.counter.is_error_counter() {
            writeln(out, "#No_errors#")
        } else {
            writeln(out, "#No_requests#")
        }
    }

    fn write_size_and_links(&self, out: &mut impl Write, request_count: usize) -> Result<()> {
        let counter_name = self.counter.name();
        let messages = self.options.messages;

        writeln(out, "<div align='right'>")?;
        let key = if self.counter.is_job_counter() {
            "nb_jobs"
        } else if self.counter.is_error_counter() {
            "nb_errors"
        } else {
            "nb_requests"
        };
        let hits_per_minute = format_integer(self.hits_per_minute());
        let request_count = format_integer(request_count as u64);
        writeln(
            out,
            &messages.formatted(key, &[hits_per_minute.as_str(), request_count.as_str()]),
        )?;

        if self.counter.is_business_facade_counter() {
            writeln(out, LINK_SEPARATOR)?;
            writeln(
                out,
                &format!(
                    "<a href='?part=counterSummaryPerClass&amp;counter={counter_name}' \
                     class='noPrint'>#Summary_per_class#</a>"
                ),
            )?;
            if self.options.pdf_enabled {
                writeln(out, LINK_SEPARATOR)?;
                writeln(
                    out,
                    &format!(
                        "<a href='?part=runtimeDependencies&amp;format=pdf&amp;counter={counter_name}' \
                         class='noPrint'>#Dependencies#</a>"
                    ),
                )?;
            }
        }
        writeln(out, LINK_SEPARATOR)?;
        write_show_hide_link(out, &format!("details{counter_name}"), "#Details#")?;
        if self.counter.is_error_counter() {
            writeln(out, LINK_SEPARATOR)?;
            write_show_hide_link(out, &format!("logs{counter_name}"), "#Last_errors#")?;
        }
        writeln(out, LINK_SEPARATOR)?;
        if self.range.is_all() {
            let title = messages.formatted("clear_stats", &[counter_name]);
            let confirm = messages.formatted("confirm_clear_stats", &[counter_name]);
            writeln(
                out,
                &format!(
                    "<a href='?action=clear_counter&amp;counter={counter_name}{}' title='{}'",
                    self.options.csrf_token_url_part(),
                    html_encode_but_not_space_and_newline(&title)
                ),
            )?;
            writeln(
                out,
                &format!(
                    "class='confirm noPrint' data-confirm='{}'>#Reset#</a>",
                    html_encode_but_not_space_and_newline(&confirm)
                ),
            )?;
        }
        writeln(out, "</div>")
    }

    fn write_requests<'r>(
        &self,
        out: &mut impl Write,
        table_name: &str,
        requests: impl IntoIterator<Item = &'r CounterRequest>,
        link: NameLink,
    ) -> Result<()> {
        let mut table = HtmlTable::new();
        table.begin_table(out, table_name)?;
        self.write_table_head(out)?;
        for request in requests {
            table.next_row(out)?;
            self.write_request(out, request, link)?;
        }
        table.end_table(out)
    }

    fn write_table_head(&self, out: &mut impl Write) -> Result<()> {
        let aggregation = &self.aggregation;
        if self.counter.is_job_counter() {
            out.write_str("<th>#Job#</th>")?;
        } else if self.counter.is_error_counter() {
            out.write_str("<th>#Error#</th>")?;
        } else {
            out.write_str("<th>#Request#</th>")?;
        }
        if aggregation.is_times_displayed() {
            out.write_str("<th class='sorttable_numeric'>#Cumulative_time#</th>")?;
            out.write_str("<th class='sorttable_numeric'>#Hits#</th>")?;
            out.write_str("<th class='sorttable_numeric'>#Mean_time#</th>")?;
            out.write_str("<th class='sorttable_numeric'>#Max_time#</th>")?;
            out.write_str("<th class='sorttable_numeric'>#Standard_deviation#</th>")?;
        } else {
            out.write_str("<th class='sorttable_numeric'>#Hits#</th>")?;
        }
        if aggregation.is_cpu_times_displayed() {
            out.write_str("<th class='sorttable_numeric'>#Cumulative_cpu_time#</th>")?;
            out.write_str("<th class='sorttable_numeric'>#Mean_cpu_time#</th>")?;
        }
        if aggregation.is_allocated_kbytes_displayed() {
            out.write_str("<th class='sorttable_numeric'>#Mean_allocated_kb#</th>")?;
        }
        if !self.is_error_and_not_job_counter() {
            out.write_str("<th class='sorttable_numeric'>#System_errors#</th>")?;
        }
        if aggregation.is_response_size_displayed() {
            out.write_str("<th class='sorttable_numeric'>#Mean_size#</th>")?;
        }
        if aggregation.is_child_hits_displayed() {
            let child = self.counter.child_counter_name().unwrap_or_default();
            let messages = self.options.messages;
            write!(
                out,
                "<th class='sorttable_numeric'>{}</th><th class='sorttable_numeric'>{}</th>",
                messages.formatted("child_hits_mean", &[child]),
                messages.formatted("child_time_mean", &[child])
            )?;
        }
        Ok(())
    }

    fn write_request(&self, out: &mut impl Write, request: &CounterRequest, link: NameLink) -> Result<()> {
        let aggregation = &self.aggregation;
        let global = aggregation.global_request();

        out.write_str("<td class='wrappedText'>")?;
        self.write_request_name(out, request, link)?;
        if aggregation.is_times_displayed() {
            out.write_str(NEXT_COLUMN)?;
            write!(out, "{}", percentage(request.durations_sum(), global.durations_sum()))?;
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_integer(request.hits()))?;
            out.write_str(NEXT_COLUMN)?;
            self.write_sla_value(out, request.mean())?;
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_integer(request.maximum()))?;
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_integer(request.standard_deviation()))?;
        } else {
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_integer(request.hits()))?;
        }
        if aggregation.is_cpu_times_displayed() {
            out.write_str(NEXT_COLUMN)?;
            write!(out, "{}", percentage(request.cpu_time_sum(), global.cpu_time_sum()))?;
            out.write_str(NEXT_COLUMN)?;
            self.write_sla_value(out, request.cpu_time_mean().unwrap_or(0))?;
        }
        if aggregation.is_allocated_kbytes_displayed() {
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_integer(request.allocated_kbytes_mean().unwrap_or(0)))?;
        }
        if !self.is_error_and_not_job_counter() {
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_percent(request.system_error_percentage()))?;
        }
        if aggregation.is_response_size_displayed() {
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_integer(request.response_size_mean().unwrap_or(0) / 1024))?;
        }
        if aggregation.is_child_hits_displayed() {
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_integer(request.child_hits_mean()))?;
            out.write_str(NEXT_COLUMN)?;
            out.write_str(&format_integer(request.child_durations_mean()))?;
        }
        out.write_str("</td>")?;
        Ok(())
    }

    fn write_sla_value(&self, out: &mut impl Write, mean: u64) -> Result<()> {
        let class = sla_html_class(
            mean,
            self.aggregation.warning_threshold(),
            self.aggregation.severe_threshold(),
        );
        write!(out, "<span class='{}'>{}</span>", class.as_str(), format_integer(mean))?;
        Ok(())
    }

    fn write_request_name(&self, out: &mut impl Write, request: &CounterRequest, link: NameLink) -> Result<()> {
        let id = html_encode_but_not_space(&request.id);
        let name = html_encode_request_name(&request.id, &request.name);
        match link {
            NameLink::Plain => out.write_str(&name)?,
            NameLink::Graph => write!(
                out,
                "<a class='tooltip' href='?part=graph&amp;graph={id}'>\
                 <em><img src='?width=100&amp;height=50&amp;graph={id}&amp;period={}' \
                 alt='' width='100' height='50'/></em>{name}</a>",
                html_encode_but_not_space(&self.range.code())
            )?,
            NameLink::Detail => write!(out, "<a href='?part=graph&amp;graph={id}'>{name}</a>")?,
            NameLink::SummaryPerClass => write!(
                out,
                "<a href='?part=counterSummaryPerClass&amp;counter={}&amp;graph={id}'>{name}</a> ",
                self.counter.name()
            )?,
        }
        Ok(())
    }
}

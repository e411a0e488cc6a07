//! Reporting time windows

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Separator between the two dates of a custom range code
pub const CUSTOM_PERIOD_SEPARATOR: char = '|';

/// Named reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Last 24 hours
    #[default]
    Day,
    /// Last 7 days
    Week,
    /// Last 31 days
    Month,
    /// Last 366 days
    Year,
    /// Since the counter was started
    All,
}

impl Period {
    /// Every period, shortest first
    pub const ALL: [Period; 5] = [Self::Day, Self::Week, Self::Month, Self::Year, Self::All];

    /// Code used in URLs
    pub fn code(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::All => "all",
        }
    }

    /// Length of the period (None for `All`)
    pub fn duration(self) -> Option<Duration> {
        match self {
            Self::Day => Some(Duration::days(1)),
            Self::Week => Some(Duration::days(7)),
            Self::Month => Some(Duration::days(31)),
            Self::Year => Some(Duration::days(366)),
            Self::All => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|period| period.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::validation(format!("unknown period: {s}")))
    }
}

/// A reporting window: a named period or a custom date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Range {
    /// Named period ending now
    Period(Period),
    /// Custom range between two instants
    Custom {
        /// Start of the range
        start: DateTime<Utc>,
        /// End of the range
        end: DateTime<Utc>,
    },
}

impl Default for Range {
    fn default() -> Self {
        Self::Period(Period::default())
    }
}

impl Range {
    /// Range of a named period
    pub fn period(period: Period) -> Self {
        Self::Period(period)
    }

    /// Custom range, rejecting an end before the start
    pub fn custom(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(Error::validation(format!(
                "range end {end} is before range start {start}"
            )));
        }
        Ok(Self::Custom { start, end })
    }

    /// Custom range from the start of `start` to the end of `end`
    pub fn custom_days(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
            .ok_or_else(|| Error::internal("invalid end of day"))?;
        Self::custom(
            start.and_time(NaiveTime::MIN).and_utc(),
            end.and_time(end_of_day).and_utc(),
        )
    }

    /// Parse a range code: a period code or `yyyy-mm-dd|yyyy-mm-dd`
    pub fn parse(code: &str) -> Result<Self> {
        match code.split_once(CUSTOM_PERIOD_SEPARATOR) {
            Some((start, end)) => Self::custom_days(parse_date(start)?, parse_date(end)?),
            None => Ok(Self::Period(code.parse()?)),
        }
    }

    /// The named period, if any
    pub fn get_period(&self) -> Option<Period> {
        match self {
            Self::Period(period) => Some(*period),
            Self::Custom { .. } => None,
        }
    }

    /// Whether this range is the `All` period
    pub fn is_all(&self) -> bool {
        self.get_period() == Some(Period::All)
    }

    /// The end date of a custom range (named periods end now)
    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Period(_) => None,
            Self::Custom { end, .. } => Some(*end),
        }
    }

    /// The start date relative to `now` (None for the `All` period)
    pub fn start_date(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Period(period) => period.duration().map(|duration| now - duration),
            Self::Custom { start, .. } => Some(*start),
        }
    }

    /// Code used in URLs
    pub fn code(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Period(period) => write!(f, "{period}"),
            Self::Custom { start, end } => write!(
                f,
                "{}{CUSTOM_PERIOD_SEPARATOR}{}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
        }
    }
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|e| Error::validation(format!("invalid date '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_period() {
        assert_eq!(Range::parse("week").unwrap(), Range::Period(Period::Week));
        assert_eq!(Range::parse("ALL").unwrap(), Range::Period(Period::All));
        assert!(Range::parse("fortnight").is_err());
    }

    #[test]
    fn test_parse_custom_range() {
        let range = Range::parse("2024-01-01|2024-01-31").unwrap();

        assert_eq!(range.get_period(), None);
        assert_eq!(
            range.end_date().unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
        assert_eq!(range.code(), "2024-01-01|2024-01-31");
    }

    #[test]
    fn test_custom_range_rejects_reversed_dates() {
        assert!(Range::parse("2024-02-01|2024-01-01").is_err());
    }

    #[test]
    fn test_period_end_date_is_none() {
        let range = Range::period(Period::Day);
        assert_eq!(range.end_date(), None);
        assert!(!range.is_all());
        assert!(Range::period(Period::All).is_all());
    }

    #[test]
    fn test_start_date() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            Range::period(Period::Week).start_date(now),
            Some(Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap())
        );
        assert_eq!(Range::period(Period::All).start_date(now), None);
    }
}

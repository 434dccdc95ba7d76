//! Date handling shared by the pipelines.
//!
//! Both the notice parser and the feed regenerator accept a handful of date
//! spellings. Each call site owns an ordered list of [`DatePattern`]s and
//! [`parse_first`] takes the first one that parses; what happens when none
//! parse is decided by the caller.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use regex::Regex;
use std::sync::OnceLock;

/// One way of reading a date out of a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePattern {
    /// Date only; the time is midnight.
    Date(&'static str),
    /// Date and time without an offset.
    DateTime(&'static str),
    /// Date and time with a `%z` offset; the wall-clock time at that offset is kept.
    Zoned(&'static str),
    /// `YYYY-MM-DD` before a `T` separator, whatever follows it.
    IsoDatePrefix,
    /// A leading `Day, ` (RFC 822) that is skipped unchecked; the rest goes to the inner pattern.
    WeekdayPrefixed(&'static DatePattern),
}

impl DatePattern {
    pub fn parse(&self, input: &str) -> Option<NaiveDateTime> {
        match *self {
            DatePattern::Date(fmt) => NaiveDate::parse_from_str(input, fmt)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            DatePattern::DateTime(fmt) => NaiveDateTime::parse_from_str(input, fmt).ok(),
            DatePattern::Zoned(fmt) => DateTime::parse_from_str(input, fmt)
                .ok()
                .map(|dt| dt.naive_local()),
            DatePattern::IsoDatePrefix => {
                let (prefix, _) = input.split_once('T')?;
                NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }
            DatePattern::WeekdayPrefixed(inner) => {
                let (day, rest) = input.split_once(',')?;
                if day.len() != 3 || !day.chars().all(|c| c.is_ascii_alphabetic()) {
                    return None;
                }
                inner.parse(rest.trim_start())
            }
        }
    }
}

/// Try each pattern in order and return the first successful parse.
pub fn parse_first(input: &str, patterns: &[DatePattern]) -> Option<NaiveDateTime> {
    let input = input.trim();
    patterns.iter().find_map(|pattern| pattern.parse(input))
}

/// Publication dates seen in school notice feeds.
pub const NOTICE_DATE_PATTERNS: &[DatePattern] = &[
    // Wed, 02 Jul 2025 23:17:42 GMT
    DatePattern::WeekdayPrefixed(&DatePattern::DateTime("%d %b %Y %H:%M:%S GMT")),
    // 2025-09-25T19:16:27
    DatePattern::IsoDatePrefix,
    // Tue, 24 Jun 2025 10:30:00 +0900
    DatePattern::WeekdayPrefixed(&DatePattern::Zoned("%d %b %Y %H:%M:%S %z")),
    DatePattern::DateTime("%Y-%m-%d %H:%M:%S"),
];

/// Notice dates as stored in an envelope.
pub const ENTRY_DATE_PATTERNS: &[DatePattern] = &[
    DatePattern::Date("%Y-%m-%d"),
    DatePattern::Date("%Y.%m.%d"),
    DatePattern::Date("%Y/%m/%d"),
    DatePattern::DateTime("%Y-%m-%d %H:%M"),
    DatePattern::DateTime("%Y.%m.%d %H:%M"),
    DatePattern::DateTime("%Y/%m/%d %H:%M"),
    DatePattern::DateTime("%Y-%m-%d %H:%M:%S"),
];

fn loose_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4})[-./](\d{1,2})[-./](\d{1,2})").expect("valid date regex")
    })
}

/// Normalize a feed `pubDate` to `YYYY-MM-DD`.
///
/// When no pattern matches, the first `YYYY-MM-DD`-like run in the text is
/// used; failing that the raw text is returned untouched.
pub fn normalize_notice_date(raw: &str) -> String {
    if let Some(parsed) = parse_first(raw, NOTICE_DATE_PATTERNS) {
        return parsed.format("%Y-%m-%d").to_string();
    }

    loose_date_regex()
        .captures_iter(raw)
        .find_map(|caps| {
            let year = caps[1].parse().ok()?;
            let month = caps[2].parse().ok()?;
            let day = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// The school week to show on `today`: this week, or next week on weekends.
pub fn week_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = match today.weekday() {
        Weekday::Sat | Weekday::Sun => {
            today + Duration::days(7 - i64::from(today.weekday().num_days_from_monday()))
        }
        weekday => today - Duration::days(i64::from(weekday.num_days_from_monday())),
    };
    (monday, monday + Duration::days(4))
}

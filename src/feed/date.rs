//! Best-effort parsing of the date strings found in RSS and Atom feeds.
//!
//! Feeds in the wild mix RFC 822 dates with named zones, ISO 8601 with or
//! without fractional seconds, and locale-specific layouts. [`parse_date`]
//! tries each family in order and returns the first match. Patterns without
//! an offset are read as UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Named zones seen in RFC 822 dates, with their offsets in `+hhmm` form.
const NAMED_ZONES: &[(&str, &str)] = &[
    ("UT", "+0000"),
    ("UTC", "+0000"),
    ("GMT", "+0000"),
    ("Z", "+0000"),
    ("EST", "-0500"),
    ("EDT", "-0400"),
    ("CST", "-0600"),
    ("CDT", "-0500"),
    ("MST", "-0700"),
    ("MDT", "-0600"),
    ("PST", "-0800"),
    ("PDT", "-0700"),
    ("BST", "+0100"),
    ("CET", "+0100"),
    ("CEST", "+0200"),
    ("EET", "+0200"),
    ("EEST", "+0300"),
    ("IST", "+0530"),
    ("JST", "+0900"),
    ("KST", "+0900"),
    ("AEST", "+1000"),
    ("AEDT", "+1100"),
];

/// RFC 822 bodies after the weekday has been stripped and the zone made numeric.
/// `%B` accepts both full and abbreviated month names when parsing.
const RFC822_FORMATS: &[&str] = &["%d %B %Y %H:%M:%S %z", "%d %B %Y %H:%M %z"];
const RFC822_SHORT_YEAR_FORMATS: &[&str] = &["%d %B %y %H:%M:%S %z", "%d %B %y %H:%M %z"];

const ISO_OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
];
const ISO_NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

const SEPARATED_OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%.f%:z"];
const SEPARATED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y年%m月%d日 %H:%M:%S",
    "%Y年%m月%d日 %H:%M",
    "%Y年%m月%d日%H:%M:%S",
];

const DATE_ONLY_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y年%m月%d日",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%B %d, %Y",
];

/// Parses a feed date string, returning `None` when no known pattern matches.
///
/// Never panics. Callers decide the fallback (the parser uses "now").
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    parse_rfc822(text)
        .or_else(|| parse_iso8601(text))
        .or_else(|| parse_separated(text))
        .or_else(|| parse_date_only(text))
}

fn parse_rfc822(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc));
    }

    // Weekday names are informational and often wrong; drop them.
    let body = match text.split_once(',') {
        Some((weekday, rest)) if weekday.chars().all(|c| c.is_ascii_alphabetic()) => rest.trim(),
        _ => text,
    };
    let body = numeric_zone(body)?;

    let short_year = body
        .split_whitespace()
        .nth(2)
        .is_some_and(|year| year.len() == 2);
    let formats = if short_year {
        RFC822_SHORT_YEAR_FORMATS
    } else {
        RFC822_FORMATS
    };

    formats
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(&body, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Replaces a trailing named zone with its numeric offset.
///
/// Returns `None` for a trailing alphabetic token that is not a known zone,
/// since no RFC 822 pattern could match it.
fn numeric_zone(body: &str) -> Option<String> {
    let (head, zone) = body.rsplit_once(' ')?;
    if zone.starts_with('+') || zone.starts_with('-') {
        return Some(body.to_string());
    }
    if !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        // Zone-less RFC 822 dates are read as UTC
        return Some(format!("{body} +0000"));
    }
    NAMED_ZONES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(zone))
        .map(|(_, offset)| format!("{head} {offset}"))
}

fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    parse_with_offset(text, ISO_OFFSET_FORMATS).or_else(|| parse_naive(text, ISO_NAIVE_FORMATS))
}

fn parse_separated(text: &str) -> Option<DateTime<Utc>> {
    parse_with_offset(text, SEPARATED_OFFSET_FORMATS)
        .or_else(|| parse_naive(text, SEPARATED_FORMATS))
}

fn parse_date_only(text: &str) -> Option<DateTime<Utc>> {
    DATE_ONLY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_with_offset(text: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    formats
        .iter()
        .find_map(|fmt| DateTime::<FixedOffset>::parse_from_str(text, fmt).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_naive(text: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    formats
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

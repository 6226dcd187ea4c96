//! Human-readable rendering of backend timestamps.
//!
//! The backend passes epoch-millisecond strings through from the upstream
//! API; credentials that never expire carry `"-1"`.

use chrono::{DateTime, SecondsFormat, Utc};

pub const NOT_AVAILABLE: &str = "N/A";
pub const NEVER: &str = "-Never-";

/// Render a credential expiry: ISO-8601 plus a relative phrase, e.g.
/// `2025-06-01T00:00:00.000Z (in 2 months)`.
pub fn format_expiry(value: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return NOT_AVAILABLE.to_owned();
    };
    if value == "-1" {
        return NEVER.to_owned();
    }
    let Some(at) = parse_epoch_millis(value)
        .filter(|ms| *ms > 0)
        .and_then(DateTime::from_timestamp_millis)
    else {
        tracing::debug!(value, "unparseable expiry timestamp");
        return format!("Invalid/Unknown ({value})");
    };
    format!(
        "{} ({})",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        relative_time(at, now)
    )
}

/// Render a creation/modification timestamp.
pub fn format_timestamp(value: Option<&str>) -> String {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return NOT_AVAILABLE.to_owned();
    };
    match parse_epoch_millis(value).and_then(DateTime::from_timestamp_millis) {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "Invalid Date".to_owned(),
    }
}

/// Leading-integer parse of a millisecond timestamp, tolerating trailing
/// junk the way the upstream values sometimes carry it (`"1700000000000.0"`).
fn parse_epoch_millis(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(trimmed.len(), |(i, _)| i);
    trimmed[..end].parse().ok()
}

#[derive(Clone, Copy)]
enum Unit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl Unit {
    fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        }
    }
}

/// English relative-time phrase with "auto" numbering: `tomorrow`,
/// `last month`, `in 3 weeks`, `5 hours ago`, `now`.
pub fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    #[allow(clippy::cast_precision_loss)]
    let diff_ms = (at - now).num_milliseconds() as f64;

    let seconds = half_up(diff_ms / 1000.0);
    let minutes = half_up(seconds / 60.0);
    let hours = half_up(minutes / 60.0);
    let days = half_up(hours / 24.0);
    let weeks = half_up(days / 7.0);
    let months = half_up(days / 30.44);
    let years = half_up(days / 365.25);

    let (amount, unit) = [
        (years, Unit::Year),
        (months, Unit::Month),
        (weeks, Unit::Week),
        (days, Unit::Day),
        (hours, Unit::Hour),
        (minutes, Unit::Minute),
    ]
    .into_iter()
    .find(|(n, _)| n.abs() >= 1.0)
    .unwrap_or((seconds, Unit::Second));

    #[allow(clippy::cast_possible_truncation)]
    phrase(amount as i64, unit)
}

/// Round half toward positive infinity.
fn half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

fn phrase(amount: i64, unit: Unit) -> String {
    let name = unit.name();
    match (amount, unit) {
        (0, Unit::Second) => "now".to_owned(),
        (1, Unit::Day) => "tomorrow".to_owned(),
        (-1, Unit::Day) => "yesterday".to_owned(),
        (1, Unit::Week | Unit::Month | Unit::Year) => format!("next {name}"),
        (-1, Unit::Week | Unit::Month | Unit::Year) => format!("last {name}"),
        (n, _) if n > 0 => format!("in {n} {}", plural(name, n)),
        (n, _) => format!("{} {} ago", -n, plural(name, -n)),
    }
}

fn plural(name: &str, n: i64) -> String {
    if n == 1 {
        name.to_owned()
    } else {
        format!("{name}s")
    }
}

//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parses an instant into epoch milliseconds.
///
/// Supports:
/// - Epoch milliseconds: "1636978760263"
/// - RFC 3339: "2021-11-15T12:19:20Z"
/// - Relative to `now`: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_instant(s: &str, now: DateTime<Utc>) -> anyhow::Result<i64> {
    let s = s.trim();
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s
            .parse()
            .with_context(|| format!("timestamp out of range: {s}"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid time: {s}. Use epoch milliseconds, RFC 3339 (e.g., 2021-11-15T12:00:00Z) or relative (e.g., '2 days ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    let duration = Duration::minutes(n * minutes_per_unit);
    Ok((now - duration).timestamp_millis())
}

/// Formats epoch milliseconds as RFC 3339 (UTC), falling back to the raw value.
pub fn format_instant(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ts)
        .map_or_else(|| ts.to_string(), |dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

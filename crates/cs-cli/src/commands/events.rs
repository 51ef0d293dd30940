//! Events command for listing stored weighing events.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use cs_core::keys::DATE_FORMAT;
use cs_db::Database;

/// Lists the events stored under a UTC date partition, oldest first.
pub fn run<W: Write>(writer: &mut W, db: &Database, date: Option<&str>, json: bool) -> Result<()> {
    let date = match date {
        Some(date) => {
            NaiveDate::parse_from_str(date, DATE_FORMAT)
                .with_context(|| format!("invalid date {date}, expected YYYY.MM.DD"))?;
            date.to_string()
        }
        None => Utc::now().format(DATE_FORMAT).to_string(),
    };
    let events = db.events_on(&date)?;

    if json {
        for event in &events {
            let line = serde_json::to_string(event).context("failed to serialize event")?;
            writeln!(writer, "{line}")?;
        }
        return Ok(());
    }

    if events.is_empty() {
        writeln!(writer, "No events on {date}.")?;
        return Ok(());
    }
    for event in &events {
        let label = event
            .cat
            .as_ref()
            .map_or_else(|| "(unlabeled)".to_string(), ToString::to_string);
        writeln!(
            writer,
            "{} {} (local {} {})  {} over {}s  {}",
            event.date_utc,
            event.time_utc,
            event.date_local,
            event.time_local,
            event.weight,
            event.elapsed_sec,
            label
        )?;
    }
    Ok(())
}

//! Ingest command: store raw readings and run the pipeline on the new ones.
//!
//! Mirrors what the deployed triggers do, in-process: every newly stored
//! reading goes through the reading stage, and every event that produces
//! goes through the event stage right away.

use std::fmt;
use std::io::BufRead;

use anyhow::{Context, Result};
use cs_core::Reading;
use cs_core::trigger::{on_event, on_reading};
use cs_db::Database;

use crate::Config;

/// What one ingest run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Readings parsed from the input.
    pub readings: usize,
    /// Readings that were not already stored.
    pub stored: usize,
    /// Events created from the stored readings.
    pub events: usize,
    /// Events that received a label.
    pub labeled: usize,
    /// Readings or events the pipeline failed on.
    pub failed: usize,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stored {} of {} readings; created {} events, labeled {}.",
            self.stored, self.readings, self.events, self.labeled
        )?;
        if self.failed > 0 {
            write!(f, " {} failed.", self.failed)?;
        }
        Ok(())
    }
}

pub fn run<R: BufRead>(reader: R, db: &mut Database, config: &Config) -> Result<IngestSummary> {
    let extractor = config.extractor_config()?;
    let classifier = config.classifier_config()?;

    let readings = parse_readings(reader)?;
    let mut stored = db
        .insert_readings(&readings)
        .context("failed to store readings")?;
    // Earlier sessions must be labeled first so they count as history.
    stored.sort_by_key(|reading| reading.timestamp);

    let mut summary = IngestSummary {
        readings: readings.len(),
        stored: stored.len(),
        ..IngestSummary::default()
    };
    // A failure must not stop later readings: once stored they are never
    // offered again.
    let mut first_error = None;
    for reading in &stored {
        let event = match on_reading(db, reading, &extractor) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(err) => {
                summary.failed += 1;
                tracing::error!(ts = reading.timestamp, error = ?err, "session extraction failed");
                first_error.get_or_insert(
                    anyhow::Error::new(err)
                        .context(format!("failed to process reading at {}", reading.timestamp)),
                );
                continue;
            }
        };
        summary.events += 1;
        match on_event(db, event.timestamp, &classifier) {
            Ok(Some(classified)) => {
                summary.labeled += 1;
                tracing::info!(
                    key = %classified.event.key(),
                    weight = %classified.event.weight,
                    label = ?classified.event.cat,
                    "labeled event"
                );
            }
            Ok(None) => {}
            Err(err) => {
                summary.failed += 1;
                tracing::error!(ts = event.timestamp, error = ?err, "classification failed");
                first_error.get_or_insert(
                    anyhow::Error::new(err)
                        .context(format!("failed to classify event at {}", event.timestamp)),
                );
            }
        }
    }

    match first_error {
        None => Ok(summary),
        Some(err) => Err(err.context(format!("ingest incomplete: {summary}"))),
    }
}

fn parse_readings<R: BufRead>(reader: R) -> Result<Vec<Reading>> {
    let mut readings = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let reading: Reading = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid reading on line {}", idx + 1))?;
        readings.push(reading);
    }
    Ok(readings)
}

//! Classify command: label one stored event on demand.

use std::io::Write;

use anyhow::{Context, Result};
use cs_core::trigger::on_event;
use cs_core::{Classification, ClassifiedEvent, Classifier};
use cs_db::Database;

use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    timestamp: i64,
    dry_run: bool,
    config: &Config,
) -> Result<Option<ClassifiedEvent>> {
    let classifier = config.classifier_config()?;
    let classified = if dry_run {
        Classifier::new(&*db, &classifier).classify(timestamp)?
    } else {
        on_event(db, timestamp, &classifier)?
    };

    let Some(classified) = classified else {
        writeln!(writer, "No unlabeled event at {timestamp}.")?;
        return Ok(None);
    };

    let json = serde_json::to_string(&classified.event).context("failed to serialize event")?;
    writeln!(writer, "{json}")?;
    let Classification {
        estimates,
        partition,
        ..
    } = &classified.classification;
    for range in &partition.ranges {
        let recent = estimates
            .iter()
            .find(|estimate| estimate.name == range.name)
            .map_or(0, |estimate| estimate.recent_events);
        writeln!(
            writer,
            "- {}: [{}, {}) around {} ({recent} recent events)",
            range.name, range.low_weight, range.high_weight, range.last_weight
        )?;
    }
    writeln!(
        writer,
        "Outliers: below {} or from {}",
        partition.low_outlier, partition.high_outlier
    )?;
    if dry_run {
        writeln!(writer, "Dry run: label not stored.")?;
    }
    Ok(Some(classified))
}

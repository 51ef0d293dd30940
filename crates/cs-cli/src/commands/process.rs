//! Process command: run a trigger stage over a batch of change notifications.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use cs_core::{BatchReport, ChangeBatch};
use cs_core::trigger::{process_event_changes, process_reading_changes};
use cs_db::Database;

use crate::{Config, Stage};

pub fn run<R: Read, W: Write>(
    reader: R,
    writer: &mut W,
    db: &mut Database,
    stage: Stage,
    config: &Config,
) -> Result<BatchReport> {
    let batch: ChangeBatch =
        serde_json::from_reader(reader).context("invalid change notification batch")?;
    tracing::debug!(records = batch.records.len(), ?stage, "processing batch");

    let report = match stage {
        Stage::Readings => process_reading_changes(db, &batch, &config.extractor_config()?)?,
        Stage::Events => process_event_changes(db, &batch, &config.classifier_config()?)?,
    };
    writeln!(writer, "{report}")?;
    Ok(report)
}

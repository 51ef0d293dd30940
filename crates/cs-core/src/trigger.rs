//! Trigger adapters: turn store change notifications into pipeline calls.
//!
//! Two stages react to changes:
//! - a reading stage, fired by new readings, which turns every zero,
//!   non-tare reading into an event via the [`SessionExtractor`];
//! - an event stage, fired by new or modified events, which labels every
//!   unlabeled event via the [`Classifier`].
//!
//! Each notification is handled on its own with state read fresh from the
//! store. A notification for an event that already carries a label is
//! skipped, which makes re-delivery harmless.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::{ClassifiedEvent, Classifier, ClassifierConfig, ClassifyError};
use crate::event::Event;
use crate::keys::StoreKey;
use crate::reading::Reading;
use crate::session::{ExtractError, ExtractorConfig, SessionExtractor};
use crate::store::{EventStore, IdentitySource, ReadingStore, StoreError};

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("session extraction failed")]
    Extract(#[from] ExtractError),
    #[error("classification failed")]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Some records of a batch failed; every other record was still processed.
    #[error("{failed} of {records} records failed", records = .report.records)]
    Batch {
        report: BatchReport,
        failed: usize,
        #[source]
        first: Box<TriggerError>,
    },
}

/// What happened to the record a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Modify,
    Remove,
    #[serde(other)]
    Unknown,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub event_name: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<StoreKey>,
    /// Full new state of the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<serde_json::Value>,
}

impl ChangeRecord {
    pub fn insert(keys: StoreKey, new_image: serde_json::Value) -> Self {
        Self {
            event_name: ChangeKind::Insert,
            keys: Some(keys),
            new_image: Some(new_image),
        }
    }

    /// The new image of an insert or modify that carries its keys.
    fn actionable_image(&self) -> Option<&serde_json::Value> {
        match self.event_name {
            ChangeKind::Insert | ChangeKind::Modify if self.keys.is_some() => {
                self.new_image.as_ref()
            }
            _ => None,
        }
    }
}

/// A batch of change notifications as delivered by the trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub records: Vec<ChangeRecord>,
}

/// Outcome of processing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records in the batch, acted on or not.
    pub records: usize,
    /// Events created (reading stage) or labeled (event stage).
    pub acted: usize,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Successfully processed {} records.", self.records)
    }
}

/// The fields of an event image the event stage needs.
#[derive(Debug, Deserialize)]
struct EventImage {
    timestamp: i64,
    #[serde(default)]
    cat: Option<String>,
}

impl EventImage {
    fn is_labeled(&self) -> bool {
        self.cat.as_deref().is_some_and(|cat| !cat.is_empty())
    }
}

/// Per-record failures collected while a batch runs to the end.
#[derive(Default)]
struct Failures {
    count: usize,
    first: Option<TriggerError>,
}

impl Failures {
    fn record(&mut self, record: &ChangeRecord, err: TriggerError) {
        tracing::error!(error = ?err, keys = ?record.keys, "record failed");
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(err);
        }
    }

    fn finish(self, report: BatchReport) -> Result<BatchReport, TriggerError> {
        match self.first {
            None => Ok(report),
            Some(first) => Err(TriggerError::Batch {
                report,
                failed: self.count,
                first: Box::new(first),
            }),
        }
    }
}

/// Reading stage for a single reading.
///
/// Builds and stores the event closed by `reading`, if any.
pub fn on_reading<S>(
    store: &mut S,
    reading: &Reading,
    config: &ExtractorConfig,
) -> Result<Option<Event>, TriggerError>
where
    S: ReadingStore + EventStore + ?Sized,
{
    if !reading.ends_session() {
        return Ok(None);
    }
    tracing::debug!(ts = reading.timestamp, "zero reading detected");
    let Some(event) = SessionExtractor::new(&*store, config).extract(reading.timestamp)? else {
        return Ok(None);
    };
    store.put_event(&event)?;
    Ok(Some(event))
}

/// Event stage for a single event.
///
/// Labels the stored event at `ts` and writes the label back.
pub fn on_event<S>(
    store: &mut S,
    ts: i64,
    config: &ClassifierConfig,
) -> Result<Option<ClassifiedEvent>, TriggerError>
where
    S: EventStore + IdentitySource + ?Sized,
{
    let Some(classified) = Classifier::new(&*store, config).classify(ts)? else {
        return Ok(None);
    };
    let Some(label) = classified.event.cat.as_ref() else {
        return Ok(None);
    };
    if !store.set_event_label(&classified.event.key(), label)? {
        tracing::warn!(ts, "event disappeared before its label was written");
        return Ok(None);
    }
    Ok(Some(classified))
}

/// Runs the reading stage over a batch of reading notifications.
///
/// A failing record does not stop the batch; the first failure is returned
/// once every record has been tried.
pub fn process_reading_changes<S>(
    store: &mut S,
    batch: &ChangeBatch,
    config: &ExtractorConfig,
) -> Result<BatchReport, TriggerError>
where
    S: ReadingStore + EventStore + ?Sized,
{
    let mut report = BatchReport {
        records: batch.records.len(),
        acted: 0,
    };
    let mut failures = Failures::default();
    for record in &batch.records {
        let Some(image) = record.actionable_image() else {
            continue;
        };
        let reading: Reading = match serde_json::from_value(image.clone()) {
            Ok(reading) => reading,
            Err(err) => {
                tracing::warn!(error = %err, keys = ?record.keys, "skipping malformed reading image");
                continue;
            }
        };
        match on_reading(store, &reading, config) {
            Ok(Some(_)) => report.acted += 1,
            Ok(None) => {}
            Err(err) => failures.record(record, err),
        }
    }
    failures.finish(report)
}

/// Runs the event stage over a batch of event notifications.
///
/// A failing record does not stop the batch; the first failure is returned
/// once every record has been tried.
pub fn process_event_changes<S>(
    store: &mut S,
    batch: &ChangeBatch,
    config: &ClassifierConfig,
) -> Result<BatchReport, TriggerError>
where
    S: EventStore + IdentitySource + ?Sized,
{
    let mut report = BatchReport {
        records: batch.records.len(),
        acted: 0,
    };
    let mut failures = Failures::default();
    for record in &batch.records {
        let Some(image) = record.actionable_image() else {
            continue;
        };
        let image: EventImage = match serde_json::from_value(image.clone()) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(error = %err, keys = ?record.keys, "skipping malformed event image");
                continue;
            }
        };
        if image.is_labeled() {
            continue;
        }
        match on_event(store, image.timestamp, config) {
            Ok(Some(_)) => report.acted += 1,
            Ok(None) => {}
            Err(err) => failures.record(record, err),
        }
    }
    failures.finish(report)
}

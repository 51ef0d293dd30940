//! Session extraction from the raw reading stream.
//!
//! A session is the run of non-zero readings between two zero readings. When
//! a zero, non-tare reading arrives, the readings of the preceding window are
//! fetched and the run that ended at that zero is summarized into an
//! [`Event`].
//!
//! # Algorithm
//!
//! 1. Fetch every reading in `[ts - window, ts]` (one query per UTC date).
//! 2. Sort newest first; the newest entry must be the zero reading at `ts`.
//! 3. Drop it and cut the rest at the next zero reading.
//! 4. Whatever remains is the session; an empty remainder means no event.

use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use crate::event::Event;
use crate::keys::{StoreKey, local_key, partition_ranges};
use crate::reading::Reading;
use crate::store::{ReadingStore, StoreError};
use crate::types::ValidationError;

/// Default lookback before a zero reading: 30 minutes.
pub const DEFAULT_WINDOW_MS: i64 = 30 * 60 * 1000;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Configuration for session extraction.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// How far back from the zero reading to look for the session start.
    pub window_ms: i64,
    /// Zone for the event's local date/time fields.
    pub local_tz: Tz,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            local_tz: chrono_tz::America::New_York,
        }
    }
}

/// The readings of one weighing, newest first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    readings: Vec<Reading>,
}

impl Session {
    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    /// The last reading before the scale returned to zero.
    pub fn end(&self) -> &Reading {
        &self.readings[0]
    }

    /// The first reading of the run (or of the window, if no earlier zero).
    pub fn start(&self) -> &Reading {
        &self.readings[self.readings.len() - 1]
    }

    pub fn peak_weight(&self) -> Decimal {
        self.readings
            .iter()
            .map(|r| r.weight)
            .max()
            .unwrap_or(Decimal::ZERO)
    }

    /// Session duration in seconds, rounded half-to-even to one decimal.
    pub fn elapsed_sec(&self) -> Decimal {
        let elapsed_ms = self.end().timestamp - self.start().timestamp;
        Decimal::new(elapsed_ms, 3).round_dp_with_strategy(1, RoundingStrategy::MidpointNearestEven)
    }

    /// Summarizes the session as an unlabeled event.
    pub fn to_event(&self, tz: Tz) -> Result<Event, ValidationError> {
        // Keyed by the session's last reading, not its first.
        let end = self.end();
        let utc = StoreKey::from_timestamp_ms(end.timestamp)?;
        let local = local_key(end.timestamp, tz)?;
        Ok(Event {
            timestamp: end.timestamp,
            date_utc: utc.date,
            time_utc: utc.time,
            date_local: local.date,
            time_local: local.time,
            elapsed_sec: self.elapsed_sec(),
            weight: self.peak_weight(),
            cat: None,
        })
    }
}

/// Cuts the session that ended with the zero reading at `trigger_ts`.
///
/// `readings` is the whole lookback window in any order. Returns `None` when
/// the newest reading is not a zero at `trigger_ts` (a stale or out-of-order
/// trigger) or when no non-zero reading precedes it.
pub fn extract_session(mut readings: Vec<Reading>, trigger_ts: i64) -> Option<Session> {
    readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let newest = readings.first()?;
    if newest.timestamp != trigger_ts || !newest.is_zero() {
        tracing::debug!(
            trigger_ts,
            newest_ts = newest.timestamp,
            "newest reading is not the triggering zero"
        );
        return None;
    }
    readings.remove(0);

    if let Some(idx) = readings.iter().position(Reading::is_zero) {
        readings.truncate(idx);
    }

    if readings.is_empty() {
        None
    } else {
        Some(Session { readings })
    }
}

/// Builds events from the reading store.
pub struct SessionExtractor<'a, S: ?Sized> {
    store: &'a S,
    config: &'a ExtractorConfig,
}

impl<'a, S: ReadingStore + ?Sized> SessionExtractor<'a, S> {
    pub const fn new(store: &'a S, config: &'a ExtractorConfig) -> Self {
        Self { store, config }
    }

    /// Fetches the lookback window before the zero reading at `ts` and
    /// summarizes the session it closes.
    ///
    /// `Ok(None)` is the ordinary outcome for a zero that closed nothing.
    pub fn extract(&self, ts: i64) -> Result<Option<Event>, ExtractError> {
        let mut readings = Vec::new();
        for range in partition_ranges(ts - self.config.window_ms, ts)? {
            let batch = self.store.readings_in_range(&range)?;
            tracing::debug!(date = %range.date, count = batch.len(), "fetched readings");
            readings.extend(batch);
        }

        let Some(session) = extract_session(readings, ts) else {
            tracing::debug!(ts, "no session precedes zero reading");
            return Ok(None);
        };
        let event = session.to_event(self.config.local_tz)?;
        tracing::info!(
            ts = event.timestamp,
            weight = %event.weight,
            elapsed_sec = %event.elapsed_sec,
            "extracted event"
        );
        Ok(Some(event))
    }
}

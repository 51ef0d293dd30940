//! Weighing events derived from sessions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::keys::StoreKey;
use crate::types::Label;

/// One weighing, summarized from a session of readings.
///
/// An event is created unlabeled and receives its label exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Timestamp (ms) of the last non-zero reading of the session.
    pub timestamp: i64,
    pub date_utc: String,
    pub time_utc: String,
    pub date_local: String,
    pub time_local: String,
    /// Seconds between the first and last reading, one decimal place.
    pub elapsed_sec: Decimal,
    /// Peak weight seen during the session.
    pub weight: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cat: Option<Label>,
}

impl Event {
    /// The storage key; identical to the key of the session's last reading.
    pub fn key(&self) -> StoreKey {
        StoreKey {
            date: self.date_utc.clone(),
            time: self.time_utc.clone(),
        }
    }

    pub const fn is_labeled(&self) -> bool {
        self.cat.is_some()
    }

    /// Returns a copy of this event carrying `label`.
    #[must_use]
    pub fn with_label(&self, label: Label) -> Self {
        Self {
            cat: Some(label),
            ..self.clone()
        }
    }
}

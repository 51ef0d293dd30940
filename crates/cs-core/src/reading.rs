//! Raw weight samples from the scale.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::keys::StoreKey;
use crate::types::ValidationError;

/// A single weight sample as published by the scale.
///
/// Readings are written once and never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub weight: Decimal,
    /// Set when the scale re-zeroed itself rather than something stepping off.
    #[serde(default)]
    pub tare: bool,
}

impl Reading {
    pub const fn new(timestamp: i64, weight: Decimal, tare: bool) -> Self {
        Self {
            timestamp,
            weight,
            tare,
        }
    }

    /// The storage key derived from the timestamp.
    pub fn key(&self) -> Result<StoreKey, ValidationError> {
        StoreKey::from_timestamp_ms(self.timestamp)
    }

    pub fn is_zero(&self) -> bool {
        self.weight.is_zero()
    }

    /// A zero reading that was not a tare, i.e. the end of a weighing.
    pub fn ends_session(&self) -> bool {
        self.is_zero() && !self.tare
    }
}

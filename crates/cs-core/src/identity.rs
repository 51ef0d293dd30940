//! Configured cats and their owner-declared weights.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::CatName;

/// A weight declared by the owner, valid from `timestamp` onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinedWeight {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub weight: Decimal,
}

/// A cat as stored in the configuration table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: CatName,
    #[serde(default)]
    pub defined_weights: Vec<DefinedWeight>,
}

impl Identity {
    /// The most recent defined weight at or before `ts`.
    ///
    /// Among entries sharing a timestamp, the one listed last wins.
    pub fn defined_weight_at(&self, ts: i64) -> Option<&DefinedWeight> {
        self.defined_weights
            .iter()
            .filter(|w| w.timestamp <= ts)
            .max_by_key(|w| w.timestamp)
    }
}

//! Interfaces to the storage collaborators.
//!
//! The extractor and the classifier never open a connection themselves; the
//! caller hands them something implementing these traits.

use thiserror::Error;

use crate::event::Event;
use crate::identity::Identity;
use crate::keys::{KeyRange, StoreKey};
use crate::reading::Reading;
use crate::types::Label;

/// A failure reported by a storage backend.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

/// Read access to raw readings.
pub trait ReadingStore {
    /// Returns readings whose key lies in `range`, in any order.
    fn readings_in_range(&self, range: &KeyRange) -> Result<Vec<Reading>, StoreError>;
}

/// Read/write access to derived events.
pub trait EventStore {
    /// Returns events whose key lies in `range`, in any order.
    fn events_in_range(&self, range: &KeyRange) -> Result<Vec<Event>, StoreError>;

    /// Inserts a new event under its own key.
    fn put_event(&mut self, event: &Event) -> Result<(), StoreError>;

    /// Sets the label of the event stored at exactly `key`.
    ///
    /// Returns false if no such event exists.
    fn set_event_label(&mut self, key: &StoreKey, label: &Label) -> Result<bool, StoreError>;
}

/// Read access to the configured cats.
pub trait IdentitySource {
    fn identities(&self) -> Result<Vec<Identity>, StoreError>;
}

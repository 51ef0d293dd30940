//! Core domain logic for the cat scale.
//!
//! This crate contains the fundamental types and logic for:
//! - Session extraction: turning a zero reading into a weighing event
//! - Classification: labeling an event with a cat or an outlier
//! - Trigger adapters: reacting to store change notifications
//!
//! Storage is abstracted behind the traits in [`store`]; see `cs-db` for the
//! `SQLite` implementation.

pub mod classify;
pub mod event;
pub mod identity;
pub mod keys;
pub mod reading;
pub mod session;
pub mod store;
pub mod trigger;
pub mod types;

pub use classify::{
    Classification, ClassifiedEvent, Classifier, ClassifierConfig, ClassifyError, classify_weight,
};
pub use event::Event;
pub use identity::{DefinedWeight, Identity};
pub use keys::{KeyRange, StoreKey};
pub use reading::Reading;
pub use session::{ExtractError, ExtractorConfig, Session, SessionExtractor, extract_session};
pub use store::{EventStore, IdentitySource, ReadingStore, StoreError};
pub use trigger::{BatchReport, ChangeBatch, ChangeKind, ChangeRecord, TriggerError};
pub use types::{CatName, Label, ValidationError};

//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label text for events lighter than every known cat.
pub const OUTLIER_LOW: &str = "OUTLIER_LOW";
/// Label text for events heavier than every known cat.
pub const OUTLIER_HIGH: &str = "OUTLIER_HIGH";
/// Label text for events that fell between cat ranges.
pub const OUTLIER: &str = "OUTLIER";

const RESERVED_LABELS: [&str; 3] = [OUTLIER_LOW, OUTLIER_HIGH, OUTLIER];

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A cat name collided with one of the outlier labels.
    #[error("{name} is reserved for outlier labels")]
    ReservedName { name: String },

    /// A millisecond timestamp outside the range chrono can represent.
    #[error("timestamp out of range: {0} ms")]
    TimestampOutOfRange(i64),

    /// A date partition string that is not `YYYY.MM.DD`.
    #[error("invalid date partition: {0}")]
    InvalidDate(String),
}

/// A validated cat name.
///
/// Cat names must be non-empty and must not shadow an outlier label, so a
/// stored label can always be read back unambiguously.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CatName(String);

impl CatName {
    /// Creates a new name after validation.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "cat name" });
        }
        if RESERVED_LABELS.contains(&name.as_str()) {
            return Err(ValidationError::ReservedName { name });
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CatName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CatName> for String {
    fn from(name: CatName) -> Self {
        name.0
    }
}

impl fmt::Display for CatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CatName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The classification assigned to an event.
///
/// The text form is what lands in the event table's `cat` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// The event belongs to a known cat.
    Cat(CatName),
    /// Below every cat's range.
    OutlierLow,
    /// At or above every cat's range.
    OutlierHigh,
    /// Matched no range although it lies between the lightest and heaviest cat.
    Outlier,
}

impl Label {
    /// Returns true for any of the outlier variants.
    #[must_use]
    pub const fn is_outlier(&self) -> bool {
        !matches!(self, Self::Cat(_))
    }

    /// Returns the cat name when the label names one.
    pub const fn cat(&self) -> Option<&CatName> {
        match self {
            Self::Cat(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Cat(name) => name.as_str(),
            Self::OutlierLow => OUTLIER_LOW,
            Self::OutlierHigh => OUTLIER_HIGH,
            Self::Outlier => OUTLIER,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            OUTLIER_LOW => Ok(Self::OutlierLow),
            OUTLIER_HIGH => Ok(Self::OutlierHigh),
            OUTLIER => Ok(Self::Outlier),
            _ => CatName::new(s).map(Self::Cat),
        }
    }
}

impl Serialize for Label {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

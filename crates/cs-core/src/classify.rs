//! Cat classification by recent-history weight ranges.
//!
//! Each cat's expected weight drifts, so the classifier re-derives it for
//! every event from what the cat weighed recently and splits the weight axis
//! at the midpoints between neighbouring cats.
//!
//! # Algorithm Summary
//!
//! 1. Baseline: per cat, the latest owner-defined weight at or before the event.
//! 2. Estimate: the mean of up to `num_previous_events` labeled events newer
//!    than the baseline, else the baseline weight itself.
//! 3. Outlier bounds: `min - threshold` and `max + threshold` over estimates.
//! 4. Partition: cats sorted by estimate, boundaries at neighbour midpoints,
//!    outer edges at the outlier bounds. Ranges are half-open `[low, high)`.
//! 5. Anything left unmatched falls back to an outlier label.
//!
//! History is gathered by scanning backward one UTC day at a time for at
//! most `lookback_days` days, stopping as soon as every cat has enough
//! qualifying events.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::event::Event;
use crate::identity::Identity;
use crate::keys::backward_day_ranges;
use crate::store::{EventStore, IdentitySource, StoreError};
use crate::types::{CatName, Label, ValidationError};

/// Recent events averaged into a cat's estimate.
pub const DEFAULT_NUM_PREVIOUS_EVENTS: usize = 3;

/// Date partitions scanned for history, including the event's own.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Margin beyond the lightest/heaviest cat before an event is an outlier: 0.55.
pub const DEFAULT_OUTLIER_THRESHOLD: Decimal = Decimal::from_parts(55, 0, 0, false, 2);

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("no cats are configured")]
    NoIdentities,
    #[error("cat {name} has no defined weights")]
    NoDefinedWeights { name: CatName },
    #[error("cat {name} has no defined weight at or before {ts}")]
    NoWeightBefore { name: CatName, ts: i64 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Configuration for classification.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub outlier_threshold: Decimal,
    pub num_previous_events: usize,
    pub lookback_days: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            num_previous_events: DEFAULT_NUM_PREVIOUS_EVENTS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

/// Step 1: the owner-defined weight in effect at the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
    pub name: CatName,
    pub configured_weight: Decimal,
    pub configured_ts: i64,
}

impl Baseline {
    pub fn for_identity(identity: &Identity, ts: i64) -> Result<Self, ClassifyError> {
        if identity.defined_weights.is_empty() {
            return Err(ClassifyError::NoDefinedWeights {
                name: identity.name.clone(),
            });
        }
        let defined = identity
            .defined_weight_at(ts)
            .ok_or_else(|| ClassifyError::NoWeightBefore {
                name: identity.name.clone(),
                ts,
            })?;
        Ok(Self {
            name: identity.name.clone(),
            configured_weight: defined.weight,
            configured_ts: defined.timestamp,
        })
    }

    /// An event labeled with this cat and newer than the baseline.
    pub fn qualifies(&self, event: &Event) -> bool {
        event.timestamp > self.configured_ts
            && event.cat.as_ref().and_then(Label::cat) == Some(&self.name)
    }

    /// Step 2: refines the baseline with the most recent qualifying events.
    pub fn refine(self, history: &[Event], limit: usize) -> CatEstimate {
        let mut recent: Vec<&Event> = history.iter().filter(|e| self.qualifies(e)).collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);

        let last_weight = if recent.is_empty() {
            self.configured_weight
        } else {
            let total: Decimal = recent.iter().map(|e| e.weight).sum();
            total / Decimal::from(recent.len())
        };
        CatEstimate {
            name: self.name,
            configured_weight: self.configured_weight,
            configured_ts: self.configured_ts,
            last_weight,
            recent_events: recent.len(),
        }
    }
}

/// Resolves the baseline of every configured cat.
pub fn baselines(identities: &[Identity], ts: i64) -> Result<Vec<Baseline>, ClassifyError> {
    if identities.is_empty() {
        return Err(ClassifyError::NoIdentities);
    }
    identities
        .iter()
        .map(|identity| Baseline::for_identity(identity, ts))
        .collect()
}

/// Step 2 result: a cat's effective weight for this classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatEstimate {
    pub name: CatName,
    pub configured_weight: Decimal,
    pub configured_ts: i64,
    pub last_weight: Decimal,
    /// How many recent events went into `last_weight`; zero means the
    /// configured weight was used.
    pub recent_events: usize,
}

/// A cat's slice `[low_weight, high_weight)` of the weight axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatRange {
    pub name: CatName,
    pub last_weight: Decimal,
    pub low_weight: Decimal,
    pub high_weight: Decimal,
}

impl CatRange {
    pub fn contains(&self, weight: Decimal) -> bool {
        self.low_weight <= weight && weight < self.high_weight
    }
}

/// Steps 3 and 4: outlier bounds and the contiguous ranges between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub low_outlier: Decimal,
    pub high_outlier: Decimal,
    /// Sorted by ascending `last_weight`.
    pub ranges: Vec<CatRange>,
}

impl Partition {
    /// Lays the cats out along the weight axis.
    ///
    /// Cats sharing a `last_weight` are ordered by name, and the boundary
    /// between them sits exactly at the shared weight.
    pub fn build(estimates: &[CatEstimate], threshold: Decimal) -> Result<Self, ClassifyError> {
        let mut sorted: Vec<&CatEstimate> = estimates.iter().collect();
        sorted.sort_by(|a, b| {
            a.last_weight
                .cmp(&b.last_weight)
                .then_with(|| a.name.cmp(&b.name))
        });
        let (Some(lightest), Some(heaviest)) = (sorted.first(), sorted.last()) else {
            return Err(ClassifyError::NoIdentities);
        };
        let low_outlier = lightest.last_weight - threshold;
        let high_outlier = heaviest.last_weight + threshold;

        // Outer edges sit on the outlier bounds rather than at midpoints
        // towards them, so the ranges cover [low_outlier, high_outlier).
        let mut ranges: Vec<CatRange> = Vec::with_capacity(sorted.len());
        for (idx, cat) in sorted.iter().enumerate() {
            let low_weight = ranges.last().map_or(low_outlier, |prev| prev.high_weight);
            let high_weight = sorted
                .get(idx + 1)
                .map_or(high_outlier, |next| midpoint(cat.last_weight, next.last_weight));
            tracing::debug!(
                cat = %cat.name,
                low = %low_weight,
                high = %high_weight,
                "cat weight range"
            );
            ranges.push(CatRange {
                name: cat.name.clone(),
                last_weight: cat.last_weight,
                low_weight,
                high_weight,
            });
        }

        Ok(Self {
            low_outlier,
            high_outlier,
            ranges,
        })
    }

    pub fn min_weight(&self) -> Decimal {
        self.ranges.first().map_or(Decimal::ZERO, |r| r.last_weight)
    }

    pub fn max_weight(&self) -> Decimal {
        self.ranges.last().map_or(Decimal::ZERO, |r| r.last_weight)
    }

    /// Labels `weight`: outlier bounds first, then the first containing range,
    /// then the residual fallback.
    pub fn assign(&self, weight: Decimal) -> Label {
        if weight < self.low_outlier {
            return Label::OutlierLow;
        }
        if weight >= self.high_outlier {
            return Label::OutlierHigh;
        }
        self.ranges
            .iter()
            .find(|range| range.contains(weight))
            .map_or_else(
                || residual_label(weight, self.min_weight(), self.max_weight()),
                |range| Label::Cat(range.name.clone()),
            )
    }
}

/// Step 5: label for a weight that matched no range.
///
/// Only reachable if the ranges leave a gap, which contiguous construction
/// rules out for exact decimals.
pub fn residual_label(weight: Decimal, min_weight: Decimal, max_weight: Decimal) -> Label {
    if weight < min_weight {
        Label::OutlierLow
    } else if weight >= max_weight {
        Label::OutlierHigh
    } else {
        Label::Outlier
    }
}

fn midpoint(a: Decimal, b: Decimal) -> Decimal {
    (a + b) / Decimal::TWO
}

/// Everything derived while labeling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub label: Label,
    pub estimates: Vec<CatEstimate>,
    pub partition: Partition,
}

/// Classifies `weight` observed at `ts` against the configured cats.
///
/// `history` may hold any events; only labeled events newer than each cat's
/// baseline are used.
pub fn classify_weight(
    weight: Decimal,
    ts: i64,
    identities: &[Identity],
    history: &[Event],
    config: &ClassifierConfig,
) -> Result<Classification, ClassifyError> {
    let baselines = baselines(identities, ts)?;
    classify_with_baselines(weight, baselines, history, config)
}

fn classify_with_baselines(
    weight: Decimal,
    baselines: Vec<Baseline>,
    history: &[Event],
    config: &ClassifierConfig,
) -> Result<Classification, ClassifyError> {
    let estimates: Vec<CatEstimate> = baselines
        .into_iter()
        .map(|baseline| baseline.refine(history, config.num_previous_events))
        .collect();
    let partition = Partition::build(&estimates, config.outlier_threshold)?;
    let label = partition.assign(weight);
    Ok(Classification {
        label,
        estimates,
        partition,
    })
}

/// A freshly labeled event and how the label was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub event: Event,
    pub classification: Classification,
}

/// Classifies stored events.
pub struct Classifier<'a, S: ?Sized> {
    store: &'a S,
    config: &'a ClassifierConfig,
}

impl<'a, S: EventStore + IdentitySource + ?Sized> Classifier<'a, S> {
    pub const fn new(store: &'a S, config: &'a ClassifierConfig) -> Self {
        Self { store, config }
    }

    /// Labels the stored event at `ts`.
    ///
    /// Returns `Ok(None)` if the event is not stored yet or already carries a
    /// label. Nothing is written; the caller persists the label.
    pub fn classify(&self, ts: i64) -> Result<Option<ClassifiedEvent>, ClassifyError> {
        let mut ranges = backward_day_ranges(ts, self.config.lookback_days)?.into_iter();
        let Some(first) = ranges.next() else {
            return Ok(None);
        };

        let mut history = self.store.events_in_range(&first)?;
        let Some(event) = history.iter().find(|e| e.timestamp == ts).cloned() else {
            tracing::debug!(ts, "event to classify not found");
            return Ok(None);
        };
        if event.is_labeled() {
            tracing::debug!(ts, "event already labeled");
            return Ok(None);
        }

        let identities = self.store.identities()?;
        let baselines = baselines(&identities, ts)?;

        for range in ranges {
            if self.has_enough_history(&baselines, &history) {
                break;
            }
            let events = self.store.events_in_range(&range)?;
            tracing::debug!(date = %range.date, count = events.len(), "fetched history");
            history.extend(events);
        }

        let classification = classify_with_baselines(event.weight, baselines, &history, self.config)?;
        tracing::info!(
            ts,
            weight = %event.weight,
            label = %classification.label,
            "classified event"
        );
        Ok(Some(ClassifiedEvent {
            event: event.with_label(classification.label.clone()),
            classification,
        }))
    }

    fn has_enough_history(&self, baselines: &[Baseline], history: &[Event]) -> bool {
        baselines.iter().all(|baseline| {
            history.iter().filter(|e| baseline.qualifies(e)).count()
                >= self.config.num_previous_events
        })
    }
}

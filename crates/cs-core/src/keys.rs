//! Store keys and time windows.
//!
//! Readings and events are stored under a UTC date partition
//! (`YYYY.MM.DD`) and a UTC time-of-day sort key (`HH:MM:SS:mmm`). Both
//! strings are zero padded, so lexicographic order within a partition matches
//! chronological order. A time window that crosses midnight has to be read as
//! one range query per date partition.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Format of the date partition key.
pub const DATE_FORMAT: &str = "%Y.%m.%d";

/// First sort key of a day.
pub const DAY_START: &str = "00:00:00:000";

/// Last sort key of a day.
pub const DAY_END: &str = "23:59:59:999";

/// A `(date, time)` key pair identifying a single record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreKey {
    pub date: String,
    pub time: String,
}

impl StoreKey {
    /// Derives the UTC key for a millisecond timestamp.
    pub fn from_timestamp_ms(ts: i64) -> Result<Self, ValidationError> {
        Ok(key_in(&to_utc(ts)?))
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

/// Derives the date and time-of-day strings for `ts` in a local time zone.
pub fn local_key(ts: i64, tz: Tz) -> Result<StoreKey, ValidationError> {
    Ok(key_in(&to_utc(ts)?.with_timezone(&tz)))
}

fn key_in<T: TimeZone>(dt: &DateTime<T>) -> StoreKey
where
    T::Offset: std::fmt::Display,
{
    StoreKey {
        date: dt.format(DATE_FORMAT).to_string(),
        time: format!(
            "{}:{:03}",
            dt.format("%H:%M:%S"),
            dt.timestamp_subsec_millis()
        ),
    }
}

fn to_utc(ts: i64) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::from_timestamp_millis(ts).ok_or(ValidationError::TimestampOutOfRange(ts))
}

/// An inclusive range of sort keys inside one date partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

impl KeyRange {
    /// Covers every record in the partition.
    pub fn whole_day(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            start_time: DAY_START.to_string(),
            end_time: DAY_END.to_string(),
        }
    }

    /// Returns true if `key` falls inside this range.
    pub fn contains(&self, key: &StoreKey) -> bool {
        key.date == self.date
            && self.start_time.as_str() <= key.time.as_str()
            && key.time.as_str() <= self.end_time.as_str()
    }
}

/// Splits the inclusive window `[start_ms, end_ms]` into one range per UTC
/// date partition, oldest first.
///
/// The midnight instant belongs only to the later partition, so the ranges
/// never overlap. An inverted window yields no ranges.
pub fn partition_ranges(start_ms: i64, end_ms: i64) -> Result<Vec<KeyRange>, ValidationError> {
    if end_ms < start_ms {
        return Ok(Vec::new());
    }
    let start = StoreKey::from_timestamp_ms(start_ms)?;
    let end = StoreKey::from_timestamp_ms(end_ms)?;
    if start.date == end.date {
        return Ok(vec![KeyRange {
            date: end.date,
            start_time: start.time,
            end_time: end.time,
        }]);
    }

    let first = parse_date(&start.date)?;
    let last = parse_date(&end.date)?;
    let mut ranges = Vec::new();
    let mut day = first;
    while day <= last {
        let date = day.format(DATE_FORMAT).to_string();
        let start_time = if day == first {
            start.time.clone()
        } else {
            DAY_START.to_string()
        };
        let end_time = if day == last {
            end.time.clone()
        } else {
            DAY_END.to_string()
        };
        ranges.push(KeyRange {
            date,
            start_time,
            end_time,
        });
        day = day
            .checked_add_days(Days::new(1))
            .ok_or_else(|| ValidationError::InvalidDate(end.date.clone()))?;
    }
    Ok(ranges)
}

/// Ranges for a backward scan over `days` date partitions ending at `ts`.
///
/// The first range runs from the start of `ts`'s UTC date up to and including
/// `ts`; each following range is a whole earlier day, newest first.
pub fn backward_day_ranges(ts: i64, days: u32) -> Result<Vec<KeyRange>, ValidationError> {
    if days == 0 {
        return Ok(Vec::new());
    }
    let key = StoreKey::from_timestamp_ms(ts)?;
    let today = parse_date(&key.date)?;
    let mut ranges = vec![KeyRange {
        date: key.date.clone(),
        start_time: DAY_START.to_string(),
        end_time: key.time,
    }];
    for back in 1..days {
        let day = today
            .checked_sub_days(Days::new(u64::from(back)))
            .ok_or_else(|| ValidationError::InvalidDate(key.date.clone()))?;
        ranges.push(KeyRange::whole_day(day.format(DATE_FORMAT).to_string()));
    }
    Ok(ranges)
}

fn parse_date(date: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(date.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2021-11-15T12:19:20.263Z
    const MIDDAY: i64 = 1_636_978_760_263;
    // 2021-11-16T00:00:00.000Z
    const MIDNIGHT: i64 = 1_637_020_800_000;
    const MINUTE: i64 = 60 * 1000;

    #[test]
    fn store_key_formats_date_and_millis() {
        let key = StoreKey::from_timestamp_ms(MIDDAY).unwrap();
        assert_eq!(key.date, "2021.11.15");
        assert_eq!(key.time, "12:19:20:263");
    }

    #[test]
    fn store_key_pads_small_millis() {
        let key = StoreKey::from_timestamp_ms(MIDNIGHT + 7).unwrap();
        assert_eq!(key.date, "2021.11.16");
        assert_eq!(key.time, "00:00:00:007");
    }

    #[test]
    fn store_key_rejects_unrepresentable_timestamp() {
        assert_eq!(
            StoreKey::from_timestamp_ms(i64::MAX),
            Err(ValidationError::TimestampOutOfRange(i64::MAX))
        );
    }

    #[test]
    fn local_key_uses_zone_offset() {
        // EST is UTC-5 in November.
        let key = local_key(MIDDAY, chrono_tz::America::New_York).unwrap();
        assert_eq!(key.date, "2021.11.15");
        assert_eq!(key.time, "07:19:20:263");

        let key = local_key(MIDNIGHT + 1, chrono_tz::America::New_York).unwrap();
        assert_eq!(key.date, "2021.11.15");
        assert_eq!(key.time, "19:00:00:001");
    }

    #[test]
    fn window_within_one_day_is_one_range() {
        let ranges = partition_ranges(MIDDAY - 30 * MINUTE, MIDDAY).unwrap();
        assert_eq!(
            ranges,
            vec![KeyRange {
                date: "2021.11.15".to_string(),
                start_time: "11:49:20:263".to_string(),
                end_time: "12:19:20:263".to_string(),
            }]
        );
    }

    #[test]
    fn window_across_midnight_is_split() {
        let ranges = partition_ranges(MIDNIGHT - 15 * MINUTE, MIDNIGHT + 15 * MINUTE).unwrap();
        assert_eq!(
            ranges,
            vec![
                KeyRange {
                    date: "2021.11.15".to_string(),
                    start_time: "23:45:00:000".to_string(),
                    end_time: DAY_END.to_string(),
                },
                KeyRange {
                    date: "2021.11.16".to_string(),
                    start_time: DAY_START.to_string(),
                    end_time: "00:15:00:000".to_string(),
                },
            ]
        );
    }

    #[test]
    fn midnight_instant_belongs_to_later_partition_only() {
        let ranges = partition_ranges(MIDNIGHT - 15 * MINUTE, MIDNIGHT + 15 * MINUTE).unwrap();
        let midnight = StoreKey::from_timestamp_ms(MIDNIGHT).unwrap();
        let last_milli = StoreKey::from_timestamp_ms(MIDNIGHT - 1).unwrap();

        let hits: Vec<_> = ranges.iter().filter(|r| r.contains(&midnight)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].date, "2021.11.16");

        let hits: Vec<_> = ranges.iter().filter(|r| r.contains(&last_milli)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].date, "2021.11.15");
    }

    #[test]
    fn inverted_window_is_empty() {
        assert!(partition_ranges(MIDDAY, MIDDAY - 1).unwrap().is_empty());
    }

    #[test]
    fn backward_scan_starts_with_partial_day() {
        let ranges = backward_day_ranges(MIDDAY, 3).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].date, "2021.11.15");
        assert_eq!(ranges[0].start_time, DAY_START);
        assert_eq!(ranges[0].end_time, "12:19:20:263");
        assert_eq!(ranges[1], KeyRange::whole_day("2021.11.14"));
        assert_eq!(ranges[2], KeyRange::whole_day("2021.11.13"));
    }

    #[test]
    fn backward_scan_crosses_month_boundary() {
        // 2021-11-01T08:00:00Z
        let ranges = backward_day_ranges(1_635_753_600_000, 2).unwrap();
        assert_eq!(ranges[1].date, "2021.10.31");
    }

    #[test]
    fn backward_scan_with_zero_days_is_empty() {
        assert!(backward_day_ranges(MIDDAY, 0).unwrap().is_empty());
    }
}

//! Storage layer for the cat scale.
//!
//! Provides persistence for readings, events and cat settings using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization.
//!
//! # Schema
//!
//! ## Keys
//!
//! `readings` and `events` are keyed by `(sample_date, sample_time)`, the UTC
//! date partition (`YYYY.MM.DD`) and time of day (`HH:MM:SS:mmm`) derived from
//! the record's millisecond timestamp. Range queries always stay inside one
//! `sample_date`; windows spanning midnight are split by the caller.
//!
//! ## Decimals
//!
//! Weights and durations are stored as TEXT holding the decimal's canonical
//! string, so values read back are exactly what was written.
//!
//! ## Cat settings
//!
//! `cat_settings` rows are keyed by `(setting_type, name)`; the only setting
//! type in use is [`CAT_DEFINITION`]. Each cat's owner-defined weights live in
//! `cat_defined_weights`.

use std::path::Path;
use std::str::FromStr;

use cs_core::{
    CatName, DefinedWeight, Event, EventStore, Identity, IdentitySource, KeyRange, Label, Reading,
    ReadingStore, StoreError, StoreKey, ValidationError,
};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use thiserror::Error;

/// Setting type under which cats are defined.
pub const CAT_DEFINITION: &str = "cat-definition";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error")]
    Sqlite(#[from] rusqlite::Error),
    /// A key or name failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A stored decimal could not be parsed.
    #[error("invalid decimal in {column}: {value}")]
    InvalidDecimal { column: &'static str, value: String },
    /// A stored label could not be parsed.
    #[error("invalid label for event {key}")]
    InvalidLabel {
        key: StoreKey,
        #[source]
        source: ValidationError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Row counts shown by the status command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub readings: i64,
    pub events: i64,
    pub unlabeled_events: i64,
    pub cats: i64,
    pub last_reading: Option<StoreKey>,
}

/// Raw `events` row before decimal and label parsing.
type EventRow = (String, String, i64, String, String, String, String, Option<String>);

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- Raw scale samples
            CREATE TABLE IF NOT EXISTS readings (
                sample_date TEXT NOT NULL,
                sample_time TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                weight TEXT NOT NULL,
                tare INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (sample_date, sample_time)
            );

            -- One row per weighing session; cat is NULL until classified
            CREATE TABLE IF NOT EXISTS events (
                sample_date TEXT NOT NULL,
                sample_time TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                date_local TEXT NOT NULL,
                time_local TEXT NOT NULL,
                elapsed_sec TEXT NOT NULL,
                weight TEXT NOT NULL,
                cat TEXT,
                PRIMARY KEY (sample_date, sample_time)
            );

            CREATE INDEX IF NOT EXISTS idx_events_cat ON events(cat);

            CREATE TABLE IF NOT EXISTS cat_settings (
                setting_type TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (setting_type, name)
            );

            CREATE TABLE IF NOT EXISTS cat_defined_weights (
                setting_type TEXT NOT NULL,
                name TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                weight TEXT NOT NULL,
                PRIMARY KEY (setting_type, name, timestamp),
                FOREIGN KEY (setting_type, name)
                    REFERENCES cat_settings(setting_type, name) ON DELETE CASCADE
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts a batch of readings, ignoring duplicates by key.
    ///
    /// Returns the readings that were actually new, in input order.
    pub fn insert_readings(&mut self, readings: &[Reading]) -> Result<Vec<Reading>, DbError> {
        if readings.is_empty() {
            return Ok(Vec::new());
        }
        let tx = self.conn.transaction()?;
        let mut inserted = Vec::new();
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO readings (sample_date, sample_time, timestamp, weight, tare)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for reading in readings {
                let key = reading.key()?;
                let changed = stmt.execute(params![
                    key.date,
                    key.time,
                    reading.timestamp,
                    reading.weight.to_string(),
                    reading.tare,
                ])?;
                if changed > 0 {
                    inserted.push(reading.clone());
                }
            }
        }
        tx.commit()?;
        tracing::debug!(
            inserted = inserted.len(),
            total = readings.len(),
            "stored readings"
        );
        Ok(inserted)
    }

    /// Lists readings within one date partition's key range, oldest first.
    pub fn list_readings(&self, range: &KeyRange) -> Result<Vec<Reading>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT timestamp, weight, tare
            FROM readings
            WHERE sample_date = ? AND sample_time BETWEEN ? AND ?
            ORDER BY sample_time ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![range.date, range.start_time, range.end_time],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            },
        )?;
        let mut readings = Vec::new();
        for row in rows {
            let (timestamp, weight, tare) = row?;
            readings.push(Reading::new(
                timestamp,
                parse_decimal("readings.weight", weight)?,
                tare,
            ));
        }
        Ok(readings)
    }

    /// Lists events within one date partition's key range, oldest first.
    pub fn list_events(&self, range: &KeyRange) -> Result<Vec<Event>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT sample_date, sample_time, timestamp, date_local, time_local, elapsed_sec, weight, cat
            FROM events
            WHERE sample_date = ? AND sample_time BETWEEN ? AND ?
            ORDER BY sample_time ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![range.date, range.start_time, range.end_time],
            |row| -> rusqlite::Result<EventRow> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(event_from_row(row?)?);
        }
        Ok(events)
    }

    /// Lists every event stored under a UTC date partition.
    pub fn events_on(&self, date: &str) -> Result<Vec<Event>, DbError> {
        self.list_events(&KeyRange::whole_day(date))
    }

    /// Stores an event under its key.
    ///
    /// Re-storing an event that already exists refreshes its summary but
    /// keeps any label it has.
    pub fn upsert_event(&mut self, event: &Event) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO events
            (sample_date, sample_time, timestamp, date_local, time_local, elapsed_sec, weight, cat)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(sample_date, sample_time) DO UPDATE SET
                timestamp = excluded.timestamp,
                date_local = excluded.date_local,
                time_local = excluded.time_local,
                elapsed_sec = excluded.elapsed_sec,
                weight = excluded.weight,
                cat = COALESCE(events.cat, excluded.cat)
            ",
            params![
                event.date_utc,
                event.time_utc,
                event.timestamp,
                event.date_local,
                event.time_local,
                event.elapsed_sec.to_string(),
                event.weight.to_string(),
                event.cat.as_ref().map(Label::as_str),
            ],
        )?;
        tracing::debug!(key = %event.key(), weight = %event.weight, "stored event");
        Ok(())
    }

    /// Sets the label of the event at exactly `key`.
    ///
    /// Returns false if no event has that key.
    pub fn update_event_label(&mut self, key: &StoreKey, label: &Label) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "UPDATE events SET cat = ? WHERE sample_date = ? AND sample_time = ?",
            params![label.as_str(), key.date, key.time],
        )?;
        Ok(changed > 0)
    }

    /// Defines a cat if it does not exist yet.
    pub fn add_cat(&mut self, name: &CatName) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO cat_settings (setting_type, name) VALUES (?, ?)",
            params![CAT_DEFINITION, name.as_str()],
        )?;
        Ok(())
    }

    /// Records an owner-defined weight for a cat, creating the cat if needed.
    ///
    /// A second weight at the same timestamp replaces the first.
    pub fn define_cat_weight(
        &mut self,
        name: &CatName,
        timestamp: i64,
        weight: Decimal,
    ) -> Result<(), DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO cat_settings (setting_type, name) VALUES (?, ?)",
            params![CAT_DEFINITION, name.as_str()],
        )?;
        tx.execute(
            "
            INSERT INTO cat_defined_weights (setting_type, name, timestamp, weight)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(setting_type, name, timestamp) DO UPDATE SET weight = excluded.weight
            ",
            params![CAT_DEFINITION, name.as_str(), timestamp, weight.to_string()],
        )?;
        tx.commit()?;
        tracing::debug!(cat = %name, timestamp, weight = %weight, "defined cat weight");
        Ok(())
    }

    /// Loads every defined cat with its weights ordered by timestamp.
    pub fn load_identities(&self) -> Result<Vec<Identity>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT s.name, w.timestamp, w.weight
            FROM cat_settings s
            LEFT JOIN cat_defined_weights w
                ON w.setting_type = s.setting_type AND w.name = s.name
            WHERE s.setting_type = ?
            ORDER BY s.name ASC, w.timestamp ASC
            ",
        )?;
        let rows = stmt.query_map([CAT_DEFINITION], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<i64>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut identities: Vec<Identity> = Vec::new();
        for row in rows {
            let (name, timestamp, weight) = row?;
            if identities.last().is_none_or(|cat| cat.name.as_str() != name) {
                identities.push(Identity {
                    name: CatName::new(name)?,
                    defined_weights: Vec::new(),
                });
            }
            if let (Some(timestamp), Some(weight), Some(cat)) =
                (timestamp, weight, identities.last_mut())
            {
                cat.defined_weights.push(DefinedWeight {
                    timestamp,
                    weight: parse_decimal("cat_defined_weights.weight", weight)?,
                });
            }
        }
        Ok(identities)
    }

    /// Row counts and the most recent reading key.
    pub fn status(&self) -> Result<StoreStatus, DbError> {
        let count = |sql: &str| -> Result<i64, DbError> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        let last_reading = self
            .conn
            .query_row(
                "
                SELECT sample_date, sample_time FROM readings
                ORDER BY timestamp DESC LIMIT 1
                ",
                [],
                |row| {
                    Ok(StoreKey {
                        date: row.get(0)?,
                        time: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(StoreStatus {
            readings: count("SELECT COUNT(*) FROM readings")?,
            events: count("SELECT COUNT(*) FROM events")?,
            unlabeled_events: count("SELECT COUNT(*) FROM events WHERE cat IS NULL OR cat = ''")?,
            cats: count("SELECT COUNT(*) FROM cat_settings")?,
            last_reading,
        })
    }
}

fn parse_decimal(column: &'static str, value: String) -> Result<Decimal, DbError> {
    Decimal::from_str(&value).map_err(|_| DbError::InvalidDecimal { column, value })
}

fn event_from_row(row: EventRow) -> Result<Event, DbError> {
    let (date_utc, time_utc, timestamp, date_local, time_local, elapsed_sec, weight, cat) = row;
    let cat = match cat.filter(|cat| !cat.is_empty()) {
        Some(cat) => Some(cat.parse::<Label>().map_err(|source| DbError::InvalidLabel {
            key: StoreKey {
                date: date_utc.clone(),
                time: time_utc.clone(),
            },
            source,
        })?),
        None => None,
    };
    Ok(Event {
        timestamp,
        date_utc,
        time_utc,
        date_local,
        time_local,
        elapsed_sec: parse_decimal("events.elapsed_sec", elapsed_sec)?,
        weight: parse_decimal("events.weight", weight)?,
        cat,
    })
}

impl ReadingStore for Database {
    fn readings_in_range(&self, range: &KeyRange) -> Result<Vec<Reading>, StoreError> {
        self.list_readings(range).map_err(StoreError::new)
    }
}

impl EventStore for Database {
    fn events_in_range(&self, range: &KeyRange) -> Result<Vec<Event>, StoreError> {
        self.list_events(range).map_err(StoreError::new)
    }

    fn put_event(&mut self, event: &Event) -> Result<(), StoreError> {
        self.upsert_event(event).map_err(StoreError::new)
    }

    fn set_event_label(&mut self, key: &StoreKey, label: &Label) -> Result<bool, StoreError> {
        self.update_event_label(key, label).map_err(StoreError::new)
    }
}

impl IdentitySource for Database {
    fn identities(&self) -> Result<Vec<Identity>, StoreError> {
        self.load_identities().map_err(StoreError::new)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use cs_core::trigger::{on_event, on_reading};
    use cs_core::{ClassifierConfig, ExtractorConfig};
    use rust_decimal_macros::dec;

    use super::*;

    // 2021-11-15T12:19:20.263Z
    const TS: i64 = 1_636_978_760_263;
    // 2021-11-16T00:00:00.000Z
    const MIDNIGHT: i64 = 1_637_020_800_000;

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_has_expected_tables() {
        let db = Database::open_in_memory().unwrap();
        let mut stmt = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .unwrap();
        let tables: HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        for table in ["readings", "events", "cat_settings", "cat_defined_weights"] {
            assert!(tables.contains(table), "missing table {table}");
        }
    }

    #[test]
    fn open_is_idempotent_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("catscale.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.insert_readings(&[Reading::new(TS, dec!(4.5), false)])
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.status().unwrap().readings, 1);
    }

    #[test]
    fn insert_readings_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let readings = [
            Reading::new(TS, dec!(0), false),
            Reading::new(TS - 1_000, dec!(9.80), false),
        ];
        assert_eq!(db.insert_readings(&readings).unwrap().len(), 2);
        assert!(db.insert_readings(&readings).unwrap().is_empty());
        assert_eq!(db.status().unwrap().readings, 2);
    }

    #[test]
    fn list_readings_respects_range_and_keeps_decimals() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_readings(&[
            Reading::new(TS - 2_000, dec!(9.80), false),
            Reading::new(TS - 1_000, dec!(0), true),
            Reading::new(TS, dec!(0), false),
            Reading::new(TS + 1, dec!(3.3), false),
        ])
        .unwrap();

        let start = StoreKey::from_timestamp_ms(TS - 2_000).unwrap();
        let end = StoreKey::from_timestamp_ms(TS).unwrap();
        let readings = db
            .list_readings(&KeyRange {
                date: end.date,
                start_time: start.time,
                end_time: end.time,
            })
            .unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[0].weight.to_string(), "9.80");
        assert!(readings[1].tare);
        assert_eq!(readings[2].timestamp, TS);
    }

    #[test]
    fn upsert_event_keeps_existing_label() {
        let mut db = Database::open_in_memory().unwrap();
        let event = sample_event(TS, dec!(9.8));
        db.upsert_event(&event).unwrap();
        assert!(db.update_event_label(&event.key(), &Label::OutlierHigh).unwrap());

        let mut refreshed = event.clone();
        refreshed.weight = dec!(9.9);
        db.upsert_event(&refreshed).unwrap();

        let events = db.events_on("2021.11.15").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].weight, dec!(9.9));
        assert_eq!(events[0].cat, Some(Label::OutlierHigh));
    }

    #[test]
    fn update_label_of_missing_event_reports_false() {
        let mut db = Database::open_in_memory().unwrap();
        let key = StoreKey::from_timestamp_ms(TS).unwrap();
        assert!(!db.update_event_label(&key, &Label::Outlier).unwrap());
    }

    #[test]
    fn empty_stored_label_reads_as_unlabeled() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "
                INSERT INTO events
                (sample_date, sample_time, timestamp, date_local, time_local, elapsed_sec, weight, cat)
                VALUES ('2021.11.15', '12:19:20:263', ?, '', '', '1.0', '9.8', '')
                ",
                [TS],
            )
            .unwrap();
        let events = db.events_on("2021.11.15").unwrap();
        assert!(events[0].cat.is_none());
        assert_eq!(db.status().unwrap().unlabeled_events, 1);
    }

    #[test]
    fn identities_group_weights_by_cat() {
        let mut db = Database::open_in_memory().unwrap();
        let mocha = CatName::new("Mocha").unwrap();
        let latte = CatName::new("Latte").unwrap();
        db.define_cat_weight(&mocha, 200, dec!(8.9)).unwrap();
        db.define_cat_weight(&mocha, 100, dec!(8.6)).unwrap();
        db.define_cat_weight(&latte, 100, dec!(10.1)).unwrap();
        db.define_cat_weight(&latte, 100, dec!(10.3)).unwrap();
        db.add_cat(&CatName::new("Chai").unwrap()).unwrap();

        let cats = db.load_identities().unwrap();
        let names: Vec<&str> = cats.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Chai", "Latte", "Mocha"]);
        assert!(cats[0].defined_weights.is_empty());
        assert_eq!(
            cats[1].defined_weights,
            vec![DefinedWeight {
                timestamp: 100,
                weight: dec!(10.3)
            }]
        );
        let mocha_ts: Vec<i64> = cats[2].defined_weights.iter().map(|w| w.timestamp).collect();
        assert_eq!(mocha_ts, [100, 200]);
    }

    #[test]
    fn pipeline_runs_against_sqlite_across_midnight() {
        let mut db = Database::open_in_memory().unwrap();
        db.define_cat_weight(&CatName::new("Mocha").unwrap(), 0, dec!(8.2))
            .unwrap();
        db.define_cat_weight(&CatName::new("Latte").unwrap(), 0, dec!(11.0))
            .unwrap();
        let readings = [
            Reading::new(MIDNIGHT - 40_000, dec!(0), false),
            Reading::new(MIDNIGHT - 20_000, dec!(7.9), false),
            Reading::new(MIDNIGHT, dec!(8.3), false),
            Reading::new(MIDNIGHT + 5_000, dec!(8.1), false),
            Reading::new(MIDNIGHT + 10_000, dec!(0), false),
        ];
        db.insert_readings(&readings).unwrap();

        let event = on_reading(&mut db, &readings[4], &ExtractorConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(event.weight, dec!(8.3));
        assert_eq!(event.elapsed_sec, dec!(25.0));
        assert_eq!(event.date_utc, "2021.11.16");

        let classified = on_event(&mut db, event.timestamp, &ClassifierConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(classified.event.cat.unwrap().as_str(), "Mocha");

        let stored = db.events_on("2021.11.16").unwrap();
        assert_eq!(stored[0].cat.as_ref().map(Label::as_str), Some("Mocha"));
        assert_eq!(db.status().unwrap().unlabeled_events, 0);
    }

    fn sample_event(ts: i64, weight: Decimal) -> Event {
        let key = StoreKey::from_timestamp_ms(ts).unwrap();
        Event {
            timestamp: ts,
            date_utc: key.date,
            time_utc: key.time,
            date_local: "2021.11.15".to_string(),
            time_local: "07:19:20:263".to_string(),
            elapsed_sec: dec!(12.5),
            weight,
            cat: None,
        }
    }
}

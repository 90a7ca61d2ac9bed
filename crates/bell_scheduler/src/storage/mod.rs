//! Durable local copy of the last successfully fetched schedule.

mod error;

pub use error::StorageError;

use crate::schedule::{FreshnessMarker, RawScheduleDescription};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schedule_cache (
    slot        INTEGER PRIMARY KEY CHECK (slot = 1),
    description TEXT NOT NULL,
    marker      TEXT,
    saved_at    TEXT NOT NULL
);
";

/// The stored snapshot and the marker it was saved under.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSchedule {
    pub description: RawScheduleDescription,
    pub marker: Option<FreshnessMarker>,
    pub saved_at: DateTime<Utc>,
}

/// Storage for the single most recent schedule snapshot. Each save replaces
/// the previous one.
pub trait DurableStore: Send + Sync {
    fn load(&self) -> Result<Option<CachedSchedule>, StorageError>;

    fn save(&self, entry: &CachedSchedule) -> Result<(), StorageError>;

    /// Marker of the stored snapshot, without decoding the snapshot itself.
    fn load_marker(&self) -> Result<Option<FreshnessMarker>, StorageError>;

    fn has_data(&self) -> bool;

    fn clear(&self) -> Result<(), StorageError>;
}

/// [`DurableStore`] backed by a SQLite file.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and initializes the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("Opened schedule cache at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStore for SqliteStore {
    fn load(&self) -> Result<Option<CachedSchedule>, StorageError> {
        let db = self.conn();
        let row = db
            .query_row(
                "SELECT description, marker, saved_at FROM schedule_cache WHERE slot = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, DateTime<Utc>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((description, marker, saved_at)) = row else {
            return Ok(None);
        };

        let description =
            RawScheduleDescription::from_json(&description).map_err(|e| StorageError::Corrupt {
                message: e.to_string(),
            })?;

        Ok(Some(CachedSchedule {
            description,
            marker: marker.map(FreshnessMarker::new),
            saved_at,
        }))
    }

    fn save(&self, entry: &CachedSchedule) -> Result<(), StorageError> {
        let description = entry
            .description
            .to_json()
            .map_err(|e| StorageError::Corrupt {
                message: e.to_string(),
            })?;

        let db = self.conn();
        db.execute(
            "INSERT INTO schedule_cache (slot, description, marker, saved_at)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(slot) DO UPDATE SET
                description = excluded.description,
                marker = excluded.marker,
                saved_at = excluded.saved_at",
            (
                &description,
                entry.marker.as_ref().map(FreshnessMarker::as_str),
                entry.saved_at,
            ),
        )?;

        debug!(
            marker = ?entry.marker,
            bytes = description.len(),
            "Saved schedule snapshot"
        );
        Ok(())
    }

    fn load_marker(&self) -> Result<Option<FreshnessMarker>, StorageError> {
        let db = self.conn();
        let marker: Option<Option<String>> = db
            .query_row(
                "SELECT marker FROM schedule_cache WHERE slot = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(marker.flatten().map(FreshnessMarker::new))
    }

    fn has_data(&self) -> bool {
        let db = self.conn();
        let count: i64 = db
            .query_row("SELECT COUNT(*) FROM schedule_cache", [], |row| row.get(0))
            .unwrap_or(0);
        count > 0
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.conn().execute("DELETE FROM schedule_cache", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(marker: &str) -> CachedSchedule {
        let description = serde_json::from_value(json!({
            "CourseSchedule": [{"courseType": "X", "startDate": "2024-01-01", "days": 2}],
            "CourseTypeDays": {"X": ["A", "B"]},
            "DailyPatternBells": {"X": {"A": [{"time": "08:00"}]}},
            "BellConfig": {"1": 3},
            "generatedAt": marker
        }))
        .unwrap();
        CachedSchedule {
            description,
            marker: Some(FreshnessMarker::new(marker)),
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_store() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert!(!store.has_data());
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.load_marker().unwrap(), None);
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save(&snapshot("m1")).unwrap();
        let second = snapshot("m2");
        store.save(&second).unwrap();

        let loaded = store.load().unwrap().unwrap();

        assert!(store.has_data());
        assert_eq!(loaded.description, second.description);
        assert_eq!(loaded.marker, Some(FreshnessMarker::new("m2")));
        assert_eq!(store.load_marker().unwrap(), Some(FreshnessMarker::new("m2")));
    }

    #[test]
    fn test_snapshot_without_marker() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut entry = snapshot("m1");
        entry.marker = None;
        store.save(&entry).unwrap();

        assert!(store.has_data());
        assert_eq!(store.load_marker().unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save(&snapshot("m1")).unwrap();
        store.clear().unwrap();

        assert!(!store.has_data());
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO schedule_cache (slot, description, marker, saved_at)
                 VALUES (1, 'not json', NULL, ?1)",
                [Utc::now()],
            )
            .unwrap();

        assert!(matches!(store.load(), Err(StorageError::Corrupt { .. })));
    }

    #[test]
    fn test_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!(
            "bell_scheduler_store_{}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        SqliteStore::open(&path).unwrap().save(&snapshot("m1")).unwrap();
        let reopened = SqliteStore::open(&path).unwrap();

        assert_eq!(
            reopened.load_marker().unwrap(),
            Some(FreshnessMarker::new("m1"))
        );
        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}

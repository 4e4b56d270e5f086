//! SQLite database store implementation.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;
use crate::engine::{Presence, PresenceRecord};

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::with_connection(Connection::open(path)?)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, DbError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.lock()?;
        conn.execute_batch(include_str!("../../migrations/000001_init.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 1 failed: {}", e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    /// Load the persisted state for a device, if any.
    pub fn load_device(&self, device: &str) -> Result<Option<StoredDevice>, DbError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT presence, failures, last_seen, last_attempt, controller_last_seen FROM device_state WHERE device = ?1",
                params![device],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(presence, failures, last_seen, last_attempt, controller_last_seen)| StoredDevice {
            record: PresenceRecord {
                presence: Presence::parse(&presence).unwrap_or(Presence::NotPresent),
                failures: failures.clamp(0, u32::MAX as i64) as u32,
                last_seen: last_seen.as_deref().and_then(parse_db_time),
                last_attempt: last_attempt.as_deref().and_then(parse_db_time),
            },
            controller_last_seen: controller_last_seen.as_deref().and_then(parse_db_time),
        }))
    }

    /// Insert or replace the state for a device.
    pub fn save_device(&self, device: &str, state: &StoredDevice) -> Result<(), DbError> {
        let conn = self.lock()?;
        let record = &state.record;
        conn.execute(
            "INSERT INTO device_state (device, presence, failures, last_seen, last_attempt, controller_last_seen, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(device) DO UPDATE SET
             presence=excluded.presence, failures=excluded.failures, last_seen=excluded.last_seen,
             last_attempt=excluded.last_attempt, controller_last_seen=excluded.controller_last_seen,
             updated_at=excluded.updated_at",
            params![
                device,
                record.presence.as_str(),
                record.failures as i64,
                record.last_seen.map(format_db_time),
                record.last_attempt.map(format_db_time),
                state.controller_last_seen.map(format_db_time),
                format_db_time(Utc::now()),
            ],
        )?;
        Ok(())
    }
}

fn format_db_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = ["%Y-%m-%d %H:%M:%S%.9f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

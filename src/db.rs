//! Database module for osmate
//!
//! Stores the credential pair each user linked for map edits, and the
//! user's settings.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("No credentials stored for user: {0}")]
    NoSuchRecord(String),
    #[error("Credentials already stored for user: {0}")]
    AlreadyExists(String),
    #[error("Database lock poisoned")]
    LockPoisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Credential Operations ====================

    /// Get the stored pair for a user
    pub fn get_credential(&self, user_id: &str) -> DbResult<Option<CredentialRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT user_id, key, secret, created_at, updated_at
                 FROM credentials WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(CredentialRecord {
                        user_id: row.get(0)?,
                        key: row.get(1)?,
                        secret: row.get(2)?,
                        created_at: parse_datetime(&row.get::<_, String>(3)?),
                        updated_at: parse_datetime(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Store a pair for a user who has none yet
    pub fn put_credential(&self, user_id: &str, key: &str, secret: &str) -> DbResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO credentials (user_id, key, secret, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user_id, key, secret, now],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                DbError::AlreadyExists(user_id.to_string())
            }
            other => DbError::Sqlite(other),
        })?;
        Ok(())
    }

    /// Replace the pair of a user who already has one
    pub fn update_credential(&self, user_id: &str, key: &str, secret: &str) -> DbResult<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE credentials SET key = ?2, secret = ?3, updated_at = ?4 WHERE user_id = ?1",
            params![user_id, key, secret, Utc::now().to_rfc3339()],
        )?;
        if rows == 0 {
            return Err(DbError::NoSuchRecord(user_id.to_string()));
        }
        Ok(())
    }

    pub fn delete_credential(&self, user_id: &str) -> DbResult<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM credentials WHERE user_id = ?1",
            params![user_id],
        )?;
        if rows == 0 {
            return Err(DbError::NoSuchRecord(user_id.to_string()));
        }
        Ok(())
    }

    /// Insert, or update when a record exists. Returns true when a record was created.
    ///
    /// Runs under one lock, so concurrent upserts for a new user create it once.
    pub fn upsert_credential(&self, user_id: &str, key: &str, secret: &str) -> DbResult<bool> {
        let conn = self.lock()?;
        let existed: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM credentials WHERE user_id = ?1)",
            params![user_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO credentials (user_id, key, secret, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                key = excluded.key,
                secret = excluded.secret,
                updated_at = excluded.updated_at",
            params![user_id, key, secret, Utc::now().to_rfc3339()],
        )?;
        Ok(!existed)
    }

    // ==================== Settings Operations ====================

    pub fn get_settings(&self, user_id: &str) -> DbResult<Option<SettingsRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT osm_name, language FROM user_settings WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(SettingsRecord {
                        osm_name: row.get(0)?,
                        language: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Replace all settings of a user
    pub fn put_settings(
        &self,
        user_id: &str,
        osm_name: Option<&str>,
        language: Option<&str>,
    ) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_settings (user_id, osm_name, language, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                osm_name = excluded.osm_name,
                language = excluded.language,
                updated_at = excluded.updated_at",
            params![user_id, osm_name, language, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

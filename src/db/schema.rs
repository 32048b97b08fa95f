//! Database schema and types

use chrono::{DateTime, Utc};
use std::fmt;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS credentials (
    user_id TEXT PRIMARY KEY,
    key TEXT NOT NULL,
    secret TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_settings (
    user_id TEXT PRIMARY KEY,
    osm_name TEXT,
    language TEXT,
    updated_at TEXT NOT NULL
);
";

/// Settings a user chose in the settings menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsRecord {
    pub osm_name: Option<String>,
    pub language: Option<String>,
}

/// One stored credential pair per user
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub user_id: String,
    pub key: String,
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("user_id", &self.user_id)
            .field("key", &self.key)
            .field("secret", &"..")
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

//! Trait abstractions for runtime I/O
//!
//! The remote services are traits in `client`; per-user account data is
//! reached through [`AccountStore`] so the executor can run against mocks.

use crate::client::Credential;
use crate::db::Database;
use crate::session::UserSettings;
use async_trait::async_trait;

/// Per-user account data: the credential linked for map edits and the
/// settings chosen in the settings menu
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn credential(&self, user_id: &str) -> Result<Option<Credential>, String>;

    /// Stored settings, or the defaults for a user who never saved any
    async fn settings(&self, user_id: &str) -> Result<UserSettings, String>;

    async fn save_settings(&self, user_id: &str, settings: &UserSettings) -> Result<(), String>;
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as AccountStore
#[derive(Clone)]
pub struct DatabaseAccounts {
    db: Database,
}

impl DatabaseAccounts {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccountStore for DatabaseAccounts {
    async fn credential(&self, user_id: &str) -> Result<Option<Credential>, String> {
        let record = self.db.get_credential(user_id).map_err(|e| e.to_string())?;
        Ok(record.map(|r| Credential::from_record(r.key, r.secret)))
    }

    async fn settings(&self, user_id: &str) -> Result<UserSettings, String> {
        let record = self.db.get_settings(user_id).map_err(|e| e.to_string())?;
        Ok(record
            .map(|r| UserSettings {
                osm_name: r.osm_name,
                language: r.language,
            })
            .unwrap_or_default())
    }

    async fn save_settings(&self, user_id: &str, settings: &UserSettings) -> Result<(), String> {
        self.db
            .put_settings(
                user_id,
                settings.osm_name.as_deref(),
                settings.language.as_deref(),
            )
            .map_err(|e| e.to_string())
    }
}

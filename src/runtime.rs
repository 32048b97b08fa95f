//! Runtime for user sessions
//!
//! Each active user has one session task fed by an mpsc queue, so turns for
//! the same user run strictly in order while different users run
//! concurrently. A session task removes its own store entry when it ends and
//! hands triggers still queued behind its last turn back to the store.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{SessionMessage, SessionRuntime, TriggerOutcome, TriggerReply};
pub use traits::*;

use crate::client::{GeoDataService, IssueService};
use crate::session::{Event, SessionContext, UserSettings};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

/// Runtime with trait-object services, as wired up in `main`
pub type ProductionRuntime = SessionRuntime<dyn IssueService, dyn GeoDataService, dyn AccountStore>;

const QUEUE_DEPTH: usize = 32;

/// Sessions a single trigger may be handed to before giving up
const DELIVERY_ATTEMPTS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Session ended before replying")]
    SessionEnded,
}

/// Settings copied into every new session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub page_size: NonZeroUsize,
    pub search_radius_m: f64,
    pub changeset_comment: String,
    pub idle_timeout: Duration,
}

impl SessionSettings {
    fn context(&self, user_id: &str, settings: UserSettings) -> SessionContext {
        SessionContext::new(user_id, self.page_size)
            .with_search_radius(self.search_radius_m)
            .with_changeset_comment(self.changeset_comment.clone())
            .with_settings(settings)
    }
}

/// Services shared by all sessions
#[derive(Clone)]
pub struct Services {
    pub issues: Arc<dyn IssueService>,
    pub geodata: Arc<dyn GeoDataService>,
    pub accounts: Arc<dyn AccountStore>,
}

/// Handle to interact with a running session
#[derive(Clone)]
struct SessionHandle {
    event_tx: mpsc::Sender<SessionMessage>,
    generation: Uuid,
}

/// Live sessions keyed by user identity
pub struct SessionStore {
    services: Services,
    settings: SessionSettings,
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionStore {
    pub fn new(services: Services, settings: SessionSettings) -> Self {
        Self {
            services,
            settings,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get the user's session, starting one if there is none
    async fn get_or_create(&self, user_id: &str) -> SessionHandle {
        // Fast path: check if already exists
        {
            let sessions = self.sessions.read().await;
            if let Some(handle) = sessions.get(user_id) {
                if !handle.event_tx.is_closed() {
                    return handle.clone();
                }
            }
        }

        let settings = match self.services.accounts.settings(user_id).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load settings, using defaults");
                UserSettings::default()
            }
        };

        let mut sessions = self.sessions.write().await;
        // Double-check after acquiring write lock
        if let Some(handle) = sessions.get(user_id) {
            if !handle.event_tx.is_closed() {
                return handle.clone();
            }
        }

        let (event_tx, event_rx) = mpsc::channel(QUEUE_DEPTH);
        let generation = Uuid::new_v4();
        let runtime: ProductionRuntime = SessionRuntime::new(
            self.settings.context(user_id, settings),
            Arc::clone(&self.services.issues),
            Arc::clone(&self.services.geodata),
            Arc::clone(&self.services.accounts),
            self.settings.idle_timeout,
            event_rx,
            event_tx.clone(),
        );

        let registry = Arc::clone(&self.sessions);
        let owner = user_id.to_string();
        tokio::spawn(async move {
            runtime.run().await;
            let mut sessions = registry.write().await;
            // A newer session may already hold the slot
            if sessions.get(&owner).is_some_and(|h| h.generation == generation) {
                sessions.remove(&owner);
            }
        });

        tracing::debug!(user_id, %generation, "Session created");
        let handle = SessionHandle {
            event_tx,
            generation,
        };
        sessions.insert(user_id.to_string(), handle.clone());
        handle
    }

    /// Route a trigger to the user's session and wait for its reply
    pub async fn send_trigger(&self, user_id: &str, event: Event) -> Result<TriggerReply, StoreError> {
        let mut event = event;
        // A session can end between lookup and send, or with the trigger
        // still queued; either way the trigger goes to a fresh session
        for _ in 0..DELIVERY_ATTEMPTS {
            let handle = self.get_or_create(user_id).await;
            let (reply, reply_rx) = oneshot::channel();
            match handle
                .event_tx
                .send(SessionMessage::Trigger { event, reply })
                .await
            {
                Ok(()) => match reply_rx.await.map_err(|_| StoreError::SessionEnded)? {
                    TriggerOutcome::Replied(reply) => return Ok(reply),
                    TriggerOutcome::Requeue(returned) => event = returned,
                },
                Err(mpsc::error::SendError(message)) => {
                    let SessionMessage::Trigger { event: returned, .. } = message else {
                        return Err(StoreError::SessionEnded);
                    };
                    event = returned;
                }
            }
            self.forget(user_id, handle.generation).await;
        }
        Err(StoreError::SessionEnded)
    }

    /// Current state label, or `None` when the user has no session
    pub async fn state(&self, user_id: &str) -> Option<&'static str> {
        let handle = self.sessions.read().await.get(user_id).cloned()?;
        let (reply, reply_rx) = oneshot::channel();
        handle.event_tx.send(SessionMessage::Inspect(reply)).await.ok()?;
        reply_rx.await.ok()
    }

    /// Number of live sessions
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn forget(&self, user_id: &str, generation: Uuid) {
        let mut sessions = self.sessions.write().await;
        if sessions.get(user_id).is_some_and(|h| h.generation == generation) {
            sessions.remove(user_id);
        }
    }
}

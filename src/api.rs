//! HTTP API for osmate
//!
//! The chat front end forwards each user action here as a trigger and
//! relays the returned messages.

mod handlers;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::runtime::SessionStore;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub db: Database,
}

impl AppState {
    pub fn new(sessions: SessionStore, db: Database) -> Self {
        Self {
            sessions: Arc::new(sessions),
            db,
        }
    }
}

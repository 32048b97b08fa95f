//! Effects produced by state transitions

use super::{SearchQuery, UserSettings};
use crate::client::{RemoteError, RemoteErrorKind};
use crate::geo::{ElementDraft, ElementRef, TraceDraft};
use serde::Serialize;

/// Message for the user, returned with the reply to a trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    Text { text: String },
    Failure { kind: RemoteErrorKind, message: String },
}

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// `language` is the user's preference, `None` for the service default
    SearchIssues {
        query: SearchQuery,
        radius_m: f64,
        language: Option<String>,
    },

    FetchIssueDetail {
        issue_id: String,
        language: Option<String>,
    },

    FetchElement { element: ElementRef },

    /// Open a changeset, write the draft, close the changeset
    SubmitEdit { draft: ElementDraft, comment: String },

    UploadTrace { draft: TraceDraft },

    /// Persist the user's settings
    SaveSettings { settings: UserSettings },

    /// Use these settings for the rest of the session
    ApplySettings(UserSettings),

    Notify(Notice),
}

impl Effect {
    pub fn text(text: impl Into<String>) -> Self {
        Effect::Notify(Notice::Text { text: text.into() })
    }

    /// Failure notice carrying only the short user-facing description
    pub fn failure(error: &RemoteError) -> Self {
        Effect::Notify(Notice::Failure {
            kind: error.kind,
            message: error.user_message().to_string(),
        })
    }

    pub fn is_remote_call(&self) -> bool {
        !matches!(self, Effect::Notify(_) | Effect::ApplySettings(_))
    }
}

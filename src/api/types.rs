//! API request and response types

use crate::geo::ElementKind;
use crate::session::{Notice, SearchQuery};
use serde::{Deserialize, Serialize};

/// Trigger sent on behalf of a chat user
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerRequest {
    StartSearch(SearchQuery),
    PageNext,
    PagePrev,
    SelectItem {
        index: usize,
    },
    EditElement {
        element_type: ElementKind,
        id: i64,
    },
    StartUpload {
        payload_base64: String,
        filename: String,
    },
    TextReply {
        text: String,
    },
    ToggleVisibility,
    ConfirmSubmit,
    OpenSettings,
    Cancel,
}

/// Reply to a trigger
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub state: &'static str,
    pub messages: Vec<Notice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response with a session's state
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub state: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionCountResponse {
    pub active: usize,
}

/// Request to link credentials. An empty secret stores a bearer token.
#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub key: String,
    #[serde(default)]
    pub secret: String,
}

/// Response for credential writes
#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub created: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

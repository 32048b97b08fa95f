//! Remote API error types

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Remote error with classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    /// Diagnostic text from the transport or the server body
    pub message: String,
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status.as_u16());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Conflict, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::MethodNotAllowed, message)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Gone, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::UnclassifiedTransport, message)
    }

    /// Failure to send or to read a response
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::transport(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::transport(format!("Connection failed: {e}"))
        } else {
            Self::transport(format!("Request failed: {e}"))
        }
    }

    /// Short text fit for the chat user
    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

/// Failure categories shared by every remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Nothing matches the request (404, or an empty search)
    NotFound,
    /// Malformed or missing input (400, 412 on the OSM API)
    Validation,
    /// A state precondition failed, e.g. a closed changeset (409)
    Conflict,
    /// Operation not permitted in this context (403, 405)
    MethodNotAllowed,
    /// The entity existed once and was deleted (410)
    Gone,
    /// Everything else, including network failures
    UnclassifiedTransport,
}

impl RemoteErrorKind {
    pub fn user_message(self) -> &'static str {
        match self {
            Self::NotFound => "Nothing found.",
            Self::Validation => "The request was rejected as invalid.",
            Self::Conflict => "The data changed or is closed for edits.",
            Self::MethodNotAllowed => "That action is not allowed here.",
            Self::Gone => "That object has been deleted.",
            Self::UnclassifiedTransport => "The service could not be reached, try again later.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Gone => "gone",
            Self::UnclassifiedTransport => "unclassified_transport",
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status table common to both services
pub(crate) fn classify_status(status: StatusCode) -> RemoteErrorKind {
    match status.as_u16() {
        400 => RemoteErrorKind::Validation,
        403 | 405 => RemoteErrorKind::MethodNotAllowed,
        404 => RemoteErrorKind::NotFound,
        409 => RemoteErrorKind::Conflict,
        410 => RemoteErrorKind::Gone,
        _ => RemoteErrorKind::UnclassifiedTransport,
    }
}

//! Remote service clients
//!
//! Two HTTP services sit behind traits so the session runtime can be driven
//! by mocks: Osmose for issues and the OSM API for geodata. Every failure
//! leaves a client as a classified [`RemoteError`].

mod error;
pub mod osm_api;
mod osm_xml;
pub mod osmose;

pub use error::{RemoteError, RemoteErrorKind};
pub use osm_api::OsmApiClient;
pub use osmose::OsmoseClient;

use crate::geo::{ChangeSet, Element, ElementDraft, ElementRef, Issue, TraceDraft};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Opaque authorization handed over by the OAuth collaborator.
///
/// Clients only attach it to requests; they never obtain or refresh it.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    KeySecret { key: String, secret: String },
}

impl Credential {
    /// Stored `(key, secret)` record. An empty secret means the key is a bearer token.
    pub fn from_record(key: String, secret: String) -> Self {
        if secret.is_empty() {
            Credential::Bearer(key)
        } else {
            Credential::KeySecret { key, secret }
        }
    }

    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credential::Bearer(token) => request.bearer_auth(token),
            Credential::KeySecret { key, secret } => request.basic_auth(key, Some(secret)),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Credential::Bearer(..)"),
            Credential::KeySecret { key, .. } => {
                write!(f, "Credential::KeySecret {{ key: {key:?}, .. }}")
            }
        }
    }
}

/// Issue lookups (Osmose).
///
/// `language` overrides the service's default language for issue texts.
#[async_trait]
pub trait IssueService: Send + Sync {
    async fn search_by_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError>;

    async fn search_by_user(
        &self,
        username: &str,
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError>;

    /// Single issue with its elements and bounding box
    async fn get_detail(&self, issue_id: &str, language: Option<&str>) -> Result<Issue, RemoteError>;
}

/// Geodata reads and writes (OSM API)
#[async_trait]
pub trait GeoDataService: Send + Sync {
    async fn create_changeset(
        &self,
        credential: &Credential,
        tags: &BTreeMap<String, String>,
    ) -> Result<ChangeSet, RemoteError>;

    async fn get_changeset(&self, id: u64, include_discussion: bool)
        -> Result<ChangeSet, RemoteError>;

    /// Close an open changeset. Closing is one-way.
    async fn close_changeset(
        &self,
        credential: &Credential,
        changeset: &mut ChangeSet,
    ) -> Result<(), RemoteError>;

    async fn get_element(&self, element: ElementRef) -> Result<Element, RemoteError>;

    async fn create_element(
        &self,
        credential: &Credential,
        draft: &ElementDraft,
        changeset: &ChangeSet,
    ) -> Result<Element, RemoteError>;

    /// Returns the element at its new version
    async fn edit_element(
        &self,
        credential: &Credential,
        draft: &ElementDraft,
        changeset: &ChangeSet,
    ) -> Result<Element, RemoteError>;

    /// Returns the new (deleted) version number
    async fn delete_element(
        &self,
        credential: &Credential,
        element: &Element,
        changeset: &ChangeSet,
    ) -> Result<u64, RemoteError>;

    /// Returns the trace id
    async fn upload_trace(
        &self,
        credential: &Credential,
        trace: &TraceDraft,
    ) -> Result<u64, RemoteError>;
}

/// Writes must target a changeset that is still open; checked before any request goes out
pub(crate) fn ensure_open(changeset: &ChangeSet) -> Result<(), RemoteError> {
    if changeset.is_open() {
        Ok(())
    } else {
        Err(RemoteError::conflict(format!(
            "changeset {} is already closed",
            changeset.id
        )))
    }
}

// ============================================================================
// Logging wrappers
// ============================================================================

fn log_outcome<T>(
    service: &str,
    call: &str,
    started: std::time::Instant,
    result: &Result<T, RemoteError>,
) {
    let duration_ms = started.elapsed().as_millis();
    match result {
        Ok(_) => tracing::info!(service, call, duration_ms = %duration_ms, "remote call completed"),
        Err(e) => tracing::warn!(
            service,
            call,
            duration_ms = %duration_ms,
            remote_error = %e.kind,
            status = ?e.status,
            error = %e.message,
            "remote call failed"
        ),
    }
}

/// Logging wrapper for issue services
pub struct LoggingIssueService {
    inner: Arc<dyn IssueService>,
}

impl LoggingIssueService {
    pub fn new(inner: Arc<dyn IssueService>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl IssueService for LoggingIssueService {
    async fn search_by_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.search_by_location(lat, lon, radius_m, language).await;
        log_outcome("osmose", "search_by_location", started, &result);
        result
    }

    async fn search_by_user(
        &self,
        username: &str,
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.search_by_user(username, language).await;
        log_outcome("osmose", "search_by_user", started, &result);
        result
    }

    async fn get_detail(&self, issue_id: &str, language: Option<&str>) -> Result<Issue, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.get_detail(issue_id, language).await;
        log_outcome("osmose", "get_detail", started, &result);
        result
    }
}

/// Logging wrapper for geodata services
pub struct LoggingGeoDataService {
    inner: Arc<dyn GeoDataService>,
}

impl LoggingGeoDataService {
    pub fn new(inner: Arc<dyn GeoDataService>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl GeoDataService for LoggingGeoDataService {
    async fn create_changeset(
        &self,
        credential: &Credential,
        tags: &BTreeMap<String, String>,
    ) -> Result<ChangeSet, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.create_changeset(credential, tags).await;
        log_outcome("osm", "create_changeset", started, &result);
        result
    }

    async fn get_changeset(
        &self,
        id: u64,
        include_discussion: bool,
    ) -> Result<ChangeSet, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.get_changeset(id, include_discussion).await;
        log_outcome("osm", "get_changeset", started, &result);
        result
    }

    async fn close_changeset(
        &self,
        credential: &Credential,
        changeset: &mut ChangeSet,
    ) -> Result<(), RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.close_changeset(credential, changeset).await;
        log_outcome("osm", "close_changeset", started, &result);
        result
    }

    async fn get_element(&self, element: ElementRef) -> Result<Element, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.get_element(element).await;
        log_outcome("osm", "get_element", started, &result);
        result
    }

    async fn create_element(
        &self,
        credential: &Credential,
        draft: &ElementDraft,
        changeset: &ChangeSet,
    ) -> Result<Element, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.create_element(credential, draft, changeset).await;
        log_outcome("osm", "create_element", started, &result);
        result
    }

    async fn edit_element(
        &self,
        credential: &Credential,
        draft: &ElementDraft,
        changeset: &ChangeSet,
    ) -> Result<Element, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.edit_element(credential, draft, changeset).await;
        log_outcome("osm", "edit_element", started, &result);
        result
    }

    async fn delete_element(
        &self,
        credential: &Credential,
        element: &Element,
        changeset: &ChangeSet,
    ) -> Result<u64, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.delete_element(credential, element, changeset).await;
        log_outcome("osm", "delete_element", started, &result);
        result
    }

    async fn upload_trace(
        &self,
        credential: &Credential,
        trace: &TraceDraft,
    ) -> Result<u64, RemoteError> {
        let started = std::time::Instant::now();
        let result = self.inner.upload_trace(credential, trace).await;
        log_outcome("osm", "upload_trace", started, &result);
        result
    }
}

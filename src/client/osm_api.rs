//! OpenStreetMap API (v0.6) client

use super::error::classify_status;
use super::{ensure_open, osm_xml, Credential, GeoDataService, RemoteError, RemoteErrorKind};
use crate::geo::{
    Author, BoundingBox, ChangeSet, Comment, Element, ElementBody, ElementDraft, ElementKind,
    ElementRef, Member, TraceDraft,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{multipart, Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openstreetmap.org/api/0.6";

/// OSM API service implementation
pub struct OsmApiClient {
    client: Client,
    base_url: String,
}

impl OsmApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("osmate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Status to error kind. The OSM API reports unmet preconditions
    /// (missing way nodes, elements still in use) as 412, which is a
    /// validation failure from the caller's point of view.
    fn classify_error(status: StatusCode, error_header: Option<&str>, body: &str) -> RemoteError {
        let kind = match status {
            StatusCode::PRECONDITION_FAILED => RemoteErrorKind::Validation,
            other => classify_status(other),
        };
        let detail = error_header
            .filter(|h| !h.is_empty())
            .unwrap_or(body)
            .trim();
        let message = if detail.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {detail}")
        };
        RemoteError::new(kind, message).with_status(status)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{path}", self.base_url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(&e))?;

        let status = response.status();
        let error_header = response
            .headers()
            .get("error")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, error_header.as_deref(), &body));
        }
        Ok(body)
    }

    fn xml(request: RequestBuilder, body: String) -> RequestBuilder {
        request
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(body)
    }
}

fn parse_number(body: &str, what: &str) -> Result<u64, RemoteError> {
    body.trim()
        .parse()
        .map_err(|_| RemoteError::transport(format!("Expected {what}, got {body:?}")))
}

#[async_trait]
impl GeoDataService for OsmApiClient {
    async fn create_changeset(
        &self,
        credential: &Credential,
        tags: &BTreeMap<String, String>,
    ) -> Result<ChangeSet, RemoteError> {
        let request = credential.apply(self.request(Method::PUT, "/changeset/create"));
        let body = self
            .send(Self::xml(request, osm_xml::changeset(tags)))
            .await?;
        let id = parse_number(&body, "changeset id")?;
        tracing::debug!(changeset = id, "changeset opened");
        Ok(ChangeSet::opened(id, tags.clone()))
    }

    async fn get_changeset(
        &self,
        id: u64,
        include_discussion: bool,
    ) -> Result<ChangeSet, RemoteError> {
        let mut request = self.request(Method::GET, &format!("/changeset/{id}.json"));
        if include_discussion {
            request = request.query(&[("include_discussion", "true")]);
        }
        let body = self.send(request).await?;
        parse_changeset(&body)
    }

    async fn close_changeset(
        &self,
        credential: &Credential,
        changeset: &mut ChangeSet,
    ) -> Result<(), RemoteError> {
        ensure_open(changeset)?;
        let request = credential.apply(
            self.request(Method::PUT, &format!("/changeset/{}/close", changeset.id)),
        );
        self.send(request).await?;
        changeset.close();
        tracing::debug!(changeset = changeset.id, "changeset closed");
        Ok(())
    }

    async fn get_element(&self, element: ElementRef) -> Result<Element, RemoteError> {
        let request = self.request(
            Method::GET,
            &format!("/{}/{}.json", element.kind, element.id),
        );
        let body = self.send(request).await?;
        parse_element(&body, element)
    }

    async fn create_element(
        &self,
        credential: &Credential,
        draft: &ElementDraft,
        changeset: &ChangeSet,
    ) -> Result<Element, RemoteError> {
        ensure_open(changeset)?;
        if draft.id.is_some() {
            return Err(RemoteError::validation("element to create already has an id"));
        }
        let request = credential.apply(
            self.request(Method::PUT, &format!("/{}/create", draft.kind())),
        );
        let body = self
            .send(Self::xml(request, osm_xml::element(draft, changeset.id)))
            .await?;
        let id = parse_number(&body, "element id")?;
        let id = i64::try_from(id)
            .map_err(|_| RemoteError::transport(format!("element id out of range: {id}")))?;
        Ok(draft.clone().into_element(id, 1, changeset.id))
    }

    async fn edit_element(
        &self,
        credential: &Credential,
        draft: &ElementDraft,
        changeset: &ChangeSet,
    ) -> Result<Element, RemoteError> {
        ensure_open(changeset)?;
        let (Some(id), Some(_)) = (draft.id, draft.base_version) else {
            return Err(RemoteError::validation("edit needs an existing element id and version"));
        };
        let request = credential.apply(
            self.request(Method::PUT, &format!("/{}/{id}", draft.kind())),
        );
        let body = self
            .send(Self::xml(request, osm_xml::element(draft, changeset.id)))
            .await?;
        let version = parse_number(&body, "new version")?;
        Ok(draft.clone().into_element(id, version, changeset.id))
    }

    async fn delete_element(
        &self,
        credential: &Credential,
        element: &Element,
        changeset: &ChangeSet,
    ) -> Result<u64, RemoteError> {
        ensure_open(changeset)?;
        let request = credential.apply(self.request(
            Method::DELETE,
            &format!("/{}/{}", element.kind(), element.id),
        ));
        let body = self
            .send(Self::xml(request, osm_xml::element(&element.draft(), changeset.id)))
            .await?;
        parse_number(&body, "new version")
    }

    async fn upload_trace(
        &self,
        credential: &Credential,
        trace: &TraceDraft,
    ) -> Result<u64, RemoteError> {
        if trace.payload.is_empty() {
            return Err(RemoteError::validation("trace file is empty"));
        }
        let file = multipart::Part::bytes(trace.payload.clone())
            .file_name(trace.upload_filename())
            .mime_str("application/gpx+xml")
            .map_err(|e| RemoteError::transport(format!("Failed to build upload: {e}")))?;
        let form = multipart::Form::new()
            .part("file", file)
            .text("description", trace.effective_description().to_string())
            .text("tags", trace.tags.join(","))
            .text("visibility", trace.visibility.as_str());

        let request = credential
            .apply(self.request(Method::POST, "/gpx/create"))
            .multipart(form);
        let body = self.send(request).await?;
        parse_number(&body, "trace id")
    }
}

// ============================================================================
// Wire types (JSON read format)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ElementDocument {
    elements: Vec<WireElement>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireBody {
    Node { lat: f64, lon: f64 },
    Way {
        #[serde(default)]
        nodes: Vec<i64>,
    },
    Relation {
        #[serde(default)]
        members: Vec<WireMember>,
    },
}

#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde(rename = "type")]
    kind: ElementKind,
    #[serde(rename = "ref")]
    id: i64,
    #[serde(default)]
    role: String,
}

#[derive(Debug, Deserialize)]
struct WireElement {
    id: i64,
    version: u64,
    #[serde(default)]
    changeset: u64,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    uid: Option<i64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default = "default_visible")]
    visible: bool,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(flatten)]
    body: WireBody,
}

fn default_visible() -> bool {
    true
}

fn parse_element(body: &str, wanted: ElementRef) -> Result<Element, RemoteError> {
    let doc: ElementDocument = serde_json::from_str(body)
        .map_err(|e| RemoteError::transport(format!("Failed to parse element: {e}")))?;

    let raw = doc
        .elements
        .into_iter()
        .next()
        .ok_or_else(|| RemoteError::not_found(format!("{wanted} missing from response")))?;

    let body = match raw.body {
        WireBody::Node { lat, lon } => ElementBody::Node { lat, lon },
        WireBody::Way { nodes } => ElementBody::Way { nodes },
        WireBody::Relation { members } => ElementBody::Relation {
            members: members
                .into_iter()
                .map(|m| Member {
                    kind: m.kind,
                    id: m.id,
                    role: m.role,
                })
                .collect(),
        },
    };

    let author = match (raw.uid, raw.user) {
        (Some(uid), Some(name)) => Some(Author { uid, name }),
        _ => None,
    };

    Ok(Element {
        id: raw.id,
        version: raw.version,
        changeset: raw.changeset,
        author,
        timestamp: raw.timestamp,
        visible: raw.visible,
        tags: raw.tags,
        body,
    })
}

#[derive(Debug, Deserialize)]
struct ChangesetDocument {
    changeset: WireChangeset,
}

#[derive(Debug, Deserialize)]
struct WireChangeset {
    id: u64,
    open: bool,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    min_lat: Option<f64>,
    #[serde(default)]
    min_lon: Option<f64>,
    #[serde(default)]
    max_lat: Option<f64>,
    #[serde(default)]
    max_lon: Option<f64>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    comments: Vec<WireComment>,
}

#[derive(Debug, Deserialize)]
struct WireComment {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    uid: Option<i64>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
}

fn parse_changeset(body: &str) -> Result<ChangeSet, RemoteError> {
    let doc: ChangesetDocument = serde_json::from_str(body)
        .map_err(|e| RemoteError::transport(format!("Failed to parse changeset: {e}")))?;
    let raw = doc.changeset;

    let bbox = match (raw.min_lon, raw.min_lat, raw.max_lon, raw.max_lat) {
        (Some(min_lon), Some(min_lat), Some(max_lon), Some(max_lat)) => {
            Some(BoundingBox::new(min_lon, min_lat, max_lon, max_lat))
        }
        _ => None,
    };
    let comments = raw
        .comments
        .into_iter()
        .map(|c| Comment {
            date: c.date,
            uid: c.uid,
            user: c.user,
            text: c.text,
        })
        .collect();

    Ok(ChangeSet::from_parts(
        raw.id, raw.user, raw.open, bbox, raw.tags, comments,
    ))
}

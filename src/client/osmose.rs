//! Osmose issue API (v0.3) client

use super::error::classify_status;
use super::{IssueService, RemoteError};
use crate::geo::{BoundingBox, ElementKind, ElementRef, Issue};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://osmose.openstreetmap.fr/api/0.3";

/// Osmose service implementation
pub struct OsmoseClient {
    client: Client,
    base_url: String,
    lang: String,
    limit: u32,
}

impl OsmoseClient {
    pub fn new(
        base_url: &str,
        lang: &str,
        limit: u32,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            lang: lang.to_string(),
            limit,
        })
    }

    /// Status to error kind. Osmose uses the common table unchanged.
    fn classify_error(status: StatusCode, body: &str) -> RemoteError {
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        RemoteError::new(classify_status(status), message).with_status(status)
    }

    /// Requests ask for `language`, falling back to the configured default
    fn request(&self, url: &str, query: &[(&str, String)], language: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .query(query)
            .header("Accept-Language", language)
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        language: &str,
    ) -> Result<String, RemoteError> {
        let response = self
            .request(url, query, language)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::transport(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &body));
        }
        Ok(body)
    }

    async fn search(
        &self,
        filter: (&str, String),
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError> {
        let language = language.unwrap_or(&self.lang);
        let url = format!("{}/issues", self.base_url);
        let query = [
            filter,
            ("full", "true".to_string()),
            ("limit", self.limit.to_string()),
        ];
        let body = self.get(&url, &query, language).await?;
        parse_issue_list(&body, language)
    }
}

#[async_trait]
impl IssueService for OsmoseClient {
    async fn search_by_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError> {
        tracing::debug!(lat, lon, radius_m, "osmose search by location");
        let bbox = BoundingBox::around(lat, lon, radius_m);
        self.search(("bbox", bbox.to_query()), language).await
    }

    async fn search_by_user(
        &self,
        username: &str,
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError> {
        tracing::debug!(username, "osmose search by user");
        if username.trim().is_empty() {
            return Err(RemoteError::validation("username is empty"));
        }
        self.search(("username", username.trim().to_string()), language)
            .await
    }

    async fn get_detail(&self, issue_id: &str, language: Option<&str>) -> Result<Issue, RemoteError> {
        if issue_id.is_empty() || !issue_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(RemoteError::validation(format!("malformed issue id: {issue_id:?}")));
        }
        let language = language.unwrap_or(&self.lang);
        let url = format!("{}/issue/{issue_id}", self.base_url);
        let body = self.get(&url, &[], language).await?;
        parse_issue_detail(&body, issue_id, language)
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Text keyed by language, with `auto` as the server-side pick
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
struct Translated(HashMap<String, String>);

impl Translated {
    fn pick(&self, lang: &str) -> Option<String> {
        self.0
            .get("auto")
            .or_else(|| self.0.get(lang))
            .or_else(|| self.0.get("en"))
            .or_else(|| self.0.values().next())
            .cloned()
    }
}

#[derive(Debug, Default, Deserialize)]
struct OsmIds {
    #[serde(default)]
    nodes: Vec<i64>,
    #[serde(default)]
    ways: Vec<i64>,
    #[serde(default)]
    relations: Vec<i64>,
}

impl OsmIds {
    fn into_refs(self) -> Vec<ElementRef> {
        self.nodes
            .into_iter()
            .map(ElementRef::node)
            .chain(self.ways.into_iter().map(ElementRef::way))
            .chain(self.relations.into_iter().map(ElementRef::relation))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct IssueList {
    issues: Vec<ListedIssue>,
}

#[derive(Debug, Deserialize)]
struct ListedIssue {
    id: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    title: Option<Translated>,
    #[serde(default)]
    subtitle: Option<Translated>,
    #[serde(default)]
    osm_ids: Option<OsmIds>,
}

#[derive(Debug, Deserialize)]
struct IssueDetail {
    #[serde(default)]
    id: Option<String>,
    lat: f64,
    lon: f64,
    #[serde(default)]
    minlat: Option<f64>,
    #[serde(default)]
    maxlat: Option<f64>,
    #[serde(default)]
    minlon: Option<f64>,
    #[serde(default)]
    maxlon: Option<f64>,
    #[serde(default)]
    title: Option<Translated>,
    #[serde(default)]
    subtitle: Option<Translated>,
    #[serde(default)]
    elems: Vec<DetailElem>,
}

#[derive(Debug, Deserialize)]
struct DetailElem {
    #[serde(rename = "type")]
    kind: ElementKind,
    id: i64,
}

fn untitled(title: Option<&Translated>, lang: &str) -> String {
    title
        .and_then(|t| t.pick(lang))
        .unwrap_or_else(|| "Untitled issue".to_string())
}

fn parse_issue_list(body: &str, lang: &str) -> Result<Vec<Issue>, RemoteError> {
    let list: IssueList = serde_json::from_str(body)
        .map_err(|e| RemoteError::transport(format!("Failed to parse issue list: {e}")))?;

    Ok(list
        .issues
        .into_iter()
        .map(|raw| Issue {
            title: untitled(raw.title.as_ref(), lang),
            subtitle: raw.subtitle.and_then(|s| s.pick(lang)),
            elements: raw.osm_ids.map(OsmIds::into_refs).unwrap_or_default(),
            id: raw.id,
            lat: raw.lat,
            lon: raw.lon,
            bbox: None,
        })
        .collect())
}

fn parse_issue_detail(body: &str, issue_id: &str, lang: &str) -> Result<Issue, RemoteError> {
    let raw: IssueDetail = serde_json::from_str(body)
        .map_err(|e| RemoteError::transport(format!("Failed to parse issue detail: {e}")))?;

    let bbox = match (raw.minlon, raw.minlat, raw.maxlon, raw.maxlat) {
        (Some(min_lon), Some(min_lat), Some(max_lon), Some(max_lat)) => {
            Some(BoundingBox::new(min_lon, min_lat, max_lon, max_lat))
        }
        _ => None,
    };

    Ok(Issue {
        title: untitled(raw.title.as_ref(), lang),
        subtitle: raw.subtitle.and_then(|s| s.pick(lang)),
        elements: raw
            .elems
            .into_iter()
            .map(|e| ElementRef::new(e.kind, e.id))
            .collect(),
        id: raw.id.unwrap_or_else(|| issue_id.to_string()),
        lat: raw.lat,
        lon: raw.lon,
        bbox,
    })
}

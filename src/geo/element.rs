//! Map elements (node, way, relation)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Element discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(type, id)` reference to a map element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementRef {
    pub kind: ElementKind,
    pub id: i64,
}

impl ElementRef {
    pub fn new(kind: ElementKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn node(id: i64) -> Self {
        Self::new(ElementKind::Node, id)
    }

    pub fn way(id: i64) -> Self {
        Self::new(ElementKind::Way, id)
    }

    pub fn relation(id: i64) -> Self {
        Self::new(ElementKind::Relation, id)
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Relation member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub kind: ElementKind,
    pub id: i64,
    pub role: String,
}

/// Type-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementBody {
    Node { lat: f64, lon: f64 },
    Way { nodes: Vec<i64> },
    Relation { members: Vec<Member> },
}

impl ElementBody {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementBody::Node { .. } => ElementKind::Node,
            ElementBody::Way { .. } => ElementKind::Way,
            ElementBody::Relation { .. } => ElementKind::Relation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub uid: i64,
    pub name: String,
}

/// A fetched map element at one version.
///
/// Values are never edited in place: changes go through [`ElementDraft`] and
/// the server hands back the next version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: i64,
    pub version: u64,
    pub changeset: u64,
    pub author: Option<Author>,
    pub timestamp: Option<DateTime<Utc>>,
    pub visible: bool,
    pub tags: BTreeMap<String, String>,
    pub body: ElementBody,
}

impl Element {
    pub fn kind(&self) -> ElementKind {
        self.body.kind()
    }

    pub fn element_ref(&self) -> ElementRef {
        ElementRef::new(self.kind(), self.id)
    }

    /// Start an edit of this version
    pub fn draft(&self) -> ElementDraft {
        ElementDraft {
            id: Some(self.id),
            base_version: Some(self.version),
            tags: self.tags.clone(),
            body: self.body.clone(),
            baseline: Some(Baseline {
                tags: self.tags.clone(),
                body: self.body.clone(),
            }),
        }
    }

    /// Short multi-line description for chat replies
    pub fn summary(&self) -> String {
        let mut out = format!("{} v{}", self.element_ref(), self.version);
        if let ElementBody::Node { lat, lon } = &self.body {
            out.push_str(&format!(" at ({lat:.6}, {lon:.6})"));
        }
        for (k, v) in &self.tags {
            out.push_str(&format!("\n{k}={v}"));
        }
        out
    }
}

/// Tags and geometry of the version an edit started from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub tags: BTreeMap<String, String>,
    pub body: ElementBody,
}

/// Pending create or edit.
///
/// `id`/`base_version` are `None` for an element that does not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDraft {
    pub id: Option<i64>,
    pub base_version: Option<u64>,
    pub tags: BTreeMap<String, String>,
    pub body: ElementBody,
    /// Fetched version, `None` for a new element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<Baseline>,
}

impl ElementDraft {
    pub fn new(body: ElementBody) -> Self {
        Self {
            id: None,
            base_version: None,
            tags: BTreeMap::new(),
            body,
            baseline: None,
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.body.kind()
    }

    /// True when an edit would write back exactly what was fetched
    pub fn is_unchanged(&self) -> bool {
        self.baseline
            .as_ref()
            .is_some_and(|b| b.tags == self.tags && b.body == self.body)
    }

    /// Set a tag; an empty value removes the key
    pub fn set_tag(&mut self, key: &str, value: &str) {
        let key = key.trim();
        let value = value.trim();
        if value.is_empty() {
            self.tags.remove(key);
        } else {
            self.tags.insert(key.to_string(), value.to_string());
        }
    }

    /// Move a node. Returns false for ways and relations.
    pub fn set_location(&mut self, new_lat: f64, new_lon: f64) -> bool {
        match &mut self.body {
            ElementBody::Node { lat, lon } => {
                *lat = new_lat;
                *lon = new_lon;
                true
            }
            ElementBody::Way { .. } | ElementBody::Relation { .. } => false,
        }
    }

    /// Element produced by the server accepting this draft
    pub fn into_element(self, id: i64, version: u64, changeset: u64) -> Element {
        Element {
            id,
            version,
            changeset,
            author: None,
            timestamp: None,
            visible: true,
            tags: self.tags,
            body: self.body,
        }
    }
}

//! Changesets and their discussion

use super::BoundingBox;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub date: Option<DateTime<Utc>>,
    pub uid: Option<i64>,
    pub user: Option<String>,
    pub text: String,
}

/// Container for a batch of edits.
///
/// Once closed a changeset is never reopened; [`ChangeSet::close`] is the only
/// state change and it is one-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: u64,
    pub owner: Option<String>,
    open: bool,
    pub bbox: Option<BoundingBox>,
    pub tags: BTreeMap<String, String>,
    pub comments: Vec<Comment>,
}

impl ChangeSet {
    /// A changeset the server has just opened for us
    pub fn opened(id: u64, tags: BTreeMap<String, String>) -> Self {
        Self {
            id,
            owner: None,
            open: true,
            bbox: None,
            tags,
            comments: Vec::new(),
        }
    }

    pub fn from_parts(
        id: u64,
        owner: Option<String>,
        open: bool,
        bbox: Option<BoundingBox>,
        tags: BTreeMap<String, String>,
        comments: Vec<Comment>,
    ) -> Self {
        Self {
            id,
            owner,
            open,
            bbox,
            tags,
            comments,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn close(&mut self) {
        self.open = false;
    }
}

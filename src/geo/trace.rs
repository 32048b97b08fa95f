//! GPS trace upload drafts

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who may see an uploaded trace and in what form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
    #[default]
    Trackable,
    Identifiable,
}

impl Visibility {
    pub const ALL: [Visibility; 4] = [
        Visibility::Private,
        Visibility::Public,
        Visibility::Trackable,
        Visibility::Identifiable,
    ];

    /// Next value in the fixed cycle `private → public → trackable → identifiable → private`
    #[must_use]
    pub fn cycle(self) -> Self {
        match self {
            Visibility::Private => Visibility::Public,
            Visibility::Public => Visibility::Trackable,
            Visibility::Trackable => Visibility::Identifiable,
            Visibility::Identifiable => Visibility::Private,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Public => "public",
            Visibility::Trackable => "trackable",
            Visibility::Identifiable => "identifiable",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trace waiting for name, description and confirmation
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceDraft {
    pub payload: Vec<u8>,
    pub filename: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub visibility: Visibility,
}

impl TraceDraft {
    pub fn new(payload: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            payload,
            filename: filename.into(),
            name: None,
            description: None,
            tags: Vec::new(),
            visibility: Visibility::default(),
        }
    }

    /// Name given by the user, else the uploaded file's stem
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => self
                .filename
                .rsplit_once('.')
                .map_or(self.filename.as_str(), |(stem, _)| stem),
        }
    }

    /// Description sent with the upload. The server rejects an empty one,
    /// so an unset description falls back to the trace name.
    pub fn effective_description(&self) -> &str {
        self.description.as_deref().unwrap_or_else(|| self.display_name())
    }

    /// File name sent with the upload: the chosen name with the original extension
    pub fn upload_filename(&self) -> String {
        let ext = self
            .filename
            .rsplit_once('.')
            .map_or("gpx", |(_, ext)| ext);
        let stem: String = self
            .display_name()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{stem}.{ext}")
    }

    /// Replace the tag set from a comma separated reply
    pub fn set_tags(&mut self, text: &str) {
        let mut tags: Vec<String> = text
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        tags.sort();
        tags.dedup();
        self.tags = tags;
    }

    pub fn summary(&self) -> String {
        let tags = if self.tags.is_empty() {
            "none".to_string()
        } else {
            self.tags.join(", ")
        };
        format!(
            "Trace: {}\nDescription: {}\nTags: {}\nVisibility: {}\nSize: {} bytes",
            self.display_name(),
            self.effective_description(),
            tags,
            self.visibility,
            self.payload.len()
        )
    }
}

impl fmt::Debug for TraceDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceDraft")
            .field("payload_len", &self.payload.len())
            .field("filename", &self.filename)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("tags", &self.tags)
            .field("visibility", &self.visibility)
            .finish()
    }
}

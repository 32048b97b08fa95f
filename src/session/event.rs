//! Events that drive a session

use crate::client::RemoteError;
use super::UserSettings;
use crate::geo::{Element, ElementRef, Issue};
use serde::{Deserialize, Serialize};

/// What an issue search looks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchQuery {
    Location { lat: f64, lon: f64 },
    /// An empty username searches for the user's stored OSM name
    Username {
        #[serde(default)]
        username: String,
    },
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User triggers
    StartSearch(SearchQuery),
    PageNext,
    PagePrev,
    /// Index within the current page
    SelectItem { index: usize },
    EditElement(ElementRef),
    StartUpload { payload: Vec<u8>, filename: String },
    TextReply(String),
    ToggleVisibility,
    ConfirmSubmit,
    OpenSettings,
    Cancel,

    // Host events
    IdleTimeout,

    // Remote results
    SearchCompleted { issues: Vec<Issue> },
    DetailFetched { issue: Issue },
    ElementFetched { element: Element },
    EditSubmitted { element: Element },
    TraceUploaded { trace_id: u64 },
    SettingsSaved { settings: UserSettings },
    RemoteFailed { error: RemoteError },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StartSearch(_) => "start_search",
            Event::PageNext => "page_next",
            Event::PagePrev => "page_prev",
            Event::SelectItem { .. } => "select_item",
            Event::EditElement(_) => "edit_element",
            Event::StartUpload { .. } => "start_upload",
            Event::TextReply(_) => "text_reply",
            Event::ToggleVisibility => "toggle_visibility",
            Event::ConfirmSubmit => "confirm_submit",
            Event::OpenSettings => "open_settings",
            Event::Cancel => "cancel",
            Event::IdleTimeout => "idle_timeout",
            Event::SearchCompleted { .. } => "search_completed",
            Event::DetailFetched { .. } => "detail_fetched",
            Event::ElementFetched { .. } => "element_fetched",
            Event::EditSubmitted { .. } => "edit_submitted",
            Event::TraceUploaded { .. } => "trace_uploaded",
            Event::SettingsSaved { .. } => "settings_saved",
            Event::RemoteFailed { .. } => "remote_failed",
        }
    }

    /// Result of a remote call dispatched by the runtime
    pub fn is_remote_result(&self) -> bool {
        matches!(
            self,
            Event::SearchCompleted { .. }
                | Event::DetailFetched { .. }
                | Event::ElementFetched { .. }
                | Event::EditSubmitted { .. }
                | Event::TraceUploaded { .. }
                | Event::SettingsSaved { .. }
                | Event::RemoteFailed { .. }
        )
    }
}

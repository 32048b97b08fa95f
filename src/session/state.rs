//! Session state types

use crate::geo::{ElementDraft, ElementRef, Issue, TraceDraft};
use crate::pager::Pager;
use super::SearchQuery;
use std::num::NonZeroUsize;

/// Session state. Each variant carries only the data valid in it: the pager
/// lives in `Browsing`, drafts live in the edit and upload states.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Idle,

    /// Issue search in flight
    Searching { query: SearchQuery },

    Browsing { pager: Pager<Issue> },

    /// Issue detail fetch in flight
    FetchingDetail { issue_id: String },

    /// Element fetch in flight
    FetchingElement { element: ElementRef },

    EditSelectAction { draft: ElementDraft },
    EditSelectTag { draft: ElementDraft },
    EditAwaitValue { draft: ElementDraft, key: String },
    EditAwaitLocation { draft: ElementDraft },

    /// Changeset open, edit, close in flight
    SubmittingEdit { draft: ElementDraft },

    GpxAwaitName { draft: TraceDraft },
    GpxAwaitDescription { draft: TraceDraft },
    GpxConfirm { draft: TraceDraft },

    /// Trace upload in flight
    Uploading { draft: TraceDraft },

    SettingsMenu { settings: UserSettings },
    SettingsAwaitValue { settings: UserSettings, field: SettingField },

    /// Settings write in flight
    SavingSettings { settings: UserSettings },

    Done,
    Cancelled,
}

impl SessionState {
    /// Stable snake_case label used in replies and logs
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Searching { .. } => "searching",
            SessionState::Browsing { .. } => "browsing",
            SessionState::FetchingDetail { .. } => "fetching_detail",
            SessionState::FetchingElement { .. } => "fetching_element",
            SessionState::EditSelectAction { .. } => "edit_select_action",
            SessionState::EditSelectTag { .. } => "edit_select_tag",
            SessionState::EditAwaitValue { .. } => "edit_await_value",
            SessionState::EditAwaitLocation { .. } => "edit_await_location",
            SessionState::SubmittingEdit { .. } => "submitting_edit",
            SessionState::GpxAwaitName { .. } => "gpx_await_name",
            SessionState::GpxAwaitDescription { .. } => "gpx_await_description",
            SessionState::GpxConfirm { .. } => "gpx_confirm",
            SessionState::Uploading { .. } => "uploading",
            SessionState::SettingsMenu { .. } => "settings_menu",
            SessionState::SettingsAwaitValue { .. } => "settings_await_value",
            SessionState::SavingSettings { .. } => "saving_settings",
            SessionState::Done => "done",
            SessionState::Cancelled => "cancelled",
        }
    }

    /// Check if the session has ended
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Cancelled)
    }

    /// Check if a remote call is outstanding
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SessionState::Searching { .. }
                | SessionState::FetchingDetail { .. }
                | SessionState::FetchingElement { .. }
                | SessionState::SubmittingEdit { .. }
                | SessionState::Uploading { .. }
                | SessionState::SavingSettings { .. }
        )
    }

    pub fn pager(&self) -> Option<&Pager<Issue>> {
        match self {
            SessionState::Browsing { pager } => Some(pager),
            _ => None,
        }
    }

    pub fn trace_draft(&self) -> Option<&TraceDraft> {
        match self {
            SessionState::GpxAwaitName { draft }
            | SessionState::GpxAwaitDescription { draft }
            | SessionState::GpxConfirm { draft }
            | SessionState::Uploading { draft } => Some(draft),
            _ => None,
        }
    }

    pub fn element_draft(&self) -> Option<&ElementDraft> {
        match self {
            SessionState::EditSelectAction { draft }
            | SessionState::EditSelectTag { draft }
            | SessionState::EditAwaitValue { draft, .. }
            | SessionState::EditAwaitLocation { draft }
            | SessionState::SubmittingEdit { draft } => Some(draft),
            _ => None,
        }
    }
}

/// Preferences a user keeps across sessions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSettings {
    /// Default username for issue searches
    pub osm_name: Option<String>,
    /// Preferred language for issue texts, e.g. `de` or `pt-BR`
    pub language: Option<String>,
}

impl UserSettings {
    pub fn get(&self, field: SettingField) -> Option<&str> {
        match field {
            SettingField::OsmName => self.osm_name.as_deref(),
            SettingField::Language => self.language.as_deref(),
        }
    }

    pub fn set(&mut self, field: SettingField, value: String) {
        match field {
            SettingField::OsmName => self.osm_name = Some(value),
            SettingField::Language => self.language = Some(value),
        }
    }

    pub fn summary(&self) -> String {
        SettingField::ALL
            .iter()
            .map(|&field| format!("{}: {}", field.label(), self.get(field).unwrap_or("not set")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A user setting that can be changed in the settings menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    OsmName,
    Language,
}

impl SettingField {
    pub const ALL: [SettingField; 2] = [SettingField::OsmName, SettingField::Language];

    pub fn label(self) -> &'static str {
        match self {
            SettingField::OsmName => "OSM-Name",
            SettingField::Language => "Language",
        }
    }

    /// Menu reply naming a field, matched without regard to case
    pub fn from_reply(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL
            .into_iter()
            .find(|field| field.label().eq_ignore_ascii_case(text))
    }
}

/// Per-session settings fixed at creation.
///
/// `settings` is the exception: a successful save in the settings menu
/// replaces it for the rest of the session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub page_size: NonZeroUsize,
    pub search_radius_m: f64,
    /// `comment` tag on changesets opened for edits
    pub changeset_comment: String,
    pub settings: UserSettings,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, page_size: NonZeroUsize) -> Self {
        Self {
            user_id: user_id.into(),
            page_size,
            search_radius_m: 1000.0,
            changeset_comment: "Edited via osmate".to_string(),
            settings: UserSettings::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: UserSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_search_radius(mut self, radius_m: f64) -> Self {
        self.search_radius_m = radius_m;
        self
    }

    #[must_use]
    pub fn with_changeset_comment(mut self, comment: impl Into<String>) -> Self {
        self.changeset_comment = comment.into();
        self
    }
}

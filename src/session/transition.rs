//! Pure state transition function

use super::{Effect, Event, SearchQuery, SessionContext, SessionState, SettingField, UserSettings};
use crate::client::RemoteError;
use crate::geo::{ElementKind, TraceDraft};
use crate::pager::Pager;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// OSM limit for tag keys and values, in characters
const MAX_TAG_LEN: usize = 255;

/// OSM display names are at most this long
const MAX_NAME_LEN: usize = 255;

static COORDINATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-?\d{1,3}(?:\.\d+)?)\s*[,; ]\s*(-?\d{1,3}(?:\.\d+)?)\s*$")
        .expect("coordinate regex is a compile-time constant and must be valid")
});

static LANGUAGE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})?$")
        .expect("language regex is a compile-time constant and must be valid")
});

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition. None of them changes the state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("'{event}' is not valid in state '{state}'")]
    InvalidState {
        state: &'static str,
        event: &'static str,
    },
    #[error("A request is still running (cancel it first)")]
    Busy,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Result '{event}' no longer matches state '{state}'")]
    StaleResult {
        state: &'static str,
        event: &'static str,
    },
}

/// Pure transition function
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Cancellation, from any non-terminal state
        // ============================================================
        (s, Event::Cancel) if !s.is_terminal() => {
            Ok(TransitionResult::new(SessionState::Cancelled).with_effect(Effect::text("Cancelled.")))
        }
        (s, Event::IdleTimeout) if !s.is_terminal() => Ok(TransitionResult::new(
            SessionState::Cancelled,
        )
        .with_effect(Effect::text("Session closed after inactivity."))),

        // A remote call is outstanding: nothing but cancel gets through
        (s, e) if s.is_in_flight() && !e.is_remote_result() => Err(TransitionError::Busy),

        // ============================================================
        // Search and browse
        // ============================================================
        (SessionState::Idle | SessionState::Browsing { .. }, Event::StartSearch(query)) => {
            let query = resolve_query(query, context)?;
            Ok(TransitionResult::new(SessionState::Searching {
                query: query.clone(),
            })
            .with_effect(Effect::SearchIssues {
                query,
                radius_m: context.search_radius_m,
                language: context.settings.language.clone(),
            }))
        }

        (SessionState::Searching { .. }, Event::SearchCompleted { issues }) => {
            if issues.is_empty() {
                let error = RemoteError::not_found("search returned no issues");
                return Ok(TransitionResult::new(SessionState::Idle).with_effect(Effect::failure(&error)));
            }
            let pager = Pager::new(issues, context.page_size.get())
                .map_err(|e| TransitionError::InvalidInput(e.to_string()))?;
            let page = pager.render();
            Ok(TransitionResult::new(SessionState::Browsing { pager }).with_effect(Effect::text(page)))
        }

        (SessionState::Browsing { pager }, Event::PageNext) => {
            let mut pager = pager.clone();
            pager.next();
            let page = pager.render();
            Ok(TransitionResult::new(SessionState::Browsing { pager }).with_effect(Effect::text(page)))
        }

        (SessionState::Browsing { pager }, Event::PagePrev) => {
            let mut pager = pager.clone();
            pager.prev();
            let page = pager.render();
            Ok(TransitionResult::new(SessionState::Browsing { pager }).with_effect(Effect::text(page)))
        }

        (SessionState::Browsing { pager }, Event::SelectItem { index }) => {
            let issue = pager.get(index).ok_or_else(|| {
                TransitionError::InvalidInput(format!(
                    "no item {index} on this page ({} shown)",
                    pager.current().len()
                ))
            })?;
            let issue_id = issue.id.clone();
            Ok(TransitionResult::new(SessionState::FetchingDetail {
                issue_id: issue_id.clone(),
            })
            .with_effect(Effect::FetchIssueDetail {
                issue_id,
                language: context.settings.language.clone(),
            }))
        }

        (SessionState::FetchingDetail { .. }, Event::DetailFetched { issue }) => {
            Ok(TransitionResult::new(SessionState::Idle).with_effect(Effect::text(issue.detail())))
        }

        // ============================================================
        // Element edit
        // ============================================================
        (SessionState::Idle, Event::EditElement(element)) => {
            if element.id <= 0 {
                return Err(TransitionError::InvalidInput(format!(
                    "element id must be positive, got {}",
                    element.id
                )));
            }
            Ok(TransitionResult::new(SessionState::FetchingElement { element })
                .with_effect(Effect::FetchElement { element }))
        }

        (SessionState::FetchingElement { .. }, Event::ElementFetched { element }) => {
            if !element.visible {
                let error = RemoteError::gone(format!("{} is deleted", element.element_ref()));
                return Ok(TransitionResult::new(SessionState::Idle).with_effect(Effect::failure(&error)));
            }
            let prompt = format!("{}\n\n{}", element.summary(), action_prompt(element.kind()));
            Ok(TransitionResult::new(SessionState::EditSelectAction {
                draft: element.draft(),
            })
            .with_effect(Effect::text(prompt)))
        }

        (SessionState::EditSelectAction { draft }, Event::TextReply(text)) => {
            match text.trim().to_ascii_lowercase().as_str() {
                "tag" => Ok(TransitionResult::new(SessionState::EditSelectTag {
                    draft: draft.clone(),
                })
                .with_effect(Effect::text("Which tag key?"))),
                "location" if draft.kind() == ElementKind::Node => {
                    Ok(TransitionResult::new(SessionState::EditAwaitLocation {
                        draft: draft.clone(),
                    })
                    .with_effect(Effect::text("Send the new position as 'lat, lon'.")))
                }
                "location" => Err(TransitionError::InvalidInput(format!(
                    "only nodes can be moved, this is a {}",
                    draft.kind()
                ))),
                other => Err(TransitionError::InvalidInput(format!(
                    "unknown action '{other}'"
                ))),
            }
        }

        (SessionState::EditSelectAction { draft }, Event::ConfirmSubmit) => {
            if draft.is_unchanged() {
                return Err(TransitionError::InvalidInput(
                    "nothing changed, edit a tag or the location first".to_string(),
                ));
            }
            Ok(TransitionResult::new(SessionState::SubmittingEdit {
                draft: draft.clone(),
            })
            .with_effect(Effect::SubmitEdit {
                draft: draft.clone(),
                comment: context.changeset_comment.clone(),
            }))
        }

        (SessionState::EditSelectTag { draft }, Event::TextReply(text)) => {
            let key = text.trim();
            if key.is_empty() || key.chars().count() > MAX_TAG_LEN {
                return Err(TransitionError::InvalidInput(format!(
                    "tag key must be 1 to {MAX_TAG_LEN} characters"
                )));
            }
            let current = draft
                .tags
                .get(key)
                .map_or_else(|| "not set".to_string(), |v| format!("currently '{v}'"));
            Ok(TransitionResult::new(SessionState::EditAwaitValue {
                draft: draft.clone(),
                key: key.to_string(),
            })
            .with_effect(Effect::text(format!(
                "Value for '{key}' ({current}), or '-' to remove it?"
            ))))
        }

        (SessionState::EditAwaitValue { draft, key }, Event::TextReply(text)) => {
            let value = match text.trim() {
                "-" => "",
                v => v,
            };
            if value.chars().count() > MAX_TAG_LEN {
                return Err(TransitionError::InvalidInput(format!(
                    "tag value must be at most {MAX_TAG_LEN} characters"
                )));
            }
            let mut draft = draft.clone();
            draft.set_tag(key, value);
            let prompt = action_prompt(draft.kind());
            Ok(TransitionResult::new(SessionState::EditSelectAction { draft })
                .with_effect(Effect::text(prompt)))
        }

        (SessionState::EditAwaitLocation { draft }, Event::TextReply(text)) => {
            let (lat, lon) = parse_coordinates(&text)?;
            let mut draft = draft.clone();
            if !draft.set_location(lat, lon) {
                return Err(TransitionError::InvalidInput(
                    "only nodes can be moved".to_string(),
                ));
            }
            let prompt = action_prompt(draft.kind());
            Ok(TransitionResult::new(SessionState::EditSelectAction { draft })
                .with_effect(Effect::text(prompt)))
        }

        (SessionState::SubmittingEdit { .. }, Event::EditSubmitted { element }) => {
            Ok(TransitionResult::new(SessionState::Done).with_effect(Effect::text(format!(
                "Saved {} as version {}.",
                element.element_ref(),
                element.version
            ))))
        }

        // ============================================================
        // Trace upload
        // ============================================================
        (SessionState::Idle, Event::StartUpload { payload, filename }) => {
            if payload.is_empty() {
                return Err(TransitionError::InvalidInput("uploaded file is empty".to_string()));
            }
            if filename.trim().is_empty() {
                return Err(TransitionError::InvalidInput("file name is missing".to_string()));
            }
            let draft = TraceDraft::new(payload, filename.trim());
            Ok(TransitionResult::new(SessionState::GpxAwaitName { draft })
                .with_effect(Effect::text("What should the trace be called?")))
        }

        (SessionState::GpxAwaitName { draft }, Event::TextReply(text)) => {
            let name = text.trim();
            if name.is_empty() {
                return Err(TransitionError::InvalidInput("trace name is empty".to_string()));
            }
            let mut draft = draft.clone();
            draft.name = Some(name.to_string());
            Ok(TransitionResult::new(SessionState::GpxAwaitDescription { draft })
                .with_effect(Effect::text("Add a description, or reply 'skip'.")))
        }

        (SessionState::GpxAwaitDescription { draft }, Event::TextReply(text)) => {
            let description = text.trim();
            if description.is_empty() {
                return Err(TransitionError::InvalidInput(
                    "description is empty (reply 'skip' to leave it out)".to_string(),
                ));
            }
            let mut draft = draft.clone();
            if !description.eq_ignore_ascii_case("skip") {
                draft.description = Some(description.to_string());
            }
            let summary = confirm_prompt(&draft);
            Ok(TransitionResult::new(SessionState::GpxConfirm { draft })
                .with_effect(Effect::text(summary)))
        }

        (SessionState::GpxConfirm { draft }, Event::ToggleVisibility) => {
            let mut draft = draft.clone();
            draft.visibility = draft.visibility.cycle();
            let summary = confirm_prompt(&draft);
            Ok(TransitionResult::new(SessionState::GpxConfirm { draft })
                .with_effect(Effect::text(summary)))
        }

        (SessionState::GpxConfirm { draft }, Event::TextReply(text)) => {
            let mut draft = draft.clone();
            draft.set_tags(&text);
            let summary = confirm_prompt(&draft);
            Ok(TransitionResult::new(SessionState::GpxConfirm { draft })
                .with_effect(Effect::text(summary)))
        }

        (SessionState::GpxConfirm { draft }, Event::ConfirmSubmit) => {
            Ok(TransitionResult::new(SessionState::Uploading {
                draft: draft.clone(),
            })
            .with_effect(Effect::UploadTrace {
                draft: draft.clone(),
            }))
        }

        (SessionState::Uploading { .. }, Event::TraceUploaded { trace_id }) => {
            Ok(TransitionResult::new(SessionState::Done)
                .with_effect(Effect::text(format!("Trace uploaded (id {trace_id})."))))
        }

        // ============================================================
        // Settings
        // ============================================================
        (SessionState::Idle, Event::OpenSettings) => {
            let settings = context.settings.clone();
            let menu = settings_menu(&settings);
            Ok(TransitionResult::new(SessionState::SettingsMenu { settings })
                .with_effect(Effect::text(menu)))
        }

        (SessionState::SettingsMenu { settings }, Event::TextReply(text)) => {
            if text.trim().eq_ignore_ascii_case("done") {
                return Ok(TransitionResult::new(SessionState::Idle)
                    .with_effect(Effect::text("Settings closed.")));
            }
            let field = SettingField::from_reply(&text).ok_or_else(|| {
                TransitionError::InvalidInput(format!(
                    "unknown setting '{}', reply 'OSM-Name', 'Language' or 'done'",
                    text.trim()
                ))
            })?;
            Ok(TransitionResult::new(SessionState::SettingsAwaitValue {
                settings: settings.clone(),
                field,
            })
            .with_effect(Effect::text(format!(
                "Please tell me your {}.",
                field.label().to_lowercase()
            ))))
        }

        (SessionState::SettingsAwaitValue { settings, field }, Event::TextReply(text)) => {
            let value = validate_setting(*field, &text)?;
            let mut settings = settings.clone();
            settings.set(*field, value);
            Ok(TransitionResult::new(SessionState::SavingSettings {
                settings: settings.clone(),
            })
            .with_effect(Effect::SaveSettings { settings }))
        }

        (SessionState::SavingSettings { .. }, Event::SettingsSaved { settings }) => {
            let menu = format!("Saved.\n\n{}", settings_menu(&settings));
            Ok(TransitionResult::new(SessionState::SettingsMenu {
                settings: settings.clone(),
            })
            .with_effect(Effect::ApplySettings(settings))
            .with_effect(Effect::text(menu)))
        }

        // ============================================================
        // Remote failures restore the state before the call
        // ============================================================
        (s, Event::RemoteFailed { error }) if s.is_in_flight() => {
            let restored = match s {
                SessionState::SubmittingEdit { draft } => SessionState::EditSelectAction {
                    draft: draft.clone(),
                },
                SessionState::Uploading { draft } => SessionState::GpxConfirm {
                    draft: draft.clone(),
                },
                // Only saved settings reach the context
                SessionState::SavingSettings { .. } => SessionState::SettingsMenu {
                    settings: context.settings.clone(),
                },
                _ => SessionState::Idle,
            };
            Ok(TransitionResult::new(restored).with_effect(Effect::failure(&error)))
        }

        // ============================================================
        // Everything else
        // ============================================================
        (s, e) if e.is_remote_result() => Err(TransitionError::StaleResult {
            state: s.name(),
            event: e.name(),
        }),

        (s, e) => Err(TransitionError::InvalidState {
            state: s.name(),
            event: e.name(),
        }),
    }
}

/// Validate a search; an empty username falls back to the stored OSM name
fn resolve_query(query: SearchQuery, context: &SessionContext) -> Result<SearchQuery, TransitionError> {
    match query {
        SearchQuery::Location { lat, lon } => {
            check_coordinates(lat, lon)?;
            Ok(SearchQuery::Location { lat, lon })
        }
        SearchQuery::Username { username } if username.trim().is_empty() => {
            let username = context.settings.osm_name.clone().ok_or_else(|| {
                TransitionError::InvalidInput(
                    "username is empty and no OSM-Name is set in settings".to_string(),
                )
            })?;
            Ok(SearchQuery::Username { username })
        }
        SearchQuery::Username { username } => Ok(SearchQuery::Username {
            username: username.trim().to_string(),
        }),
    }
}

fn validate_setting(field: SettingField, text: &str) -> Result<String, TransitionError> {
    let value = text.trim();
    match field {
        SettingField::OsmName if value.is_empty() || value.chars().count() > MAX_NAME_LEN => {
            Err(TransitionError::InvalidInput(format!(
                "OSM-Name must be 1 to {MAX_NAME_LEN} characters"
            )))
        }
        SettingField::OsmName => Ok(value.to_string()),
        SettingField::Language if LANGUAGE_TAG.is_match(value) => Ok(value.replace('_', "-")),
        SettingField::Language => Err(TransitionError::InvalidInput(format!(
            "'{value}' is not a language code such as 'de' or 'pt-BR'"
        ))),
    }
}

fn settings_menu(settings: &UserSettings) -> String {
    format!(
        "{}\n\nReply 'OSM-Name' or 'Language' to change a setting, or 'done' to leave.",
        settings.summary()
    )
}

fn check_coordinates(lat: f64, lon: f64) -> Result<(), TransitionError> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(TransitionError::InvalidInput(format!(
            "coordinates out of range: {lat}, {lon}"
        )));
    }
    Ok(())
}

/// Parse a "lat, lon" reply
pub(crate) fn parse_coordinates(text: &str) -> Result<(f64, f64), TransitionError> {
    let invalid = || TransitionError::InvalidInput(format!("expected 'lat, lon', got '{}'", text.trim()));
    let caps = COORDINATES.captures(text).ok_or_else(invalid)?;
    let lat: f64 = caps[1].parse().map_err(|_| invalid())?;
    let lon: f64 = caps[2].parse().map_err(|_| invalid())?;
    check_coordinates(lat, lon)?;
    Ok((lat, lon))
}

fn action_prompt(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Node => "Reply 'tag' or 'location', or confirm to save.",
        ElementKind::Way | ElementKind::Relation => "Reply 'tag', or confirm to save.",
    }
}

fn confirm_prompt(draft: &TraceDraft) -> String {
    format!(
        "{}\n\nToggle visibility, send comma separated tags, or confirm to upload.",
        draft.summary()
    )
}

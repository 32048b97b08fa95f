//! Mock implementations for testing
//!
//! These mocks drive the session runtime without network or database I/O.

use super::traits::*;
use crate::client::{Credential, GeoDataService, IssueService, RemoteError};
use crate::geo::{ChangeSet, Element, ElementDraft, ElementRef, Issue, TraceDraft};
use crate::session::UserSettings;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Issue Service
// ============================================================================

/// Issue service returning queued results
pub struct MockIssueService {
    searches: Mutex<VecDeque<Result<Vec<Issue>, RemoteError>>>,
    details: Mutex<VecDeque<Result<Issue, RemoteError>>>,
    /// Record of all calls made
    pub calls: Mutex<Vec<String>>,
    delay: Duration,
    /// Notified when a call starts (for test synchronization)
    pub call_started: Arc<Notify>,
}

impl MockIssueService {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    /// Every call waits `delay` before answering (for cancellation testing)
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            searches: Mutex::new(VecDeque::new()),
            details: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay,
            call_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_search(&self, result: Result<Vec<Issue>, RemoteError>) {
        self.searches.lock().unwrap().push_back(result);
    }

    pub fn queue_detail(&self, result: Result<Issue, RemoteError>) {
        self.details.lock().unwrap().push_back(result);
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: String, language: Option<&str>) {
        let call = match language {
            Some(language) => format!("{call} lang={language}"),
            None => call,
        };
        self.calls.lock().unwrap().push(call);
        self.call_started.notify_waiters();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl IssueService for MockIssueService {
    async fn search_by_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError> {
        self.record(format!("search_by_location {lat} {lon} {radius_m}"), language)
            .await;
        self.searches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RemoteError::transport("No mock search queued")))
    }

    async fn search_by_user(
        &self,
        username: &str,
        language: Option<&str>,
    ) -> Result<Vec<Issue>, RemoteError> {
        self.record(format!("search_by_user {username}"), language).await;
        self.searches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RemoteError::transport("No mock search queued")))
    }

    async fn get_detail(&self, issue_id: &str, language: Option<&str>) -> Result<Issue, RemoteError> {
        self.record(format!("get_detail {issue_id}"), language).await;
        self.details
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RemoteError::transport("No mock detail queued")))
    }
}

// ============================================================================
// Mock Geodata Service
// ============================================================================

/// In-memory geodata service. Elements are served from a map; writes bump
/// versions and changesets open and close for real.
pub struct MockGeoDataService {
    elements: Mutex<HashMap<ElementRef, Element>>,
    next_changeset: Mutex<u64>,
    upload_results: Mutex<VecDeque<Result<u64, RemoteError>>>,
    edit_error: Mutex<Option<RemoteError>>,
    /// Record of all calls made
    pub calls: Mutex<Vec<String>>,
    /// Credentials seen on writes
    pub credentials: Mutex<Vec<Credential>>,
    pub uploads: Mutex<Vec<TraceDraft>>,
}

impl MockGeoDataService {
    pub fn new() -> Self {
        Self {
            elements: Mutex::new(HashMap::new()),
            next_changeset: Mutex::new(100),
            upload_results: Mutex::new(VecDeque::new()),
            edit_error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn insert_element(&self, element: Element) {
        self.elements
            .lock()
            .unwrap()
            .insert(element.element_ref(), element);
    }

    pub fn element(&self, element: ElementRef) -> Option<Element> {
        self.elements.lock().unwrap().get(&element).cloned()
    }

    pub fn queue_upload(&self, result: Result<u64, RemoteError>) {
        self.upload_results.lock().unwrap().push_back(result);
    }

    /// Make the next element write fail
    pub fn fail_next_edit(&self, error: RemoteError) {
        *self.edit_error.lock().unwrap() = Some(error);
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String, credential: Option<&Credential>) {
        self.calls.lock().unwrap().push(call);
        if let Some(credential) = credential {
            self.credentials.lock().unwrap().push(credential.clone());
        }
    }
}

#[async_trait]
impl GeoDataService for MockGeoDataService {
    async fn create_changeset(
        &self,
        credential: &Credential,
        tags: &BTreeMap<String, String>,
    ) -> Result<ChangeSet, RemoteError> {
        self.record("create_changeset".to_string(), Some(credential));
        let mut next = self.next_changeset.lock().unwrap();
        *next += 1;
        Ok(ChangeSet::opened(*next, tags.clone()))
    }

    async fn get_changeset(&self, id: u64, _include_discussion: bool) -> Result<ChangeSet, RemoteError> {
        self.record(format!("get_changeset {id}"), None);
        Err(RemoteError::not_found(format!("changeset {id}")))
    }

    async fn close_changeset(
        &self,
        credential: &Credential,
        changeset: &mut ChangeSet,
    ) -> Result<(), RemoteError> {
        self.record(format!("close_changeset {}", changeset.id), Some(credential));
        crate::client::ensure_open(changeset)?;
        changeset.close();
        Ok(())
    }

    async fn get_element(&self, element: ElementRef) -> Result<Element, RemoteError> {
        self.record(format!("get_element {element}"), None);
        self.element(element)
            .ok_or_else(|| RemoteError::not_found(format!("{element}")))
    }

    async fn create_element(
        &self,
        credential: &Credential,
        draft: &ElementDraft,
        changeset: &ChangeSet,
    ) -> Result<Element, RemoteError> {
        self.record("create_element".to_string(), Some(credential));
        crate::client::ensure_open(changeset)?;
        if let Some(error) = self.edit_error.lock().unwrap().take() {
            return Err(error);
        }
        let id = i64::try_from(self.elements.lock().unwrap().len()).unwrap_or(0) + 1000;
        let element = draft.clone().into_element(id, 1, changeset.id);
        self.insert_element(element.clone());
        Ok(element)
    }

    async fn edit_element(
        &self,
        credential: &Credential,
        draft: &ElementDraft,
        changeset: &ChangeSet,
    ) -> Result<Element, RemoteError> {
        self.record("edit_element".to_string(), Some(credential));
        crate::client::ensure_open(changeset)?;
        if let Some(error) = self.edit_error.lock().unwrap().take() {
            return Err(error);
        }
        let id = draft
            .id
            .ok_or_else(|| RemoteError::validation("draft has no id"))?;
        let element_ref = ElementRef::new(draft.kind(), id);
        let current = self
            .element(element_ref)
            .ok_or_else(|| RemoteError::not_found(format!("{element_ref}")))?;
        if draft.base_version != Some(current.version) {
            return Err(RemoteError::conflict("version mismatch"));
        }
        let element = draft
            .clone()
            .into_element(current.id, current.version + 1, changeset.id);
        self.insert_element(element.clone());
        Ok(element)
    }

    async fn delete_element(
        &self,
        credential: &Credential,
        element: &Element,
        changeset: &ChangeSet,
    ) -> Result<u64, RemoteError> {
        self.record(format!("delete_element {}", element.element_ref()), Some(credential));
        crate::client::ensure_open(changeset)?;
        Ok(element.version + 1)
    }

    async fn upload_trace(
        &self,
        credential: &Credential,
        trace: &TraceDraft,
    ) -> Result<u64, RemoteError> {
        self.record("upload_trace".to_string(), Some(credential));
        self.uploads.lock().unwrap().push(trace.clone());
        self.upload_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(1))
    }
}

// ============================================================================
// In-memory account store
// ============================================================================

#[derive(Default)]
pub struct MemoryAccountStore {
    credentials: Mutex<HashMap<String, Credential>>,
    settings: Mutex<HashMap<String, UserSettings>>,
    saves_fail: Mutex<bool>,
}

impl MemoryAccountStore {
    pub fn with(user_id: &str, credential: Credential) -> Self {
        let store = Self::default();
        store
            .credentials
            .lock()
            .unwrap()
            .insert(user_id.to_string(), credential);
        store
    }

    pub fn with_settings(self, user_id: &str, settings: UserSettings) -> Self {
        self.settings
            .lock()
            .unwrap()
            .insert(user_id.to_string(), settings);
        self
    }

    /// Make every settings write fail
    pub fn fail_saves(&self) {
        *self.saves_fail.lock().unwrap() = true;
    }

    pub fn saved_settings(&self, user_id: &str) -> Option<UserSettings> {
        self.settings.lock().unwrap().get(user_id).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn credential(&self, user_id: &str) -> Result<Option<Credential>, String> {
        Ok(self.credentials.lock().unwrap().get(user_id).cloned())
    }

    async fn settings(&self, user_id: &str) -> Result<UserSettings, String> {
        Ok(self.saved_settings(user_id).unwrap_or_default())
    }

    async fn save_settings(&self, user_id: &str, settings: &UserSettings) -> Result<(), String> {
        if *self.saves_fail.lock().unwrap() {
            return Err("disk I/O error".to_string());
        }
        self.settings
            .lock()
            .unwrap()
            .insert(user_id.to_string(), settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RemoteErrorKind;
    use crate::geo::{ElementBody, Visibility};
    use crate::runtime::{
        Services, SessionMessage, SessionRuntime, SessionSettings, SessionStore, StoreError,
        TriggerOutcome, TriggerReply,
    };
    use crate::session::{Event, Notice, SearchQuery, SessionContext, SessionState, TransitionError};
    use std::num::NonZeroUsize;
    use tokio::sync::{mpsc, oneshot};

    const USER: &str = "user-1";

    fn issues(n: usize) -> Vec<Issue> {
        (0..n)
            .map(|i| Issue {
                id: format!("iss-{i}"),
                lat: 49.1695,
                lon: 9.3845,
                title: format!("Issue {i}"),
                subtitle: None,
                elements: vec![ElementRef::way(i64::try_from(i).unwrap() + 1)],
                bbox: None,
            })
            .collect()
    }

    fn bench() -> Element {
        Element {
            id: 42,
            version: 3,
            changeset: 7,
            author: None,
            timestamp: None,
            visible: true,
            tags: BTreeMap::from([("amenity".to_string(), "bench".to_string())]),
            body: ElementBody::Node { lat: 49.0, lon: 9.0 },
        }
    }

    fn settings(idle_timeout: Duration) -> SessionSettings {
        SessionSettings {
            page_size: NonZeroUsize::new(10).unwrap(),
            search_radius_m: 1000.0,
            changeset_comment: "test edit".to_string(),
            idle_timeout,
        }
    }

    fn store(
        issues: Arc<MockIssueService>,
        geodata: Arc<MockGeoDataService>,
        accounts: MemoryAccountStore,
        idle_timeout: Duration,
    ) -> SessionStore {
        store_with(issues, geodata, Arc::new(accounts), idle_timeout)
    }

    fn store_with(
        issues: Arc<MockIssueService>,
        geodata: Arc<MockGeoDataService>,
        accounts: Arc<MemoryAccountStore>,
        idle_timeout: Duration,
    ) -> SessionStore {
        SessionStore::new(
            Services {
                issues,
                geodata,
                accounts,
            },
            settings(idle_timeout),
        )
    }

    fn linked() -> MemoryAccountStore {
        MemoryAccountStore::with(USER, Credential::Bearer("tok".to_string()))
    }

    async fn send(store: &SessionStore, event: Event) -> TriggerReply {
        store.send_trigger(USER, event).await.unwrap()
    }

    fn failure_kinds(reply: &TriggerReply) -> Vec<RemoteErrorKind> {
        reply
            .messages
            .iter()
            .filter_map(|n| match n {
                Notice::Failure { kind, .. } => Some(*kind),
                Notice::Text { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_search_and_page_scenario() {
        let issue_service = Arc::new(MockIssueService::new());
        issue_service.queue_search(Ok(issues(12)));
        let store = store(
            issue_service.clone(),
            Arc::new(MockGeoDataService::new()),
            linked(),
            Duration::from_secs(60),
        );

        let reply = send(
            &store,
            Event::StartSearch(SearchQuery::Location {
                lat: 49.1695,
                lon: 9.3845,
            }),
        )
        .await;
        assert_eq!(reply.state, "browsing");
        assert_eq!(reply.error, None);
        assert!(matches!(&reply.messages[..], [Notice::Text { text }] if text.starts_with("Page 1/2 (12 results)")));
        assert_eq!(
            issue_service.recorded_calls(),
            vec!["search_by_location 49.1695 9.3845 1000".to_string()]
        );

        let second = send(&store, Event::PageNext).await;
        let clamped = send(&store, Event::PageNext).await;
        assert_eq!(second.messages, clamped.messages);
        assert!(matches!(&second.messages[..], [Notice::Text { text }] if text.contains("Issue 11") && !text.contains("Issue 9")));
    }

    #[tokio::test]
    async fn test_empty_search_returns_to_idle() {
        let issue_service = Arc::new(MockIssueService::new());
        issue_service.queue_search(Ok(vec![]));
        let store = store(issue_service, Arc::new(MockGeoDataService::new()), linked(), Duration::from_secs(60));

        let reply = send(
            &store,
            Event::StartSearch(SearchQuery::Username {
                username: "nobody".to_string(),
            }),
        )
        .await;
        assert_eq!(reply.state, "idle");
        assert_eq!(failure_kinds(&reply), vec![RemoteErrorKind::NotFound]);

        let err = send(&store, Event::PageNext).await.error;
        assert!(matches!(err, Some(TransitionError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_select_item_fetches_detail() {
        let issue_service = Arc::new(MockIssueService::new());
        issue_service.queue_search(Ok(issues(3)));
        let mut detailed = issues(3).remove(1);
        detailed.subtitle = Some("highway=service".to_string());
        issue_service.queue_detail(Ok(detailed));
        let store = store(issue_service.clone(), Arc::new(MockGeoDataService::new()), linked(), Duration::from_secs(60));

        send(&store, Event::StartSearch(SearchQuery::Username { username: "mapper".to_string() })).await;
        let reply = send(&store, Event::SelectItem { index: 1 }).await;
        assert_eq!(reply.state, "idle");
        assert!(matches!(&reply.messages[..], [Notice::Text { text }] if text.contains("highway=service")));
        assert_eq!(issue_service.recorded_calls()[1], "get_detail iss-1");
    }

    #[tokio::test]
    async fn test_upload_scenario_and_conflict() {
        let geodata = Arc::new(MockGeoDataService::new());
        geodata.queue_upload(Err(RemoteError::conflict("HTTP 409 Conflict")));
        geodata.queue_upload(Ok(4711));
        let store = store(Arc::new(MockIssueService::new()), geodata.clone(), linked(), Duration::from_secs(60));

        let reply = send(
            &store,
            Event::StartUpload {
                payload: b"<gpx></gpx>".to_vec(),
                filename: "trip.gpx".to_string(),
            },
        )
        .await;
        assert_eq!(reply.state, "gpx_await_name");
        assert_eq!(send(&store, Event::TextReply("Morning Ride".to_string())).await.state, "gpx_await_description");
        assert_eq!(send(&store, Event::TextReply("skip".to_string())).await.state, "gpx_confirm");
        for _ in 0..4 {
            assert_eq!(send(&store, Event::ToggleVisibility).await.state, "gpx_confirm");
        }

        let failed = send(&store, Event::ConfirmSubmit).await;
        assert_eq!(failed.state, "gpx_confirm");
        assert_eq!(failure_kinds(&failed), vec![RemoteErrorKind::Conflict]);

        let uploaded = send(&store, Event::ConfirmSubmit).await;
        assert_eq!(uploaded.state, "done");

        // Both attempts carried the same untouched draft
        let uploads = geodata.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0], uploads[1]);
        assert_eq!(uploads[0].name.as_deref(), Some("Morning Ride"));
        assert_eq!(uploads[0].description, None);
        assert_eq!(uploads[0].visibility, Visibility::Trackable);
    }

    #[tokio::test]
    async fn test_cancel_then_confirm_is_invalid_state() {
        let store = store(Arc::new(MockIssueService::new()), Arc::new(MockGeoDataService::new()), linked(), Duration::from_secs(60));

        send(
            &store,
            Event::StartUpload {
                payload: b"<gpx/>".to_vec(),
                filename: "trip.gpx".to_string(),
            },
        )
        .await;
        let cancelled = send(&store, Event::Cancel).await;
        assert_eq!(cancelled.state, "cancelled");

        let reply = send(&store, Event::ConfirmSubmit).await;
        assert_eq!(reply.state, "idle");
        assert!(matches!(reply.error, Some(TransitionError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_edit_opens_and_closes_changeset() {
        let geodata = Arc::new(MockGeoDataService::new());
        geodata.insert_element(bench());
        let store = store(Arc::new(MockIssueService::new()), geodata.clone(), linked(), Duration::from_secs(60));

        let reply = send(&store, Event::EditElement(ElementRef::node(42))).await;
        assert_eq!(reply.state, "edit_select_action");
        send(&store, Event::TextReply("tag".to_string())).await;
        send(&store, Event::TextReply("backrest".to_string())).await;
        send(&store, Event::TextReply("yes".to_string())).await;

        let done = send(&store, Event::ConfirmSubmit).await;
        assert_eq!(done.state, "done");

        let saved = geodata.element(ElementRef::node(42)).unwrap();
        assert_eq!(saved.version, 4);
        assert_eq!(saved.tags.get("backrest").map(String::as_str), Some("yes"));
        assert_eq!(
            geodata.recorded_calls(),
            vec![
                "get_element node/42".to_string(),
                "create_changeset".to_string(),
                "edit_element".to_string(),
                "close_changeset 101".to_string(),
            ]
        );
        assert!(geodata
            .credentials
            .lock()
            .unwrap()
            .iter()
            .all(|c| *c == Credential::Bearer("tok".to_string())));
    }

    #[tokio::test]
    async fn test_failed_edit_keeps_draft_and_closes_changeset() {
        let geodata = Arc::new(MockGeoDataService::new());
        geodata.insert_element(bench());
        geodata.fail_next_edit(RemoteError::validation("HTTP 412"));
        let store = store(Arc::new(MockIssueService::new()), geodata.clone(), linked(), Duration::from_secs(60));

        send(&store, Event::EditElement(ElementRef::node(42))).await;
        send(&store, Event::TextReply("location".to_string())).await;
        send(&store, Event::TextReply("49.5, 9.5".to_string())).await;

        let failed = send(&store, Event::ConfirmSubmit).await;
        assert_eq!(failed.state, "edit_select_action");
        assert_eq!(failure_kinds(&failed), vec![RemoteErrorKind::Validation]);
        assert!(geodata.recorded_calls().contains(&"close_changeset 101".to_string()));

        // Retrying submits the same draft
        let done = send(&store, Event::ConfirmSubmit).await;
        assert_eq!(done.state, "done");
        let saved = geodata.element(ElementRef::node(42)).unwrap();
        assert_eq!(saved.body, ElementBody::Node { lat: 49.5, lon: 9.5 });
    }

    #[tokio::test]
    async fn test_submit_without_credentials() {
        let geodata = Arc::new(MockGeoDataService::new());
        let store = store(
            Arc::new(MockIssueService::new()),
            geodata.clone(),
            MemoryAccountStore::default(),
            Duration::from_secs(60),
        );

        send(&store, Event::StartUpload { payload: b"<gpx/>".to_vec(), filename: "a.gpx".to_string() }).await;
        send(&store, Event::TextReply("Walk".to_string())).await;
        send(&store, Event::TextReply("Evening walk".to_string())).await;
        let reply = send(&store, Event::ConfirmSubmit).await;

        assert_eq!(reply.state, "gpx_confirm");
        assert_eq!(failure_kinds(&reply), vec![RemoteErrorKind::MethodNotAllowed]);
        assert!(geodata.recorded_calls().is_empty());
    }

    /// Cancel while a call is outstanding: the late result is dropped and the
    /// trigger that started the call still gets an answer.
    #[tokio::test]
    async fn test_cancel_during_search() {
        let issue_service = Arc::new(MockIssueService::with_delay(Duration::from_millis(300)));
        issue_service.queue_search(Ok(issues(5)));
        let call_started = issue_service.call_started.clone();
        let store = Arc::new(store(issue_service, Arc::new(MockGeoDataService::new()), linked(), Duration::from_secs(60)));

        let searching = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .send_trigger(USER, Event::StartSearch(SearchQuery::Username { username: "mapper".to_string() }))
                    .await
            })
        };
        tokio::time::timeout(Duration::from_secs(1), call_started.notified())
            .await
            .expect("search should start");

        let busy = send(&store, Event::PageNext).await;
        assert_eq!(busy.state, "searching");
        assert_eq!(busy.error, Some(TransitionError::Busy));

        let cancelled = send(&store, Event::Cancel).await;
        assert_eq!(cancelled.state, "cancelled");

        let first = searching.await.unwrap().unwrap();
        assert_eq!(first.state, "cancelled");

        // Let the delayed result arrive; it must not revive anything
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.state(USER).await, None);
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_idle_timeout_discards_draft() {
        let store = store(
            Arc::new(MockIssueService::new()),
            Arc::new(MockGeoDataService::new()),
            linked(),
            Duration::from_millis(100),
        );
        send(&store, Event::StartUpload { payload: b"<gpx/>".to_vec(), filename: "a.gpx".to_string() }).await;
        assert_eq!(store.state(USER).await, Some("gpx_await_name"));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.state(USER).await, None);

        // A new session starts from scratch
        let reply = send(&store, Event::TextReply("Walk".to_string())).await;
        assert_eq!(reply.state, "idle");
        assert!(matches!(reply.error, Some(TransitionError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn test_sessions_are_per_user() {
        let store = store(Arc::new(MockIssueService::new()), Arc::new(MockGeoDataService::new()), linked(), Duration::from_secs(60));
        send(&store, Event::StartUpload { payload: b"<gpx/>".to_vec(), filename: "a.gpx".to_string() }).await;
        let other = store.send_trigger("user-2", Event::ToggleVisibility).await.unwrap();

        assert!(matches!(other.error, Some(TransitionError::InvalidState { .. })));
        assert_eq!(store.state(USER).await, Some("gpx_await_name"));
        assert_eq!(store.state("user-2").await, Some("idle"));
        assert_eq!(store.active_count().await, 2);
    }

    #[tokio::test]
    async fn test_runtime_returns_final_state() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let runtime = SessionRuntime::new(
            SessionContext::new(USER, NonZeroUsize::new(5).unwrap()),
            Arc::new(MockIssueService::new()),
            Arc::new(MockGeoDataService::new()),
            Arc::new(linked()),
            Duration::from_secs(60),
            event_rx,
            event_tx.clone(),
        );
        let task = tokio::spawn(runtime.run());

        let (reply, reply_rx) = oneshot::channel();
        event_tx
            .send(SessionMessage::Trigger { event: Event::Cancel, reply })
            .await
            .unwrap();
        assert!(matches!(reply_rx.await.unwrap(), TriggerOutcome::Replied(r) if r.state == "cancelled"));
        assert_eq!(task.await.unwrap(), SessionState::Cancelled);
    }

    #[tokio::test]
    async fn test_runtime_hands_back_queued_triggers() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let runtime = SessionRuntime::new(
            SessionContext::new(USER, NonZeroUsize::new(5).unwrap()),
            Arc::new(MockIssueService::new()),
            Arc::new(MockGeoDataService::new()),
            Arc::new(linked()),
            Duration::from_secs(60),
            event_rx,
            event_tx.clone(),
        );

        // Both triggers are queued before the session runs its first turn
        let (cancel, cancel_rx) = oneshot::channel();
        let (next, next_rx) = oneshot::channel();
        event_tx
            .send(SessionMessage::Trigger { event: Event::Cancel, reply: cancel })
            .await
            .unwrap();
        event_tx
            .send(SessionMessage::Trigger { event: Event::PageNext, reply: next })
            .await
            .unwrap();
        assert_eq!(runtime.run().await, SessionState::Cancelled);

        assert!(matches!(cancel_rx.await.unwrap(), TriggerOutcome::Replied(r) if r.state == "cancelled"));
        assert!(matches!(next_rx.await.unwrap(), TriggerOutcome::Requeue(Event::PageNext)));
        assert!(event_tx.is_closed());
    }

    #[tokio::test]
    async fn test_trigger_behind_cancel_reaches_new_session() {
        let store = store(Arc::new(MockIssueService::new()), Arc::new(MockGeoDataService::new()), linked(), Duration::from_secs(60));
        send(&store, Event::StartUpload { payload: b"<gpx/>".to_vec(), filename: "a.gpx".to_string() }).await;

        let (cancelled, restarted) = tokio::join!(
            store.send_trigger(USER, Event::Cancel),
            store.send_trigger(
                USER,
                Event::StartUpload {
                    payload: b"<gpx/>".to_vec(),
                    filename: "b.gpx".to_string(),
                }
            ),
        );
        assert_eq!(cancelled.unwrap().state, "cancelled");
        let restarted = restarted.unwrap();
        assert_eq!(restarted.state, "gpx_await_name");
        assert_eq!(restarted.error, None);
        assert_eq!(store.state(USER).await, Some("gpx_await_name"));
        assert_eq!(store.active_count().await, 1);
    }

    /// Idle timeout while a call is outstanding: the waiting trigger is
    /// answered and the late result is dropped.
    #[tokio::test]
    async fn test_idle_timeout_during_search() {
        let issue_service = Arc::new(MockIssueService::with_delay(Duration::from_millis(300)));
        issue_service.queue_search(Ok(issues(5)));
        let store = store(issue_service, Arc::new(MockGeoDataService::new()), linked(), Duration::from_millis(100));

        let reply = send(&store, Event::StartSearch(SearchQuery::Username { username: "mapper".to_string() })).await;
        assert_eq!(reply.state, "cancelled");
        assert_eq!(reply.error, None);
        assert!(matches!(&reply.messages[..], [Notice::Text { text }] if text.contains("inactivity")));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.state(USER).await, None);
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_settings_are_saved_and_used() {
        let issue_service = Arc::new(MockIssueService::new());
        issue_service.queue_search(Ok(issues(2)));
        let accounts = Arc::new(linked());
        let store = store_with(issue_service.clone(), Arc::new(MockGeoDataService::new()), accounts.clone(), Duration::from_secs(60));

        assert_eq!(send(&store, Event::OpenSettings).await.state, "settings_menu");
        send(&store, Event::TextReply("osm-name".to_string())).await;
        let saved = send(&store, Event::TextReply("mapper".to_string())).await;
        assert_eq!(saved.state, "settings_menu");
        assert!(matches!(&saved.messages[..], [Notice::Text { text }] if text.starts_with("Saved.") && text.contains("OSM-Name: mapper")));
        send(&store, Event::TextReply("language".to_string())).await;
        send(&store, Event::TextReply("de".to_string())).await;
        assert_eq!(send(&store, Event::TextReply("done".to_string())).await.state, "idle");

        assert_eq!(
            accounts.saved_settings(USER),
            Some(UserSettings {
                osm_name: Some("mapper".to_string()),
                language: Some("de".to_string()),
            })
        );

        let reply = send(&store, Event::StartSearch(SearchQuery::Username { username: String::new() })).await;
        assert_eq!(reply.state, "browsing");
        assert_eq!(issue_service.recorded_calls(), vec!["search_by_user mapper lang=de".to_string()]);
    }

    #[tokio::test]
    async fn test_stored_settings_load_with_new_session() {
        let issue_service = Arc::new(MockIssueService::new());
        issue_service.queue_search(Ok(issues(1)));
        issue_service.queue_detail(Ok(issues(1).remove(0)));
        let accounts = linked().with_settings(
            USER,
            UserSettings {
                osm_name: Some("mapper".to_string()),
                language: Some("fr".to_string()),
            },
        );
        let store = store(issue_service.clone(), Arc::new(MockGeoDataService::new()), accounts, Duration::from_secs(60));

        send(&store, Event::StartSearch(SearchQuery::Location { lat: 49.1695, lon: 9.3845 })).await;
        send(&store, Event::SelectItem { index: 0 }).await;
        assert_eq!(
            issue_service.recorded_calls(),
            vec![
                "search_by_location 49.1695 9.3845 1000 lang=fr".to_string(),
                "get_detail iss-0 lang=fr".to_string(),
            ]
        );

        // Other users keep the service default
        issue_service.queue_search(Ok(issues(1)));
        store
            .send_trigger("user-2", Event::StartSearch(SearchQuery::Username { username: "other".to_string() }))
            .await
            .unwrap();
        assert_eq!(issue_service.recorded_calls()[2], "search_by_user other");
    }

    #[tokio::test]
    async fn test_failed_settings_save_is_reported() {
        let accounts = Arc::new(linked());
        accounts.fail_saves();
        let store = store_with(Arc::new(MockIssueService::new()), Arc::new(MockGeoDataService::new()), accounts.clone(), Duration::from_secs(60));

        send(&store, Event::OpenSettings).await;
        send(&store, Event::TextReply("language".to_string())).await;
        let reply = send(&store, Event::TextReply("de".to_string())).await;
        assert_eq!(reply.state, "settings_menu");
        assert_eq!(failure_kinds(&reply), vec![RemoteErrorKind::UnclassifiedTransport]);
        assert_eq!(accounts.saved_settings(USER), None);

        // Nothing was stored, so there is still no default username
        assert_eq!(send(&store, Event::TextReply("done".to_string())).await.state, "idle");
        let reply = send(&store, Event::StartSearch(SearchQuery::Username { username: String::new() })).await;
        assert!(matches!(reply.error, Some(TransitionError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unchanged_edit_makes_no_writes() {
        let geodata = Arc::new(MockGeoDataService::new());
        geodata.insert_element(bench());
        let store = store(Arc::new(MockIssueService::new()), geodata.clone(), linked(), Duration::from_secs(60));

        send(&store, Event::EditElement(ElementRef::node(42))).await;
        let reply = send(&store, Event::ConfirmSubmit).await;
        assert_eq!(reply.state, "edit_select_action");
        assert!(matches!(reply.error, Some(TransitionError::InvalidInput(_))));
        assert_eq!(geodata.recorded_calls(), vec!["get_element node/42".to_string()]);
    }

    #[test]
    fn test_store_error_message() {
        assert_eq!(StoreError::SessionEnded.to_string(), "Session ended before replying");
    }
}

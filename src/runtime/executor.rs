//! Session runtime executor

use super::traits::AccountStore;
use crate::client::{Credential, GeoDataService, IssueService, RemoteError};
use crate::geo::{Element, ElementDraft};
use crate::session::{
    transition, Effect, Event, Notice, SearchQuery, SessionContext, SessionState, TransitionError,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Tag identifying changesets opened by this service
const CREATED_BY: &str = concat!("osmate ", env!("CARGO_PKG_VERSION"));

/// Messages accepted by a session task
#[derive(Debug)]
pub enum SessionMessage {
    /// User trigger; the reply is sent once the turn has settled
    Trigger {
        event: Event,
        reply: oneshot::Sender<TriggerOutcome>,
    },
    /// Result of a spawned remote call
    Result(Event),
    /// Current state label, without touching the session
    Inspect(oneshot::Sender<&'static str>),
}

/// Outcome of one user trigger
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerReply {
    pub state: &'static str,
    pub messages: Vec<Notice>,
    pub error: Option<TransitionError>,
}

/// What became of a trigger sent to a session
#[derive(Debug)]
pub enum TriggerOutcome {
    Replied(TriggerReply),
    /// The session ended before the trigger's turn; send it to a new session
    Requeue(Event),
}

/// Trigger waiting on the remote call it started
struct PendingReply {
    reply: oneshot::Sender<TriggerOutcome>,
    messages: Vec<Notice>,
}

/// Runtime for one user's session.
///
/// Generic over the service implementations so tests can drive it with
/// mocks; the store uses trait objects.
pub struct SessionRuntime<I, G, C>
where
    I: IssueService + ?Sized + 'static,
    G: GeoDataService + ?Sized + 'static,
    C: AccountStore + ?Sized + 'static,
{
    context: SessionContext,
    state: SessionState,
    issues: Arc<I>,
    geodata: Arc<G>,
    accounts: Arc<C>,
    idle_timeout: Duration,
    event_rx: mpsc::Receiver<SessionMessage>,
    event_tx: mpsc::Sender<SessionMessage>,
    pending: Option<PendingReply>,
}

impl<I, G, C> SessionRuntime<I, G, C>
where
    I: IssueService + ?Sized + 'static,
    G: GeoDataService + ?Sized + 'static,
    C: AccountStore + ?Sized + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        issues: Arc<I>,
        geodata: Arc<G>,
        accounts: Arc<C>,
        idle_timeout: Duration,
        event_rx: mpsc::Receiver<SessionMessage>,
        event_tx: mpsc::Sender<SessionMessage>,
    ) -> Self {
        Self {
            context,
            state: SessionState::Idle,
            issues,
            geodata,
            accounts,
            idle_timeout,
            event_rx,
            event_tx,
            pending: None,
        }
    }

    /// Process messages until the session ends. Returns the final state.
    pub async fn run(mut self) -> SessionState {
        tracing::info!(user_id = %self.context.user_id, "Starting session");

        let mut deadline = Instant::now() + self.idle_timeout;
        loop {
            tokio::select! {
                message = self.event_rx.recv() => {
                    let Some(message) = message else { break };
                    if !matches!(message, SessionMessage::Inspect(_)) {
                        deadline = Instant::now() + self.idle_timeout;
                    }
                    self.process_message(message);
                }
                () = tokio::time::sleep_until(deadline) => {
                    tracing::info!(user_id = %self.context.user_id, state = self.state.name(), "Session idle timeout");
                    let mut messages = Vec::new();
                    let _ = self.apply(Event::IdleTimeout, &mut messages);
                    self.settle_pending(messages);
                }
            }
            if self.state.is_terminal() {
                break;
            }
        }

        self.drain_queue();
        tracing::info!(user_id = %self.context.user_id, state = self.state.name(), "Session stopped");
        self.state
    }

    /// Hand queued triggers back to the store once the session has ended
    fn drain_queue(&mut self) {
        self.event_rx.close();
        while let Ok(message) = self.event_rx.try_recv() {
            match message {
                SessionMessage::Trigger { event, reply } => {
                    tracing::debug!(user_id = %self.context.user_id, event = event.name(), "Requeueing trigger");
                    let _ = reply.send(TriggerOutcome::Requeue(event));
                }
                SessionMessage::Result(event) => {
                    tracing::debug!(user_id = %self.context.user_id, event = event.name(), "Session gone, dropping remote result");
                }
                SessionMessage::Inspect(_) => {}
            }
        }
    }

    fn process_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Inspect(reply) => {
                let _ = reply.send(self.state.name());
            }
            SessionMessage::Trigger { event, reply } => {
                let mut messages = Vec::new();
                let error = self.apply(event, &mut messages).err();

                if error.is_none() && self.state.is_in_flight() {
                    // Reply once the call's result has been applied
                    self.pending = Some(PendingReply { reply, messages });
                    return;
                }
                if error.is_none() {
                    // Cancel while a call was outstanding settles that trigger too
                    self.settle_pending(messages.clone());
                }
                let _ = reply.send(TriggerOutcome::Replied(TriggerReply {
                    state: self.state.name(),
                    messages,
                    error,
                }));
            }
            SessionMessage::Result(event) => {
                let mut messages = Vec::new();
                match self.apply(event, &mut messages) {
                    Ok(()) => self.settle_pending(messages),
                    Err(e) => {
                        tracing::debug!(user_id = %self.context.user_id, error = %e, "Discarding remote result");
                    }
                }
            }
        }
    }

    /// Run one transition and carry out its effects
    fn apply(&mut self, event: Event, messages: &mut Vec<Notice>) -> Result<(), TransitionError> {
        let event_name = event.name();
        let result = match transition(&self.state, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                match &e {
                    TransitionError::InvalidState { state, event } => tracing::warn!(
                        user_id = %self.context.user_id,
                        usage_fault = true,
                        state,
                        event,
                        "Trigger not valid in current state"
                    ),
                    TransitionError::StaleResult { .. } => {}
                    TransitionError::Busy | TransitionError::InvalidInput(_) => tracing::info!(
                        user_id = %self.context.user_id,
                        event = event_name,
                        error = %e,
                        "Trigger rejected"
                    ),
                }
                return Err(e);
            }
        };

        tracing::debug!(
            user_id = %self.context.user_id,
            from = self.state.name(),
            to = result.new_state.name(),
            event = event_name,
            "Session transition"
        );
        self.state = result.new_state;

        for effect in result.effects {
            self.execute_effect(effect, messages);
        }
        Ok(())
    }

    fn settle_pending(&mut self, messages: Vec<Notice>) {
        if let Some(mut pending) = self.pending.take() {
            pending.messages.extend(messages);
            let _ = pending.reply.send(TriggerOutcome::Replied(TriggerReply {
                state: self.state.name(),
                messages: pending.messages,
                error: None,
            }));
        }
    }

    fn execute_effect(&mut self, effect: Effect, messages: &mut Vec<Notice>) {
        match effect {
            Effect::Notify(notice) => messages.push(notice),
            Effect::ApplySettings(settings) => self.context.settings = settings,
            Effect::SearchIssues {
                query,
                radius_m,
                language,
            } => {
                let issues = Arc::clone(&self.issues);
                self.spawn_call(async move {
                    let language = language.as_deref();
                    let result = match &query {
                        SearchQuery::Location { lat, lon } => {
                            issues.search_by_location(*lat, *lon, radius_m, language).await
                        }
                        SearchQuery::Username { username } => {
                            issues.search_by_user(username, language).await
                        }
                    };
                    result.map(|issues| Event::SearchCompleted { issues })
                });
            }
            Effect::FetchIssueDetail { issue_id, language } => {
                let issues = Arc::clone(&self.issues);
                self.spawn_call(async move {
                    issues
                        .get_detail(&issue_id, language.as_deref())
                        .await
                        .map(|issue| Event::DetailFetched { issue })
                });
            }
            Effect::SaveSettings { settings } => {
                let accounts = Arc::clone(&self.accounts);
                let user_id = self.context.user_id.clone();
                self.spawn_call(async move {
                    accounts
                        .save_settings(&user_id, &settings)
                        .await
                        .map_err(|e| RemoteError::transport(format!("saving settings failed: {e}")))?;
                    Ok(Event::SettingsSaved { settings })
                });
            }
            Effect::FetchElement { element } => {
                let geodata = Arc::clone(&self.geodata);
                self.spawn_call(async move {
                    geodata
                        .get_element(element)
                        .await
                        .map(|element| Event::ElementFetched { element })
                });
            }
            Effect::SubmitEdit { draft, comment } => {
                let geodata = Arc::clone(&self.geodata);
                let accounts = Arc::clone(&self.accounts);
                let user_id = self.context.user_id.clone();
                self.spawn_call(async move {
                    let credential = load_credential(&*accounts, &user_id).await?;
                    submit_edit(&*geodata, &credential, &draft, &comment)
                        .await
                        .map(|element| Event::EditSubmitted { element })
                });
            }
            Effect::UploadTrace { draft } => {
                let geodata = Arc::clone(&self.geodata);
                let accounts = Arc::clone(&self.accounts);
                let user_id = self.context.user_id.clone();
                self.spawn_call(async move {
                    let credential = load_credential(&*accounts, &user_id).await?;
                    geodata
                        .upload_trace(&credential, &draft)
                        .await
                        .map(|trace_id| Event::TraceUploaded { trace_id })
                });
            }
        }
    }

    /// Run a remote call as its own task; its outcome re-enters the queue
    fn spawn_call<F>(&self, call: F)
    where
        F: std::future::Future<Output = Result<Event, RemoteError>> + Send + 'static,
    {
        let event_tx = self.event_tx.clone();
        let user_id = self.context.user_id.clone();
        tokio::spawn(async move {
            let event = match call.await {
                Ok(event) => event,
                Err(error) => {
                    tracing::warn!(
                        user_id = %user_id,
                        remote_error = %error.kind,
                        status = ?error.status,
                        error = %error.message,
                        "Remote call failed"
                    );
                    Event::RemoteFailed { error }
                }
            };
            if event_tx.send(SessionMessage::Result(event)).await.is_err() {
                tracing::debug!(user_id = %user_id, "Session gone, dropping remote result");
            }
        });
    }
}

async fn load_credential<C: AccountStore + ?Sized>(
    accounts: &C,
    user_id: &str,
) -> Result<Credential, RemoteError> {
    match accounts.credential(user_id).await {
        Ok(Some(credential)) => Ok(credential),
        Ok(None) => Err(RemoteError::method_not_allowed(
            "no linked account, link your account first",
        )),
        Err(e) => Err(RemoteError::transport(format!("credential lookup failed: {e}"))),
    }
}

/// Open a changeset, write the draft, close the changeset.
///
/// The changeset is closed even when the write fails. A failed close after a
/// successful write does not undo the write, so it is only logged.
async fn submit_edit<G: GeoDataService + ?Sized>(
    geodata: &G,
    credential: &Credential,
    draft: &ElementDraft,
    comment: &str,
) -> Result<Element, RemoteError> {
    let tags = BTreeMap::from([
        ("comment".to_string(), comment.to_string()),
        ("created_by".to_string(), CREATED_BY.to_string()),
    ]);
    let mut changeset = geodata.create_changeset(credential, &tags).await?;

    let written = if draft.id.is_some() {
        geodata.edit_element(credential, draft, &changeset).await
    } else {
        geodata.create_element(credential, draft, &changeset).await
    };

    if let Err(e) = geodata.close_changeset(credential, &mut changeset).await {
        tracing::warn!(changeset = changeset.id, remote_error = %e.kind, error = %e.message, "Failed to close changeset");
    }
    written
}

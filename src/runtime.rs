//! Async driver that runs registry and turn operations against a backend.
//!
//! Engine state lives behind one mutex that is never held across an await.
//! Every mutation publishes a fresh [`ChatView`] on a watch channel.

use std::sync::{Arc, Mutex, MutexGuard};

use chat_backend::{
    BackendError, BackendProfile, ChatBackend, Excerpt, Message, Session,
};
use futures_util::StreamExt;
use tokio::sync::watch;

use crate::classify::classify;
use crate::decoder::decode_stream;
use crate::error::ChatError;
use crate::ids::now_millis;
use crate::options::EngineOptions;
use crate::registry::{ListingOutcome, SelectOutcome, SessionRegistry};
use crate::turn::{DispatchTicket, TurnCoordinator, TurnId, TurnPhase, TurnState};

/// Snapshot of everything a front end renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatView {
    pub document_id: Option<String>,
    pub sessions: Vec<Session>,
    pub selected_session_id: Option<String>,
    pub transcript: Vec<Message>,
    pub pending_excerpts: Vec<Excerpt>,
    pub turn: TurnState,
    pub phase: TurnPhase,
    /// Last setup error, cleared by the next operation.
    pub notice: Option<String>,
}

impl ChatView {
    pub fn selected_session(&self) -> Option<&Session> {
        let selected = self.selected_session_id.as_deref()?;
        self.sessions.iter().find(|session| session.id == selected)
    }
}

/// How a dispatched turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnReport {
    /// The answer was appended to the transcript.
    Answered(Message),
    /// The stream ended without answer text; nothing was appended.
    NoAnswer,
    /// Transport failure; the fallback reply was appended.
    Failed(BackendError),
    /// The turn was cancelled or superseded and applied nothing further.
    Cancelled,
}

#[derive(Debug, Default)]
struct EngineState {
    registry: SessionRegistry,
    turns: TurnCoordinator,
    notice: Option<String>,
}

impl EngineState {
    fn snapshot(&self) -> ChatView {
        ChatView {
            document_id: self.registry.document_id().map(str::to_owned),
            sessions: self.registry.sessions().to_vec(),
            selected_session_id: self.registry.selected_id().map(str::to_owned),
            transcript: self.turns.transcript().to_vec(),
            pending_excerpts: self.turns.tray().items().to_vec(),
            turn: self.turns.state().clone(),
            phase: self.turns.phase(),
            notice: self.notice.clone(),
        }
    }
}

pub struct ChatRuntime {
    backend: Arc<dyn ChatBackend>,
    options: EngineOptions,
    state: Mutex<EngineState>,
    session_gate: tokio::sync::Mutex<()>,
    view: watch::Sender<ChatView>,
}

impl ChatRuntime {
    pub fn new(backend: Arc<dyn ChatBackend>, options: EngineOptions) -> Self {
        let (view, _) = watch::channel(ChatView::default());
        Self {
            backend,
            options,
            state: Mutex::new(EngineState::default()),
            session_gate: tokio::sync::Mutex::new(()),
            view,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn backend_profile(&self) -> BackendProfile {
        self.backend.profile()
    }

    /// Receives a new [`ChatView`] after every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> ChatView {
        self.view.borrow().clone()
    }

    /// Opens a document: cancels any turn, clears sessions, transcript and
    /// excerpts, then lists the document's sessions.
    pub async fn open_document(
        &self,
        document_id: impl Into<String>,
    ) -> Result<Vec<Session>, ChatError> {
        let document_id = document_id.into();
        let generation = self.with_state(|state| {
            state.notice = None;
            state.turns.reset();
            state.registry.reset(Some(document_id.clone()));
            state.registry.generation()
        });

        tracing::debug!(document_id, "document opened");
        self.load_sessions(&document_id, generation).await
    }

    /// Re-lists sessions of the open document.
    pub async fn refresh_sessions(&self) -> Result<Vec<Session>, ChatError> {
        let (document_id, generation) = self.with_state(|state| {
            state.notice = None;
            state
                .registry
                .document_id()
                .map(|document_id| (document_id.to_string(), state.registry.generation()))
                .ok_or(ChatError::NoDocumentOpen)
        })?;

        self.load_sessions(&document_id, generation).await
    }

    /// Creates a session for the open document and selects it.
    pub async fn create_session(&self) -> Result<Session, ChatError> {
        self.with_state(|state| state.notice = None);
        let _gate = self.session_gate.lock().await;
        self.create_and_select().await
    }

    /// Selects a session and loads its history.
    ///
    /// Selecting the current session is a no-op. The active turn is cancelled
    /// only once the new history has loaded. A document switch during the
    /// load yields [`SelectOutcome::Superseded`] and selects nothing.
    pub async fn select_session(&self, session_id: &str) -> Result<SelectOutcome, ChatError> {
        let generation = self.with_state(|state| {
            state.notice = None;
            if state.registry.selected_id() == Some(session_id) {
                return Ok(None);
            }
            if state.registry.get(session_id).is_none() {
                return Err(ChatError::UnknownSession(session_id.to_string()));
            }
            Ok(Some(state.registry.generation()))
        })?;

        let Some(generation) = generation else {
            return Ok(SelectOutcome::Unchanged);
        };

        let messages = match self.backend.list_messages(session_id).await {
            Ok(messages) => messages,
            Err(error) => return Err(self.setup_failed(ChatError::SessionSelect(error))),
        };

        self.with_state(|state| {
            if state.registry.generation() != generation {
                tracing::debug!(session_id, "dropping history loaded for previous document");
                return Ok(SelectOutcome::Superseded);
            }

            let outcome = state.registry.select(session_id)?;
            if outcome == SelectOutcome::Changed {
                state.turns.cancel_active();
                state.turns.replace_transcript(messages);
            }
            Ok(outcome)
        })
    }

    /// Adds an excerpt to the pending tray and returns its id.
    pub fn attach_excerpt(&self, excerpt: Excerpt) -> String {
        self.with_state(|state| state.turns.tray_mut().attach(excerpt))
    }

    pub fn remove_excerpt(&self, excerpt_id: &str) -> bool {
        self.with_state(|state| state.turns.tray_mut().remove(excerpt_id))
    }

    pub fn clear_excerpts(&self) {
        self.with_state(|state| state.turns.tray_mut().clear());
    }

    pub fn pending_excerpts(&self) -> Vec<Excerpt> {
        self.lock_state().turns.tray().items().to_vec()
    }

    /// Cancels the active turn. Any partial answer is discarded.
    pub fn cancel_turn(&self) -> bool {
        self.with_state(|state| state.turns.cancel_active().is_some())
    }

    /// Sends one question and drives its turn to completion.
    ///
    /// Creates and selects a session first when none is selected. Setup
    /// failures are returned as errors with the transcript untouched; transport
    /// failures become the fallback reply and a [`TurnReport::Failed`].
    pub async fn send(&self, content: &str) -> Result<TurnReport, ChatError> {
        self.with_state(|state| {
            state.notice = None;
            if state.registry.document_id().is_none() {
                return Err(ChatError::NoDocumentOpen);
            }
            state.turns.check_sendable(content)
        })?;

        let session_id = match self.selected_session_id() {
            Some(session_id) => session_id,
            None => {
                let _gate = self.session_gate.lock().await;
                match self.selected_session_id() {
                    Some(session_id) => session_id,
                    None => self.create_and_select().await?.id,
                }
            }
        };

        let ticket = self.with_state(|state| {
            let Some(document_id) = state.registry.document_id().map(str::to_owned) else {
                return Err(ChatError::NoDocumentOpen);
            };
            if state.registry.selected_id() != Some(session_id.as_str()) {
                return Ok(None);
            }
            state.turns.check_sendable(content)?;

            let now = now_millis();
            let ticket = state.turns.begin(
                &session_id,
                &document_id,
                content,
                now,
                &self.options.thinking_label,
            );
            state.registry.record_send(
                &session_id,
                content,
                now,
                &self.options.default_session_title,
            );
            Ok(Some(ticket))
        })?;

        match ticket {
            Some(ticket) => Ok(self.drive(ticket).await),
            None => Ok(TurnReport::Cancelled),
        }
    }

    async fn drive(&self, ticket: DispatchTicket) -> TurnReport {
        let DispatchTicket {
            turn_id,
            submission,
            cancel,
        } = ticket;

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return TurnReport::Cancelled,
            opened = self.backend.submit_turn(submission) => opened,
        };

        let fragments = match opened {
            Ok(fragments) => fragments,
            Err(error) => return self.fail_turn(turn_id, error),
        };

        let opened = self.with_state(|state| {
            state
                .turns
                .on_stream_opened(turn_id, state.registry.selected_id())
        });
        if !opened {
            return self.abandon_stale(turn_id);
        }

        let mut records = decode_stream(fragments);
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return TurnReport::Cancelled,
                next = records.next() => next,
            };

            match next {
                Some(Ok(record)) => {
                    let outcome = classify(&record);
                    let applied = self.with_state(|state| {
                        state
                            .turns
                            .apply(turn_id, state.registry.selected_id(), outcome)
                    });
                    if !applied {
                        return self.abandon_stale(turn_id);
                    }
                }
                Some(Err(error)) => return self.fail_turn(turn_id, error),
                None => break,
            }
        }

        self.finish_turn(turn_id)
    }

    fn finish_turn(&self, turn_id: TurnId) -> TurnReport {
        let report = self.with_state(|state| {
            let selected = state.registry.selected_id();
            if !state.turns.is_live(turn_id, selected) {
                return None;
            }
            Some(match state.turns.finish(turn_id, selected) {
                Some(message) => TurnReport::Answered(message),
                None => TurnReport::NoAnswer,
            })
        });

        match report {
            Some(report) => {
                self.with_state(|state| state.turns.release(turn_id));
                report
            }
            None => self.abandon_stale(turn_id),
        }
    }

    fn fail_turn(&self, turn_id: TurnId, error: BackendError) -> TurnReport {
        tracing::debug!(turn_id, %error, "turn failed in transport");

        let failed = self.with_state(|state| {
            state
                .turns
                .fail(
                    turn_id,
                    state.registry.selected_id(),
                    &self.options.fallback_reply,
                )
                .is_some()
        });

        if !failed {
            return self.abandon_stale(turn_id);
        }

        self.with_state(|state| state.turns.release(turn_id));
        TurnReport::Failed(error)
    }

    fn abandon_stale(&self, turn_id: TurnId) -> TurnReport {
        tracing::debug!(turn_id, "dropping stale turn");
        self.with_state(|state| state.turns.release(turn_id));
        TurnReport::Cancelled
    }

    async fn load_sessions(
        &self,
        document_id: &str,
        generation: u64,
    ) -> Result<Vec<Session>, ChatError> {
        match self.backend.list_sessions(document_id).await {
            Ok(sessions) => Ok(self.with_state(|state| {
                match state.registry.apply_listing(generation, sessions) {
                    ListingOutcome::Applied => {}
                    ListingOutcome::Stale => {
                        tracing::debug!(document_id, "dropping listing for previous document");
                    }
                    ListingOutcome::SelectionCleared => {
                        tracing::debug!(document_id, "selected session no longer listed");
                        state.turns.cancel_active();
                        state.turns.replace_transcript(Vec::new());
                    }
                }
                state.registry.sessions().to_vec()
            })),
            Err(error) => Err(self.setup_failed(ChatError::SessionList(error))),
        }
    }

    /// Creates a session remotely, then stores and selects it.
    ///
    /// Callers hold `session_gate` so concurrent auto-creates cannot race.
    async fn create_and_select(&self) -> Result<Session, ChatError> {
        let (draft, generation) = self.with_state(|state| {
            state
                .registry
                .draft_session(&self.options.default_session_title, now_millis())
                .map(|draft| (draft, state.registry.generation()))
        })?;

        let confirmed = match self.backend.create_session(draft).await {
            Ok(confirmed) => confirmed,
            Err(error) => return Err(self.setup_failed(ChatError::SessionCreate(error))),
        };

        tracing::info!(
            session_id = %confirmed.id,
            document_id = %confirmed.document_id,
            "session created"
        );

        self.with_state(|state| {
            if state.registry.generation() != generation
                || !state.registry.insert_created(confirmed.clone())
            {
                return Ok(confirmed);
            }

            if state.registry.select(&confirmed.id)? == SelectOutcome::Changed {
                state.turns.cancel_active();
                state.turns.replace_transcript(Vec::new());
            }
            Ok(confirmed)
        })
    }

    fn selected_session_id(&self) -> Option<String> {
        self.lock_state().registry.selected_id().map(str::to_owned)
    }

    fn setup_failed(&self, error: ChatError) -> ChatError {
        self.with_state(|state| state.notice = Some(error.to_string()));
        error
    }

    fn with_state<R>(&self, update: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut state = self.lock_state();
        let result = update(&mut state);
        self.view.send_replace(state.snapshot());
        result
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        lock_unpoisoned(&self.state)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

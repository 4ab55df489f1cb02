//! Deterministic scripted implementation of the shared `chat_backend` contract.
//!
//! This crate contains no transport logic and is intended for local
//! development and engine-level scenario tests. Turn bodies are produced in
//! the reader service's event-stream text format so they exercise the real
//! frame decoder.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chat_backend::{
    BackendError, BackendProfile, ChatBackend, FragmentStream, Message, Session, TurnSubmission,
};
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

/// Stable backend identifier used for explicit startup selection.
pub const MOCK_BACKEND_ID: &str = "mock";

const DEFAULT_SESSION_TITLE: &str = "New Chat";
const TITLE_PREFIX_CHARS: usize = 30;

/// Encodes a stage-progress event frame.
#[must_use]
pub fn status_frame(stage: &str) -> String {
    frame(serde_json::json!({ "type": "node_status", "node": stage }))
}

/// Encodes an answer-text event frame.
#[must_use]
pub fn delta_frame(stage: &str, chunk: &str) -> String {
    frame(serde_json::json!({ "type": "llm_stream", "node": stage, "chunk": chunk }))
}

/// Encodes an upstream error event frame.
#[must_use]
pub fn error_frame(message: &str) -> String {
    frame(serde_json::json!({ "type": "error", "error": message }))
}

fn frame(payload: serde_json::Value) -> String {
    format!("data: {payload}\n\n")
}

/// Response plan for one submitted turn.
#[derive(Debug)]
pub enum TurnScript {
    /// Stream these fragments, then end cleanly.
    Fragments(Vec<String>),
    /// Fail the submission before any fragment is produced.
    Reject(BackendError),
    /// Stream these fragments, then yield a read error.
    BreakAfter {
        fragments: Vec<String>,
        error: BackendError,
    },
    /// Stream whatever the paired [`FragmentGate`] releases.
    Gated(mpsc::UnboundedReceiver<Result<String, BackendError>>),
}

impl TurnScript {
    /// Builds a clean stream from already-encoded frames.
    #[must_use]
    pub fn frames<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fragments(frames.into_iter().map(Into::into).collect())
    }

    /// Builds a gated stream and the handle that feeds it.
    #[must_use]
    pub fn gated() -> (Self, FragmentGate) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::Gated(receiver), FragmentGate { sender })
    }

    fn into_stream(self) -> Result<FragmentStream, BackendError> {
        match self {
            Self::Fragments(fragments) => Ok(stream::iter(fragments.into_iter().map(Ok)).boxed()),
            Self::Reject(error) => Err(error),
            Self::BreakAfter { fragments, error } => Ok(stream::iter(
                fragments
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error))),
            )
            .boxed()),
            Self::Gated(receiver) => Ok(stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|item| (item, receiver))
            })
            .boxed()),
        }
    }
}

/// Test handle that releases fragments into a gated turn stream one by one.
///
/// Dropping the gate ends the stream.
#[derive(Debug, Clone)]
pub struct FragmentGate {
    sender: mpsc::UnboundedSender<Result<String, BackendError>>,
}

impl FragmentGate {
    /// Releases one fragment. Returns false once the reader has gone away.
    pub fn release(&self, fragment: impl Into<String>) -> bool {
        self.sender.send(Ok(fragment.into())).is_ok()
    }

    /// Breaks the stream with a read error.
    pub fn fail(&self, error: BackendError) -> bool {
        self.sender.send(Err(error)).is_ok()
    }

    /// Ends the stream cleanly.
    pub fn close(self) {}

    /// Returns true when the consuming stream has been dropped.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

#[derive(Debug, Default)]
struct MockState {
    sessions: Vec<Session>,
    messages: HashMap<String, Vec<Message>>,
    scripts: VecDeque<TurnScript>,
    submissions: Vec<TurnSubmission>,
    fail_next_list: Option<BackendError>,
    fail_next_create: Option<BackendError>,
    fail_next_messages: Option<BackendError>,
}

/// In-memory scripted backend.
///
/// Sessions are returned in insertion order, which lets tests observe the
/// engine's own recency sort. Turns consume queued [`TurnScript`]s; when the
/// queue is empty a short canned answer is streamed.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a pre-existing session.
    #[must_use]
    pub fn with_session(self, session: Session) -> Self {
        lock_unpoisoned(&self.state).sessions.push(session);
        self
    }

    /// Seeds the stored history of a session.
    #[must_use]
    pub fn with_messages(self, session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        lock_unpoisoned(&self.state)
            .messages
            .insert(session_id.into(), messages);
        self
    }

    pub fn push_script(&self, script: TurnScript) {
        lock_unpoisoned(&self.state).scripts.push_back(script);
    }

    /// Queues a gated turn and returns the handle that feeds it.
    pub fn push_gated(&self) -> FragmentGate {
        let (script, gate) = TurnScript::gated();
        self.push_script(script);
        gate
    }

    pub fn fail_next_list(&self, error: BackendError) {
        lock_unpoisoned(&self.state).fail_next_list = Some(error);
    }

    pub fn fail_next_create(&self, error: BackendError) {
        lock_unpoisoned(&self.state).fail_next_create = Some(error);
    }

    pub fn fail_next_messages(&self, error: BackendError) {
        lock_unpoisoned(&self.state).fail_next_messages = Some(error);
    }

    /// Every turn submitted so far, in submission order.
    #[must_use]
    pub fn submissions(&self) -> Vec<TurnSubmission> {
        lock_unpoisoned(&self.state).submissions.clone()
    }

    /// Every stored session, across documents, in insertion order.
    #[must_use]
    pub fn stored_sessions(&self) -> Vec<Session> {
        lock_unpoisoned(&self.state).sessions.clone()
    }

    /// Stored history of one session.
    #[must_use]
    pub fn stored_messages(&self, session_id: &str) -> Vec<Message> {
        lock_unpoisoned(&self.state)
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    fn canned_answer() -> TurnScript {
        TurnScript::frames([
            status_frame("retrieve"),
            status_frame("generate"),
            delta_frame("generate", "This is a scripted answer "),
            delta_frame("generate", "from the mock backend."),
        ])
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: MOCK_BACKEND_ID.to_string(),
            endpoint: None,
        }
    }

    async fn list_sessions(&self, document_id: &str) -> Result<Vec<Session>, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state.fail_next_list.take() {
            return Err(error);
        }

        Ok(state
            .sessions
            .iter()
            .filter(|session| session.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn create_session(&self, session: Session) -> Result<Session, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state.fail_next_create.take() {
            return Err(error);
        }

        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        if let Some(error) = state.fail_next_messages.take() {
            return Err(error);
        }

        Ok(state.messages.get(session_id).cloned().unwrap_or_default())
    }

    async fn submit_turn(&self, turn: TurnSubmission) -> Result<FragmentStream, BackendError> {
        let mut state = lock_unpoisoned(&self.state);
        let script = state.scripts.pop_front().unwrap_or_else(Self::canned_answer);
        state.submissions.push(turn.clone());

        if matches!(script, TurnScript::Reject(_)) {
            return script.into_stream();
        }

        if let Some(session) = state
            .sessions
            .iter_mut()
            .find(|session| session.id == turn.session_id)
        {
            if session.title == DEFAULT_SESSION_TITLE {
                session.title = derived_title(&turn.content);
            }
            session.updated_at = session.updated_at.max(turn.timestamp);
        }

        state
            .messages
            .entry(turn.session_id.clone())
            .or_default()
            .push(Message::user(
                turn.message_id,
                turn.content,
                turn.excerpts,
                turn.timestamp,
            ));

        script.into_stream()
    }
}

fn derived_title(content: &str) -> String {
    if content.chars().count() > TITLE_PREFIX_CHARS {
        let prefix: String = content.chars().take(TITLE_PREFIX_CHARS).collect();
        format!("{prefix}...")
    } else {
        content.to_string()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

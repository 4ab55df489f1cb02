//! Per-turn state machine and the live transcript.
//!
//! Every handler takes the [`TurnId`] it was started with and the currently
//! selected session. Events for a turn that is no longer active, or whose
//! originating session is no longer selected, are ignored.

use chat_backend::{CancelSignal, Excerpt, Message, TurnSubmission};

use crate::classify::Outcome;
use crate::error::ChatError;
use crate::ids::{new_excerpt_id, new_message_id};

pub type TurnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Dispatching,
    Streaming,
    Finalizing,
    Failed,
}

/// Live scratch state rendered while a response is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnState {
    pub in_progress_answer: String,
    pub status_label: Option<String>,
    pub is_active: bool,
}

/// Excerpts waiting to be attached to the next outgoing message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExcerptTray {
    items: Vec<Excerpt>,
}

impl ExcerptTray {
    /// Adds an excerpt, assigning an id when the caller left it blank.
    /// Returns the stored id.
    pub fn attach(&mut self, mut excerpt: Excerpt) -> String {
        if excerpt.id.trim().is_empty() {
            excerpt.id = new_excerpt_id();
        }
        let id = excerpt.id.clone();
        self.items.retain(|existing| existing.id != id);
        self.items.push(excerpt);
        id
    }

    pub fn remove(&mut self, excerpt_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|excerpt| excerpt.id != excerpt_id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[Excerpt] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn take(&mut self) -> Vec<Excerpt> {
        std::mem::take(&mut self.items)
    }
}

#[derive(Debug)]
struct ActiveTurn {
    id: TurnId,
    session_id: String,
    reply_id: String,
    accumulated: String,
    upstream_error: Option<String>,
    cancel: CancelSignal,
}

/// Everything the runtime needs to dispatch a started turn.
#[derive(Debug, Clone)]
pub struct DispatchTicket {
    pub turn_id: TurnId,
    pub submission: TurnSubmission,
    pub cancel: CancelSignal,
}

#[derive(Debug, Default)]
pub struct TurnCoordinator {
    transcript: Vec<Message>,
    tray: ExcerptTray,
    state: TurnState,
    phase: TurnPhase,
    active: Option<ActiveTurn>,
    next_turn_id: TurnId,
}

impl TurnCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn tray(&self) -> &ExcerptTray {
        &self.tray
    }

    pub fn tray_mut(&mut self) -> &mut ExcerptTray {
        &mut self.tray
    }

    pub fn active_turn_id(&self) -> Option<TurnId> {
        self.active.as_ref().map(|turn| turn.id)
    }

    /// Upstream error reported during the active turn, if any.
    pub fn upstream_error(&self) -> Option<&str> {
        self.active.as_ref()?.upstream_error.as_deref()
    }

    /// Replaces the transcript with a freshly loaded history.
    pub fn replace_transcript(&mut self, messages: Vec<Message>) {
        self.transcript = messages;
    }

    /// Rejects a send that has nothing to say.
    pub fn check_sendable(&self, content: &str) -> Result<(), ChatError> {
        if content.trim().is_empty() && self.tray.is_empty() {
            return Err(ChatError::EmptyTurn);
        }
        Ok(())
    }

    /// Appends the optimistic user message and opens a new turn.
    ///
    /// Any earlier active turn is cancelled first. The excerpt tray is moved
    /// into the user message.
    pub fn begin(
        &mut self,
        session_id: &str,
        document_id: &str,
        content: &str,
        now: i64,
        thinking_label: &str,
    ) -> DispatchTicket {
        self.cancel_active();

        let message_id = new_message_id();
        let excerpts = self.tray.take();
        self.transcript.push(Message::user(
            message_id.clone(),
            content,
            excerpts.clone(),
            now,
        ));

        self.next_turn_id += 1;
        let turn_id = self.next_turn_id;
        let cancel = CancelSignal::new();
        self.active = Some(ActiveTurn {
            id: turn_id,
            session_id: session_id.to_string(),
            reply_id: new_message_id(),
            accumulated: String::new(),
            upstream_error: None,
            cancel: cancel.clone(),
        });
        self.phase = TurnPhase::Dispatching;
        self.state = TurnState {
            in_progress_answer: String::new(),
            status_label: Some(thinking_label.to_string()),
            is_active: true,
        };

        tracing::debug!(turn_id, session_id, "turn dispatching");

        DispatchTicket {
            turn_id,
            submission: TurnSubmission {
                session_id: session_id.to_string(),
                message_id,
                document_id: document_id.to_string(),
                content: content.to_string(),
                excerpts,
                timestamp: now,
            },
            cancel,
        }
    }

    /// Marks the response body as open.
    pub fn on_stream_opened(&mut self, turn_id: TurnId, selected: Option<&str>) -> bool {
        if !self.should_apply(turn_id, selected) {
            return false;
        }
        self.phase = TurnPhase::Streaming;
        true
    }

    /// Folds one classified outcome into the live state.
    ///
    /// Returns false when the turn is stale and its stream should be dropped.
    pub fn apply(&mut self, turn_id: TurnId, selected: Option<&str>, outcome: Outcome) -> bool {
        if !self.should_apply(turn_id, selected) {
            return false;
        }
        let Some(turn) = self.active.as_mut() else {
            return false;
        };

        match outcome {
            Outcome::Answer(fragment) => {
                turn.accumulated.push_str(&fragment);
                self.state.in_progress_answer.clone_from(&turn.accumulated);
                self.state.status_label = None;
            }
            Outcome::Status(label) => {
                self.state.status_label = Some(label.to_string());
            }
            Outcome::UpstreamError(ref message) => {
                self.state.status_label = outcome.status_line();
                turn.upstream_error = Some(message.clone());
            }
            Outcome::Ignore => {}
        }

        true
    }

    /// Ends a turn whose stream completed.
    ///
    /// Appends the assistant message when any answer text arrived. Returns
    /// `None` for a stale turn or an empty answer.
    pub fn finish(&mut self, turn_id: TurnId, selected: Option<&str>) -> Option<Message> {
        if !self.should_apply(turn_id, selected) {
            tracing::debug!(turn_id, "discarding completion of stale turn");
            return None;
        }
        let turn = self.active.as_mut()?;

        self.phase = TurnPhase::Finalizing;
        self.state.in_progress_answer.clear();
        self.state.status_label = None;

        if turn.accumulated.is_empty() {
            tracing::debug!(turn_id, "turn finished without answer text");
            return None;
        }

        let message = Message::assistant(
            turn.reply_id.clone(),
            std::mem::take(&mut turn.accumulated),
            crate::ids::now_millis(),
        );
        self.transcript.push(message.clone());
        tracing::debug!(turn_id, "turn finalized");
        Some(message)
    }

    /// Ends a turn whose stream could not be opened or broke while reading.
    ///
    /// Appends the fallback reply under the id reserved for the answer, so a
    /// turn yields at most one assistant message.
    pub fn fail(
        &mut self,
        turn_id: TurnId,
        selected: Option<&str>,
        fallback_reply: &str,
    ) -> Option<Message> {
        if !self.should_apply(turn_id, selected) {
            tracing::debug!(turn_id, "discarding failure of stale turn");
            return None;
        }
        let turn = self.active.as_ref()?;

        let message = Message::assistant(
            turn.reply_id.clone(),
            fallback_reply,
            crate::ids::now_millis(),
        );
        self.transcript.push(message.clone());
        self.phase = TurnPhase::Failed;
        self.state.in_progress_answer.clear();
        self.state.status_label = None;
        Some(message)
    }

    /// Clears the live state of a turn that has finished or failed.
    pub fn release(&mut self, turn_id: TurnId) {
        if self.active_turn_id() != Some(turn_id) {
            return;
        }
        self.active = None;
        self.state = TurnState::default();
        self.phase = TurnPhase::Idle;
    }

    /// Cancels the active turn, discarding any partial answer.
    ///
    /// Returns the cancelled turn id.
    pub fn cancel_active(&mut self) -> Option<TurnId> {
        let turn = self.active.take()?;
        turn.cancel.cancel();
        self.state = TurnState::default();
        self.phase = TurnPhase::Idle;
        tracing::debug!(turn_id = turn.id, "turn cancelled");
        Some(turn.id)
    }

    /// Cancels the active turn and drops the transcript and excerpt tray.
    pub fn reset(&mut self) {
        self.cancel_active();
        self.transcript.clear();
        self.tray.clear();
    }

    /// Returns true while `turn_id` is the active turn and its session is still selected.
    pub fn is_live(&self, turn_id: TurnId, selected: Option<&str>) -> bool {
        self.active
            .as_ref()
            .is_some_and(|turn| turn.id == turn_id && selected == Some(turn.session_id.as_str()))
    }

    fn should_apply(&self, turn_id: TurnId, selected: Option<&str>) -> bool {
        self.is_live(turn_id, selected)
    }
}

#[cfg(test)]
mod tests {
    use chat_backend::{Excerpt, Role};
    use pretty_assertions::assert_eq;

    use super::{ExcerptTray, TurnCoordinator, TurnPhase, TurnState};
    use crate::classify::{Outcome, GENERATING_STATUS};
    use crate::error::ChatError;

    const SESSION: Option<&str> = Some("s-1");
    const FALLBACK: &str = "Sorry, something went wrong.";

    fn started(coordinator: &mut TurnCoordinator, content: &str) -> u64 {
        coordinator
            .begin("s-1", "doc-1", content, 10, "Thinking...")
            .turn_id
    }

    fn answer(text: &str) -> Outcome {
        Outcome::Answer(text.to_string())
    }

    #[test]
    fn empty_turn_without_excerpts_is_rejected() {
        let mut coordinator = TurnCoordinator::new();
        assert_eq!(coordinator.check_sendable("  \n"), Err(ChatError::EmptyTurn));

        coordinator.tray_mut().attach(Excerpt::new("", "quoted passage"));
        assert_eq!(coordinator.check_sendable(""), Ok(()));
    }

    #[test]
    fn begin_appends_user_message_and_moves_tray() {
        let mut coordinator = TurnCoordinator::new();
        let excerpt_id = coordinator
            .tray_mut()
            .attach(Excerpt::new("", "Table 2").with_page(4));

        let ticket = coordinator.begin("s-1", "doc-1", "explain", 10, "Thinking...");

        assert!(excerpt_id.starts_with("excerpt_"));
        assert!(coordinator.tray().is_empty());
        assert_eq!(coordinator.phase(), TurnPhase::Dispatching);
        assert_eq!(
            coordinator.state(),
            &TurnState {
                in_progress_answer: String::new(),
                status_label: Some("Thinking...".to_string()),
                is_active: true,
            }
        );

        let user = &coordinator.transcript()[0];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.id, ticket.submission.message_id);
        assert_eq!(user.excerpts, ticket.submission.excerpts);
        assert_eq!(user.excerpts[0].page_locator, Some(4));
        assert_eq!(ticket.submission.session_id, "s-1");
        assert_eq!(ticket.submission.timestamp, 10);
    }

    #[test]
    fn answer_fragments_accumulate_and_clear_status() {
        let mut coordinator = TurnCoordinator::new();
        let turn = started(&mut coordinator, "q");
        assert!(coordinator.on_stream_opened(turn, SESSION));

        assert!(coordinator.apply(turn, SESSION, Outcome::Status(GENERATING_STATUS)));
        assert_eq!(
            coordinator.state().status_label.as_deref(),
            Some(GENERATING_STATUS)
        );

        for fragment in ["The ", "sky ", "is blue."] {
            assert!(coordinator.apply(turn, SESSION, answer(fragment)));
        }
        assert_eq!(coordinator.state().status_label, None);
        assert_eq!(coordinator.state().in_progress_answer, "The sky is blue.");

        let message = coordinator.finish(turn, SESSION).expect("answer produced");
        assert_eq!(message.content, "The sky is blue.");
        assert_eq!(coordinator.phase(), TurnPhase::Finalizing);

        coordinator.release(turn);
        assert_eq!(coordinator.state(), &TurnState::default());
        assert_eq!(coordinator.phase(), TurnPhase::Idle);
        assert_eq!(coordinator.transcript().len(), 2);
    }

    #[test]
    fn upstream_error_does_not_erase_answer() {
        let mut coordinator = TurnCoordinator::new();
        let turn = started(&mut coordinator, "q");

        coordinator.apply(turn, SESSION, Outcome::UpstreamError("flaky".to_string()));
        assert_eq!(
            coordinator.state().status_label.as_deref(),
            Some("Error: flaky")
        );
        assert_eq!(coordinator.upstream_error(), Some("flaky"));

        coordinator.apply(turn, SESSION, answer("still "));
        coordinator.apply(turn, SESSION, answer("here"));

        let message = coordinator.finish(turn, SESSION).expect("answer produced");
        assert_eq!(message.content, "still here");
    }

    #[test]
    fn empty_answer_finishes_without_message() {
        let mut coordinator = TurnCoordinator::new();
        let turn = started(&mut coordinator, "q");
        coordinator.apply(turn, SESSION, Outcome::Ignore);

        assert_eq!(coordinator.finish(turn, SESSION), None);
        coordinator.release(turn);
        assert_eq!(coordinator.transcript().len(), 1);
    }

    #[test]
    fn failure_appends_single_fallback_under_reserved_id() {
        let mut coordinator = TurnCoordinator::new();
        let turn = started(&mut coordinator, "q");
        coordinator.apply(turn, SESSION, answer("partial"));

        let message = coordinator.fail(turn, SESSION, FALLBACK).expect("fallback appended");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, FALLBACK);
        assert_eq!(coordinator.phase(), TurnPhase::Failed);

        coordinator.release(turn);
        assert_eq!(coordinator.finish(turn, SESSION), None);
        assert_eq!(coordinator.fail(turn, SESSION, FALLBACK), None);
        assert_eq!(coordinator.transcript().len(), 2);
        assert_eq!(coordinator.state(), &TurnState::default());
    }

    #[test]
    fn turn_is_stale_once_its_session_is_deselected() {
        let mut coordinator = TurnCoordinator::new();
        let turn = started(&mut coordinator, "q");

        assert!(!coordinator.apply(turn, Some("s-2"), answer("leak")));
        assert_eq!(coordinator.finish(turn, Some("s-2")), None);
        assert_eq!(coordinator.fail(turn, None, FALLBACK), None);
        assert_eq!(coordinator.transcript().len(), 1);
    }

    #[test]
    fn new_turn_cancels_previous_one() {
        let mut coordinator = TurnCoordinator::new();
        let first = coordinator.begin("s-1", "doc-1", "one", 10, "Thinking...");
        coordinator.apply(first.turn_id, SESSION, answer("abandoned"));

        let second = started(&mut coordinator, "two");

        assert!(first.cancel.is_cancelled());
        assert_ne!(first.turn_id, second);
        assert!(!coordinator.apply(first.turn_id, SESSION, answer("late")));
        assert_eq!(coordinator.finish(first.turn_id, SESSION), None);
        assert_eq!(coordinator.state().in_progress_answer, "");
        assert_eq!(coordinator.active_turn_id(), Some(second));
    }

    #[test]
    fn cancel_discards_partial_answer() {
        let mut coordinator = TurnCoordinator::new();
        let ticket = coordinator.begin("s-1", "doc-1", "q", 10, "Thinking...");
        coordinator.apply(ticket.turn_id, SESSION, answer("half"));

        assert_eq!(coordinator.cancel_active(), Some(ticket.turn_id));
        assert!(ticket.cancel.is_cancelled());
        assert_eq!(coordinator.cancel_active(), None);
        assert_eq!(coordinator.state(), &TurnState::default());
        assert_eq!(coordinator.transcript().len(), 1);
    }

    #[test]
    fn reset_clears_transcript_and_tray() {
        let mut coordinator = TurnCoordinator::new();
        started(&mut coordinator, "q");
        coordinator.tray_mut().attach(Excerpt::new("e-1", "x"));

        coordinator.reset();

        assert!(coordinator.transcript().is_empty());
        assert!(coordinator.tray().is_empty());
        assert_eq!(coordinator.active_turn_id(), None);
    }

    #[test]
    fn tray_replaces_duplicate_ids_and_removes() {
        let mut tray = ExcerptTray::default();
        tray.attach(Excerpt::new("e-1", "first"));
        tray.attach(Excerpt::new("e-1", "replaced"));
        tray.attach(Excerpt::new("e-2", "second"));

        assert_eq!(tray.items().len(), 2);
        assert_eq!(tray.items()[1].content, "replaced");
        assert!(tray.remove("e-2"));
        assert!(!tray.remove("e-2"));

        tray.clear();
        assert!(tray.is_empty());
    }
}

//! Session list and selection for the open document.

use chat_backend::Session;

use crate::error::ChatError;
use crate::ids::new_session_id;

const TITLE_PREFIX_CHARS: usize = 30;

/// Result of [`SessionRegistry::apply_listing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOutcome {
    /// The listing was fetched for an earlier document and was dropped.
    Stale,
    Applied,
    /// Applied, and the selected session was missing from it.
    SelectionCleared,
}

/// Result of [`SessionRegistry::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Unchanged,
    Changed,
    /// Another document was opened before the history arrived.
    Superseded,
}

/// Known sessions of the open document, most recently updated first.
///
/// `generation` increments on every document switch so listings fetched for
/// an earlier document can be recognised and dropped. Sessions confirmed by
/// a local create stay listed until a listing includes them, so a listing
/// fetched before the create cannot drop them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRegistry {
    document_id: Option<String>,
    sessions: Vec<Session>,
    selected: Option<String>,
    unlisted_created: Vec<String>,
    generation: u64,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document_id.as_deref()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected(&self) -> Option<&Session> {
        let selected = self.selected.as_deref()?;
        self.get(selected)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == session_id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Switches to another document, dropping the list and the selection.
    pub fn reset(&mut self, document_id: Option<String>) {
        self.document_id = document_id;
        self.sessions.clear();
        self.selected = None;
        self.unlisted_created.clear();
        self.generation += 1;
    }

    /// Replaces the list with a fresh listing fetched at `generation`.
    ///
    /// Locally created sessions the listing does not know yet are kept. A
    /// selection missing from the merged list is cleared.
    pub fn apply_listing(&mut self, generation: u64, mut sessions: Vec<Session>) -> ListingOutcome {
        if generation != self.generation {
            return ListingOutcome::Stale;
        }

        self.unlisted_created
            .retain(|id| !sessions.iter().any(|session| &session.id == id));
        for id in &self.unlisted_created {
            if let Some(local) = self.sessions.iter().find(|session| &session.id == id) {
                sessions.push(local.clone());
            }
        }

        sort_most_recent_first(&mut sessions);
        self.sessions = sessions;

        if let Some(selected) = self.selected.as_deref() {
            if self.get(selected).is_none() {
                self.selected = None;
                return ListingOutcome::SelectionCleared;
            }
        }

        ListingOutcome::Applied
    }

    /// Builds a new local session for the open document. Nothing is stored yet.
    pub fn draft_session(&self, title: &str, now: i64) -> Result<Session, ChatError> {
        let document_id = self.document_id.as_deref().ok_or(ChatError::NoDocumentOpen)?;
        Ok(Session::new(new_session_id(), document_id, title, now))
    }

    /// Stores a server-confirmed session at the head of the list.
    ///
    /// Returns false when the session belongs to a document that is no longer open.
    pub fn insert_created(&mut self, session: Session) -> bool {
        if self.document_id.as_deref() != Some(session.document_id.as_str()) {
            return false;
        }

        self.sessions.retain(|existing| existing.id != session.id);
        if !self.unlisted_created.contains(&session.id) {
            self.unlisted_created.push(session.id.clone());
        }
        self.sessions.insert(0, session);
        true
    }

    pub fn select(&mut self, session_id: &str) -> Result<SelectOutcome, ChatError> {
        if self.selected.as_deref() == Some(session_id) {
            return Ok(SelectOutcome::Unchanged);
        }
        if self.get(session_id).is_none() {
            return Err(ChatError::UnknownSession(session_id.to_string()));
        }

        self.selected = Some(session_id.to_string());
        Ok(SelectOutcome::Changed)
    }

    /// Reflects a sent message locally: bumps `updated_at` and retitles a
    /// session still carrying the default title, the way the server does.
    pub fn record_send(&mut self, session_id: &str, content: &str, now: i64, default_title: &str) {
        let Some(session) = self
            .sessions
            .iter_mut()
            .find(|session| session.id == session_id)
        else {
            return;
        };

        if session.title == default_title {
            session.title = title_from_content(content);
        }
        session.updated_at = session.updated_at.max(now);
        sort_most_recent_first(&mut self.sessions);
    }
}

/// Stable sort by `updated_at`, newest first.
pub fn sort_most_recent_first(sessions: &mut [Session]) {
    sessions.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
}

fn title_from_content(content: &str) -> String {
    if content.chars().count() > TITLE_PREFIX_CHARS {
        let prefix: String = content.chars().take(TITLE_PREFIX_CHARS).collect();
        format!("{prefix}...")
    } else {
        content.to_string()
    }
}

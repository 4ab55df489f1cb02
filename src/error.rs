use chat_backend::BackendError;
use thiserror::Error;

/// Failure surfaced to the caller by an engine operation.
///
/// Transport failures while a turn streams never appear here; they become a
/// fallback assistant message instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("no document is open")]
    NoDocumentOpen,

    #[error("nothing to send: the question is empty and no excerpts are attached")]
    EmptyTurn,

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("failed to list sessions: {0}")]
    SessionList(#[source] BackendError),

    #[error("failed to create session: {0}")]
    SessionCreate(#[source] BackendError),

    #[error("failed to load session: {0}")]
    SessionSelect(#[source] BackendError),
}

impl ChatError {
    /// Returns true for errors raised before any remote call was attempted.
    #[must_use]
    pub fn is_rejected_input(&self) -> bool {
        matches!(
            self,
            Self::NoDocumentOpen | Self::EmptyTurn | Self::UnknownSession(_)
        )
    }
}

//! Backend-neutral contract for the document chat engine.
//!
//! This crate defines the conversation data model (sessions, messages,
//! excerpts) and the four remote operations the engine consumes. It excludes
//! transport details, wire payload shapes, and frame decoding.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio::sync::watch;

/// Raw, incrementally delivered body of a turn response.
///
/// Fragments may split an event anywhere, including mid-delimiter. An `Err`
/// item means the stream broke while reading.
pub type FragmentStream = BoxStream<'static, Result<String, BackendError>>;

/// Conversation scope tied to exactly one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub document_id: String,
    pub title: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Milliseconds since the Unix epoch; sort key for most-recent-first listing.
    pub updated_at: i64,
}

impl Session {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        title: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            title: title.into(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rectangle of a highlighted passage in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingRegion {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// User-selected quotation from the open document.
#[derive(Debug, Clone, PartialEq)]
pub struct Excerpt {
    pub id: String,
    pub content: String,
    pub page_locator: Option<u32>,
    pub bounding_region: Option<BoundingRegion>,
    pub timestamp: Option<i64>,
}

impl Excerpt {
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            page_locator: None,
            bounding_region: None,
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u32) -> Self {
        self.page_locator = Some(page);
        self
    }

    #[must_use]
    pub fn with_region(mut self, region: BoundingRegion) -> Self {
        self.bounding_region = Some(region);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Returns true when the quotation carries no visible text.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Immutable transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub excerpts: Vec<Excerpt>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Message {
    #[must_use]
    pub fn user(
        id: impl Into<String>,
        content: impl Into<String>,
        excerpts: Vec<Excerpt>,
        timestamp: i64,
    ) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            excerpts,
            timestamp,
        }
    }

    #[must_use]
    pub fn assistant(id: impl Into<String>, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            excerpts: Vec::new(),
            timestamp,
        }
    }
}

/// Everything the remote service needs to run one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSubmission {
    pub session_id: String,
    pub message_id: String,
    pub document_id: String,
    pub content: String,
    pub excerpts: Vec<Excerpt>,
    pub timestamp: i64,
}

/// Failure reported by a backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("response has no readable body")]
    MissingBody,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request was cancelled")]
    Cancelled,

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Error returned while constructing a backend, before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendInitError {
    message: String,
}

impl BackendInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for BackendInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for BackendInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Shared abort handle for one in-flight turn.
///
/// Cloning shares the flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`CancelSignal::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so `wait_for` cannot observe a closed channel.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Immutable metadata describing a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendProfile {
    pub backend_id: String,
    pub endpoint: Option<String>,
}

/// Remote capabilities consumed by the chat engine.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Returns backend identity metadata.
    fn profile(&self) -> BackendProfile;

    /// Lists sessions for a document in storage order.
    async fn list_sessions(&self, document_id: &str) -> Result<Vec<Session>, BackendError>;

    /// Persists a new session and returns the server-confirmed copy.
    async fn create_session(&self, session: Session) -> Result<Session, BackendError>;

    /// Lists the full message history of a session in transcript order.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError>;

    /// Submits one turn and returns its raw response body.
    ///
    /// A non-success initial response or a missing body is an `Err`; nothing
    /// is streamed in that case.
    async fn submit_turn(&self, turn: TurnSubmission) -> Result<FragmentStream, BackendError>;
}

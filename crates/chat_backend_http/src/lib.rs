//! Reader service implementation of the shared `chat_backend` contract.
//!
//! This adapter maps `reader_api` wire records to domain types and transport
//! errors to `BackendError`. Turn bodies pass through as raw text fragments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_backend::{
    BackendError, BackendInitError, BackendProfile, BoundingRegion, ChatBackend, Excerpt,
    FragmentStream, Message, Role, Session, TurnSubmission,
};
use futures_util::StreamExt;
use reader_api::{
    normalize_base_url, BoundingRect, ChatRequest, ExcerptRecord, MessageRecord, ReaderApiClient,
    ReaderApiConfig, ReaderApiError, SessionRecord, TextStream, WireRole,
};

/// Stable backend identifier used for explicit startup selection.
pub const READER_BACKEND_ID: &str = "reader-http";

/// Runtime configuration for the reader service backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderBackendConfig {
    pub base_url: String,
    pub timeout: Option<Duration>,
    pub headers: Vec<(String, String)>,
}

impl ReaderBackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    fn into_reader_api_config(self) -> ReaderApiConfig {
        let mut config = ReaderApiConfig::new(self.base_url).with_headers(self.headers);

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

#[async_trait]
trait ReaderTransport: Send + Sync {
    async fn list_sessions(&self, document_id: &str) -> Result<Vec<SessionRecord>, ReaderApiError>;
    async fn create_session(&self, session: SessionRecord) -> Result<SessionRecord, ReaderApiError>;
    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, ReaderApiError>;
    async fn stream_turn(&self, request: ChatRequest) -> Result<TextStream, ReaderApiError>;
}

#[derive(Debug)]
struct DefaultTransport {
    client: ReaderApiClient,
}

#[async_trait]
impl ReaderTransport for DefaultTransport {
    async fn list_sessions(&self, document_id: &str) -> Result<Vec<SessionRecord>, ReaderApiError> {
        self.client.list_sessions(document_id).await
    }

    async fn create_session(&self, session: SessionRecord) -> Result<SessionRecord, ReaderApiError> {
        self.client.create_session(session).await
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>, ReaderApiError> {
        self.client.list_messages(session_id).await
    }

    async fn stream_turn(&self, request: ChatRequest) -> Result<TextStream, ReaderApiError> {
        self.client.stream_turn(&request).await
    }
}

/// `ChatBackend` adapter backed by `reader_api` transport primitives.
pub struct ReaderBackend {
    endpoint: String,
    transport: Arc<dyn ReaderTransport>,
}

impl ReaderBackend {
    /// Creates a backend using real HTTP transport.
    pub fn new(config: ReaderBackendConfig) -> Result<Self, BackendInitError> {
        if config.base_url.trim().is_empty() {
            return Err(BackendInitError::new("reader base URL must not be empty"));
        }
        let endpoint = normalize_base_url(&config.base_url);
        url::Url::parse(&endpoint).map_err(|error| {
            BackendInitError::new(format!("invalid reader base URL '{endpoint}': {error}"))
        })?;

        let client = ReaderApiClient::new(config.into_reader_api_config())
            .map_err(|error| BackendInitError::new(error.to_string()))?;
        tracing::debug!(endpoint = %endpoint, "reader backend ready");

        Ok(Self {
            endpoint,
            transport: Arc::new(DefaultTransport { client }),
        })
    }

    #[cfg(test)]
    fn with_transport_for_tests(transport: Arc<dyn ReaderTransport>) -> Self {
        Self {
            endpoint: "http://reader.test".to_string(),
            transport,
        }
    }
}

#[async_trait]
impl ChatBackend for ReaderBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: READER_BACKEND_ID.to_string(),
            endpoint: Some(self.endpoint.clone()),
        }
    }

    async fn list_sessions(&self, document_id: &str) -> Result<Vec<Session>, BackendError> {
        let records = self
            .transport
            .list_sessions(document_id)
            .await
            .map_err(map_reader_error)?;
        Ok(records.into_iter().map(session_from_record).collect())
    }

    async fn create_session(&self, session: Session) -> Result<Session, BackendError> {
        let confirmed = self
            .transport
            .create_session(session_to_record(session))
            .await
            .map_err(map_reader_error)?;
        Ok(session_from_record(confirmed))
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError> {
        let records = self
            .transport
            .list_messages(session_id)
            .await
            .map_err(map_reader_error)?;

        Ok(records
            .into_iter()
            .enumerate()
            .map(|(index, record)| message_from_record(session_id, index, record))
            .collect())
    }

    async fn submit_turn(&self, turn: TurnSubmission) -> Result<FragmentStream, BackendError> {
        let request = ChatRequest::new(
            turn.session_id,
            turn.message_id,
            turn.document_id,
            turn.content,
            turn.excerpts.into_iter().map(excerpt_to_record).collect(),
            turn.timestamp,
        );
        tracing::debug!(thread_id = %request.thread_id, "opening reader turn stream");

        let body = self
            .transport
            .stream_turn(request)
            .await
            .map_err(map_reader_error)?;

        Ok(body
            .map(|fragment| fragment.map_err(map_reader_error))
            .boxed())
    }
}

fn map_reader_error(error: ReaderApiError) -> BackendError {
    match error {
        ReaderApiError::Status(status, message) => BackendError::Status {
            status: status.as_u16(),
            message,
        },
        ReaderApiError::MissingBody => BackendError::MissingBody,
        ReaderApiError::Request(error) => BackendError::Transport(error.to_string()),
        ReaderApiError::Serde(error) => BackendError::Decode(error.to_string()),
        ReaderApiError::InvalidBaseUrl(value) => {
            BackendError::Unavailable(format!("invalid base URL: {value}"))
        }
        ReaderApiError::InvalidHeader(message) => {
            BackendError::Unavailable(format!("invalid header: {message}"))
        }
        ReaderApiError::Unknown(message) => BackendError::Transport(message),
    }
}

fn session_from_record(record: SessionRecord) -> Session {
    Session {
        id: record.id,
        document_id: record.file_id,
        title: record.title,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn session_to_record(session: Session) -> SessionRecord {
    SessionRecord {
        id: session.id,
        file_id: session.document_id,
        title: session.title,
        created_at: session.created_at,
        updated_at: session.updated_at,
    }
}

/// Older histories may lack message ids or timestamps; ids fall back to a
/// position-derived key so the transcript stays addressable.
fn message_from_record(session_id: &str, index: usize, record: MessageRecord) -> Message {
    let role = match record.role {
        WireRole::User => Role::User,
        WireRole::Ai => Role::Assistant,
        WireRole::System => Role::System,
    };

    Message {
        id: record
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{session_id}-{index}")),
        role,
        content: record.content,
        excerpts: record.excerpts.into_iter().map(excerpt_from_record).collect(),
        timestamp: record.timestamp.unwrap_or_default(),
    }
}

fn excerpt_from_record(record: ExcerptRecord) -> Excerpt {
    Excerpt {
        id: record.id,
        content: record.content,
        page_locator: record.page_number,
        bounding_region: record.bounding_rect.map(|rect| BoundingRegion {
            x1: rect.x1,
            y1: rect.y1,
            x2: rect.x2,
            y2: rect.y2,
        }),
        timestamp: record.timestamp,
    }
}

fn excerpt_to_record(excerpt: Excerpt) -> ExcerptRecord {
    ExcerptRecord {
        id: excerpt.id,
        content: excerpt.content,
        page_number: excerpt.page_locator,
        bounding_rect: excerpt.bounding_region.map(|region| BoundingRect {
            x1: region.x1,
            y1: region.y1,
            x2: region.x2,
            y2: region.y2,
        }),
        timestamp: excerpt.timestamp,
    }
}

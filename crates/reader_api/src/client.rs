use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::config::ReaderApiConfig;
use crate::error::{parse_error_message, ReaderApiError};
use crate::headers::{build_headers, ACCEPT_EVENT_STREAM, ACCEPT_JSON};
use crate::payload::{ChatRequest, CreateSessionBody, MessageRecord, SessionRecord};
use crate::url::{
    endpoint_url, normalize_base_url, PATH_CHAT, PATH_CREATE_SESSION, PATH_MESSAGES,
    PATH_SESSIONS,
};
use crate::utf8::Utf8Decoder;

/// UTF-8 text fragments of a streamed turn response, in arrival order.
pub type TextStream = BoxStream<'static, Result<String, ReaderApiError>>;

#[derive(Debug)]
pub struct ReaderApiClient {
    http: Client,
    config: ReaderApiConfig,
}

impl ReaderApiClient {
    pub fn new(config: ReaderApiConfig) -> Result<Self, ReaderApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ReaderApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ReaderApiConfig {
        &self.config
    }

    pub fn base_url(&self) -> String {
        normalize_base_url(&self.config.base_url)
    }

    pub fn build_headers(&self, accept: &str) -> Result<HeaderMap, ReaderApiError> {
        let headers = build_headers(&self.config, accept);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ReaderApiError::InvalidHeader(format!("invalid key: {key}")))?,
                HeaderValue::from_str(&value)
                    .map_err(|_| ReaderApiError::InvalidHeader(format!("invalid value for {key}")))?,
            );
        }
        Ok(out)
    }

    /// `GET /api/chat_histories/{document_id}`.
    pub async fn list_sessions(
        &self,
        document_id: &str,
    ) -> Result<Vec<SessionRecord>, ReaderApiError> {
        let url = endpoint_url(&self.config.base_url, &[PATH_SESSIONS, document_id])?;
        let response = self
            .http
            .get(url)
            .headers(self.build_headers(ACCEPT_JSON)?)
            .send()
            .await?;
        read_json(response).await
    }

    /// `POST /api/create_chat_history`.
    ///
    /// The service answers with a confirmation object rather than the stored
    /// row, so the submitted record is echoed back unless the body is itself
    /// a session record.
    pub async fn create_session(
        &self,
        session: SessionRecord,
    ) -> Result<SessionRecord, ReaderApiError> {
        let url = endpoint_url(&self.config.base_url, &[PATH_CREATE_SESSION])?;
        let body = CreateSessionBody { session };
        let response = self
            .http
            .post(url)
            .headers(self.build_headers(ACCEPT_JSON)?)
            .json(&body)
            .send()
            .await?;
        let text = read_success_text(response).await?;

        match serde_json::from_str::<SessionRecord>(&text) {
            Ok(confirmed) => Ok(confirmed),
            Err(_) => {
                tracing::debug!(session_id = %body.session.id, "create_session echoed submitted record");
                Ok(body.session)
            }
        }
    }

    /// `GET /api/messages/{session_id}`.
    pub async fn list_messages(
        &self,
        session_id: &str,
    ) -> Result<Vec<MessageRecord>, ReaderApiError> {
        let url = endpoint_url(&self.config.base_url, &[PATH_MESSAGES, session_id])?;
        let response = self
            .http
            .get(url)
            .headers(self.build_headers(ACCEPT_JSON)?)
            .send()
            .await?;
        read_json(response).await
    }

    /// `POST /api/chat`, returning the event-stream body as text fragments.
    ///
    /// A non-success status or an empty body fails before any fragment is
    /// produced. Dropping the returned stream closes the connection.
    pub async fn stream_turn(&self, request: &ChatRequest) -> Result<TextStream, ReaderApiError> {
        let url = endpoint_url(&self.config.base_url, &[PATH_CHAT])?;
        let response = self
            .http
            .post(url)
            .headers(self.build_headers(ACCEPT_EVENT_STREAM)?)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReaderApiError::Status(
                status,
                parse_error_message(status, &body),
            ));
        }

        if response.content_length() == Some(0) {
            return Err(ReaderApiError::MissingBody);
        }

        tracing::debug!(thread_id = %request.thread_id, message_id = %request.message_id, "turn stream opened");
        Ok(text_fragments(response.bytes_stream()))
    }
}

async fn read_success_text(response: Response) -> Result<String, ReaderApiError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ReaderApiError::Status(
            status,
            parse_error_message(status, &body),
        ));
    }
    Ok(body)
}

async fn read_json<T>(response: Response) -> Result<T, ReaderApiError>
where
    T: DeserializeOwned,
{
    let body = read_success_text(response).await?;
    serde_json::from_str(&body).map_err(ReaderApiError::from)
}

/// Adapts a byte stream into UTF-8 text fragments.
///
/// Empty fragments are skipped. A read error is yielded once and ends the stream.
pub fn text_fragments<S, B>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = (Box::pin(bytes), Utf8Decoder::default(), false);

    stream::unfold(state, |(mut bytes, mut decoder, finished)| async move {
        if finished {
            return None;
        }

        loop {
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let text = decoder.decode(chunk.as_ref());
                    if !text.is_empty() {
                        return Some((Ok(text), (bytes, decoder, false)));
                    }
                }
                Some(Err(error)) => {
                    return Some((Err(ReaderApiError::from(error)), (bytes, decoder, true)));
                }
                None => {
                    let tail = decoder.finish();
                    if tail.is_empty() {
                        return None;
                    }
                    return Some((Ok(tail), (bytes, decoder, true)));
                }
            }
        }
    })
    .boxed()
}

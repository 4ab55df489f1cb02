//! Incremental frame decoder for turn response bodies.
//!
//! A body is a sequence of `data: <json>` frames separated by a blank line.
//! Fragments may split a frame anywhere, so the decoder owns a single buffer
//! and only emits a frame once its delimiter has arrived. Malformed frames are
//! dropped with a warning; the decoder itself never fails.

use std::collections::VecDeque;
use std::sync::OnceLock;

use chat_backend::{BackendError, FragmentStream};
use futures_util::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use serde::Deserialize;

const FRAME_DELIMITER: &str = "\n\n";
const DONE_SENTINEL: &str = "[DONE]";

fn frame_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| Regex::new(r"(?s)^data:\s*(.+)$").expect("frame regex must compile"))
}

/// Event kind carried in a record's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RecordKind {
    #[serde(rename = "node_status", alias = "status", alias = "status-update")]
    NodeStatus,
    #[serde(rename = "llm_stream", alias = "delta", alias = "content-delta")]
    LlmStream,
    #[serde(rename = "error", alias = "terminal-error")]
    Error,
    #[serde(other)]
    Unknown,
}

/// One parsed event payload, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    /// Pipeline stage that produced the event.
    #[serde(default, rename = "node", alias = "origin")]
    pub origin: Option<String>,
    #[serde(default, rename = "chunk", alias = "textFragment")]
    pub fragment: Option<String>,
    #[serde(default, rename = "error", alias = "errorText")]
    pub error_text: Option<String>,
}

impl StreamRecord {
    #[must_use]
    pub fn status(origin: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::NodeStatus,
            origin: Some(origin.into()),
            fragment: None,
            error_text: None,
        }
    }

    #[must_use]
    pub fn delta(origin: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::LlmStream,
            origin: Some(origin.into()),
            fragment: Some(fragment.into()),
            error_text: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Error,
            origin: None,
            fragment: None,
            error_text: Some(message.into()),
        }
    }
}

/// Splits buffered text into frames and parses each one.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and drains every frame it completed.
    ///
    /// The buffer never holds a complete delimiter between calls, so the scan
    /// resumes just before the new fragment.
    pub fn feed(&mut self, fragment: &str) -> Vec<StreamRecord> {
        let mut start = self
            .buffer
            .len()
            .saturating_sub(FRAME_DELIMITER.len() - 1);
        while !self.buffer.is_char_boundary(start) {
            start -= 1;
        }
        self.buffer.push_str(fragment);

        let mut records = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[start..].find(FRAME_DELIMITER) {
            let split = start + offset;
            if let Some(record) = parse_frame(&self.buffer[consumed..split]) {
                records.push(record);
            }
            consumed = split + FRAME_DELIMITER.len();
            start = consumed;
        }
        self.buffer.drain(..consumed);

        records
    }

    /// Parses whatever remains buffered as one final frame.
    ///
    /// The last event of a body usually has no trailing delimiter.
    pub fn finish(&mut self) -> Option<StreamRecord> {
        let rest = std::mem::take(&mut self.buffer);
        parse_frame(&rest)
    }

    /// Decodes a complete body in one shot.
    #[must_use]
    pub fn decode_all(body: &str) -> Vec<StreamRecord> {
        let mut decoder = Self::new();
        let mut records = decoder.feed(body);
        records.extend(decoder.finish());
        records
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}

fn parse_frame(frame: &str) -> Option<StreamRecord> {
    let frame = frame.trim();
    if frame.is_empty() {
        return None;
    }

    let Some(payload) = frame_regex()
        .captures(frame)
        .and_then(|captures| captures.get(1))
        .map(|payload| payload.as_str().trim())
    else {
        tracing::warn!(frame, "discarding frame without data prefix");
        return None;
    };

    if payload == DONE_SENTINEL {
        return None;
    }

    match serde_json::from_str::<StreamRecord>(payload) {
        Ok(record) => Some(record),
        Err(error) => {
            tracing::warn!(%error, payload, "discarding unparseable frame");
            None
        }
    }
}

/// Records decoded from a turn body, in arrival order.
///
/// An `Err` item is a transport failure while reading; the stream ends after it.
pub type RecordStream = BoxStream<'static, Result<StreamRecord, BackendError>>;

struct DecodeState {
    fragments: FragmentStream,
    decoder: FrameDecoder,
    ready: VecDeque<StreamRecord>,
    finished: bool,
}

/// Lazily decodes a fragment stream into records.
///
/// Dropping the returned stream drops the underlying fragment stream.
pub fn decode_stream(fragments: FragmentStream) -> RecordStream {
    let state = DecodeState {
        fragments,
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.ready.pop_front() {
                return Some((Ok(record), state));
            }
            if state.finished {
                return None;
            }

            match state.fragments.next().await {
                Some(Ok(fragment)) => {
                    state.ready.extend(state.decoder.feed(&fragment));
                }
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(error), state));
                }
                None => {
                    state.finished = true;
                    state.ready.extend(state.decoder.finish());
                }
            }
        }
    })
    .boxed()
}

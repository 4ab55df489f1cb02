//! HTTP transport for the remote reader service.
//!
//! This crate owns request building, wire payload shapes, response status
//! handling, and UTF-8-safe body streaming for the reader endpoints only. It
//! contains no frame decoding, no authentication, and no session state.
//!
//! Turn responses are returned as raw text fragments; callers decide how to
//! split them into events.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod payload;
pub mod url;
pub mod utf8;

pub use client::{ReaderApiClient, TextStream};
pub use config::ReaderApiConfig;
pub use error::ReaderApiError;
pub use payload::{
    BoundingRect, ChatRequest, CreateSessionBody, ExcerptRecord, MessageRecord, SessionRecord,
    WireRole,
};
pub use crate::url::normalize_base_url;
pub use reqwest::StatusCode;
pub use utf8::Utf8Decoder;

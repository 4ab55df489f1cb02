//! Streaming chat session engine for a document-reading assistant.
//!
//! Data flows in one direction: the caller hands a question to
//! [`ChatRuntime::send`], the [`turn::TurnCoordinator`] appends the user
//! message and dispatches it through a [`ChatBackend`], the
//! [`decoder::FrameDecoder`] turns the raw response body into records, the
//! [`classify`] step reduces each record to an [`classify::Outcome`], and the
//! coordinator folds outcomes into the transcript.
//!
//! # Public API Overview
//! - [`ChatRuntime`] drives every operation against a backend and publishes
//!   [`ChatView`] snapshots through a `tokio::sync::watch` channel.
//! - [`registry::SessionRegistry`] and [`turn::TurnCoordinator`] are the
//!   synchronous state machines the runtime locks around; both are usable on
//!   their own in tests.
//! - [`decoder`] and [`classify`] are pure and backend-agnostic.

pub mod classify;
pub mod decoder;
pub mod error;
pub mod ids;
pub mod options;
pub mod registry;
pub mod runtime;
pub mod turn;

pub use chat_backend::{
    BackendError, BackendProfile, BoundingRegion, CancelSignal, ChatBackend, Excerpt,
    FragmentStream, Message, Role, Session, TurnSubmission,
};
pub use classify::{classify, Narration, Outcome};
pub use decoder::{decode_stream, FrameDecoder, RecordKind, RecordStream, StreamRecord};
pub use error::ChatError;
pub use options::EngineOptions;
pub use registry::{ListingOutcome, SelectOutcome, SessionRegistry};
pub use runtime::{ChatRuntime, ChatView, TurnReport};
pub use turn::{ExcerptTray, TurnCoordinator, TurnId, TurnPhase, TurnState};

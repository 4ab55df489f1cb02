//! Line-oriented client for the paper chat engine.
//!
//! ## Backend bootstrap
//!
//! - `PAPER_CHAT_BACKEND=mock` (default) answers from an in-memory backend.
//! - `PAPER_CHAT_BACKEND=http` talks to a reader service. Set
//!   `PAPER_CHAT_CONFIG_PATH` to a UTF-8 JSON file:
//!
//! ```json
//! {
//!   "base_url": "http://127.0.0.1:8000",
//!   "timeout_sec": 120,
//!   "headers": { "X-Client": "paper-chat" }
//! }
//! ```
//!
//! Contract notes:
//! - `base_url` must be non-empty; `PAPER_CHAT_API_BASE_URL` overrides it.
//! - `timeout_sec` is optional and must be > 0 when provided.
//! - Unknown JSON fields are rejected.
//!
//! Logs go to stderr, filtered by `PAPER_CHAT_LOG` (default `warn`).

pub mod backends;
pub mod commands;
pub mod config;
pub mod render;
pub mod shell;

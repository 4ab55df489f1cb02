//! Locally generated identifiers and wall-clock timestamps.

use time::OffsetDateTime;
use uuid::Uuid;

const EXCERPT_ID_PREFIX: &str = "excerpt_";

#[must_use]
pub fn new_session_id() -> String {
    Uuid::new_v4().to_string()
}

#[must_use]
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

#[must_use]
pub fn new_excerpt_id() -> String {
    format!("{EXCERPT_ID_PREFIX}{}", Uuid::new_v4())
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(nanos).unwrap_or(i64::MAX)
}

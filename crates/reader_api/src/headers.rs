use std::collections::BTreeMap;

use crate::config::ReaderApiConfig;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_USER_AGENT: &str = "user-agent";

pub const ACCEPT_JSON: &str = "application/json";
pub const ACCEPT_EVENT_STREAM: &str = "text/event-stream";

/// Build a deterministic header map for reader requests.
///
/// `accept` selects between JSON endpoints and the streamed chat endpoint.
/// Extra headers from config are lowercased and override the defaults.
pub fn build_headers(config: &ReaderApiConfig, accept: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    headers.insert(HEADER_ACCEPT.to_owned(), accept.to_owned());
    headers.insert(HEADER_CONTENT_TYPE.to_owned(), ACCEPT_JSON.to_owned());

    let ua = config
        .user_agent
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    for (key, value) in &config.extra_headers {
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        headers.insert(key, value.trim().to_owned());
    }

    headers
}

fn default_user_agent() -> String {
    format!("paper-chat/{}", env!("CARGO_PKG_VERSION"))
}

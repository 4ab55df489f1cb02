use ::url::Url;

use crate::error::ReaderApiError;

/// Default base URL for a locally running reader service.
pub const DEFAULT_READER_BASE_URL: &str = "http://127.0.0.1:8000";

pub const PATH_SESSIONS: &str = "chat_histories";
pub const PATH_CREATE_SESSION: &str = "create_chat_history";
pub const PATH_MESSAGES: &str = "messages";
pub const PATH_CHAT: &str = "chat";

/// Normalize a base URL to the service root (without the `/api` prefix).
///
/// Normalization rules:
/// 1) blank input falls back to [`DEFAULT_READER_BASE_URL`]
/// 2) trailing slashes are removed
/// 3) a trailing `/api` segment is removed
pub fn normalize_base_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_READER_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    trimmed
        .strip_suffix("/api")
        .unwrap_or(trimmed)
        .to_string()
}

/// Build `{base}/api/{segments...}` with each segment percent-encoded.
pub fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, ReaderApiError> {
    let normalized = normalize_base_url(base);
    let mut url = Url::parse(&normalized)
        .map_err(|error| ReaderApiError::InvalidBaseUrl(format!("{normalized}: {error}")))?;

    url.path_segments_mut()
        .map_err(|_| ReaderApiError::InvalidBaseUrl(format!("{normalized}: cannot be a base")))?
        .pop_if_empty()
        .push("api")
        .extend(segments);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::{endpoint_url, normalize_base_url, DEFAULT_READER_BASE_URL};

    #[test]
    fn normalize_strips_trailing_slash_and_api_prefix() {
        assert_eq!(normalize_base_url("http://host:8000/"), "http://host:8000");
        assert_eq!(normalize_base_url("http://host:8000/api/"), "http://host:8000");
        assert_eq!(normalize_base_url("  "), DEFAULT_READER_BASE_URL);
    }

    #[test]
    fn endpoint_url_encodes_identifier_segments() {
        let url = endpoint_url("http://host:8000", &["chat_histories", "papers/2401 x"])
            .expect("valid base");
        assert_eq!(
            url.as_str(),
            "http://host:8000/api/chat_histories/papers%2F2401%20x"
        );
    }

    #[test]
    fn endpoint_url_keeps_base_path_prefix() {
        let url = endpoint_url("https://example.com/reader/api", &["chat"]).expect("valid base");
        assert_eq!(url.as_str(), "https://example.com/reader/api/chat");
    }

    #[test]
    fn endpoint_url_rejects_unparseable_base() {
        assert!(endpoint_url("not a url", &["chat"]).is_err());
    }
}

use serde::{Deserialize, Serialize};

/// Session row as exchanged with the reader service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub file_id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Body of `POST /api/create_chat_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionBody {
    pub session: SessionRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    User,
    #[serde(alias = "assistant")]
    Ai,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcerptRecord {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_rect: Option<BoundingRect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Message row returned by `GET /api/messages/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Older histories may carry messages without an id.
    #[serde(default)]
    pub id: Option<String>,
    pub role: WireRole,
    pub content: String,
    #[serde(default)]
    pub excerpts: Vec<ExcerptRecord>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub thread_id: String,
    pub message_id: String,
    pub file_id: String,
    pub content: String,
    pub excerpts: Vec<ExcerptRecord>,
    pub timestamp: i64,
}

impl ChatRequest {
    /// Builds a chat request, dropping excerpts with no visible text.
    pub fn new(
        thread_id: impl Into<String>,
        message_id: impl Into<String>,
        file_id: impl Into<String>,
        content: impl Into<String>,
        excerpts: Vec<ExcerptRecord>,
        timestamp: i64,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            message_id: message_id.into(),
            file_id: file_id.into(),
            content: content.into(),
            excerpts: excerpts
                .into_iter()
                .filter(|excerpt| !excerpt.content.trim().is_empty())
                .collect(),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChatRequest, ExcerptRecord, MessageRecord, SessionRecord, WireRole};

    fn excerpt(id: &str, content: &str) -> ExcerptRecord {
        ExcerptRecord {
            id: id.to_string(),
            content: content.to_string(),
            page_number: None,
            bounding_rect: None,
            timestamp: None,
        }
    }

    #[test]
    fn session_record_uses_camel_case() {
        let record = SessionRecord {
            id: "s-1".to_string(),
            file_id: "doc-1".to_string(),
            title: "New Chat".to_string(),
            created_at: 1,
            updated_at: 2,
        };

        assert_eq!(
            serde_json::to_value(&record).expect("serializable"),
            json!({"id":"s-1","fileId":"doc-1","title":"New Chat","createdAt":1,"updatedAt":2})
        );
    }

    #[test]
    fn chat_request_uses_snake_case_and_drops_blank_excerpts() {
        let request = ChatRequest::new(
            "s-1",
            "m-1",
            "doc-1",
            "what is shown?",
            vec![excerpt("e-1", "Figure 2"), excerpt("e-2", "   ")],
            42,
        );

        assert_eq!(
            serde_json::to_value(&request).expect("serializable"),
            json!({
                "thread_id": "s-1",
                "message_id": "m-1",
                "file_id": "doc-1",
                "content": "what is shown?",
                "excerpts": [{"id": "e-1", "content": "Figure 2"}],
                "timestamp": 42
            })
        );
    }

    #[test]
    fn message_record_accepts_ai_role_and_missing_optional_fields() {
        let record: MessageRecord = serde_json::from_value(json!({
            "role": "ai",
            "content": "answer"
        }))
        .expect("minimal message decodes");

        assert_eq!(record.role, WireRole::Ai);
        assert_eq!(record.id, None);
        assert!(record.excerpts.is_empty());
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn excerpt_record_reads_page_and_rect() {
        let record: ExcerptRecord = serde_json::from_value(json!({
            "id": "e-1",
            "content": "quote",
            "pageNumber": 4,
            "boundingRect": {"x1": 1.0, "y1": 2.0, "x2": 3.0, "y2": 4.0, "width": 10.0}
        }))
        .expect("excerpt decodes");

        assert_eq!(record.page_number, Some(4));
        assert_eq!(record.bounding_rect.map(|rect| rect.x2), Some(3.0));
    }
}

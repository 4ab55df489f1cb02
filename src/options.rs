pub const DEFAULT_SESSION_TITLE: &str = "New Chat";
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Sorry, something went wrong while generating a response. Please try again.";
pub const DEFAULT_THINKING_LABEL: &str = "Thinking...";

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Title given to locally created sessions.
    pub default_session_title: String,
    /// Assistant text appended when a turn fails in transport.
    pub fallback_reply: String,
    /// Status shown from dispatch until the first event arrives.
    pub thinking_label: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_session_title: DEFAULT_SESSION_TITLE.to_string(),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            thinking_label: DEFAULT_THINKING_LABEL.to_string(),
        }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn with_fallback_reply(mut self, text: impl Into<String>) -> Self {
        self.fallback_reply = text.into();
        self
    }

    #[must_use]
    pub fn with_default_session_title(mut self, title: impl Into<String>) -> Self {
        self.default_session_title = title.into();
        self
    }

    #[must_use]
    pub fn with_thinking_label(mut self, label: impl Into<String>) -> Self {
        self.thinking_label = label.into();
        self
    }
}

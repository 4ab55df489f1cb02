//! Reduces a decoded record to an outcome the turn coordinator can apply.
//!
//! Stage names never reach the caller verbatim; each known stage maps to a
//! fixed narration through [`STAGE_NARRATION`].

use crate::decoder::{RecordKind, StreamRecord};

pub const THINKING_STATUS: &str = "Thinking...";
pub const GENERATING_STATUS: &str = "Generating answer...";
const UNKNOWN_ERROR: &str = "Unknown error";

/// How a pipeline stage is narrated while a turn streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Narration {
    Thinking,
    Generating,
    /// The stage is hidden from the user entirely.
    Silent,
}

impl Narration {
    #[must_use]
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::Thinking => Some(THINKING_STATUS),
            Self::Generating => Some(GENERATING_STATUS),
            Self::Silent => None,
        }
    }
}

/// Stages with a non-default narration. Unlisted stages read as [`Narration::Thinking`].
pub const STAGE_NARRATION: &[(&str, Narration)] = &[
    ("retrieve", Narration::Thinking),
    ("web_search", Narration::Thinking),
    ("grade_documents", Narration::Thinking),
    ("transform_question", Narration::Thinking),
    ("generate", Narration::Generating),
    ("summarize_conversation", Narration::Silent),
];

#[must_use]
pub fn narration_for(stage: &str) -> Narration {
    STAGE_NARRATION
        .iter()
        .find(|(name, _)| *name == stage)
        .map_or(Narration::Thinking, |(_, narration)| *narration)
}

/// Classified effect of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Answer text to append to the accumulator.
    Answer(String),
    /// Replacement for the live status line.
    Status(&'static str),
    /// Upstream-reported error. Shown as a status line; does not end the turn.
    UpstreamError(String),
    Ignore,
}

impl Outcome {
    /// Status line this outcome displays, if any.
    #[must_use]
    pub fn status_line(&self) -> Option<String> {
        match self {
            Self::Status(label) => Some((*label).to_string()),
            Self::UpstreamError(message) => Some(format!("Error: {message}")),
            Self::Answer(_) | Self::Ignore => None,
        }
    }
}

#[must_use]
pub fn classify(record: &StreamRecord) -> Outcome {
    match record.kind {
        RecordKind::Error => Outcome::UpstreamError(
            record
                .error_text
                .clone()
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        ),
        RecordKind::LlmStream => match record.fragment.as_deref() {
            Some(fragment) if !fragment.is_empty() => Outcome::Answer(fragment.to_string()),
            _ => Outcome::Ignore,
        },
        RecordKind::NodeStatus => {
            let stage = record.origin.as_deref().unwrap_or_default();
            narration_for(stage)
                .label()
                .map_or(Outcome::Ignore, Outcome::Status)
        }
        RecordKind::Unknown => Outcome::Ignore,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, narration_for, Narration, Outcome, GENERATING_STATUS, THINKING_STATUS};
    use crate::decoder::{RecordKind, StreamRecord};

    #[test]
    fn retrieval_stages_narrate_thinking() {
        for stage in ["retrieve", "web_search", "grade_documents", "transform_question"] {
            assert_eq!(
                classify(&StreamRecord::status(stage)),
                Outcome::Status(THINKING_STATUS),
                "{stage}"
            );
        }
    }

    #[test]
    fn generate_stage_narrates_generating() {
        assert_eq!(
            classify(&StreamRecord::status("generate")),
            Outcome::Status(GENERATING_STATUS)
        );
    }

    #[test]
    fn summarize_stage_is_silent() {
        assert_eq!(narration_for("summarize_conversation"), Narration::Silent);
        assert_eq!(
            classify(&StreamRecord::status("summarize_conversation")),
            Outcome::Ignore
        );
    }

    #[test]
    fn unknown_or_missing_stage_defaults_to_thinking() {
        assert_eq!(
            classify(&StreamRecord::status("rerank")),
            Outcome::Status(THINKING_STATUS)
        );

        let mut record = StreamRecord::status("x");
        record.origin = None;
        assert_eq!(classify(&record), Outcome::Status(THINKING_STATUS));
    }

    #[test]
    fn deltas_carry_text_and_empty_deltas_are_noops() {
        assert_eq!(
            classify(&StreamRecord::delta("generate", "The ")),
            Outcome::Answer("The ".to_string())
        );
        assert_eq!(classify(&StreamRecord::delta("generate", "")), Outcome::Ignore);

        let mut record = StreamRecord::delta("generate", "x");
        record.fragment = None;
        assert_eq!(classify(&record), Outcome::Ignore);
    }

    #[test]
    fn errors_become_prefixed_status_lines() {
        let outcome = classify(&StreamRecord::error("quota exceeded"));
        assert_eq!(outcome, Outcome::UpstreamError("quota exceeded".to_string()));
        assert_eq!(
            outcome.status_line().as_deref(),
            Some("Error: quota exceeded")
        );

        let mut record = StreamRecord::error("x");
        record.error_text = None;
        assert_eq!(
            classify(&record).status_line().as_deref(),
            Some("Error: Unknown error")
        );
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        let mut record = StreamRecord::status("retrieve");
        record.kind = RecordKind::Unknown;
        assert_eq!(classify(&record), Outcome::Ignore);
        assert_eq!(Outcome::Answer("a".to_string()).status_line(), None);
    }
}

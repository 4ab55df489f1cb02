//! Turns successive `ChatView` snapshots into terminal output.
//!
//! Answer text streams to stdout as it arrives; status and notices go to
//! stderr with a bracketed prefix so stdout carries only the conversation.

use paper_chat::{ChatView, Message, Role, Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Written to stdout without a trailing newline.
    Stream(String),
    Line(String),
    Status(String),
}

#[derive(Debug, Default)]
pub struct ViewRenderer {
    conversation_key: Option<(Option<String>, Option<String>)>,
    shown_messages: usize,
    streamed: String,
    status: Option<String>,
    notice: Option<String>,
}

impl ViewRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, view: &ChatView) -> Vec<Output> {
        let mut output = Vec::new();

        let key = (view.document_id.clone(), view.selected_session_id.clone());
        if self.conversation_key.as_ref() != Some(&key) {
            self.conversation_key = Some(key);
            self.end_stream(&mut output);
            self.shown_messages = 0;
            if let Some(session) = view.selected_session() {
                output.push(Output::Status(format!("[chat] {}", session.title)));
            }
        }
        if view.transcript.len() < self.shown_messages {
            self.shown_messages = 0;
        }

        if view.notice != self.notice {
            if let Some(notice) = &view.notice {
                output.push(Output::Status(format!("[notice] {notice}")));
            }
            self.notice = view.notice.clone();
        }

        if view.turn.status_label != self.status {
            if let Some(status) = &view.turn.status_label {
                output.push(Output::Status(format!("[status] {status}")));
            }
            self.status = view.turn.status_label.clone();
        }

        for message in &view.transcript[self.shown_messages..] {
            self.render_message(message, &mut output);
        }
        self.shown_messages = view.transcript.len();

        let answer = &view.turn.in_progress_answer;
        if answer.is_empty() {
            if !self.streamed.is_empty() {
                // Discarded partial answer.
                self.end_stream(&mut output);
            }
        } else if let Some(fresh) = answer.strip_prefix(self.streamed.as_str()) {
            if !fresh.is_empty() {
                output.push(Output::Stream(fresh.to_string()));
            }
            self.streamed = answer.clone();
        }

        output
    }

    fn render_message(&mut self, message: &Message, output: &mut Vec<Output>) {
        match message.role {
            Role::User => {
                for excerpt in &message.excerpts {
                    output.push(Output::Line(format!("  \" {}", excerpt.content)));
                }
                output.push(Output::Line(format!("> {}", message.content)));
            }
            Role::Assistant => {
                if self.streamed.is_empty() {
                    output.push(Output::Line(message.content.clone()));
                } else {
                    let rest = message
                        .content
                        .strip_prefix(self.streamed.as_str())
                        .unwrap_or("");
                    output.push(Output::Line(rest.to_string()));
                    self.streamed.clear();
                }
            }
            Role::System => output.push(Output::Line(format!("[system] {}", message.content))),
        }
    }

    fn end_stream(&mut self, output: &mut Vec<Output>) {
        if !self.streamed.is_empty() {
            output.push(Output::Line(String::new()));
            self.streamed.clear();
        }
    }
}

pub fn session_listing(sessions: &[Session], selected: Option<&str>) -> Vec<String> {
    if sessions.is_empty() {
        return vec!["(no chats yet)".to_string()];
    }

    sessions
        .iter()
        .enumerate()
        .map(|(index, session)| {
            let marker = if Some(session.id.as_str()) == selected {
                '*'
            } else {
                ' '
            };
            format!("{marker}{:>3}. {} [{}]", index + 1, session.title, session.id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use paper_chat::TurnState;

    fn streaming(answer: &str, status: Option<&str>) -> TurnState {
        TurnState {
            in_progress_answer: answer.to_string(),
            status_label: status.map(str::to_string),
            is_active: true,
        }
    }

    fn chat_view() -> ChatView {
        ChatView {
            document_id: Some("doc-1".to_string()),
            sessions: vec![Session::new("s-1", "doc-1", "New Chat", 1)],
            selected_session_id: Some("s-1".to_string()),
            ..ChatView::default()
        }
    }

    #[test]
    fn streamed_answer_is_written_incrementally_then_closed() {
        let mut renderer = ViewRenderer::new();
        let mut view = chat_view();
        view.transcript
            .push(Message::user("m-1", "why?", Vec::new(), 1));
        view.turn = streaming("", Some("Thinking..."));

        assert_eq!(
            renderer.update(&view),
            vec![
                Output::Status("[chat] New Chat".to_string()),
                Output::Status("[status] Thinking...".to_string()),
                Output::Line("> why?".to_string()),
            ]
        );

        view.turn = streaming("Because", None);
        assert_eq!(
            renderer.update(&view),
            vec![Output::Stream("Because".to_string())]
        );

        view.turn = streaming("Because it is.", None);
        assert_eq!(
            renderer.update(&view),
            vec![Output::Stream(" it is.".to_string())]
        );

        view.turn = TurnState::default();
        view.transcript
            .push(Message::assistant("m-2", "Because it is.", 2));
        assert_eq!(renderer.update(&view), vec![Output::Line(String::new())]);
    }

    #[test]
    fn unstreamed_replies_print_in_full() {
        let mut renderer = ViewRenderer::new();
        let mut view = chat_view();
        renderer.update(&view);

        view.transcript
            .push(Message::assistant("m-2", "Sorry, try again.", 2));

        assert_eq!(
            renderer.update(&view),
            vec![Output::Line("Sorry, try again.".to_string())]
        );
    }

    #[test]
    fn discarded_partial_answer_ends_the_line() {
        let mut renderer = ViewRenderer::new();
        let mut view = chat_view();
        view.turn = streaming("half", None);
        renderer.update(&view);

        view.turn = TurnState::default();

        assert_eq!(renderer.update(&view), vec![Output::Line(String::new())]);
    }

    #[test]
    fn switching_sessions_replays_the_new_transcript() {
        let mut renderer = ViewRenderer::new();
        let mut view = chat_view();
        view.transcript
            .push(Message::user("m-1", "first", Vec::new(), 1));
        renderer.update(&view);

        view.sessions
            .push(Session::new("s-2", "doc-1", "Other", 2));
        view.selected_session_id = Some("s-2".to_string());
        view.transcript = vec![
            Message::user("m-3", "older question", Vec::new(), 1),
            Message::assistant("m-4", "older answer", 1),
        ];

        assert_eq!(
            renderer.update(&view),
            vec![
                Output::Status("[chat] Other".to_string()),
                Output::Line("> older question".to_string()),
                Output::Line("older answer".to_string()),
            ]
        );
    }

    #[test]
    fn notices_are_reported_once() {
        let mut renderer = ViewRenderer::new();
        let mut view = chat_view();
        renderer.update(&view);

        view.notice = Some("Failed to load chats".to_string());
        assert_eq!(
            renderer.update(&view),
            vec![Output::Status("[notice] Failed to load chats".to_string())]
        );
        assert!(renderer.update(&view).is_empty());
    }

    #[test]
    fn session_listing_marks_the_selected_chat() {
        let sessions = vec![
            Session::new("s-1", "doc-1", "Latest", 2),
            Session::new("s-2", "doc-1", "Earlier", 1),
        ];

        assert_eq!(
            session_listing(&sessions, Some("s-2")),
            vec![
                "   1. Latest [s-1]".to_string(),
                "*  2. Earlier [s-2]".to_string(),
            ]
        );
        assert_eq!(session_listing(&[], None), vec!["(no chats yet)".to_string()]);
    }
}

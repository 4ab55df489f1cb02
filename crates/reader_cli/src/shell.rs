use std::sync::Arc;

use paper_chat::{ChatError, ChatRuntime, Excerpt, SelectOutcome};

use crate::commands::{resolve_session_ref, SlashCommand, HELP_TEXT};
use crate::render::session_listing;

/// What the input loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Continue(Vec<String>),
    Quit,
}

/// Executes slash commands against a shared runtime.
///
/// Questions are not handled here: the input loop spawns [`ChatRuntime::send`]
/// so `/cancel` stays responsive while an answer streams.
pub struct Shell {
    runtime: Arc<ChatRuntime>,
}

impl Shell {
    pub fn new(runtime: Arc<ChatRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<ChatRuntime> {
        &self.runtime
    }

    pub async fn execute(&self, command: SlashCommand) -> Step {
        let lines = match command {
            SlashCommand::Open(document_id) => {
                let result = self.runtime.open_document(document_id).await;
                self.listing_or_error(result.map(|_| ()))
            }
            SlashCommand::Sessions => {
                let result = self.runtime.refresh_sessions().await;
                self.listing_or_error(result.map(|_| ()))
            }
            SlashCommand::New => match self.runtime.create_session().await {
                Ok(session) => vec![format!("created chat {}", session.id)],
                Err(error) => error_lines(&error),
            },
            SlashCommand::Select(reference) => {
                let view = self.runtime.view();
                let ids: Vec<&str> = view.sessions.iter().map(|s| s.id.as_str()).collect();
                let session_id = resolve_session_ref(&reference, &ids);
                match self.runtime.select_session(session_id).await {
                    Ok(SelectOutcome::Unchanged) => vec!["already selected".to_string()],
                    Ok(SelectOutcome::Changed) => Vec::new(),
                    Ok(SelectOutcome::Superseded) => {
                        vec!["document changed before the chat loaded".to_string()]
                    }
                    Err(error) => error_lines(&error),
                }
            }
            SlashCommand::Excerpt(text) => {
                let id = self.runtime.attach_excerpt(Excerpt::new("", text));
                vec![format!("attached {id}")]
            }
            SlashCommand::Excerpts => {
                let excerpts = self.runtime.pending_excerpts();
                if excerpts.is_empty() {
                    vec!["(no excerpts attached)".to_string()]
                } else {
                    excerpts
                        .iter()
                        .map(|excerpt| format!("{}: {}", excerpt.id, excerpt.content))
                        .collect()
                }
            }
            SlashCommand::Drop(excerpt_id) => {
                if self.runtime.remove_excerpt(&excerpt_id) {
                    vec![format!("dropped {excerpt_id}")]
                } else {
                    vec![format!("no excerpt {excerpt_id}")]
                }
            }
            SlashCommand::Cancel => {
                if self.runtime.cancel_turn() {
                    vec!["cancelled".to_string()]
                } else {
                    vec!["nothing to cancel".to_string()]
                }
            }
            SlashCommand::Help => HELP_TEXT.lines().map(str::to_string).collect(),
            SlashCommand::Quit => return Step::Quit,
            SlashCommand::MissingArgument(usage) => vec![format!("usage: {usage}")],
            SlashCommand::Unknown(command) => {
                vec![format!("unknown command {command}; try /help")]
            }
        };

        Step::Continue(lines)
    }

    fn listing_or_error(&self, result: Result<(), ChatError>) -> Vec<String> {
        match result {
            Ok(()) => {
                let view = self.runtime.view();
                session_listing(&view.sessions, view.selected_session_id.as_deref())
            }
            Err(error) => error_lines(&error),
        }
    }
}

/// Backend failures already reach the view as a notice.
pub fn error_lines(error: &ChatError) -> Vec<String> {
    if error.is_rejected_input() {
        vec![format!("[error] {error}")]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_backend_mock::MockBackend;
    use paper_chat::{EngineOptions, Session};

    fn shell_with(backend: MockBackend) -> Shell {
        Shell::new(Arc::new(ChatRuntime::new(
            Arc::new(backend),
            EngineOptions::default(),
        )))
    }

    fn lines(step: Step) -> Vec<String> {
        match step {
            Step::Continue(lines) => lines,
            Step::Quit => panic!("unexpected quit"),
        }
    }

    #[tokio::test]
    async fn open_lists_sessions_and_select_accepts_an_index() {
        let shell = shell_with(
            MockBackend::new()
                .with_session(Session::new("s-old", "doc-1", "Earlier", 1))
                .with_session(Session::new("s-new", "doc-1", "Latest", 2)),
        );

        let listing = lines(shell.execute(SlashCommand::Open("doc-1".to_string())).await);
        assert_eq!(
            listing,
            vec![
                "   1. Latest [s-new]".to_string(),
                "   2. Earlier [s-old]".to_string(),
            ]
        );

        let selected = lines(shell.execute(SlashCommand::Select("2".to_string())).await);
        assert!(selected.is_empty());
        assert_eq!(
            shell.runtime().view().selected_session_id.as_deref(),
            Some("s-old")
        );

        let again = lines(shell.execute(SlashCommand::Select("s-old".to_string())).await);
        assert_eq!(again, vec!["already selected".to_string()]);
    }

    #[tokio::test]
    async fn commands_before_open_report_the_missing_document() {
        let shell = shell_with(MockBackend::new());

        let output = lines(shell.execute(SlashCommand::Sessions).await);

        assert_eq!(output, vec!["[error] no document is open".to_string()]);
    }

    #[tokio::test]
    async fn excerpts_can_be_attached_listed_and_dropped() {
        let shell = shell_with(MockBackend::new());

        let attached = lines(
            shell
                .execute(SlashCommand::Excerpt("a quoted line".to_string()))
                .await,
        );
        let id = attached[0]
            .strip_prefix("attached ")
            .expect("attach reports the id")
            .to_string();

        let listed = lines(shell.execute(SlashCommand::Excerpts).await);
        assert_eq!(listed, vec![format!("{id}: a quoted line")]);

        let dropped = lines(shell.execute(SlashCommand::Drop(id.clone())).await);
        assert_eq!(dropped, vec![format!("dropped {id}")]);
        assert!(shell.runtime().pending_excerpts().is_empty());
    }

    #[tokio::test]
    async fn cancel_without_a_turn_and_quit() {
        let shell = shell_with(MockBackend::new());

        assert_eq!(
            lines(shell.execute(SlashCommand::Cancel).await),
            vec!["nothing to cancel".to_string()]
        );
        assert_eq!(shell.execute(SlashCommand::Quit).await, Step::Quit);
    }

    #[tokio::test]
    async fn new_creates_and_selects_a_chat() {
        let shell = shell_with(MockBackend::new());
        shell
            .execute(SlashCommand::Open("doc-1".to_string()))
            .await;

        let output = lines(shell.execute(SlashCommand::New).await);

        let view = shell.runtime().view();
        let selected = view.selected_session_id.expect("new chat selected");
        assert_eq!(output, vec![format!("created chat {selected}")]);
    }
}

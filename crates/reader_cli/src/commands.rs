pub const HELP_TEXT: &str = "\
/open <documentId>      open a document and list its chats
/sessions               list chats for the open document
/new                    start a new chat
/select <id|index>      switch to a chat
/excerpt <text>         attach an excerpt to the next question
/excerpts               show attached excerpts
/drop <excerptId>       remove an attached excerpt
/cancel                 stop the answer being streamed
/help                   show this help
/quit                   exit
Any other line is sent as a question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Open(String),
    Sessions,
    New,
    Select(String),
    Excerpt(String),
    Excerpts,
    Drop(String),
    Cancel,
    Help,
    Quit,
    MissingArgument(&'static str),
    Unknown(String),
}

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };

    let parsed = match command {
        "/open" => with_argument(rest, "/open <documentId>", SlashCommand::Open),
        "/sessions" => SlashCommand::Sessions,
        "/new" => SlashCommand::New,
        "/select" => with_argument(rest, "/select <sessionId|index>", SlashCommand::Select),
        "/excerpt" => with_argument(rest, "/excerpt <text>", SlashCommand::Excerpt),
        "/excerpts" => SlashCommand::Excerpts,
        "/drop" => with_argument(rest, "/drop <excerptId>", SlashCommand::Drop),
        "/cancel" => SlashCommand::Cancel,
        "/help" => SlashCommand::Help,
        "/quit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

fn with_argument(
    rest: &str,
    usage: &'static str,
    build: fn(String) -> SlashCommand,
) -> SlashCommand {
    if rest.is_empty() {
        SlashCommand::MissingArgument(usage)
    } else {
        build(rest.to_string())
    }
}

/// Resolves `/select` input against the listed sessions: a 1-based index into
/// the listing, or a literal session id.
pub fn resolve_session_ref<'a>(reference: &'a str, session_ids: &[&'a str]) -> &'a str {
    match reference.parse::<usize>() {
        Ok(index) if index >= 1 && index <= session_ids.len() => session_ids[index - 1],
        _ => reference,
    }
}

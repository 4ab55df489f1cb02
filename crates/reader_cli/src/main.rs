use std::io::{self, Write};
use std::sync::Arc;

use paper_chat::{ChatRuntime, EngineOptions, TurnReport};
use reader_cli::backends;
use reader_cli::commands::parse_slash_command;
use reader_cli::config::LOG_ENV_VAR;
use reader_cli::render::{Output, ViewRenderer};
use reader_cli::shell::{error_lines, Shell, Step};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> io::Result<()> {
    init_tracing();

    let backend = backends::backend_from_env().map_err(io::Error::other)?;
    let runtime = Arc::new(ChatRuntime::new(backend, EngineOptions::default()));
    let profile = runtime.backend_profile();
    eprintln!(
        "[paper-chat] backend {}{}; /help for commands",
        profile.backend_id,
        profile
            .endpoint
            .map(|endpoint| format!(" at {endpoint}"))
            .unwrap_or_default()
    );

    let renderer = tokio::spawn(render_views(runtime.subscribe()));
    let shell = Shell::new(Arc::clone(&runtime));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_slash_command(&line) {
            Some(command) => match shell.execute(command).await {
                Step::Continue(output) => print_status(&output),
                Step::Quit => break,
            },
            None => {
                let runtime = Arc::clone(&runtime);
                tokio::spawn(async move {
                    match runtime.send(&line).await {
                        Ok(TurnReport::Failed(error)) => {
                            tracing::debug!(%error, "turn failed");
                        }
                        Ok(_) => {}
                        Err(error) => print_status(&error_lines(&error)),
                    }
                });
            }
        }
    }

    runtime.cancel_turn();
    drop(shell);
    drop(runtime);
    renderer.abort();
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn render_views(mut views: tokio::sync::watch::Receiver<paper_chat::ChatView>) {
    let mut renderer = ViewRenderer::new();
    loop {
        let outputs = {
            let view = views.borrow_and_update();
            renderer.update(&view)
        };
        write_outputs(&outputs);

        if views.changed().await.is_err() {
            break;
        }
    }
}

fn write_outputs(outputs: &[Output]) {
    let mut stdout = io::stdout().lock();
    for output in outputs {
        let _ = match output {
            Output::Stream(text) => write!(stdout, "{text}"),
            Output::Line(text) => writeln!(stdout, "{text}"),
            Output::Status(text) => writeln!(io::stderr(), "{text}"),
        };
    }
    let _ = stdout.flush();
}

fn print_status(lines: &[String]) {
    let mut stderr = io::stderr().lock();
    for line in lines {
        let _ = writeln!(stderr, "{line}");
    }
}

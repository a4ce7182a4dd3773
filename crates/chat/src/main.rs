use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use medchat::chat::{ExchangeController, ExchangeEvent, SubmitRejection};
use medchat::settings::SettingsLoader;
use medchat::terminal::{InputCommand, PROMPT, TerminalView, parse_input};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Symptom-checker chat with an AI medical assistant.
#[derive(Parser, Debug)]
#[command(name = "medchat", version, about)]
struct Cli {
    /// Settings file to load instead of the per-user default
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gemini model to use for this session
    #[arg(short, long)]
    model: Option<String>,
}

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("terminal io failed on `{stage}`: {source}"))]
    Terminal {
        stage: &'static str,
        source: io::Error,
    },
}

enum Step {
    Line(Option<String>),
    Event(ExchangeEvent),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Logs go to stderr so they never interleave with the transcript.
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    let loader = SettingsLoader::new(cli.config);
    tracing::debug!(config = ?loader.config_path(), "loading settings");
    let mut settings = loader.load();
    if !settings.has_api_key() {
        tracing::warn!("no Gemini API key in settings or environment");
    }
    if let Some(model) = cli.model {
        settings.model = model;
        settings = settings.normalized();
    }

    let (mut controller, mut events) = ExchangeController::bootstrap(|| {
        medchat_llm::open_session(settings.to_provider_config(), settings.generation_settings())
    });

    let mut view = TerminalView::new();
    let mut stdout = io::stdout();

    view.render_header(&mut stdout, controller.model_id())
        .context(TerminalSnafu { stage: "header" })?;
    if controller.is_ready() {
        view.render_welcome(&mut stdout)
            .context(TerminalSnafu { stage: "welcome" })?;
    }
    view.render(controller.transcript(), &mut stdout)
        .context(TerminalSnafu { stage: "render" })?;
    show_prompt(&mut stdout, &controller)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let step = tokio::select! {
            line = lines.next_line() => Step::Line(line.context(TerminalSnafu { stage: "read-line" })?),
            Some(event) = events.recv() => Step::Event(event),
        };

        let could_submit = controller.can_submit();
        match step {
            Step::Line(None) => {
                // Let a reply already in flight finish before exiting on EOF.
                controller.drive_until_idle(&mut events).await;
                view.render(controller.transcript(), &mut stdout)
                    .context(TerminalSnafu { stage: "render" })?;
                break;
            }
            Step::Line(Some(line)) => {
                let started = controller.transcript().has_user_messages();
                match parse_input(&line, started) {
                    InputCommand::Quit => break,
                    InputCommand::Submit(text) => match controller.submit(&text) {
                        Ok(exchange) => tracing::debug!(exchange = ?exchange, "submitted"),
                        Err(SubmitRejection::EmptyInput) => {}
                        Err(rejection) => {
                            tracing::info!(%rejection, "submission ignored");
                        }
                    },
                }
                view.render(controller.transcript(), &mut stdout)
                    .context(TerminalSnafu { stage: "render" })?;
                show_prompt(&mut stdout, &controller)?;
            }
            Step::Event(event) => {
                controller.handle_event(event);
                view.render(controller.transcript(), &mut stdout)
                    .context(TerminalSnafu { stage: "render" })?;
                if !could_submit {
                    show_prompt(&mut stdout, &controller)?;
                }
            }
        }
    }

    tracing::info!(messages = controller.transcript().len(), "session closed");
    Ok(())
}

fn show_prompt(out: &mut impl Write, controller: &ExchangeController) -> Result<(), AppError> {
    if !controller.can_submit() {
        return Ok(());
    }
    write!(out, "{PROMPT}")
        .and_then(|()| out.flush())
        .context(TerminalSnafu { stage: "prompt" })
}

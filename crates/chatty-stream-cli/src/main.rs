mod render;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use anyhow::{Context, Result};
use chatty_backend_client::BackendClient;
use chatty_stream_core::models::{ErrorEntry, ErrorStore};
use chatty_stream_core::services::ErrorCollectorLayer;
use chatty_stream_core::settings::{ClientSettingsJsonRepository, ClientSettingsRepository};
use chatty_stream_core::{
    ChatSession, ClientSettings, StreamEvent, StreamKind, StreamOutcome, StreamRequest,
    SwitchOutcome,
};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ERROR_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "chatty-stream", version, about = "Inspect and drive chatty streaming sessions")]
struct Cli {
    /// Backend API root, overrides the config file and CHATTY_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Settings file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show which conversations are streaming
    Status { conversation_id: Option<String> },
    /// Follow stream status changes until interrupted
    Watch,
    /// Load a conversation and print its messages
    Open { conversation_id: String },
    /// Send a message and print the response as it streams.
    /// Lines typed while an agent stream runs are sent as guidance.
    Send {
        conversation_id: String,
        message: String,
        #[arg(long)]
        agent: bool,
        #[arg(long)]
        model: Option<String>,
    },
    /// Ask the server to stop a conversation's agent stream
    Stop { conversation_id: String },
    /// Send guidance to a running agent stream
    Steer {
        conversation_id: String,
        guidance: String,
        #[arg(long, default_value = "")]
        accumulated: String,
    },
    /// Print the effective settings
    Config {
        /// Write them to the settings file
        #[arg(long)]
        save: bool,
    },
}

fn init_logging() -> Receiver<ErrorEntry> {
    let (error_layer, error_rx) = ErrorCollectorLayer::new(ERROR_CHANNEL_CAPACITY);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(error_layer)
        .init();

    error_rx
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let error_rx = init_logging();

    let repository = match &cli.config {
        Some(path) => ClientSettingsJsonRepository::with_path(path.clone()),
        None => ClientSettingsJsonRepository::new().context("Failed to locate settings file")?,
    };
    let settings = repository
        .load()
        .await
        .with_context(|| format!("Failed to load settings from {}", repository.path().display()))?
        .with_env_overrides()
        .with_base_url_override(cli.base_url.clone());

    let errors = ErrorStore::new(settings.max_error_entries);
    let result = run(cli.command, settings, &repository).await;

    errors.drain_from(&error_rx);
    if errors.error_count() + errors.warning_count() > 0 {
        eprintln!(
            "{} error(s), {} warning(s) logged",
            errors.error_count(),
            errors.warning_count()
        );
    }
    result
}

async fn run(
    command: Command,
    settings: ClientSettings,
    repository: &ClientSettingsJsonRepository,
) -> Result<()> {
    if let Command::Config { save } = command {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        if save {
            repository
                .save(settings)
                .await
                .context("Failed to save settings")?;
            println!("saved to {}", repository.path().display());
        }
        return Ok(());
    }

    let client = BackendClient::new(&settings).context("Failed to create backend client")?;
    debug!(base_url = client.base_url(), "Using backend");

    match command {
        Command::Status { conversation_id } => status(&client, conversation_id).await,
        Command::Watch => watch(settings, client).await,
        Command::Open { conversation_id } => open(settings, client, &conversation_id).await,
        Command::Send {
            conversation_id,
            message,
            agent,
            model,
        } => {
            let kind = if agent {
                StreamKind::Agent
            } else {
                StreamKind::Normal
            };
            let mut request = StreamRequest::new(&conversation_id, kind).with_user_message(message);
            if let Some(model) = model {
                request = request.with_model(model);
            }
            send(settings, client, &conversation_id, request).await
        }
        Command::Stop { conversation_id } => {
            let ack = client
                .stop(&conversation_id)
                .await
                .context("Stop request failed")?;
            let fallback = if ack.success { "stopped" } else { "not stopped" };
            println!("{}", ack.message.as_deref().unwrap_or(fallback));
            Ok(())
        }
        Command::Steer {
            conversation_id,
            guidance,
            accumulated,
        } => {
            let ack = client
                .steer(&conversation_id, &guidance, &accumulated)
                .await
                .context("Steer request failed")?;
            if !ack.success {
                anyhow::bail!(
                    "guidance rejected: {}",
                    ack.message.unwrap_or_else(|| "no reason given".into())
                );
            }
            println!("guidance accepted");
            Ok(())
        }
        Command::Config { .. } => Ok(()),
    }
}

async fn status(client: &BackendClient, conversation_id: Option<String>) -> Result<()> {
    match conversation_id {
        Some(id) => {
            let status = client
                .fetch_status(&id)
                .await
                .with_context(|| format!("Failed to fetch status of {id}"))?;
            println!("{}", render::status_line(&id, &status));
        }
        None => {
            let all = client
                .fetch_all()
                .await
                .context("Failed to fetch stream status")?;
            let lines = render::status_table(&all);
            if lines.is_empty() {
                println!("no active streams");
            }
            for line in lines {
                println!("{line}");
            }
        }
    }
    Ok(())
}

async fn watch(settings: ClientSettings, client: BackendClient) -> Result<()> {
    let mut session = ChatSession::with_backend(settings, Arc::new(client));
    let report = session.start().await;
    let mut events = session.subscribe();
    if report.failed {
        warn!("Initial status sync failed, will retry on the next poll");
    }
    for id in session.registry().active_ids() {
        println!("{}", render::status_line(&id, &session.registry().get_status(&id)));
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = render::event_line(&event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event output fell behind"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.shutdown();
    Ok(())
}

async fn open(settings: ClientSettings, client: BackendClient, conversation_id: &str) -> Result<()> {
    let session = ChatSession::with_backend(settings, Arc::new(client));
    match session.switch_to(conversation_id).await {
        SwitchOutcome::Loaded { .. } => {
            let rendered = session
                .coordinator()
                .rendered()
                .context("Loaded conversation was not rendered")?;
            for message in rendered.messages {
                println!("{}: {}", message.role, message.text());
            }
            Ok(())
        }
        SwitchOutcome::Failed(message) => anyhow::bail!("Failed to load {conversation_id}: {message}"),
        SwitchOutcome::Superseded => Ok(()),
    }
}

async fn send(
    settings: ClientSettings,
    client: BackendClient,
    conversation_id: &str,
    request: StreamRequest,
) -> Result<()> {
    let mut session = ChatSession::with_backend(settings, Arc::new(client));
    session.start().await;
    if let SwitchOutcome::Failed(message) = session.switch_to(conversation_id).await {
        warn!(conv_id = %conversation_id, error = %message, "Could not load history, sending anyway");
    }

    let mut events = session.subscribe();
    session.send(conversation_id, request);

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut stdout = std::io::stdout();
    let mut failed = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(StreamEvent::Chunk { chunk, .. }) => {
                    if let Some(text) = render::chunk_text(&chunk) {
                        print!("{text}");
                        stdout.flush()?;
                    }
                }
                Ok(StreamEvent::StreamEnded { conversation_id: ended, outcome })
                    if ended == conversation_id =>
                {
                    // A steer restarts the stream under the same conversation
                    if session.controller().active_conversation().as_deref() == Some(conversation_id) {
                        println!();
                        continue;
                    }
                    if let StreamOutcome::Errored(message) = outcome {
                        failed = Some(message);
                    }
                    break;
                }
                Ok(event) => {
                    if matches!(event, StreamEvent::Notification { .. } | StreamEvent::SteerRejected { .. })
                        && let Some(line) = render::event_line(&event)
                    {
                        eprintln!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event output fell behind"),
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(guidance)) if !guidance.trim().is_empty() => {
                    if let Err(e) = session.steer(guidance.trim()).await {
                        eprintln!("guidance not sent: {e}");
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                session.stop().await;
                break;
            }
        }
    }

    println!();
    session.shutdown();
    match failed {
        Some(message) => anyhow::bail!("Stream failed: {message}"),
        None => Ok(()),
    }
}

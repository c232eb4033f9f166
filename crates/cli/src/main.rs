use std::path::PathBuf;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use runtime::{AnalyticsContext, OpenAiBackend, StdioConnector};
use storage::{Event, EventKind, EventStore};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use datalens::config::Config;
use datalens::error::{Error, Result};
use datalens::server;

const DB_FILE: &str = "events.db";

#[derive(Parser)]
#[command(name = "datalens")]
#[command(about = "Conversational analytics over MongoDB", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./datalens.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tools and serve the HTTP API
    Serve,
    /// Send one chat message through the full stack and print the reply
    Ask {
        message: String,
    },
    /// List recorded agent sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show the event log of a session
    Logs {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Filter by event kind (instruction, tool_call, reply, failure, ...)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let (config, source) = Config::discover(cli.config.as_deref())?;
    match &source {
        Some(path) => info!(path = %path.display(), "loaded config"),
        None => info!("no config file, using defaults"),
    }

    match cli.command {
        Some(Commands::Serve) | None => cmd_serve(&config).await,
        Some(Commands::Ask { message }) => cmd_ask(&config, &message).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(&config, limit),
        Some(Commands::Logs { session, kind }) => cmd_logs(&config, &session, kind.as_deref()),
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Connect every tool and open the agent session.
async fn start_context(config: &Config) -> Result<AnalyticsContext<StdioConnector>> {
    let api_key = config.api_key(env_var)?;
    let descriptors = config.descriptors(env_var)?;

    let mut builder = OpenAiBackend::builder(api_key, &config.model.name)
        .base_url(&config.model.base_url);
    if let Some(max_tokens) = config.model.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    let backend = builder.build();

    let data_dir = data_dir(config);
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join(DB_FILE);
    let store = EventStore::open(&db_path)?;
    info!(db = %db_path.display(), model = %backend, "opening agent session");

    Ok(AnalyticsContext::start(
        StdioConnector,
        descriptors,
        backend,
        store,
        config.session_settings(),
    )
    .await?)
}

async fn cmd_serve(config: &Config) -> Result<()> {
    let context = start_context(config).await?;
    for (tool, state) in context.tool_states() {
        info!(tool = %tool, %state, "tool ready");
    }

    let addr = config.bind_addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "could not bind");
            context.shutdown().await;
            return Err(e.into());
        }
    };
    info!(addr = %addr, "listening");

    let app = server::router(context.orchestrator());
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        })
        .await;

    let report = context.shutdown().await;
    for failure in &report.failures {
        eprintln!("warning: {failure}");
    }
    Ok(served?)
}

async fn cmd_ask(config: &Config, message: &str) -> Result<()> {
    let context = start_context(config).await?;
    let reply = context.orchestrator().chat(message).await;
    context.shutdown().await;

    println!("{}", reply?.text);
    Ok(())
}

fn cmd_sessions(config: &Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:>5}  {:>4}  {:<6}  AGENT",
        "SESSION ID", "STARTED", "ASKED", "FAIL", "STATUS"
    );
    println!("{}", "-".repeat(100));

    for summary in sessions.into_iter().take(limit) {
        let started = Local
            .from_utc_datetime(&summary.started_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let status = if summary.ended_at.is_some() {
            "ended"
        } else {
            "open"
        };
        println!(
            "{:<36}  {:<16}  {:>5}  {:>4}  {status:<6}  {}",
            summary.id.to_string(),
            started.to_string(),
            summary.instruction_count,
            summary.failure_count,
            summary.agent.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}

fn cmd_logs(config: &Config, session_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store(config)?;

    let sessions = store.list_sessions()?;
    let matching: Vec<_> = sessions
        .iter()
        .filter(|s| s.id.to_string().starts_with(session_prefix))
        .collect();

    let session_id = match matching.as_slice() {
        [] => {
            return Err(Error::SessionNotFound {
                prefix: session_prefix.to_string(),
            });
        }
        [only] => only.id,
        _ => {
            return Err(Error::AmbiguousSession {
                prefix: session_prefix.to_string(),
                matches: matching.iter().map(|s| s.id.to_string()).collect(),
            });
        }
    };

    let events = store.load_events(session_id, kind_filter)?;
    if events.is_empty() {
        println!("No events found for session {session_id}");
        return Ok(());
    }

    println!("Session: {session_id}\n");
    for event in events {
        print_event(&event);
    }

    Ok(())
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &event.kind {
        EventKind::SessionStart { agent } => {
            println!("[{time}] === Session started: {agent} ===");
        }
        EventKind::SessionEnd => {
            println!("[{time}] === Session ended ===");
        }
        EventKind::Instruction { content } => {
            println!("[{time}] INSTRUCTION: {}", truncate(content, 200));
        }
        EventKind::Reply { content } => {
            println!("[{time}] REPLY: {}", truncate(content, 200));
        }
        EventKind::ToolCall { name, input } => {
            println!("[{time}] TOOL CALL: {name} {}", truncate(&input.to_string(), 200));
        }
        EventKind::ToolResult {
            name,
            output,
            is_error,
        } => {
            let label = if *is_error { "TOOL ERROR" } else { "TOOL RESULT" };
            println!("[{time}] {label}: {name} {}", truncate(&output.to_string(), 200));
        }
        EventKind::Failure { message } => {
            println!("[{time}] FAILURE: {message}");
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn open_store(config: &Config) -> Result<EventStore> {
    let db_path = data_dir(config).join(DB_FILE);
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound { path: db_path });
    }
    Ok(EventStore::open(&db_path)?)
}

fn data_dir(config: &Config) -> PathBuf {
    config
        .data_dir
        .clone()
        .or_else(dirs_data_dir)
        .unwrap_or_else(|| ".datalens".into())
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join("Library/Application Support/datalens"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("datalens"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("datalens"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

//! claude-streamdeck - Stream Deck companion daemon for Claude Code

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use claude_streamdeck::hid::DeckDriver;
use claude_streamdeck::{ipc, Config, Daemon, HookMessage, SessionActions, TerminalActions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "claude-streamdeck", version, about = "Stream Deck companion daemon for Claude Code")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Also write logs to the configured log file
    #[arg(long, global = true)]
    log_file: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Run,
    /// Send one hook event to a running daemon
    Notify {
        /// Hook event name, e.g. PreToolUse
        #[arg(long)]
        event: String,
        /// Tool name for tool events
        #[arg(long)]
        tool: Option<String>,
        /// Claude Code session id
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Print the effective configuration
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
        /// Print the commented default configuration
        #[arg(long)]
        default: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(Commands::Config { path, default }) => print_config(&config, path, default),
        Some(Commands::Notify {
            event,
            tool,
            session_id,
        }) => {
            let mut message = HookMessage::new(event);
            message.tool = tool;
            message.session_id = session_id;
            runtime()?.block_on(ipc::send_message(&config.socket_path(), &message))
        }
        Some(Commands::Run) | None => {
            init_logging(&config, cli.debug, cli.log_file)?;
            runtime()?.block_on(run_daemon(config))
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")
}

fn init_logging(config: &Config, debug: bool, log_file: bool) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = if log_file {
        let path = config.log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {:?}", path))?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn print_config(config: &Config, path: bool, default: bool) -> Result<()> {
    if path {
        println!("{}", Config::config_path()?.display());
    } else if default {
        print!("{}", Config::default_config_str());
    } else {
        let toml = toml::to_string_pretty(config).context("Failed to serialize config")?;
        print!("{}", toml);
    }
    Ok(())
}

async fn run_daemon(config: Config) -> Result<()> {
    info!("claude-streamdeck {}", env!("CARGO_PKG_VERSION"));

    let driver = deck_driver(&config)?;
    let actions: Arc<dyn SessionActions> = Arc::new(TerminalActions::new());
    let mut daemon = Daemon::new(config, driver, actions);

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        shutdown.shutdown();
    });

    daemon.run().await
}

#[cfg(not(feature = "mock-hid"))]
fn deck_driver(config: &Config) -> Result<Arc<dyn DeckDriver>> {
    let driver = claude_streamdeck::hid::HidDriver::new(config.device.vendor_id)?;
    Ok(Arc::new(driver))
}

#[cfg(feature = "mock-hid")]
fn deck_driver(_config: &Config) -> Result<Arc<dyn DeckDriver>> {
    info!("Using in-memory Stream Deck");
    Ok(Arc::new(claude_streamdeck::hid::MockDriver::xl()))
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Failed to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

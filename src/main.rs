mod app;
mod cancel;
mod error;
mod model;
mod plugin;
mod prompt;
mod session;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use crossterm::tty::IsTty;
use tracing_subscriber::EnvFilter;

use app::App;
use cancel::CancelFlag;
use model::config::{AppConfig, ReactivatePolicy};

#[derive(Debug, Parser)]
#[command(
    name = "update-all-plugins",
    version,
    about = "Interactively upgrade every plugin that has an update available.",
    long_about = "Lists plugins with pending updates and asks, one at a time, whether to upgrade. \
                  Each confirmed plugin is deactivated, upgraded, and reactivated."
)]
struct Args {
    #[arg(long, help = "Host root directory (overrides config)")]
    root: Option<PathBuf>,

    #[arg(long, help = "Config file to use instead of the user config")]
    config: Option<PathBuf>,

    #[arg(long, help = "Seconds to wait for an answer before skipping (0 waits forever)")]
    timeout: Option<u64>,

    #[arg(long, value_enum, help = "Reactivation policy after an upgrade")]
    reactivate: Option<ReactivatePolicy>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive upgrade session (default)
    Upgrade,
    /// Print pending updates without prompting
    List,
    /// Re-check the registry and rebuild the update cache
    Check,
    /// Activate every installed plugin
    ActivateAll,
    /// Deactivate every active plugin
    DeactivateAll,
}

impl Command {
    /// Only the upgrade session polls the cancel flag; every other command
    /// keeps the default Ctrl-C behavior.
    fn traps_sigint(&self) -> bool {
        matches!(self, Command::Upgrade)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Upgrade);

    // Block SIGINT before any thread (log writer, stdin reader) exists.
    let cancel = CancelFlag::new();
    if command.traps_sigint() {
        cancel::install_sigint(cancel.clone())?;
    }

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(root) = &args.root {
        config.host.root = root.to_string_lossy().into_owned();
    }
    if let Some(timeout) = args.timeout {
        config.session.prompt_timeout_secs = timeout;
    }
    if let Some(policy) = args.reactivate {
        config.session.reactivate = policy;
    }

    // Initialize logging to file (never stdout, it carries the prompts)
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "plugin-updater.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    tracing::info!(root = %config.root().display(), "plugin-updater starting");

    let mut app = App::new(config);
    let mut stdout = io::stdout();

    match command {
        Command::Upgrade => {
            let interactive = io::stdin().is_tty();
            if !interactive {
                tracing::warn!("stdin is not a terminal; unanswered prompts will be skipped");
            }
            let policy = app.config.session.reactivate;
            let report = app.upgrade(policy, cancel, interactive)?;
            if report.cancelled {
                println!("Stopped early; remaining plugins were not upgraded.");
            }
        }
        Command::List => app.list(&mut stdout)?,
        Command::Check => app.check(&mut stdout)?,
        Command::ActivateAll => app.activate_all(&mut stdout)?,
        Command::DeactivateAll => app.deactivate_all(&mut stdout)?,
    }

    tracing::info!("plugin-updater finished");
    Ok(())
}

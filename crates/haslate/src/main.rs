//! `haslate`: a Home Assistant dashboard for small touch screens.
//!
//! Reads a YAML page/grid layout, keeps a live mirror of the hub's entity
//! states over its WebSocket API, and draws the configured widgets. This
//! binary renders the device screen onto terminal cells: mouse clicks are
//! taps, arrow keys switch pages, `r` reloads the configuration (as does
//! saving the file) and `q` quits.
//!
//! Logs go to a file (default `/tmp/haslate.log`) so they never interleave
//! with the terminal UI.

mod app;
mod event;
mod render;
mod sysfs;
mod theme;
mod tui;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;

/// Home Assistant dashboard for small touch screens.
#[derive(Parser, Debug)]
#[command(name = "haslate", version, about)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log file path
    #[arg(long, default_value = "/tmp/haslate.log")]
    log_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter configuration file and exit
    InitConfig {
        /// Device hostname to put in the template
        #[arg(long, default_value = "haslate")]
        hostname: String,
    },
}

/// File-based tracing; the terminal belongs to the UI. Hold the returned
/// guard until exit so buffered lines are flushed.
fn setup_tracing(cli: &Cli) -> WorkerGuard {
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "haslate={level},haslate_core={level},haslate_api={level},haslate_config={level}"
        ))
    });

    let dir = cli.log_file.parent().unwrap_or(Path::new("/tmp"));
    let file = cli
        .log_file
        .file_name()
        .unwrap_or(std::ffi::OsStr::new("haslate.log"));
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .init();

    guard
}

fn init_config(path: &Path, hostname: &str) -> Result<()> {
    haslate_config::write_template(path, hostname)
        .wrap_err_with(|| format!("could not write {}", path.display()))?;
    println!("Wrote starter configuration to {}", path.display());
    println!("Set application.hub_uri and application.hub_token, then run haslate.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(haslate_config::config_path);

    if let Some(Command::InitConfig { hostname }) = &cli.command {
        color_eyre::install()?;
        return init_config(&config_path, hostname);
    }

    tui::install_hooks()?;
    let _log_guard = setup_tracing(&cli);
    haslate_api::install_crypto_provider();

    info!(config = %config_path.display(), "starting haslate");
    App::new(config_path).run().await
}

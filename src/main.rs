mod config;
mod dispatch;
mod extract;
mod format;
mod logfile;
mod stats;
mod transcript;
mod types;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use clap::error::ErrorKind;
use config::Paths;
use dispatch::Dispatcher;
use std::io::{self, Read};
use std::panic;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use types::HookEvent;

/// Environment variable holding the diagnostics filter (e.g. `debug`).
const LOG_ENV: &str = "USER_INPUT_LOGGER_LOG";

/// Log the user's recent messages for every tool call Claude Code makes.
///
/// Reads one hook event as JSON on stdin. Always exits 0.
#[derive(Debug, Default, Parser)]
#[command(name = "user-input-logger", version)]
struct Cli {
    /// Config file (default: <base-dir>/hooks/user-input-logger.toml)
    #[arg(long, env = "USER_INPUT_LOGGER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the logs and statistics (default: ~/.claude)
    #[arg(long, env = "USER_INPUT_LOGGER_DIR")]
    base_dir: Option<PathBuf>,
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("off"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Report panics through tracing instead of the default stderr hook.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        tracing::warn!("user-input-logger: {info}");
    }));
}

fn run(cli: &Cli) -> Result<()> {
    let input = read_stdin()?;
    let event: HookEvent = match serde_json::from_str(&input) {
        Ok(event) => event,
        Err(err) => {
            tracing::debug!("ignoring malformed event: {err}");
            return Ok(());
        }
    };

    let base = cli.base_dir.clone().unwrap_or_else(Paths::default_base);
    let paths = Paths::under(&base);
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let dispatcher = Dispatcher::open(paths, &config_path);

    let report = dispatcher.handle(&event, Local::now());
    tracing::debug!(
        tool = event.tool_name(),
        source = ?report.extracted.source,
        messages = report.extracted.messages.len(),
        context_fields = ?report.context.fields,
        logged = report.line.is_some(),
        log_failures = report.log_failures.len(),
        primary_log = %dispatcher.paths().primary_log.display(),
        stats = ?report.stats,
        "event handled"
    );
    Ok(())
}

fn main() {
    init_tracing();
    install_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                return;
            }
            // Bad arguments must not block the host. Keep the environment
            // settings and drop the arguments.
            Cli::try_parse_from([env!("CARGO_PKG_NAME")]).unwrap_or_default()
        }
    };

    match panic::catch_unwind(|| run(&cli)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!("user-input-logger: {err:#}"),
        Err(_) => tracing::warn!("user-input-logger: panicked while handling event"),
    }
}

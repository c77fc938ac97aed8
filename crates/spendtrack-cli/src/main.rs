//! Spendtrack - a command-line client for the spendtrack personal finance API.
//!
//! Signs in against the API, keeps the token pair in the configured token
//! store, and lists or edits expenses and categories and prints reports.

mod commands;

use std::io;

use anyhow::Result;
use spendtrack_core::{ApiClient, Config, Session};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Command;

/// Directory for an optional daily-rotated log file
const LOG_DIR_ENV: &str = "SPENDTRACK_LOG_DIR";

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug).
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "spendtrack.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}\n", e);
            eprintln!("{}", commands::USAGE);
            std::process::exit(2);
        }
    };
    if matches!(command, Command::Help) {
        println!("{}", commands::USAGE);
        return Ok(());
    }

    let mut config = Config::load()?;
    info!(api_url = %config.api_url(), token_store = %config.token_store, "Spendtrack starting");

    let tokens = config.open_tokens()?;
    let client = ApiClient::from_config(&config, tokens)?;
    let mut session = Session::new(client);

    commands::run(command, &mut session, &mut config).await
}

//! ClipStash - clipboard history recorder
//!
//! With no subcommand the binary runs the clipboard watcher; otherwise it
//! executes one query command against the history database and exits.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipstash::cli::{Cli, CliHandler};
use clipstash::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_config(cli.config.as_deref()).context("Failed to load config")?;

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("clipstash={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("ClipStash v{}", env!("CARGO_PKG_VERSION"));

    let mut handler = CliHandler::new(config);
    handler.handle_command(cli.command).await?;

    Ok(())
}

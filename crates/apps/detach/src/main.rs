//! Detach - find large Gmail attachments, save them and strip them
//!
//! This is the main entry point for the detach command-line driver.

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, warn};
use mail::CancellationToken;

mod cli;
mod commands;
mod report;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    // Ctrl-C asks the running task to stop at its next step boundary
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current step");
            handle.cancel();
        }
    });

    tokio::task::spawn_blocking(move || commands::run(cli.command, cancel))
        .await
        .context("Command task failed")?
}

//! # rbot-cli
//!
//! Binary glue: argument parsing, config loading, and wiring of the offset store, anti-spam,
//! dispatcher and poller.

pub mod cli;
mod handlers;

use std::sync::Arc;

use anyhow::{Context, Result};
use middleware::{AntiSpamConfig, AntiSpamManager};
use rbot_core::init_tracing;
use rbot_dispatch::ExecutionBridge;
use rbot_rubika::{ExecutionMode, Poller, PollerConfig, RubikaClient, RubikaConfig};
use storage::open_offset_store;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

pub use cli::{load_config, Cli, Commands};
pub use handlers::build_dispatcher;

/// Validates config, initialises logging, builds every component and polls until Ctrl-C.
#[instrument(skip(config))]
pub async fn run_bot(config: RubikaConfig) -> Result<()> {
    config.validate()?;
    init_tracing(&config.log_file)?;

    info!(
        api_url = %config.api_url,
        offset_store = %config.offset_store,
        mode = ?config.execution_mode,
        "Initializing bot"
    );

    let store = open_offset_store(&config.offset_store)
        .await
        .with_context(|| format!("Open offset store {}", config.offset_store))?;

    let mut spam_config = AntiSpamConfig::new(
        config.antispam_threshold,
        config.antispam_window,
        config.antispam_punish,
    );
    if let Some(path) = &config.antispam_data_file {
        spam_config = spam_config.with_persistence(path.clone());
    }
    let spam = Arc::new(AntiSpamManager::new(spam_config).context("Invalid anti-spam settings")?);

    let client = Arc::new(RubikaClient::from_config(&config)?);

    let mut bridge = ExecutionBridge::new();
    if let Some(max) = config.max_blocking_calls {
        bridge = bridge.with_max_blocking(max);
    }
    let dispatcher = build_dispatcher(client.clone(), spam, bridge);

    let token = CancellationToken::new();
    let poller = Poller::new(client, store, dispatcher, PollerConfig::from_config(&config))
        .with_cancellation_token(token.clone());

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    info!("Bot started successfully");

    match config.execution_mode {
        ExecutionMode::Cooperative => poller.run().await?,
        ExecutionMode::Blocking => {
            // the blocking loop owns its own runtime, so it needs a plain OS thread
            let thread = std::thread::Builder::new()
                .name("rbot-poller".to_string())
                .spawn(move || poller.run_blocking())
                .context("Spawn poller thread")?;
            let joined = tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Join poller thread")?;
            joined.map_err(|_| anyhow::anyhow!("Poller thread panicked"))??;
        }
    }

    info!("Bot stopped");
    Ok(())
}

/// Prints the offset committed in the store at `location`.
pub async fn show_offset(location: &str) -> Result<()> {
    let store = open_offset_store(location)
        .await
        .with_context(|| format!("Open offset store {location}"))?;
    match store.load().await? {
        Some(offset) => println!("{offset}"),
        None => println!("No offset committed yet ({location})."),
    }
    Ok(())
}

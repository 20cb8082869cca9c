//! CLI parser and config loading.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rbot_rubika::{ExecutionMode, RubikaConfig};

#[derive(Parser)]
#[command(name = "rbot")]
#[command(about = "Rubika bot runtime: run the poller, inspect the committed offset", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot (config from env; flags override BOT_TOKEN and EXECUTION_MODE).
    Run {
        #[arg(short, long)]
        token: Option<String>,
        /// `cooperative` or `blocking`.
        #[arg(short, long)]
        mode: Option<ExecutionMode>,
    },
    /// Print the committed polling offset.
    Offset {
        #[arg(short, long)]
        token: Option<String>,
        /// File path or `sqlite:` URL; defaults to OFFSET_STORE.
        #[arg(long)]
        store: Option<String>,
    },
}

/// Loads RubikaConfig from the environment. `token` overrides BOT_TOKEN.
pub fn load_config(token: Option<String>) -> Result<RubikaConfig> {
    match token {
        Some(token) => RubikaConfig::from_env_with_token(token),
        None => RubikaConfig::from_env(),
    }
}

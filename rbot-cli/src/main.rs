//! rbot CLI: run the Rubika bot or inspect its committed offset. Config from env and optional CLI args.

use anyhow::Result;
use clap::Parser;
use rbot_cli::{load_config, run_bot, show_offset, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { token, mode } => {
            let mut config = load_config(token)?;
            if let Some(mode) = mode {
                config.execution_mode = mode;
            }
            run_bot(config).await
        }
        Commands::Offset { token, store } => {
            let location = match store {
                Some(location) => location,
                None => load_config(token)?.offset_store,
            };
            show_offset(&location).await
        }
    }
}

//! Flashblocks Race
//!
//! Sends back-to-back self-transfers on two lanes and measures how quickly
//! each lane observes its own transactions: the flashblocks lane through the
//! pending block, the normal lane through mined blocks. With `--spoof` no node
//! is needed and both lanes confirm after fixed synthetic delays.

mod config;
mod race;

use clap::Parser;
use config::{Command, Config};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present, before RUST_LOG is read
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = Config::parse();
    let settings = config.to_settings()?;

    info!("Flashblocks Race");
    if !settings.spoof {
        info!("RPC URL: {}", settings.rpc_url);
    }

    let provider = settings.build_provider()?;

    match config.command() {
        Command::Race { duration, json } => {
            let summary = race::run(provider, settings.timing, duration, json).await?;
            if json {
                println!("{}", serde_json::to_string(&summary)?);
            }
        }
        Command::Wallet => {
            let wallet = provider.wallet_snapshot().await;
            if !wallet.available {
                error!("✗ Balance unavailable for {}", wallet.address);
                return Err("balance query failed".into());
            }
            info!("Address: {}", wallet.address);
            info!("Balance: {} ETH ({} wei)", wallet.balance_eth, wallet.balance_wei);
            if wallet.spoof_mode {
                info!("Spoof mode: balance is synthetic");
            }
        }
        Command::Send { lane } => match provider.send(lane).await {
            Ok(handle) => {
                info!("✓ {} lane sent {}", lane, handle.transaction_id);
            }
            Err(e) => {
                error!("✗ {} lane send failed: {}", lane, e);
                return Err(e.into());
            }
        },
        Command::Confirm { lane, tx } => {
            let verdict = provider.confirm(lane, &tx).await?;
            if verdict.confirmed {
                let height = verdict
                    .block_height
                    .map(|h| format!(" at block {}", h))
                    .unwrap_or_default();
                info!("✓ {} confirmed via {}{}", tx, verdict.method, height);
            } else {
                info!("- {} not yet confirmed via {}", tx, verdict.method);
            }
        }
    }

    Ok(())
}

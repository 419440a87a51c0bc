//! Configuration for the racer binary

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use flashrace::spoof::{DEFAULT_FLASHBLOCKS_DELAY, DEFAULT_NORMAL_DELAY, SpoofDelays};
use flashrace::{
    BlockTag, ConfirmationStrategy, EngineSettings, Lane, LaneStrategies, LaneTiming,
    PrivateKeySigner, RunDuration, TxHash,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Flashblocks Race
#[derive(Parser, Debug, Clone)]
#[command(name = "flashrace")]
#[command(about = "Race flashblocks confirmations against normal block confirmations", long_about = None)]
pub struct Config {
    /// Subcommand to run (defaults to `race`)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// JSON-RPC endpoint of the node
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:8545")]
    pub rpc_url: String,

    /// Hex private key that signs and pays for the self-transfers
    #[arg(long, env = "SIGNER_PRIVATE_KEY", hide_env_values = true)]
    pub signer_private_key: Option<PrivateKeySigner>,

    /// Fabricate transactions and confirmations locally instead of using the node
    #[arg(long, env = "SPOOF_MODE")]
    pub spoof: bool,

    /// Block tag the flashblocks lane scans
    #[arg(long, env = "FLASHBLOCKS_TAG", default_value = "pending")]
    pub flashblocks_tag: BlockTag,

    /// How the flashblocks lane detects confirmation
    #[arg(long, env = "FLASHBLOCKS_STRATEGY", value_enum, default_value_t = StrategyKind::BlockScan)]
    pub flashblocks_strategy: StrategyKind,

    /// How the normal lane detects confirmation (block scans use `latest`)
    #[arg(long, env = "NORMAL_STRATEGY", value_enum, default_value_t = StrategyKind::BlockScan)]
    pub normal_strategy: StrategyKind,

    /// Delay between confirmation checks in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "50")]
    pub poll_interval_ms: u64,

    /// Delay before retrying a failed send in milliseconds
    #[arg(long, env = "RETRY_BACKOFF_MS", default_value = "50")]
    pub retry_backoff_ms: u64,

    /// Synthetic flashblocks confirmation delay in spoof mode
    #[arg(long, env = "FLASHBLOCKS_SPOOF_DELAY_MS", default_value_t = DEFAULT_FLASHBLOCKS_DELAY.as_millis() as u64)]
    pub flashblocks_spoof_delay_ms: u64,

    /// Synthetic normal confirmation delay in spoof mode
    #[arg(long, env = "NORMAL_SPOOF_DELAY_MS", default_value_t = DEFAULT_NORMAL_DELAY.as_millis() as u64)]
    pub normal_spoof_delay_ms: u64,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run both lanes against each other for a fixed duration
    Race {
        /// Run length in seconds (1-60)
        #[arg(long, default_value = "10")]
        duration: RunDuration,
        /// Print every race event as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Show the signer's balance
    Wallet,
    /// Send a single self-transfer on one lane
    Send {
        #[arg(long)]
        lane: Lane,
    },
    /// Check a transaction once with a lane's strategy
    Confirm {
        #[arg(long)]
        lane: Lane,
        #[arg(long)]
        tx: TxHash,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    BlockScan,
    Receipt,
}

impl StrategyKind {
    fn with_tag(self, tag: BlockTag) -> ConfirmationStrategy {
        match self {
            StrategyKind::BlockScan => ConfirmationStrategy::BlockScan { tag },
            StrategyKind::Receipt => ConfirmationStrategy::receipt_poll(),
        }
    }
}

impl Config {
    /// Subcommand to run, `race` with defaults when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Race {
            duration: RunDuration::default(),
            json: false,
        })
    }

    pub fn to_settings(&self) -> Result<EngineSettings, ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("poll-interval-ms"));
        }

        Ok(EngineSettings {
            rpc_url: self.rpc_url.clone(),
            signer_key: self.signer_private_key.clone(),
            spoof: self.spoof,
            strategies: LaneStrategies {
                flashblocks: self.flashblocks_strategy.with_tag(self.flashblocks_tag),
                normal: self.normal_strategy.with_tag(BlockTag::Latest),
            },
            timing: LaneTiming {
                poll_interval: Duration::from_millis(self.poll_interval_ms),
                retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            },
            spoof_delays: SpoofDelays {
                flashblocks: Duration::from_millis(self.flashblocks_spoof_delay_ms),
                normal: Duration::from_millis(self.normal_spoof_delay_ms),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("flashrace").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_to_race() {
        let config = parse(&["--spoof"]);
        match config.command() {
            Command::Race { duration, json } => {
                assert_eq!(duration.as_duration(), Duration::from_secs(10));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn normal_lane_scans_latest() {
        let config = parse(&["--flashblocks-strategy", "receipt"]);
        let settings = config.to_settings().unwrap();
        assert_eq!(settings.strategies.flashblocks, ConfirmationStrategy::receipt_poll());
        assert_eq!(settings.strategies.normal, ConfirmationStrategy::latest_scan());
    }

    #[test]
    fn rejects_out_of_range_duration() {
        let args = ["flashrace", "race", "--duration", "61"];
        assert!(Config::try_parse_from(args).is_err());
    }

    #[test]
    fn private_key_sets_signer() {
        let config = parse(&[
            "--signer-private-key",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        ]);
        let key = config.to_settings().unwrap().signer_key.unwrap();
        let expected: flashrace::Address =
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(key.address(), expected);
    }

    #[test]
    fn malformed_private_key_is_rejected() {
        let args = ["flashrace", "--signer-private-key", "0x1234"];
        assert!(Config::try_parse_from(args).is_err());
    }

    #[test]
    fn private_key_env_value_is_hidden() {
        let command = <Config as clap::CommandFactory>::command();
        let arg = command
            .get_arguments()
            .find(|a| a.get_id() == "signer_private_key")
            .unwrap();
        assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new("SIGNER_PRIVATE_KEY")));
        assert!(arg.is_hide_env_values_set());
    }

    #[test]
    fn rejects_zero_poll_interval() {
        let config = parse(&["--poll-interval-ms", "0"]);
        assert!(config.to_settings().is_err());
    }
}

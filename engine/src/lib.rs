//! Flashrace
//!
//! Races two lanes of self-transfers against each other. Each lane keeps
//! sending a transaction and polling for it with its own confirmation
//! strategy; the flashblocks lane watches the pending block, the normal lane
//! waits for the transaction to show up the conventional way.
//!
//! ```text
//! RunController --token+deadline--> LaneLoop(flashblocks) --+
//!                                   LaneLoop(normal)      --+--> TransactionProvider
//!                                                               |- LiveProvider  (submitter + strategies)
//!                                                               '- SpoofProvider (synthetic timings)
//! ```

pub mod board;
pub mod controller;
pub mod events;
pub mod lane;
pub mod metrics;
pub mod provider;
pub mod rpc;
pub mod settings;
pub mod signer;
pub mod spoof;
pub mod strategy;
pub mod submitter;
pub mod types;

pub use alloy::signers::local::PrivateKeySigner;
pub use controller::{RunContext, RunController};
pub use events::{RaceEvent, RunToken, StopReason};
pub use lane::LaneTiming;
pub use metrics::RaceSummary;
pub use provider::{LiveProvider, SpoofProvider, TransactionProvider};
pub use settings::{EngineSettings, SettingsError};
pub use strategy::{ConfirmationStrategy, LaneStrategies};
pub use submitter::{SendError, TransactionSubmitter};
pub use types::{
    Address, BlockTag, Confirmation, ConfirmationMethod, Lane, LaneState, LaneStates, LaneStatus,
    RunDuration, TransactionHandle, TxHash, ValidationError, WalletSnapshot, U256,
};

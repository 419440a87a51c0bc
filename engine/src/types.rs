//! Types shared across the race engine
//!
//! Lanes, block tags and the per-lane state record. Anything parsed from
//! caller input (lane names, run durations) is validated here before it
//! reaches the engine. Chain primitives come from alloy.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

pub use alloy::primitives::utils::format_ether;
pub use alloy::primitives::{Address, TxHash, U256};

/// Errors for malformed caller input
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Unknown lane: {0} (expected 'flashblocks' or 'normal')")]
    UnknownLane(String),
    #[error("Invalid block tag: {0} (expected 'pending' or 'latest')")]
    InvalidBlockTag(String),
    #[error("Run duration must be between {min} and {max} seconds, got {got}")]
    DurationOutOfRange { min: f64, max: f64, got: f64 },
}

/// One of the two racing confirmation pipelines
#[repr(u8)]
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    /// Fast path, watches the pending block
    Flashblocks = 1,
    /// Baseline, conventional confirmation
    Normal = 2,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::Flashblocks, Lane::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Flashblocks => "flashblocks",
            Lane::Normal => "normal",
        }
    }

    /// Stable slot index for per-lane tables
    pub fn index(self) -> usize {
        match self {
            Lane::Flashblocks => 0,
            Lane::Normal => 1,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lane {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flashblocks" => Ok(Lane::Flashblocks),
            "normal" => Ok(Lane::Normal),
            _ => Err(ValidationError::UnknownLane(s.to_string())),
        }
    }
}

/// Block tag accepted by `eth_getBlockByNumber` and friends
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    Pending,
    Latest,
}

impl BlockTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockTag::Pending => "pending",
            BlockTag::Latest => "latest",
        }
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockTag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(BlockTag::Pending),
            "latest" => Ok(BlockTag::Latest),
            _ => Err(ValidationError::InvalidBlockTag(s.to_string())),
        }
    }
}

/// Shortened address for logs, e.g. `0x1234…abcd`
pub fn mask_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

/// Validated run length
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunDuration(Duration);

impl RunDuration {
    pub const MIN_SECS: f64 = 1.0;
    pub const MAX_SECS: f64 = 60.0;

    /// Accepts finite values in `[MIN_SECS, MAX_SECS]`
    pub fn from_secs_f64(secs: f64) -> Result<Self, ValidationError> {
        if !secs.is_finite() || secs < Self::MIN_SECS || secs > Self::MAX_SECS {
            return Err(ValidationError::DurationOutOfRange {
                min: Self::MIN_SECS,
                max: Self::MAX_SECS,
                got: secs,
            });
        }
        Ok(Self(Duration::from_secs_f64(secs)))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Default for RunDuration {
    fn default() -> Self {
        Self(Duration::from_secs(10))
    }
}

impl FromStr for RunDuration {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs: f64 = s.trim().parse().map_err(|_| ValidationError::DurationOutOfRange {
            min: Self::MIN_SECS,
            max: Self::MAX_SECS,
            got: f64::NAN,
        })?;
        Self::from_secs_f64(secs)
    }
}

/// The result of one send: the transaction and who sent it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHandle {
    pub transaction_id: TxHash,
    pub from_address: Address,
}

/// Which check observed a confirmation
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationMethod {
    PendingBlock,
    LatestBlock,
    Receipt,
}

impl ConfirmationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationMethod::PendingBlock => "pending-block",
            ConfirmationMethod::LatestBlock => "latest-block",
            ConfirmationMethod::Receipt => "receipt",
        }
    }
}

impl fmt::Display for ConfirmationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict of a single confirmation check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub confirmed: bool,
    pub method: ConfirmationMethod,
    pub block_height: Option<u64>,
}

impl Confirmation {
    pub fn pending(method: ConfirmationMethod) -> Self {
        Self {
            confirmed: false,
            method,
            block_height: None,
        }
    }
}

/// Lane status
///
/// ```text
/// idle -> sending -> waiting -> confirmed -> sending ...
///           |  ^
///           v  |
///          error          stopped (forced by the controller)
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneStatus {
    #[default]
    Idle,
    Sending,
    Waiting,
    Confirmed,
    Error,
    Stopped,
}

impl fmt::Display for LaneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LaneStatus::Idle => "idle",
            LaneStatus::Sending => "sending",
            LaneStatus::Waiting => "waiting",
            LaneStatus::Confirmed => "confirmed",
            LaneStatus::Error => "error",
            LaneStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Observable state of one lane during a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneState {
    pub status: LaneStatus,
    pub sends_attempted: u64,
    pub confirmations_observed: u64,
    pub latest_latency_ms: Option<f64>,
    pub average_latency_ms: Option<f64>,
    pub last_confirmation_method: Option<ConfirmationMethod>,
    pub last_error: Option<String>,
    /// Hash of the most recent send
    pub last_transaction: Option<TxHash>,
    /// Block height reported by the last confirmation, when known
    pub last_block_height: Option<u64>,
}

/// Both lanes at one instant
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LaneStates {
    pub flashblocks: LaneState,
    pub normal: LaneState,
}

impl LaneStates {
    pub fn get(&self, lane: Lane) -> &LaneState {
        match lane {
            Lane::Flashblocks => &self.flashblocks,
            Lane::Normal => &self.normal,
        }
    }
}

/// Informational wallet view for callers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSnapshot {
    pub address: Address,
    pub balance_wei: U256,
    pub balance_eth: String,
    pub spoof_mode: bool,
    pub available: bool,
}

//! Race events
//!
//! Lifecycle and lane updates fan out over a tokio broadcast channel.
//! `RunController::start` hands back a receiver for the run it started.

use serde::{Deserialize, Serialize};

use crate::metrics::RaceSummary;
use crate::types::{Lane, LaneState};

/// Events buffered per subscriber before slow readers start lagging
pub const EVENT_CHANNEL_SIZE: usize = 512;

/// Identifies one run. Strictly increasing; only the newest is ever live.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunToken(pub u64);

impl std::fmt::Display for RunToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a run ended
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StopReason {
    /// `stop()` was called
    Manual,
    /// The run reached its deadline
    Timeout,
    /// A lane's send failed for lack of funds; fatal to the whole run
    InsufficientFunds { lane: Lane, message: String },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Manual => write!(f, "stopped"),
            StopReason::Timeout => write!(f, "timed out"),
            StopReason::InsufficientFunds { lane, message } => {
                write!(f, "insufficient funds on {} lane: {}", lane, message)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RaceEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted { token: RunToken, duration_ms: u64 },
    #[serde(rename_all = "camelCase")]
    LaneUpdated {
        token: RunToken,
        lane: Lane,
        state: LaneState,
    },
    #[serde(rename_all = "camelCase")]
    RunStopped {
        token: RunToken,
        reason: StopReason,
        summary: RaceSummary,
    },
}

impl RaceEvent {
    pub fn token(&self) -> RunToken {
        match self {
            RaceEvent::RunStarted { token, .. }
            | RaceEvent::LaneUpdated { token, .. }
            | RaceEvent::RunStopped { token, .. } => *token,
        }
    }
}

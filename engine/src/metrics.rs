//! Lane metrics
//!
//! Cumulative latency figures per lane, reset only when a run starts, and the
//! summary logged when a run ends.

use serde::{Deserialize, Serialize};

use crate::types::{Lane, LaneState, LaneStates};

/// Fold one confirmed cycle into `state`
pub fn record_confirmation(state: &mut LaneState, latency_ms: f64) {
    let count = state.confirmations_observed as f64;
    let average = match state.average_latency_ms {
        Some(avg) => (avg * count + latency_ms) / (count + 1.0),
        None => latency_ms,
    };
    state.latest_latency_ms = Some(latency_ms);
    state.average_latency_ms = Some(average);
    state.confirmations_observed += 1;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneSummary {
    pub sends_attempted: u64,
    pub confirmations: u64,
    pub average_latency_ms: Option<f64>,
    pub latest_latency_ms: Option<f64>,
}

impl From<&LaneState> for LaneSummary {
    fn from(state: &LaneState) -> Self {
        Self {
            sends_attempted: state.sends_attempted,
            confirmations: state.confirmations_observed,
            average_latency_ms: state.average_latency_ms,
            latest_latency_ms: state.latest_latency_ms,
        }
    }
}

/// End-of-run statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSummary {
    pub elapsed_ms: u64,
    pub flashblocks: LaneSummary,
    pub normal: LaneSummary,
}

impl RaceSummary {
    pub fn from_lanes(lanes: &LaneStates, elapsed_ms: u64) -> Self {
        Self {
            elapsed_ms,
            flashblocks: LaneSummary::from(&lanes.flashblocks),
            normal: LaneSummary::from(&lanes.normal),
        }
    }

    pub fn lane(&self, lane: Lane) -> &LaneSummary {
        match lane {
            Lane::Flashblocks => &self.flashblocks,
            Lane::Normal => &self.normal,
        }
    }

    /// Lane with strictly more confirmations, `None` on a tie
    pub fn leader(&self) -> Option<Lane> {
        use std::cmp::Ordering;
        match self.flashblocks.confirmations.cmp(&self.normal.confirmations) {
            Ordering::Greater => Some(Lane::Flashblocks),
            Ordering::Less => Some(Lane::Normal),
            Ordering::Equal => None,
        }
    }

    /// How many times faster the flashblocks lane confirmed on average
    pub fn speedup(&self) -> Option<f64> {
        let fast = self.flashblocks.average_latency_ms?;
        let slow = self.normal.average_latency_ms?;
        if fast <= 0.0 {
            return None;
        }
        Some(slow / fast)
    }

    pub fn log_summary(&self) {
        let fmt_ms = |v: Option<f64>| match v {
            Some(ms) => format!("{:.1}ms", ms),
            None => "N/A".to_string(),
        };

        tracing::info!("[Stats] Run lasted {:.2}s", self.elapsed_ms as f64 / 1000.0);
        for lane in Lane::ALL {
            let s = self.lane(lane);
            tracing::info!(
                "        {:<11} {} sent, {} confirmed (avg {}, last {})",
                lane.as_str(),
                s.sends_attempted,
                s.confirmations,
                fmt_ms(s.average_latency_ms),
                fmt_ms(s.latest_latency_ms)
            );
        }
        match (self.leader(), self.speedup()) {
            (Some(lane), Some(x)) => tracing::info!("        Leader: {} ({:.2}x speedup)", lane, x),
            (Some(lane), None) => tracing::info!("        Leader: {}", lane),
            (None, _) => tracing::info!("        Leader: tie"),
        }
    }
}

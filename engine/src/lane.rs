//! Lane Loop
//!
//! Drives one lane's send -> wait -> confirm cycle until its run is no longer
//! live. Every resumption re-checks the run context before touching anything:
//! a stale lane exits silently, it never writes `stopped` itself.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::board::LaneBoard;
use crate::controller::RunContext;
use crate::events::StopReason;
use crate::provider::TransactionProvider;
use crate::submitter::SendError;
use crate::types::{Lane, LaneStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaneTiming {
    /// Delay between confirmation checks
    pub poll_interval: Duration,
    /// Fixed delay before retrying a failed send
    pub retry_backoff: Duration,
}

impl Default for LaneTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// How a cycle that did not end the lane finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CycleOutcome {
    Confirmed,
    SendFailed,
}

/// Per-lane cycle counts for the end-of-run log line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CycleTally {
    confirmed: u64,
    failed_sends: u64,
}

impl CycleTally {
    fn record(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Confirmed => self.confirmed += 1,
            CycleOutcome::SendFailed => self.failed_sends += 1,
        }
    }
}

/// Run `lane` until its run ends
pub async fn run(
    ctx: RunContext,
    lane: Lane,
    provider: Arc<dyn TransactionProvider>,
    board: Arc<LaneBoard>,
    timing: LaneTiming,
) {
    debug!("[Lane {}] Starting for run {}", lane, ctx.token());

    let mut tally = CycleTally::default();
    while ctx.is_live() {
        match run_cycle(&ctx, lane, provider.as_ref(), &board, &timing).await {
            ControlFlow::Continue(outcome) => tally.record(outcome),
            ControlFlow::Break(()) => break,
        }
    }

    debug!(
        "[Lane {}] Run {} over after {} confirmed cycles, {} failed sends",
        lane,
        ctx.token(),
        tally.confirmed,
        tally.failed_sends
    );
}

async fn run_cycle(
    ctx: &RunContext,
    lane: Lane,
    provider: &dyn TransactionProvider,
    board: &LaneBoard,
    timing: &LaneTiming,
) -> ControlFlow<(), CycleOutcome> {
    let cycle_start = Instant::now();

    let entered = board
        .update(ctx, lane, |s| {
            s.status = LaneStatus::Sending;
            s.sends_attempted += 1;
            s.last_error = None;
        })
        .await;
    if !entered {
        return ControlFlow::Break(());
    }

    let handle = match provider.send(lane).await {
        Ok(handle) => handle,
        Err(e) => return on_send_failure(ctx, lane, board, timing, e).await,
    };

    if !board.begin_wait(ctx, lane, handle).await {
        return ControlFlow::Break(());
    }
    debug!("[Lane {}] Waiting on {}", lane, handle.transaction_id);

    let confirmation = loop {
        if !ctx.is_live() {
            return ControlFlow::Break(());
        }

        // Missed polls are expected; try again next tick
        match provider.confirm(lane, &handle.transaction_id).await {
            Ok(c) if c.confirmed => break c,
            Ok(_) => {}
            Err(e) => debug!("[Lane {}] Poll failed for {}: {}", lane, handle.transaction_id, e),
        }

        if !ctx.is_live() {
            return ControlFlow::Break(());
        }
        sleep(timing.poll_interval).await;
    };

    let latency_ms = cycle_start.elapsed().as_secs_f64() * 1000.0;
    if !board.complete(ctx, lane, latency_ms, &confirmation).await {
        return ControlFlow::Break(());
    }

    info!(
        "[Lane {}] Confirmed {} in {:.0}ms via {}",
        lane, handle.transaction_id, latency_ms, confirmation.method
    );
    ControlFlow::Continue(CycleOutcome::Confirmed)
}

async fn on_send_failure(
    ctx: &RunContext,
    lane: Lane,
    board: &LaneBoard,
    timing: &LaneTiming,
    err: SendError,
) -> ControlFlow<(), CycleOutcome> {
    if !ctx.is_live() {
        return ControlFlow::Break(());
    }

    let message = err.to_string();
    let recorded = board
        .update(ctx, lane, |s| {
            s.status = LaneStatus::Error;
            s.last_error = Some(message.clone());
        })
        .await;
    if !recorded {
        return ControlFlow::Break(());
    }

    if err.is_insufficient_funds() {
        error!("[Lane {}] Out of funds, halting run {}: {}", lane, ctx.token(), message);
        ctx.request_halt(StopReason::InsufficientFunds { lane, message });
        return ControlFlow::Break(());
    }

    warn!(
        "[Lane {}] Send failed, retrying in {}ms: {}",
        lane,
        timing.retry_backoff.as_millis(),
        message
    );
    sleep(timing.retry_backoff).await;
    ControlFlow::Continue(CycleOutcome::SendFailed)
}

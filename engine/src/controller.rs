//! Run Controller
//!
//! Owns the run lifecycle. Each run gets a fresh [`RunToken`] and deadline;
//! lanes receive both by value inside a [`RunContext`] and re-check it after
//! every suspension point. Stopping a run is just invalidating its token, then
//! cleaning up:
//!
//! ```text
//! start(d) -> token++, reset lanes, spawn 2 lanes + watchdog
//! watchdog -> deadline reached        -> halt(Timeout)
//!          -> lane reports no funds   -> halt(InsufficientFunds)
//! stop()   -> token++, abort tasks, lanes = stopped, RunStopped event
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::board::LaneBoard;
use crate::events::{RaceEvent, RunToken, StopReason, EVENT_CHANNEL_SIZE};
use crate::lane::{self, LaneTiming};
use crate::metrics::RaceSummary;
use crate::provider::TransactionProvider;
use crate::types::{Lane, LaneStates, RunDuration};

/// Halt requests buffered per run; one per lane is all that can arrive
const HALT_CHANNEL_SIZE: usize = 4;

/// The current token and its deadline, shared by the controller and every lane
#[derive(Debug)]
pub struct RunGate {
    current: AtomicU64,
    /// Deadline of the current token; `None` once that token is invalidated
    deadline: StdMutex<Option<Instant>>,
}

impl RunGate {
    fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
            deadline: StdMutex::new(None),
        }
    }

    fn lock_deadline(&self) -> MutexGuard<'_, Option<Instant>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> RunToken {
        RunToken(self.current.load(Ordering::SeqCst))
    }

    /// Invalidate every token issued so far and return the new, never-live one
    fn advance(&self) -> RunToken {
        let mut deadline = self.lock_deadline();
        *deadline = None;
        RunToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Invalidate every token issued so far and issue one live until `deadline`
    fn begin(&self, until: Instant) -> RunToken {
        let mut deadline = self.lock_deadline();
        *deadline = Some(until);
        RunToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_live(&self, token: RunToken) -> bool {
        // Token and deadline are read under the same lock that writes them
        let deadline = self.lock_deadline();
        let live = self.current() == token && matches!(*deadline, Some(d) if Instant::now() < d);
        live
    }
}

/// Everything a lane needs to know about the run it belongs to
#[derive(Clone, Debug)]
pub struct RunContext {
    token: RunToken,
    deadline: Instant,
    gate: Arc<RunGate>,
    halt: mpsc::Sender<StopReason>,
}

impl RunContext {
    pub fn token(&self) -> RunToken {
        self.token
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Our token is current and the deadline has not passed
    pub fn is_live(&self) -> bool {
        self.gate.is_live(self.token)
    }

    /// Ask the controller to end this run
    pub fn request_halt(&self, reason: StopReason) {
        if let Err(e) = self.halt.try_send(reason) {
            debug!("[RunController] Halt request for run {} dropped: {}", self.token, e);
        }
    }
}

struct ActiveRun {
    token: RunToken,
    started_at: Instant,
    lanes: Vec<JoinHandle<()>>,
    watchdog: JoinHandle<()>,
}

impl ActiveRun {
    fn abort(&self) {
        self.watchdog.abort();
        for lane in &self.lanes {
            lane.abort();
        }
    }
}

struct ControllerInner {
    gate: Arc<RunGate>,
    board: Arc<LaneBoard>,
    provider: Arc<dyn TransactionProvider>,
    timing: LaneTiming,
    events: broadcast::Sender<RaceEvent>,
    run: Mutex<Option<ActiveRun>>,
}

impl ControllerInner {
    /// Stop from inside a run; ignored once `token` is no longer the active run
    async fn halt(&self, token: RunToken, reason: StopReason) {
        let mut run = self.run.lock().await;
        match run.as_ref() {
            Some(active) if active.token == token => {}
            _ => {
                debug!("[RunController] Ignoring stale halt for run {} ({})", token, reason);
                return;
            }
        }
        self.finish(&mut run, reason).await;
    }

    async fn finish(&self, run: &mut Option<ActiveRun>, reason: StopReason) -> Option<RaceSummary> {
        // Invalidate first so nothing new is issued while we clean up
        let invalidated_by = self.gate.advance();

        let active = match run.take() {
            Some(active) => active,
            None => {
                debug!("[RunController] No active run, token now {}", invalidated_by);
                return None;
            }
        };

        active.abort();
        self.board.force_stopped(active.token).await;

        let elapsed_ms = active.started_at.elapsed().as_millis() as u64;
        let summary = RaceSummary::from_lanes(&self.board.snapshot().await, elapsed_ms);

        match &reason {
            StopReason::InsufficientFunds { .. } => {
                error!("[RunController] Run {} halted: {}", active.token, reason)
            }
            _ => info!("[RunController] Run {} {}", active.token, reason),
        }
        summary.log_summary();

        let _ = self.events.send(RaceEvent::RunStopped {
            token: active.token,
            reason,
            summary: summary.clone(),
        });

        // Aborted tasks resolve as cancelled; wait so nothing outlives stop()
        futures::future::join_all(active.lanes).await;

        Some(summary)
    }
}

pub struct RunController {
    inner: Arc<ControllerInner>,
}

impl RunController {
    pub fn new(provider: Arc<dyn TransactionProvider>, timing: LaneTiming) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(ControllerInner {
                gate: Arc::new(RunGate::new()),
                board: Arc::new(LaneBoard::new(events.clone())),
                provider,
                timing,
                events,
                run: Mutex::new(None),
            }),
        }
    }

    pub fn provider(&self) -> &Arc<dyn TransactionProvider> {
        &self.inner.provider
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RaceEvent> {
        self.inner.events.subscribe()
    }

    pub fn current_token(&self) -> RunToken {
        self.inner.gate.current()
    }

    /// `token` is the current run and its deadline has not passed
    pub fn is_live(&self, token: RunToken) -> bool {
        self.inner.gate.is_live(token)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.run.lock().await.is_some()
    }

    pub async fn snapshot(&self) -> LaneStates {
        self.inner.board.snapshot().await
    }

    /// Start a run, superseding any run still going.
    /// The returned receiver sees every event of the new run.
    pub async fn start(&self, duration: RunDuration) -> broadcast::Receiver<RaceEvent> {
        let mut run = self.inner.run.lock().await;

        let duration = duration.as_duration();
        let started_at = Instant::now();
        let deadline = started_at + duration;

        let token = self.inner.gate.begin(deadline);
        if let Some(previous) = run.take() {
            info!("[RunController] Run {} superseded by {}", previous.token, token);
            previous.abort();
        }

        let rx = self.inner.events.subscribe();
        self.inner.board.reset(token).await;

        let (halt_tx, halt_rx) = mpsc::channel(HALT_CHANNEL_SIZE);
        let ctx = RunContext {
            token,
            deadline,
            gate: self.inner.gate.clone(),
            halt: halt_tx,
        };

        let _ = self.inner.events.send(RaceEvent::RunStarted {
            token,
            duration_ms: duration.as_millis() as u64,
        });
        info!(
            "[RunController] Run {} started for {:.1}s ({})",
            token,
            duration.as_secs_f64(),
            if self.inner.provider.is_spoof() { "spoof" } else { "live" }
        );

        let lanes = Lane::ALL
            .iter()
            .map(|&lane| {
                tokio::spawn(lane::run(
                    ctx.clone(),
                    lane,
                    self.inner.provider.clone(),
                    self.inner.board.clone(),
                    self.inner.timing,
                ))
            })
            .collect();
        // Lanes own the only halt senders from here on
        drop(ctx);

        let watchdog = tokio::spawn(watch(self.inner.clone(), token, deadline, halt_rx));

        *run = Some(ActiveRun {
            token,
            started_at,
            lanes,
            watchdog,
        });

        rx
    }

    /// Stop the current run. Idempotent; with no run active it only invalidates the token.
    pub async fn stop(&self) -> Option<RaceSummary> {
        let mut run = self.inner.run.lock().await;
        self.inner.finish(&mut run, StopReason::Manual).await
    }
}

async fn watch(
    inner: Arc<ControllerInner>,
    token: RunToken,
    deadline: Instant,
    mut halt_rx: mpsc::Receiver<StopReason>,
) {
    let reason = tokio::select! {
        _ = sleep_until(deadline) => StopReason::Timeout,
        Some(reason) = halt_rx.recv() => reason,
    };

    // Finishing aborts this task, so hand it off
    tokio::spawn(async move {
        inner.halt(token, reason).await;
    });
}

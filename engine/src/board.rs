//! Lane board
//!
//! Per-lane state shared between the lane loops, the controller and readers.
//! Lane writes are gated: the run context is re-checked while the lane's lock
//! is held, so once the controller has invalidated a token and written
//! `stopped`, no late write from that run can land on top of it.

use tokio::sync::{broadcast, RwLock};

use crate::controller::RunContext;
use crate::events::{RaceEvent, RunToken};
use crate::metrics::record_confirmation;
use crate::types::{Confirmation, Lane, LaneState, LaneStates, LaneStatus, TransactionHandle};

#[derive(Debug, Default)]
struct LaneSlot {
    state: LaneState,
    /// Transaction the lane is currently waiting on
    in_flight: Option<TransactionHandle>,
}

pub struct LaneBoard {
    lanes: [RwLock<LaneSlot>; 2],
    events: broadcast::Sender<RaceEvent>,
}

impl LaneBoard {
    pub fn new(events: broadcast::Sender<RaceEvent>) -> Self {
        Self {
            lanes: [RwLock::new(LaneSlot::default()), RwLock::new(LaneSlot::default())],
            events,
        }
    }

    fn slot(&self, lane: Lane) -> &RwLock<LaneSlot> {
        &self.lanes[lane.index()]
    }

    fn publish(&self, token: RunToken, lane: Lane, state: &LaneState) {
        // No subscribers is fine
        let _ = self.events.send(RaceEvent::LaneUpdated {
            token,
            lane,
            state: state.clone(),
        });
    }

    async fn update_slot<F>(&self, ctx: &RunContext, lane: Lane, f: F) -> bool
    where
        F: FnOnce(&mut LaneSlot),
    {
        let mut slot = self.slot(lane).write().await;
        if !ctx.is_live() {
            return false;
        }
        f(&mut *slot);
        self.publish(ctx.token(), lane, &slot.state);
        true
    }

    /// Apply `f` to the lane state if the run is still live.
    /// Returns false (and changes nothing) otherwise.
    pub async fn update<F>(&self, ctx: &RunContext, lane: Lane, f: F) -> bool
    where
        F: FnOnce(&mut LaneState),
    {
        self.update_slot(ctx, lane, |slot| f(&mut slot.state)).await
    }

    /// Enter `waiting` on `handle`
    pub async fn begin_wait(&self, ctx: &RunContext, lane: Lane, handle: TransactionHandle) -> bool {
        self.update_slot(ctx, lane, |slot| {
            slot.state.status = LaneStatus::Waiting;
            slot.state.last_transaction = Some(handle.transaction_id);
            slot.in_flight = Some(handle);
        })
        .await
    }

    /// Enter `confirmed` and fold the cycle latency into the lane metrics
    pub async fn complete(
        &self,
        ctx: &RunContext,
        lane: Lane,
        latency_ms: f64,
        confirmation: &Confirmation,
    ) -> bool {
        self.update_slot(ctx, lane, |slot| {
            slot.state.status = LaneStatus::Confirmed;
            record_confirmation(&mut slot.state, latency_ms);
            slot.state.last_confirmation_method = Some(confirmation.method);
            slot.state.last_block_height = confirmation.block_height;
            slot.in_flight = None;
        })
        .await
    }

    /// Back to the idle baseline for a new run
    pub async fn reset(&self, token: RunToken) {
        for lane in Lane::ALL {
            let mut slot = self.slot(lane).write().await;
            *slot = LaneSlot::default();
            self.publish(token, lane, &slot.state);
        }
    }

    /// Terminal state written by the controller only
    pub async fn force_stopped(&self, token: RunToken) {
        for lane in Lane::ALL {
            let mut slot = self.slot(lane).write().await;
            slot.state.status = LaneStatus::Stopped;
            slot.in_flight = None;
            self.publish(token, lane, &slot.state);
        }
    }

    pub async fn state(&self, lane: Lane) -> LaneState {
        self.slot(lane).read().await.state.clone()
    }

    pub async fn snapshot(&self) -> LaneStates {
        LaneStates {
            flashblocks: self.state(Lane::Flashblocks).await,
            normal: self.state(Lane::Normal).await,
        }
    }

    pub async fn in_flight(&self, lane: Lane) -> Option<TransactionHandle> {
        self.slot(lane).read().await.in_flight
    }
}

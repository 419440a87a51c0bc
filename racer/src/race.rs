//! Race command
//!
//! Starts one run and follows its events until it stops, either on its own
//! (deadline, out of funds) or because Ctrl-C was pressed.

use std::sync::Arc;

use flashrace::types::mask_address;
use flashrace::{
    LaneStatus, LaneTiming, RaceEvent, RaceSummary, RunController, RunDuration,
    TransactionProvider,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

pub async fn run(
    provider: Arc<dyn TransactionProvider>,
    timing: LaneTiming,
    duration: RunDuration,
    json: bool,
) -> Result<RaceSummary, Box<dyn std::error::Error>> {
    let wallet = provider.wallet_snapshot().await;
    info!(
        "[Race] Signer {} balance {} ETH{}",
        mask_address(&wallet.address),
        if wallet.available { wallet.balance_eth.as_str() } else { "?" },
        if wallet.spoof_mode { " (spoof)" } else { "" }
    );

    let controller = RunController::new(provider, timing);
    let mut events = controller.start(duration).await;
    let mut stopping = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if json {
                        println!("{}", serde_json::to_string(&event)?);
                    } else {
                        log_event(&event);
                    }
                    if let RaceEvent::RunStopped { summary, .. } = event {
                        return Ok(summary);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[Race] Output fell behind, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return Err("race event stream closed".into()),
            },
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!("[Race] Ctrl-C received, stopping");
                stopping = true;
                // RunStopped is already queued on `events` once this returns
                controller.stop().await;
            }
        }
    }
}

fn log_event(event: &RaceEvent) {
    match event {
        RaceEvent::RunStarted { token, duration_ms } => {
            info!("[Race] Run {} started ({}ms)", token, duration_ms);
        }
        RaceEvent::LaneUpdated { lane, state, .. } if state.status == LaneStatus::Error => {
            if let Some(err) = &state.last_error {
                warn!("[Race] {} lane error: {}", lane, err);
            }
        }
        RaceEvent::LaneUpdated { .. } => {}
        RaceEvent::RunStopped { token, reason, .. } => {
            info!("[Race] Run {} ended: {}", token, reason);
        }
    }
}

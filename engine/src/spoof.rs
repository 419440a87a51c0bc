//! Spoof Engine
//!
//! Offline stand-in for the chain. A send fabricates a transaction hash that
//! carries the lane and the creation time, so confirming it later needs no
//! stored state: decode the hash, compare the elapsed time with the lane's
//! delay.
//!
//! Hash layout (32 bytes):
//! ```text
//! [0..4)   magic "spof"
//! [4]      lane tag
//! [5..8)   zero
//! [8..16)  creation time, unix ms, big endian
//! [16..24) per-engine sequence, big endian
//! [24..32) zero
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytemuck_derive::{Pod, Zeroable};
use tokio::time::Instant;

use crate::strategy::LaneStrategies;
use crate::types::{Address, Confirmation, Lane, TransactionHandle, TxHash};

pub const SPOOF_MAGIC: [u8; 4] = *b"spof";

/// Default per-lane delays before a spoofed send counts as confirmed
pub const DEFAULT_FLASHBLOCKS_DELAY: Duration = Duration::from_millis(800);
pub const DEFAULT_NORMAL_DELAY: Duration = Duration::from_millis(2_500);

/// Decoded form of a spoofed transaction hash
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct SpoofRecord {
    magic: [u8; 4],
    lane: u8,
    _padding: [u8; 3],
    created_ms: [u8; 8],
    sequence: [u8; 8],
    _reserved: [u8; 8],
}

impl SpoofRecord {
    pub fn new(lane: Lane, created_ms: u64, sequence: u64) -> Self {
        Self {
            magic: SPOOF_MAGIC,
            lane: lane.into(),
            _padding: [0; 3],
            created_ms: created_ms.to_be_bytes(),
            sequence: sequence.to_be_bytes(),
            _reserved: [0; 8],
        }
    }

    /// Recover a record from a hash; `None` if it was not produced by a spoof engine
    pub fn decode(tx: &TxHash) -> Option<Self> {
        let record: SpoofRecord = bytemuck::pod_read_unaligned(&tx.0);
        if record.magic != SPOOF_MAGIC || Lane::try_from(record.lane).is_err() {
            return None;
        }
        Some(record)
    }

    pub fn to_tx_hash(&self) -> TxHash {
        let mut out = [0u8; 32];
        out.copy_from_slice(bytemuck::bytes_of(self));
        TxHash::from(out)
    }

    pub fn lane(&self) -> Option<Lane> {
        Lane::try_from(self.lane).ok()
    }

    pub fn created_ms(&self) -> u64 {
        u64::from_be_bytes(self.created_ms)
    }

    pub fn sequence(&self) -> u64 {
        u64::from_be_bytes(self.sequence)
    }
}

/// Per-lane confirmation delays
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpoofDelays {
    pub flashblocks: Duration,
    pub normal: Duration,
}

impl Default for SpoofDelays {
    fn default() -> Self {
        Self {
            flashblocks: DEFAULT_FLASHBLOCKS_DELAY,
            normal: DEFAULT_NORMAL_DELAY,
        }
    }
}

impl SpoofDelays {
    pub fn for_lane(&self, lane: Lane) -> Duration {
        match lane {
            Lane::Flashblocks => self.flashblocks,
            Lane::Normal => self.normal,
        }
    }
}

/// Wall-clock milliseconds that advance with tokio's clock, so paused-time
/// tests move it along with every other timer.
#[derive(Clone, Copy, Debug)]
struct SpoofClock {
    anchor_ms: u64,
    anchor: Instant,
}

impl SpoofClock {
    fn new() -> Self {
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            anchor_ms,
            anchor: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.anchor_ms + self.anchor.elapsed().as_millis() as u64
    }
}

pub struct SpoofEngine {
    delays: SpoofDelays,
    strategies: LaneStrategies,
    from_address: Address,
    clock: SpoofClock,
    sequence: AtomicU64,
}

impl SpoofEngine {
    pub fn new(delays: SpoofDelays, strategies: LaneStrategies, from_address: Address) -> Self {
        Self {
            delays,
            strategies,
            from_address,
            clock: SpoofClock::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn from_address(&self) -> Address {
        self.from_address
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn submit(&self, lane: Lane) -> TransactionHandle {
        self.submit_at(lane, self.now_ms())
    }

    /// Fabricate a handle as if sent at `now_ms`
    pub fn submit_at(&self, lane: Lane, now_ms: u64) -> TransactionHandle {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        TransactionHandle {
            transaction_id: SpoofRecord::new(lane, now_ms, sequence).to_tx_hash(),
            from_address: self.from_address,
        }
    }

    pub fn confirm(&self, lane: Lane, tx: &TxHash) -> Confirmation {
        self.confirm_at(lane, tx, self.now_ms())
    }

    /// Verdict for `tx` as checked by `lane` at `now_ms`
    pub fn confirm_at(&self, lane: Lane, tx: &TxHash, now_ms: u64) -> Confirmation {
        let method = self.strategies.for_lane(lane).method();

        let record = match SpoofRecord::decode(tx) {
            Some(r) if r.lane() == Some(lane) => r,
            _ => return Confirmation::pending(method),
        };

        let elapsed_ms = now_ms.saturating_sub(record.created_ms());
        let delay_ms = self.delays.for_lane(lane).as_millis() as u64;
        if elapsed_ms >= delay_ms {
            Confirmation {
                confirmed: true,
                method,
                block_height: None,
            }
        } else {
            Confirmation::pending(method)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_is_32_bytes() {
        assert_eq!(std::mem::size_of::<SpoofRecord>(), 32);
    }

    #[test]
    fn decode_recovers_lane_and_time() {
        let record = SpoofRecord::new(Lane::Normal, 1_700_000_000_123, 9);
        let decoded = SpoofRecord::decode(&record.to_tx_hash()).unwrap();
        assert_eq!(decoded.lane(), Some(Lane::Normal));
        assert_eq!(decoded.created_ms(), 1_700_000_000_123);
        assert_eq!(decoded.sequence(), 9);
    }

    #[test]
    fn foreign_hashes_do_not_decode() {
        assert!(SpoofRecord::decode(&TxHash::repeat_byte(0xab)).is_none());

        let mut bytes = SpoofRecord::new(Lane::Flashblocks, 1, 1).to_tx_hash().0;
        bytes[4] = 77;
        assert!(SpoofRecord::decode(&TxHash::from(bytes)).is_none());
    }
}

//! Transaction providers
//!
//! The lanes only see [`TransactionProvider`]. Which implementation backs it
//! (live node or spoof engine) is decided once at startup.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::rpc::{ChainClient, RpcError};
use crate::spoof::SpoofEngine;
use crate::strategy::LaneStrategies;
use crate::submitter::{SendError, TransactionSubmitter};
use crate::types::{
    format_ether, mask_address, Confirmation, Lane, TransactionHandle, TxHash, WalletSnapshot, U256,
};

#[async_trait]
pub trait TransactionProvider: Send + Sync {
    fn is_spoof(&self) -> bool;

    /// Issue one transaction for `lane`
    async fn send(&self, lane: Lane) -> Result<TransactionHandle, SendError>;

    /// Check `tx` once using `lane`'s strategy
    async fn confirm(&self, lane: Lane, tx: &TxHash) -> Result<Confirmation, RpcError>;

    async fn wallet_snapshot(&self) -> WalletSnapshot;
}

/// Real node, real signer
pub struct LiveProvider {
    chain: Arc<dyn ChainClient>,
    submitter: Arc<TransactionSubmitter>,
    strategies: LaneStrategies,
}

impl LiveProvider {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        submitter: Arc<TransactionSubmitter>,
        strategies: LaneStrategies,
    ) -> Self {
        Self {
            chain,
            submitter,
            strategies,
        }
    }

    pub fn submitter(&self) -> &Arc<TransactionSubmitter> {
        &self.submitter
    }
}

#[async_trait]
impl TransactionProvider for LiveProvider {
    fn is_spoof(&self) -> bool {
        false
    }

    async fn send(&self, lane: Lane) -> Result<TransactionHandle, SendError> {
        self.submitter.submit(lane).await
    }

    async fn confirm(&self, lane: Lane, tx: &TxHash) -> Result<Confirmation, RpcError> {
        self.strategies
            .for_lane(lane)
            .check(self.chain.as_ref(), tx)
            .await
    }

    async fn wallet_snapshot(&self) -> WalletSnapshot {
        let address = self.submitter.address();
        match self.chain.balance(&address).await {
            Ok(balance_wei) => WalletSnapshot {
                address,
                balance_wei,
                balance_eth: format_ether(balance_wei),
                spoof_mode: false,
                available: true,
            },
            Err(e) => {
                warn!("[Wallet] Failed to read balance for {}: {}", mask_address(&address), e);
                WalletSnapshot {
                    address,
                    balance_wei: U256::ZERO,
                    balance_eth: format_ether(U256::ZERO),
                    spoof_mode: false,
                    available: false,
                }
            }
        }
    }
}

/// No network, synthetic timings
pub struct SpoofProvider {
    engine: SpoofEngine,
}

impl SpoofProvider {
    pub fn new(engine: SpoofEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SpoofEngine {
        &self.engine
    }
}

#[async_trait]
impl TransactionProvider for SpoofProvider {
    fn is_spoof(&self) -> bool {
        true
    }

    async fn send(&self, lane: Lane) -> Result<TransactionHandle, SendError> {
        Ok(self.engine.submit(lane))
    }

    async fn confirm(&self, lane: Lane, tx: &TxHash) -> Result<Confirmation, RpcError> {
        Ok(self.engine.confirm(lane, tx))
    }

    async fn wallet_snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            address: self.engine.from_address(),
            balance_wei: U256::ZERO,
            balance_eth: format_ether(U256::ZERO),
            spoof_mode: true,
            available: true,
        }
    }
}

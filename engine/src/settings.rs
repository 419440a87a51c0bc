//! Engine settings
//!
//! Plain settings struct filled in by the binary's CLI layer. Building the
//! provider here is the one place live and spoof mode diverge.

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use tracing::info;

use crate::lane::LaneTiming;
use crate::provider::{LiveProvider, SpoofProvider, TransactionProvider};
use crate::rpc::{ChainClient, NodeClient, RpcError};
use crate::signer::LocalSigner;
use crate::spoof::{SpoofDelays, SpoofEngine};
use crate::strategy::LaneStrategies;
use crate::submitter::TransactionSubmitter;
use crate::types::Address;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("A signer private key is required unless spoof mode is enabled")]
    MissingSigner,
    #[error("Failed to create RPC client: {0}")]
    Rpc(#[from] RpcError),
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub rpc_url: String,
    /// Key that signs and pays for every send
    pub signer_key: Option<PrivateKeySigner>,
    pub spoof: bool,
    pub strategies: LaneStrategies,
    pub timing: LaneTiming,
    pub spoof_delays: SpoofDelays,
}

impl EngineSettings {
    /// Pick the provider for this process
    pub fn build_provider(&self) -> Result<Arc<dyn TransactionProvider>, SettingsError> {
        if self.spoof {
            info!(
                "Spoof mode: flashblocks {}ms, normal {}ms",
                self.spoof_delays.flashblocks.as_millis(),
                self.spoof_delays.normal.as_millis()
            );
            let engine = SpoofEngine::new(
                self.spoof_delays,
                self.strategies,
                self.signer_key
                    .as_ref()
                    .map(PrivateKeySigner::address)
                    .unwrap_or(Address::ZERO),
            );
            return Ok(Arc::new(SpoofProvider::new(engine)));
        }

        let key = self.signer_key.clone().ok_or(SettingsError::MissingSigner)?;
        let signer = Arc::new(LocalSigner::new(key));
        let chain: Arc<dyn ChainClient> = Arc::new(NodeClient::new(&self.rpc_url)?);
        let submitter = Arc::new(TransactionSubmitter::new(chain.clone(), signer));

        info!(
            "Live mode: flashblocks via {}, normal via {}",
            self.strategies.flashblocks, self.strategies.normal
        );
        Ok(Arc::new(LiveProvider::new(chain, submitter, self.strategies)))
    }
}

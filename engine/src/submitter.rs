//! Transaction Submitter
//!
//! Serializes every send for the shared signer behind one FIFO barrier so two
//! lanes can never race on a nonce. `tokio::sync::Mutex` queues waiters in
//! arrival order, which gives the global send ordering for free.
//!
//! Nonce recovery is an explicit two-attempt loop:
//! 1. Send with the locally tracked nonce
//! 2. On a nonce-class rejection, re-read the nonce from the node and send once more
//! 3. A second nonce-class rejection is returned as [`SendError::NonceDesync`]

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::rpc::{ChainClient, RpcError, TransferRequest};
use crate::signer::TransactionSigner;
use crate::types::{Address, BlockTag, Lane, TransactionHandle, TxHash, U256};

/// Gas for a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// Sends per cycle: the first try plus one resync retry
const MAX_SEND_ATTEMPTS: u32 = 2;

/// Node error fragments that mean the signer ran out of funds
const INSUFFICIENT_FUNDS_PATTERNS: &[&str] = &[
    "insufficient funds",
    "insufficient balance",
    "exceeds balance",
    "balance too low",
];

/// Node error fragments that mean our nonce is out of sync with the node
const NONCE_PATTERNS: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "already known",
    "known transaction",
    "invalid nonce",
    "nonce has already been used",
    "replacement transaction underpriced",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SendError {
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Nonce out of sync after resync retry: {0}")]
    NonceDesync(String),
    #[error("Send failed: {0}")]
    Rpc(#[from] RpcError),
}

impl SendError {
    /// Running out of funds ends the whole race, not just the cycle
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, SendError::InsufficientFunds(_))
    }

    pub fn is_nonce_desync(&self) -> bool {
        matches!(self, SendError::NonceDesync(_))
    }
}

/// Classes of send failure the submitter reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    InsufficientFunds,
    Nonce,
    Other,
}

/// Classify a node error message
pub fn classify_failure(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    if INSUFFICIENT_FUNDS_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureClass::InsufficientFunds
    } else if NONCE_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureClass::Nonce
    } else {
        FailureClass::Other
    }
}

/// Next nonce for the shared signer.
/// `None` means the next send must read it from the node first.
#[derive(Debug, Default)]
pub struct NonceState {
    next: Option<u64>,
    /// Read once from the node on the first send
    chain_id: Option<u64>,
}

impl NonceState {
    pub fn peek(&self) -> Option<u64> {
        self.next
    }
}

/// Serialized send path for one signer
pub struct TransactionSubmitter {
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn TransactionSigner>,
    nonce: Mutex<NonceState>,
}

impl TransactionSubmitter {
    pub fn new(chain: Arc<dyn ChainClient>, signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            chain,
            signer,
            nonce: Mutex::new(NonceState::default()),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Nonce the next send will use, if already known
    pub async fn next_nonce(&self) -> Option<u64> {
        self.nonce.lock().await.peek()
    }

    /// Drop the local nonce; the next send re-reads it from the node
    pub async fn reset_nonce(&self) {
        self.nonce.lock().await.next = None;
        info!("[Submitter] Nonce reset, will resync from node on next send");
    }

    /// Send one zero-value self-transfer for `lane`
    pub async fn submit(&self, lane: Lane) -> Result<TransactionHandle, SendError> {
        // Held for the whole send: this is the FIFO barrier
        let mut state = self.nonce.lock().await;
        let from = self.signer.address();

        let chain_id = match state.chain_id {
            Some(id) => id,
            None => {
                let id = self.chain.chain_id().await?;
                state.chain_id = Some(id);
                id
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;

            let nonce = match state.next {
                Some(n) => n,
                None => {
                    let n = self.read_nonce(&from).await?;
                    state.next = Some(n);
                    n
                }
            };

            match self.send_transfer(from, nonce, chain_id).await {
                Ok(tx) => {
                    state.next = Some(nonce + 1);
                    debug!("[Submitter] {} sent {} (nonce {})", lane, tx, nonce);
                    return Ok(TransactionHandle {
                        transaction_id: tx,
                        from_address: from,
                    });
                }
                Err(SendError::NonceDesync(message)) if attempt < MAX_SEND_ATTEMPTS => {
                    warn!(
                        "[Submitter] {} nonce {} rejected ({}), resyncing from node",
                        lane, nonce, message
                    );
                    // A failed read must not leave the rejected nonce behind
                    state.next = None;
                    let fresh = self.read_nonce(&from).await?;
                    state.next = Some(fresh);
                }
                Err(SendError::NonceDesync(message)) => {
                    // Force a fresh read next cycle rather than reusing a bad value
                    state.next = None;
                    return Err(SendError::NonceDesync(message));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn read_nonce(&self, from: &Address) -> Result<u64, SendError> {
        let nonce = self.chain.transaction_count(from, BlockTag::Pending).await?;
        debug!("[Submitter] Node reports next nonce {}", nonce);
        Ok(nonce)
    }

    async fn send_transfer(
        &self,
        from: Address,
        nonce: u64,
        chain_id: u64,
    ) -> Result<TxHash, SendError> {
        let gas_price = self.chain.gas_price().await?;
        let request = TransferRequest {
            from,
            to: from,
            value: U256::ZERO,
            gas: TRANSFER_GAS,
            gas_price,
            nonce,
            chain_id,
        };

        let raw = self
            .signer
            .sign_transaction(&request)
            .await
            .map_err(classify_rpc_error)?;

        self.chain
            .send_raw_transaction(&raw)
            .await
            .map_err(classify_rpc_error)
    }
}

fn classify_rpc_error(err: RpcError) -> SendError {
    match classify_failure(err.message()) {
        FailureClass::InsufficientFunds => SendError::InsufficientFunds(err.message().to_string()),
        FailureClass::Nonce => SendError::NonceDesync(err.message().to_string()),
        FailureClass::Other => SendError::Rpc(err),
    }
}

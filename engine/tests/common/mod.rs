#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flashrace::rpc::{BlockTransactions, ChainClient, ReceiptInfo, RpcError, TransferRequest};
use flashrace::signer::TransactionSigner;
use flashrace::{
    Address, BlockTag, Confirmation, ConfirmationMethod, Lane, SendError, TransactionHandle,
    TransactionProvider, TxHash, WalletSnapshot, U256,
};

pub const SIGNER: Address = Address::repeat_byte(0x42);

pub const CHAIN_ID: u64 = 8453;

// ============================================================================
// In-memory node
// ============================================================================

#[derive(Debug, Default)]
pub struct NodeState {
    /// Next nonce the node will accept
    pub chain_nonce: u64,
    /// Errors returned by upcoming sends, consumed front to back
    pub send_script: VecDeque<String>,
    /// Nonces of every accepted transaction
    pub accepted_nonces: Vec<u64>,
    pub send_attempts: u64,
    pub nonce_reads: u64,
    pub chain_id_reads: u64,
    /// Makes `eth_getTransactionCount` fail
    pub fail_nonce_reads: bool,
    pub balance: U256,
    pub pending_block: Option<BlockTransactions>,
    pub latest_block: Option<BlockTransactions>,
    pub receipts: HashMap<TxHash, ReceiptInfo>,
    pub fail_queries: bool,
}

#[derive(Default)]
pub struct MockNode {
    pub state: Mutex<NodeState>,
}

impl MockNode {
    pub fn with_nonce(nonce: u64) -> Arc<Self> {
        let node = Self::default();
        node.state.lock().unwrap().chain_nonce = nonce;
        Arc::new(node)
    }

    pub fn script_send_errors<I: IntoIterator<Item = &'static str>>(&self, errors: I) {
        let mut state = self.state.lock().unwrap();
        state.send_script.extend(errors.into_iter().map(str::to_string));
    }

    pub fn snapshot<R>(&self, f: impl FnOnce(&NodeState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }

    pub fn update(&self, f: impl FnOnce(&mut NodeState)) {
        f(&mut self.state.lock().unwrap())
    }
}

/// Hash the mock node assigns to the transaction with `nonce`
pub fn hash_for_nonce(nonce: u64) -> TxHash {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&nonce.to_be_bytes());
    TxHash::from(bytes)
}

fn node_error(message: &str) -> RpcError {
    RpcError::Rpc {
        code: -32000,
        message: message.to_string(),
    }
}

#[async_trait]
impl ChainClient for MockNode {
    async fn block_transactions(&self, tag: BlockTag) -> Result<Option<BlockTransactions>, RpcError> {
        let state = self.state.lock().unwrap();
        if state.fail_queries {
            return Err(RpcError::Network("connection reset".to_string()));
        }
        Ok(match tag {
            BlockTag::Pending => state.pending_block.clone(),
            BlockTag::Latest => state.latest_block.clone(),
        })
    }

    async fn transaction_receipt(&self, tx: &TxHash) -> Result<Option<ReceiptInfo>, RpcError> {
        let state = self.state.lock().unwrap();
        if state.fail_queries {
            return Err(RpcError::Network("connection reset".to_string()));
        }
        Ok(state.receipts.get(tx).copied())
    }

    async fn transaction_count(&self, _address: &Address, _tag: BlockTag) -> Result<u64, RpcError> {
        let mut state = self.state.lock().unwrap();
        state.nonce_reads += 1;
        if state.fail_nonce_reads {
            return Err(RpcError::Network("connection reset".to_string()));
        }
        Ok(state.chain_nonce)
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        Ok(1_000_000_000)
    }

    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.state.lock().unwrap().chain_id_reads += 1;
        Ok(CHAIN_ID)
    }

    async fn balance(&self, _address: &Address) -> Result<U256, RpcError> {
        let state = self.state.lock().unwrap();
        if state.fail_queries {
            return Err(RpcError::Network("connection reset".to_string()));
        }
        Ok(state.balance)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, RpcError> {
        let bytes: [u8; 8] = raw
            .try_into()
            .map_err(|_| RpcError::Parse(format!("unexpected raw length {}", raw.len())))?;
        let nonce = u64::from_be_bytes(bytes);

        let mut state = self.state.lock().unwrap();
        state.send_attempts += 1;

        if let Some(message) = state.send_script.pop_front() {
            return Err(node_error(&message));
        }
        if nonce < state.chain_nonce {
            return Err(node_error(&format!(
                "nonce too low: next nonce {}, tx nonce {}",
                state.chain_nonce, nonce
            )));
        }

        state.chain_nonce = nonce + 1;
        state.accepted_nonces.push(nonce);
        Ok(hash_for_nonce(nonce))
    }
}

/// "Signs" by encoding the nonce as the raw transaction
pub struct MockSigner;

#[async_trait]
impl TransactionSigner for MockSigner {
    fn address(&self) -> Address {
        SIGNER
    }

    async fn sign_transaction(&self, request: &TransferRequest) -> Result<Vec<u8>, RpcError> {
        assert_eq!(request.from, request.to, "race sends are self-transfers");
        assert_eq!(request.value, U256::ZERO);
        assert_eq!(request.chain_id, CHAIN_ID);
        Ok(request.nonce.to_be_bytes().to_vec())
    }
}

// ============================================================================
// Scripted provider for lane / controller tests
// ============================================================================

pub struct ScriptedProvider {
    pub sends: AtomicU64,
    pub confirms: AtomicU64,
    /// Checks of the same transaction needed before it confirms
    confirm_after: u64,
    send_failures: Mutex<HashMap<Lane, VecDeque<SendError>>>,
    poll_failures: AtomicU64,
    polls: Mutex<HashMap<TxHash, u64>>,
    next_id: AtomicU64,
}

impl ScriptedProvider {
    pub fn new(confirm_after: u64) -> Self {
        Self {
            sends: AtomicU64::new(0),
            confirms: AtomicU64::new(0),
            confirm_after,
            send_failures: Mutex::new(HashMap::new()),
            poll_failures: AtomicU64::new(0),
            polls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Never confirms anything
    pub fn never_confirms() -> Self {
        Self::new(u64::MAX)
    }

    pub fn fail_sends(self, lane: Lane, errors: Vec<SendError>) -> Self {
        self.send_failures
            .lock()
            .unwrap()
            .entry(lane)
            .or_default()
            .extend(errors);
        self
    }

    pub fn fail_polls(self, count: u64) -> Self {
        self.poll_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn sends(&self) -> u64 {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn confirms(&self) -> u64 {
        self.confirms.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionProvider for ScriptedProvider {
    fn is_spoof(&self) -> bool {
        true
    }

    async fn send(&self, lane: Lane) -> Result<TransactionHandle, SendError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .send_failures
            .lock()
            .unwrap()
            .get_mut(&lane)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(TransactionHandle {
            transaction_id: hash_for_nonce(id),
            from_address: SIGNER,
        })
    }

    async fn confirm(&self, _lane: Lane, tx: &TxHash) -> Result<Confirmation, RpcError> {
        self.confirms.fetch_add(1, Ordering::SeqCst);

        let remaining = self.poll_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.poll_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RpcError::Network("timeout".to_string()));
        }

        let mut polls = self.polls.lock().unwrap();
        let seen = polls.entry(*tx).or_insert(0);
        *seen += 1;
        Ok(Confirmation {
            confirmed: *seen >= self.confirm_after,
            method: ConfirmationMethod::Receipt,
            block_height: Some(1),
        })
    }

    async fn wallet_snapshot(&self) -> WalletSnapshot {
        WalletSnapshot {
            address: SIGNER,
            balance_wei: U256::ZERO,
            balance_eth: "0".to_string(),
            spoof_mode: true,
            available: true,
        }
    }
}

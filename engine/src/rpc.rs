//! Chain client
//!
//! Talks to an EVM node through an alloy [`RootProvider`] over HTTP. The engine
//! only consumes the [`ChainClient`] trait, so tests swap in an in-memory node.

use std::time::Duration;

use alloy::eips::{BlockId, BlockNumberOrTag};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::BlockTransactionsKind;
use alloy::transports::http::Http;
use alloy::transports::TransportError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::types::{Address, BlockTag, TxHash, U256};

/// Request timeout for every RPC call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Signing failed: {0}")]
    Signer(String),
}

impl RpcError {
    /// Message text used for error classification
    pub fn message(&self) -> &str {
        match self {
            RpcError::Network(m) | RpcError::Parse(m) | RpcError::Signer(m) => m,
            RpcError::Rpc { message, .. } => message,
        }
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        // Node rejections keep their code so send failures can be classified
        if let Some(payload) = err.as_error_resp() {
            return RpcError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            };
        }
        RpcError::Network(err.to_string())
    }
}

impl From<BlockTag> for BlockNumberOrTag {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Pending => BlockNumberOrTag::Pending,
            BlockTag::Latest => BlockNumberOrTag::Latest,
        }
    }
}

/// Transaction hashes included in a block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockTransactions {
    /// Block number, `None` for a pending block that has not been numbered
    pub number: Option<u64>,
    pub transactions: Vec<TxHash>,
}

/// The parts of a receipt the engine cares about
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceiptInfo {
    pub block_number: Option<u64>,
    /// `Some(true)` on success, `Some(false)` on revert, `None` if the node omits it
    pub status: Option<bool>,
}

/// Unsigned zero-value transfer handed to a signer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas: u64,
    pub gas_price: u128,
    pub nonce: u64,
    pub chain_id: u64,
}

/// Chain query and broadcast surface used by the engine
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Transaction hashes of the block at `tag`; `None` if the node has no such block
    async fn block_transactions(&self, tag: BlockTag) -> Result<Option<BlockTransactions>, RpcError>;

    /// Receipt for `tx`; `None` while the node has not seen it mined
    async fn transaction_receipt(&self, tx: &TxHash) -> Result<Option<ReceiptInfo>, RpcError>;

    /// Next nonce for `address` as seen at `tag`
    async fn transaction_count(&self, address: &Address, tag: BlockTag) -> Result<u64, RpcError>;

    async fn gas_price(&self) -> Result<u128, RpcError>;

    async fn chain_id(&self) -> Result<u64, RpcError>;

    async fn balance(&self, address: &Address) -> Result<U256, RpcError>;

    /// Broadcast an EIP-2718 encoded signed transaction
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, RpcError>;
}

/// HTTP node client
pub struct NodeClient {
    provider: RootProvider<Http<Client>>,
    rpc_url: Url,
}

impl NodeClient {
    pub fn new(rpc_url: &str) -> Result<Self, RpcError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| RpcError::Network(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RpcError::Network(e.to_string()))?;

        let transport = Http::with_client(client, url.clone());
        let provider = RootProvider::new(RpcClient::new(transport, false));

        Ok(Self {
            provider,
            rpc_url: url,
        })
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }
}

#[async_trait]
impl ChainClient for NodeClient {
    async fn block_transactions(&self, tag: BlockTag) -> Result<Option<BlockTransactions>, RpcError> {
        let block = self
            .provider
            .get_block_by_number(tag.into(), BlockTransactionsKind::Hashes)
            .await?;

        Ok(block.map(|block| BlockTransactions {
            number: Some(block.header.number),
            transactions: block
                .transactions
                .as_hashes()
                .map(<[TxHash]>::to_vec)
                .unwrap_or_default(),
        }))
    }

    async fn transaction_receipt(&self, tx: &TxHash) -> Result<Option<ReceiptInfo>, RpcError> {
        let receipt = self.provider.get_transaction_receipt(*tx).await?;
        Ok(receipt.map(|receipt| ReceiptInfo {
            block_number: receipt.block_number,
            status: Some(receipt.status()),
        }))
    }

    async fn transaction_count(&self, address: &Address, tag: BlockTag) -> Result<u64, RpcError> {
        let block = BlockId::from(BlockNumberOrTag::from(tag));
        Ok(self
            .provider
            .get_transaction_count(*address)
            .block_id(block)
            .await?)
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn balance(&self, address: &Address) -> Result<U256, RpcError> {
        Ok(self.provider.get_balance(*address).await?)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, RpcError> {
        let pending = self.provider.send_raw_transaction(raw).await.map_err(|e| {
            debug!("[Rpc] eth_sendRawTransaction failed: {}", e);
            RpcError::from(e)
        })?;
        Ok(*pending.tx_hash())
    }
}

//! Signing seam
//!
//! A [`TransactionSigner`] turns a transfer request into raw signed bytes.
//! [`LocalSigner`] signs in-process with a private key, so the node never
//! needs to hold the account.

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use crate::rpc::{RpcError, TransferRequest};
use crate::types::Address;

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Account every transaction is sent from
    fn address(&self) -> Address;

    /// Sign `request`, returning the EIP-2718 encoded transaction
    async fn sign_transaction(&self, request: &TransferRequest) -> Result<Vec<u8>, RpcError>;
}

/// Signs legacy transfers with a local private key
pub struct LocalSigner {
    wallet: EthereumWallet,
    address: Address,
}

impl LocalSigner {
    pub fn new(key: PrivateKeySigner) -> Self {
        let address = key.address();
        Self {
            wallet: EthereumWallet::from(key),
            address,
        }
    }
}

#[async_trait]
impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_transaction(&self, request: &TransferRequest) -> Result<Vec<u8>, RpcError> {
        let tx = TransactionRequest::default()
            .with_from(request.from)
            .with_to(request.to)
            .with_value(request.value)
            .with_nonce(request.nonce)
            .with_gas_limit(request.gas)
            .with_gas_price(request.gas_price)
            .with_chain_id(request.chain_id);

        let envelope = tx
            .build(&self.wallet)
            .await
            .map_err(|e| RpcError::Signer(e.to_string()))?;
        Ok(envelope.encoded_2718())
    }
}

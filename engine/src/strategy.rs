//! Confirmation strategies
//!
//! Each strategy turns one round of chain queries into a [`Confirmation`].
//! "Not found yet" is an ordinary unconfirmed verdict; only transport or node
//! failures come back as errors.

use serde::{Deserialize, Serialize};

use crate::rpc::{BlockTransactions, ChainClient, ReceiptInfo, RpcError};
use crate::types::{BlockTag, Confirmation, ConfirmationMethod, Lane, TxHash};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConfirmationStrategy {
    /// Look for the hash in the block at `tag` (hashes only)
    BlockScan { tag: BlockTag },
    /// Wait for a receipt carrying a block number
    ReceiptPoll,
}

impl ConfirmationStrategy {
    /// Fast path: scan the pending block
    pub const fn pending_scan() -> Self {
        ConfirmationStrategy::BlockScan {
            tag: BlockTag::Pending,
        }
    }

    /// Baseline: scan the latest block
    pub const fn latest_scan() -> Self {
        ConfirmationStrategy::BlockScan {
            tag: BlockTag::Latest,
        }
    }

    pub const fn receipt_poll() -> Self {
        ConfirmationStrategy::ReceiptPoll
    }

    pub fn method(&self) -> ConfirmationMethod {
        match self {
            ConfirmationStrategy::BlockScan {
                tag: BlockTag::Pending,
            } => ConfirmationMethod::PendingBlock,
            ConfirmationStrategy::BlockScan {
                tag: BlockTag::Latest,
            } => ConfirmationMethod::LatestBlock,
            ConfirmationStrategy::ReceiptPoll => ConfirmationMethod::Receipt,
        }
    }

    /// Run one check of `tx` against the chain
    pub async fn check(&self, chain: &dyn ChainClient, tx: &TxHash) -> Result<Confirmation, RpcError> {
        match self {
            ConfirmationStrategy::BlockScan { tag } => {
                let block = chain.block_transactions(*tag).await?;
                Ok(scan_verdict(block.as_ref(), tx, self.method()))
            }
            ConfirmationStrategy::ReceiptPoll => {
                let receipt = chain.transaction_receipt(tx).await?;
                Ok(receipt_verdict(receipt.as_ref()))
            }
        }
    }
}

impl std::fmt::Display for ConfirmationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmationStrategy::BlockScan { tag } => write!(f, "block-scan({})", tag),
            ConfirmationStrategy::ReceiptPoll => write!(f, "receipt-poll"),
        }
    }
}

/// Confirmed iff `tx` is listed in `block`
pub fn scan_verdict(
    block: Option<&BlockTransactions>,
    tx: &TxHash,
    method: ConfirmationMethod,
) -> Confirmation {
    match block {
        Some(block) if block.transactions.contains(tx) => Confirmation {
            confirmed: true,
            method,
            block_height: block.number,
        },
        _ => Confirmation::pending(method),
    }
}

/// Confirmed iff a receipt exists with a block number
pub fn receipt_verdict(receipt: Option<&ReceiptInfo>) -> Confirmation {
    match receipt.and_then(|r| r.block_number) {
        Some(height) => Confirmation {
            confirmed: true,
            method: ConfirmationMethod::Receipt,
            block_height: Some(height),
        },
        None => Confirmation::pending(ConfirmationMethod::Receipt),
    }
}

/// Strategy assignment for both lanes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneStrategies {
    pub flashblocks: ConfirmationStrategy,
    pub normal: ConfirmationStrategy,
}

impl Default for LaneStrategies {
    fn default() -> Self {
        Self {
            flashblocks: ConfirmationStrategy::pending_scan(),
            normal: ConfirmationStrategy::latest_scan(),
        }
    }
}

impl LaneStrategies {
    pub fn for_lane(&self, lane: Lane) -> ConfirmationStrategy {
        match lane {
            Lane::Flashblocks => self.flashblocks,
            Lane::Normal => self.normal,
        }
    }
}

use std::fmt;

use derive_new::new;
use ethers::types::{Address, BlockId, BlockNumber, Bytes, H256, H64, U256};
use serde::{Deserialize, Serialize};

/// A call the operator account should broadcast on behalf of a user.
///
/// Immutable once created; the dispatcher consumes it exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    /// Destination contract
    pub to: Address,
    /// ABI-encoded call
    pub data: Bytes,
    /// Upper bound on gas the caller accepts. Falls back to the dispatcher default.
    #[serde(default)]
    pub gas_limit: Option<U256>,
}

/// The subset of a block the relayer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block hash, absent for pending blocks
    pub hash: Option<H256>,
    /// Block number, absent for pending blocks
    pub number: Option<u64>,
    /// Proof-of-work nonce, absent while the block is still pending
    pub nonce: Option<H64>,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

impl BlockInfo {
    /// Whether the node still reports this block as pending
    pub fn is_pending(&self) -> bool {
        self.nonce.is_none()
    }
}

/// The subset of a transaction the relayer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxInfo {
    /// Transaction hash
    pub hash: H256,
    /// Number of the block the transaction was mined in, if any
    pub block_number: Option<u64>,
}

impl TxInfo {
    /// Whether the transaction has been included in a block
    pub fn is_mined(&self) -> bool {
        self.block_number.is_some()
    }
}

/// Display adapter for a block reference, used in client-facing messages.
pub struct BlockRef<'a>(pub &'a BlockId);

impl fmt::Display for BlockRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            BlockId::Hash(hash) => write!(f, "{hash:?}"),
            BlockId::Number(BlockNumber::Number(number)) => write!(f, "{number}"),
            BlockId::Number(tag) => write!(f, "{}", tag.to_string().to_lowercase()),
        }
    }
}

use std::fmt::Debug;

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Address, BlockId, BlockNumber, H256, U256};

use crate::{BlockInfo, ChainResult, TxInfo};

/// The chain capability the relayer needs. Implemented on top of a JSON-RPC
/// client that signs with the operator account.
///
/// Every method is a suspension point: chain state may change between calls.
#[async_trait]
pub trait RelayProvider: Send + Sync + Debug {
    /// Address of the operator account transactions are sent from
    fn signer(&self) -> Address;

    /// Get the transaction count of `address` at the given block tag
    /// (`Latest` or `Pending`)
    async fn get_transaction_count(&self, address: Address, block: BlockNumber)
        -> ChainResult<U256>;

    /// Simulate `tx` and return the gas it would use
    async fn estimate_gas(&self, tx: &TypedTransaction) -> ChainResult<U256>;

    /// Look up a transaction by hash. `None` if the node does not know it.
    async fn get_transaction(&self, hash: H256) -> ChainResult<Option<TxInfo>>;

    /// Fetch a block by hash or tag. `None` if the node does not know it.
    async fn get_block(&self, block: BlockId) -> ChainResult<Option<BlockInfo>>;

    /// ERC-20 `balanceOf(owner)` on `token`
    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256>;

    /// Sign and broadcast `tx`, resolving with its hash as soon as the node
    /// accepts it
    async fn send_transaction(&self, tx: TypedTransaction) -> ChainResult<H256>;
}

use async_trait::async_trait;
use ethers::types::{transaction::eip2718::TypedTransaction, Address, BlockId, BlockNumber, H256, U256};

use crate::{BlockInfo, ChainResult, RelayProvider, TxInfo};

mockall::mock! {
    pub RelayProvider {}

    #[async_trait]
    impl RelayProvider for RelayProvider {
        fn signer(&self) -> Address;

        async fn get_transaction_count(
            &self,
            address: Address,
            block: BlockNumber,
        ) -> ChainResult<U256>;

        async fn estimate_gas(&self, tx: &TypedTransaction) -> ChainResult<U256>;

        async fn get_transaction(&self, hash: H256) -> ChainResult<Option<TxInfo>>;

        async fn get_block(&self, block: BlockId) -> ChainResult<Option<BlockInfo>>;

        async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256>;

        async fn send_transaction(&self, tx: TypedTransaction) -> ChainResult<H256>;
    }
}

impl std::fmt::Debug for MockRelayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockRelayProvider")
    }
}

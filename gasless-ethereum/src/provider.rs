use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::prelude::{Http, LocalWallet, Middleware, Provider, Signer, SignerMiddleware};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, BlockNumber, TransactionRequest, H256, U256};
use ethers::utils::id;
use eyre::Context;
use gasless_core::{BlockInfo, ChainCommunicationError, ChainResult, RelayProvider, TxInfo};
use tracing::instrument;

use crate::{ConnectionConf, SignerConf};

/// Client that signs with the operator key before sending
pub type SigningClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// [`RelayProvider`] over any `ethers` middleware. Transactions are sent
/// through the middleware, so it is expected to sign for `signer`.
#[derive(Debug)]
pub struct EthereumRelayProvider<M> {
    provider: Arc<M>,
    signer: Address,
}

impl<M> EthereumRelayProvider<M>
where
    M: Middleware + 'static,
{
    /// Wrap a middleware that sends transactions from `signer`
    pub fn new(provider: Arc<M>, signer: Address) -> Self {
        Self { provider, signer }
    }
}

impl EthereumRelayProvider<SigningClient> {
    /// Connect to the node over HTTP and sign with the configured key
    pub fn connect(conf: &ConnectionConf, signer: &SignerConf) -> eyre::Result<Self> {
        let provider = Provider::<Http>::try_from(conf.rpc_url.as_str())
            .context("Invalid RPC url")?;
        let wallet = signer
            .key
            .parse::<LocalWallet>()
            .context("Invalid signer key")?
            .with_chain_id(conf.chain_id);
        let address = wallet.address();
        let client = SignerMiddleware::new(provider, wallet);
        Ok(Self::new(Arc::new(client), address))
    }
}

fn balance_of_call(token: Address, owner: Address) -> TypedTransaction {
    let mut data = id("balanceOf(address)").to_vec();
    data.extend(abi::encode(&[Token::Address(owner)]));
    TransactionRequest::new().to(token).data(data).into()
}

#[async_trait]
impl<M> RelayProvider for EthereumRelayProvider<M>
where
    M: Middleware + 'static,
{
    fn signer(&self) -> Address {
        self.signer
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn get_transaction_count(
        &self,
        address: Address,
        block: BlockNumber,
    ) -> ChainResult<U256> {
        self.provider
            .get_transaction_count(address, Some(block.into()))
            .await
            .map_err(ChainCommunicationError::from_other)
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn estimate_gas(&self, tx: &TypedTransaction) -> ChainResult<U256> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(ChainCommunicationError::from_other)
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn get_transaction(&self, hash: H256) -> ChainResult<Option<TxInfo>> {
        let tx = self
            .provider
            .get_transaction(hash)
            .await
            .map_err(ChainCommunicationError::from_other)?;
        Ok(tx.map(|tx| TxInfo {
            hash: tx.hash,
            block_number: tx.block_number.map(|number| number.as_u64()),
        }))
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn get_block(&self, block: BlockId) -> ChainResult<Option<BlockInfo>> {
        let block = self
            .provider
            .get_block(block)
            .await
            .map_err(ChainCommunicationError::from_other)?;
        Ok(block.map(|block| BlockInfo {
            hash: block.hash,
            number: block.number.map(|number| number.as_u64()),
            nonce: block.nonce,
            timestamp: block.timestamp.low_u64(),
        }))
    }

    #[instrument(level = "debug", err, skip(self))]
    async fn token_balance(&self, token: Address, owner: Address) -> ChainResult<U256> {
        let output = self
            .provider
            .call(&balance_of_call(token, owner), None)
            .await
            .map_err(ChainCommunicationError::from_other)?;
        abi::decode(&[ParamType::Uint(256)], &output)
            .ok()
            .and_then(|tokens| tokens.into_iter().next())
            .and_then(Token::into_uint)
            .ok_or_else(|| {
                ChainCommunicationError::CustomError(format!(
                    "Unexpected balanceOf response from {token:?}"
                ))
            })
    }

    #[instrument(err, skip(self, tx), fields(nonce = ?tx.nonce()))]
    async fn send_transaction(&self, tx: TypedTransaction) -> ChainResult<H256> {
        let pending = self
            .provider
            .send_transaction(tx, None)
            .await
            .map_err(ChainCommunicationError::from_other)?;
        Ok(pending.tx_hash())
    }
}

//! Decode, validate and dispatch meta-transactions

use std::sync::Arc;

use ethers::types::{Address, Bytes, H256, U256};
use eyre::Result;
use gasless_core::{
    decode_meta_call, MetaTxValidator, OutboundRequest, RelayProvider, ValidationFailure,
};
use gasless_dispatcher::{DispatcherError, DispatcherMetrics, TransactionDispatcher};
use gasless_ethereum::EthereumRelayProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::settings::RelayerSettings;

/// A meta-transaction as submitted by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaTxCall {
    /// Account that signed the call, as sent by the client
    pub from: String,
    /// Token contract the call is made on
    pub to: Address,
    /// ABI-encoded `transfer` or `approve` call
    pub data: Bytes,
    /// Block the client observed chain state at. Latest when absent.
    #[serde(default)]
    pub block_hash: Option<H256>,
    /// Most gas the client accepts the call using
    #[serde(default)]
    pub gas_limit: Option<U256>,
}

/// Why a meta-transaction was not relayed. `Display` is the message to
/// return to the client.
#[derive(Debug, thiserror::Error)]
pub enum RelayRejection {
    /// The call is neither a `transfer` nor an `approve`
    #[error("Unable to decode transaction")]
    Undecodable,
    /// The call breaks a business rule
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),
    /// The dispatcher could not broadcast the call
    #[error(transparent)]
    Dispatch(#[from] DispatcherError),
}

/// Entry point for relaying meta-transactions
pub struct MetaTxRelayer {
    validator: MetaTxValidator,
    dispatcher: Arc<TransactionDispatcher>,
}

impl MetaTxRelayer {
    /// Relay through an existing validator and dispatcher
    pub fn new(validator: MetaTxValidator, dispatcher: Arc<TransactionDispatcher>) -> Self {
        Self {
            validator,
            dispatcher,
        }
    }

    /// Validate and dispatch through `provider`
    pub fn with_provider(
        provider: Arc<dyn RelayProvider>,
        settings: &RelayerSettings,
        metrics: DispatcherMetrics,
    ) -> Self {
        let validator = MetaTxValidator::new(provider.clone(), settings.validation.clone());
        let dispatcher =
            TransactionDispatcher::new(provider, settings.dispatcher_settings(), metrics);
        Self::new(validator, Arc::new(dispatcher))
    }

    /// Connect to the configured node and sign with the configured key.
    /// Must be called from within a tokio runtime.
    pub fn from_settings(settings: &RelayerSettings, metrics: DispatcherMetrics) -> Result<Self> {
        let provider = EthereumRelayProvider::connect(&settings.chain, &settings.signer)?;
        Ok(Self::with_provider(Arc::new(provider), settings, metrics))
    }

    /// The dispatcher broadcasting relayed calls
    pub fn dispatcher(&self) -> &TransactionDispatcher {
        &self.dispatcher
    }

    /// Decode and validate `call`, then broadcast it from the operator
    /// account. Resolves with the transaction hash once the node accepted it.
    #[instrument(skip(self, call), fields(from = %call.from, token = ?call.to))]
    pub async fn relay(&self, call: MetaTxCall) -> Result<H256, RelayRejection> {
        let args = decode_meta_call(&call.data).ok_or(RelayRejection::Undecodable)?;

        if let Err(failure) = self
            .validator
            .validate(&call.from, call.to, &args, call.block_hash)
            .await
        {
            info!(%failure, kind = %args.kind, "Rejecting meta-transaction");
            return Err(failure.into());
        }

        let request = OutboundRequest::new(call.to, call.data, call.gas_limit);
        let tx_hash = self.dispatcher.submit(request).await?;
        info!(?tx_hash, kind = %args.kind, amount = %args.amount, "Relayed meta-transaction");
        Ok(tx_hash)
    }
}

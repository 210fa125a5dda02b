use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Address, BlockId, BlockNumber, H256};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::utils::{fmt_address, normalize_address, parse_address};
use crate::{BlockRef, RelayProvider};

use super::{DecodedArgs, MetaTxKind};

/// Default maximum age of the block a meta-transaction was validated against
pub const DEFAULT_MAX_BLOCK_AGE: Duration = Duration::from_secs(300);

/// Business rules applied to decoded meta-transactions
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidationConf {
    /// Reject reference blocks older than this many seconds
    pub max_block_age_secs: u64,
    /// Only accept transfers that move the sender's entire token balance
    pub full_withdrawal_only: bool,
}

impl Default for ValidationConf {
    fn default() -> Self {
        Self {
            max_block_age_secs: DEFAULT_MAX_BLOCK_AGE.as_secs(),
            full_withdrawal_only: false,
        }
    }
}

/// Reasons a decoded meta-transaction is refused. The `Display` output is
/// meant to be handed to the client as is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationFailure {
    /// Nothing would move
    #[error("Cannot {0} 0 tokens")]
    ZeroAmount(MetaTxKind),
    /// The claimed sender is not a hex address
    #[error("Invalid sender address {0}")]
    InvalidSender(String),
    /// Sender transfers to, or approves, itself
    #[error("{}", self_target_message(.0))]
    SelfTarget(MetaTxKind),
    /// Partial transfers are disabled
    #[error("Only full balance withdrawals are supported")]
    PartialWithdrawal,
    /// The sender's balance could not be read
    #[error("Unable to fetch token balance for {0}")]
    BalanceUnavailable(String),
    /// The node does not know the reference block
    #[error("Unable to fetch block {0}: it is unknown or too old")]
    UnknownBlock(String),
    /// The reference block has not been sealed yet
    #[error("Block {0} is still pending")]
    PendingBlock(String),
    /// The reference block is too old to validate against
    #[error("Block {block} is {age}s old, exceeding the maximum age of {max_age}s")]
    StaleBlock {
        /// Block reference
        block: String,
        /// Age in seconds
        age: u64,
        /// Configured maximum in seconds
        max_age: u64,
    },
}

fn self_target_message(kind: &MetaTxKind) -> &'static str {
    match kind {
        MetaTxKind::Transfer => "Sender and recipient must differ",
        MetaTxKind::Approve => "Owner and spender must differ",
    }
}

/// Checks decoded meta-transactions against current chain state before they
/// are queued for broadcast.
#[derive(Debug, Clone)]
pub struct MetaTxValidator {
    provider: Arc<dyn RelayProvider>,
    conf: ValidationConf,
}

impl MetaTxValidator {
    /// Create a validator reading chain state through `provider`
    pub fn new(provider: Arc<dyn RelayProvider>, conf: ValidationConf) -> Self {
        Self { provider, conf }
    }

    /// Validate against the current wall clock. See [`Self::validate_at`].
    pub async fn validate(
        &self,
        sender: &str,
        token: Address,
        args: &DecodedArgs,
        block_hash: Option<H256>,
    ) -> Result<(), ValidationFailure> {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        self.validate_at(now, sender, token, args, block_hash).await
    }

    /// Validate a call of `token` made by `sender` with arguments `args`,
    /// using `block_hash` (or the latest block) as the reference for chain
    /// state and `now` (unix seconds) as the current time.
    #[instrument(skip(self, args), fields(kind = %args.kind, counterparty = ?args.counterparty))]
    pub async fn validate_at(
        &self,
        now: u64,
        sender: &str,
        token: Address,
        args: &DecodedArgs,
        block_hash: Option<H256>,
    ) -> Result<(), ValidationFailure> {
        if args.amount.is_zero() {
            return Err(ValidationFailure::ZeroAmount(args.kind));
        }

        let sender_address = normalize_address(sender)
            .ok_or_else(|| ValidationFailure::InvalidSender(sender.to_owned()))?;
        if sender_address == fmt_address(&args.counterparty) {
            return Err(ValidationFailure::SelfTarget(args.kind));
        }

        if self.conf.full_withdrawal_only && args.kind == MetaTxKind::Transfer {
            self.check_full_withdrawal(&sender_address, token, args).await?;
        }

        let block_id = block_hash
            .map(BlockId::Hash)
            .unwrap_or(BlockId::Number(BlockNumber::Latest));
        let block_ref = BlockRef(&block_id).to_string();

        let block = match self.provider.get_block(block_id).await {
            Ok(Some(block)) => block,
            Ok(None) => return Err(ValidationFailure::UnknownBlock(block_ref)),
            Err(err) => {
                warn!(block = %block_ref, ?err, "Failed to fetch reference block");
                return Err(ValidationFailure::UnknownBlock(block_ref));
            }
        };

        if block.is_pending() {
            return Err(ValidationFailure::PendingBlock(block_ref));
        }

        let age = now.saturating_sub(block.timestamp);
        if age > self.conf.max_block_age_secs {
            return Err(ValidationFailure::StaleBlock {
                block: block_ref,
                age,
                max_age: self.conf.max_block_age_secs,
            });
        }

        debug!(block = %block_ref, age, "Meta-transaction passed validation");
        Ok(())
    }

    async fn check_full_withdrawal(
        &self,
        sender: &str,
        token: Address,
        args: &DecodedArgs,
    ) -> Result<(), ValidationFailure> {
        let owner = parse_address(sender)
            .ok_or_else(|| ValidationFailure::InvalidSender(sender.to_owned()))?;
        let balance = self
            .provider
            .token_balance(token, owner)
            .await
            .map_err(|err| {
                warn!(?token, ?owner, ?err, "Failed to fetch token balance");
                ValidationFailure::BalanceUnavailable(sender.to_owned())
            })?;
        if balance != args.amount {
            return Err(ValidationFailure::PartialWithdrawal);
        }
        Ok(())
    }
}

use std::time::Duration;

use ethers::types::U256;
use serde::Deserialize;

/// Gas limit applied to requests that do not carry their own
pub const DEFAULT_GAS_LIMIT: u64 = 500_000;

const GWEI: u64 = 1_000_000_000;

/// How the operator prices its transactions. Prices are in wei and are never
/// raised above the ceiling, whatever the network conditions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeePolicy {
    /// Pre-EIP-1559 transactions with a fixed gas price
    Legacy {
        /// Price bid on every transaction
        gas_price: u64,
        /// Hard cap on `gas_price`
        gas_price_ceiling: u64,
    },
    /// EIP-1559 transactions with fixed fee caps
    Eip1559 {
        /// `maxFeePerGas` bid on every transaction
        max_fee_per_gas: u64,
        /// `maxPriorityFeePerGas` bid on every transaction
        max_priority_fee_per_gas: u64,
        /// Hard cap on `max_fee_per_gas`
        gas_price_ceiling: u64,
    },
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy::Legacy {
            gas_price: GWEI,
            gas_price_ceiling: 5 * GWEI,
        }
    }
}

impl FeePolicy {
    /// Gas price (or max fee per gas) bid on transactions, bounded by the ceiling
    pub fn gas_price(&self) -> U256 {
        let price = match self {
            FeePolicy::Legacy { gas_price, .. } => *gas_price,
            FeePolicy::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        };
        U256::from(price).min(self.gas_price_ceiling())
    }

    /// Highest price the operator will ever pay per unit of gas
    pub fn gas_price_ceiling(&self) -> U256 {
        match self {
            FeePolicy::Legacy {
                gas_price_ceiling, ..
            }
            | FeePolicy::Eip1559 {
                gas_price_ceiling, ..
            } => U256::from(*gas_price_ceiling),
        }
    }

    /// Priority fee for EIP-1559 transactions, never above the max fee
    pub fn priority_fee(&self) -> Option<U256> {
        match self {
            FeePolicy::Legacy { .. } => None,
            FeePolicy::Eip1559 {
                max_priority_fee_per_gas,
                ..
            } => Some(U256::from(*max_priority_fee_per_gas).min(self.gas_price())),
        }
    }
}

/// Dispatcher configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Chain id set on every transaction so it cannot be replayed elsewhere
    pub chain_id: u64,
    /// Gas limit for requests that do not specify one
    pub default_gas_limit: u64,
    /// Period of the reconciliation tick
    pub tick_interval_secs: u64,
    /// How often `stop` checks whether the queue has drained
    pub drain_poll_interval_secs: u64,
    /// Delay after finding a pending transaction this dispatcher did not send
    pub nonce_backoff_millis: u64,
    /// Maximum number of queued requests. Unbounded when absent.
    pub max_queue_size: Option<usize>,
    /// Transaction pricing
    pub fee: FeePolicy,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            chain_id: 1,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            tick_interval_secs: 30,
            drain_poll_interval_secs: 10,
            nonce_backoff_millis: 1_000,
            max_queue_size: None,
            fee: FeePolicy::default(),
        }
    }
}

impl DispatcherSettings {
    pub(crate) fn tick_interval(&self) -> Duration {
        // tokio intervals cannot have a zero period
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub(crate) fn drain_poll_interval(&self) -> Duration {
        Duration::from_secs(self.drain_poll_interval_secs.max(1))
    }

    pub(crate) fn nonce_backoff(&self) -> Duration {
        Duration::from_millis(self.nonce_backoff_millis)
    }

    pub(crate) fn default_gas_limit(&self) -> U256 {
        U256::from(self.default_gas_limit)
    }
}

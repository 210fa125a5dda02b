//! Relayer settings.
//!
//! Loaded from, in increasing priority: every `*.json` file in `./config`,
//! the files listed in the comma-separated `CONFIG_FILES` env var, and env
//! vars prefixed with `GASLESS_`, using `__` to separate nested keys
//! (e.g. `GASLESS_SIGNER__KEY`, `GASLESS_DISPATCHER__DEFAULT_GAS_LIMIT`).

use eyre::Result;
use gasless_core::ValidationConf;
use gasless_dispatcher::DispatcherSettings;
use gasless_ethereum::{ConnectionConf, SignerConf};
use serde::Deserialize;

pub use self::loader::load_settings_from;
use self::trace::TracingConfig;

mod loader;
/// Tracing subscriber configuration
pub mod trace;

const DEFAULT_METRICS_PORT: u16 = 9090;

/// Settings of the relayer agent
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerSettings {
    /// Node to relay through
    pub chain: ConnectionConf,
    /// Operator account
    pub signer: SignerConf,
    /// Dispatcher tuning. Its chain id is taken from `chain`.
    #[serde(default)]
    pub dispatcher: DispatcherSettings,
    /// Meta-transaction business rules
    #[serde(default)]
    pub validation: ValidationConf,
    /// Port the prometheus metrics are served on
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Logging
    #[serde(default)]
    pub tracing: TracingConfig,
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl RelayerSettings {
    /// Load settings from the config directory, `CONFIG_FILES` and the
    /// environment
    pub fn load() -> Result<Self> {
        loader::load_settings()
    }

    /// Dispatcher settings signing for the configured chain
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            chain_id: self.chain.chain_id,
            ..self.dispatcher.clone()
        }
    }
}

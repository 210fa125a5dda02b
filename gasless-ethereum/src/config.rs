use serde::Deserialize;
use url::Url;

/// Ethereum connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConf {
    /// JSON-RPC endpoint of the node
    pub rpc_url: Url,
    /// Chain id the operator signs for
    pub chain_id: u64,
}

/// Key of the operator account
#[derive(Clone, Deserialize)]
pub struct SignerConf {
    /// Hex-encoded secp256k1 private key
    pub key: String,
}

impl std::fmt::Debug for SignerConf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerConf").field("key", &"<redacted>").finish()
    }
}

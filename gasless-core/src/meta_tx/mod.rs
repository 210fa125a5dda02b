pub use decoder::*;
pub use validator::*;

mod decoder;
mod validator;

use std::fmt;

use ethers::types::{Address, U256};

/// The shape of a meta-transaction call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaTxKind {
    /// Moves tokens from the signer to a recipient
    Transfer,
    /// Grants a spender an allowance over the signer's tokens
    Approve,
}

impl fmt::Display for MetaTxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaTxKind::Transfer => f.write_str("transfer"),
            MetaTxKind::Approve => f.write_str("approve"),
        }
    }
}

/// Arguments extracted from a meta-transaction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedArgs {
    /// Which call these arguments belong to
    pub kind: MetaTxKind,
    /// Recipient of a transfer or spender of an approval
    pub counterparty: Address,
    /// Token amount
    pub amount: U256,
}

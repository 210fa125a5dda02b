use ethers::abi::{Function, HumanReadableParser, Param, ParamType, StateMutability, Token};
use once_cell::sync::Lazy;

use super::{DecodedArgs, MetaTxKind};

/// Decodes `transfer(address recipient, uint256 amount)` calls
pub static TRANSFER_DECODER: Lazy<CallDecoder> =
    Lazy::new(|| CallDecoder::new(MetaTxKind::Transfer, erc20_function("transfer", "recipient")));

/// Decodes `approve(address spender, uint256 amount)` calls
pub static APPROVE_DECODER: Lazy<CallDecoder> =
    Lazy::new(|| CallDecoder::new(MetaTxKind::Approve, erc20_function("approve", "spender")));

/// Errors building a decoder from a function signature
#[derive(Debug, thiserror::Error)]
pub enum DecoderSetupError {
    /// The signature could not be parsed
    #[error("Invalid function signature `{signature}`: {reason}")]
    InvalidSignature {
        /// The offending signature
        signature: String,
        /// Parser message
        reason: String,
    },
    /// The function lacks the parameters a meta-transaction needs
    #[error("Function `{0}` must take at least one address and one uint parameter")]
    MissingParams(String),
}

/// Recognizes calls to a single function by selector and extracts the
/// counterparty address and amount from them.
#[derive(Debug, Clone)]
pub struct CallDecoder {
    kind: MetaTxKind,
    function: Function,
    selector: [u8; 4],
}

impl CallDecoder {
    /// Build a decoder for an ABI function. The selector is computed here, once.
    pub fn new(kind: MetaTxKind, function: Function) -> Self {
        let selector = function.short_signature();
        Self {
            kind,
            function,
            selector,
        }
    }

    /// Build a decoder from a human-readable signature such as
    /// `function transfer(address recipient, uint256 amount)`
    pub fn from_signature(kind: MetaTxKind, signature: &str) -> Result<Self, DecoderSetupError> {
        let signature = signature.trim();
        let full = if signature.starts_with("function ") {
            signature.to_owned()
        } else {
            format!("function {signature}")
        };
        let function = HumanReadableParser::parse_function(&full).map_err(|err| {
            DecoderSetupError::InvalidSignature {
                signature: signature.to_owned(),
                reason: err.to_string(),
            }
        })?;

        let has_address = function
            .inputs
            .iter()
            .any(|param| matches!(param.kind, ParamType::Address));
        let has_amount = function
            .inputs
            .iter()
            .any(|param| matches!(param.kind, ParamType::Uint(_)));
        if !has_address || !has_amount {
            return Err(DecoderSetupError::MissingParams(function.signature()));
        }
        Ok(Self::new(kind, function))
    }

    /// The 4-byte selector calls must start with
    pub fn selector(&self) -> [u8; 4] {
        self.selector
    }

    /// Which call shape this decoder produces
    pub fn kind(&self) -> MetaTxKind {
        self.kind
    }

    /// Decode `data` as a call to this decoder's function.
    ///
    /// Returns `None` when the selector belongs to another function or the
    /// parameters are malformed; neither is treated as a fault.
    pub fn decode(&self, data: &[u8]) -> Option<DecodedArgs> {
        if data.len() < 4 || data[..4] != self.selector {
            return None;
        }
        let tokens = self.function.decode_input(&data[4..]).ok()?;

        let counterparty = tokens.iter().find_map(|token| match token {
            Token::Address(address) => Some(*address),
            _ => None,
        })?;
        let amount = tokens.iter().find_map(|token| match token {
            Token::Uint(amount) => Some(*amount),
            _ => None,
        })?;

        Some(DecodedArgs {
            kind: self.kind,
            counterparty,
            amount,
        })
    }
}

/// Try every built-in decoder in turn
pub fn decode_meta_call(data: &[u8]) -> Option<DecodedArgs> {
    [&*TRANSFER_DECODER, &*APPROVE_DECODER]
        .into_iter()
        .find_map(|decoder| decoder.decode(data))
}

fn erc20_function(name: &str, counterparty: &str) -> Function {
    #[allow(deprecated)]
    Function {
        name: name.to_owned(),
        inputs: vec![
            Param {
                name: counterparty.to_owned(),
                kind: ParamType::Address,
                internal_type: None,
            },
            Param {
                name: "amount".to_owned(),
                kind: ParamType::Uint(256),
                internal_type: None,
            },
        ],
        outputs: vec![Param {
            name: String::new(),
            kind: ParamType::Bool,
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::NonPayable,
    }
}

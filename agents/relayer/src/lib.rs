//! The gasless relayer accepts meta-transactions signed by users who hold no
//! gas, checks them against current chain state and broadcasts them from a
//! single operator account.
//!
//! Every accepted call goes through [`relayer::MetaTxRelayer::relay`]: the
//! call is decoded, validated and handed to the transaction dispatcher, which
//! broadcasts one transaction at a time.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod relayer;
pub mod server;
pub mod settings;

//! `ethers`-backed implementation of the relayer's chain capability

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use self::{config::*, provider::*};

mod config;
mod provider;

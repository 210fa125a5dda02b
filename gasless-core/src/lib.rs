//! Core types and traits shared by the gasless relayer components.
//!
//! This crate holds everything that does not depend on a concrete chain client:
//! the outbound request model, the `RelayProvider` capability the dispatcher and
//! validator call into, the FIFO used to hold outbound requests, and the
//! meta-transaction decode/validate pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use error::*;
pub use meta_tx::*;
pub use queue::BoundedQueue;
pub use traits::*;
pub use types::*;

mod error;
mod meta_tx;
mod queue;
mod traits;
mod types;

/// Helpers for working with hex-encoded addresses
pub mod utils;

/// Mocks for the traits in this crate
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

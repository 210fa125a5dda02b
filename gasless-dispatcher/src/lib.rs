//! Broadcasts outbound requests from a single operator account, one
//! transaction at a time.
//!
//! Callers hand an [`OutboundRequest`](gasless_core::OutboundRequest) to
//! [`TransactionDispatcher::submit`] and get back the hash of the broadcast
//! transaction, or the reason it was refused. All queue and pending-transaction
//! state is owned by a single worker task, so requests are processed strictly
//! in submission order and at most one transaction is ever awaiting inclusion.

#![deny(clippy::unwrap_used, clippy::panic)]

pub use dispatcher::TransactionDispatcher;
pub use error::DispatcherError;
pub use metrics::DispatcherMetrics;
pub use settings::{DispatcherSettings, FeePolicy, DEFAULT_GAS_LIMIT};

mod dispatcher;
mod error;
mod metrics;
mod settings;

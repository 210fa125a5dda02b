use ethers::types::U256;
use gasless_core::ChainCommunicationError;

/// Reasons a submitted request did not produce a broadcast transaction
#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    /// `submit` was called before `start`, or after `stop`
    #[error("Dispatcher has not been started")]
    NotStarted,
    /// The queue already holds the configured maximum number of requests
    #[error("Dispatcher queue is full ({0} requests waiting)")]
    QueueFull(usize),
    /// The call would use more gas than the request allows
    #[error("Gas estimate {estimate} exceeds the gas limit of {limit}")]
    GasLimitExceeded {
        /// Gas the node expects the call to use
        estimate: U256,
        /// The request's gas limit, or the dispatcher default
        limit: U256,
    },
    /// The node could not simulate the call
    #[error("Gas estimation failed: {0}")]
    GasEstimation(#[source] ChainCommunicationError),
    /// The node refused the transaction
    #[error("Transaction submission failed: {0}")]
    Submission(#[source] ChainCommunicationError),
    /// The dispatcher worker is gone
    #[error("Dispatcher is no longer running")]
    ChannelClosed,
}

impl DispatcherError {
    /// Label used for the `rejected_requests` metric
    pub fn reason(&self) -> &'static str {
        match self {
            DispatcherError::NotStarted => "not_started",
            DispatcherError::QueueFull(_) => "queue_full",
            DispatcherError::GasLimitExceeded { .. } => "gas_limit",
            DispatcherError::GasEstimation(_) => "estimate",
            DispatcherError::Submission(_) => "submission",
            DispatcherError::ChannelClosed => "channel_closed",
        }
    }
}

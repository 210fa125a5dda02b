use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use gasless_core::{OutboundRequest, RelayProvider};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{info, info_span, instrument, warn, Instrument};

use crate::{DispatcherError, DispatcherMetrics, DispatcherSettings};

use state::DispatcherState;

mod state;

#[cfg(test)]
mod tests;

/// Messages processed by the dispatcher worker, in the order they were sent
pub(crate) enum DispatcherMessage {
    /// A new request from `submit`
    Submit(QueuedItem),
    /// Periodic reconciliation trigger
    Tick,
}

/// A request waiting in the queue, with the channel its submitter is listening on
pub(crate) struct QueuedItem {
    pub request: OutboundRequest,
    responder: oneshot::Sender<Result<H256, DispatcherError>>,
}

impl QueuedItem {
    /// Settle the submitter's future. The submitter may have given up
    /// waiting, which is not an error here.
    pub fn resolve(self, result: Result<H256, DispatcherError>) {
        let _ = self.responder.send(result);
    }
}

/// Serializes broadcasts from the operator account.
///
/// All queue and pending state lives in a worker task spawned by [`Self::new`];
/// this handle only talks to it over a channel. Dropping the handle aborts the
/// worker and the ticker.
pub struct TransactionDispatcher {
    address: Address,
    settings: DispatcherSettings,
    sender: mpsc::UnboundedSender<DispatcherMessage>,
    /// Requests accepted by `submit` and not yet taken off the queue
    queue_size: Arc<AtomicUsize>,
    started: AtomicBool,
    ticker: Mutex<Option<JoinHandle<()>>>,
    worker: JoinHandle<()>,
}

impl TransactionDispatcher {
    /// Spawn the dispatcher worker for the operator account of `provider`.
    /// Must be called from within a tokio runtime.
    pub fn new(
        provider: Arc<dyn RelayProvider>,
        settings: DispatcherSettings,
        metrics: DispatcherMetrics,
    ) -> Self {
        let address = provider.signer();
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue_size = Arc::new(AtomicUsize::new(0));

        let state = DispatcherState::new(provider, settings.clone(), metrics, queue_size.clone());
        let worker = tokio::spawn(
            state
                .run(receiver)
                .instrument(info_span!("TransactionDispatcher", ?address)),
        );

        Self {
            address,
            settings,
            sender,
            queue_size,
            started: AtomicBool::new(false),
            ticker: Mutex::new(None),
            worker,
        }
    }

    /// Start the periodic reconciliation tick and begin accepting requests.
    /// Calling it again replaces the running tick.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock();
        if let Some(previous) = ticker.take() {
            previous.abort();
        }

        let sender = self.sender.clone();
        let period = self.settings.tick_interval();
        *ticker = Some(tokio::spawn(
            async move {
                let mut ticks = interval(period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    if sender.send(DispatcherMessage::Tick).is_err() {
                        break;
                    }
                }
            }
            .instrument(info_span!("DispatcherTicker", address = ?self.address)),
        ));

        self.started.store(true, Ordering::SeqCst);
        info!(address = ?self.address, ?period, "Dispatcher started");
    }

    /// Queue `request` for broadcast and wait for the outcome.
    ///
    /// Resolves with the transaction hash as soon as the node has accepted the
    /// transaction, not once it is mined.
    #[instrument(skip(self, request), fields(to = ?request.to))]
    pub async fn submit(&self, request: OutboundRequest) -> Result<H256, DispatcherError> {
        if !self.is_started() {
            return Err(DispatcherError::NotStarted);
        }

        let (responder, outcome) = oneshot::channel();
        self.queue_size.fetch_add(1, Ordering::SeqCst);
        let item = QueuedItem { request, responder };
        if self.sender.send(DispatcherMessage::Submit(item)).is_err() {
            self.queue_size.fetch_sub(1, Ordering::SeqCst);
            return Err(DispatcherError::ChannelClosed);
        }

        outcome.await.map_err(|_| DispatcherError::ChannelClosed)?
    }

    /// Wait for every queued request to be taken off the queue, then stop the
    /// tick. A transaction that is already broadcast is left to be mined.
    pub async fn stop(&self) {
        loop {
            let queue_size = self.queue_size();
            if queue_size == 0 {
                break;
            }
            warn!(
                queue_size,
                "Waiting for the dispatcher queue to drain before stopping"
            );
            sleep(self.settings.drain_poll_interval()).await;
        }

        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
        self.started.store(false, Ordering::SeqCst);
        info!(address = ?self.address, "Dispatcher stopped");
    }

    /// Whether `submit` currently accepts requests
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// The operator account
    pub fn address(&self) -> Address {
        self.address
    }

    /// Requests accepted by `submit` and not yet taken off the queue
    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::SeqCst)
    }

    /// Gas price (or max fee per gas) bid on every transaction
    pub fn gas_price(&self) -> U256 {
        self.settings.fee.gas_price()
    }

    /// The most the operator will ever pay per unit of gas
    pub fn gas_price_ceiling(&self) -> U256 {
        self.settings.fee.gas_price_ceiling()
    }
}

impl Drop for TransactionDispatcher {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
        self.worker.abort();
    }
}

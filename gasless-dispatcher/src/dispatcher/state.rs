use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Eip1559TransactionRequest, TransactionRequest, H256, U256,
};
use gasless_core::{BoundedQueue, ChainResult, OutboundRequest, RelayProvider};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::{DispatcherError, DispatcherMetrics, DispatcherSettings, FeePolicy};

use super::{DispatcherMessage, QueuedItem};

/// A broadcast transaction that has not been seen in a block yet
#[derive(Debug)]
struct PendingItem {
    request: OutboundRequest,
    tx_hash: H256,
}

/// What the worker should do after a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconciled {
    /// Nothing queued
    Idle,
    /// Blocked on the chain; retry on the next message
    Waiting,
    /// An item was taken off the queue; go again right away
    Continue,
}

/// State owned exclusively by the dispatcher worker task
pub(crate) struct DispatcherState {
    provider: Arc<dyn RelayProvider>,
    address: Address,
    settings: DispatcherSettings,
    metrics: DispatcherMetrics,
    queue: BoundedQueue<QueuedItem>,
    pending: Option<PendingItem>,
    queue_size: Arc<AtomicUsize>,
}

impl DispatcherState {
    pub fn new(
        provider: Arc<dyn RelayProvider>,
        settings: DispatcherSettings,
        metrics: DispatcherMetrics,
        queue_size: Arc<AtomicUsize>,
    ) -> Self {
        let address = provider.signer();
        let queue = BoundedQueue::new(settings.max_queue_size);
        Self {
            provider,
            address,
            settings,
            metrics,
            queue,
            pending: None,
            queue_size,
        }
    }

    /// Process messages until every sender is gone. Messages that arrive
    /// while a pass is running are batched into the next one.
    pub async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<DispatcherMessage>) {
        while let Some(message) = receiver.recv().await {
            self.handle(message);
            while let Ok(message) = receiver.try_recv() {
                self.handle(message);
            }
            self.reconcile_until_settled().await;
        }
        debug!("Dispatcher channel closed, stopping worker");
    }

    fn handle(&mut self, message: DispatcherMessage) {
        match message {
            DispatcherMessage::Submit(item) => self.enqueue(item),
            DispatcherMessage::Tick => debug!("Reconciliation tick"),
        }
    }

    fn enqueue(&mut self, item: QueuedItem) {
        if let Err(item) = self.queue.push(item) {
            let capacity = self.queue.capacity().unwrap_or_default();
            warn!(capacity, to = ?item.request.to, "Dispatcher queue is full, rejecting request");
            self.queue_size.fetch_sub(1, Ordering::SeqCst);
            self.reject(item, DispatcherError::QueueFull(capacity));
            return;
        }
        debug!(queue_length = self.queue.len(), "Request queued");
        self.update_queue_metric();
    }

    async fn reconcile_until_settled(&mut self) {
        while self.reconcile().await == Reconciled::Continue {}
    }

    #[instrument(
        skip(self),
        fields(
            queue_length = self.queue.len(),
            pending_tx = ?self.pending.as_ref().map(|pending| pending.tx_hash),
        )
    )]
    async fn reconcile(&mut self) -> Reconciled {
        if let Some(tx_hash) = self.pending.as_ref().map(|pending| pending.tx_hash) {
            match self.provider.get_transaction(tx_hash).await {
                Ok(Some(tx)) if tx.is_mined() => {
                    info!(?tx_hash, block_number = ?tx.block_number, "Pending transaction mined");
                    self.metrics.mined_transactions.inc();
                    self.set_pending(None);
                }
                Ok(Some(_)) => {
                    debug!(?tx_hash, "Transaction not mined yet");
                    return Reconciled::Waiting;
                }
                Ok(None) => {
                    warn!(?tx_hash, "Node does not know the pending transaction");
                    return Reconciled::Waiting;
                }
                Err(err) => {
                    warn!(?tx_hash, ?err, "Failed to look up pending transaction");
                    return Reconciled::Waiting;
                }
            }
        }

        if self.queue.is_empty() {
            return Reconciled::Idle;
        }

        let nonce = match self.fetch_nonces().await {
            Ok((latest, pending)) if latest == pending => latest,
            Ok((latest, pending)) => {
                warn!(
                    ?latest,
                    ?pending,
                    backoff = ?self.settings.nonce_backoff(),
                    "Operator account has a pending transaction this dispatcher did not send"
                );
                self.metrics.nonce_mismatches.inc();
                sleep(self.settings.nonce_backoff()).await;
                return Reconciled::Waiting;
            }
            Err(err) => {
                warn!(?err, "Failed to fetch operator nonce");
                return Reconciled::Waiting;
            }
        };

        let Some(item) = self.queue.pop() else {
            return Reconciled::Idle;
        };
        self.queue_size.fetch_sub(1, Ordering::SeqCst);
        self.update_queue_metric();

        self.dispatch(item, nonce).await;
        Reconciled::Continue
    }

    async fn fetch_nonces(&self) -> ChainResult<(U256, U256)> {
        let latest = self
            .provider
            .get_transaction_count(self.address, BlockNumber::Latest)
            .await?;
        let pending = self
            .provider
            .get_transaction_count(self.address, BlockNumber::Pending)
            .await?;
        Ok((latest, pending))
    }

    /// Estimate, build and broadcast the transaction for `item`, settling its
    /// submitter either way.
    #[instrument(skip(self, item), fields(to = ?item.request.to))]
    async fn dispatch(&mut self, item: QueuedItem, nonce: U256) {
        let gas_limit = item
            .request
            .gas_limit
            .unwrap_or_else(|| self.settings.default_gas_limit());

        let call: TypedTransaction = TransactionRequest::new()
            .from(self.address)
            .to(item.request.to)
            .data(item.request.data.clone())
            .into();
        let estimate = match self.provider.estimate_gas(&call).await {
            Ok(estimate) => estimate,
            Err(err) => {
                warn!(?err, "Gas estimation failed");
                self.reject(item, DispatcherError::GasEstimation(err));
                return;
            }
        };
        if estimate > gas_limit {
            warn!(?estimate, ?gas_limit, "Gas estimate exceeds the gas limit");
            self.reject(
                item,
                DispatcherError::GasLimitExceeded {
                    estimate,
                    limit: gas_limit,
                },
            );
            return;
        }

        let tx = self.build_transaction(&item.request, nonce, gas_limit);
        match self.provider.send_transaction(tx).await {
            Ok(tx_hash) => {
                info!(?tx_hash, ?estimate, "Transaction broadcast");
                self.metrics.broadcast_transactions.inc();
                self.set_pending(Some(PendingItem {
                    request: item.request.clone(),
                    tx_hash,
                }));
                item.resolve(Ok(tx_hash));
            }
            Err(err) => {
                warn!(?err, "Transaction submission failed");
                self.reject(item, DispatcherError::Submission(err));
            }
        }
    }

    fn build_transaction(
        &self,
        request: &OutboundRequest,
        nonce: U256,
        gas_limit: U256,
    ) -> TypedTransaction {
        let fee = &self.settings.fee;
        match fee {
            FeePolicy::Legacy { .. } => TransactionRequest::new()
                .from(self.address)
                .to(request.to)
                .data(request.data.clone())
                .nonce(nonce)
                .gas(gas_limit)
                .gas_price(fee.gas_price())
                .chain_id(self.settings.chain_id)
                .into(),
            FeePolicy::Eip1559 { .. } => Eip1559TransactionRequest::new()
                .from(self.address)
                .to(request.to)
                .data(request.data.clone())
                .nonce(nonce)
                .gas(gas_limit)
                .max_fee_per_gas(fee.gas_price())
                .max_priority_fee_per_gas(fee.priority_fee().unwrap_or_default())
                .chain_id(self.settings.chain_id)
                .into(),
        }
    }

    fn reject(&self, item: QueuedItem, err: DispatcherError) {
        self.metrics.update_rejected_requests_metric(err.reason());
        item.resolve(Err(err));
    }

    fn set_pending(&mut self, pending: Option<PendingItem>) {
        if let Some(pending) = &pending {
            debug!(tx_hash = ?pending.tx_hash, to = ?pending.request.to, "Awaiting inclusion");
        }
        self.metrics
            .pending_transactions
            .set(i64::from(pending.is_some()));
        self.pending = pending;
    }

    fn update_queue_metric(&self) {
        self.metrics.queue_length.set(self.queue.len() as i64);
    }
}

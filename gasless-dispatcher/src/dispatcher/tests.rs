use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, H256, U256, U64};
use gasless_core::mocks::MockRelayProvider;
use gasless_core::{ChainCommunicationError, OutboundRequest, TxInfo};
use parking_lot::Mutex;
use tokio::time::{sleep, Instant};
use tracing_test::traced_test;

use crate::{DispatcherError, DispatcherMetrics, DispatcherSettings, FeePolicy};

use super::TransactionDispatcher;

const GWEI: u64 = 1_000_000_000;
const ESTIMATE: u64 = 21_000;

fn operator() -> Address {
    Address::repeat_byte(0x0a)
}

fn target(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

fn reverting_target() -> Address {
    Address::repeat_byte(0xee)
}

fn request(to: Address) -> OutboundRequest {
    OutboundRequest::new(to, Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb]), None)
}

/// Chain state shared between a test and its mocked provider
#[derive(Default)]
struct FakeChain {
    events: Mutex<Vec<String>>,
    sent: Mutex<Vec<TypedTransaction>>,
    nonce: AtomicU64,
    /// Transactions sent by someone else that are still in the mempool
    foreign_pending: AtomicU64,
    /// Whether lookups report sent transactions as mined
    mined: AtomicBool,
    /// Number of upcoming broadcasts the node refuses
    refused_sends: AtomicU64,
    /// Number of upcoming lookups for which the node knows no transaction
    unknown_lookups: AtomicU64,
    /// Number of upcoming lookups that fail outright
    failed_lookups: AtomicU64,
}

impl FakeChain {
    fn log(&self, event: String) {
        self.events.lock().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn sent(&self) -> Vec<TypedTransaction> {
        self.sent.lock().clone()
    }

    fn lookups(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| event.starts_with("lookup"))
            .count()
    }
}

/// Decrement `counter` if it is positive, reporting whether it was
fn consume(counter: &AtomicU64) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

fn destination(tx: &TypedTransaction) -> Address {
    tx.to_addr().copied().unwrap_or_default()
}

fn mock_provider(chain: Arc<FakeChain>) -> MockRelayProvider {
    let mut provider = MockRelayProvider::new();
    provider.expect_signer().return_const(operator());

    let state = chain.clone();
    provider
        .expect_get_transaction_count()
        .returning(move |address, block| {
            assert_eq!(address, operator());
            let latest = state.nonce.load(Ordering::SeqCst);
            let count = match block {
                BlockNumber::Pending => latest + state.foreign_pending.load(Ordering::SeqCst),
                _ => latest,
            };
            Ok(U256::from(count))
        });

    let state = chain.clone();
    provider.expect_estimate_gas().returning(move |tx| {
        let to = destination(tx);
        state.log(format!("estimate {to:?}"));
        if to == reverting_target() {
            return Err(ChainCommunicationError::from_other_str(
                "execution reverted",
            ));
        }
        Ok(U256::from(ESTIMATE))
    });

    let state = chain.clone();
    provider.expect_send_transaction().returning(move |tx| {
        state.log(format!("send {:?}", destination(&tx)));
        if consume(&state.refused_sends) {
            return Err(ChainCommunicationError::from_other_str(
                "replacement transaction underpriced",
            ));
        }
        let nonce = state.nonce.fetch_add(1, Ordering::SeqCst);
        state.sent.lock().push(tx);
        Ok(H256::from_low_u64_be(nonce + 1))
    });

    let state = chain;
    provider.expect_get_transaction().returning(move |hash| {
        state.log(format!("lookup {hash:?}"));
        if consume(&state.unknown_lookups) {
            return Ok(None);
        }
        if consume(&state.failed_lookups) {
            return Err(ChainCommunicationError::from_other_str("connection reset"));
        }
        Ok(Some(TxInfo {
            hash,
            block_number: state.mined.load(Ordering::SeqCst).then_some(1),
        }))
    });

    provider
}

fn started_dispatcher(
    chain: Arc<FakeChain>,
    settings: DispatcherSettings,
) -> (Arc<TransactionDispatcher>, DispatcherMetrics) {
    let metrics = DispatcherMetrics::dummy_instance();
    let dispatcher =
        TransactionDispatcher::new(Arc::new(mock_provider(chain)), settings, metrics.clone());
    dispatcher.start();
    (Arc::new(dispatcher), metrics)
}

#[tokio::test]
async fn test_submit_before_start_fails() {
    let chain = Arc::new(FakeChain::default());
    let dispatcher = TransactionDispatcher::new(
        Arc::new(mock_provider(chain.clone())),
        DispatcherSettings::default(),
        DispatcherMetrics::dummy_instance(),
    );

    let err = dispatcher.submit(request(target(0x01))).await.unwrap_err();
    assert!(matches!(err, DispatcherError::NotStarted));
    assert_eq!(dispatcher.queue_size(), 0);
    assert!(chain.events().is_empty());
}

#[tokio::test]
async fn test_accessors() {
    let chain = Arc::new(FakeChain::default());
    let settings = DispatcherSettings {
        fee: FeePolicy::Legacy {
            gas_price: 2 * GWEI,
            gas_price_ceiling: 7 * GWEI,
        },
        ..Default::default()
    };
    let (dispatcher, _) = started_dispatcher(chain, settings);

    assert!(dispatcher.is_started());
    assert_eq!(dispatcher.address(), operator());
    assert_eq!(dispatcher.queue_size(), 0);
    assert_eq!(dispatcher.gas_price(), U256::from(2 * GWEI));
    assert_eq!(dispatcher.gas_price_ceiling(), U256::from(7 * GWEI));
}

#[tokio::test]
async fn test_back_to_back_submissions_are_broadcast_in_order() {
    let chain = Arc::new(FakeChain::default());
    chain.mined.store(true, Ordering::SeqCst);
    let (dispatcher, metrics) = started_dispatcher(chain.clone(), DispatcherSettings::default());

    let (first, second) = tokio::join!(
        dispatcher.submit(request(target(0x01))),
        dispatcher.submit(request(target(0x02))),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_ne!(first, second);

    // the second transaction is only estimated once the first one has been
    // broadcast and seen mined
    let events = chain.events();
    assert_eq!(
        events[..5],
        [
            format!("estimate {:?}", target(0x01)),
            format!("send {:?}", target(0x01)),
            format!("lookup {first:?}"),
            format!("estimate {:?}", target(0x02)),
            format!("send {:?}", target(0x02)),
        ]
    );

    let nonces: Vec<_> = chain
        .sent()
        .iter()
        .map(|tx| tx.nonce().copied())
        .collect();
    assert_eq!(nonces, vec![Some(U256::zero()), Some(U256::one())]);
    assert_eq!(metrics.broadcast_transactions.get(), 2);
    assert_eq!(dispatcher.queue_size(), 0);
}

#[tokio::test]
async fn test_estimate_failure_rejects_only_that_request() {
    let chain = Arc::new(FakeChain::default());
    chain.mined.store(true, Ordering::SeqCst);
    let (dispatcher, metrics) = started_dispatcher(chain.clone(), DispatcherSettings::default());

    let err = dispatcher
        .submit(request(reverting_target()))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatcherError::GasEstimation(_)));
    assert!(err.to_string().contains("execution reverted"));

    let hash = dispatcher.submit(request(target(0x01))).await.unwrap();
    assert_eq!(hash, H256::from_low_u64_be(1));
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(
        metrics
            .rejected_requests
            .with_label_values(&["estimate"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_submission_failure_rejects_only_that_request() {
    let chain = Arc::new(FakeChain::default());
    chain.mined.store(true, Ordering::SeqCst);
    chain.refused_sends.store(1, Ordering::SeqCst);
    let (dispatcher, metrics) = started_dispatcher(chain.clone(), DispatcherSettings::default());

    let err = dispatcher.submit(request(target(0x01))).await.unwrap_err();
    assert!(matches!(err, DispatcherError::Submission(_)));
    assert!(err
        .to_string()
        .contains("replacement transaction underpriced"));
    assert_eq!(dispatcher.queue_size(), 0);
    assert!(chain.sent().is_empty());
    assert_eq!(metrics.pending_transactions.get(), 0);
    assert_eq!(
        metrics
            .rejected_requests
            .with_label_values(&["submission"])
            .get(),
        1
    );

    // the refused request is dropped, the next one goes out with the same nonce
    let hash = dispatcher.submit(request(target(0x02))).await.unwrap();
    assert_eq!(hash, H256::from_low_u64_be(1));
    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(destination(&sent[0]), target(0x02));
    assert_eq!(sent[0].nonce(), Some(&U256::zero()));
    assert_eq!(metrics.broadcast_transactions.get(), 1);
}

#[tokio::test]
async fn test_gas_limit_is_enforced() {
    let chain = Arc::new(FakeChain::default());
    chain.mined.store(true, Ordering::SeqCst);
    let settings = DispatcherSettings {
        default_gas_limit: ESTIMATE - 1,
        ..Default::default()
    };
    let (dispatcher, metrics) = started_dispatcher(chain.clone(), settings);

    let err = dispatcher.submit(request(target(0x01))).await.unwrap_err();
    match err {
        DispatcherError::GasLimitExceeded { estimate, limit } => {
            assert_eq!(estimate, U256::from(ESTIMATE));
            assert_eq!(limit, U256::from(ESTIMATE - 1));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(chain.sent().is_empty());
    assert_eq!(
        metrics
            .rejected_requests
            .with_label_values(&["gas_limit"])
            .get(),
        1
    );

    // a request's own limit takes precedence over the default
    let mut generous = request(target(0x02));
    generous.gas_limit = Some(U256::from(100_000));
    dispatcher.submit(generous).await.unwrap();
    assert_eq!(chain.sent()[0].gas(), Some(&U256::from(100_000)));
}

#[tokio::test]
async fn test_legacy_transactions_pin_chain_and_price() {
    let chain = Arc::new(FakeChain::default());
    let settings = DispatcherSettings {
        chain_id: 10,
        fee: FeePolicy::Legacy {
            gas_price: 10 * GWEI,
            gas_price_ceiling: 3 * GWEI,
        },
        ..Default::default()
    };
    let (dispatcher, _) = started_dispatcher(chain.clone(), settings);

    dispatcher.submit(request(target(0x01))).await.unwrap();

    let sent = chain.sent();
    let tx = &sent[0];
    assert!(matches!(tx, TypedTransaction::Legacy(_)));
    assert_eq!(tx.from(), Some(&operator()));
    assert_eq!(tx.chain_id(), Some(U64::from(10)));
    assert_eq!(tx.gas_price(), Some(U256::from(3 * GWEI)));
    assert_eq!(tx.gas(), Some(&U256::from(500_000)));
    assert_eq!(tx.nonce(), Some(&U256::zero()));
    assert_eq!(tx.data(), Some(&request(target(0x01)).data));
}

#[tokio::test]
async fn test_eip1559_transactions_use_capped_fees() {
    let chain = Arc::new(FakeChain::default());
    let settings = DispatcherSettings {
        chain_id: 8453,
        fee: FeePolicy::Eip1559 {
            max_fee_per_gas: 4 * GWEI,
            max_priority_fee_per_gas: GWEI,
            gas_price_ceiling: 20 * GWEI,
        },
        ..Default::default()
    };
    let (dispatcher, _) = started_dispatcher(chain.clone(), settings);

    dispatcher.submit(request(target(0x01))).await.unwrap();

    let sent = chain.sent();
    let TypedTransaction::Eip1559(tx) = &sent[0] else {
        panic!("expected an EIP-1559 transaction, got {:?}", sent[0]);
    };
    assert_eq!(tx.chain_id, Some(U64::from(8453)));
    assert_eq!(tx.max_fee_per_gas, Some(U256::from(4 * GWEI)));
    assert_eq!(tx.max_priority_fee_per_gas, Some(U256::from(GWEI)));
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_transaction_is_pending() {
    let chain = Arc::new(FakeChain::default());
    let (dispatcher, metrics) = started_dispatcher(chain.clone(), DispatcherSettings::default());

    let first = dispatcher.submit(request(target(0x01))).await.unwrap();
    assert_eq!(metrics.pending_transactions.get(), 1);

    let handle = dispatcher.clone();
    let second = tokio::spawn(async move { handle.submit(request(target(0x02))).await });
    sleep(Duration::from_secs(1)).await;

    assert!(!second.is_finished());
    assert_eq!(dispatcher.queue_size(), 1);
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(metrics.pending_transactions.get(), 1);
    assert_eq!(metrics.queue_length.get(), 1);

    // the next tick sees the first transaction mined and moves on
    chain.mined.store(true, Ordering::SeqCst);
    let second = second.await.unwrap().unwrap();
    assert_ne!(first, second);
    assert_eq!(chain.sent().len(), 2);
    assert_eq!(dispatcher.queue_size(), 0);
    assert!(metrics.mined_transactions.get() >= 1);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_unknown_or_failed_lookups_keep_waiting() {
    let chain = Arc::new(FakeChain::default());
    let (dispatcher, _) = started_dispatcher(chain.clone(), DispatcherSettings::default());

    dispatcher.submit(request(target(0x01))).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    chain.unknown_lookups.store(1, Ordering::SeqCst);
    chain.failed_lookups.store(1, Ordering::SeqCst);
    chain.mined.store(true, Ordering::SeqCst);

    let handle = dispatcher.clone();
    let second = tokio::spawn(async move { handle.submit(request(target(0x02))).await });

    // first pass: the node does not know the transaction
    sleep(Duration::from_secs(1)).await;
    assert!(logs_contain("Node does not know the pending transaction"));
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(dispatcher.queue_size(), 1);

    // next tick: the lookup itself fails
    sleep(Duration::from_secs(30)).await;
    assert!(logs_contain("Failed to look up pending transaction"));
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(dispatcher.queue_size(), 1);
    assert!(!second.is_finished());

    // the tick after that sees it mined
    second.await.unwrap().unwrap();
    assert_eq!(chain.sent().len(), 2);
    assert_eq!(dispatcher.queue_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restarting_replaces_the_ticker() {
    let chain = Arc::new(FakeChain::default());
    let (dispatcher, _) = started_dispatcher(chain.clone(), DispatcherSettings::default());

    // keep a transaction pending so that every tick performs one lookup
    dispatcher.submit(request(target(0x01))).await.unwrap();
    // restart off the first ticker's schedule so stray ticks would not coincide
    sleep(Duration::from_secs(10)).await;
    dispatcher.start();
    assert!(dispatcher.is_started());
    sleep(Duration::from_millis(10)).await;

    let before = chain.lookups();
    sleep(Duration::from_secs(95)).await;
    assert_eq!(chain.lookups() - before, 3);
    assert_eq!(chain.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nonce_mismatch_blocks_the_queue() {
    let chain = Arc::new(FakeChain::default());
    chain.mined.store(true, Ordering::SeqCst);
    chain.foreign_pending.store(1, Ordering::SeqCst);
    let (dispatcher, metrics) = started_dispatcher(chain.clone(), DispatcherSettings::default());

    let handle = dispatcher.clone();
    let submission = tokio::spawn(async move { handle.submit(request(target(0x01))).await });
    sleep(Duration::from_secs(5)).await;

    assert!(!submission.is_finished());
    assert!(chain.events().is_empty());
    assert_eq!(dispatcher.queue_size(), 1);
    assert!(metrics.nonce_mismatches.get() >= 1);

    // once the foreign transaction is mined the nonces converge
    chain.foreign_pending.store(0, Ordering::SeqCst);
    submission.await.unwrap().unwrap();
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(dispatcher.queue_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_rejects_requests() {
    let chain = Arc::new(FakeChain::default());
    let settings = DispatcherSettings {
        max_queue_size: Some(1),
        ..Default::default()
    };
    let (dispatcher, metrics) = started_dispatcher(chain.clone(), settings);

    dispatcher.submit(request(target(0x01))).await.unwrap();

    let handle = dispatcher.clone();
    let queued = tokio::spawn(async move { handle.submit(request(target(0x02))).await });
    sleep(Duration::from_secs(1)).await;
    assert_eq!(dispatcher.queue_size(), 1);

    let err = dispatcher.submit(request(target(0x03))).await.unwrap_err();
    assert!(matches!(err, DispatcherError::QueueFull(1)));
    assert_eq!(dispatcher.queue_size(), 1);
    assert_eq!(
        metrics
            .rejected_requests
            .with_label_values(&["queue_full"])
            .get(),
        1
    );
    assert!(!queued.is_finished());
    queued.abort();
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_stop_waits_for_the_queue_to_drain() {
    let chain = Arc::new(FakeChain::default());
    let (dispatcher, _) = started_dispatcher(chain.clone(), DispatcherSettings::default());

    // the first transaction stays pending, holding back the next two
    dispatcher.submit(request(target(0x01))).await.unwrap();
    let queued: Vec<_> = [0x02, 0x03]
        .into_iter()
        .map(|byte| {
            let handle = dispatcher.clone();
            tokio::spawn(async move { handle.submit(request(target(byte))).await })
        })
        .collect();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(dispatcher.queue_size(), 2);

    let miner = chain.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(15)).await;
        miner.mined.store(true, Ordering::SeqCst);
    });

    let stopping = Instant::now();
    dispatcher.stop().await;
    assert!(stopping.elapsed() >= Duration::from_secs(20));
    assert_eq!(dispatcher.queue_size(), 0);
    assert!(!dispatcher.is_started());

    for handle in queued {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(chain.sent().len(), 3);

    assert!(logs_contain(
        "Waiting for the dispatcher queue to drain before stopping"
    ));
    logs_assert(|lines: &[&str]| {
        let warnings = lines
            .iter()
            .filter(|line| line.contains("Waiting for the dispatcher queue to drain"))
            .count();
        if warnings >= 3 {
            Ok(())
        } else {
            Err(format!("expected a warning per poll, got {warnings}"))
        }
    });

    let err = dispatcher.submit(request(target(0x04))).await.unwrap_err();
    assert!(matches!(err, DispatcherError::NotStarted));
}

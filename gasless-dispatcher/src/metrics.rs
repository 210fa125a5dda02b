use prometheus::{
    opts, register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
};

const METRICS_NAMESPACE: &str = "gasless_dispatcher";

fn namespaced(name: &str) -> String {
    format!("{}_{}", METRICS_NAMESPACE, name)
}

/// Prometheus metrics of a single dispatcher
#[derive(Clone)]
pub struct DispatcherMetrics {
    /// Metrics registry for adding new metrics and gathering reports
    registry: Registry,

    pub queue_length: IntGauge,
    // 0 or 1, there is never more than one
    pub pending_transactions: IntGauge,

    pub broadcast_transactions: IntCounter,
    pub mined_transactions: IntCounter,

    // labelled with the `DispatcherError::reason` of the rejection
    pub rejected_requests: IntCounterVec,

    /// Times the operator account was found with a pending transaction we did not send
    pub nonce_mismatches: IntCounter,
}

impl DispatcherMetrics {
    pub fn new(registry: Registry) -> eyre::Result<Self> {
        let queue_length = register_int_gauge_with_registry!(
            opts!(
                namespaced("queue_length"),
                "The number of requests waiting to be broadcast",
            ),
            registry.clone()
        )?;
        let pending_transactions = register_int_gauge_with_registry!(
            opts!(
                namespaced("pending_transactions"),
                "The number of broadcast transactions awaiting inclusion",
            ),
            registry.clone()
        )?;
        let broadcast_transactions = register_int_counter_with_registry!(
            opts!(
                namespaced("broadcast_transactions"),
                "The number of transactions accepted by the node",
            ),
            registry.clone()
        )?;
        let mined_transactions = register_int_counter_with_registry!(
            opts!(
                namespaced("mined_transactions"),
                "The number of broadcast transactions observed in a block",
            ),
            registry.clone()
        )?;
        let rejected_requests = register_int_counter_vec_with_registry!(
            opts!(
                namespaced("rejected_requests"),
                "The number of requests that did not result in a broadcast",
            ),
            &["reason",],
            registry.clone()
        )?;
        let nonce_mismatches = register_int_counter_with_registry!(
            opts!(
                namespaced("nonce_mismatches"),
                "The number of times the latest and pending nonces of the operator differed",
            ),
            registry.clone()
        )?;
        Ok(Self {
            registry,
            queue_length,
            pending_transactions,
            broadcast_transactions,
            mined_transactions,
            rejected_requests,
            nonce_mismatches,
        })
    }

    pub fn update_rejected_requests_metric(&self, reason: &str) {
        self.rejected_requests.with_label_values(&[reason]).inc();
    }

    /// Gather available metrics into an encoded (plaintext, OpenMetrics format) report.
    pub fn gather(&self) -> prometheus::Result<Vec<u8>> {
        let collected_metrics = self.registry.gather();
        let mut out_buf = Vec::with_capacity(1024 * 64);
        let encoder = prometheus::TextEncoder::new();
        encoder.encode(&collected_metrics, &mut out_buf)?;
        Ok(out_buf)
    }

    #[cfg(any(test, feature = "test-utils"))]
    #[allow(clippy::unwrap_used)]
    pub fn dummy_instance() -> Self {
        Self::new(Registry::new()).unwrap()
    }
}

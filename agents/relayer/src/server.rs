//! HTTP server exposing the relayer's prometheus metrics

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use derive_new::new;
use gasless_dispatcher::DispatcherMetrics;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, Instrument};

/// Serves OpenMetrics reports on `/metrics`
#[derive(new, Clone)]
pub struct MetricsServer {
    listen_port: u16,
    metrics: DispatcherMetrics,
}

impl MetricsServer {
    /// Bind to `0.0.0.0:<listen_port>` and serve in the background
    pub fn run(self) -> JoinHandle<()> {
        let port = self.listen_port;
        info!(port, "starting server on 0.0.0.0");
        tokio::spawn(
            async move {
                let listener = match TcpListener::bind(("0.0.0.0", port)).await {
                    Ok(listener) => listener,
                    Err(err) => {
                        error!(?err, port, "Failed to bind metrics server");
                        return;
                    }
                };
                if let Err(err) = self.serve(listener).await {
                    error!(?err, "Metrics server stopped");
                }
            }
            .instrument(info_span!("MetricsServer")),
        )
    }

    /// Serve on an already bound listener until the task is dropped
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let metrics = self.metrics;
        let app = Router::new().route("/metrics", get(move || gather_metrics(metrics)));
        axum::serve(listener, app).await
    }
}

/// Gather available metrics into an encoded (plaintext, OpenMetrics format)
/// report.
async fn gather_metrics(metrics: DispatcherMetrics) -> impl IntoResponse {
    debug!("Traversing route for /metrics endpoint for serving Prometheus metrics");
    match metrics.gather().map(String::from_utf8) {
        Ok(Ok(report)) => (StatusCode::OK, report),
        Ok(Err(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".into(),
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to gather metrics".into(),
        ),
    }
}

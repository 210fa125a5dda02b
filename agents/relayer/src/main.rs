//! Runs the gasless relayer until interrupted, then drains the dispatcher
//! queue before exiting.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use color_eyre::Result;
use gasless_dispatcher::DispatcherMetrics;
use gasless_relayer::{relayer::MetaTxRelayer, server::MetricsServer, settings::RelayerSettings};
use prometheus::Registry;
use tracing::info;

async fn _main() -> Result<()> {
    color_eyre::install()?;
    let settings = RelayerSettings::load()?;
    settings.tracing.start_tracing()?;

    let metrics = DispatcherMetrics::new(Registry::new())?;
    let relayer = MetaTxRelayer::from_settings(&settings, metrics.clone())?;
    let dispatcher = relayer.dispatcher();
    dispatcher.start();

    let server = MetricsServer::new(settings.metrics_port, metrics).run();

    info!(
        operator = ?dispatcher.address(),
        gas_price = %dispatcher.gas_price(),
        gas_price_ceiling = %dispatcher.gas_price_ceiling(),
        "Relayer running"
    );
    tokio::signal::ctrl_c().await?;

    info!(
        queue_size = dispatcher.queue_size(),
        "Shutting down relayer, draining queued requests"
    );
    dispatcher.stop().await;
    server.abort();
    Ok(())
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(_main())
}

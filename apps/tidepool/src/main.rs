use std::sync::Arc;

use anyhow::Context;
use tidepool::activation::HttpActivationBackend;
use tidepool::breakpoint::BreakpointStore;
use tidepool::config::AppConfig;
use tidepool::discovery::HttpDiscoveryClient;
use tidepool::events::EventBus;
use tidepool::poller::{PollerConfig, spawn_discovery};
use tidepool::selection::SelectionMachine;
use tidepool::telemetry::init_tracing;
use tokio::sync::watch;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();
    init_tracing(&cfg.log_filter);

    let bus = EventBus::new(cfg.event_capacity);
    let discovery = Arc::new(
        HttpDiscoveryClient::new(cfg.bridge_base_url.clone(), cfg.interceptor_kind.clone())
            .context("building discovery client")?,
    );
    let backend = Arc::new(
        HttpActivationBackend::new(cfg.bridge_base_url.clone(), cfg.interceptor_kind.clone())
            .context("building activation backend")?,
    );
    let machine = SelectionMachine::new(backend, bus.clone());
    let _breakpoints = BreakpointStore::new(bus.clone());

    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            debug!(?event, "session event");
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = spawn_discovery(
        discovery,
        machine.clone(),
        bus.clone(),
        PollerConfig {
            poll_interval: cfg.poll_interval(),
            target_refresh_interval: cfg.target_refresh_interval(),
        },
        shutdown_rx,
    );

    info!(
        bridge = %cfg.bridge_base_url,
        kind = %cfg.interceptor_kind,
        poll_ms = cfg.poll_interval_ms,
        target_refresh_ms = cfg.target_refresh_ms,
        "starting tidepool session core"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    poller.await.context("joining discovery poller")?;
    Ok(())
}

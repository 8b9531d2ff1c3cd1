//! Discovery polling worker.
//!
//! One spawned loop drives the whole read side: host listings on a fixed
//! cadence, target refreshes for the selected host, and an immediate target
//! fetch when the selection changes. Polls and in-flight activations are
//! causally independent. Shutdown is signalled over a watch channel so the
//! timers and bus subscription are released deterministically.

use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::discovery::{DiscoveryClient, DiscoveryHandle};
use crate::events::{EventBus, SessionEvent};
use crate::selection::SelectionMachine;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub target_refresh_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2_000),
            target_refresh_interval: Duration::from_millis(2_000),
        }
    }
}

pub fn spawn_discovery(
    client: DiscoveryHandle,
    machine: SelectionMachine,
    bus: EventBus,
    config: PollerConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut hosts_tick = tokio::time::interval(config.poll_interval);
        let mut targets_tick = tokio::time::interval(config.target_refresh_interval);
        let mut events = bus.subscribe();
        loop {
            tokio::select! {
                _ = hosts_tick.tick() => {
                    poll_hosts(client.as_ref(), &machine, &bus).await;
                }
                _ = targets_tick.tick() => {
                    if let Some(host_id) = machine.selected_host_id() {
                        refresh_targets(client.as_ref(), &machine, &bus, &host_id).await;
                    }
                }
                event = events.recv() => match event {
                    Ok(SessionEvent::SelectionChanged { host_id }) => {
                        // Immediate fetch on selection, ahead of the next tick.
                        refresh_targets(client.as_ref(), &machine, &bus, &host_id).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "discovery poller lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("discovery poller shutting down");
                        break;
                    }
                }
            }
        }
    })
}

async fn poll_hosts(client: &dyn DiscoveryClient, machine: &SelectionMachine, bus: &EventBus) {
    match client.list_hosts().await {
        Ok(hosts) => machine.observe_hosts(hosts),
        Err(err) => {
            warn!(error = %err, "host discovery poll failed");
            bus.emit(SessionEvent::DiscoveryFailed {
                message: err.to_string(),
            });
        }
    }
}

/// `host_id` is captured at request time; `apply_targets` re-checks it
/// against the current selection, so a late response for a host the user has
/// moved away from never lands.
async fn refresh_targets(
    client: &dyn DiscoveryClient,
    machine: &SelectionMachine,
    bus: &EventBus,
    host_id: &str,
) {
    match client.query_targets(host_id).await {
        Ok(Some(inventory)) => machine.apply_targets(host_id, inventory.targets),
        Ok(None) => {
            debug!(host = %host_id, "bridge no longer knows host, skipping target refresh");
        }
        Err(err) => {
            warn!(host = %host_id, error = %err, "target refresh failed");
            bus.emit(SessionEvent::DiscoveryFailed {
                message: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ManualActivationBackend;
    use crate::discovery::StaticDiscoveryClient;
    use crate::selection::{SelectionState, TargetPhase};
    use std::sync::Arc;
    use tidepool_proto::{HostRecord, HostState, TargetInventory, TargetRecord};

    fn fast_config() -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_millis(20),
            target_refresh_interval: Duration::from_millis(20),
        }
    }

    fn fixture() -> (
        Arc<StaticDiscoveryClient>,
        SelectionMachine,
        EventBus,
        watch::Sender<bool>,
        JoinHandle<()>,
    ) {
        let client = Arc::new(StaticDiscoveryClient::new());
        let bus = EventBus::new(64);
        let machine = SelectionMachine::new(Arc::new(ManualActivationBackend::new()), bus.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_discovery(
            client.clone(),
            machine.clone(),
            bus.clone(),
            fast_config(),
            shutdown_rx,
        );
        (client, machine, bus, shutdown_tx, handle)
    }

    async fn wait_for<F>(rx: &mut broadcast::Receiver<SessionEvent>, pred: F) -> SessionEvent
    where
        F: Fn(&SessionEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) => continue,
                    Err(err) => panic!("event bus closed: {err}"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn available(id: &str) -> HostRecord {
        HostRecord {
            id: id.to_string(),
            name: format!("Device {id}"),
            state: HostState::Available,
        }
    }

    #[tokio::test]
    async fn lone_host_is_selected_and_its_targets_fetched() {
        let (client, machine, bus, shutdown, handle) = fixture();
        let mut events = bus.subscribe();
        client.set_hosts(vec![available("A")]);
        client.set_targets(
            "A",
            TargetInventory {
                targets: vec![TargetRecord {
                    id: "com.example.app".into(),
                    name: "Example".into(),
                }],
            },
        );

        wait_for(&mut events, |e| {
            matches!(e, SessionEvent::TargetsUpdated { host_id, .. } if host_id == "A")
        })
        .await;
        match machine.selection() {
            SelectionState::HostSelected {
                host_id,
                targets: TargetPhase::Ready(targets),
            } => {
                assert_eq!(host_id, "A");
                assert_eq!(targets[0].id, "com.example.app");
            }
            other => panic!("unexpected state {other:?}"),
        }

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn removing_the_selected_host_clears_selection() {
        let (client, machine, bus, shutdown, handle) = fixture();
        let mut events = bus.subscribe();
        client.set_hosts(vec![available("A")]);
        wait_for(&mut events, |e| {
            matches!(e, SessionEvent::SelectionChanged { host_id } if host_id == "A")
        })
        .await;

        client.set_hosts(Vec::new());
        wait_for(&mut events, |e| matches!(e, SessionEvent::SelectionCleared)).await;
        assert_eq!(machine.selection(), SelectionState::NoSelection);

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn transient_poll_failure_is_surfaced_and_state_untouched() {
        let (client, machine, bus, shutdown, handle) = fixture();
        let mut events = bus.subscribe();
        client.set_hosts(vec![available("A")]);
        wait_for(&mut events, |e| {
            matches!(e, SessionEvent::SelectionChanged { .. })
        })
        .await;

        client.fail_next_poll();
        wait_for(&mut events, |e| {
            matches!(e, SessionEvent::DiscoveryFailed { .. })
        })
        .await;
        assert_eq!(machine.selected_host_id().as_deref(), Some("A"));

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_worker() {
        let (_client, _machine, _bus, shutdown, handle) = fixture();
        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }
}

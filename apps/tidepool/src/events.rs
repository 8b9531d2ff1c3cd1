//! Explicit change notification for session state.
//!
//! Dependents subscribe to a broadcast of [`SessionEvent`]s instead of
//! observing shared state implicitly; every state change the rest of the
//! application may react to is announced here.

use tokio::sync::broadcast;
use tidepool_proto::{ActivationKey, BreakpointRequest, HostRecord, TargetRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A discovery poll produced a fresh host listing.
    HostsUpdated { hosts: Vec<HostRecord> },
    /// A host was selected (explicitly or by startup auto-selection).
    SelectionChanged { host_id: String },
    /// Selection returned to none; any loaded targets were discarded.
    SelectionCleared,
    /// A target refresh for the still-selected host was applied.
    TargetsUpdated {
        host_id: String,
        targets: Vec<TargetRecord>,
    },
    ActivationStarted { key: ActivationKey },
    ActivationFinished { key: ActivationKey },
    ActivationFailed { key: ActivationKey, message: String },
    /// A discovery poll or target refresh failed; state is left untouched.
    DiscoveryFailed { message: String },
    /// The breakpoint store applied an edit; this is the sole write-back
    /// signal to the owning exchange.
    BreakpointUpdated {
        exchange_id: String,
        request: BreakpointRequest,
    },
}

/// Broadcast bus for session events. Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emits to all current subscribers. An event with no subscribers is
    /// dropped silently; emission never blocks state mutation.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        bus.emit(SessionEvent::SelectionCleared);
        assert_eq!(first.recv().await.unwrap(), SessionEvent::SelectionCleared);
        assert_eq!(second.recv().await.unwrap(), SessionEvent::SelectionCleared);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.emit(SessionEvent::SelectionCleared);
        assert_eq!(bus.subscriber_count(), 0);
    }
}

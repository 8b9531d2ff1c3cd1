//! Host/target selection state machine.
//!
//! States: `NoSelection` -> `HostSelected { host_id, targets }`, with the
//! target phase moving from `Loading` to `Ready` as refreshes land. Every
//! discovery poll re-validates the selection: a selected host that vanishes
//! or turns unavailable resets the machine deterministically, not just on
//! user action. Activations run as independent fire-and-forget tasks whose
//! in-flight markers live in the shared [`ActivationTracker`].

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use tidepool_proto::{ActivationKey, ActivationRequest, HostRecord, HostState, TargetRecord};

use crate::activation::{ActivationHandle, ActivationTracker};
use crate::events::{EventBus, SessionEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPhase {
    Loading,
    Ready(Vec<TargetRecord>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionState {
    NoSelection,
    HostSelected {
        host_id: String,
        targets: TargetPhase,
    },
}

impl SelectionState {
    pub fn host_id(&self) -> Option<&str> {
        match self {
            SelectionState::HostSelected { host_id, .. } => Some(host_id),
            SelectionState::NoSelection => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("unknown host {0}")]
    UnknownHost(String),
    #[error("host {0} is not selectable")]
    HostUnavailable(String),
    #[error("no host selected")]
    NoHostSelected,
}

/// Most recent activation failure, kept until an activation for the same key
/// succeeds. The source design left failures unhandled; surfacing them here
/// keeps the consumer out of wedged states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationFailure {
    pub key: ActivationKey,
    pub message: String,
}

struct MachineState {
    hosts: HashMap<String, HostRecord>,
    selection: SelectionState,
    auto_select_armed: bool,
    last_activation_failure: Option<ActivationFailure>,
}

/// Cloneable handle over shared machine state; clones observe and mutate the
/// same selection.
#[derive(Clone)]
pub struct SelectionMachine {
    state: Arc<parking_lot::Mutex<MachineState>>,
    tracker: ActivationTracker,
    backend: ActivationHandle,
    bus: EventBus,
}

impl SelectionMachine {
    pub fn new(backend: ActivationHandle, bus: EventBus) -> Self {
        Self {
            state: Arc::new(parking_lot::Mutex::new(MachineState {
                hosts: HashMap::new(),
                selection: SelectionState::NoSelection,
                auto_select_armed: true,
                last_activation_failure: None,
            })),
            tracker: ActivationTracker::new(),
            backend,
            bus,
        }
    }

    pub fn selection(&self) -> SelectionState {
        self.state.lock().selection.clone()
    }

    pub fn selected_host_id(&self) -> Option<String> {
        self.state.lock().selection.host_id().map(str::to_string)
    }

    /// Known hosts ordered by name for stable presentation.
    pub fn hosts(&self) -> Vec<HostRecord> {
        let mut hosts: Vec<HostRecord> = self.state.lock().hosts.values().cloned().collect();
        hosts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        hosts
    }

    pub fn tracker(&self) -> ActivationTracker {
        self.tracker.clone()
    }

    pub fn last_activation_failure(&self) -> Option<ActivationFailure> {
        self.state.lock().last_activation_failure.clone()
    }

    /// Feeds one discovery poll result into the machine. Resets the selection
    /// if the selected host is gone or unavailable, then (on the first
    /// listing only) auto-selects a lone available host.
    pub fn observe_hosts(&self, hosts: HashMap<String, HostRecord>) {
        let mut emitted = Vec::new();
        {
            let mut guard = self.state.lock();
            guard.hosts = hosts;

            let mut listing: Vec<HostRecord> = guard.hosts.values().cloned().collect();
            listing.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            emitted.push(SessionEvent::HostsUpdated { hosts: listing });

            if let Some(host_id) = guard.selection.host_id().map(str::to_string) {
                let still_selectable = guard
                    .hosts
                    .get(&host_id)
                    .map(|host| host.state != HostState::Unavailable)
                    .unwrap_or(false);
                if !still_selectable {
                    debug!(host = %host_id, "selected host gone or unavailable, clearing selection");
                    guard.selection = SelectionState::NoSelection;
                    emitted.push(SessionEvent::SelectionCleared);
                }
            }

            if guard.auto_select_armed {
                guard.auto_select_armed = false;
                if matches!(guard.selection, SelectionState::NoSelection)
                    && guard.hosts.len() == 1
                {
                    if let Some(only) = guard.hosts.values().next().cloned() {
                        if only.state.is_selectable() {
                            debug!(host = %only.id, "auto-selecting lone available host");
                            guard.selection = SelectionState::HostSelected {
                                host_id: only.id.clone(),
                                targets: TargetPhase::Loading,
                            };
                            emitted.push(SessionEvent::SelectionChanged { host_id: only.id });
                        }
                    }
                }
            }
        }
        for event in emitted {
            self.bus.emit(event);
        }
    }

    /// Selects an available host, or kicks off the launch/setup activation a
    /// not-yet-ready host needs. Selection only changes for available hosts;
    /// activated hosts become selectable once a later poll reports them
    /// available.
    pub fn select_host(&self, host_id: &str) -> Result<(), SelectionError> {
        let record = {
            let mut guard = self.state.lock();
            guard.auto_select_armed = false;
            guard
                .hosts
                .get(host_id)
                .cloned()
                .ok_or_else(|| SelectionError::UnknownHost(host_id.to_string()))?
        };
        match record.state {
            HostState::Available => {
                {
                    let mut guard = self.state.lock();
                    guard.selection = SelectionState::HostSelected {
                        host_id: record.id.clone(),
                        targets: TargetPhase::Loading,
                    };
                }
                self.bus.emit(SessionEvent::SelectionChanged {
                    host_id: record.id,
                });
                Ok(())
            }
            HostState::Unavailable => Err(SelectionError::HostUnavailable(host_id.to_string())),
            HostState::LaunchRequired => {
                self.start_activation(ActivationRequest::Launch { host_id: record.id });
                Ok(())
            }
            HostState::SetupRequired => {
                self.start_activation(ActivationRequest::Setup { host_id: record.id });
                Ok(())
            }
        }
    }

    /// Always legal; discards any loaded targets.
    pub fn deselect_host(&self) {
        let was_selected = {
            let mut guard = self.state.lock();
            guard.auto_select_armed = false;
            !matches!(
                std::mem::replace(&mut guard.selection, SelectionState::NoSelection),
                SelectionState::NoSelection
            )
        };
        if was_selected {
            self.bus.emit(SessionEvent::SelectionCleared);
        }
    }

    /// Starts intercepting one target on the selected host. No terminal
    /// "connected" state is modeled; completion is announced on the bus.
    pub fn intercept_target(&self, target_id: &str) -> Result<(), SelectionError> {
        let host_id = {
            let guard = self.state.lock();
            let host_id = guard
                .selection
                .host_id()
                .ok_or(SelectionError::NoHostSelected)?
                .to_string();
            let activatable = guard
                .hosts
                .get(&host_id)
                .map(|host| host.state != HostState::Unavailable)
                .unwrap_or(false);
            if !activatable {
                return Err(SelectionError::HostUnavailable(host_id));
            }
            host_id
        };
        self.start_activation(ActivationRequest::Intercept {
            host_id,
            target_id: target_id.to_string(),
        });
        Ok(())
    }

    /// Applies a target refresh, but only if `host_id` is still the selected
    /// host; late responses for a deselected host are dropped.
    pub fn apply_targets(&self, host_id: &str, targets: Vec<TargetRecord>) {
        let applied = {
            let mut guard = self.state.lock();
            match &mut guard.selection {
                SelectionState::HostSelected {
                    host_id: selected,
                    targets: phase,
                } if selected == host_id => {
                    *phase = TargetPhase::Ready(targets.clone());
                    true
                }
                _ => false,
            }
        };
        if applied {
            self.bus.emit(SessionEvent::TargetsUpdated {
                host_id: host_id.to_string(),
                targets,
            });
        } else {
            debug!(host = %host_id, "dropping target listing for host no longer selected");
        }
    }

    /// Case-insensitive substring filter over loaded target names. Purely
    /// presentational; the stored set is untouched.
    pub fn filter_targets(&self, query: &str) -> Vec<TargetRecord> {
        let guard = self.state.lock();
        let SelectionState::HostSelected {
            targets: TargetPhase::Ready(targets),
            ..
        } = &guard.selection
        else {
            return Vec::new();
        };
        let needle = query.to_lowercase();
        targets
            .iter()
            .filter(|target| target.name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    fn start_activation(&self, request: ActivationRequest) {
        let key = request.key();
        self.tracker.begin(&key);
        self.bus.emit(SessionEvent::ActivationStarted { key: key.clone() });
        let machine = self.clone();
        tokio::spawn(async move {
            let result = machine.backend.activate(&request).await;
            // Marker removal must happen whatever the outcome.
            machine.tracker.finish(&key);
            match result {
                Ok(()) => {
                    let mut guard = machine.state.lock();
                    if guard
                        .last_activation_failure
                        .as_ref()
                        .is_some_and(|failure| failure.key == key)
                    {
                        guard.last_activation_failure = None;
                    }
                    drop(guard);
                    debug!(
                        action = request.action_name(),
                        host = %request.host_id(),
                        "activation finished"
                    );
                    machine.bus.emit(SessionEvent::ActivationFinished { key });
                }
                Err(err) => {
                    warn!(
                        action = request.action_name(),
                        host = %request.host_id(),
                        error = %err,
                        "activation failed"
                    );
                    machine.state.lock().last_activation_failure = Some(ActivationFailure {
                        key: key.clone(),
                        message: err.to_string(),
                    });
                    machine.bus.emit(SessionEvent::ActivationFailed {
                        key,
                        message: err.to_string(),
                    });
                }
            }
        });
    }
}

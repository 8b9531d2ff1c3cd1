//! Tidepool Proto: shared data model for the interception session core.
//!
//! Responsibilities:
//! - host and target records reported by the instrumentation bridge
//! - activation requests (launch / setup / intercept) and their marker keys
//! - paused-request snapshots edited while a breakpoint is held
//! - ordered header representations that survive duplicates

use serde::{Deserialize, Serialize};

pub mod headers;
pub mod request;

pub use headers::{HeaderField, HeaderFields, HeaderPair};
pub use request::{BreakpointRequest, KNOWN_METHODS, is_known_method};

/// A device or environment capable of running instrumentable processes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostRecord {
    pub id: String,
    pub name: String,
    pub state: HostState,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HostState {
    Available,
    Unavailable,
    LaunchRequired,
    SetupRequired,
}

impl HostState {
    /// Only available hosts may be selected for interception.
    pub fn is_selectable(&self) -> bool {
        matches!(self, HostState::Available)
    }

    /// The activation a host in this state needs before it becomes available.
    pub fn pending_action(&self) -> Option<PendingAction> {
        match self {
            HostState::LaunchRequired => Some(PendingAction::Launch),
            HostState::SetupRequired => Some(PendingAction::Setup),
            HostState::Available | HostState::Unavailable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Launch,
    Setup,
}

/// A process on a host eligible for interception, scoped to one selected host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetRecord {
    pub id: String,
    pub name: String,
}

/// Target listing returned by the bridge for a single host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetInventory {
    pub targets: Vec<TargetRecord>,
}

/// One activation of the instrumentation agent. Each request is a single
/// future; completion (ok or err) is the only outcome the caller consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActivationRequest {
    Launch { host_id: String },
    Setup { host_id: String },
    Intercept { host_id: String, target_id: String },
}

impl ActivationRequest {
    pub fn host_id(&self) -> &str {
        match self {
            ActivationRequest::Launch { host_id }
            | ActivationRequest::Setup { host_id }
            | ActivationRequest::Intercept { host_id, .. } => host_id,
        }
    }

    pub fn target_id(&self) -> Option<&str> {
        match self {
            ActivationRequest::Intercept { target_id, .. } => Some(target_id),
            _ => None,
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            ActivationRequest::Launch { .. } => "launch",
            ActivationRequest::Setup { .. } => "setup",
            ActivationRequest::Intercept { .. } => "intercept",
        }
    }

    /// Identity used for in-flight "activating" markers: host activations are
    /// keyed by host, intercepts by target.
    pub fn key(&self) -> ActivationKey {
        match self {
            ActivationRequest::Launch { host_id } | ActivationRequest::Setup { host_id } => {
                ActivationKey::Host {
                    host_id: host_id.clone(),
                }
            }
            ActivationRequest::Intercept { target_id, .. } => ActivationKey::Target {
                target_id: target_id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationKey {
    Host { host_id: String },
    Target { target_id: String },
}

//! Host and target discovery against the instrumentation bridge.
//!
//! The bridge owns the real device plumbing; this module only speaks its
//! JSON surface. `StaticDiscoveryClient` backs tests and offline wiring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use tidepool_proto::{HostRecord, TargetInventory};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery transport error: {0}")]
    Transport(String),
    #[error("discovery payload malformed: {0}")]
    Malformed(String),
}

pub type DiscoveryHandle = Arc<dyn DiscoveryClient>;

#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Current host listing, keyed by host id. Hosts absent from the map are
    /// gone as far as the session core is concerned.
    async fn list_hosts(&self) -> Result<HashMap<String, HostRecord>, DiscoveryError>;

    /// Instrumentable targets for one host. `None` means the host is no
    /// longer valid on the bridge side; no retry policy is applied here.
    async fn query_targets(&self, host_id: &str)
    -> Result<Option<TargetInventory>, DiscoveryError>;
}

#[derive(Debug, Deserialize)]
struct HostsResponse {
    hosts: Vec<HostRecord>,
}

/// JSON client for the bridge's discovery endpoints, bound to one
/// interceptor kind (e.g. `android-adb`).
pub struct HttpDiscoveryClient {
    http: reqwest::Client,
    base_url: String,
    kind: String,
}

impl HttpDiscoveryClient {
    pub fn new(
        base_url: impl Into<String>,
        kind: impl Into<String>,
    ) -> Result<Self, DiscoveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            kind: kind.into(),
        })
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn list_hosts(&self) -> Result<HashMap<String, HostRecord>, DiscoveryError> {
        let url = format!("{}/interceptors/{}/hosts", self.base_url, self.kind);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?;
        let listing: HostsResponse = response
            .json()
            .await
            .map_err(|err| DiscoveryError::Malformed(err.to_string()))?;
        Ok(listing
            .hosts
            .into_iter()
            .map(|host| (host.id.clone(), host))
            .collect())
    }

    async fn query_targets(
        &self,
        host_id: &str,
    ) -> Result<Option<TargetInventory>, DiscoveryError> {
        let url = format!(
            "{}/interceptors/{}/hosts/{}/targets",
            self.base_url, self.kind, host_id
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|err| DiscoveryError::Transport(err.to_string()))?;
        let inventory: TargetInventory = response
            .json()
            .await
            .map_err(|err| DiscoveryError::Malformed(err.to_string()))?;
        Ok(Some(inventory))
    }
}

#[derive(Default)]
struct StaticState {
    hosts: HashMap<String, HostRecord>,
    targets: HashMap<String, TargetInventory>,
    fail_next: bool,
}

/// In-memory discovery source, mutable from tests while a poller runs.
#[derive(Default)]
pub struct StaticDiscoveryClient {
    state: parking_lot::Mutex<StaticState>,
}

impl StaticDiscoveryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hosts(&self, hosts: Vec<HostRecord>) {
        let mut guard = self.state.lock();
        guard.hosts = hosts.into_iter().map(|h| (h.id.clone(), h)).collect();
    }

    pub fn set_targets(&self, host_id: &str, inventory: TargetInventory) {
        self.state
            .lock()
            .targets
            .insert(host_id.to_string(), inventory);
    }

    pub fn clear_targets(&self, host_id: &str) {
        self.state.lock().targets.remove(host_id);
    }

    /// Makes the next `list_hosts` call fail once, for transient-error tests.
    pub fn fail_next_poll(&self) {
        self.state.lock().fail_next = true;
    }
}

#[async_trait]
impl DiscoveryClient for StaticDiscoveryClient {
    async fn list_hosts(&self) -> Result<HashMap<String, HostRecord>, DiscoveryError> {
        let mut guard = self.state.lock();
        if guard.fail_next {
            guard.fail_next = false;
            return Err(DiscoveryError::Transport("injected poll failure".into()));
        }
        Ok(guard.hosts.clone())
    }

    async fn query_targets(
        &self,
        host_id: &str,
    ) -> Result<Option<TargetInventory>, DiscoveryError> {
        Ok(self.state.lock().targets.get(host_id).cloned())
    }
}

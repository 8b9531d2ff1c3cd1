//! Activation of the instrumentation agent, plus in-flight marker tracking.
//!
//! An activation is a single future keyed by host (launch/setup) or target
//! (intercept); completion is the only signal the caller consumes. The
//! tracker is a multiset so overlapping completions for distinct keys never
//! clobber each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Notify, oneshot};

use tidepool_proto::{ActivationKey, ActivationRequest};

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("activation transport error: {0}")]
    Transport(String),
    #[error("activation rejected: {0}")]
    Rejected(String),
}

pub type ActivationHandle = Arc<dyn ActivationBackend>;

#[async_trait]
pub trait ActivationBackend: Send + Sync {
    async fn activate(&self, request: &ActivationRequest) -> Result<(), ActivationError>;
}

/// POSTs activation requests to the bridge; no structured error payload is
/// consumed beyond the status line.
pub struct HttpActivationBackend {
    http: reqwest::Client,
    base_url: String,
    kind: String,
}

impl HttpActivationBackend {
    pub fn new(
        base_url: impl Into<String>,
        kind: impl Into<String>,
    ) -> Result<Self, ActivationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ActivationError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            kind: kind.into(),
        })
    }
}

#[async_trait]
impl ActivationBackend for HttpActivationBackend {
    async fn activate(&self, request: &ActivationRequest) -> Result<(), ActivationError> {
        let url = format!("{}/interceptors/{}/activate", self.base_url, self.kind);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|err| ActivationError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ActivationError::Rejected(format!(
                "bridge returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Unordered multiset of in-flight activation markers. Insert increments,
/// finish decrements exactly one matching entry; concurrent completions for
/// other keys are untouched.
#[derive(Clone, Default)]
pub struct ActivationTracker {
    in_flight: Arc<parking_lot::Mutex<HashMap<ActivationKey, usize>>>,
}

impl ActivationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, key: &ActivationKey) {
        *self.in_flight.lock().entry(key.clone()).or_insert(0) += 1;
    }

    pub fn finish(&self, key: &ActivationKey) {
        let mut guard = self.in_flight.lock();
        if let Some(count) = guard.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                guard.remove(key);
            }
        }
    }

    pub fn is_active(&self, key: &ActivationKey) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    pub fn active_keys(&self) -> Vec<ActivationKey> {
        self.in_flight.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.lock().is_empty()
    }
}

/// One held activation inside [`ManualActivationBackend`].
pub struct PendingActivation {
    pub request: ActivationRequest,
    reply: oneshot::Sender<Result<(), ActivationError>>,
}

impl PendingActivation {
    pub fn resolve(self) {
        let _ = self.reply.send(Ok(()));
    }

    pub fn fail(self, message: impl Into<String>) {
        let _ = self
            .reply
            .send(Err(ActivationError::Rejected(message.into())));
    }
}

/// Backend whose completions are driven by the caller: each `activate` parks
/// until the matching [`PendingActivation`] is resolved or failed. Used by
/// tests that need activations held in flight.
#[derive(Default)]
pub struct ManualActivationBackend {
    pending: parking_lot::Mutex<VecDeque<PendingActivation>>,
    arrived: Notify,
}

impl ManualActivationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the next parked activation, in arrival order.
    pub async fn take_pending(&self) -> PendingActivation {
        loop {
            if let Some(pending) = self.pending.lock().pop_front() {
                return pending;
            }
            self.arrived.notified().await;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl ActivationBackend for ManualActivationBackend {
    async fn activate(&self, request: &ActivationRequest) -> Result<(), ActivationError> {
        let (reply, rx) = oneshot::channel();
        self.pending.lock().push_back(PendingActivation {
            request: request.clone(),
            reply,
        });
        self.arrived.notify_one();
        rx.await
            .map_err(|_| ActivationError::Transport("activation dropped".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_key(id: &str) -> ActivationKey {
        ActivationKey::Host {
            host_id: id.into(),
        }
    }

    #[test]
    fn tracker_finish_removes_exactly_one_marker() {
        let tracker = ActivationTracker::new();
        tracker.begin(&host_key("a"));
        tracker.begin(&host_key("b"));
        tracker.finish(&host_key("a"));
        assert!(!tracker.is_active(&host_key("a")));
        assert!(tracker.is_active(&host_key("b")));
    }

    #[test]
    fn tracker_counts_duplicate_keys() {
        let tracker = ActivationTracker::new();
        tracker.begin(&host_key("a"));
        tracker.begin(&host_key("a"));
        tracker.finish(&host_key("a"));
        assert!(tracker.is_active(&host_key("a")));
        tracker.finish(&host_key("a"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn tracker_ignores_unmatched_finish() {
        let tracker = ActivationTracker::new();
        tracker.begin(&host_key("a"));
        tracker.finish(&host_key("never-started"));
        assert!(tracker.is_active(&host_key("a")));
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn manual_backend_parks_until_resolved() {
        let backend = Arc::new(ManualActivationBackend::new());
        let request = ActivationRequest::Launch {
            host_id: "emulator-5554".into(),
        };
        let call = {
            let backend = backend.clone();
            let request = request.clone();
            tokio::spawn(async move { backend.activate(&request).await })
        };
        let pending = backend.take_pending().await;
        assert_eq!(pending.request, request);
        pending.resolve();
        call.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn manual_backend_propagates_failure() {
        let backend = Arc::new(ManualActivationBackend::new());
        let request = ActivationRequest::Setup {
            host_id: "emulator-5554".into(),
        };
        let call = {
            let backend = backend.clone();
            let request = request.clone();
            tokio::spawn(async move { backend.activate(&request).await })
        };
        backend.take_pending().await.fail("agent push refused");
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ActivationError::Rejected(_)));
    }
}

//! In-progress breakpoint snapshots.
//!
//! Holds at most one paused request per exchange while it is being edited.
//! Each edit replaces exactly one field and emits the whole new snapshot as
//! a [`SessionEvent::BreakpointUpdated`], the sole write-back signal to the
//! owning exchange. Edits are serialized by the store lock, so last writer
//! wins per field and no merging ever happens.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use tidepool_proto::{BreakpointRequest, HeaderFields, HeaderPair};

use crate::events::{EventBus, SessionEvent};

#[derive(Debug, Error)]
pub enum BreakpointError {
    #[error("no request in progress for exchange {0}")]
    NotInProgress(String),
}

#[derive(Clone)]
pub struct BreakpointStore {
    inner: Arc<parking_lot::Mutex<HashMap<String, BreakpointRequest>>>,
    bus: EventBus,
}

impl BreakpointStore {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            bus,
        }
    }

    /// Installs the paused request for an exchange, replacing any prior
    /// snapshot. Opening is not an edit; nothing is emitted.
    pub fn open(&self, exchange_id: &str, request: BreakpointRequest) {
        debug!(exchange = %exchange_id, method = %request.method, "breakpoint opened");
        self.inner.lock().insert(exchange_id.to_string(), request);
    }

    pub fn snapshot(&self, exchange_id: &str) -> Option<BreakpointRequest> {
        self.inner.lock().get(exchange_id).cloned()
    }

    /// Removes and returns the snapshot for the resume path.
    pub fn take(&self, exchange_id: &str) -> Option<BreakpointRequest> {
        self.inner.lock().remove(exchange_id)
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Replaces the method, preserving url and headers. Setting the current
    /// value is a no-op: no store write, no event. Custom verbs are accepted
    /// uncoerced.
    pub fn set_method(&self, exchange_id: &str, method: &str) -> Result<(), BreakpointError> {
        let updated = {
            let mut guard = self.inner.lock();
            let current = guard
                .get_mut(exchange_id)
                .ok_or_else(|| BreakpointError::NotInProgress(exchange_id.to_string()))?;
            if current.method == method {
                return Ok(());
            }
            *current = current.with_method(method);
            current.clone()
        };
        self.emit(exchange_id, updated);
        Ok(())
    }

    /// Replaces the url only.
    pub fn set_url(&self, exchange_id: &str, url: &str) -> Result<(), BreakpointError> {
        let updated = {
            let mut guard = self.inner.lock();
            let current = guard
                .get_mut(exchange_id)
                .ok_or_else(|| BreakpointError::NotInProgress(exchange_id.to_string()))?;
            *current = current.with_url(url);
            current.clone()
        };
        self.emit(exchange_id, updated);
        Ok(())
    }

    /// Replaces the headers only, converting the editor's ordered pair form
    /// back to the keyed form. Duplicate names stay an ordered sequence.
    pub fn set_headers(
        &self,
        exchange_id: &str,
        pairs: &[HeaderPair],
    ) -> Result<(), BreakpointError> {
        let headers = HeaderFields::from_pairs(pairs);
        let updated = {
            let mut guard = self.inner.lock();
            let current = guard
                .get_mut(exchange_id)
                .ok_or_else(|| BreakpointError::NotInProgress(exchange_id.to_string()))?;
            *current = current.with_headers(headers);
            current.clone()
        };
        self.emit(exchange_id, updated);
        Ok(())
    }

    fn emit(&self, exchange_id: &str, request: BreakpointRequest) {
        self.bus.emit(SessionEvent::BreakpointUpdated {
            exchange_id: exchange_id.to_string(),
            request,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn store() -> (BreakpointStore, EventBus) {
        let bus = EventBus::new(64);
        (BreakpointStore::new(bus.clone()), bus)
    }

    fn paused() -> BreakpointRequest {
        let mut headers = HeaderFields::new();
        headers.push("Host", "example.test");
        headers.push("Cookie", "a=1");
        BreakpointRequest::new("GET", "https://example.test/v1/things", headers)
    }

    #[test]
    fn each_edit_preserves_the_other_fields() {
        let (store, bus) = store();
        let mut events = bus.subscribe();
        store.open("ex-1", paused());

        store.set_method("ex-1", "POST").unwrap();
        let after_method = store.snapshot("ex-1").unwrap();
        assert_eq!(after_method.method, "POST");
        assert_eq!(after_method.url, paused().url);
        assert_eq!(after_method.headers, paused().headers);

        store.set_url("ex-1", "https://example.test/v2").unwrap();
        let after_url = store.snapshot("ex-1").unwrap();
        assert_eq!(after_url.method, "POST");
        assert_eq!(after_url.url, "https://example.test/v2");
        assert_eq!(after_url.headers, paused().headers);

        // Both edits were announced with full snapshots.
        for expected_method in ["POST", "POST"] {
            match events.try_recv().unwrap() {
                SessionEvent::BreakpointUpdated {
                    exchange_id,
                    request,
                } => {
                    assert_eq!(exchange_id, "ex-1");
                    assert_eq!(request.method, expected_method);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn setting_the_current_method_is_a_no_op() {
        let (store, bus) = store();
        let mut events = bus.subscribe();
        store.open("ex-1", paused());
        store.set_method("ex-1", "GET").unwrap();
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(store.snapshot("ex-1").unwrap(), paused());
    }

    #[test]
    fn header_edit_keeps_order_and_duplicates() {
        let (store, _bus) = store();
        store.open("ex-1", paused());
        let pairs = vec![
            HeaderPair::new("Host", "example.test"),
            HeaderPair::new("Set-Cookie", "a=1"),
            HeaderPair::new("Set-Cookie", "b=2"),
            HeaderPair::new("Accept", "*/*"),
        ];
        store.set_headers("ex-1", &pairs).unwrap();
        let snapshot = store.snapshot("ex-1").unwrap();
        assert_eq!(snapshot.headers.to_pairs(), pairs);
        assert_eq!(snapshot.method, "GET");
        assert_eq!(snapshot.url, paused().url);
    }

    #[test]
    fn custom_verbs_pass_through_uncoerced() {
        let (store, _bus) = store();
        store.open("ex-1", paused());
        store.set_method("ex-1", "PURGE").unwrap();
        assert_eq!(store.snapshot("ex-1").unwrap().method, "PURGE");
    }

    #[test]
    fn edits_on_unknown_exchanges_are_rejected() {
        let (store, _bus) = store();
        let err = store.set_url("missing", "https://example.test").unwrap_err();
        assert!(matches!(err, BreakpointError::NotInProgress(_)));
    }

    #[test]
    fn open_replaces_and_take_removes() {
        let (store, _bus) = store();
        store.open("ex-1", paused());
        store.open("ex-1", paused().with_method("PUT"));
        assert_eq!(store.open_count(), 1);
        assert_eq!(store.snapshot("ex-1").unwrap().method, "PUT");
        let taken = store.take("ex-1").unwrap();
        assert_eq!(taken.method, "PUT");
        assert!(store.snapshot("ex-1").is_none());
        assert_eq!(store.open_count(), 0);
    }
}

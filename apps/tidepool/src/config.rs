use std::time::Duration;

/// Session core configuration, loaded from `TIDEPOOL_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the local instrumentation bridge.
    pub bridge_base_url: String,
    /// Interceptor kind this session core drives on the bridge.
    pub interceptor_kind: String,
    pub log_filter: String,
    /// Host discovery poll cadence.
    pub poll_interval_ms: u64,
    /// Target refresh cadence while a host is selected.
    pub target_refresh_ms: u64,
    /// Event bus capacity; slow subscribers past this lag drop events.
    pub event_capacity: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bridge_base_url = std::env::var("TIDEPOOL_BRIDGE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:45456".into());
        let interceptor_kind =
            std::env::var("TIDEPOOL_INTERCEPTOR_KIND").unwrap_or_else(|_| "android-adb".into());
        let log_filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tidepool=debug".into());
        let poll_interval_ms = std::env::var("TIDEPOOL_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2_000);
        let target_refresh_ms = std::env::var("TIDEPOOL_TARGET_REFRESH_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2_000);
        let event_capacity = std::env::var("TIDEPOOL_EVENT_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(256);
        Self {
            bridge_base_url,
            interceptor_kind,
            log_filter,
            poll_interval_ms,
            target_refresh_ms,
            event_capacity,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn target_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.target_refresh_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bridge_base_url: "http://127.0.0.1:45456".into(),
            interceptor_kind: "android-adb".into(),
            log_filter: "info,tidepool=debug".into(),
            poll_interval_ms: 2_000,
            target_refresh_ms: 2_000,
            event_capacity: 256,
        }
    }
}

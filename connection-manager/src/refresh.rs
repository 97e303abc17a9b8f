//! Background token refresh.
//!
//! Ticks on a fixed interval, asks the registry which contexts are due and
//! refreshes them one after the other. A context that runs out of refresh
//! retries is disconnected by its own `refresh_token`; the scheduler only
//! broadcasts the change.

use crate::registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

/// Shortest accepted tick period.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub struct TokenRefreshScheduler {
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
}

impl TokenRefreshScheduler {
    /// Periods below one second (including zero) are raised to one second.
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "Refresh interval too short, using 1 second"
            );
        }
        Self {
            registry,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the refresh loop. The first tick comes one interval after start.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Starting token refresh scheduler");

            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    /// One refresh pass. Returns how many contexts were disconnected.
    pub async fn run_once(&self) -> usize {
        let due = self.registry.contexts_to_refresh();
        if due.is_empty() {
            return 0;
        }

        debug!(count = due.len(), "Refreshing tokens");

        let mut disconnected = 0;
        for context in due {
            match context.refresh_token().await {
                Ok(()) => debug!(
                    user = %context.username(),
                    connection = %context.connection_code(),
                    "Token refreshed"
                ),
                Err(e) => {
                    error!(
                        user = %context.username(),
                        connection = %context.connection_code(),
                        system = %context.info().code,
                        error = %e,
                        "Connection dropped after failed token refreshes"
                    );
                    self.registry.announce(&context).await;
                    disconnected += 1;
                }
            }
        }

        disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AdapterCatalog;
    use crate::context::RetryLimits;
    use crate::notifier::RecordingPublisher;
    use crate::registry::ConnectionSpec;
    use crate::testing::{Handshake, Probe, ScriptedAdapter};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use sysgate::config::RefreshConfig;
    use sysgate::ConnectionStatus;

    async fn setup(adapter: &ScriptedAdapter) -> (Arc<ConnectionRegistry>, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::new());
        let registry = Arc::new(ConnectionRegistry::new(
            AdapterCatalog::new(vec![Arc::new(adapter.clone())]),
            publisher.clone(),
            RetryLimits::default(),
            "https://gateway.example.com",
        ));

        let spec = ConnectionSpec {
            system_code: "SCRIPTED".to_string(),
            connect_params: json!({"username": "alice"}).as_object().cloned().unwrap(),
            ..Default::default()
        };
        registry.connect("alice", "main", &spec).await.unwrap();
        (registry, publisher)
    }

    #[tokio::test]
    async fn test_nothing_due() {
        let adapter = ScriptedAdapter::new(Handshake::Immediate).with_token_exp(60);
        let (registry, _) = setup(&adapter).await;

        let scheduler = TokenRefreshScheduler::new(registry, Duration::from_secs(10));
        assert_eq!(scheduler.run_once().await, 0);
        assert_eq!(Probe::count(&adapter.probe.refresh_calls), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_keeps_running() {
        let adapter = ScriptedAdapter::new(Handshake::Immediate).with_token_exp(60);
        let (registry, _) = setup(&adapter).await;

        let config = RefreshConfig {
            interval_seconds: 0,
            ..Default::default()
        };
        let scheduler = TokenRefreshScheduler::new(registry, Duration::from_secs(config.interval_seconds));
        assert_eq!(scheduler.interval(), Duration::from_secs(1));

        let handle = scheduler.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_exhausted_refresh_disconnects_and_announces() {
        // One-second tokens are due once two seconds have passed
        let adapter = ScriptedAdapter::new(Handshake::Immediate).with_token_exp(1);
        adapter.probe.failing_refreshes.store(5, Ordering::SeqCst);
        let (registry, publisher) = setup(&adapter).await;
        let context = registry.context("alice", "main").unwrap();
        let scheduler = TokenRefreshScheduler::new(Arc::clone(&registry), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_millis(2100)).await;

        for _ in 0..3 {
            assert_eq!(scheduler.run_once().await, 0);
            assert_eq!(context.status(), ConnectionStatus::Connected);
        }
        assert_eq!(scheduler.run_once().await, 0);
        assert_eq!(scheduler.run_once().await, 1);
        assert_eq!(context.status(), ConnectionStatus::Disconnected);
        assert_eq!(Probe::count(&adapter.probe.refresh_calls), 5);

        let changes = publisher.changes();
        assert_eq!(changes.last().unwrap().status, ConnectionStatus::Disconnected);

        // Disconnected contexts are no longer due
        assert_eq!(scheduler.run_once().await, 0);
        assert_eq!(Probe::count(&adapter.probe.refresh_calls), 5);
    }
}

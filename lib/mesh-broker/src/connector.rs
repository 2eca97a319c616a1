//! Broker connector: one connection and one shared channel per process

use crate::reconnect::{FixedDelay, ReconnectPolicy};
use lapin::{Channel, Connection, ConnectionProperties};
use mesh_core::Result;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

struct BrokerHandle {
    connection: Connection,
    channel: Channel,
    /// Which install this handle came from; error events carry the same
    /// number so a stale connection cannot evict its replacement
    generation: u64,
}

struct ConnectorShared {
    state: Mutex<Option<BrokerHandle>>,
    generation: AtomicU64,
    reconnecting: AtomicBool,
}

impl ConnectorShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(None),
            generation: AtomicU64::new(0),
            reconnecting: AtomicBool::new(false),
        })
    }
}

/// BrokerConnector owns the single broker connection/channel pair shared by
/// every service in the process
///
/// The connector is constructed explicitly and handed by reference to each
/// service at creation time; services that never talk to the broker (the
/// gateway) simply never trigger `connect`. Transport failures are handled
/// locally: the connector schedules a reconnect and does not surface the
/// error to publish/consume call sites.
pub struct BrokerConnector {
    url: String,
    policy: Arc<dyn ReconnectPolicy>,
    shared: Arc<ConnectorShared>,
}

impl BrokerConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_policy(url, FixedDelay::default())
    }

    pub fn with_policy(url: impl Into<String>, policy: impl ReconnectPolicy + 'static) -> Self {
        Self {
            url: url.into(),
            policy: Arc::new(policy),
            shared: ConnectorShared::new(),
        }
    }

    /// Open the connection and channel, reusing them if already connected
    ///
    /// On failure the error is returned to the caller (service creation is
    /// all-or-nothing) and a reconnect is scheduled as well, so a later
    /// attempt can find a live channel again.
    pub async fn connect(&self) -> Result<Channel> {
        {
            let state = self.shared.state.lock().await;
            if let Some(handle) = state.as_ref() {
                if handle.connection.status().connected() {
                    return Ok(handle.channel.clone());
                }
            }
        }

        match Self::dial(&self.url, &self.shared, &self.policy).await {
            Ok(channel) => Ok(channel),
            Err(e) => {
                error!("Broker connect to {} failed: {}", self.url, e);
                Self::spawn_retry(
                    self.url.clone(),
                    Arc::clone(&self.shared),
                    Arc::clone(&self.policy),
                );
                Err(e)
            }
        }
    }

    /// The current channel, if connected
    pub async fn channel(&self) -> Option<Channel> {
        let state = self.shared.state.lock().await;
        state.as_ref().map(|handle| handle.channel.clone())
    }

    /// Gracefully close channel then connection
    ///
    /// Close errors are logged rather than propagated; shutdown must not be
    /// blocked by a broken transport.
    pub async fn close(&self) {
        let mut state = self.shared.state.lock().await;
        if let Some(handle) = state.take() {
            if let Err(e) = handle.channel.close(200, "client shutdown").await {
                warn!("Error closing broker channel: {}", e);
            }
            if let Err(e) = handle.connection.close(200, "client shutdown").await {
                warn!("Error closing broker connection: {}", e);
            }
            info!("Broker connection closed");
        }
    }

    async fn dial(
        url: &str,
        shared: &Arc<ConnectorShared>,
        policy: &Arc<dyn ReconnectPolicy>,
    ) -> Result<Channel> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        info!("Connected to message broker at {}", url);

        let mut state = shared.state.lock().await;
        let generation = shared.generation.fetch_add(1, Ordering::Relaxed) + 1;

        {
            let url = url.to_string();
            let shared = Arc::clone(shared);
            let policy = Arc::clone(policy);
            connection.on_error(move |e| {
                error!("Broker connection error: {}", e);
                Self::schedule_reconnect(
                    generation,
                    url.clone(),
                    Arc::clone(&shared),
                    Arc::clone(&policy),
                );
            });
        }

        let replaced = state.replace(BrokerHandle {
            connection,
            channel: channel.clone(),
            generation,
        });
        if let Some(old) = replaced {
            tokio::spawn(async move {
                let _ = old.channel.close(200, "superseded").await;
                let _ = old.connection.close(200, "superseded").await;
            });
        }
        Ok(channel)
    }

    /// Handle a connection-level error event
    ///
    /// The failed handle is discarded and a retry started only while it is
    /// still the installed one; an error surfacing from an already replaced
    /// connection is a no-op.
    fn schedule_reconnect(
        generation: u64,
        url: String,
        shared: Arc<ConnectorShared>,
        policy: Arc<dyn ReconnectPolicy>,
    ) {
        tokio::spawn(async move {
            {
                let mut state = shared.state.lock().await;
                match state.as_ref() {
                    Some(handle) if handle.generation == generation => {
                        state.take();
                    }
                    _ => return,
                }
            }
            Self::spawn_retry(url, shared, policy);
        });
    }

    /// Retry the connection after the policy delay until one succeeds
    ///
    /// At most one retry task runs per connector; callers that lose the
    /// `reconnecting` flag race return without spawning.
    fn spawn_retry(url: String, shared: Arc<ConnectorShared>, policy: Arc<dyn ReconnectPolicy>) {
        if shared.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(policy.next_delay()).await;
                warn!("Reconnecting to message broker at {}", url);
                match Self::dial(&url, &shared, &policy).await {
                    Ok(_) => break,
                    Err(e) => error!("Broker reconnect failed: {}", e),
                }
            }
            shared.reconnecting.store(false, Ordering::SeqCst);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingPolicy {
        calls: Arc<AtomicUsize>,
    }

    impl ReconnectPolicy for CountingPolicy {
        fn next_delay(&self) -> Duration {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Duration::from_secs(60)
        }
    }

    #[tokio::test]
    async fn test_channel_is_none_before_connect() {
        let connector = BrokerConnector::new("amqp://127.0.0.1:5672/%2f");
        assert!(connector.channel().await.is_none());
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let connector = BrokerConnector::new("amqp://127.0.0.1:5672/%2f");
        connector.close().await;
        assert!(connector.channel().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_connection_error_is_ignored() {
        // An error event from a connection that is no longer installed must
        // not start a retry loop (here: no handle installed at all).
        let shared = ConnectorShared::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy: Arc<dyn ReconnectPolicy> = Arc::new(CountingPolicy {
            calls: Arc::clone(&calls),
        });

        BrokerConnector::schedule_reconnect(
            7,
            "amqp://127.0.0.1:5672/%2f".to_string(),
            Arc::clone(&shared),
            policy,
        );
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!shared.reconnecting.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_only_one_retry_task_runs() {
        let shared = ConnectorShared::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy: Arc<dyn ReconnectPolicy> = Arc::new(CountingPolicy {
            calls: Arc::clone(&calls),
        });

        // A running retry task holds the flag; further callers must bail out
        // without consulting the policy.
        shared.reconnecting.store(true, Ordering::SeqCst);
        BrokerConnector::spawn_retry(
            "amqp://127.0.0.1:5672/%2f".to_string(),
            Arc::clone(&shared),
            Arc::clone(&policy),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // With the flag clear, the retry loop starts and asks for a delay.
        shared.reconnecting.store(false, Ordering::SeqCst);
        BrokerConnector::spawn_retry(
            "amqp://127.0.0.1:5672/%2f".to_string(),
            Arc::clone(&shared),
            policy,
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(shared.reconnecting.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

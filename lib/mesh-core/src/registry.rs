//! In-memory service registry with time-to-live expiry

use crate::entry::{EntryKey, Metadata, ServiceEntry};
use crate::error::{MeshError, Result};
use crate::selection::{SelectionStrategy, Selector};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registry expiry configuration
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Maximum age before an entry is considered stale
    pub entry_timeout: Duration,
    /// Interval between background sweep passes
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            entry_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

type EntryMap = HashMap<EntryKey, ServiceEntry>;

// Liveness policy: age <= timeout, boundary inclusive.
fn is_live(entry: &ServiceEntry, now: DateTime<Utc>, timeout: Duration) -> bool {
    entry.age(now) <= timeout
}

/// ServiceRegistry maintains a directory of live service instances
///
/// Entries expire by age rather than by active health checks: a stale entry
/// is filtered out at read time and physically reclaimed by the periodic
/// sweep. Staleness is therefore bounded by the sweep interval plus the
/// read-time check; there is no persistence across restarts.
pub struct ServiceRegistry {
    config: RegistryConfig,
    // Map of (name, host, port) to the single live entry for that key
    entries: Arc<RwLock<EntryMap>>,
    selector: Selector,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
            selector: Selector::default(),
        }
    }

    /// Override the lookup strategy used by `find`
    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.selector = Selector::new(strategy);
        self
    }

    /// Register a service instance, or renew it if the same
    /// (name, host, port) key is already present
    ///
    /// Renewal bumps the entry's timestamp in place; it never creates a
    /// duplicate and keeps the metadata from the original registration.
    pub async fn register(
        &self,
        name: &str,
        host: &str,
        port: u16,
        metadata: Metadata,
    ) -> Result<ServiceEntry> {
        if name.is_empty() || host.is_empty() || port == 0 {
            return Err(MeshError::InvalidArgument(format!(
                "registration requires name, host and port (got name={:?}, host={:?}, port={})",
                name, host, port
            )));
        }

        let key = EntryKey {
            name: name.to_string(),
            host: host.to_string(),
            port,
        };

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get_mut(&key) {
            existing.timestamp = Utc::now();
            debug!("Renewed registration: {}@{}:{}", name, host, port);
            return Ok(existing.clone());
        }

        let entry = ServiceEntry::new(name.to_string(), host.to_string(), port, metadata);
        entries.insert(key, entry.clone());
        info!("Registered service: {}@{}:{}", name, host, port);
        Ok(entry)
    }

    /// Remove the entry matching (name, host, port)
    ///
    /// Returns whether an entry was removed; a missing key is a no-op, not
    /// an error.
    pub async fn unregister(&self, name: &str, host: &str, port: u16) -> bool {
        let key = EntryKey {
            name: name.to_string(),
            host: host.to_string(),
            port,
        };

        let mut entries = self.entries.write().await;
        let removed = entries.remove(&key).is_some();
        if removed {
            info!("Unregistered service: {}@{}:{}", name, host, port);
        } else {
            debug!("Unregister for unknown service: {}@{}:{}", name, host, port);
        }
        removed
    }

    /// All live entries with the given name
    ///
    /// Entries older than the configured timeout are treated as absent even
    /// if not yet swept.
    pub async fn find_all(&self, name: &str) -> Vec<ServiceEntry> {
        let now = Utc::now();
        let timeout = self.config.entry_timeout;
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.name == name && is_live(e, now, timeout))
            .cloned()
            .collect()
    }

    /// One live entry with the given name, chosen by the configured
    /// selection strategy; None if no instance is live
    pub async fn find(&self, name: &str) -> Option<ServiceEntry> {
        let live = self.find_all(name).await;
        self.selector.select(&live).cloned()
    }

    /// Raw snapshot of every stored entry, stale ones included (diagnostics)
    pub async fn get_all(&self) -> Vec<ServiceEntry> {
        let entries = self.entries.read().await;
        entries.values().cloned().collect()
    }

    /// Delete every entry older than the configured timeout
    ///
    /// Returns the number of entries reclaimed. Takes the same write lock as
    /// register/unregister so a sweep never races a concurrent renewal.
    pub async fn sweep(&self) -> usize {
        Self::sweep_entries(&self.entries, self.config.entry_timeout).await
    }

    /// Spawn the periodic sweep task for this registry
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let entries = Arc::clone(&self.entries);
        let timeout = self.config.entry_timeout;
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a fresh start
            // never sweeps before services have renewed once.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = Self::sweep_entries(&entries, timeout).await;
                debug!("Registry sweep pass complete ({} removed)", removed);
            }
        })
    }

    /// Number of stored entries, stale ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn sweep_entries(entries: &RwLock<EntryMap>, timeout: Duration) -> usize {
        let now = Utc::now();
        let mut entries = entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| is_live(e, now, timeout));
        let removed = before - entries.len();
        if removed > 0 {
            info!("Sweep reclaimed {} stale registry entries", removed);
        }
        removed
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> Metadata {
        Metadata::new()
    }

    fn short_timeout_config() -> RegistryConfig {
        RegistryConfig {
            entry_timeout: Duration::from_millis(20),
            sweep_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_register_rejects_empty_fields() {
        let registry = ServiceRegistry::new();
        assert!(matches!(
            registry.register("", "localhost", 3000, meta()).await,
            Err(MeshError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.register("api", "", 3000, meta()).await,
            Err(MeshError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.register("api", "localhost", 0, meta()).await,
            Err(MeshError::InvalidArgument(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_reregistration_renews_instead_of_duplicating() {
        let registry = ServiceRegistry::new();
        let first = registry
            .register("api", "localhost", 3001, meta())
            .await
            .unwrap();
        let second = registry
            .register("api", "localhost", 3001, meta())
            .await
            .unwrap();

        assert_eq!(registry.len().await, 1);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(second.url, "http://localhost:3001");
    }

    #[tokio::test]
    async fn test_find_all_and_unregister_scenario() {
        let registry = ServiceRegistry::new();
        registry
            .register("api", "localhost", 3001, meta())
            .await
            .unwrap();
        registry
            .register("api", "localhost", 3002, meta())
            .await
            .unwrap();

        assert_eq!(registry.find_all("api").await.len(), 2);

        assert!(registry.unregister("api", "localhost", 3001).await);
        let remaining = registry.find_all("api").await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].port, 3002);
    }

    #[tokio::test]
    async fn test_unregister_missing_key_is_noop() {
        let registry = ServiceRegistry::new();
        registry
            .register("api", "localhost", 3001, meta())
            .await
            .unwrap();

        assert!(!registry.unregister("api", "localhost", 9999).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_with_no_live_entries_returns_none() {
        let registry = ServiceRegistry::new();
        assert!(registry.find("api").await.is_none());
    }

    #[tokio::test]
    async fn test_find_returns_a_live_entry() {
        let registry = ServiceRegistry::new();
        registry
            .register("api", "localhost", 3001, meta())
            .await
            .unwrap();
        registry
            .register("api", "localhost", 3002, meta())
            .await
            .unwrap();

        let chosen = registry.find("api").await.unwrap();
        assert_eq!(chosen.name, "api");
        assert!(chosen.port == 3001 || chosen.port == 3002);
    }

    #[tokio::test]
    async fn test_stale_entry_filtered_at_read_time_but_visible_in_get_all() {
        let registry = ServiceRegistry::with_config(short_timeout_config());
        registry
            .register("api", "localhost", 3001, meta())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        // No sweep has run yet: find sees nothing, the raw snapshot still does.
        assert!(registry.find("api").await.is_none());
        assert!(registry.find_all("api").await.is_empty());
        assert_eq!(registry.get_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_reclaims_stale_entries() {
        let registry = ServiceRegistry::with_config(short_timeout_config());
        registry
            .register("api", "localhost", 3001, meta())
            .await
            .unwrap();
        registry
            .register("otp", "localhost", 3002, meta())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        // Renew one entry so only the other is reclaimed.
        registry
            .register("otp", "localhost", 3002, meta())
            .await
            .unwrap();

        assert_eq!(registry.sweep().await, 1);
        let all = registry.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "otp");
    }

    #[tokio::test]
    async fn test_liveness_boundary_is_inclusive() {
        let now = Utc::now();
        let timeout = Duration::from_secs(30);

        let mut entry =
            ServiceEntry::new("api".to_string(), "localhost".to_string(), 3001, meta());
        entry.timestamp = now - chrono::Duration::seconds(30);
        assert!(is_live(&entry, now, timeout));

        entry.timestamp = now - chrono::Duration::seconds(31);
        assert!(!is_live(&entry, now, timeout));
    }

    #[tokio::test]
    async fn test_background_sweeper_task_reclaims() {
        let registry = ServiceRegistry::with_config(short_timeout_config());
        registry
            .register("api", "localhost", 3001, meta())
            .await
            .unwrap();

        let handle = registry.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(registry.get_all().await.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_concurrent_registration_and_sweep() {
        let registry = Arc::new(ServiceRegistry::new());
        let mut handles = vec![];

        for i in 0..10u16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .register("api", "localhost", 3000 + i, Metadata::new())
                    .await
                    .unwrap();
                registry.sweep().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.find_all("api").await.len(), 10);
    }
}

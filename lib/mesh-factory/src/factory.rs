//! Service factory: the composition root for this process

use crate::kind::ServiceKind;
use crate::otp::OtpStore;
use crate::services::{ApiService, GatewayService, OtpService};
use chrono::Utc;
use mesh_broker::BrokerConnector;
use mesh_core::{Result, ServiceRegistry};
use mesh_runtime::{BaseService, Service, ServiceConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_OTP_TTL: Duration = Duration::from_secs(300);

/// Per-creation overrides; anything left unset falls back to the kind's
/// defaults and the factory's environment
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub version: Option<String>,
}

/// A created service tracked by the factory
#[derive(Clone)]
pub struct ServiceInstance {
    /// Generated at creation time: `{kind}-{stamp}` where the stamp is the
    /// creation millisecond, made strictly increasing per factory
    pub id: String,
    pub kind: ServiceKind,
    pub service: Arc<dyn Service>,
}

/// ServiceFactory resolves a service-type name to a concrete implementation,
/// wires in the shared broker connector and registry, and keeps every
/// created instance for the lifetime of the process
pub struct ServiceFactory {
    environment: String,
    otp_ttl: Duration,
    registry: Arc<ServiceRegistry>,
    connector: Arc<BrokerConnector>,
    instances: RwLock<HashMap<String, ServiceInstance>>,
    last_stamp: AtomicI64,
}

impl ServiceFactory {
    pub fn new(
        connector: Arc<BrokerConnector>,
        registry: Arc<ServiceRegistry>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            otp_ttl: DEFAULT_OTP_TTL,
            registry,
            connector,
            instances: RwLock::new(HashMap::new()),
            last_stamp: AtomicI64::new(0),
        }
    }

    /// Override the one-time-code time-to-live
    pub fn with_otp_ttl(mut self, ttl: Duration) -> Self {
        self.otp_ttl = ttl;
        self
    }

    /// Build a service of the named kind
    ///
    /// Creation is all-or-nothing: an unknown kind or a failed broker
    /// connect leaves the instance table untouched. The gateway kind never
    /// touches the broker.
    pub async fn create_service(
        &self,
        kind_name: &str,
        options: CreateOptions,
    ) -> Result<ServiceInstance> {
        let kind: ServiceKind = kind_name.parse()?;

        let channel = if kind.needs_broker() {
            Some(self.connector.connect().await?)
        } else {
            None
        };

        let config = ServiceConfig {
            name: kind.to_string(),
            host: options.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: options.port.unwrap_or_else(|| kind.default_port()),
            environment: self.environment.clone(),
            version: options.version.unwrap_or_else(|| "0.1.0".to_string()),
        };
        let port = config.port;
        let base = BaseService::new(config, channel, Some(Arc::clone(&self.registry)));

        let service: Arc<dyn Service> = match kind {
            ServiceKind::Api => Arc::new(ApiService::new(base)),
            ServiceKind::Otp => Arc::new(OtpService::new(base, OtpStore::new(self.otp_ttl))),
            ServiceKind::Gateway => Arc::new(GatewayService::new(base)),
        };

        let id = format!("{}-{}", kind, self.next_stamp());
        let instance = ServiceInstance {
            id: id.clone(),
            kind,
            service,
        };
        self.instances.write().await.insert(id.clone(), instance.clone());
        info!("Created service instance {} on port {}", id, port);
        Ok(instance)
    }

    /// The wall-clock millisecond for the next instance id, bumped past the
    /// previous stamp so creations within the same millisecond stay distinct
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self.last_stamp.compare_exchange_weak(
                prev,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Look up a created instance by its generated id
    pub async fn get_service(&self, id: &str) -> Option<ServiceInstance> {
        self.instances.read().await.get(id).cloned()
    }

    /// All instances created so far
    pub async fn all_services(&self) -> Vec<ServiceInstance> {
        self.instances.read().await.values().cloned().collect()
    }

    pub fn registry(&self) -> Arc<ServiceRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn connector(&self) -> &Arc<BrokerConnector> {
        &self.connector
    }
}

//! Base service runtime: lifecycle, broker helpers, registry registration

use crate::state::ServiceState;
use futures::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions};
use lapin::types::FieldTable;
use lapin::{Channel, ExchangeKind};
use mesh_core::{Metadata, MeshError, Result, ServiceEntry, ServiceRegistry};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Static configuration of a service instance
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub version: String,
}

impl ServiceConfig {
    /// Registry metadata derived from this configuration
    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("environment".to_string(), Value::String(self.environment.clone()));
        metadata.insert("version".to_string(), Value::String(self.version.clone()));
        metadata
    }
}

/// Callback invoked per delivered message
///
/// `payload` is the JSON-decoded body (falling back to a raw string when the
/// body is not valid JSON); `raw` is the untouched delivery body.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: Value, raw: &[u8]) -> Result<()>;
}

/// What to do with a delivery after the handler ran
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    Ack,
    Requeue,
}

/// Decode a delivery body as JSON, falling back to a plain string
pub fn decode_payload(raw: &[u8]) -> Value {
    serde_json::from_slice(raw)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
}

/// Run the handler and decide the fate of the delivery
///
/// A failing handler requeues the message. There is no retry cap or
/// dead-letter route, so a handler that always fails redelivers the same
/// message indefinitely; handlers that can fail persistently must bound
/// their own retries.
pub(crate) async fn dispatch(handler: &dyn MessageHandler, raw: &[u8]) -> Disposition {
    let payload = decode_payload(raw);
    match handler.handle(payload, raw).await {
        Ok(()) => Disposition::Ack,
        Err(e) => {
            warn!("Message handler failed, requeueing delivery: {}", e);
            Disposition::Requeue
        }
    }
}

/// Shared runtime every concrete service wraps
///
/// Holds the optional broker channel and registry reference injected at
/// construction time, the lifecycle state, and the set of queues already
/// declared through this service.
pub struct BaseService {
    config: ServiceConfig,
    channel: Option<Channel>,
    registry: Option<Arc<ServiceRegistry>>,
    state: RwLock<ServiceState>,
    declared_queues: Mutex<HashSet<String>>,
    registration: Mutex<Option<ServiceEntry>>,
}

impl BaseService {
    pub fn new(
        config: ServiceConfig,
        channel: Option<Channel>,
        registry: Option<Arc<ServiceRegistry>>,
    ) -> Self {
        Self {
            config,
            channel,
            registry,
            state: RwLock::new(ServiceState::Created),
            declared_queues: Mutex::new(HashSet::new()),
            registration: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub async fn state(&self) -> ServiceState {
        *self.state.read().await
    }

    pub(crate) async fn set_state(&self, state: ServiceState) {
        debug!("Service {} -> {}", self.config.name, state);
        *self.state.write().await = state;
    }

    fn require_channel(&self) -> Result<&Channel> {
        self.channel.as_ref().ok_or_else(|| {
            MeshError::BrokerUnavailable(format!(
                "service {} has no broker channel attached",
                self.config.name
            ))
        })
    }

    /// Declare a durable queue on the shared channel (idempotent)
    pub async fn register_queue(&self, queue: &str) -> Result<()> {
        let channel = self.require_channel()?;
        let mut declared = self.declared_queues.lock().await;
        if declared.contains(queue) {
            return Ok(());
        }
        mesh_broker::channel::declare_queue(channel, queue).await?;
        declared.insert(queue.to_string());
        Ok(())
    }

    /// Declare a durable exchange on the shared channel
    pub async fn register_exchange(&self, exchange: &str, kind: ExchangeKind) -> Result<()> {
        let channel = self.require_channel()?;
        mesh_broker::channel::declare_exchange(channel, exchange, kind).await
    }

    /// Serialize `message` as JSON and publish it persistently,
    /// auto-declaring the queue on first use
    pub async fn publish_to_queue<T: Serialize + Sync>(
        &self,
        queue: &str,
        message: &T,
    ) -> Result<()> {
        let channel = self.require_channel()?;
        self.register_queue(queue).await?;
        let payload = serde_json::to_vec(message)?;
        mesh_broker::channel::publish(channel, queue, &payload).await
    }

    /// Subscribe to a queue, auto-declaring it, and process deliveries on a
    /// background task
    ///
    /// Each delivery is JSON-decoded (raw-string fallback) and handed to
    /// `handler`; success acknowledges the message, failure negatively
    /// acknowledges it with requeue.
    pub async fn consume_from_queue(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        self.register_queue(queue).await?;
        let channel = self.require_channel()?.clone();

        let consumer_tag = format!("{}.{}", self.config.name, queue);
        let mut consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue_name = queue.to_string();
        let service_name = self.config.name.clone();
        tokio::spawn(async move {
            info!("Service {} consuming from queue {}", service_name, queue_name);
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!("Consumer error on queue {}: {}", queue_name, e);
                        continue;
                    }
                };

                match dispatch(handler.as_ref(), &delivery.data).await {
                    Disposition::Ack => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            error!("Failed to ack delivery on {}: {}", queue_name, e);
                        }
                    }
                    Disposition::Requeue => {
                        let options = BasicNackOptions {
                            requeue: true,
                            ..Default::default()
                        };
                        if let Err(e) = delivery.nack(options).await {
                            error!("Failed to nack delivery on {}: {}", queue_name, e);
                        }
                    }
                }
            }
            warn!("Consumer for queue {} ended", queue_name);
        });

        Ok(())
    }

    /// Register this service with the registry; a no-op when no registry or
    /// no positive port was supplied
    pub async fn register_with_registry(&self, metadata: Metadata) -> Result<()> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };
        if self.config.port == 0 {
            return Ok(());
        }

        let entry = registry
            .register(&self.config.name, &self.config.host, self.config.port, metadata)
            .await?;
        *self.registration.lock().await = Some(entry);
        Ok(())
    }

    /// Undo a previous registration, if any
    pub async fn unregister_from_registry(&self) {
        let Some(registry) = &self.registry else {
            return;
        };

        let mut registration = self.registration.lock().await;
        if let Some(entry) = registration.take() {
            registry.unregister(&entry.name, &entry.host, entry.port).await;
        }
    }
}

/// Contract every concrete service implements
///
/// `on_start` initializes broker-dependent resources (queues, consumers) and
/// `on_stop` runs service-specific cleanup; the provided `start`/`stop`
/// drive the lifecycle around them.
#[async_trait::async_trait]
pub trait Service: Send + Sync {
    fn base(&self) -> &BaseService;

    fn name(&self) -> &str {
        &self.base().config().name
    }

    /// Broker-dependent resource initialization; only invoked when a channel
    /// was attached
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// Service-specific cleanup
    async fn on_stop(&self) -> Result<()> {
        Ok(())
    }

    /// Bring the service up: broker resources, registry registration,
    /// `Running` state. Idempotent when already running.
    async fn start(&self) -> Result<()> {
        let base = self.base();
        if base.state().await.is_running() {
            info!("Service {} already running, start is a no-op", self.name());
            return Ok(());
        }
        base.set_state(ServiceState::Starting).await;

        if base.channel().is_some() {
            self.on_start().await?;
        }
        base.register_with_registry(base.config().metadata()).await?;

        base.set_state(ServiceState::Running).await;
        info!(
            "Service {} running at {}:{}",
            self.name(),
            base.config().host,
            base.config().port
        );
        Ok(())
    }

    /// Take the service down: unregister from the registry first so
    /// discovery reflects shutdown even if cleanup fails, then run cleanup.
    /// A no-op when not running.
    async fn stop(&self) -> Result<()> {
        let base = self.base();
        if !base.state().await.is_running() {
            debug!("Service {} not running, stop is a no-op", self.name());
            return Ok(());
        }
        base.set_state(ServiceState::Stopping).await;

        base.unregister_from_registry().await;
        let cleanup = self.on_stop().await;

        base.set_state(ServiceState::Stopped).await;
        info!("Service {} stopped", self.name());
        cleanup
    }
}

//! Channel helpers shared by the service runtime and message handlers

use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, ExchangeKind};
use mesh_core::Result;
use tracing::debug;

/// Declare a durable queue; re-declaring an existing queue is safe
pub async fn declare_queue(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    debug!("Declared queue: {}", queue);
    Ok(())
}

/// Declare a durable exchange of the given kind
pub async fn declare_exchange(channel: &Channel, exchange: &str, kind: ExchangeKind) -> Result<()> {
    channel
        .exchange_declare(
            exchange,
            kind,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    debug!("Declared exchange: {}", exchange);
    Ok(())
}

/// Publish a payload to a queue via the default exchange, persistently
pub async fn publish(channel: &Channel, queue: &str, payload: &[u8]) -> Result<()> {
    let properties = BasicProperties::default()
        .with_content_type("application/json".into())
        // Delivery mode 2: persist the message to disk on the broker.
        .with_delivery_mode(2);

    let _confirm = channel
        .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
        .await?;
    debug!("Published {} bytes to queue {}", payload.len(), queue);
    Ok(())
}

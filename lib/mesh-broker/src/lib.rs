//! Message broker connectivity
//!
//! This library provides:
//! - A process-wide broker connector (one connection, one shared channel)
//!   with fixed-delay reconnect
//! - Durable queue/exchange declaration and persistent publish helpers
//! - The JSON message envelope exchanged between services

pub mod channel;
pub mod connector;
pub mod message;
pub mod reconnect;

pub use connector::BrokerConnector;
pub use message::Envelope;
pub use reconnect::{FixedDelay, ReconnectPolicy};

pub use lapin::{Channel, ExchangeKind};

//! Generic service runtime
//!
//! This library provides:
//! - The per-service lifecycle state machine (created/starting/running/
//!   stopping/stopped) with idempotent start and stop
//! - Queue registration, publish and consume helpers over the shared broker
//!   channel, with ack-on-success / requeue-on-failure delivery handling
//! - Registry registration and unregistration tied to the lifecycle

pub mod service;
pub mod shutdown;
pub mod state;

pub use service::{BaseService, MessageHandler, Service, ServiceConfig};
pub use shutdown::shutdown_signal;
pub use state::ServiceState;

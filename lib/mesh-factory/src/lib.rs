//! Service factory and concrete service implementations
//!
//! This library provides:
//! - The closed set of service kinds with their default ports
//! - The factory that wires broker channel, registry and configuration into
//!   concrete services and tracks created instances
//! - Thin concrete services (api, otp, gateway) over the base runtime

pub mod factory;
pub mod kind;
pub mod otp;
pub mod services;

pub use factory::{CreateOptions, ServiceFactory, ServiceInstance};
pub use kind::ServiceKind;
pub use otp::OtpStore;

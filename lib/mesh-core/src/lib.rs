//! Core service registry and discovery functionality
//!
//! This library provides:
//! - Service entry data model (name/host/port plus metadata)
//! - In-memory registry store with time-to-live expiry and background sweep
//! - Named endpoint-selection strategies for load-balanced lookup

pub mod entry;
pub mod error;
pub mod registry;
pub mod selection;

pub use entry::{EntryKey, Metadata, ServiceEntry};
pub use error::{MeshError, Result};
pub use registry::{RegistryConfig, ServiceRegistry};
pub use selection::{SelectionStrategy, Selector};

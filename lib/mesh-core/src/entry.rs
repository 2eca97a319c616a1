//! Service entry data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Open string-to-value mapping attached to a registration (environment tag, version, ...)
pub type Metadata = HashMap<String, serde_json::Value>;

/// Key uniquely identifying a live entry
///
/// A service name is not unique on its own; multiple instances of the same
/// service share a name and differ by host/port.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// A registered service instance as seen by the registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Derived from host and port at registration time
    pub url: String,
    /// Last registered/renewed time
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
}

impl ServiceEntry {
    /// Create a new entry timestamped now
    pub fn new(name: String, host: String, port: u16, metadata: Metadata) -> Self {
        let url = format!("http://{}:{}", host, port);
        Self {
            name,
            host,
            port,
            url,
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// The (name, host, port) key for this entry
    pub fn key(&self) -> EntryKey {
        EntryKey {
            name: self.name.clone(),
            host: self.host.clone(),
            port: self.port,
        }
    }

    /// Age of the entry relative to `now`; a future-dated timestamp counts as age zero
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        now.signed_duration_since(self.timestamp)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

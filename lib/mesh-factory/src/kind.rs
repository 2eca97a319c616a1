//! The closed set of service kinds

use mesh_core::MeshError;
use std::fmt;
use std::str::FromStr;

/// Kinds of services the factory knows how to build
///
/// A closed enumeration mapped statically to constructors and default ports;
/// unknown names fail with `UnsupportedType` at parse time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Api,
    Otp,
    Gateway,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [ServiceKind::Api, ServiceKind::Otp, ServiceKind::Gateway];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Api => "api",
            ServiceKind::Otp => "otp",
            ServiceKind::Gateway => "gateway",
        }
    }

    /// Port assigned when the caller does not pick one explicitly
    pub fn default_port(&self) -> u16 {
        match self {
            ServiceKind::Api => 3000,
            ServiceKind::Otp => 3001,
            ServiceKind::Gateway => 8080,
        }
    }

    /// The gateway is the one kind that runs broker-free
    pub fn needs_broker(&self) -> bool {
        !matches!(self, ServiceKind::Gateway)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api" => Ok(ServiceKind::Api),
            "otp" => Ok(ServiceKind::Otp),
            "gateway" => Ok(ServiceKind::Gateway),
            other => Err(MeshError::UnsupportedType(other.to_string())),
        }
    }
}

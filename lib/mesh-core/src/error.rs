use thiserror::Error;

pub type Result<T> = std::result::Result<T, MeshError>;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported service type: {0}")]
    UnsupportedType(String),

    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

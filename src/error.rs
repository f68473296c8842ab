use std::sync::Arc;
use thiserror::Error;

use crate::dns::enums::DNSResourceType;

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Missing required property: {0}")]
    MissingProperty(&'static str),

    #[error("Property '{0}' expects an argument")]
    MissingArgument(String),

    #[error("Unknown property '{0}'")]
    UnknownProperty(String),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

#[derive(Error, Debug, Clone)]
pub enum DnsError {
    #[error("Server task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    IoError(Arc<std::io::Error>),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Malformed zone data at {location}: {reason}")]
    ZoneDataError { location: String, reason: String },

    #[error("No location for {0}")]
    NameError(String),

    #[error("Unsupported query type: {0:?}")]
    UnsupportedType(DNSResourceType),

    #[error("Zone transfer aborted: {0}")]
    TransferAborted(String),
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::IoError(Arc::new(err))
    }
}

impl From<crate::dns::ParseError> for DnsError {
    fn from(err: crate::dns::ParseError) -> Self {
        DnsError::Parse(err.to_string())
    }
}

impl From<redis::RedisError> for DnsError {
    fn from(err: redis::RedisError) -> Self {
        DnsError::BackendUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnsError>;

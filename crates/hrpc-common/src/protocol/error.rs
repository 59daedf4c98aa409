use thiserror::Error;

use super::responses::RemoteError;

#[derive(Error, Debug)]
pub enum HrpcError {
    /// Malformed frame or payload. Fatal for the connection it was read from.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Transport lost or never established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote side answered with an error descriptor.
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HrpcError {
    /// True when the call reached a handler and the remote side reported a failure.
    pub fn is_remote(&self) -> bool {
        matches!(self, HrpcError::Remote(_))
    }

    /// True when the call never completed: it timed out or the transport failed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HrpcError::Timeout(_) | HrpcError::Connection(_) | HrpcError::Io(_)
        )
    }

    /// The remote error descriptor, if the remote side produced one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            HrpcError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::net::AddrParseError> for HrpcError {
    fn from(err: std::net::AddrParseError) -> Self {
        HrpcError::InvalidRequest(err.to_string())
    }
}

impl From<RemoteError> for HrpcError {
    fn from(err: RemoteError) -> Self {
        HrpcError::Remote(err)
    }
}

pub type Result<T> = std::result::Result<T, HrpcError>;

//! hrpc Response Types
//!
//! A response carries either an encoded return value or a [`RemoteError`],
//! never both and never neither.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::RequestId;

/// What went wrong on the remote side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// No service is bound under the requested name
    ServiceNotFound,
    /// The service has no method with the exact name and parameter types
    MethodNotFound,
    /// The parameters could not be decoded as their declared types
    InvalidRequest,
    /// The handler ran and failed
    Invocation,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorKind::ServiceNotFound => "service not found",
            RemoteErrorKind::MethodNotFound => "method not found",
            RemoteErrorKind::InvalidRequest => "invalid request",
            RemoteErrorKind::Invocation => "invocation failed",
        };
        f.write_str(name)
    }
}

/// Error descriptor shipped back in place of a result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn service_not_found(service: &str) -> Self {
        Self::new(
            RemoteErrorKind::ServiceNotFound,
            format!("no service bound as '{}'", service),
        )
    }

    pub fn method_not_found(signature: &str) -> Self {
        Self::new(
            RemoteErrorKind::MethodNotFound,
            format!("no method matches {}", signature),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::InvalidRequest, message)
    }

    pub fn invocation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Invocation, message)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// Outcome of a call as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResponseBody {
    /// Encoded return value
    Value(Vec<u8>),
    /// Failure descriptor
    Error(RemoteError),
}

/// An RPC response returned from a server to the client.
///
/// # Response Flow
///
/// 1. Server decodes a `Request` and dispatches it
/// 2. Dispatcher produces a `Response` (value or error)
/// 3. Response is encoded and framed onto the connection it came from
/// 4. Client correlator matches `id` to the waiting caller
///
/// # Example
///
/// ```
/// use hrpc_common::protocol::responses::{RemoteError, Response};
///
/// let ok = Response::success(7, b"\"hi\"".to_vec());
/// assert!(ok.is_success());
///
/// let failed = Response::failure(7, RemoteError::service_not_found("Echo"));
/// assert!(failed.error().is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    /// Request identifier this response corresponds to
    pub id: RequestId,
    pub body: ResponseBody,
}

impl Response {
    pub fn success(id: RequestId, result: Vec<u8>) -> Self {
        Response {
            id,
            body: ResponseBody::Value(result),
        }
    }

    pub fn failure(id: RequestId, error: RemoteError) -> Self {
        Response {
            id,
            body: ResponseBody::Error(error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.body, ResponseBody::Value(_))
    }

    pub fn result(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Value(bytes) => Some(bytes),
            ResponseBody::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RemoteError> {
        match &self.body {
            ResponseBody::Value(_) => None,
            ResponseBody::Error(err) => Some(err),
        }
    }

    /// Splits the response into the encoded value or the remote failure.
    pub fn into_result(self) -> std::result::Result<Vec<u8>, RemoteError> {
        match self.body {
            ResponseBody::Value(bytes) => Ok(bytes),
            ResponseBody::Error(err) => Err(err),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::error::{HrpcError, Result};
use super::params::Params;
use crate::transport::codec::PayloadCodec;

pub type RequestId = u64;
pub type ServiceName = String;
pub type MethodName = String;

/// Id 0 is never handed out, so it marks a request that has not been submitted yet.
pub const UNASSIGNED_REQUEST_ID: RequestId = 0;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocates the next request id for this process.
///
/// Ids increase monotonically for the lifetime of the process, which makes them
/// unique among all in-flight requests on every connection the process opens.
pub fn next_request_id() -> RequestId {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A call to `service.method` with its encoded arguments.
///
/// `parameter_types` and `parameters` always have the same length; the server
/// resolves the handler by the exact `(method, parameter_types)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub id: RequestId,
    pub service: ServiceName,
    pub method: MethodName,
    pub parameter_types: Vec<String>,
    pub parameters: Vec<Vec<u8>>,
}

impl Request {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Request {
            id: UNASSIGNED_REQUEST_ID,
            service: service.into(),
            method: method.into(),
            parameter_types: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Builds a request whose arguments are encoded with `codec`.
    pub fn with_params<P: Params>(
        service: impl Into<String>,
        method: impl Into<String>,
        params: &P,
        codec: &PayloadCodec,
    ) -> Result<Self> {
        Ok(Request::new(service, method).with_parameters(P::type_names(), params.encode(codec)?))
    }

    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    pub fn with_parameters(mut self, parameter_types: Vec<String>, parameters: Vec<Vec<u8>>) -> Self {
        self.parameter_types = parameter_types;
        self.parameters = parameters;
        self
    }

    /// Appends one already-encoded argument.
    pub fn push_parameter(mut self, type_name: impl Into<String>, encoded: Vec<u8>) -> Self {
        self.parameter_types.push(type_name.into());
        self.parameters.push(encoded);
        self
    }

    /// `service.method(type, ...)`, used in logs and error messages.
    pub fn signature(&self) -> String {
        format!("{}.{}({})", self.service, self.method, self.parameter_types.join(", "))
    }

    pub fn validate(&self) -> Result<()> {
        if self.parameter_types.len() != self.parameters.len() {
            return Err(HrpcError::InvalidRequest(format!(
                "{} declares {} parameter types but carries {} parameters",
                self.signature(),
                self.parameter_types.len(),
                self.parameters.len()
            )));
        }
        Ok(())
    }
}

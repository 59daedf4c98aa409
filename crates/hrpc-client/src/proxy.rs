use hrpc_common::protocol::error::Result;
use hrpc_common::protocol::{Params, Request};
use serde::de::DeserializeOwned;

use crate::client::HrpcClient;

/// Stand-in for a remote service.
///
/// Typed interfaces are thin wrappers that forward to [`invoke`](Self::invoke):
///
/// ```rust,no_run
/// use hrpc_client::ServiceProxy;
/// use hrpc_common::Result;
///
/// struct Calculator(ServiceProxy);
///
/// impl Calculator {
///     async fn add(&self, a: i64, b: i64) -> Result<i64> {
///         self.0.invoke("add", (a, b)).await
///     }
/// }
/// ```
#[derive(Clone)]
pub struct ServiceProxy {
    client: HrpcClient,
    service: String,
}

impl ServiceProxy {
    pub(crate) fn new(client: HrpcClient, service: String) -> Self {
        Self { client, service }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Invokes `method` with `params` and decodes the result as `R`.
    ///
    /// The server picks the handler by method name and the wire type names of
    /// `P`, so the parameter tuple must match the handler's signature exactly.
    pub async fn invoke<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Params,
        R: DeserializeOwned,
    {
        let codec = *self.client.format();
        let request = Request::with_params(&self.service, method, &params, &codec)?;
        let result = self.client.call(request).await?;
        codec.deserialize(&result)
    }
}

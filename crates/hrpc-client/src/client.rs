use hrpc_common::config::ClientConfig;
use hrpc_common::protocol::error::{HrpcError, Result};
use hrpc_common::protocol::Request;
use hrpc_common::registry::ServiceRegistry;
use hrpc_common::transport::PayloadCodec;
use std::sync::Arc;

use crate::pool::ConnectionPool;
use crate::proxy::ServiceProxy;
use crate::registry_cache::CachedRegistry;

struct ClientInner {
    config: ClientConfig,
    registry: CachedRegistry,
    pool: ConnectionPool,
}

/// hrpc client.
///
/// Resolves services through a registry and multiplexes calls over one pooled
/// connection per server address. Cloning is cheap; clones share the pool and
/// the registry cache.
///
/// # Example
///
/// ```rust,no_run
/// use hrpc_client::HrpcClient;
/// use hrpc_common::config::ClientConfig;
/// use hrpc_common::registry::StaticRegistry;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = StaticRegistry::from_routes(&["Echo=127.0.0.1:9000"])?;
/// let client = HrpcClient::new(Arc::new(registry), ClientConfig::default());
///
/// let echo = client.proxy("Echo");
/// let reply: String = echo.invoke("say", ("hello".to_string(),)).await?;
/// assert_eq!(reply, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HrpcClient {
    inner: Arc<ClientInner>,
}

impl HrpcClient {
    pub fn new(registry: Arc<dyn ServiceRegistry>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                registry: CachedRegistry::new(registry, config.registry_ttl),
                pool: ConnectionPool::new(config.clone()),
                config,
            }),
        }
    }

    /// Returns a proxy for `service`. No I/O happens until a method is invoked.
    pub fn proxy(&self, service: impl Into<String>) -> ServiceProxy {
        ServiceProxy::new(self.clone(), service.into())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The payload codec parameters and results are encoded with.
    pub fn format(&self) -> &PayloadCodec {
        &self.inner.config.format
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Sends a prepared request and returns the encoded result.
    ///
    /// The request id is assigned here; any id already set is replaced.
    ///
    /// # Errors
    ///
    /// - [`HrpcError::ServiceUnavailable`] if the registry has no address for the service
    /// - [`HrpcError::Connection`] if the server cannot be reached or the connection drops
    /// - [`HrpcError::Timeout`] if no response arrives within `call_timeout`
    /// - [`HrpcError::Remote`] if the server answered with an error
    pub async fn call(&self, request: Request) -> Result<Vec<u8>> {
        let service = request.service.clone();
        let addr = self.inner.registry.lookup(&service).await?;

        let response = match self.send(&addr, request).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, HrpcError::Connection(_)) {
                    // The service may have moved; look it up again next time.
                    self.inner.registry.invalidate(&service);
                }
                return Err(e);
            }
        };

        response.into_result().map_err(HrpcError::Remote)
    }

    async fn send(&self, addr: &str, request: Request) -> Result<hrpc_common::Response> {
        let conn = self.inner.pool.get(addr).await?;
        tracing::debug!(addr, signature = %request.signature(), "Calling");
        conn.call(request, self.inner.config.call_timeout).await
    }

    /// Closes every pooled connection. Later calls reconnect.
    pub async fn close(&self) {
        self.inner.pool.close_all().await;
    }
}

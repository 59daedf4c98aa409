use async_trait::async_trait;
use dashmap::DashMap;
use hrpc_common::protocol::error::Result;
use hrpc_common::registry::ServiceRegistry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caches registry lookups for a fixed time.
///
/// With `ttl` set to `None` every lookup goes to the backing registry.
pub struct CachedRegistry {
    inner: Arc<dyn ServiceRegistry>,
    ttl: Option<Duration>,
    cache: DashMap<String, (String, Instant)>,
}

impl CachedRegistry {
    pub fn new(inner: Arc<dyn ServiceRegistry>, ttl: Option<Duration>) -> Self {
        Self {
            inner,
            ttl,
            cache: DashMap::new(),
        }
    }

    /// Forgets the cached address of `service`.
    pub fn invalidate(&self, service: &str) {
        if self.cache.remove(service).is_some() {
            tracing::debug!(service, "Invalidated cached address");
        }
    }

    fn cached(&self, service: &str) -> Option<String> {
        let ttl = self.ttl?;
        let entry = self.cache.get(service)?;
        let (address, fetched_at) = entry.value();
        let fresh = fetched_at.elapsed() < ttl;
        fresh.then(|| address.clone())
    }
}

#[async_trait]
impl ServiceRegistry for CachedRegistry {
    async fn register(&self, service: &str, address: &str) -> Result<()> {
        self.inner.register(service, address).await?;
        self.invalidate(service);
        Ok(())
    }

    async fn lookup(&self, service: &str) -> Result<String> {
        if let Some(address) = self.cached(service) {
            return Ok(address);
        }

        let address = self.inner.lookup(service).await?;
        if self.ttl.is_some() {
            self.cache
                .insert(service.to_string(), (address.clone(), Instant::now()));
        }
        Ok(address)
    }
}

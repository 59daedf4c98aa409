//! Service registry contract.
//!
//! The registry backend lives outside hrpc. Servers call
//! [`ServiceRegistry::register`] once per bound service at startup; clients
//! call [`ServiceRegistry::lookup`] before dialing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::protocol::error::{HrpcError, Result};

/// A published `(service, address)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceEntry {
    pub service: String,
    pub address: String,
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Publishes `address` (`host:port`) for `service`.
    async fn register(&self, service: &str, address: &str) -> Result<()>;

    /// Resolves `service` to an address.
    ///
    /// # Errors
    ///
    /// Returns [`HrpcError::ServiceUnavailable`] when nothing is registered
    /// under that name.
    async fn lookup(&self, service: &str) -> Result<String>;
}

/// Registry held in process memory.
///
/// Clones share the same table, so a server and a client in one process (or
/// one test) can use it as their meeting point.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ServiceEntry> {
        let entries = self.entries.read().await;
        let mut list: Vec<ServiceEntry> = entries
            .iter()
            .map(|(service, address)| ServiceEntry {
                service: service.clone(),
                address: address.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.service.cmp(&b.service));
        list
    }

    pub async fn deregister(&self, service: &str) -> bool {
        self.entries.write().await.remove(service).is_some()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn register(&self, service: &str, address: &str) -> Result<()> {
        if service.is_empty() || address.is_empty() {
            return Err(HrpcError::Registry(
                "service name and address must not be empty".to_string(),
            ));
        }
        let previous = self
            .entries
            .write()
            .await
            .insert(service.to_string(), address.to_string());
        if let Some(previous) = previous {
            tracing::debug!(service, old = %previous, new = address, "Replaced registry entry");
        }
        Ok(())
    }

    async fn lookup(&self, service: &str) -> Result<String> {
        self.entries
            .read()
            .await
            .get(service)
            .cloned()
            .ok_or_else(|| HrpcError::ServiceUnavailable(service.to_string()))
    }
}

/// Fixed routing table, typically built from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    routes: HashMap<String, String>,
}

impl StaticRegistry {
    pub fn new(routes: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }

    /// Parses `Service=host:port` routes.
    pub fn from_routes<S: AsRef<str>>(routes: &[S]) -> Result<Self> {
        let routes = routes
            .iter()
            .map(|route| parse_route(route.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(routes))
    }
}

/// Splits `Service=host:port` into its two halves.
pub fn parse_route(route: &str) -> Result<(String, String)> {
    match route.split_once('=') {
        Some((service, address)) if !service.trim().is_empty() && !address.trim().is_empty() => {
            Ok((service.trim().to_string(), address.trim().to_string()))
        }
        _ => Err(HrpcError::Registry(format!(
            "Invalid route '{}': expected Service=host:port",
            route
        ))),
    }
}

#[async_trait]
impl ServiceRegistry for StaticRegistry {
    async fn register(&self, service: &str, _address: &str) -> Result<()> {
        Err(HrpcError::Registry(format!(
            "static registry is read-only, cannot register '{}'",
            service
        )))
    }

    async fn lookup(&self, service: &str) -> Result<String> {
        self.routes
            .get(service)
            .cloned()
            .ok_or_else(|| HrpcError::ServiceUnavailable(service.to_string()))
    }
}

/// Registry kept in a text file of `Service=host:port` lines.
///
/// Processes on one machine can meet through it without a registry service:
/// servers publish into the file and clients read it on lookup. Blank lines
/// and lines starting with `#` are ignored. Each write rewrites the whole
/// file and swaps it in with a rename, so readers never see a partial file.
#[derive(Debug)]
pub struct FileRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every route in the file. A missing file has no routes.
    pub async fn routes(&self) -> Result<BTreeMap<String, String>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(HrpcError::Registry(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(parse_route)
            .collect()
    }

    async fn write_routes(&self, routes: &BTreeMap<String, String>) -> Result<()> {
        let contents: String = routes
            .iter()
            .map(|(service, address)| format!("{}={}\n", service, address))
            .collect();
        let staging = self.path.with_extension("tmp");
        let failed = |e: std::io::Error| {
            HrpcError::Registry(format!("Failed to write {}: {}", self.path.display(), e))
        };

        tokio::fs::write(&staging, contents).await.map_err(failed)?;
        tokio::fs::rename(&staging, &self.path).await.map_err(failed)
    }
}

#[async_trait]
impl ServiceRegistry for FileRegistry {
    async fn register(&self, service: &str, address: &str) -> Result<()> {
        if service.is_empty() || address.is_empty() {
            return Err(HrpcError::Registry(
                "service name and address must not be empty".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut routes = self.routes().await?;
        routes.insert(service.to_string(), address.to_string());
        self.write_routes(&routes).await?;

        tracing::debug!(service, address, path = %self.path.display(), "Route written");
        Ok(())
    }

    async fn lookup(&self, service: &str) -> Result<String> {
        self.routes()
            .await?
            .remove(service)
            .ok_or_else(|| HrpcError::ServiceUnavailable(service.to_string()))
    }
}

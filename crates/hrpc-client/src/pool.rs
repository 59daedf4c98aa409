use dashmap::DashMap;
use hrpc_common::config::ClientConfig;
use hrpc_common::protocol::error::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::connection::Connection;

type Slot = Arc<Mutex<Option<Arc<Connection>>>>;

/// Connection pool keyed by server address.
///
/// The pool keeps at most one live [`Connection`] per `host:port`. Every call
/// to that address is multiplexed over it, so the number of sockets is bounded
/// by the number of servers, not by the number of in-flight calls.
///
/// # Architecture
///
/// - Connections are established lazily, on the first [`get`](Self::get) for an address
/// - Each address has its own slot guarded by an async mutex; concurrent first
///   calls queue on the slot and share the single connect attempt
/// - A connection that has closed is replaced on the next `get`
///
/// # Example
///
/// ```rust,no_run
/// use hrpc_client::ConnectionPool;
/// use hrpc_common::config::ClientConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = ConnectionPool::new(ClientConfig::default());
///
/// let conn = pool.get("127.0.0.1:9000").await?;
/// assert!(conn.is_open());
/// # Ok(())
/// # }
/// ```
pub struct ConnectionPool {
    config: ClientConfig,
    slots: DashMap<String, Slot>,
}

impl ConnectionPool {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            slots: DashMap::new(),
        }
    }

    /// Returns the live connection to `addr`, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`HrpcError::Connection`](hrpc_common::HrpcError::Connection) if
    /// no connection exists and a new one cannot be established.
    pub async fn get(&self, addr: &str) -> Result<Arc<Connection>> {
        // Clone the slot out so the map shard is not locked across the await.
        let slot = self.slots.entry(addr.to_string()).or_default().clone();
        let mut current = slot.lock().await;

        if let Some(conn) = current.as_ref() {
            if conn.is_open() {
                return Ok(conn.clone());
            }
            tracing::debug!(addr, state = %conn.state(), "Replacing closed connection");
        }

        let conn = Connection::open(addr, &self.config).await?;
        *current = Some(conn.clone());
        Ok(conn)
    }

    /// Drops the pooled connection to `addr`, if any.
    ///
    /// Calls still holding the connection keep it alive until they finish.
    pub fn evict(&self, addr: &str) {
        self.slots.remove(addr);
    }

    /// Number of addresses with an open connection.
    pub async fn live_connections(&self) -> usize {
        let slots: Vec<Slot> = self.slots.iter().map(|entry| entry.value().clone()).collect();
        let mut live = 0;
        for slot in slots {
            if slot.lock().await.as_ref().is_some_and(|conn| conn.is_open()) {
                live += 1;
            }
        }
        live
    }

    /// Closes every pooled connection.
    pub async fn close_all(&self) {
        let slots: Vec<Slot> = self.slots.iter().map(|entry| entry.value().clone()).collect();
        self.slots.clear();
        for slot in slots {
            if let Some(conn) = slot.lock().await.take() {
                conn.close();
            }
        }
    }
}

//! hrpc Client
//!
//! Calls remote services through a local [`ServiceProxy`]. Each call gets a
//! process-unique request id, is written on the pooled connection to the
//! service's address, and is completed by the [`Correlator`] when the matching
//! response comes back, in whatever order the server answers.

pub mod client;
pub mod connection;
pub mod correlator;
pub mod pool;
pub mod proxy;
pub mod registry_cache;

pub use client::HrpcClient;
pub use connection::Connection;
pub use correlator::{Correlator, PendingCall, PendingResponse};
pub use pool::ConnectionPool;
pub use proxy::ServiceProxy;
pub use registry_cache::CachedRegistry;

//! Endpoint configuration.
//!
//! Loading configuration from files or flags is left to the embedding
//! application; these structs are what the engine consumes.

use std::time::Duration;

use crate::transport::codec::{PayloadCodec, WireCodec, DEFAULT_MAX_FRAME_SIZE};
use crate::transport::tcp::DEFAULT_CONNECT_TIMEOUT;

/// Default per-call deadline (30 seconds)
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lifetime of a cached registry lookup (30 seconds)
pub const DEFAULT_REGISTRY_TTL: Duration = Duration::from_secs(30);

/// Default number of encoded frames a connection buffers before writers wait
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Server configuration.
///
/// # Example
///
/// ```rust
/// use hrpc_common::config::ServerConfig;
/// use hrpc_common::transport::PayloadCodec;
///
/// let config = ServerConfig::new("0.0.0.0:9000")
///     .with_advertised_addr("10.0.0.5:9000")
///     .with_format(PayloadCodec::json());
/// assert_eq!(config.advertised_addr.as_deref(), Some("10.0.0.5:9000"));
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (`host:port`, port 0 picks a free port)
    pub bind_addr: String,
    /// Address published to the registry; defaults to the bound address
    pub advertised_addr: Option<String>,
    /// Largest accepted frame payload in bytes
    pub max_frame_size: usize,
    /// Payload encoding, must match the clients'
    pub format: PayloadCodec,
    /// Encoded responses buffered per connection
    pub outbound_queue_capacity: usize,
}

impl ServerConfig {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            ..Self::default()
        }
    }

    pub fn with_advertised_addr(mut self, addr: impl Into<String>) -> Self {
        self.advertised_addr = Some(addr.into());
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_format(mut self, format: PayloadCodec) -> Self {
        self.format = format;
        self
    }

    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    pub fn wire_codec(&self) -> WireCodec {
        WireCodec::new(self.format, self.max_frame_size)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            advertised_addr: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            format: PayloadCodec::default(),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

/// Client configuration.
///
/// # Default Configuration
///
/// - `call_timeout`: 30 seconds
/// - `connect_timeout`: 5 seconds
/// - `max_frame_size`: 16 MB
/// - `format`: postcard
/// - `registry_ttl`: 30 seconds (`None` disables caching)
/// - `outbound_queue_capacity`: 1024 frames
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub call_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
    pub format: PayloadCodec,
    pub registry_ttl: Option<Duration>,
    pub outbound_queue_capacity: usize,
}

impl ClientConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_format(mut self, format: PayloadCodec) -> Self {
        self.format = format;
        self
    }

    pub fn with_registry_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.registry_ttl = ttl;
        self
    }

    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    pub fn wire_codec(&self) -> WireCodec {
        WireCodec::new(self.format, self.max_frame_size)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            format: PayloadCodec::default(),
            registry_ttl: Some(DEFAULT_REGISTRY_TTL),
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.registry_ttl, Some(Duration::from_secs(30)));
        assert_eq!(config.wire_codec().max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_server_config_builders() {
        let config = ServerConfig::new("0.0.0.0:7000")
            .with_max_frame_size(1024)
            .with_outbound_queue_capacity(0);
        assert_eq!(config.bind_addr, "0.0.0.0:7000");
        assert_eq!(config.wire_codec().max_frame_size(), 1024);
        assert_eq!(config.outbound_queue_capacity, 1);
    }
}

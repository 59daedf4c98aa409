//! hrpc Common Types and Transport
//!
//! This crate provides the protocol definitions, wire codec and registry
//! contract shared by the hrpc client and server.
//!
//! # Overview
//!
//! hrpc lets a caller invoke a method on a remote service through a local
//! proxy. Calls are multiplexed over one TCP connection per server address and
//! matched to their responses by request id, so responses may arrive in any
//! order.
//!
//! - **Protocol Layer**: [`Request`], [`Response`], [`RemoteError`], [`HrpcError`]
//! - **Parameters**: [`Params`] tuples of [`WireType`] values, named on the wire
//! - **Transport Layer**: length-prefixed frames, pluggable payload codec
//! - **Registry**: the `register` / `lookup` contract and two simple backends
//!
//! # Wire Protocol
//!
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [payload]`
//! - **Payload**: postcard by default, JSON optionally
//! - **Max Frame Size**: 16 MB by default; larger frames close the connection
//!
//! # Example
//!
//! ```
//! use hrpc_common::{Request, Response};
//! use hrpc_common::transport::WireCodec;
//!
//! let wire = WireCodec::default();
//! let request = Request::with_params("Echo", "say", &("hi".to_string(),), wire.payload())
//!     .unwrap()
//!     .with_id(1);
//! assert_eq!(request.parameter_types, vec!["string"]);
//!
//! let result = wire.payload().serialize("hi").unwrap();
//! let response = Response::success(request.id, result);
//! assert!(response.is_success());
//! ```

pub mod config;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use config::{ClientConfig, ServerConfig};
pub use protocol::*;
pub use registry::{FileRegistry, InMemoryRegistry, ServiceEntry, ServiceRegistry, StaticRegistry};

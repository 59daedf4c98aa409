//! hrpc Server
//!
//! Hosts services behind a TCP listener. Services are assembled from
//! [`ServiceBinding`]s into a [`Dispatcher`], which resolves each request by
//! service name, method name and exact parameter types, runs the handler and
//! packages the outcome as a response. [`RpcServer`] owns the acceptor and the
//! per-connection reader and writer tasks.

pub mod dispatcher;
pub mod server;
pub mod service;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use server::RpcServer;
pub use service::{Handler, HandlerFuture, ServiceBinding};

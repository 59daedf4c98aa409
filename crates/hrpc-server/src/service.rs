//! Service bindings: the methods a server exposes under one service name.

use futures::future::BoxFuture;
use hrpc_common::protocol::{Params, RemoteError};
use hrpc_common::transport::PayloadCodec;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// Future returned by a type-erased handler.
pub type HandlerFuture = BoxFuture<'static, Result<Vec<u8>, RemoteError>>;

/// A method implementation with its parameter decoding and result encoding
/// folded in.
pub type Handler = Arc<dyn Fn(Vec<Vec<u8>>, PayloadCodec) -> HandlerFuture + Send + Sync>;

/// The methods bound under one service name.
///
/// A method is identified by its name together with the exact list of
/// parameter type names, so the same name may be bound once per signature.
///
/// # Example
///
/// ```
/// use hrpc_server::ServiceBinding;
/// use std::convert::Infallible;
///
/// let echo = ServiceBinding::new("Echo")
///     .method("say", |(text,): (String,)| async move { Ok::<_, Infallible>(text) })
///     .method("say", |(text, times): (String, u32)| async move {
///         Ok::<_, Infallible>(text.repeat(times as usize))
///     })
///     .blocking_method("len", |(text,): (String,)| Ok::<_, Infallible>(text.len() as u64));
///
/// assert_eq!(echo.method_count(), 3);
/// ```
pub struct ServiceBinding {
    name: String,
    methods: HashMap<String, HashMap<Vec<String>, Handler>>,
}

impl ServiceBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds an async handler to `name` with parameter list `P`.
    ///
    /// Binding the same name and parameter types twice replaces the first
    /// handler. A handler returning `Err(e)` reaches the caller as an
    /// invocation error carrying `e.to_string()`.
    pub fn method<P, R, E, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        P: Params,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased: Handler = Arc::new(move |parameters: Vec<Vec<u8>>, codec: PayloadCodec| {
            let handler = handler.clone();
            let future: HandlerFuture = Box::pin(async move {
                let args = P::decode(&codec, &parameters)
                    .map_err(|e| RemoteError::invalid_request(e.to_string()))?;
                let value = handler(args)
                    .await
                    .map_err(|e| RemoteError::invocation(e.to_string()))?;
                codec
                    .serialize(&value)
                    .map_err(|e| RemoteError::invocation(format!("Failed to encode result: {}", e)))
            });
            future
        });

        self.methods
            .entry(name.to_string())
            .or_default()
            .insert(P::type_names(), erased);
        self
    }

    /// Binds a synchronous handler that runs on tokio's blocking pool.
    ///
    /// Use this for CPU-bound or blocking work so it does not stall the
    /// threads serving connections.
    pub fn blocking_method<P, R, E, F>(self, name: &str, handler: F) -> Self
    where
        P: Params,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(P) -> Result<R, E> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.method(name, move |args: P| {
            let handler = handler.clone();
            async move {
                match tokio::task::spawn_blocking(move || handler(args)).await {
                    Ok(result) => result.map_err(|e| e.to_string()),
                    Err(e) if e.is_panic() => Err(format!(
                        "handler panicked: {}",
                        panic_message(e.into_panic().as_ref())
                    )),
                    Err(e) => Err(e.to_string()),
                }
            }
        })
    }

    /// Number of `(method, parameter types)` signatures bound.
    pub fn method_count(&self) -> usize {
        self.methods.values().map(HashMap::len).sum()
    }

    /// Bound signatures as `name(type, ...)`, sorted.
    pub fn signatures(&self) -> Vec<String> {
        let mut signatures: Vec<String> = self
            .methods
            .iter()
            .flat_map(|(name, overloads)| {
                overloads
                    .keys()
                    .map(move |types| format!("{}({})", name, types.join(", ")))
            })
            .collect();
        signatures.sort();
        signatures
    }

    /// Finds the handler for an exact `(method, parameter types)` match.
    pub fn resolve(&self, method: &str, parameter_types: &[String]) -> Option<&Handler> {
        self.methods.get(method)?.get(parameter_types)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

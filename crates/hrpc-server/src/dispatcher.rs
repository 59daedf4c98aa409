use futures::FutureExt;
use hrpc_common::protocol::{HrpcError, RemoteError, Request, Response};
use hrpc_common::transport::PayloadCodec;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::service::{panic_message, ServiceBinding};

/// Collects service bindings before the server starts.
#[derive(Default)]
pub struct DispatcherBuilder {
    services: HashMap<String, ServiceBinding>,
    format: PayloadCodec,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service. A later binding with the same name replaces the earlier one.
    pub fn service(mut self, binding: ServiceBinding) -> Self {
        if self.services.contains_key(binding.name()) {
            tracing::warn!(service = binding.name(), "Replacing service binding");
        }
        self.services.insert(binding.name().to_string(), binding);
        self
    }

    /// Payload codec used for parameters and results (postcard by default).
    pub fn format(mut self, format: PayloadCodec) -> Self {
        self.format = format;
        self
    }

    pub fn build(self) -> Dispatcher {
        for binding in self.services.values() {
            tracing::debug!(
                service = binding.name(),
                methods = ?binding.signatures(),
                "Service bound"
            );
        }
        Dispatcher {
            services: Arc::new(self.services),
            format: self.format,
        }
    }
}

/// Routes requests to handlers.
///
/// The service table is fixed once built; clones share it. Every failure to
/// route or run a request becomes an error [`Response`] for that request id,
/// never an error for the connection.
#[derive(Clone)]
pub struct Dispatcher {
    services: Arc<HashMap<String, ServiceBinding>>,
    format: PayloadCodec,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn with_format(mut self, format: PayloadCodec) -> Self {
        self.format = format;
        self
    }

    pub fn format(&self) -> &PayloadCodec {
        &self.format
    }

    /// Names of the bound services, sorted.
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let id = request.id;
        match self.invoke(request).await {
            Ok(result) => Response::success(id, result),
            Err(error) => Response::failure(id, error),
        }
    }

    async fn invoke(&self, request: Request) -> Result<Vec<u8>, RemoteError> {
        let id = request.id;
        let Some(binding) = self.services.get(&request.service) else {
            tracing::debug!(id, service = %request.service, "Unknown service");
            return Err(RemoteError::service_not_found(&request.service));
        };

        if let Err(e) = request.validate() {
            let message = match e {
                HrpcError::InvalidRequest(message) => message,
                other => other.to_string(),
            };
            return Err(RemoteError::invalid_request(message));
        }

        let Some(handler) = binding.resolve(&request.method, &request.parameter_types) else {
            let signature = request.signature();
            tracing::debug!(id, %signature, "No matching method");
            return Err(RemoteError::method_not_found(&signature));
        };

        tracing::debug!(id, service = %request.service, method = %request.method, "Dispatching");
        let future = handler(request.parameters, self.format);
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(id, error = %message, "Handler panicked");
                Err(RemoteError::invocation(format!("handler panicked: {}", message)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrpc_common::RemoteErrorKind;
    use std::convert::Infallible;

    fn dispatcher() -> Dispatcher {
        let echo = ServiceBinding::new("Echo")
            .method("say", |(text,): (String,)| async move { Ok::<_, Infallible>(text) })
            .method("fail", |(): ()| async move { Err::<(), _>("always fails") })
            .method("panic", |(): ()| async move {
                if true {
                    panic!("handler blew up");
                }
                Ok::<(), Infallible>(())
            });
        Dispatcher::builder().service(echo).build()
    }

    fn say(text: &str) -> Request {
        Request::with_params("Echo", "say", &(text.to_string(),), &PayloadCodec::default())
            .unwrap()
            .with_id(7)
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let response = dispatcher().dispatch(say("hi")).await;

        assert_eq!(response.id, 7);
        let text: String = PayloadCodec::default()
            .deserialize(response.result().unwrap())
            .unwrap();
        assert_eq!(text, "hi");
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let request = Request::new("Nope", "ping").with_id(3);
        let response = dispatcher().dispatch(request).await;

        let error = response.error().unwrap();
        assert_eq!(response.id, 3);
        assert_eq!(error.kind, RemoteErrorKind::ServiceNotFound);
        assert!(error.message.contains("Nope"));
    }

    #[tokio::test]
    async fn test_signature_mismatch_is_method_not_found() {
        let request = Request::with_params("Echo", "say", &(1i32,), &PayloadCodec::default())
            .unwrap()
            .with_id(4);
        let response = dispatcher().dispatch(request).await;

        let error = response.error().unwrap();
        assert_eq!(error.kind, RemoteErrorKind::MethodNotFound);
        assert!(error.message.contains("Echo.say(i32)"));
    }

    #[tokio::test]
    async fn test_mismatched_parameter_lists_are_invalid() {
        let request = Request::new("Echo", "say")
            .with_parameters(vec!["string".to_string()], vec![])
            .with_id(5);
        let response = dispatcher().dispatch(request).await;

        assert_eq!(response.error().unwrap().kind, RemoteErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_are_contained() {
        let dispatcher = dispatcher();

        let response = dispatcher.dispatch(Request::new("Echo", "fail").with_id(8)).await;
        let error = response.error().unwrap();
        assert_eq!(error.kind, RemoteErrorKind::Invocation);
        assert_eq!(error.message, "always fails");

        let response = dispatcher.dispatch(Request::new("Echo", "panic").with_id(9)).await;
        let error = response.error().unwrap();
        assert_eq!(error.kind, RemoteErrorKind::Invocation);
        assert!(error.message.contains("handler blew up"));

        // The dispatcher keeps working afterwards.
        assert!(dispatcher.dispatch(say("still here")).await.is_success());
    }

    #[test]
    fn test_service_names() {
        let dispatcher = Dispatcher::builder()
            .service(ServiceBinding::new("B"))
            .service(ServiceBinding::new("A"))
            .build();
        assert_eq!(dispatcher.service_names(), vec!["A", "B"]);
    }
}

use futures::StreamExt;
use hrpc_common::config::ServerConfig;
use hrpc_common::protocol::error::{HrpcError, Result};
use hrpc_common::protocol::{RemoteError, Request, Response};
use hrpc_common::registry::ServiceRegistry;
use hrpc_common::transport::{tcp, ConnectionState, Frame, FrameDecoder, StateCell, WireCodec};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, OwnedPermit};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// TCP server hosting a [`Dispatcher`].
///
/// Each accepted connection gets a reader, which decodes requests and spawns
/// one task per request, and a writer, which is the only task writing to the
/// socket. Responses are written in completion order, not arrival order.
///
/// Every request task holds a slot of the connection's outbound queue, so at
/// most `outbound_queue_capacity` requests per connection are in flight. A
/// peer that stops reading responses stops having its requests read.
///
/// # Example
///
/// ```rust,no_run
/// use hrpc_common::config::ServerConfig;
/// use hrpc_common::registry::InMemoryRegistry;
/// use hrpc_server::{Dispatcher, RpcServer, ServiceBinding};
/// use std::convert::Infallible;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let echo = ServiceBinding::new("Echo")
///     .method("say", |(text,): (String,)| async move { Ok::<_, Infallible>(text) });
/// let dispatcher = Dispatcher::builder().service(echo).build();
///
/// let server = RpcServer::bind(ServerConfig::new("127.0.0.1:9000"), dispatcher).await?;
/// server.publish(&InMemoryRegistry::new()).await?;
/// server.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    dispatcher: Dispatcher,
}

impl RpcServer {
    /// Binds the listening socket. The dispatcher adopts the configured payload format.
    pub async fn bind(config: ServerConfig, dispatcher: Dispatcher) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await.map_err(|e| {
            HrpcError::Connection(format!("Failed to bind to {}: {}", config.bind_addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(addr = %local_addr, format = %config.format, "Server listening");

        Ok(Self {
            listener,
            local_addr,
            dispatcher: dispatcher.with_format(config.format),
            config,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The address published to the registry.
    pub fn advertised_addr(&self) -> String {
        self.config
            .advertised_addr
            .clone()
            .unwrap_or_else(|| self.local_addr.to_string())
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Registers every bound service under the advertised address.
    pub async fn publish(&self, registry: &dyn ServiceRegistry) -> Result<()> {
        let address = self.advertised_addr();
        for service in self.dispatcher.service_names() {
            registry.register(service, &address).await?;
            tracing::info!(service, address = %address, "Service published");
        }
        Ok(())
    }

    /// Accepts connections until the process exits.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` completes, then closes every open
    /// connection.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let connections = CancellationToken::new();
        let wire = self.config.wire_codec();
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(peer = %peer, "Connection accepted");
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        self.dispatcher.clone(),
                        wire,
                        self.config.outbound_queue_capacity.max(1),
                        connections.child_token(),
                    ));
                }
                Err(e) => {
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = back_off_after_accept_error(&e) => {}
                    }
                }
            }
        }

        connections.cancel();
        tracing::info!(addr = %self.local_addr, "Server stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Dispatcher,
    wire: WireCodec,
    queue_capacity: usize,
    shutdown: CancellationToken,
) {
    let state = Arc::new(StateCell::new(ConnectionState::Connecting));
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let (read_half, write_half) = stream.into_split();
    let (outbound, outbound_rx) = mpsc::channel::<Frame>(queue_capacity);

    let writer = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = tcp::write_frames(write_half, wire, outbound_rx, shutdown.clone()).await;
            // Without a writer nothing can be answered; stop reading too.
            shutdown.cancel();
            result
        })
    };
    state.transition(ConnectionState::Connecting, ConnectionState::Open);

    let mut requests = FramedRead::new(read_half, FrameDecoder::<Request>::new(wire));
    let reason = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break "connection shut down".to_string(),
            next = requests.next() => next,
        };

        match next {
            Some(Ok(request)) => {
                tracing::debug!(peer = %peer, id = request.id, "Request received");
                // Reading pauses while every queue slot is taken.
                let slot = tokio::select! {
                    _ = shutdown.cancelled() => break "connection shut down".to_string(),
                    slot = outbound.clone().reserve_owned() => match slot {
                        Ok(slot) => slot,
                        Err(_) => break "writer stopped".to_string(),
                    },
                };
                tokio::spawn(answer(request, dispatcher.clone(), wire, slot, state.clone()));
            }
            Some(Err(e)) => {
                tracing::warn!(peer = %peer, error = %e, "Closing connection after protocol error");
                shutdown.cancel();
                break e.to_string();
            }
            None => break "closed by peer".to_string(),
        }
    };

    // After a clean EOF the connection stays open so in-flight handlers can
    // still answer; the writer drains their slots before exiting.
    if shutdown.is_cancelled() {
        state.begin_close();
    }
    drop(outbound);
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(peer = %peer, error = %e, "Writer stopped with error"),
        Err(e) => tracing::warn!(peer = %peer, error = %e, "Writer task failed"),
    }
    state.begin_close();
    state.finish_close();

    tracing::debug!(peer = %peer, reason = %reason, state = %state.get(), "Connection closed");
}

/// Runs one request and queues its response in the slot reserved for it.
///
/// Requests still waiting to run when the connection starts closing are
/// skipped; nobody could read their responses.
async fn answer(
    request: Request,
    dispatcher: Dispatcher,
    wire: WireCodec,
    slot: OwnedPermit<Frame>,
    state: Arc<StateCell>,
) {
    if !state.is_open() {
        tracing::debug!(id = request.id, state = %state.get(), "Skipping request on closing connection");
        return;
    }
    let response = dispatcher.dispatch(request).await;
    if let Some(frame) = encode_response(&wire, response) {
        slot.send(frame);
    }
}

async fn back_off_after_accept_error(error: &std::io::Error) {
    // Usually transient, e.g. the process ran out of file descriptors.
    tracing::error!(error = %error, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

/// Encodes `response`, substituting an error response when it does not fit in
/// a frame. Returns `None` only if even the error response cannot be encoded.
fn encode_response(wire: &WireCodec, response: Response) -> Option<Frame> {
    let id = response.id;
    match wire.encode(&response) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(id, error = %e, "Response could not be encoded");
            let fallback = Response::failure(
                id,
                RemoteError::invocation(format!("Response could not be encoded: {}", e)),
            );
            match wire.encode(&fallback) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    tracing::error!(id, error = %e, "Dropping response");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ServiceBinding;
    use hrpc_common::transport::PayloadCodec;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_dispatcher(hits: Arc<AtomicUsize>) -> Dispatcher {
        let binding = ServiceBinding::new("Counter").method("hit", move |(): ()| {
            let hits = hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(())
            }
        });
        Dispatcher::builder().service(binding).build()
    }

    fn hit_request(wire: &WireCodec) -> Request {
        Request::with_params("Counter", "hit", &(), wire.payload())
            .unwrap()
            .with_id(5)
    }

    #[tokio::test]
    async fn test_answer_queues_response_in_slot() {
        let hits = Arc::new(AtomicUsize::new(0));
        let wire = WireCodec::default();
        let (tx, mut rx) = mpsc::channel::<Frame>(1);
        let slot = tx.clone().reserve_owned().await.unwrap();
        let state = Arc::new(StateCell::new(ConnectionState::Open));

        answer(hit_request(&wire), counting_dispatcher(hits.clone()), wire, slot, state).await;

        let frame = rx.try_recv().unwrap();
        let mut buf = bytes::BytesMut::from(&frame.to_bytes()[..]);
        let response: Response = wire.decode(&mut buf).unwrap().unwrap();
        assert_eq!(response.id, 5);
        assert!(response.error().is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_answer_skips_closing_connection() {
        let hits = Arc::new(AtomicUsize::new(0));
        let wire = WireCodec::default();
        let (tx, mut rx) = mpsc::channel::<Frame>(1);
        let slot = tx.clone().reserve_owned().await.unwrap();
        let state = Arc::new(StateCell::new(ConnectionState::Open));
        assert!(state.begin_close());

        answer(hit_request(&wire), counting_dispatcher(hits.clone()), wire, slot, state).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        // The slot went back to the queue.
        assert!(tx.try_reserve().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_error_backs_off() {
        let started = tokio::time::Instant::now();
        let error = std::io::Error::new(std::io::ErrorKind::Other, "too many open files");

        back_off_after_accept_error(&error).await;

        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn test_bind_reports_local_addr() {
        let server = RpcServer::bind(ServerConfig::default(), Dispatcher::builder().build())
            .await
            .unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(server.advertised_addr(), server.local_addr().to_string());
    }

    #[tokio::test]
    async fn test_bind_invalid_addr_fails() {
        let result = RpcServer::bind(ServerConfig::new("not-an-addr"), Dispatcher::builder().build()).await;
        assert!(matches!(result, Err(HrpcError::Connection(_))));
    }

    #[test]
    fn test_oversized_response_is_replaced() {
        let wire = WireCodec::new(PayloadCodec::default(), 256);
        let frame = encode_response(&wire, Response::success(11, vec![0u8; 1024])).unwrap();

        let mut buf = bytes::BytesMut::from(&frame.to_bytes()[..]);
        let response: Response = wire.decode(&mut buf).unwrap().unwrap();
        assert_eq!(response.id, 11);
        assert!(response.error().unwrap().message.contains("Frame too large"));
    }
}

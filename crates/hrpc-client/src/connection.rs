//! One multiplexed client connection.

use futures::StreamExt;
use hrpc_common::config::ClientConfig;
use hrpc_common::protocol::{Request, Response, Result};
use hrpc_common::transport::{tcp, ConnectionState, FrameDecoder, StateCell};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use crate::correlator::{Correlator, PendingResponse};

struct Shared {
    addr: String,
    state: Arc<StateCell>,
    correlator: Arc<Correlator>,
    shutdown: CancellationToken,
}

impl Shared {
    /// Runs once per connection, whichever side notices the failure first.
    fn close(&self, reason: &str) {
        if !self.state.begin_close() {
            return;
        }
        self.shutdown.cancel();
        self.correlator.on_connection_closed(reason);
        self.state.finish_close();
        tracing::info!(addr = %self.addr, reason, "Connection closed");
    }
}

/// A TCP connection to one server, shared by every call to that address.
///
/// Two tasks serve the connection: a writer draining the outbound queue and a
/// reader handing decoded responses to the [`Correlator`]. Any read, write or
/// protocol error closes the connection and fails the calls still pending on
/// it.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Dials `addr` and starts the reader and writer tasks.
    pub async fn open(addr: &str, config: &ClientConfig) -> Result<Arc<Self>> {
        let state = Arc::new(StateCell::new(ConnectionState::Connecting));
        let stream = tcp::connect(addr, config.connect_timeout).await?;
        let (read_half, write_half) = stream.into_split();

        let wire = config.wire_codec();
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue_capacity.max(1));
        let shared = Arc::new(Shared {
            addr: addr.to_string(),
            state: state.clone(),
            correlator: Arc::new(Correlator::new(wire, outbound_tx, state.clone())),
            shutdown: CancellationToken::new(),
        });
        state.transition(ConnectionState::Connecting, ConnectionState::Open);

        let writer = shared.clone();
        tokio::spawn(async move {
            let reason = match tcp::write_frames(write_half, wire, outbound_rx, writer.shutdown.clone()).await {
                Ok(()) => "writer stopped".to_string(),
                Err(e) => {
                    tracing::warn!(addr = %writer.addr, error = %e, "Write failed");
                    e.to_string()
                }
            };
            writer.close(&reason);
        });

        let reader = shared.clone();
        tokio::spawn(async move {
            let reason = read_responses(&reader, read_half, FrameDecoder::new(wire)).await;
            reader.close(&reason);
        });

        tracing::info!(addr, "Connection established");
        Ok(Arc::new(Self { shared }))
    }

    pub fn addr(&self) -> &str {
        &self.shared.addr
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.is_open()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    /// Submits `request` without waiting for the response.
    pub async fn submit(&self, request: Request, timeout: Duration) -> Result<PendingResponse> {
        self.shared.correlator.submit(request, timeout).await
    }

    /// Submits `request` and waits for its response.
    pub async fn call(&self, request: Request, timeout: Duration) -> Result<Response> {
        self.submit(request, timeout).await?.await
    }

    /// Closes the connection, failing any pending calls.
    pub fn close(&self) {
        self.shared.close("connection closed locally");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.close("connection dropped");
    }
}

async fn read_responses(
    shared: &Shared,
    read_half: OwnedReadHalf,
    decoder: FrameDecoder<Response>,
) -> String {
    let mut frames = FramedRead::new(read_half, decoder);

    loop {
        let next = tokio::select! {
            _ = shared.shutdown.cancelled() => return "connection closed locally".to_string(),
            next = frames.next() => next,
        };

        match next {
            Some(Ok(response)) => shared.correlator.on_response(response),
            Some(Err(e)) => {
                tracing::warn!(addr = %shared.addr, error = %e, "Closing connection after read error");
                return e.to_string();
            }
            None => return "connection closed by peer".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use hrpc_common::protocol::HrpcError;
    use hrpc_common::transport::WireCodec;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio_util::codec::FramedWrite;

    /// Answers every request with its own id as the result, in arrival order.
    async fn echo_ids_server() -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let wire = WireCodec::default();
            let (read, write) = stream.into_split();
            let mut requests = FramedRead::new(read, FrameDecoder::<Request>::new(wire));
            let mut responses = FramedWrite::new(write, wire);
            while let Some(Ok(request)) = requests.next().await {
                let result = wire.payload().serialize(&request.id).unwrap();
                let frame = wire.encode(&Response::success(request.id, result)).unwrap();
                if responses.send(frame).await.is_err() {
                    break;
                }
            }
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let (addr, _server) = echo_ids_server().await;
        let conn = Connection::open(&addr, &ClientConfig::default()).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);

        let response = conn
            .call(Request::new("Ids", "echo"), Duration::from_secs(5))
            .await
            .unwrap();
        let echoed: u64 = WireCodec::default()
            .payload()
            .deserialize(response.result().unwrap())
            .unwrap();
        assert_eq!(echoed, response.id);
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_peer_disconnect_fails_pending_calls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let conn = Connection::open(&addr, &ClientConfig::default()).await.unwrap();
        let (mut server_side, _) = listener.accept().await.unwrap();

        let pending = conn
            .submit(Request::new("Echo", "ping"), Duration::from_secs(30))
            .await
            .unwrap();
        server_side.shutdown().await.unwrap();
        drop(server_side);

        assert!(matches!(pending.await, Err(HrpcError::Connection(_))));
        assert!(!conn.is_open());

        let result = conn.call(Request::new("Echo", "ping"), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(HrpcError::Connection(_))));
    }

    #[tokio::test]
    async fn test_garbage_from_peer_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let config = ClientConfig::default().with_max_frame_size(1024);
        let conn = Connection::open(&addr, &config).await.unwrap();
        let (mut server_side, _) = listener.accept().await.unwrap();

        let pending = conn
            .submit(Request::new("Echo", "ping"), Duration::from_secs(30))
            .await
            .unwrap();
        // Announces a frame far beyond the client's limit.
        server_side.write_all(&u32::MAX.to_be_bytes()).await.unwrap();

        match pending.await {
            Err(HrpcError::Connection(reason)) => assert!(reason.contains("Frame too large")),
            other => panic!("expected connection error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_peer_calls_time_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let config = ClientConfig::default().with_outbound_queue_capacity(1);
        let conn = Connection::open(&addr, &config).await.unwrap();
        // Accepted but never read, so socket buffers and then the queue fill up.
        let (_server_side, _) = listener.accept().await.unwrap();

        let payload = vec![b'x'; 8 * 1024 * 1024];
        for _ in 0..4 {
            let request = Request::new("Echo", "say")
                .with_parameters(vec!["string".to_string()], vec![payload.clone()]);
            let result = tokio::time::timeout(
                Duration::from_secs(3),
                conn.call(request, Duration::from_millis(200)),
            )
            .await
            .expect("call blocked past its deadline");
            assert!(matches!(result, Err(HrpcError::Timeout(200))));
        }
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_local_close() {
        let (addr, _server) = echo_ids_server().await;
        let conn = Connection::open(&addr, &ClientConfig::default()).await.unwrap();

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        let result = conn.call(Request::new("Ids", "echo"), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(HrpcError::Connection(_))));
    }
}

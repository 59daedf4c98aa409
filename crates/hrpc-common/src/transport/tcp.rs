use futures::SinkExt;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;

use crate::protocol::error::{HrpcError, Result};
use crate::transport::codec::{Frame, WireCodec};

/// Default timeout for establishing a TCP connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to a remote endpoint.
///
/// The address may resolve to several socket addresses; each is tried in turn
/// until one accepts within `connect_timeout`. Nagle is disabled on the
/// resulting stream since frames are flushed as whole units.
///
/// # Errors
///
/// Returns [`HrpcError::Connection`] if the address cannot be resolved or no
/// resolved address accepts the connection.
pub async fn connect(addr: &str, connect_timeout: Duration) -> Result<TcpStream> {
    let socket_addrs = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| HrpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                stream
                    .set_nodelay(true)
                    .map_err(|e| HrpcError::Connection(format!("Failed to set TCP_NODELAY: {}", e)))?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_err = Some(e.to_string()),
            Err(_) => {
                last_err = Some(format!("timed out after {}ms", connect_timeout.as_millis()))
            }
        }
    }

    Err(HrpcError::Connection(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err.unwrap_or_else(|| "no addresses resolved".to_string())
    )))
}

/// Drains an outbound queue into the write half of a connection.
///
/// This is the only code that writes to the socket, so frames from concurrent
/// calls never interleave. Frames already queued are written back to back and
/// flushed once. Returns when the queue is closed, `shutdown` is cancelled, or
/// a write fails. Cancellation also interrupts a write stuck on a peer that
/// has stopped reading.
pub async fn write_frames(
    write_half: OwnedWriteHalf,
    wire: WireCodec,
    mut outbound: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut sink = FramedWrite::new(write_half, wire);

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = outbound.recv() => frame,
        };

        let Some(frame) = frame else {
            break;
        };

        let batch = async {
            sink.feed(frame).await?;
            while let Ok(frame) = outbound.try_recv() {
                sink.feed(frame).await?;
            }
            sink.flush().await
        };
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            written = batch => written?,
        }
    }

    // Best effort: the peer may already be gone.
    let _ = sink.close().await;
    Ok(())
}

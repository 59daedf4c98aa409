//! Matching responses to the callers waiting for them.
//!
//! Every call submitted on a connection parks a [`PendingCall`] keyed by its
//! request id. The reader task hands each decoded response to
//! [`Correlator::on_response`], which removes the entry and wakes the caller.
//! Removal from the pending map is the only way a call completes, so a
//! response, a timeout and a connection loss can never all claim the same
//! call.

use dashmap::DashMap;
use futures::future::BoxFuture;
use hrpc_common::protocol::{next_request_id, HrpcError, Request, RequestId, Response, Result};
use hrpc_common::transport::{Frame, StateCell, WireCodec};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

type Completion = oneshot::Sender<Result<Response>>;

/// A call waiting for its response.
#[derive(Debug)]
pub struct PendingCall {
    sender: Completion,
    deadline: Instant,
    service: String,
    method: String,
}

/// Per-connection table of in-flight calls.
pub struct Correlator {
    wire: WireCodec,
    outbound: mpsc::Sender<Frame>,
    state: Arc<StateCell>,
    pending: DashMap<RequestId, PendingCall>,
}

impl Correlator {
    /// Creates a correlator that queues encoded requests on `outbound`.
    ///
    /// `state` is the lifecycle of the connection behind `outbound`; calls are
    /// only accepted while it is open.
    pub fn new(wire: WireCodec, outbound: mpsc::Sender<Frame>, state: Arc<StateCell>) -> Self {
        Self {
            wire,
            outbound,
            state,
            pending: DashMap::new(),
        }
    }

    /// Stamps `request` with a fresh id, parks it and queues it for writing.
    ///
    /// The returned handle resolves with the matching response, with
    /// [`HrpcError::Timeout`] once `timeout` has elapsed, or with
    /// [`HrpcError::Connection`] if the connection is lost first.
    ///
    /// # Errors
    ///
    /// Fails immediately when the connection is not open, when the request is
    /// malformed, or when it is too large to fit in a frame. In each case no
    /// bytes have been queued.
    pub async fn submit(self: &Arc<Self>, mut request: Request, timeout: Duration) -> Result<PendingResponse> {
        request.id = next_request_id();
        request.validate()?;
        let frame = self.wire.encode(&request)?;

        let id = request.id;
        let deadline = Instant::now() + timeout;
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall {
                sender,
                deadline,
                service: request.service,
                method: request.method,
            },
        );

        // Checked after the insert: a close that starts after this point
        // drains the entry we just added.
        if !self.state.is_open() {
            self.pending.remove(&id);
            return Err(HrpcError::Connection(format!(
                "Connection is {}",
                self.state.get()
            )));
        }

        // Dropping the handle on any early return releases the entry.
        let mut pending = PendingResponse {
            id,
            deadline,
            timeout,
            receiver,
            correlator: Arc::clone(self),
        };

        // A full queue means the writer is stuck on a slow peer; waiting for
        // space counts against the call's deadline.
        match tokio::time::timeout_at(deadline, self.outbound.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(HrpcError::Connection("Outbound queue closed".to_string())),
            Err(_) => {
                if self.expire(id) {
                    tracing::debug!(id, "Request timed out waiting for queue space");
                    return Err(HrpcError::Timeout(timeout.as_millis() as u64));
                }
                return match pending.receiver.try_recv() {
                    Ok(Err(e)) => Err(e),
                    _ => Err(HrpcError::Connection("Call abandoned".to_string())),
                };
            }
        }

        tracing::debug!(id, "Request queued");
        Ok(pending)
    }

    /// Completes the call `response` answers.
    ///
    /// Responses for ids that are not pending (unknown, duplicate, or already
    /// timed out) are logged and dropped.
    pub fn on_response(&self, response: Response) {
        match self.pending.remove(&response.id) {
            Some((id, call)) => {
                if call.deadline <= Instant::now() {
                    tracing::debug!(id, service = %call.service, method = %call.method, "Response arrived at deadline");
                } else {
                    tracing::debug!(id, service = %call.service, method = %call.method, "Response matched");
                }
                // The caller may have stopped waiting.
                let _ = call.sender.send(Ok(response));
            }
            None => {
                tracing::warn!(id = response.id, "Discarding response with no pending call");
            }
        }
    }

    /// Fails every outstanding call with [`HrpcError::Connection`].
    pub fn on_connection_closed(&self, reason: &str) {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0usize;

        for id in ids {
            if let Some((_, call)) = self.pending.remove(&id) {
                let _ = call
                    .sender
                    .send(Err(HrpcError::Connection(reason.to_string())));
                failed += 1;
            }
        }

        if failed > 0 {
            tracing::info!(failed, reason, "Failed pending calls on closed connection");
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn expire(&self, id: RequestId) -> bool {
        self.pending.remove(&id).is_some()
    }
}

/// Handle to a submitted call. Await it for the response.
///
/// Dropping the handle abandons the call: its pending entry is removed and a
/// late response is discarded.
pub struct PendingResponse {
    id: RequestId,
    deadline: Instant,
    timeout: Duration,
    receiver: oneshot::Receiver<Result<Response>>,
    correlator: Arc<Correlator>,
}

impl PendingResponse {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Waits for the response or the deadline, whichever comes first.
    pub async fn wait(mut self) -> Result<Response> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(completion) => {
                completion.unwrap_or_else(|_| Err(HrpcError::Connection("Call abandoned".to_string())))
            }
            Err(_) => {
                if self.correlator.expire(self.id) {
                    tracing::debug!(id = self.id, "Request timed out");
                    Err(HrpcError::Timeout(self.timeout.as_millis() as u64))
                } else {
                    // A response or a close claimed the call first; its
                    // completion is already in the channel.
                    (&mut self.receiver)
                        .await
                        .unwrap_or_else(|_| Err(HrpcError::Connection("Call abandoned".to_string())))
                }
            }
        }
    }
}

impl IntoFuture for PendingResponse {
    type Output = Result<Response>;
    type IntoFuture = BoxFuture<'static, Result<Response>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.correlator.expire(self.id);
    }
}

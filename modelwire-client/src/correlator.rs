//! Request/response correlation
//!
//! Every outbound request gets a fresh id and a pending slot holding a
//! oneshot sender. Inbound frames are matched to slots strictly by id, so
//! responses may arrive in any order.
//!
//! # Request Lifecycle
//!
//! 1. **Allocate**: take the next id from a counter that only increases
//! 2. **Register**: insert the pending slot before anything is sent
//! 3. **Send**: hand the encoded frame to the transport
//! 4. **Wait**: the caller awaits the oneshot receiver
//! 5. **Resolve**: the matching frame removes the slot and completes it
//!
//! A slot is removed exactly once: by its response, by a failed send, or by
//! the sweep that runs when the connection closes. After the sweep the
//! correlator refuses new calls, so nothing can wait on a dead connection.
//!
//! There is no timeout here; callers bound their wait with
//! `tokio::time::timeout`. A call whose future is dropped keeps its slot
//! until the response arrives or the sweep runs.

use crate::metrics::ClientMetrics;
use crate::transport::Transport;
use modelwire_core::{codec, Failure, MethodDescriptor, RequestFrame, RequestId, ResponseFrame, TransportFault};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex};

type Completion = oneshot::Sender<Result<Value, Failure>>;

struct PendingCall {
    descriptor: MethodDescriptor,
    created: Instant,
    tx: Completion,
}

/// Matches responses to outstanding requests
#[derive(Clone)]
pub struct Correlator {
    transport: Arc<dyn Transport>,
    // `None` once the connection closed and the slots were swept
    pending: Arc<Mutex<Option<HashMap<RequestId, PendingCall>>>>,
    counter: Arc<AtomicU64>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Correlator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(Some(HashMap::new()))),
            counter: Arc::new(AtomicU64::new(0)),
            metrics: None,
        }
    }

    pub(crate) fn with_metrics(mut self, metrics: Option<Arc<ClientMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Allocate the next request id, starting at 1
    pub fn next_id(&self) -> RequestId {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Send a request and wait for its outcome
    ///
    /// Resolves with the result value, the server's error payload, or a
    /// transport fault when the frame could not be sent or the connection
    /// closed first.
    pub async fn call(
        &self,
        descriptor: &MethodDescriptor,
        target: Option<String>,
        params: Value,
    ) -> Result<Value, Failure> {
        let id = self.next_id();
        let frame = RequestFrame::new(id, descriptor, target, params);
        let text = codec::encode_request(&frame)?;

        let rx = {
            let mut guard = self.pending.lock().await;
            let slots = guard.as_mut().ok_or(TransportFault::ClosedWhilePending)?;
            let (tx, rx) = oneshot::channel();
            slots.insert(
                id,
                PendingCall {
                    descriptor: *descriptor,
                    created: Instant::now(),
                    tx,
                },
            );
            rx
        };

        if let Err(fault) = self.transport.send(text).await {
            if let Some(slots) = self.pending.lock().await.as_mut() {
                slots.remove(&id);
            }
            tracing::warn!(request_id = id, method = %descriptor, error = %fault, "Failed to send request");
            return Err(fault.into());
        }
        tracing::trace!(request_id = id, method = %descriptor, "Request sent");

        rx.await
            .unwrap_or(Err(Failure::Transport(TransportFault::ClosedWhilePending)))
    }

    /// Route one inbound frame to its pending call
    ///
    /// A frame that fails to decode but still carries a readable `RequestId`
    /// fails that call with the decode fault. Frames with no readable id, or
    /// that match no pending call, are logged and dropped.
    pub async fn dispatch(&self, text: &str) {
        let fault = match codec::decode_response(text) {
            Ok(frame) => {
                self.resolve(frame).await;
                return;
            }
            Err(fault) => fault,
        };

        let Some(id) = codec::peek_request_id(text) else {
            tracing::warn!(error = %fault, "Discarding undecodable frame");
            if let Some(ref m) = self.metrics {
                m.record_unmatched_frame("undecodable");
            }
            return;
        };

        let pending = match self.pending.lock().await.as_mut() {
            Some(slots) => slots.remove(&id),
            None => None,
        };
        match pending {
            Some(pending) => {
                tracing::warn!(
                    request_id = id,
                    method = %pending.descriptor,
                    error = %fault,
                    "Undecodable response"
                );
                let _ = pending.tx.send(Err(Failure::Transport(fault)));
            }
            None => {
                tracing::warn!(request_id = id, error = %fault, "Discarding undecodable frame");
                if let Some(ref m) = self.metrics {
                    m.record_unmatched_frame("undecodable");
                }
            }
        }
    }

    /// Complete the call matching `frame`; false if none was pending
    pub async fn resolve(&self, frame: ResponseFrame) -> bool {
        let pending = match self.pending.lock().await.as_mut() {
            Some(slots) => slots.remove(&frame.request_id),
            None => None,
        };

        let Some(pending) = pending else {
            tracing::warn!(request_id = frame.request_id, "Response for unknown request id");
            if let Some(ref m) = self.metrics {
                m.record_unmatched_frame("unknown_id");
            }
            return false;
        };

        tracing::debug!(
            request_id = frame.request_id,
            method = %pending.descriptor,
            error = frame.is_error(),
            elapsed_ms = pending.created.elapsed().as_millis() as u64,
            "Response received"
        );
        // The caller may have given up on the call; that is not an error
        let _ = pending.tx.send(frame.into_result().map_err(Failure::Remote));
        true
    }

    /// Reject every pending call and refuse new ones
    ///
    /// Returns the number of calls rejected. Later sweeps are no-ops.
    pub async fn sweep(&self) -> usize {
        let Some(slots) = self.pending.lock().await.take() else {
            return 0;
        };

        let count = slots.len();
        for (id, pending) in slots {
            tracing::debug!(request_id = id, method = %pending.descriptor, "Rejecting orphaned request");
            let _ = pending
                .tx
                .send(Err(Failure::Transport(TransportFault::ClosedWhilePending)));
        }
        count
    }

    pub async fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .await
            .as_ref()
            .map(HashMap::len)
            .unwrap_or(0)
    }

    /// Whether the sweep has run
    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use modelwire_core::ErrorPayload;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: StdMutex<Vec<String>>,
        broken: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, frame: String) -> Result<(), TransportFault> {
            if self.broken {
                return Err(TransportFault::Send("broken pipe".into()));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn close(&self) {}
    }

    const GET: MethodDescriptor = MethodDescriptor::versioned("Application", "Get", 1);

    async fn wait_for_pending(correlator: &Correlator, count: usize) {
        while correlator.pending_count().await < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let correlator = Correlator::new(Arc::new(RecordingTransport::default()));
        let first = correlator.next_id();
        let second = correlator.next_id();
        assert_eq!(first, 1);
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let transport = Arc::new(RecordingTransport::default());
        let correlator = Correlator::new(transport.clone());

        let first = tokio::spawn({
            let c = correlator.clone();
            async move { c.call(&GET, None, json!({"application": "a"})).await }
        });
        wait_for_pending(&correlator, 1).await;
        let second = tokio::spawn({
            let c = correlator.clone();
            async move { c.call(&GET, None, json!({"application": "b"})).await }
        });
        wait_for_pending(&correlator, 2).await;

        correlator.resolve(ResponseFrame::success(2, json!("second"))).await;
        correlator.resolve(ResponseFrame::success(1, json!("first"))).await;

        assert_eq!(first.await.unwrap().unwrap(), json!("first"));
        assert_eq!(second.await.unwrap().unwrap(), json!("second"));
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_remote_error_is_returned_raw() {
        let correlator = Correlator::new(Arc::new(RecordingTransport::default()));
        let call = tokio::spawn({
            let c = correlator.clone();
            async move { c.call(&GET, None, json!({})).await }
        });
        wait_for_pending(&correlator, 1).await;

        correlator
            .dispatch(r#"{"RequestId": 1, "Error": "application \"x\" not found", "ErrorCode": "not found"}"#)
            .await;

        assert_eq!(
            call.await.unwrap().unwrap_err(),
            Failure::Remote(ErrorPayload::new("application \"x\" not found", "not found"))
        );
    }

    #[tokio::test]
    async fn test_unknown_and_undecodable_frames_are_ignored() {
        let correlator = Correlator::new(Arc::new(RecordingTransport::default()));
        assert!(!correlator.resolve(ResponseFrame::success(42, json!({}))).await);
        correlator.dispatch("not json at all").await;
        correlator.dispatch(r#"{"RequestId": 7, "Response": {}}"#).await;
        assert!(!correlator.is_closed().await);
    }

    #[tokio::test]
    async fn test_undecodable_response_fails_its_call() {
        let correlator = Correlator::new(Arc::new(RecordingTransport::default()));
        let call = tokio::spawn({
            let c = correlator.clone();
            async move { c.call(&GET, None, json!({})).await }
        });
        wait_for_pending(&correlator, 1).await;

        correlator.dispatch(r#"{"RequestId": 1, "Error": {"nested": true}}"#).await;

        assert!(matches!(
            call.await.unwrap(),
            Err(Failure::Transport(TransportFault::Decode(_)))
        ));
        assert_eq!(correlator.pending_count().await, 0);
        assert!(!correlator.is_closed().await);
    }

    #[tokio::test]
    async fn test_send_failure_frees_slot() {
        let transport = Arc::new(RecordingTransport {
            broken: true,
            ..Default::default()
        });
        let correlator = Correlator::new(transport);

        let result = correlator.call(&GET, None, json!({})).await;
        assert!(matches!(result, Err(Failure::Transport(TransportFault::Send(_)))));
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_rejects_pending_and_refuses_new_calls() {
        let correlator = Correlator::new(Arc::new(RecordingTransport::default()));
        let calls: Vec<_> = (0..3)
            .map(|_| {
                let c = correlator.clone();
                tokio::spawn(async move { c.call(&GET, None, json!({})).await })
            })
            .collect();
        wait_for_pending(&correlator, 3).await;

        assert_eq!(correlator.sweep().await, 3);
        for call in calls {
            assert_eq!(
                call.await.unwrap().unwrap_err(),
                Failure::Transport(TransportFault::ClosedWhilePending)
            );
        }

        assert!(correlator.is_closed().await);
        assert_eq!(correlator.sweep().await, 0);
        assert_eq!(
            correlator.call(&GET, None, json!({})).await.unwrap_err(),
            Failure::Transport(TransportFault::ClosedWhilePending)
        );
    }
}

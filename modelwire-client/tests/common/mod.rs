//! Common test utilities for modelwire-client integration tests
//!
//! Two ways to stand in for a controller:
//!
//! - [`FakeController`]: an in-memory transport. Tests read the decoded
//!   requests a session sends and answer them in whatever order they like.
//! - [`MockWsServer`]: a real WebSocket listener on localhost, for tests
//!   that exercise the WebSocket transport end to end.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use modelwire_client::{Session, Transport, TransportEvent};
use modelwire_core::{
    codec, Credentials, ErrorPayload, ProtocolGeneration, RequestFrame, ResponseFrame, TransportFault,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(5);

/// Client side of the in-memory connection
struct FakeTransport {
    requests: mpsc::UnboundedSender<RequestFrame>,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, frame: String) -> Result<(), TransportFault> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportFault::Closed("fake connection closed".into()));
        }
        let request = codec::decode_request(&frame)?;
        self.requests
            .send(request)
            .map_err(|_| TransportFault::Send("controller gone".into()))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Closed("closed by client".into()));
        }
    }
}

/// Controller side of the in-memory connection
pub struct FakeController {
    requests: mpsc::UnboundedReceiver<RequestFrame>,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl FakeController {
    /// Next request the session sent; panics if none arrives in time
    pub async fn next_request(&mut self) -> RequestFrame {
        tokio::time::timeout(WAIT, self.requests.recv())
            .await
            .expect("timed out waiting for a request")
            .expect("session dropped its transport")
    }

    /// Whether nothing is sent within a short window
    pub async fn is_quiet(&mut self) -> bool {
        tokio::time::timeout(Duration::from_millis(100), self.requests.recv())
            .await
            .is_err()
    }

    pub fn reply(&self, request_id: u64, result: Value) {
        self.send_frame(&ResponseFrame::success(request_id, result));
    }

    pub fn reply_error(&self, request_id: u64, message: &str, code: &str) {
        self.send_frame(&ResponseFrame::error(request_id, ErrorPayload::new(message, code)));
    }

    /// Push a raw text frame
    pub fn send_raw(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Frame(text.into()));
    }

    /// Drop the connection from the controller side
    pub fn disconnect(&self, reason: &str) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Closed(reason.into()));
        }
    }

    fn send_frame(&self, frame: &ResponseFrame) {
        let text = codec::encode_response(frame).expect("encode response");
        self.send_raw(text);
    }
}

/// A fresh unauthenticated session wired to a fake controller
pub fn fake_session(generation: ProtocolGeneration) -> (Session, FakeController) {
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));

    let transport = FakeTransport {
        requests: requests_tx,
        events: events_tx.clone(),
        closed: closed.clone(),
    };
    let session = Session::new(Arc::new(transport), events_rx, generation);

    let controller = FakeController {
        requests: requests_rx,
        events: events_tx,
        closed,
    };
    (session, controller)
}

/// A login result in the shape of `generation`
pub fn login_result(generation: ProtocolGeneration) -> Value {
    match generation {
        ProtocolGeneration::V2 => json!({
            "model-tag": "model-deadbeef",
            "servers": [[
                {"value": "10.0.0.5", "type": "ipv4", "scope": "local-cloud", "port": 17070},
                {"value": "127.0.0.1", "type": "ipv4", "scope": "local-machine", "port": 17070}
            ]],
            "facades": [{"name": "Application", "versions": [1]}],
        }),
        ProtocolGeneration::V1 => json!({
            "EnvironTag": "environment-deadbeef",
            "Servers": [[
                {"Value": "10.0.0.5", "Type": "ipv4", "NetworkScope": "local-cloud", "Port": 17070}
            ]],
        }),
    }
}

/// A session that has completed login against a fake controller
pub async fn authenticated_session(generation: ProtocolGeneration) -> (Session, FakeController) {
    let (session, mut controller) = fake_session(generation);

    let login = tokio::spawn({
        let session = session.clone();
        async move { session.login(Credentials::new("admin", "secret")).await }
    });

    let request = controller.next_request().await;
    assert_eq!(request.method, "Login");
    controller.reply(request.request_id, login_result(generation));

    login.await.unwrap().expect("login should succeed");
    (session, controller)
}

/// Delta result for a `Next` call
pub fn deltas(entries: Value) -> Value {
    json!({ "deltas": entries })
}

/// Mock controller listening on a real WebSocket
///
/// Every text frame received is decoded and passed to the handler; whatever
/// the handler returns is sent back.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    message_rx: mpsc::Receiver<RequestFrame>,
}

impl MockWsServer {
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(RequestFrame) -> Option<ResponseFrame> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(handler);

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, msg_rx) = mpsc::channel::<RequestFrame>(100);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let msg_tx = msg_tx.clone();
                        let handler = handler.clone();

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();

                            while let Some(Ok(message)) = read.next().await {
                                let Message::Text(text) = message else { continue };
                                let Ok(request) = codec::decode_request(&text) else { continue };

                                let _ = msg_tx.send(request.clone()).await;
                                if let Some(response) = (*handler)(request) {
                                    let text = codec::encode_response(&response).unwrap();
                                    if write.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            message_rx: msg_rx,
        }
    }

    /// `host:port` address for the session builder
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub async fn wait_for_request(&mut self) -> Option<RequestFrame> {
        tokio::time::timeout(WAIT, self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

//! Message transport beneath a session
//!
//! A transport moves whole text frames. Outbound frames go through
//! [`Transport::send`]; inbound frames and the end of the connection arrive
//! as [`TransportEvent`]s on a channel handed to the session at construction.
//!
//! The WebSocket implementation splits the stream: the sink stays behind a
//! mutex for writers, and a spawned task forwards everything it reads. The
//! channel always ends with exactly one [`TransportEvent::Closed`], whether
//! the peer closed, the read failed, or [`Transport::close`] was called.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use modelwire_core::TransportFault;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Something that arrived from the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete inbound text frame
    Frame(String),
    /// The connection ended; no more events follow
    Closed(String),
}

/// Receiving half handed to the session
pub type Inbound = mpsc::UnboundedReceiver<TransportEvent>;

/// Outbound half of a connection
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write one frame
    async fn send(&self, frame: String) -> Result<(), TransportFault>;

    /// Close the connection; calling it again has no effect
    async fn close(&self);
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport
pub struct WsTransport {
    sink: Mutex<Option<SplitSink<WsStream, Message>>>,
}

impl WsTransport {
    /// Dial `url` and start forwarding inbound frames
    #[tracing::instrument(skip(url), fields(url = %url))]
    pub async fn connect(url: &str) -> Result<(Self, Inbound), TransportFault> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportFault::Connect(e.to_string()))?;
        let (sink, stream) = stream.split();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(stream, tx));
        tracing::debug!("WebSocket connected");

        Ok((
            Self {
                sink: Mutex::new(Some(sink)),
            },
            rx,
        ))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, frame: String) -> Result<(), TransportFault> {
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| TransportFault::Closed("transport closed".into()))?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| TransportFault::Send(e.to_string()))
    }

    async fn close(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "Error while closing WebSocket");
            }
        }
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<TransportEvent>) {
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                if tx.send(TransportEvent::Frame(text)).is_err() {
                    // Nobody is listening any more
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| format!("closed by server: {}", f.reason))
                    .unwrap_or_else(|| "closed by server".to_string());
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "WebSocket read failed");
                break e.to_string();
            }
            None => break "connection ended".to_string(),
        }
    };

    tracing::info!(reason = %reason, "WebSocket closed");
    let _ = tx.send(TransportEvent::Closed(reason));
}

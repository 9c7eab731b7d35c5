//! Delta watcher loop
//!
//! Turns the server's blocking "next batch" call into a stream of
//! [`WatchEvent`]s. One task per loop keeps exactly one `Next` call in flight
//! and forwards non-empty batches to the consumer in the order they arrived.
//!
//! # States
//!
//! ```text
//! Idle → Opening → Streaming → Stopping → Stopped
//!          │           │                     ↑
//!          └───────────┴─────────────────────┘
//! ```
//!
//! `Stopped` is terminal; watching again needs a new [`WatcherLoop`].
//!
//! # Example
//!
//! ```rust,no_run
//! use modelwire_client::{SessionBuilder, WatchEvent, WatcherLoop};
//! use modelwire_core::Credentials;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionBuilder::new("10.0.0.5:17070").connect().await?;
//!     session.login(Credentials::new("admin", "secret")).await?;
//!
//!     let (watcher, mut events) = WatcherLoop::new(&session);
//!     watcher.start().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             WatchEvent::Batch(records) => println!("{} changes", records.len()),
//!             WatchEvent::End => break,
//!             WatchEvent::Failed(error) => return Err(error.into()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use crate::metrics::ClientMetrics;
use crate::retry::{NoRetry, RetryStrategy};
use crate::session::{Session, SessionInner};
use modelwire_core::{delta, DeltaRecord, Error, ErrorKind, Operation, Result};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

/// What the consumer receives
#[derive(Debug)]
pub enum WatchEvent {
    /// A non-empty batch, in server order
    Batch(Vec<DeltaRecord>),
    /// The server stopped the watcher; not an error
    End,
    /// The loop stopped on a classified error
    Failed(Error),
}

pub type WatchEvents = mpsc::UnboundedReceiver<WatchEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherState {
    Idle,
    Opening,
    Streaming,
    Stopping,
    Stopped,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatcherState::Idle => "idle",
            WatcherState::Opening => "opening",
            WatcherState::Streaming => "streaming",
            WatcherState::Stopping => "stopping",
            WatcherState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A server-side watcher cursor
///
/// Holds only a weak reference to its session. Once the session is gone or
/// no longer authenticated, every call fails with a transport error.
#[derive(Clone)]
pub struct WatcherHandle {
    id: String,
    session: Weak<SessionInner>,
}

impl WatcherHandle {
    pub(crate) fn new(id: String, session: &Session) -> Self {
        Self {
            id,
            session: session.downgrade(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Block until the server has changes, then decode them
    pub async fn next(&self) -> Result<Vec<DeltaRecord>> {
        let session = self.session()?;
        let generation = session.generation();
        let call = session
            .prepare(Operation::WatcherNext, Some(self.id.clone()), json!({}), ErrorKind::Transport)
            .await?;
        drop(session);

        let result = call.send().await?;
        delta::decode_batch(generation, &result)
    }

    /// Ask the server to stop this watcher
    pub async fn stop(&self) -> Result<()> {
        let session = self.session()?;
        let call = session
            .prepare(Operation::WatcherStop, Some(self.id.clone()), json!({}), ErrorKind::Transport)
            .await?;
        drop(session);

        call.send().await.map(|_| ())
    }

    /// Stop the server-side watcher in the background
    fn release(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            match handle.stop().await {
                Ok(()) => tracing::debug!(watcher_id = %handle.id, "Watcher released"),
                Err(e) => tracing::debug!(watcher_id = %handle.id, error = %e, "Watcher release failed"),
            }
        });
    }

    fn session(&self) -> Result<Session> {
        Session::upgrade(&self.session).ok_or_else(|| Error::transport("session closed"))
    }
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("id", &self.id)
            .field("live", &(self.session.strong_count() > 0))
            .finish()
    }
}

/// Watcher loop settings
pub struct WatcherConfig {
    retry: Box<dyn RetryStrategy>,
}

impl WatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy for retriable `Next` failures other than watcher-stopped
    pub fn with_retry(mut self, strategy: impl RetryStrategy + 'static) -> Self {
        self.retry = Box::new(strategy);
        self
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            retry: Box::new(NoRetry),
        }
    }
}

struct Shared {
    state: WatcherState,
    handle: Option<WatcherHandle>,
}

/// Drives one watcher and feeds its batches to a channel
pub struct WatcherLoop {
    session: Weak<SessionInner>,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<WatchEvent>,
    stop_signal: Arc<Notify>,
    retry: Mutex<Option<Box<dyn RetryStrategy>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl WatcherLoop {
    /// Create an idle loop and the receiver its events go to
    pub fn new(session: &Session) -> (Self, WatchEvents) {
        Self::with_config(session, WatcherConfig::default())
    }

    pub fn with_config(session: &Session, config: WatcherConfig) -> (Self, WatchEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            session: session.downgrade(),
            shared: Arc::new(Mutex::new(Shared {
                state: WatcherState::Idle,
                handle: None,
            })),
            events,
            stop_signal: Arc::new(Notify::new()),
            retry: Mutex::new(Some(config.retry)),
            task: Mutex::new(None),
            metrics: session.metrics(),
        };
        (watcher, rx)
    }

    pub async fn state(&self) -> WatcherState {
        self.shared.lock().await.state
    }

    /// The open watcher, once streaming
    pub async fn handle(&self) -> Option<WatcherHandle> {
        self.shared.lock().await.handle.clone()
    }

    /// Open the watcher and start streaming
    ///
    /// Only valid from `Idle`. On failure the loop is stopped and the error
    /// returned; nothing is sent to the consumer.
    #[tracing::instrument(skip_all)]
    pub async fn start(&self) -> Result<()> {
        {
            let mut shared = self.shared.lock().await;
            if shared.state != WatcherState::Idle {
                return Err(Error::permanent(format!("cannot start watcher while {}", shared.state)));
            }
            shared.state = WatcherState::Opening;
        }

        let opened = self.open().await;

        let mut shared = self.shared.lock().await;
        let handle = match opened {
            Ok(handle) => handle,
            Err(error) => {
                tracing::warn!(error = %error, "Failed to open watcher");
                shared.state = WatcherState::Stopped;
                return Err(error);
            }
        };

        if shared.state != WatcherState::Opening {
            // stop() arrived while the open call was in flight
            shared.state = WatcherState::Stopped;
            drop(shared);
            handle.release();
            return Ok(());
        }

        tracing::info!(watcher_id = %handle.id(), "Watcher streaming");
        shared.state = WatcherState::Streaming;
        shared.handle = Some(handle.clone());

        let retry = self
            .retry
            .lock()
            .await
            .take()
            .unwrap_or_else(|| Box::new(NoRetry));
        let task = tokio::spawn(run(
            handle,
            self.shared.clone(),
            self.events.clone(),
            self.stop_signal.clone(),
            retry,
            self.metrics.clone(),
        ));
        *self.task.lock().await = Some(task);
        Ok(())
    }

    /// Stop streaming and wait for the loop task to finish
    ///
    /// A `Next` call in flight is abandoned; whatever it returns is
    /// discarded. Idempotent.
    #[tracing::instrument(skip_all)]
    pub async fn stop(&self) {
        {
            let mut shared = self.shared.lock().await;
            match shared.state {
                WatcherState::Idle => {
                    shared.state = WatcherState::Stopped;
                    return;
                }
                WatcherState::Opening | WatcherState::Streaming => {
                    shared.state = WatcherState::Stopping;
                }
                WatcherState::Stopping | WatcherState::Stopped => {}
            }
        }
        self.stop_signal.notify_one();

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Watcher task panicked");
                self.shared.lock().await.state = WatcherState::Stopped;
            }
        }
    }

    async fn open(&self) -> Result<WatcherHandle> {
        let session = Session::upgrade(&self.session).ok_or_else(|| Error::transport("session closed"))?;
        let result: Value = session.call(Operation::WatchAll, json!({})).await?;
        let id = delta::decode_watcher_id(session.generation(), &result)?;
        Ok(WatcherHandle::new(id, &session))
    }
}

impl Drop for WatcherLoop {
    fn drop(&mut self) {
        self.stop_signal.notify_one();
    }
}

async fn run(
    handle: WatcherHandle,
    shared: Arc<Mutex<Shared>>,
    events: mpsc::UnboundedSender<WatchEvent>,
    stop: Arc<Notify>,
    mut retry: Box<dyn RetryStrategy>,
    metrics: Option<Arc<ClientMetrics>>,
) {
    let mut attempt = 0;

    let outcome = loop {
        let next = tokio::select! {
            biased;
            _ = stop.notified() => break None,
            next = handle.next() => next,
        };

        match next {
            Ok(batch) => {
                if attempt > 0 {
                    attempt = 0;
                    retry.reset();
                }
                if batch.is_empty() {
                    continue;
                }

                let guard = shared.lock().await;
                if guard.state != WatcherState::Streaming {
                    tracing::debug!(records = batch.len(), "Discarding batch after stop");
                    break None;
                }
                let records = batch.len();
                if events.send(WatchEvent::Batch(batch)).is_err() {
                    tracing::debug!("Watch consumer dropped");
                    break None;
                }
                tracing::trace!(records, "Delivered delta batch");
                if let Some(ref m) = metrics {
                    m.record_batch(records);
                }
            }
            Err(error) if error.is_watcher_stopped() => {
                tracing::info!(watcher_id = %handle.id(), "Watcher stopped by server");
                break Some(WatchEvent::End);
            }
            Err(error) if error.is_retriable() => match retry.next_delay(attempt) {
                Some(delay) => {
                    attempt += 1;
                    tracing::warn!(error = %error, attempt, delay_ms = delay.as_millis() as u64, "Retrying watcher");
                    if let Some(ref m) = metrics {
                        m.record_retry();
                    }
                    tokio::select! {
                        biased;
                        _ = stop.notified() => break None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => break Some(WatchEvent::Failed(error)),
            },
            Err(error) => break Some(WatchEvent::Failed(error)),
        }
    };

    let release = match &outcome {
        None => true,
        Some(WatchEvent::Failed(error)) => error.kind() != ErrorKind::Transport,
        Some(_) => false,
    };

    let mut shared = shared.lock().await;
    if let Some(event) = outcome {
        if shared.state == WatcherState::Streaming {
            if let WatchEvent::Failed(ref error) = event {
                tracing::warn!(error = %error, "Watcher failed");
            }
            let _ = events.send(event);
        }
    }
    shared.state = WatcherState::Stopped;
    shared.handle = None;
    drop(shared);

    if release {
        handle.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Transport, TransportEvent};
    use async_trait::async_trait;
    use modelwire_core::{ProtocolGeneration, TransportFault};

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _frame: String) -> std::result::Result<(), TransportFault> {
            Ok(())
        }

        async fn close(&self) {}
    }

    fn session() -> (Session, mpsc::UnboundedSender<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(Arc::new(NullTransport), rx, ProtocolGeneration::V2), tx)
    }

    #[tokio::test]
    async fn test_stop_from_idle() {
        let (session, _tx) = session();
        let (watcher, _events) = WatcherLoop::new(&session);
        assert_eq!(watcher.state().await, WatcherState::Idle);

        watcher.stop().await;
        assert_eq!(watcher.state().await, WatcherState::Stopped);

        let error = watcher.start().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_start_requires_authentication() {
        let (session, _tx) = session();
        let (watcher, mut events) = WatcherLoop::new(&session);

        let error = watcher.start().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Permanent);
        assert_eq!(watcher.state().await, WatcherState::Stopped);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_handle_is_transport_error() {
        let (session, _tx) = session();
        let handle = WatcherHandle::new("7".into(), &session);

        // Live but unauthenticated
        assert_eq!(handle.next().await.unwrap_err().kind(), ErrorKind::Transport);

        drop(session);
        assert_eq!(handle.next().await.unwrap_err().kind(), ErrorKind::Transport);
        assert_eq!(handle.stop().await.unwrap_err().kind(), ErrorKind::Transport);
    }
}

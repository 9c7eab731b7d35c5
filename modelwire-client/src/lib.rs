//! Controller RPC client over WebSocket
//!
//! This crate multiplexes many concurrent requests over one controller
//! connection, gates them behind login, classifies every failure, and turns
//! the delta watcher's long-poll into a stream of change batches.
//!
//! # Core Features
//!
//! - **Correlation**: responses matched to requests by id, in any order
//! - **Session**: login state machine and per-generation facade dispatch
//! - **Classified errors**: transport, auth failure, retriable or permanent
//! - **Watcher loop**: ordered delta batches with cooperative stop
//! - **Retry strategies**: backoff for transient watcher failures
//! - **Observability**: OpenTelemetry integration for traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modelwire_client::SessionBuilder;
//! use modelwire_core::{Credentials, Operation};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionBuilder::new("10.0.0.5:17070").connect().await?;
//!     let info = session.login(Credentials::new("admin", "secret")).await?;
//!     println!("Model: {:?}", info.model_uuid);
//!
//!     let app: Value = session
//!         .call(Operation::ApplicationGet, json!({"application": "mysql"}))
//!         .await?;
//!     println!("Application: {}", app);
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # With a Custom Transport
//!
//! Anything implementing [`Transport`] can carry a session, which is how the
//! tests drive it without a network:
//!
//! ```rust,no_run
//! use modelwire_client::{Session, WsTransport};
//! use modelwire_core::ProtocolGeneration;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (transport, inbound) = WsTransport::connect("ws://127.0.0.1:17070/").await?;
//! let session = Session::new(Arc::new(transport), inbound, ProtocolGeneration::V1);
//! # Ok(())
//! # }
//! ```

mod correlator;
mod metrics;
mod retry;
mod session;
mod session_builder;
mod session_state;
mod transport;
mod watcher;

pub use correlator::Correlator;
pub use metrics::ClientMetrics;
pub use retry::{ExponentialBackoff, FixedDelay, NoRetry, RetryStrategy};
pub use session::Session;
pub use session_builder::{SessionBuilder, DEFAULT_PORT};
pub use session_state::SessionState;
pub use transport::{Inbound, Transport, TransportEvent, WsTransport};
pub use watcher::{WatchEvent, WatchEvents, WatcherConfig, WatcherHandle, WatcherLoop, WatcherState};

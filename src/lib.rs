//! modelwire - controller RPC client
//!
//! This is the convenience crate that re-exports the modelwire sub-crates.
//! Use it if you want a single dependency for the whole client.
//!
//! # Architecture
//!
//! modelwire is organized into two crates:
//!
//! - **modelwire-core**: wire types, codec, error taxonomy and classifier,
//!   protocol generations, delta decoding, observability
//! - **modelwire-client**: transport, correlator, session, watcher loop,
//!   retry strategies, session builder, metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modelwire::client::{SessionBuilder, WatchEvent};
//! use modelwire::core::Credentials;
//! use modelwire::WatcherLoop;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionBuilder::new("10.0.0.5").connect().await?;
//!     session.login(Credentials::new("admin", "secret")).await?;
//!
//!     let (watcher, mut events) = WatcherLoop::new(&session);
//!     watcher.start().await?;
//!
//!     if let Some(WatchEvent::Batch(records)) = events.recv().await {
//!         for record in records {
//!             println!("{:?} {:?}", record.verb, record.kind);
//!         }
//!     }
//!
//!     watcher.stop().await;
//!     session.close().await;
//!     Ok(())
//! }
//! ```

// Re-export the sub-crates so everything is reachable through `modelwire::`
pub use modelwire_client as client;
pub use modelwire_core as core;

// Convenience re-exports of the most commonly used types
pub use modelwire_client::{Session, WatcherLoop};

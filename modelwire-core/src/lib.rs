//! Core protocol types for modelwire
//!
//! This crate holds everything about the controller RPC protocol that does
//! not need a connection:
//!
//! - **Types and codec**: request and response frames and their JSON encoding
//! - **Protocol**: the two protocol generations and their facade tables
//! - **Errors**: raw failures, the classified error taxonomy and the classifier
//! - **Login and deltas**: login parameters and metadata, watcher delta decoding
//! - **Observability**: OpenTelemetry and `tracing` initialisation
//!
//! The `modelwire-client` crate builds sessions and watchers on top of it.
//!
//! # Example
//!
//! ```rust
//! use modelwire_core::{codec, FacadeTable, Operation, ProtocolGeneration, RequestFrame};
//! use serde_json::json;
//!
//! let table = FacadeTable::for_generation(ProtocolGeneration::V2);
//! let descriptor = table.lookup(Operation::ApplicationGet).unwrap();
//! let frame = RequestFrame::new(1, &descriptor, None, json!({"application": "mysql"}));
//!
//! let text = codec::encode_request(&frame).unwrap();
//! assert!(text.contains("\"Type\":\"Application\""));
//! ```

pub mod classify;
pub mod codec;
pub mod delta;
pub mod error;
pub mod login;
pub mod observability;
pub mod protocol;
pub mod types;

pub use classify::classify;
pub use delta::{ChangeVerb, DeltaRecord, EntityKind};
pub use error::{Error, ErrorKind, ErrorPayload, Failure, Result, RetryHint, TransportFault};
pub use login::{Credentials, LoginInfo};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use protocol::{FacadeTable, Operation, ProtocolGeneration};
pub use types::{MethodDescriptor, RequestFrame, RequestId, ResponseBody, ResponseFrame};

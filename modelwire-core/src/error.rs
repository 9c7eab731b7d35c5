//! Error types for modelwire
//!
//! Failures travel through two layers:
//!
//! - **Raw failures** ([`Failure`]): what actually went wrong, either an
//!   [`ErrorPayload`] sent back by the server or a [`TransportFault`] raised
//!   locally by the connection.
//! - **Classified errors** ([`Error`]): the raw failure mapped onto a closed
//!   taxonomy of four [`ErrorKind`]s by [`crate::classify`].
//!
//! Only classified errors are returned from a session. Callers branch on
//! [`Error::kind`] to decide whether a retry makes sense:
//!
//! | kind          | meaning                                             |
//! |---------------|-----------------------------------------------------|
//! | `Transport`   | the connection is gone, replace the session         |
//! | `AuthFailure` | credentials were rejected or have been invalidated  |
//! | `Retriable`   | transient server condition, retry with backoff      |
//! | `Permanent`   | bad request for the current server state            |
//!
//! # Examples
//!
//! ```rust
//! use modelwire_core::{classify, ErrorKind, ErrorPayload, Failure};
//!
//! let payload = ErrorPayload::new("application \"x\" not found", "not found");
//! let error = classify(&Failure::Remote(payload));
//! assert_eq!(error.kind(), ErrorKind::Permanent);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for modelwire operations
pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of failure categories a caller can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection failed: disconnect, write error or undecodable frame
    Transport,
    /// The server refused the credentials or the caller's authority
    AuthFailure,
    /// A transient server condition; resubmission may succeed later
    Retriable,
    /// Resubmitting the identical request is guaranteed to fail again
    Permanent,
}

impl ErrorKind {
    /// Stable lowercase label, used for logs and metric attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::AuthFailure => "auth_failure",
            ErrorKind::Retriable => "retriable",
            ErrorKind::Permanent => "permanent",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a retriable failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryHint {
    /// Resend the same request after a delay
    Backoff,
    /// The server dropped the watcher; a new one must be opened
    ReopenWatcher,
}

/// A classified failure
///
/// Carries the taxonomy kind together with the original human-oriented
/// message and the machine-oriented code (empty when the server sent none).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message} (code: '{code}')")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    code: String,
    retry_hint: Option<RetryHint>,
}

impl Error {
    /// Create an error of the given kind without a code
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: String::new(),
            retry_hint: match kind {
                ErrorKind::Retriable => Some(RetryHint::Backoff),
                _ => None,
            },
        }
    }

    /// Transport-kind error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Permanent-kind error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    /// Error raised when a response does not have the expected shape
    pub fn malformed(what: impl fmt::Display) -> Self {
        Self::permanent(format!("malformed response: {}", what))
    }

    /// Attach the server's error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Override the retry hint
    pub fn with_retry_hint(mut self, hint: Option<RetryHint>) -> Self {
        self.retry_hint = hint;
        self
    }

    /// Re-tag the error with a different kind, keeping message and code
    pub fn into_kind(mut self, kind: ErrorKind) -> Self {
        if kind != ErrorKind::Retriable {
            self.retry_hint = None;
        }
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn retry_hint(&self) -> Option<RetryHint> {
        self.retry_hint
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    pub fn is_auth_failure(&self) -> bool {
        self.kind == ErrorKind::AuthFailure
    }

    pub fn is_retriable(&self) -> bool {
        self.kind == ErrorKind::Retriable
    }

    /// Whether the server reported that the watcher was stopped
    pub fn is_watcher_stopped(&self) -> bool {
        self.retry_hint == Some(RetryHint::ReopenWatcher)
    }
}

/// Error payload as carried on the wire
///
/// Responses report failures with an `Error` message and an optional
/// `ErrorCode`. The code is only sent for errors that define one, so a
/// missing code is represented by the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-oriented error message
    pub message: String,
    /// Machine-oriented error code, empty if absent
    #[serde(default)]
    pub code: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: '{}')", self.message, self.code)
    }
}

impl std::error::Error for ErrorPayload {}

/// Failures raised by the connection itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFault {
    /// The connection dropped while the request was awaiting its response
    #[error("connection closed while request outstanding")]
    ClosedWhilePending,

    /// The connection is already closed; nothing can be sent
    #[error("connection closed: {0}")]
    Closed(String),

    /// Establishing the connection failed
    #[error("connect failed: {0}")]
    Connect(String),

    /// Writing a frame failed
    #[error("send failed: {0}")]
    Send(String),

    /// A request could not be encoded into a frame
    #[error("encode failed: {0}")]
    Encode(String),

    /// An inbound frame could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),
}

/// A failure before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The server answered with an error payload
    Remote(ErrorPayload),
    /// The connection failed
    Transport(TransportFault),
}

impl From<ErrorPayload> for Failure {
    fn from(payload: ErrorPayload) -> Self {
        Failure::Remote(payload)
    }
}

impl From<TransportFault> for Failure {
    fn from(fault: TransportFault) -> Self {
        Failure::Transport(fault)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Remote(payload) => write!(f, "{}", payload),
            Failure::Transport(fault) => write!(f, "{}", fault),
        }
    }
}

//! Raw failure classification
//!
//! [`classify`] is the single place where server error payloads and transport
//! faults are translated into the [`ErrorKind`] taxonomy. It is a pure
//! function: the same input always produces the same classified error.
//!
//! The vocabulary below follows the error codes of the controller API server
//! (`apiserver/params/apierror.go`). The watcher-stopped condition has no
//! dedicated code, so it is recognised by its message as well.

use crate::error::{Error, ErrorKind, ErrorPayload, Failure, RetryHint};

/// Error codes that denote an authentication or authorization problem
pub const AUTH_CODES: &[&str] = &[
    "unauthorized access",
    "unauthorized",
    "no credentials provided",
    "login expired",
    "forbidden",
];

/// Message fragments that denote rejected credentials
pub const AUTH_MESSAGES: &[&str] = &[
    "invalid entity name or password",
    "invalid entity credentials",
    "invalid password",
];

/// Error codes for transient server-side conditions
pub const RETRIABLE_CODES: &[&str] = &["upgrade in progress", "try again", "excessive contention"];

/// Message (and code) reported when the server tears down a watcher
pub const WATCHER_STOPPED: &str = "watcher was stopped";

/// Map a raw failure onto the error taxonomy
pub fn classify(failure: &Failure) -> Error {
    match failure {
        Failure::Transport(fault) => Error::transport(fault.to_string()),
        Failure::Remote(payload) => classify_payload(payload),
    }
}

fn classify_payload(payload: &ErrorPayload) -> Error {
    let (kind, hint) = if is_auth(payload) {
        (ErrorKind::AuthFailure, None)
    } else if payload.message == WATCHER_STOPPED || payload.code == WATCHER_STOPPED {
        (ErrorKind::Retriable, Some(RetryHint::ReopenWatcher))
    } else if RETRIABLE_CODES.contains(&payload.code.as_str()) {
        (ErrorKind::Retriable, Some(RetryHint::Backoff))
    } else {
        (ErrorKind::Permanent, None)
    };

    Error::new(kind, payload.message.clone())
        .with_code(payload.code.clone())
        .with_retry_hint(hint)
}

fn is_auth(payload: &ErrorPayload) -> bool {
    AUTH_CODES.contains(&payload.code.as_str())
        || AUTH_MESSAGES
            .iter()
            .any(|fragment| payload.message.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportFault;

    fn remote(message: &str, code: &str) -> Failure {
        Failure::Remote(ErrorPayload::new(message, code))
    }

    #[test]
    fn test_unauthorized_is_auth_failure() {
        let failure = remote("invalid entity credentials", "unauthorized");
        for _ in 0..3 {
            let error = classify(&failure);
            assert_eq!(error.kind(), ErrorKind::AuthFailure);
            assert_eq!(error.code(), "unauthorized");
            assert_eq!(error.retry_hint(), None);
        }
    }

    #[test]
    fn test_not_found_is_permanent() {
        let failure = remote("application \"x\" not found", "not found");
        for _ in 0..3 {
            let error = classify(&failure);
            assert_eq!(error.kind(), ErrorKind::Permanent);
            assert_eq!(error.message(), "application \"x\" not found");
        }
    }

    #[test]
    fn test_write_failure_is_transport() {
        let failure = Failure::Transport(TransportFault::Send("broken pipe".into()));
        for _ in 0..3 {
            assert_eq!(classify(&failure).kind(), ErrorKind::Transport);
        }
    }

    #[test]
    fn test_every_transport_fault_is_transport() {
        let faults = vec![
            TransportFault::ClosedWhilePending,
            TransportFault::Closed("eof".into()),
            TransportFault::Connect("refused".into()),
            TransportFault::Send("reset".into()),
            TransportFault::Encode("nan".into()),
            TransportFault::Decode("not json".into()),
        ];
        for fault in faults {
            assert!(classify(&Failure::Transport(fault)).is_transport());
        }
    }

    #[test]
    fn test_auth_by_message_without_code() {
        let error = classify(&remote("invalid entity name or password", ""));
        assert!(error.is_auth_failure());
    }

    #[test]
    fn test_known_auth_codes() {
        for code in AUTH_CODES {
            assert!(classify(&remote("denied", code)).is_auth_failure(), "{}", code);
        }
    }

    #[test]
    fn test_retriable_codes_hint_backoff() {
        for code in RETRIABLE_CODES {
            let error = classify(&remote("busy", code));
            assert!(error.is_retriable(), "{}", code);
            assert_eq!(error.retry_hint(), Some(RetryHint::Backoff));
        }
    }

    #[test]
    fn test_watcher_stopped_hints_reopen() {
        let error = classify(&remote("watcher was stopped", ""));
        assert_eq!(error.kind(), ErrorKind::Retriable);
        assert!(error.is_watcher_stopped());
    }

    #[test]
    fn test_unknown_code_is_permanent() {
        let error = classify(&remote("already exists", "already exists"));
        assert_eq!(error.kind(), ErrorKind::Permanent);
    }
}

//! Session authentication state
//!
//! # States
//!
//! - **Unauthenticated**: connected, only login may be sent
//! - **Authenticating**: a login request is in flight
//! - **Authenticated**: any operation may be sent
//! - **Closed**: the connection is gone; terminal
//!
//! # Transitions
//!
//! ```text
//! Unauthenticated → Authenticating → Authenticated
//!        ↑                ↓
//!        └── (rejected) ──┘
//!
//! any state → Closed
//! ```
//!
//! A rejected login leaves the connection usable for another attempt.
//! Nothing ever leaves Closed.

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Closed,
}

impl SessionState {
    /// Numeric value reported on the session state gauge
    pub fn gauge_value(&self) -> u64 {
        match self {
            SessionState::Closed => 0,
            SessionState::Unauthenticated => 1,
            SessionState::Authenticating => 2,
            SessionState::Authenticated => 3,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared state cell enforcing the transition rules
#[derive(Clone)]
pub(crate) struct StateMachine {
    state: Arc<RwLock<SessionState>>,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::Unauthenticated)),
        }
    }

    pub(crate) async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Unauthenticated → Authenticating; otherwise returns the blocking state
    pub(crate) async fn begin_login(&self) -> Result<(), SessionState> {
        let mut state = self.state.write().await;
        match *state {
            SessionState::Unauthenticated => {
                *state = SessionState::Authenticating;
                Ok(())
            }
            other => Err(other),
        }
    }

    /// Authenticating → Authenticated; false if the session closed meanwhile
    pub(crate) async fn login_succeeded(&self) -> bool {
        self.advance(SessionState::Authenticating, SessionState::Authenticated)
            .await
    }

    /// Authenticating → Unauthenticated
    pub(crate) async fn login_rejected(&self) -> bool {
        self.advance(SessionState::Authenticating, SessionState::Unauthenticated)
            .await
    }

    /// Any state → Closed; returns the previous state
    pub(crate) async fn close(&self) -> SessionState {
        std::mem::replace(&mut *self.state.write().await, SessionState::Closed)
    }

    async fn advance(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.state.write().await;
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }
}

//! Authenticated RPC session
//!
//! A [`Session`] owns one connection. It wraps the [`Correlator`] with the
//! authentication state machine and the facade table of the protocol
//! generation chosen at construction, and it is the only place where a
//! logical [`Operation`] becomes a concrete facade, method and version.
//!
//! # Session Lifecycle
//!
//! 1. **Construct**: from a live transport; the session starts unauthenticated
//! 2. **Login**: the only request allowed before authentication
//! 3. **Call**: any operation, results decoded into the caller's type
//! 4. **Close**: explicitly, or when the connection drops
//!
//! Once closed, a session stays closed. Every failure it returns has been
//! through the classifier, so callers only ever see the four error kinds.
//!
//! # Cloning
//!
//! `Session` is a cheap handle around an `Arc`; clones share the connection,
//! the state and the pending calls.

use crate::correlator::Correlator;
use crate::metrics::ClientMetrics;
use crate::session_state::{SessionState, StateMachine};
use crate::transport::{Inbound, Transport, TransportEvent};
use modelwire_core::{
    classify, Credentials, Error, ErrorKind, FacadeTable, Failure, LoginInfo, MethodDescriptor,
    Operation, ProtocolGeneration, Result,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::RwLock;

/// Connection to a controller
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    transport: Arc<dyn Transport>,
    correlator: Correlator,
    state: StateMachine,
    table: FacadeTable,
    credentials: RwLock<Option<Credentials>>,
    login_info: RwLock<Option<LoginInfo>>,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Session {
    /// Wrap a connected transport
    ///
    /// `inbound` must be the event stream of the same connection. A task is
    /// spawned to route its frames, so this needs a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, inbound: Inbound, generation: ProtocolGeneration) -> Self {
        Self::with_metrics(transport, inbound, generation, None)
    }

    pub(crate) fn with_metrics(
        transport: Arc<dyn Transport>,
        inbound: Inbound,
        generation: ProtocolGeneration,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let correlator = Correlator::new(transport.clone()).with_metrics(metrics.clone());
        let state = StateMachine::new();

        tokio::spawn(receive_loop(
            inbound,
            correlator.clone(),
            state.clone(),
            metrics.clone(),
        ));

        if let Some(ref m) = metrics {
            m.update_session_state(SessionState::Unauthenticated);
        }

        Self {
            inner: Arc::new(SessionInner {
                transport,
                correlator,
                state,
                table: FacadeTable::for_generation(generation),
                credentials: RwLock::new(None),
                login_info: RwLock::new(None),
                metrics,
            }),
        }
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.inner.table.generation()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.state.state().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state().await == SessionState::Authenticated
    }

    /// Metadata from the last successful login
    pub async fn login_info(&self) -> Option<LoginInfo> {
        self.inner.login_info.read().await.clone()
    }

    /// User of the last successful login
    pub async fn user(&self) -> Option<String> {
        self.inner
            .credentials
            .read()
            .await
            .as_ref()
            .map(|c| c.user().to_string())
    }

    /// Number of requests awaiting a response
    pub async fn pending_calls(&self) -> usize {
        self.inner.correlator.pending_count().await
    }

    /// Authenticate the connection
    ///
    /// Allowed only while unauthenticated. A rejected login leaves the
    /// session unauthenticated and usable for another attempt; a connection
    /// failure during login closes the session.
    #[tracing::instrument(skip_all, fields(user = %credentials.user(), generation = %self.generation()))]
    pub async fn login(&self, credentials: Credentials) -> Result<LoginInfo> {
        let descriptor = self.descriptor(Operation::Login)?;
        let generation = self.generation();

        if let Err(state) = self.inner.state.begin_login().await {
            return Err(self.record_error(Error::permanent(format!("cannot log in while {}", state))));
        }
        self.record_state(SessionState::Authenticating);

        let login = PreparedCall {
            descriptor,
            target: None,
            params: credentials.login_params(generation),
            correlator: self.inner.correlator.clone(),
            metrics: self.inner.metrics.clone(),
        };
        let outcome = login.exchange().await;

        let result = match outcome {
            Ok(result) => result,
            Err(Failure::Transport(fault)) => {
                tracing::warn!(error = %fault, "Connection failed during login");
                self.close().await;
                return Err(self.record_error(classify(&Failure::Transport(fault))));
            }
            Err(failure) => {
                self.inner.state.login_rejected().await;
                self.record_state(SessionState::Unauthenticated);
                let error = classify(&failure);
                tracing::warn!(error = %error, "Login rejected");
                return Err(self.record_error(error.into_kind(ErrorKind::AuthFailure)));
            }
        };

        let info = match LoginInfo::parse(generation, &result) {
            Ok(info) => info,
            Err(error) => {
                self.inner.state.login_rejected().await;
                self.record_state(SessionState::Unauthenticated);
                return Err(self.record_error(error));
            }
        };

        if !self.inner.state.login_succeeded().await {
            return Err(self.record_error(Error::transport("session closed during login")));
        }
        self.record_state(SessionState::Authenticated);

        *self.inner.credentials.write().await = Some(credentials);
        *self.inner.login_info.write().await = Some(info.clone());

        tracing::info!(
            model_uuid = ?info.model_uuid,
            endpoints = info.endpoints.len(),
            "Logged in"
        );
        Ok(info)
    }

    /// Invoke `operation` and decode its result
    pub async fn call<P, R>(&self, operation: Operation, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.call_gated(operation, None, params, ErrorKind::Permanent)
            .await
    }

    /// Invoke `operation` on a specific entity, such as a watcher
    pub async fn call_on<P, R>(&self, operation: Operation, target: impl Into<String>, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.call_gated(operation, Some(target.into()), params, ErrorKind::Permanent)
            .await
    }

    /// Shared call path; `gate` is the error kind used before authentication
    #[tracing::instrument(skip_all, fields(operation = %operation))]
    pub(crate) async fn call_gated<P, R>(
        &self,
        operation: Operation,
        target: Option<String>,
        params: P,
        gate: ErrorKind,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)
            .map_err(|e| self.record_error(Error::permanent(format!("invalid parameters: {}", e))))?;
        let result = self.prepare(operation, target, params, gate).await?.send().await?;

        serde_json::from_value(result).map_err(|e| self.record_error(Error::malformed(e)))
    }

    /// Check the gate and resolve the facade without sending anything
    ///
    /// The returned call holds the correlator but not the session, so a
    /// long-poll in flight does not keep a dropped session alive.
    pub(crate) async fn prepare(
        &self,
        operation: Operation,
        target: Option<String>,
        params: Value,
        gate: ErrorKind,
    ) -> Result<PreparedCall> {
        let state = self.state().await;
        if state != SessionState::Authenticated {
            tracing::debug!(state = %state, "Rejecting call on unauthenticated session");
            return Err(self.record_error(Error::new(gate, "not authenticated")));
        }

        Ok(PreparedCall {
            descriptor: self.descriptor(operation)?,
            target,
            params,
            correlator: self.inner.correlator.clone(),
            metrics: self.inner.metrics.clone(),
        })
    }

    /// Close the connection; later calls fail and pending calls are rejected
    pub async fn close(&self) {
        let previous = self.inner.state.close().await;
        if previous == SessionState::Closed {
            return;
        }
        self.record_state(SessionState::Closed);

        self.inner.transport.close().await;
        let orphaned = self.inner.correlator.sweep().await;
        tracing::info!(previous = %previous, orphaned, "Session closed");
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(inner: &Weak<SessionInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn metrics(&self) -> Option<Arc<ClientMetrics>> {
        self.inner.metrics.clone()
    }

    fn descriptor(&self, operation: Operation) -> Result<MethodDescriptor> {
        self.inner.table.lookup(operation).ok_or_else(|| {
            self.record_error(Error::permanent(format!(
                "{} is not supported by protocol {}",
                operation,
                self.generation()
            )))
        })
    }

    fn record_state(&self, state: SessionState) {
        if let Some(ref m) = self.inner.metrics {
            m.update_session_state(state);
        }
    }

    fn record_error(&self, error: Error) -> Error {
        if let Some(ref m) = self.inner.metrics {
            m.record_error(error.kind());
        }
        error
    }
}

/// A request that passed the session's checks and is ready to send
pub(crate) struct PreparedCall {
    descriptor: MethodDescriptor,
    target: Option<String>,
    params: Value,
    correlator: Correlator,
    metrics: Option<Arc<ClientMetrics>>,
}

impl PreparedCall {
    /// Send and classify any failure
    pub(crate) async fn send(self) -> Result<Value> {
        let metrics = self.metrics.clone();
        self.exchange().await.map_err(|failure| {
            let error = classify(&failure);
            if let Some(ref m) = metrics {
                m.record_error(error.kind());
            }
            error
        })
    }

    async fn exchange(self) -> std::result::Result<Value, Failure> {
        let start = Instant::now();
        let outcome = self
            .correlator
            .call(&self.descriptor, self.target, self.params)
            .await;

        if let Some(ref m) = self.metrics {
            let label = match &outcome {
                Ok(_) => "success",
                Err(Failure::Remote(_)) => "error",
                Err(Failure::Transport(_)) => "transport",
            };
            m.record_request(&self.descriptor, label, start.elapsed().as_secs_f64());
        }
        outcome
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        // Last handle gone: release the connection if a runtime is still around
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let transport = self.transport.clone();
            handle.spawn(async move { transport.close().await });
        }
    }
}

async fn receive_loop(
    mut inbound: Inbound,
    correlator: Correlator,
    state: StateMachine,
    metrics: Option<Arc<ClientMetrics>>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Frame(text) => correlator.dispatch(&text).await,
            TransportEvent::Closed(reason) => {
                tracing::info!(reason = %reason, "Connection closed");
                break;
            }
        }
    }

    state.close().await;
    if let Some(ref m) = metrics {
        m.update_session_state(SessionState::Closed);
    }

    let orphaned = correlator.sweep().await;
    if orphaned > 0 {
        tracing::warn!(orphaned, "Rejected requests outstanding at disconnect");
    }
}

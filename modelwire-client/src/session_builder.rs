//! Session builder for dialing a controller
//!
//! The `SessionBuilder` turns a `host[:port]` address into a connected,
//! not yet authenticated [`Session`]. It allows you to:
//! - Pick the protocol generation
//! - Target a model endpoint (v2 only)
//! - Bound the connect time
//! - Configure observability (OpenTelemetry)
//!
//! # Examples
//!
//! ```rust,no_run
//! use modelwire_client::SessionBuilder;
//! use modelwire_core::{Credentials, ProtocolGeneration};
//! use std::time::Duration;
//!
//! # async fn example() -> modelwire_core::Result<()> {
//! let session = SessionBuilder::new("10.0.0.5")
//!     .generation(ProtocolGeneration::V2)
//!     .model("6f3ec1a1-4b4e-4b9a-8a8e-0c4d7a7a2f10")
//!     .connect_timeout(Duration::from_secs(5))
//!     .with_default_observability()
//!     .connect()
//!     .await?;
//!
//! session.login(Credentials::new("admin", "secret")).await?;
//! # Ok(())
//! # }
//! ```

use crate::metrics::ClientMetrics;
use crate::session::Session;
use crate::transport::WsTransport;
use modelwire_core::{classify, Error, Failure, ObservabilityConfig, ProtocolGeneration, Result};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 17070;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Builder for configuring and connecting a [`Session`]
pub struct SessionBuilder {
    address: String,
    generation: ProtocolGeneration,
    model_uuid: Option<String>,
    insecure: bool,
    connect_timeout: Duration,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl SessionBuilder {
    /// Start from a `host[:port]` address; the port defaults to 17070
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            generation: ProtocolGeneration::default(),
            model_uuid: None,
            insecure: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            observability_config: None,
            service_name: None,
        }
    }

    pub fn generation(mut self, generation: ProtocolGeneration) -> Self {
        self.generation = generation;
        self
    }

    /// Connect to a model's endpoint instead of the controller root
    ///
    /// Ignored for v1, which has a single endpoint.
    pub fn model(mut self, uuid: impl Into<String>) -> Self {
        self.model_uuid = Some(uuid.into());
        self
    }

    /// Use `ws://` instead of `wss://`
    ///
    /// `wss://` verifies the controller against the bundled webpki roots
    /// only, so a controller serving a certificate from its own CA fails the
    /// handshake with a Transport error. Until a caller-supplied root
    /// certificate can be configured, reach such controllers over `ws://`
    /// on a trusted network or through a TLS-terminating proxy.
    pub fn insecure(mut self) -> Self {
        self.insecure = true;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// The WebSocket URI this builder would dial
    pub fn uri(&self) -> Result<String> {
        let (host, port) = parse_address(&self.address)?;
        let scheme = if self.insecure { "ws" } else { "wss" };

        let path = match (&self.model_uuid, self.generation) {
            (Some(uuid), ProtocolGeneration::V2) => format!("model/{}/api", uuid),
            _ => String::new(),
        };
        Ok(format!("{}://{}:{}/{}", scheme, host, port, path))
    }

    /// Dial and wrap the connection in an unauthenticated session
    pub async fn connect(self) -> Result<Session> {
        let uri = self.uri()?;

        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            modelwire_core::init_observability(config.clone())
                .map_err(|e| Error::permanent(format!("failed to initialize observability: {}", e)))?;

            Some(Arc::new(ClientMetrics::new(config.service_name)))
        } else {
            None
        };

        tracing::info!(uri = %uri, generation = %self.generation, "Connecting to controller");
        let (transport, inbound) = tokio::time::timeout(self.connect_timeout, WsTransport::connect(&uri))
            .await
            .map_err(|_| {
                Error::transport(format!(
                    "connect to {} timed out after {:?}",
                    uri, self.connect_timeout
                ))
            })?
            .map_err(|fault| classify(&Failure::Transport(fault)))?;

        Ok(Session::with_metrics(
            Arc::new(transport),
            inbound,
            self.generation,
            metrics,
        ))
    }
}

/// Split `host[:port]`, applying the default port
fn parse_address(address: &str) -> Result<(&str, u16)> {
    let invalid = || Error::permanent(format!("invalid address {:?}", address));

    if address.is_empty() || address.contains('/') {
        return Err(invalid());
    }

    let mut parts = address.split(':');
    let host = parts.next().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
    let port = match parts.next() {
        None => DEFAULT_PORT,
        Some(port) => port.parse().map_err(|_| invalid())?,
    };
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok((host, port))
}

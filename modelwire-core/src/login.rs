//! Login request shapes and login metadata
//!
//! The two generations authenticate with different parameter names:
//!
//! - V2: `{"auth-tag": "user-admin", "credentials": "secret"}`
//! - V1: `{"AuthTag": "user-admin", "Password": "secret"}`
//!
//! A successful login answers with the model tag, the controller addresses
//! that can be used to reach the model, and (on newer servers) the facade
//! versions the server supports.

use crate::error::{Error, Result};
use crate::protocol::ProtocolGeneration;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

const USER_TAG_PREFIX: &str = "user-";
const LOCAL_MACHINE_SCOPE: &str = "local-machine";
const FAKE_PROVIDER_NETWORK: &str = "dummy-provider-network";

/// User credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Login parameters for `generation`
    pub fn login_params(&self, generation: ProtocolGeneration) -> Value {
        match generation {
            ProtocolGeneration::V2 => {
                let tag = if self.user.starts_with(USER_TAG_PREFIX) {
                    self.user.clone()
                } else {
                    format!("{}{}", USER_TAG_PREFIX, self.user)
                };
                json!({"auth-tag": tag, "credentials": self.password})
            }
            ProtocolGeneration::V1 => json!({"AuthTag": self.user, "Password": self.password}),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Metadata returned by a successful login
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoginInfo {
    /// Model (or environment) uuid, if the server reported one
    pub model_uuid: Option<String>,
    /// Reachable controller endpoints as `host:port`
    pub endpoints: Vec<String>,
    /// Facade name to supported versions
    pub facades: BTreeMap<String, Vec<u32>>,
}

impl LoginInfo {
    /// Parse a login result
    pub fn parse(generation: ProtocolGeneration, result: &Value) -> Result<Self> {
        if !result.is_object() {
            return Err(Error::malformed("login result is not an object"));
        }

        let model_uuid = result
            .get(generation.field("model-tag").as_ref())
            .and_then(Value::as_str)
            .map(|tag| {
                let prefix = match generation {
                    ProtocolGeneration::V1 => "environment-",
                    ProtocolGeneration::V2 => "model-",
                };
                tag.strip_prefix(prefix).unwrap_or(tag).to_string()
            });

        let mut endpoints = Vec::new();
        let servers = result.get(generation.field("servers").as_ref());
        for server in servers.and_then(Value::as_array).into_iter().flatten() {
            for address in server.as_array().into_iter().flatten() {
                if is_usable_endpoint(generation, address) {
                    endpoints.push(endpoint_string(generation, address)?);
                }
            }
        }

        let mut facades = BTreeMap::new();
        let listed = result.get(generation.field("facades").as_ref());
        for facade in listed.and_then(Value::as_array).into_iter().flatten() {
            let name = facade
                .get(generation.field("name").as_ref())
                .and_then(Value::as_str)
                .ok_or_else(|| Error::malformed(format!("facade without a name: {}", facade)))?;
            let versions = facade
                .get(generation.field("versions").as_ref())
                .and_then(Value::as_array)
                .map(|versions| {
                    versions
                        .iter()
                        .filter_map(Value::as_u64)
                        .map(|v| v as u32)
                        .collect()
                })
                .unwrap_or_default();
            facades.insert(name.to_string(), versions);
        }

        Ok(Self {
            model_uuid,
            endpoints,
            facades,
        })
    }

    /// Versions the server offers for `facade`
    pub fn facade_versions(&self, facade: &str) -> Option<&[u32]> {
        self.facades.get(facade).map(Vec::as_slice)
    }
}

// Servers have reported scope and type with either capitalisation.
fn either_case<'a>(address: &'a Value, lower: &str, upper: &str) -> Option<&'a str> {
    address
        .get(lower)
        .or_else(|| address.get(upper))
        .and_then(Value::as_str)
}

/// A non-local IPv4 address, or a hostname on the fake provider's network
fn is_usable_endpoint(generation: ProtocolGeneration, address: &Value) -> bool {
    let scope = either_case(address, "scope", "Scope");
    let kind = either_case(address, "type", "Type");
    if scope != Some(LOCAL_MACHINE_SCOPE) && kind == Some("ipv4") {
        return true;
    }
    let network = address
        .get(generation.field("space-name").as_ref())
        .and_then(Value::as_str);
    network == Some(FAKE_PROVIDER_NETWORK) && kind == Some("hostname")
}

fn endpoint_string(generation: ProtocolGeneration, address: &Value) -> Result<String> {
    let host = address.get(generation.field("value").as_ref()).and_then(Value::as_str);
    let port = address.get(generation.field("port").as_ref()).and_then(Value::as_u64);
    match (host, port) {
        (Some(host), Some(port)) => Ok(format!("{}:{}", host, port)),
        _ => Err(Error::malformed(format!("invalid server address {}", address))),
    }
}

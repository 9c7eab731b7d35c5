//! Wire types for the controller RPC protocol
//!
//! Every request is a single JSON object naming the facade, the facade
//! version, the method, an optional target entity and the parameters:
//!
//! ```json
//! {"RequestId": 7, "Type": "Application", "Version": 1, "Request": "Get",
//!  "Params": {"application": "mysql"}}
//! ```
//!
//! Responses echo the `RequestId` and carry either a `Response` object or an
//! `Error` message with an optional `ErrorCode`.
//!
//! # Request IDs
//!
//! Request IDs are unsigned integers allocated by the client from a counter
//! that increases for the lifetime of a connection. An id is never reused
//! while a request with that id is still awaiting its response.

use crate::error::ErrorPayload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier correlating a request with its response
pub type RequestId = u64;

/// Where a method lives on the server
///
/// The protocol generation decides which facade and method an operation maps
/// to, and whether a facade version is sent at all (the oldest generation
/// has none).
///
/// # Examples
///
/// ```rust
/// use modelwire_core::MethodDescriptor;
///
/// let descriptor = MethodDescriptor::versioned("Application", "Get", 1);
/// assert_eq!(descriptor.to_string(), "Application(1).Get");
///
/// let legacy = MethodDescriptor::new("Client", "ServiceGet");
/// assert_eq!(legacy.to_string(), "Client.ServiceGet");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Facade (the `Type` field on the wire)
    pub facade: &'static str,
    /// Method within the facade (the `Request` field)
    pub method: &'static str,
    /// Facade version, absent for unversioned generations
    pub version: Option<u32>,
}

impl MethodDescriptor {
    /// Descriptor without a facade version
    pub const fn new(facade: &'static str, method: &'static str) -> Self {
        Self {
            facade,
            method,
            version: None,
        }
    }

    /// Descriptor with a facade version
    pub const fn versioned(facade: &'static str, method: &'static str, version: u32) -> Self {
        Self {
            facade,
            method,
            version: Some(version),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => write!(f, "{}({}).{}", self.facade, version, self.method),
            None => write!(f, "{}.{}", self.facade, self.method),
        }
    }
}

/// An outbound request frame
///
/// Field order follows the order the server documents; optional fields are
/// omitted from the encoded frame rather than sent as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(rename = "RequestId")]
    pub request_id: RequestId,

    #[serde(rename = "Type")]
    pub facade: String,

    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    #[serde(rename = "Request")]
    pub method: String,

    /// Target entity id, used by per-entity facades such as the watcher
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(rename = "Params", default)]
    pub params: Value,
}

impl RequestFrame {
    /// Build a frame for `descriptor`
    ///
    /// Null parameters are normalised to an empty object; the server rejects
    /// requests whose `Params` is not an object.
    pub fn new(
        request_id: RequestId,
        descriptor: &MethodDescriptor,
        target: Option<String>,
        params: Value,
    ) -> Self {
        Self {
            request_id,
            facade: descriptor.facade.to_string(),
            version: descriptor.version,
            method: descriptor.method.to_string(),
            target,
            params: if params.is_null() {
                Value::Object(Default::default())
            } else {
                params
            },
        }
    }
}

/// Outcome carried by a response frame
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The call succeeded with this result
    Result(Value),
    /// The server reported an error
    Error(ErrorPayload),
}

/// An inbound response frame
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    /// The id of the request this answers
    pub request_id: RequestId,
    pub body: ResponseBody,
}

impl ResponseFrame {
    pub fn success(request_id: RequestId, result: Value) -> Self {
        Self {
            request_id,
            body: ResponseBody::Result(result),
        }
    }

    pub fn error(request_id: RequestId, payload: ErrorPayload) -> Self {
        Self {
            request_id,
            body: ResponseBody::Error(payload),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, ResponseBody::Error(_))
    }

    /// Split into the call's outcome
    pub fn into_result(self) -> std::result::Result<Value, ErrorPayload> {
        match self.body {
            ResponseBody::Result(value) => Ok(value),
            ResponseBody::Error(payload) => Err(payload),
        }
    }
}

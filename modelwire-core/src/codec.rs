//! Frame encoding and decoding
//!
//! Requests serialize directly from [`RequestFrame`]. Responses need a little
//! more care because the server is loose about their shape:
//!
//! - The result is normally nested under `Response`, but older servers put
//!   the result fields at the top level next to `RequestId`.
//! - `ErrorCode` is only present for errors that define one.
//! - Some servers send `"Error": ""` on success.
//!
//! Decoding failures are reported as [`TransportFault::Decode`]: a frame the
//! client cannot parse means the connection can no longer be trusted to
//! deliver well-formed messages.
//!
//! # Examples
//!
//! ```rust
//! use modelwire_core::{codec, ResponseBody};
//!
//! let frame = codec::decode_response(r#"{"RequestId": 4, "Response": {"ok": true}}"#).unwrap();
//! assert_eq!(frame.request_id, 4);
//! assert!(matches!(frame.body, ResponseBody::Result(_)));
//! ```

use crate::error::{ErrorPayload, TransportFault};
use crate::types::{RequestFrame, RequestId, ResponseBody, ResponseFrame};
use serde_json::{Map, Value};

const REQUEST_ID: &str = "RequestId";
const RESPONSE: &str = "Response";
const ERROR: &str = "Error";
const ERROR_CODE: &str = "ErrorCode";
const ERROR_INFO: &str = "ErrorInfo";

/// Encode a request frame to its JSON text
pub fn encode_request(frame: &RequestFrame) -> Result<String, TransportFault> {
    serde_json::to_string(frame).map_err(|e| TransportFault::Encode(e.to_string()))
}

/// Decode a request frame
///
/// Clients never receive requests; this is used by servers and test doubles
/// that need to inspect what a client sent.
pub fn decode_request(data: &str) -> Result<RequestFrame, TransportFault> {
    serde_json::from_str(data).map_err(|e| TransportFault::Decode(e.to_string()))
}

/// Encode a response frame to its JSON text
pub fn encode_response(frame: &ResponseFrame) -> Result<String, TransportFault> {
    let mut object = Map::new();
    object.insert(REQUEST_ID.to_string(), Value::from(frame.request_id));
    match &frame.body {
        ResponseBody::Result(result) => {
            object.insert(RESPONSE.to_string(), result.clone());
        }
        ResponseBody::Error(payload) => {
            object.insert(ERROR.to_string(), Value::String(payload.message.clone()));
            if !payload.code.is_empty() {
                object.insert(ERROR_CODE.to_string(), Value::String(payload.code.clone()));
            }
        }
    }
    serde_json::to_string(&Value::Object(object)).map_err(|e| TransportFault::Encode(e.to_string()))
}

/// Decode a response frame
pub fn decode_response(data: &str) -> Result<ResponseFrame, TransportFault> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| TransportFault::Decode(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(TransportFault::Decode("response is not an object".into()));
    };

    let request_id = object
        .remove(REQUEST_ID)
        .as_ref()
        .and_then(Value::as_u64)
        .ok_or_else(|| TransportFault::Decode("response without a numeric RequestId".into()))?;

    let message = match object.remove(ERROR) {
        None | Some(Value::Null) => None,
        Some(Value::String(message)) if message.is_empty() => None,
        Some(Value::String(message)) => Some(message),
        Some(other) => {
            return Err(TransportFault::Decode(format!(
                "unexpected Error field: {}",
                other
            )))
        }
    };
    let code = match object.remove(ERROR_CODE) {
        Some(Value::String(code)) => code,
        _ => String::new(),
    };
    object.remove(ERROR_INFO);

    let body = match message {
        Some(message) => ResponseBody::Error(ErrorPayload { message, code }),
        None => match object.remove(RESPONSE) {
            Some(result) => ResponseBody::Result(result),
            None => ResponseBody::Result(Value::Object(object)),
        },
    };

    Ok(ResponseFrame { request_id, body })
}

/// Recover the request id from a frame that failed to decode
///
/// Lets the correlator fail the matching request with the decode fault
/// instead of leaving it waiting for a response that will never be parsed.
pub fn peek_request_id(data: &str) -> Option<RequestId> {
    serde_json::from_str::<Value>(data)
        .ok()?
        .get(REQUEST_ID)?
        .as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MethodDescriptor;
    use serde_json::json;

    #[test]
    fn test_encode_request_shape() {
        let descriptor = MethodDescriptor::versioned("Client", "WatchAll", 1);
        let frame = RequestFrame::new(1, &descriptor, None, json!({}));
        let encoded = encode_request(&frame).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();

        assert_eq!(
            value,
            json!({"RequestId": 1, "Type": "Client", "Version": 1, "Request": "WatchAll", "Params": {}})
        );
        assert_eq!(decode_request(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_decode_nested_response() {
        let frame = decode_response(r#"{"RequestId": 2, "Response": {"watcher-id": "1"}}"#).unwrap();
        assert_eq!(frame.request_id, 2);
        assert_eq!(frame.body, ResponseBody::Result(json!({"watcher-id": "1"})));
    }

    #[test]
    fn test_decode_flat_response() {
        let frame = decode_response(r#"{"RequestId": 5, "AllWatcherId": "7"}"#).unwrap();
        assert_eq!(frame.body, ResponseBody::Result(json!({"AllWatcherId": "7"})));
    }

    #[test]
    fn test_decode_error_without_code() {
        let frame = decode_response(r#"{"RequestId": 3, "Error": "boom"}"#).unwrap();
        assert_eq!(frame.body, ResponseBody::Error(ErrorPayload::new("boom", "")));
    }

    #[test]
    fn test_decode_error_with_code() {
        let frame = decode_response(
            r#"{"RequestId": 3, "Error": "invalid entity credentials", "ErrorCode": "unauthorized", "Response": {}}"#,
        )
        .unwrap();
        assert_eq!(
            frame.body,
            ResponseBody::Error(ErrorPayload::new("invalid entity credentials", "unauthorized"))
        );
    }

    #[test]
    fn test_empty_error_is_success() {
        let frame = decode_response(r#"{"RequestId": 8, "Error": "", "Response": {"a": 1}}"#).unwrap();
        assert_eq!(frame.body, ResponseBody::Result(json!({"a": 1})));
    }

    #[test]
    fn test_decode_failures() {
        assert!(matches!(decode_response("not json"), Err(TransportFault::Decode(_))));
        assert!(matches!(decode_response("[1, 2]"), Err(TransportFault::Decode(_))));
        assert!(matches!(
            decode_response(r#"{"Response": {}}"#),
            Err(TransportFault::Decode(_))
        ));
        assert!(matches!(
            decode_response(r#"{"RequestId": 1, "Error": {"nested": true}}"#),
            Err(TransportFault::Decode(_))
        ));
    }

    #[test]
    fn test_peek_request_id() {
        assert_eq!(peek_request_id(r#"{"RequestId": 11, "Error": 5}"#), Some(11));
        assert_eq!(peek_request_id("garbage"), None);
    }

    #[test]
    fn test_encode_response_round_trips_error() {
        let frame = ResponseFrame::error(4, ErrorPayload::new("watcher was stopped", ""));
        let encoded = encode_response(&frame).unwrap();
        assert!(!encoded.contains("ErrorCode"));
        assert_eq!(decode_response(&encoded).unwrap(), frame);
    }
}

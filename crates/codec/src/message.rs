//! JSON-RPC 2.0 wire envelope.
//!
//! This module models the message shape consumed and produced by the
//! framing layer: a single `Message` struct that can represent a request,
//! a notification, a success response, or an error response, mirroring
//! the loose, "everything is optional" JSON-RPC envelope rather than a
//! closed sum type. The dispatcher upstream is responsible for deciding
//! which fields matter for a given inbound message.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// JSON-RPC request/notification id. Either a number or a string; the
/// framing layer assumed by this crate's callers mints these, we only
/// carry them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(i64),
    String(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            Id::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Number(value)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::String(value)
    }
}

/// Standard JSON-RPC 2.0 error codes, plus the user-defined code space
/// reserved for application `reply_err_code` values.
pub mod error_codes {
    pub const INVALID_PARAMS: i64 = -32602;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// An error object carried in a response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    pub fn method_not_found() -> Self {
        Self::new(error_codes::METHOD_NOT_FOUND, "invalid method name")
    }

    pub fn internal_error() -> Self {
        Self::new(error_codes::INTERNAL_ERROR, "internal server error")
    }
}

/// A JSON-RPC 2.0 envelope. At most one of `result`/`error` is populated;
/// `method` is populated for requests and notifications; `id` distinguishes
/// a request (`Some`) from a notification (`None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "Message::version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Message {
    fn version() -> String {
        "2.0".to_string()
    }

    pub fn request(id: Id, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Self::version(),
            method: Some(method.into()),
            params,
            id: Some(id),
            result: None,
            error: None,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Self::version(),
            method: Some(method.into()),
            params,
            id: None,
            result: None,
            error: None,
        }
    }

    pub fn response(id: Id, result: Value) -> Self {
        Self {
            jsonrpc: Self::version(),
            method: None,
            params: None,
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error_response(id: Option<Id>, error: RpcError) -> Self {
        Self {
            jsonrpc: Self::version(),
            method: None,
            params: None,
            id,
            result: None,
            error: Some(error),
        }
    }

    /// True if this message carries a method and an id: a request expecting
    /// a reply.
    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    /// True if this message carries a method but no id: fire-and-forget.
    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    /// True if this message is a response (success or error) to a
    /// previously sent request.
    pub fn is_response(&self) -> bool {
        self.method.is_none() && (self.result.is_some() || self.error.is_some())
    }

    /// The method name with any `simple:`/`arpc:` prefix still attached.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// The params object as a string-keyed map, the only shape the
    /// dispatcher accepts for typed `arpc:` methods.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_codec::message::Message;
    /// use serde_json::json;
    ///
    /// let msg = Message::notification("arpc:NewCall", Some(json!({"call_id": "x"})));
    /// assert_eq!(msg.params_map().unwrap().get("call_id").unwrap(), "x");
    /// ```
    pub fn params_map(&self) -> Option<&Map<String, Value>> {
        self.params.as_ref().and_then(Value::as_object)
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(Error::Json)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(Error::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_vs_notification_vs_response() {
        let req = Message::request(Id::Number(1), "arpc:CallGetList", None);
        assert!(req.is_request());
        assert!(!req.is_notification());

        let notif = Message::notification("arpc:NewCall", None);
        assert!(notif.is_notification());
        assert!(!notif.is_request());

        let resp = Message::response(Id::Number(1), Value::Null);
        assert!(resp.is_response());
    }

    #[test]
    fn round_trips_through_json() {
        let msg = Message::request(
            Id::String("abc".into()),
            "simple:ping",
            Some(serde_json::json!({"a": 1})),
        );

        let bytes = msg.encode().unwrap();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.method(), Some("simple:ping"));
        assert_eq!(decoded.id, Some(Id::String("abc".into())));
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON-RPC 2.0 standard error codes.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// The wire error object carried in a Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcError {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        RpcError {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Used locally when a response envelope carries neither result nor error.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self::new(METHOD_NOT_FOUND, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Failure surfaced to the local caller of `Peer::call` / `Peer::notify`.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Caller misuse: params must be structured. Raised before the request
    /// touches the pending table or the transport.
    #[error("params must be an array or object, got {0}")]
    InvalidParams(&'static str),

    /// The remote peer answered with a well-formed error object.
    #[error(transparent)]
    Remote(#[from] RpcError),

    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    /// The peer was dropped before the call settled.
    #[error("peer dropped before the call settled")]
    PeerDropped,
}

impl PeerError {
    /// The remote error object, if this failure came over the wire.
    pub fn as_remote(&self) -> Option<&RpcError> {
        match self {
            PeerError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_constructors_use_standard_codes() {
        assert_eq!(RpcError::parse_error("x").code, -32700);
        assert_eq!(RpcError::invalid_request("x").code, -32600);
        assert_eq!(RpcError::method_not_found("x").code, -32601);
        assert_eq!(RpcError::invalid_params("x").code, -32602);
        assert_eq!(RpcError::internal("x").code, -32603);
    }

    #[test]
    fn test_data_omitted_when_absent() {
        let err = RpcError::method_not_found("no such method");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("data"));

        let err = RpcError::with_data(INTERNAL_ERROR, "boom", json!({"detail": 1}));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"data\""));
    }

    #[test]
    fn test_round_trip() {
        let err = RpcError::with_data(INVALID_PARAMS, "bad args", json!([1, 2]));
        let json = serde_json::to_string(&err).unwrap();
        let back: RpcError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_peer_error_exposes_remote_fields() {
        let remote = RpcError::with_data(7, "custom", json!("extra"));
        let err = PeerError::from(remote.clone());
        let got = err.as_remote().unwrap();
        assert_eq!(got.code, 7);
        assert_eq!(got.message, "custom");
        assert_eq!(got.data, Some(json!("extra")));
    }
}

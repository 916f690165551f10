use serde_json::{json, Map, Value};

use crate::error::RpcError;
use crate::ids::RequestId;

/// The protocol version stamped on every envelope.
pub const VERSION: &str = "2.0";

/// One JSON-RPC 2.0 message.
///
/// Shape is determined by which members are present: a Request carries both
/// `id` and `method`, a Notification carries `method` only, a Response
/// carries `id` with `result` or `error`.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response {
        id: RequestId,
        outcome: Outcome,
    },
}

/// Result or error of a Response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Error(RpcError),
}

impl From<Result<Value, RpcError>> for Outcome {
    fn from(result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Error(error),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("envelope jsonrpc member is missing or not \"2.0\"")]
    BadVersion,

    #[error("envelope id must be a positive integer")]
    BadId,

    #[error("envelope method must be a string")]
    BadMethod,

    #[error("message has neither id nor method")]
    Unroutable,
}

impl Envelope {
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Envelope::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Envelope::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn response(id: RequestId, outcome: Outcome) -> Self {
        Envelope::Response { id, outcome }
    }

    /// The structured form serialized onto the wire.
    pub fn to_value(&self) -> Value {
        match self {
            Envelope::Request { id, method, params } => {
                let mut obj = json!({
                    "jsonrpc": VERSION,
                    "id": id.as_u64(),
                    "method": method,
                });
                if let Some(params) = params {
                    obj["params"] = params.clone();
                }
                obj
            }
            Envelope::Notification { method, params } => {
                let mut obj = json!({
                    "jsonrpc": VERSION,
                    "method": method,
                });
                if let Some(params) = params {
                    obj["params"] = params.clone();
                }
                obj
            }
            Envelope::Response { id, outcome } => match outcome {
                Outcome::Success(value) => json!({
                    "jsonrpc": VERSION,
                    "id": id.as_u64(),
                    "result": value,
                }),
                Outcome::Error(error) => json!({
                    "jsonrpc": VERSION,
                    "id": id.as_u64(),
                    "error": error,
                }),
            },
        }
    }

    /// Classify a decoded wire value into an envelope.
    ///
    /// A Response carrying neither `result` nor `error` classifies as an
    /// error outcome with a locally constructed ParseError, so the matching
    /// pending call rejects instead of hanging.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let obj = match value {
            Value::Object(obj) => obj,
            _ => return Err(EnvelopeError::NotAnObject),
        };

        match obj.get("jsonrpc").and_then(Value::as_str) {
            Some(VERSION) => {}
            _ => return Err(EnvelopeError::BadVersion),
        }

        let id = match obj.get("id") {
            None => None,
            Some(raw) => Some(
                raw.as_u64()
                    .filter(|&id| id > 0)
                    .ok_or(EnvelopeError::BadId)?,
            ),
        };
        let method = match obj.get("method") {
            None => None,
            Some(raw) => Some(
                raw.as_str()
                    .map(str::to_owned)
                    .ok_or(EnvelopeError::BadMethod)?,
            ),
        };

        match (id, method) {
            (Some(id), Some(method)) => Ok(Envelope::Request {
                id: RequestId::new(id),
                method,
                params: take_params(&obj),
            }),
            (None, Some(method)) => Ok(Envelope::Notification {
                method,
                params: take_params(&obj),
            }),
            (Some(id), None) => {
                let outcome = if let Some(result) = obj.get("result") {
                    Outcome::Success(result.clone())
                } else if let Some(error) = obj.get("error") {
                    let error = serde_json::from_value(error.clone()).unwrap_or_else(|_| {
                        RpcError::parse_error("response error object is malformed")
                    });
                    Outcome::Error(error)
                } else {
                    Outcome::Error(RpcError::parse_error(
                        "response carries neither result nor error",
                    ))
                };
                Ok(Envelope::Response {
                    id: RequestId::new(id),
                    outcome,
                })
            }
            (None, None) => Err(EnvelopeError::Unroutable),
        }
    }
}

fn take_params(obj: &Map<String, Value>) -> Option<Value> {
    obj.get("params").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_round_trips() {
        let env = Envelope::request(RequestId::new(7), "Methods.bounce", Some(json!([1, "x"])));
        let value = env.to_value();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "Methods.bounce");

        let back = Envelope::from_value(value).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_notification_has_no_id() {
        let env = Envelope::notification("Board.ClickPosition", Some(json!({"x": 1})));
        let value = env.to_value();
        assert!(value.get("id").is_none());

        let back = Envelope::from_value(value).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_params_member_omitted_when_absent() {
        let env = Envelope::request(RequestId::new(1), "ping", None);
        let value = env.to_value();
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_response_success_and_error_round_trip() {
        let ok = Envelope::response(RequestId::new(3), Outcome::Success(json!({"v": true})));
        assert_eq!(Envelope::from_value(ok.to_value()).unwrap(), ok);

        let err = Envelope::response(
            RequestId::new(4),
            Outcome::Error(RpcError::with_data(-32601, "nope", json!("extra"))),
        );
        assert_eq!(Envelope::from_value(err.to_value()).unwrap(), err);
    }

    #[test]
    fn test_response_without_result_or_error_becomes_local_parse_error() {
        let value = json!({"jsonrpc": "2.0", "id": 9});
        match Envelope::from_value(value).unwrap() {
            Envelope::Response {
                id,
                outcome: Outcome::Error(error),
            } => {
                assert_eq!(id, RequestId::new(9));
                assert_eq!(error.code, crate::error::PARSE_ERROR);
            }
            other => panic!("expected error response, got {:?}", other),
        }
    }

    #[test]
    fn test_result_wins_when_both_members_present() {
        let value = json!({
            "jsonrpc": "2.0",
            "id": 2,
            "result": 5,
            "error": {"code": -32603, "message": "ignored"},
        });
        match Envelope::from_value(value).unwrap() {
            Envelope::Response {
                outcome: Outcome::Success(v),
                ..
            } => assert_eq!(v, json!(5)),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_missing_or_wrong_version() {
        let err = Envelope::from_value(json!({"id": 1, "method": "m"})).unwrap_err();
        assert!(matches!(err, EnvelopeError::BadVersion));

        let err =
            Envelope::from_value(json!({"jsonrpc": "1.0", "id": 1, "method": "m"})).unwrap_err();
        assert!(matches!(err, EnvelopeError::BadVersion));
    }

    #[test]
    fn test_rejects_unroutable_and_non_object() {
        let err = Envelope::from_value(json!({"jsonrpc": "2.0"})).unwrap_err();
        assert!(matches!(err, EnvelopeError::Unroutable));

        let err = Envelope::from_value(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, EnvelopeError::NotAnObject));
    }

    #[test]
    fn test_rejects_non_integer_id() {
        let err =
            Envelope::from_value(json!({"jsonrpc": "2.0", "id": "abc", "method": "m"}))
                .unwrap_err();
        assert!(matches!(err, EnvelopeError::BadId));
    }

    #[test]
    fn test_rejects_zero_id() {
        let err = Envelope::from_value(json!({"jsonrpc": "2.0", "id": 0, "method": "m"}))
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::BadId));

        let err = Envelope::from_value(json!({"jsonrpc": "2.0", "id": 0, "result": 1}))
            .unwrap_err();
        assert!(matches!(err, EnvelopeError::BadId));
    }
}

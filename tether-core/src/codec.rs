use bytes::Bytes;
use serde_json::Value;
use std::fmt;

use crate::envelope::{Envelope, EnvelopeError};

/// Outbound encoding of the envelope. Receive always auto-detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    Json,
    #[default]
    MessagePack,
}

/// One unit of transport traffic.
///
/// `Value` is the pass-through form for transports that deliver already
/// parsed objects instead of raw text or bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Bytes),
    Value(Value),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => f.write_str(text),
            Payload::Binary(bytes) => write!(f, "({} msgpack bytes)", bytes.len()),
            Payload::Value(value) => write!(f, "{}", value),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// Encode an envelope with the requested encoding.
pub fn encode(envelope: &Envelope, encoding: Encoding) -> Result<Payload, CodecError> {
    let value = envelope.to_value();
    match encoding {
        Encoding::Json => Ok(Payload::Text(serde_json::to_string(&value)?)),
        Encoding::MessagePack => Ok(Payload::Binary(Bytes::from(rmp_serde::to_vec(&value)?))),
    }
}

/// Decode a payload of either encoding.
///
/// A string whose first non-whitespace byte is `{` is treated as JSON text;
/// binary payloads and any other string are treated as MessagePack.
pub fn decode(payload: Payload) -> Result<Envelope, CodecError> {
    let value = match payload {
        Payload::Text(text) => {
            if looks_like_json(&text) {
                serde_json::from_str(&text)?
            } else {
                rmp_serde::from_slice(text.as_bytes())?
            }
        }
        Payload::Binary(bytes) => rmp_serde::from_slice(&bytes)?,
        Payload::Value(value) => value,
    };
    Ok(Envelope::from_value(value)?)
}

fn looks_like_json(text: &str) -> bool {
    text.trim_start().starts_with('{')
}

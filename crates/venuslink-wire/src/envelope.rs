//! # Request/Response Envelopes
//!
//! The outermost JSON structure of every datagram. Requests carry a
//! correlation `id` chosen by the caller; replies echo it back, which is the
//! only mechanism for matching a reply to its request on a connectionless
//! socket.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding or decoding datagrams.
#[derive(Debug, Error)]
pub enum WireError {
    /// Datagram was not valid UTF-8 JSON of the expected shape.
    #[error("Malformed datagram: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Reply parsed but carries neither `result` nor `error`.
    #[error("Reply {id} has no result and no error object")]
    EmptyReply { id: u64 },
}

/// A single outgoing request datagram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Correlation id, echoed verbatim by the device in its reply.
    pub id: u64,
    /// Method name in `Component.Action` form, e.g. `"Bat.GetStatus"`.
    pub method: String,
    /// Method parameters. Omitted from the wire when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Serializes the request to the UTF-8 JSON bytes sent on the wire.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Device-reported error object inside an error reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A single incoming reply datagram.
///
/// Exactly one of `result` and `error` is present on a well-formed reply;
/// [`RpcResponse::decode`] rejects datagrams with neither.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Correlation id echoed from the request.
    pub id: u64,
    /// Device self-identification, e.g. `"Venus-C"`. Not all firmware
    /// versions send it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl RpcResponse {
    /// Parses a raw datagram into a reply envelope.
    ///
    /// Trailing NUL bytes and whitespace are stripped first; some firmware
    /// pads datagrams to a fixed buffer size.
    pub fn decode(raw: &[u8]) -> Result<Self, WireError> {
        let trimmed = trim_datagram(raw);
        let reply: Self = serde_json::from_slice(trimmed)?;
        if reply.result.is_none() && reply.error.is_none() {
            return Err(WireError::EmptyReply { id: reply.id });
        }
        Ok(reply)
    }

    /// Returns true if this reply carries a device-reported error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn trim_datagram(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|&b| b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &raw[..end]
}

//! Error types for the client core.
//!
//! Only [`VenusError::CommandTimeout`] is transient: the RPC layer retries
//! it internally and surfaces it after the attempt limit. Everything else is
//! returned on first occurrence.

use std::time::Duration;

use thiserror::Error;
use venuslink_wire::WireError;

/// Client errors.
#[derive(Debug, Error)]
pub enum VenusError {
    /// All attempts exhausted without a matching reply.
    #[error("Command {method} to {host} timed out after {attempts} attempts ({elapsed:?})")]
    CommandTimeout {
        method: String,
        host: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// Reply received but malformed, or carrying a device-reported error.
    /// Never retried: the device answered, so the request itself is wrong.
    #[error("Protocol error for {method}: {reason}")]
    Protocol { method: String, reason: String },

    /// A correlation id was registered twice on one transport. Invariant
    /// violation in id assignment, not a network condition.
    #[error("Duplicate correlation id {id} on local port {port}")]
    DuplicateCorrelationId { id: u64, port: u16 },

    /// The shared transport was torn down while this command was pending.
    #[error("Transport closed with command in flight")]
    TransportClosed,

    /// Method marked unsupported after repeated consecutive timeouts;
    /// calls and polls for it are refused until reset.
    #[error("Method {method} marked unsupported by this firmware")]
    UnsupportedMethod { method: String },

    /// The configured host name did not resolve to any address.
    #[error("Host {host} did not resolve to an address")]
    UnresolvedHost { host: String },

    /// Socket-level failure (bind, send).
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    /// Request could not be encoded.
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl VenusError {
    /// Reason string for a device-reported error reply.
    pub(crate) fn device_error(method: &str, code: i64, message: &str) -> Self {
        VenusError::Protocol {
            method: method.to_string(),
            reason: format!("device error {code}: {message}"),
        }
    }
}

/// Result type for client operations.
pub type VenusResult<T> = Result<T, VenusError>;

//! # VenusLink Wire Protocol
//!
//! Types for the Marstek Venus local API: JSON datagrams over UDP, one
//! request per datagram, one reply per request, matched by an integer
//! correlation id.
//!
//! ## Shape
//!
//! - Request: `{"id": 7, "method": "Bat.GetStatus", "params": {"id": 0}}`
//! - Reply:   `{"id": 7, "src": "Venus-C", "result": {"soc": 82, ...}}`
//! - Error:   `{"id": 7, "src": "Venus-C", "error": {"code": -1, "message": "..."}}`
//!
//! This crate is pure data: no sockets, no timers. The transport and
//! scheduling live in the `venuslink` crate.

pub mod descriptor;
pub mod envelope;
pub mod method;
pub mod mode;
pub mod status;

pub use descriptor::DeviceDescriptor;
pub use envelope::{ErrorObject, RpcRequest, RpcResponse, WireError};
pub use method::Method;
pub use mode::{ModeConfig, OperatingMode};
pub use status::{
    BatteryStatus, BleStatus, DeviceInfo, EmStatus, EsMode, EsStatus, PvStatus, WifiStatus,
};

/// Default UDP port the device listens on for the local API.
pub const DEFAULT_PORT: u16 = 30000;

/// Correlation ids wrap after this many requests per transport.
pub const CORRELATION_ID_SPACE: u64 = 1_000_000;

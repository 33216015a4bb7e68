//! # Discovery Descriptors
//!
//! A broadcast `Marstek.GetDevice` yields one reply per listening device.
//! Each well-formed reply becomes a [`DeviceDescriptor`]; replies without a
//! MAC identity are dropped, since without one the device can neither be
//! deduplicated nor stably addressed across DHCP leases.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::envelope::RpcResponse;
use crate::status::DeviceInfo;

/// One device found on the local network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Where the reply came from. The authoritative address for unicast.
    pub addr: SocketAddr,
    /// Stable identity: BLE MAC, or Wifi MAC when the firmware omits it.
    pub mac: String,
    /// Model name, e.g. `"VenusE"`.
    pub device: Option<String>,
    /// Firmware version as reported.
    pub ver: Option<serde_json::Value>,
}

impl DeviceDescriptor {
    /// Builds a descriptor from a discovery reply, or `None` when the reply
    /// carries no usable identity.
    #[must_use]
    pub fn from_reply(reply: &RpcResponse, source: SocketAddr) -> Option<Self> {
        let result = reply.result.as_ref()?;
        let info: DeviceInfo = serde_json::from_value(result.clone()).ok()?;
        let mac = info.mac()?.to_string();
        Some(Self {
            addr: source,
            mac,
            device: info.device,
            ver: info.ver,
        })
    }
}

//! # Method Catalog
//!
//! Every API method the Venus firmware family answers, with its canonical
//! parameter encoding. `Marstek.GetDevice` addresses the device as a whole
//! and takes a `ble_mac` filter; every other component is instanced and
//! takes `{"id": N}` (instance 0 on all known hardware).

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

/// A method of the local API, `Component.Action` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Device identity: model, firmware version, MACs, IP.
    MarstekGetDevice,
    /// Wifi station status (SSID, RSSI).
    WifiGetStatus,
    /// Bluetooth link state.
    BleGetStatus,
    /// Battery pack: state of charge, temperature, capacity, flags.
    BatGetStatus,
    /// Photovoltaic input: power, voltage, current.
    PvGetStatus,
    /// Energy system totals: powers and lifetime energy counters.
    EsGetStatus,
    /// Current operating mode (Auto / AI / Manual / Passive).
    EsGetMode,
    /// Change the operating mode. The only mutating method.
    EsSetMode,
    /// External energy meter (CT clamp) readings.
    EmGetStatus,
}

impl Method {
    /// All read-only status methods, in the order the scheduler polls them.
    pub const QUERIES: [Method; 8] = [
        Method::BatGetStatus,
        Method::EsGetStatus,
        Method::EsGetMode,
        Method::EmGetStatus,
        Method::PvGetStatus,
        Method::WifiGetStatus,
        Method::BleGetStatus,
        Method::MarstekGetDevice,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::MarstekGetDevice => "Marstek.GetDevice",
            Method::WifiGetStatus => "Wifi.GetStatus",
            Method::BleGetStatus => "BLE.GetStatus",
            Method::BatGetStatus => "Bat.GetStatus",
            Method::PvGetStatus => "PV.GetStatus",
            Method::EsGetStatus => "ES.GetStatus",
            Method::EsGetMode => "ES.GetMode",
            Method::EsSetMode => "ES.SetMode",
            Method::EmGetStatus => "EM.GetStatus",
        }
    }

    /// Canonical request parameters for a read of instance `instance_id`.
    ///
    /// Returns `None` for [`Method::EsSetMode`], whose parameters carry a
    /// mode configuration and are built by
    /// [`ModeConfig::into_params`](crate::mode::ModeConfig::into_params).
    #[must_use]
    pub fn query_params(&self, instance_id: u32) -> Option<Value> {
        match self {
            // The ble_mac filter "0" means "any device", used for both
            // unicast identity reads and broadcast discovery.
            Method::MarstekGetDevice => Some(json!({ "ble_mac": "0" })),
            Method::EsSetMode => None,
            _ => Some(json!({ "id": instance_id })),
        }
    }

    /// Snapshot category this method's results are cached under.
    #[must_use]
    pub fn category(&self) -> Option<&'static str> {
        match self {
            Method::MarstekGetDevice => Some("device"),
            Method::WifiGetStatus => Some("wifi"),
            Method::BleGetStatus => Some("ble"),
            Method::BatGetStatus => Some("battery"),
            Method::PvGetStatus => Some("pv"),
            Method::EsGetStatus => Some("es"),
            Method::EsGetMode => Some("es_mode"),
            Method::EmGetStatus => Some("em"),
            Method::EsSetMode => None,
        }
    }

    /// True for the one method that changes device state.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        matches!(self, Method::EsSetMode)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for parsing an unknown method string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown method: {}", self.0)
    }
}

impl std::error::Error for UnknownMethod {}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Marstek.GetDevice" => Ok(Method::MarstekGetDevice),
            "Wifi.GetStatus" => Ok(Method::WifiGetStatus),
            "BLE.GetStatus" => Ok(Method::BleGetStatus),
            "Bat.GetStatus" => Ok(Method::BatGetStatus),
            "PV.GetStatus" => Ok(Method::PvGetStatus),
            "ES.GetStatus" => Ok(Method::EsGetStatus),
            "ES.GetMode" => Ok(Method::EsGetMode),
            "ES.SetMode" => Ok(Method::EsSetMode),
            "EM.GetStatus" => Ok(Method::EmGetStatus),
            other => Err(UnknownMethod(other.to_string())),
        }
    }
}

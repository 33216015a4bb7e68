//! # Typed Status Payloads
//!
//! The `result` objects of the read-only methods, decoded leniently: every
//! field is optional because firmware revisions differ in what they send,
//! and unknown fields are ignored. Numeric flags that some firmware sends
//! as `0`/`1` and others as `false`/`true` decode through [`de_flag`].

use serde::{Deserialize, Deserializer, Serialize};

/// `Marstek.GetDevice` result: device identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    /// Model name, e.g. `"VenusE"`.
    pub device: Option<String>,
    /// Firmware version. Some firmware sends a number, some a string.
    pub ver: Option<serde_json::Value>,
    pub ble_mac: Option<String>,
    pub wifi_mac: Option<String>,
    /// Station IP as the device reports it. Discovery prefers the datagram
    /// source address over this field.
    pub ip: Option<String>,
}

impl DeviceInfo {
    /// Stable identity for deduplication: BLE MAC, falling back to Wifi MAC.
    #[must_use]
    pub fn mac(&self) -> Option<&str> {
        self.ble_mac.as_deref().or(self.wifi_mac.as_deref())
    }
}

/// `Bat.GetStatus` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryStatus {
    /// State of charge, percent.
    pub soc: Option<f64>,
    /// Pack temperature in tenths of a degree Celsius.
    pub bat_temp: Option<f64>,
    /// Remaining capacity, Wh.
    pub bat_capacity: Option<f64>,
    pub rated_capacity: Option<f64>,
    #[serde(deserialize_with = "de_flag")]
    pub charg_flag: Option<bool>,
    #[serde(deserialize_with = "de_flag")]
    pub dischrg_flag: Option<bool>,
}

impl BatteryStatus {
    /// Pack temperature with the decidegree scale applied.
    #[must_use]
    pub fn temperature_celsius(&self) -> Option<f64> {
        self.bat_temp.map(|t| t / 10.0)
    }
}

/// `PV.GetStatus` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvStatus {
    pub pv_power: Option<f64>,
    pub pv_voltage: Option<f64>,
    pub pv_current: Option<f64>,
}

/// `ES.GetStatus` result: system powers and lifetime energy counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsStatus {
    pub bat_soc: Option<f64>,
    pub bat_cap: Option<f64>,
    pub pv_power: Option<f64>,
    pub ongrid_power: Option<f64>,
    pub offgrid_power: Option<f64>,
    /// Watts. Negative while charging.
    pub bat_power: Option<f64>,
    pub total_pv_energy: Option<f64>,
    pub total_grid_output_energy: Option<f64>,
    pub total_grid_input_energy: Option<f64>,
    pub total_load_energy: Option<f64>,
}

/// `ES.GetMode` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EsMode {
    /// Mode name as sent by the firmware.
    pub mode: Option<String>,
}

impl EsMode {
    /// The mode parsed into the catalog type, `None` when missing or unknown.
    #[must_use]
    pub fn operating_mode(&self) -> Option<crate::mode::OperatingMode> {
        self.mode.as_deref().and_then(|m| m.parse().ok())
    }
}

/// `EM.GetStatus` result: CT clamp readings per phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmStatus {
    pub total_power: Option<f64>,
    pub a_power: Option<f64>,
    pub b_power: Option<f64>,
    pub c_power: Option<f64>,
    pub ct_state: Option<u8>,
}

impl EmStatus {
    #[must_use]
    pub fn ct_connected(&self) -> Option<bool> {
        self.ct_state.map(|s| s == 1)
    }
}

/// `Wifi.GetStatus` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiStatus {
    pub ssid: Option<String>,
    /// Signal strength, dBm.
    pub rssi: Option<i32>,
    pub sta_ip: Option<String>,
}

/// `BLE.GetStatus` result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleStatus {
    /// `"connect"` while a phone is linked.
    pub state: Option<String>,
}

impl BleStatus {
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state.as_deref() == Some("connect")
    }
}

/// Decodes a flag field that may arrive as a bool or as a 0/1 number.
fn de_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::Number(n)) => Some(n.as_f64().unwrap_or(0.0) != 0.0),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::OperatingMode;

    #[test]
    fn test_battery_status_decodes_real_reply() {
        let raw = r#"{"soc": 82, "bat_temp": 290, "bat_capacity": 4472,
                      "rated_capacity": 5120, "charg_flag": 1, "dischrg_flag": false}"#;
        let status: BatteryStatus = serde_json::from_str(raw).unwrap();

        assert_eq!(status.soc, Some(82.0));
        assert_eq!(status.temperature_celsius(), Some(29.0));
        assert_eq!(status.charg_flag, Some(true));
        assert_eq!(status.dischrg_flag, Some(false));
    }

    #[test]
    fn test_battery_status_tolerates_missing_fields() {
        let status: BatteryStatus = serde_json::from_str(r#"{"soc": 50}"#).unwrap();
        assert_eq!(status.soc, Some(50.0));
        assert_eq!(status.bat_temp, None);
        assert_eq!(status.temperature_celsius(), None);
    }

    #[test]
    fn test_es_status_unknown_fields_ignored() {
        let raw = r#"{"bat_soc": 82, "bat_power": -340, "fw_internal": 9}"#;
        let status: EsStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.bat_power, Some(-340.0));
    }

    #[test]
    fn test_es_mode_parses_known_modes() {
        let mode: EsMode = serde_json::from_str(r#"{"mode": "AI"}"#).unwrap();
        assert_eq!(mode.operating_mode(), Some(OperatingMode::Ai));

        let odd: EsMode = serde_json::from_str(r#"{"mode": "Turbo"}"#).unwrap();
        assert_eq!(odd.operating_mode(), None);
    }

    #[test]
    fn test_ble_connected() {
        let ble: BleStatus = serde_json::from_str(r#"{"state": "connect"}"#).unwrap();
        assert!(ble.connected());
        let ble: BleStatus = serde_json::from_str(r#"{"state": "idle"}"#).unwrap();
        assert!(!ble.connected());
    }

    #[test]
    fn test_em_ct_state() {
        let em: EmStatus = serde_json::from_str(r#"{"total_power": 120, "ct_state": 1}"#).unwrap();
        assert_eq!(em.ct_connected(), Some(true));
    }

    #[test]
    fn test_device_info_mac_fallback() {
        let info: DeviceInfo =
            serde_json::from_str(r#"{"device": "VenusE", "wifi_mac": "aa:bb"}"#).unwrap();
        assert_eq!(info.mac(), Some("aa:bb"));
    }
}

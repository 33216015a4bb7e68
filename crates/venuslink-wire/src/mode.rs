//! # Operating Modes
//!
//! The energy system runs in one of four modes. `ES.SetMode` takes a
//! `config` object whose cfg key is named after the mode
//! (`auto_cfg`, `ai_cfg`, `manual_cfg`, `passive_cfg`), so the firmware can
//! reject a config that contradicts its own `mode` tag.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Weekday bitmask for manual-mode schedules: bit 0 = Monday .. bit 6 = Sunday.
pub const ALL_WEEK: u8 = 0x7F;

/// The four operating modes reported by `ES.GetMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingMode {
    Auto,
    #[serde(rename = "AI")]
    Ai,
    Manual,
    Passive,
}

impl OperatingMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingMode::Auto => "Auto",
            OperatingMode::Ai => "AI",
            OperatingMode::Manual => "Manual",
            OperatingMode::Passive => "Passive",
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = UnknownMode;

    /// Case-insensitive, so CLI input and firmware replies both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(OperatingMode::Auto),
            "ai" => Ok(OperatingMode::Ai),
            "manual" => Ok(OperatingMode::Manual),
            "passive" => Ok(OperatingMode::Passive),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Error for parsing an unrecognized mode name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operating mode: {}", self.0)
    }
}

impl std::error::Error for UnknownMode {}

/// `{"enable": 1}` sub-object used by Auto and AI configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableFlag {
    pub enable: u8,
}

/// Manual-mode schedule entry: a daily time window with a fixed power.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualCfg {
    /// Schedule slot index on the device.
    pub time_num: u32,
    /// Window start, `"HH:MM"`.
    pub start_time: String,
    /// Window end, `"HH:MM"`.
    pub end_time: String,
    /// Weekday bitmask, [`ALL_WEEK`] for every day.
    pub week_set: u8,
    /// Watts. Negative charges the battery, positive discharges.
    pub power: i32,
    pub enable: u8,
}

/// Passive-mode order: hold `power` watts for `cd_time` seconds, then revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassiveCfg {
    pub power: i32,
    /// Countdown in seconds before the device falls back to its prior mode.
    pub cd_time: u32,
}

/// The `config` object of an `ES.SetMode` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum ModeConfig {
    Auto { auto_cfg: EnableFlag },
    #[serde(rename = "AI")]
    Ai { ai_cfg: EnableFlag },
    Manual { manual_cfg: ManualCfg },
    Passive { passive_cfg: PassiveCfg },
}

impl ModeConfig {
    #[must_use]
    pub fn auto() -> Self {
        ModeConfig::Auto {
            auto_cfg: EnableFlag { enable: 1 },
        }
    }

    #[must_use]
    pub fn ai() -> Self {
        ModeConfig::Ai {
            ai_cfg: EnableFlag { enable: 1 },
        }
    }

    /// All-day, all-week manual window at a fixed power.
    #[must_use]
    pub fn manual_all_day(power: i32) -> Self {
        ModeConfig::Manual {
            manual_cfg: ManualCfg {
                time_num: 0,
                start_time: "00:00".to_string(),
                end_time: "23:59".to_string(),
                week_set: ALL_WEEK,
                power,
                enable: 1,
            },
        }
    }

    #[must_use]
    pub fn passive(power: i32, cd_time: u32) -> Self {
        ModeConfig::Passive {
            passive_cfg: PassiveCfg { power, cd_time },
        }
    }

    /// The mode this config selects.
    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        match self {
            ModeConfig::Auto { .. } => OperatingMode::Auto,
            ModeConfig::Ai { .. } => OperatingMode::Ai,
            ModeConfig::Manual { .. } => OperatingMode::Manual,
            ModeConfig::Passive { .. } => OperatingMode::Passive,
        }
    }

    /// Full `ES.SetMode` request parameters for instance `instance_id`.
    #[must_use]
    pub fn into_params(self, instance_id: u32) -> Value {
        json!({ "id": instance_id, "config": self })
    }
}

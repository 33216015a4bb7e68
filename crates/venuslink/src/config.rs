//! # Client Configuration
//!
//! All tunables with working defaults. Values mirror what the firmware
//! tolerates in practice: a 10 s reply budget, three attempts for reads,
//! five for mode changes, and a half-second backoff base doubling up to 8 s.
//!
//! Optionally loaded from a TOML file where every field is overridable and
//! everything except `host` falls back to the defaults.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use venuslink_wire::DEFAULT_PORT;

/// Complete configuration for one device client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Device address (IP or hostname).
    pub host: String,
    /// Device UDP port.
    pub port: u16,
    /// Local port to bind. Venus firmware replies to this port, so it is
    /// shared between clients rather than ephemeral.
    pub local_port: u16,
    /// Component instance addressed by status reads. 0 on all known hardware.
    pub instance_id: u32,
    /// Retry and backoff tuning.
    pub retry: RetryConfig,
    /// Poll scheduling tuning.
    pub poll: PollConfig,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            local_port: DEFAULT_PORT,
            instance_id: 0,
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_local_port(mut self, local_port: u16) -> Self {
        self.local_port = local_port;
        self
    }

    /// Loads configuration from a TOML file. `host` is required; every
    /// other field falls back to its default.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&content)?;
        Self::from_config_file(file)
    }

    fn from_config_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let host = file.host.ok_or(ConfigError::MissingField("host"))?;
        let mut config = Self::new(host);
        if let Some(port) = file.port {
            config.port = port;
        }
        if let Some(local_port) = file.local_port {
            config.local_port = local_port;
        }
        if let Some(instance_id) = file.instance_id {
            config.instance_id = instance_id;
        }
        if let Some(retry) = file.retry {
            config.retry.apply(retry);
        }
        if let Some(poll) = file.poll {
            config.poll.apply(poll);
        }
        Ok(config)
    }
}

/// Retry and backoff tuning for individual commands.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Per-attempt reply budget in seconds.
    pub command_timeout_secs: u64,
    /// Attempt ceiling for read-only status queries.
    pub query_attempts: u32,
    /// Attempt ceiling for mode changes. Higher, since a silently lost
    /// mode change costs more than a missed reading.
    pub control_attempts: u32,
    /// Backoff delay before retry N is `base * factor^(N-1)`, capped.
    pub backoff_base_ms: u64,
    pub backoff_factor: f64,
    pub backoff_max_ms: u64,
    /// Uniform random addition on top of each backoff delay.
    pub backoff_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 10,
            query_attempts: 3,
            control_attempts: 5,
            backoff_base_ms: 500,
            backoff_factor: 2.0,
            backoff_max_ms: 8000,
            backoff_jitter_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Backoff delay before retrying after failed attempt `attempt`
    /// (1-based), without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base_ms as f64;
        let raw = base * self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let capped = raw.min(self.backoff_max_ms as f64);
        Duration::from_millis(capped as u64)
    }

    fn apply(&mut self, file: RetryFile) {
        if let Some(v) = file.command_timeout_secs {
            self.command_timeout_secs = v;
        }
        if let Some(v) = file.query_attempts {
            self.query_attempts = v;
        }
        if let Some(v) = file.control_attempts {
            self.control_attempts = v;
        }
        if let Some(v) = file.backoff_base_ms {
            self.backoff_base_ms = v;
        }
        if let Some(v) = file.backoff_factor {
            self.backoff_factor = v;
        }
        if let Some(v) = file.backoff_max_ms {
            self.backoff_max_ms = v;
        }
        if let Some(v) = file.backoff_jitter_ms {
            self.backoff_jitter_ms = v;
        }
    }
}

/// Poll scheduling tuning.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Fundamental tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Tier cadences: a tier runs when its cadence divides the tick counter.
    pub high_cadence: u64,
    pub medium_cadence: u64,
    pub low_cadence: u64,
    pub idle_cadence: u64,
    /// Pause between consecutive calls within one tick, milliseconds.
    pub inter_call_delay_ms: u64,
    /// Consecutive timeouts before a method is marked unsupported.
    pub unsupported_after: u32,
    /// First cycle after (re)connection: shorter timeout, fewer attempts,
    /// tighter spacing, for a fast first answer.
    pub first_cycle_timeout_secs: u64,
    pub first_cycle_attempts: u32,
    pub first_cycle_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 30_000,
            high_cadence: 1,
            medium_cadence: 2,
            low_cadence: 5,
            idle_cadence: 10,
            inter_call_delay_ms: 1000,
            unsupported_after: 5,
            first_cycle_timeout_secs: 8,
            first_cycle_attempts: 2,
            first_cycle_delay_ms: 200,
        }
    }
}

impl PollConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn inter_call_delay(&self, first_cycle: bool) -> Duration {
        if first_cycle {
            Duration::from_millis(self.first_cycle_delay_ms)
        } else {
            Duration::from_millis(self.inter_call_delay_ms)
        }
    }

    fn apply(&mut self, file: PollFile) {
        if let Some(v) = file.tick_interval_ms {
            self.tick_interval_ms = v;
        }
        if let Some(v) = file.high_cadence {
            self.high_cadence = v;
        }
        if let Some(v) = file.medium_cadence {
            self.medium_cadence = v;
        }
        if let Some(v) = file.low_cadence {
            self.low_cadence = v;
        }
        if let Some(v) = file.idle_cadence {
            self.idle_cadence = v;
        }
        if let Some(v) = file.inter_call_delay_ms {
            self.inter_call_delay_ms = v;
        }
        if let Some(v) = file.unsupported_after {
            self.unsupported_after = v;
        }
        if let Some(v) = file.first_cycle_timeout_secs {
            self.first_cycle_timeout_secs = v;
        }
        if let Some(v) = file.first_cycle_attempts {
            self.first_cycle_attempts = v;
        }
        if let Some(v) = file.first_cycle_delay_ms {
            self.first_cycle_delay_ms = v;
        }
    }
}

/// Discovery tuning, independent of any one device.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Broadcast destination. Local-subnet broadcast by default.
    pub broadcast_addr: IpAddr,
    /// Device UDP port.
    pub port: u16,
    /// Local port to bind for collecting replies.
    pub local_port: u16,
    /// Collection window in seconds.
    pub window_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            port: DEFAULT_PORT,
            local_port: DEFAULT_PORT,
            window_secs: 9,
        }
    }
}

impl DiscoveryConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Full destination the probe is sent to.
    #[must_use]
    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.port)
    }
}

/// Configuration file loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file missing required field: {0}")]
    MissingField(&'static str),
}

// Serde mirror of the TOML file. Everything optional so partial files work.

#[derive(Debug, Deserialize)]
struct ConfigFile {
    host: Option<String>,
    port: Option<u16>,
    local_port: Option<u16>,
    instance_id: Option<u32>,
    retry: Option<RetryFile>,
    poll: Option<PollFile>,
}

#[derive(Debug, Deserialize)]
struct RetryFile {
    command_timeout_secs: Option<u64>,
    query_attempts: Option<u32>,
    control_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_factor: Option<f64>,
    backoff_max_ms: Option<u64>,
    backoff_jitter_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PollFile {
    tick_interval_ms: Option<u64>,
    high_cadence: Option<u64>,
    medium_cadence: Option<u64>,
    low_cadence: Option<u64>,
    idle_cadence: Option<u64>,
    inter_call_delay_ms: Option<u64>,
    unsupported_after: Option<u32>,
    first_cycle_timeout_secs: Option<u64>,
    first_cycle_attempts: Option<u32>,
    first_cycle_delay_ms: Option<u64>,
}

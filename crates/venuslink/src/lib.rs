//! # VenusLink Client Core
//!
//! Resilient client for Marstek Venus home batteries speaking their local
//! UDP JSON-RPC API. The firmware answers from a fixed source port and
//! replies can go missing, arrive late, or arrive for a request that was
//! already given up on; everything in this crate exists to make that
//! protocol dependable:
//!
//! - [`transport`] shares one UDP socket per local port between clients and
//!   routes replies by correlation id and source address.
//! - [`rpc`] retries timed-out commands with exponential backoff, one fresh
//!   correlation id per attempt.
//! - [`poll`] refreshes device state on tiered cadences and writes off
//!   methods the firmware never answers.
//! - [`cache`] keeps the last known good value per field, so readers see
//!   stale-but-real data during outages instead of gaps.
//! - [`discovery`] finds devices by broadcast probe.
//! - [`device`] ties it all together behind [`VenusDevice`].
//!
//! ## Example
//!
//! ```no_run
//! use venuslink::{ClientConfig, TransportPool, VenusDevice};
//!
//! # async fn run() -> venuslink::VenusResult<()> {
//! let pool = TransportPool::new();
//! let config = ClientConfig::new("192.168.1.50");
//! let mut device = VenusDevice::connect(&pool, config).await?;
//!
//! let battery = device.battery_status().await?;
//! println!("soc: {:?} %", battery.soc);
//!
//! device.start_polling();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod poll;
pub mod rpc;
pub mod stats;
pub mod transport;

pub use cache::{FieldValue, StateCache, StateSnapshot};
pub use config::{ClientConfig, ConfigError, DiscoveryConfig, PollConfig, RetryConfig};
pub use device::VenusDevice;
pub use error::{VenusError, VenusResult};
pub use poll::{PollPlan, PollTier, SchedulerCommand, SchedulerHandle};
pub use rpc::{CallOptions, RpcClient};
pub use stats::{CommandStats, MethodStats, SupportState};
pub use transport::{TransportHandle, TransportPool};

// The wire types move through the whole public API; spare callers a second
// direct dependency.
pub use venuslink_wire as wire;
pub use venuslink_wire::{
    BatteryStatus, BleStatus, DeviceDescriptor, DeviceInfo, EmStatus, EsMode, EsStatus, Method,
    ModeConfig, OperatingMode, PvStatus, WifiStatus, DEFAULT_PORT,
};

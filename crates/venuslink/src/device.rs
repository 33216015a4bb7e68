//! # Device Facade
//!
//! [`VenusDevice`] ties the other layers together behind one handle: it
//! resolves the host, joins the shared transport for the configured local
//! port, and exposes typed reads, mode changes, and the optional background
//! poll loop feeding the state snapshot.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::lookup_host;
use tokio::sync::watch;
use tracing::{debug, info};
use venuslink_wire::{
    BatteryStatus, BleStatus, DeviceInfo, EmStatus, EsMode, EsStatus, Method, ModeConfig, PvStatus,
    WifiStatus,
};

use crate::cache::{StateCache, StateSnapshot};
use crate::config::ClientConfig;
use crate::error::{VenusError, VenusResult};
use crate::poll::SchedulerHandle;
use crate::rpc::RpcClient;
use crate::stats::CommandStats;
use crate::transport::TransportPool;

/// Client for one Venus device.
pub struct VenusDevice {
    config: ClientConfig,
    rpc: Arc<RpcClient>,
    cache: Arc<StateCache>,
    stats: Arc<CommandStats>,
    scheduler: Option<SchedulerHandle>,
}

impl VenusDevice {
    /// Resolves the configured host and joins the shared transport for the
    /// configured local port. Purely local setup: no datagram is sent until
    /// the first command.
    pub async fn connect(pool: &TransportPool, config: ClientConfig) -> VenusResult<Self> {
        let peer = resolve(&config.host, config.port).await?;
        let transport = pool.acquire(config.local_port).await?;
        let stats = Arc::new(CommandStats::new());
        let rpc = Arc::new(RpcClient::new(
            transport,
            peer,
            config.retry.clone(),
            Arc::clone(&stats),
        ));
        debug!(host = %config.host, %peer, local_port = config.local_port, "Device client ready");

        Ok(Self {
            config,
            rpc,
            cache: Arc::new(StateCache::new()),
            stats,
            scheduler: None,
        })
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.rpc.peer()
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Runs one read with the query budget and returns the raw `result`.
    /// The outcome also lands in the state cache.
    pub async fn query(&self, method: Method) -> VenusResult<Value> {
        let params = method.query_params(self.config.instance_id);
        match self
            .rpc
            .call(method.as_str(), params, self.rpc.query_options())
            .await
        {
            Ok(result) => {
                self.cache.apply_result(method, &result).await;
                Ok(result)
            }
            Err(err) => {
                self.cache.mark_failed(method).await;
                Err(err)
            }
        }
    }

    /// Runs an arbitrary method with the query budget. For methods outside
    /// the catalog; the cache is not touched.
    pub async fn query_raw(&self, method: &str, params: Option<Value>) -> VenusResult<Value> {
        self.rpc.call(method, params, self.rpc.query_options()).await
    }

    pub async fn device_info(&self) -> VenusResult<DeviceInfo> {
        self.typed(Method::MarstekGetDevice).await
    }

    pub async fn battery_status(&self) -> VenusResult<BatteryStatus> {
        self.typed(Method::BatGetStatus).await
    }

    pub async fn pv_status(&self) -> VenusResult<PvStatus> {
        self.typed(Method::PvGetStatus).await
    }

    pub async fn es_status(&self) -> VenusResult<EsStatus> {
        self.typed(Method::EsGetStatus).await
    }

    pub async fn es_mode(&self) -> VenusResult<EsMode> {
        self.typed(Method::EsGetMode).await
    }

    pub async fn em_status(&self) -> VenusResult<EmStatus> {
        self.typed(Method::EmGetStatus).await
    }

    pub async fn wifi_status(&self) -> VenusResult<WifiStatus> {
        self.typed(Method::WifiGetStatus).await
    }

    pub async fn ble_status(&self) -> VenusResult<BleStatus> {
        self.typed(Method::BleGetStatus).await
    }

    /// Applies an operating mode with the control budget (more attempts
    /// than a read; a silently lost mode change costs more).
    pub async fn set_mode(&self, mode: ModeConfig) -> VenusResult<Value> {
        let name = mode.mode();
        let params = mode.into_params(self.config.instance_id);
        let result = self
            .rpc
            .call(Method::EsSetMode.as_str(), Some(params), self.rpc.control_options())
            .await?;
        info!(host = %self.config.host, mode = ?name, "Mode change accepted");
        Ok(result)
    }

    /// Last-known-good view of everything polled or queried so far.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.cache.snapshot().await
    }

    #[must_use]
    pub fn stats(&self) -> Arc<CommandStats> {
        Arc::clone(&self.stats)
    }

    /// Starts the background poll loop. A second call while polling is
    /// already running does nothing.
    pub fn start_polling(&mut self) {
        if self.scheduler.is_some() {
            return;
        }
        self.scheduler = Some(SchedulerHandle::spawn(
            Arc::clone(&self.rpc),
            Arc::clone(&self.cache),
            self.config.poll.clone(),
            self.config.instance_id,
        ));
        info!(host = %self.config.host, "Polling started");
    }

    /// Stops the poll loop and waits for it to exit. No-op when not polling.
    pub async fn stop_polling(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            handle.shutdown().await;
            info!(host = %self.config.host, "Polling stopped");
        }
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.scheduler.is_some()
    }

    /// State version channel from the running poll loop, or `None` when
    /// polling is not active. Subscribers take a fresh [`snapshot`] on
    /// every change.
    ///
    /// [`snapshot`]: VenusDevice::snapshot
    #[must_use]
    pub fn updates(&self) -> Option<watch::Receiver<u64>> {
        self.scheduler.as_ref().map(SchedulerHandle::updates)
    }

    /// Forgets an unsupported verdict so the method is probed again. With
    /// the poll loop running the re-probe happens on its next due tick.
    pub fn reset_method(&self, method: Method) {
        match &self.scheduler {
            Some(handle) => handle.reset_method(method),
            None => self.stats.reset_support(method.as_str()),
        }
    }

    async fn typed<T: DeserializeOwned>(&self, method: Method) -> VenusResult<T> {
        let result = self.query(method).await?;
        serde_json::from_value(result).map_err(|err| VenusError::Protocol {
            method: method.as_str().to_string(),
            reason: format!("reply shape mismatch: {err}"),
        })
    }
}

impl std::fmt::Debug for VenusDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenusDevice")
            .field("host", &self.config.host)
            .field("peer", &self.rpc.peer())
            .field("polling", &self.scheduler.is_some())
            .finish()
    }
}

async fn resolve(host: &str, port: u16) -> VenusResult<SocketAddr> {
    let mut addrs = lookup_host((host, port)).await?;
    addrs.next().ok_or_else(|| VenusError::UnresolvedHost {
        host: host.to_string(),
    })
}

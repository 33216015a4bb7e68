//! # Device Discovery
//!
//! One broadcast `Marstek.GetDevice` makes every listening device on the
//! subnet announce itself. Replies trickle in over several seconds, so they
//! are collected for a fixed window and deduplicated by MAC. Devices all
//! echo the probe's correlation id, which therefore cannot be registered as
//! pending; instead the replies are read from a transport tap and matched
//! against the probe id by hand.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, info};
use venuslink_wire::{DeviceDescriptor, Method, RpcRequest};

use crate::config::DiscoveryConfig;
use crate::error::VenusResult;
use crate::transport::TransportPool;

/// Broadcasts a probe and streams each newly found device as it answers.
///
/// The stream ends when the collection window closes. Finding nothing is
/// not an error: the stream just yields no items.
pub async fn stream(
    pool: &TransportPool,
    config: &DiscoveryConfig,
) -> VenusResult<ReceiverStream<DeviceDescriptor>> {
    let transport = pool.acquire(config.local_port).await?;
    let mut tap = transport.open_tap();

    let probe_id = transport.next_correlation_id();
    let probe = Method::MarstekGetDevice;
    let payload = RpcRequest::new(probe_id, probe.as_str(), probe.query_params(0)).encode()?;
    let target = config.broadcast_target();
    transport.send_to(&payload, target).await?;
    info!(%target, probe_id, window_secs = config.window_secs, "Discovery probe sent");

    let deadline = Instant::now() + config.window();
    let (found_tx, found_rx) = mpsc::channel(16);

    tokio::spawn(async move {
        // The handle keeps the shared socket alive for the whole window.
        let _transport = transport;
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            let received = tokio::select! {
                () = sleep_until(deadline) => break,
                received = tap.recv() => received,
            };
            let Some((reply, source)) = received else {
                break;
            };
            if reply.id != probe_id {
                continue;
            }
            let Some(descriptor) = DeviceDescriptor::from_reply(&reply, source) else {
                debug!(%source, "Discovery reply without a usable identity, dropped");
                continue;
            };
            if !seen.insert(descriptor.mac.clone()) {
                debug!(mac = %descriptor.mac, %source, "Duplicate discovery reply");
                continue;
            }
            debug!(mac = %descriptor.mac, addr = %descriptor.addr, "Device found");
            if found_tx.send(descriptor).await.is_err() {
                break;
            }
        }
        debug!(found = seen.len(), "Discovery window closed");
    });

    Ok(ReceiverStream::new(found_rx))
}

/// Runs a full discovery window and returns everything found.
pub async fn collect(
    pool: &TransportPool,
    config: &DiscoveryConfig,
) -> VenusResult<Vec<DeviceDescriptor>> {
    let mut devices = stream(pool, config).await?;
    let mut found = Vec::new();
    while let Some(descriptor) = devices.next().await {
        found.push(descriptor);
    }
    Ok(found)
}

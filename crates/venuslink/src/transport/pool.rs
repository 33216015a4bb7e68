//! # Socket Pool
//!
//! One bound socket per local port, shared by every client in the process.
//! Handles are cheap clones; the socket, its listener task, and its pending
//! commands are torn down when the last handle drops.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};

use tokio::net::UdpSocket;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use venuslink_wire::RpcResponse;

use super::pending::{PendingTable, TapReceiver};
use crate::error::VenusResult;

/// Largest datagram the firmware sends; replies are well under 1 KiB.
const MAX_DATAGRAM: usize = 2048;

/// Lazily binds and shares one UDP socket per local port.
#[derive(Default)]
pub struct TransportPool {
    ports: tokio::sync::Mutex<HashMap<u16, PortSlot>>,
}

/// One pool entry. The transport is held weakly so the pool never keeps a
/// socket alive by itself; the listener handle stays here so a later
/// acquisition can wait out the old listener before rebinding the port.
struct PortSlot {
    transport: Weak<PortTransport>,
    listener: JoinHandle<()>,
}

impl TransportPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the shared socket for `local_port`, binding it
    /// on first acquisition. Subsequent acquisitions share the same socket
    /// until every handle has been dropped.
    pub async fn acquire(&self, local_port: u16) -> VenusResult<TransportHandle> {
        let mut ports = self.ports.lock().await;
        if let Some(slot) = ports.remove(&local_port) {
            if let Some(existing) = slot.transport.upgrade() {
                ports.insert(local_port, slot);
                trace!(port = local_port, "Reusing shared transport");
                return Ok(TransportHandle { inner: existing });
            }
            // The last handle is gone, but the listener keeps its clone of
            // the socket until it observes the shutdown signal. Rebinding
            // before it exits would fail with AddrInUse.
            let _ = slot.listener.await;
        }

        let (transport, listener) = PortTransport::bind(local_port).await?;
        ports.insert(
            local_port,
            PortSlot {
                transport: Arc::downgrade(&transport),
                listener,
            },
        );
        Ok(TransportHandle { inner: transport })
    }

    /// Ports with a live socket right now.
    pub async fn active_ports(&self) -> Vec<u16> {
        let ports = self.ports.lock().await;
        ports
            .iter()
            .filter(|(_, slot)| slot.transport.strong_count() > 0)
            .map(|(port, _)| *port)
            .collect()
    }
}

/// A reference-counted handle to one shared socket.
///
/// Dropping the last handle for a port closes the socket and fails all of
/// its pending commands with
/// [`TransportClosed`](crate::error::VenusError::TransportClosed).
#[derive(Clone)]
pub struct TransportHandle {
    inner: Arc<PortTransport>,
}

impl TransportHandle {
    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.inner.local_port
    }

    /// Fresh correlation id for the next request.
    #[must_use]
    pub fn next_correlation_id(&self) -> u64 {
        self.inner.pending.next_correlation_id()
    }

    /// Registers a command awaiting a reply from `peer_ip` under `id`.
    pub fn register(
        &self,
        id: u64,
        method: &str,
        peer_ip: IpAddr,
    ) -> VenusResult<oneshot::Receiver<VenusResult<RpcResponse>>> {
        self.inner.pending.register(id, method, peer_ip)
    }

    /// Withdraws a command that stopped waiting (timeout or abandon).
    pub fn deregister(&self, id: u64) {
        self.inner.pending.deregister(id);
    }

    /// Sends one datagram to `peer`.
    pub async fn send_to(&self, payload: &[u8], peer: SocketAddr) -> VenusResult<()> {
        self.inner.socket.send_to(payload, peer).await?;
        Ok(())
    }

    /// Opens a tap receiving datagrams that match no pending command.
    /// Used by discovery, where many devices answer the same request id.
    pub(crate) fn open_tap(&self) -> TapReceiver {
        self.inner.pending.open_tap()
    }

    /// Commands currently awaiting replies on this socket.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    /// Datagrams dropped as undecodable or unmatched since the bind.
    #[must_use]
    pub fn dropped_datagrams(&self) -> u64 {
        self.inner.pending.dropped_count()
    }

    /// True when both handles share one underlying socket.
    #[must_use]
    pub fn same_transport(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("local_port", &self.inner.local_port)
            .field("pending", &self.inner.pending.pending_count())
            .finish()
    }
}

/// The shared state behind every handle for one port.
struct PortTransport {
    local_port: u16,
    socket: Arc<UdpSocket>,
    pending: PendingTable,
    shutdown: Arc<Notify>,
}

impl PortTransport {
    async fn bind(local_port: u16) -> VenusResult<(Arc<Self>, JoinHandle<()>)> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port)).await?;
        socket.set_broadcast(true)?;
        let socket = Arc::new(socket);
        debug!(port = local_port, "Bound shared transport");

        let shutdown = Arc::new(Notify::new());
        let transport = Arc::new(PortTransport {
            local_port,
            socket: Arc::clone(&socket),
            pending: PendingTable::new(local_port),
            shutdown: Arc::clone(&shutdown),
        });
        let listener = spawn_listener(socket, Arc::downgrade(&transport), shutdown, local_port);
        Ok((transport, listener))
    }
}

impl Drop for PortTransport {
    fn drop(&mut self) {
        // notify_one leaves a permit behind, so the listener wakes even
        // when it is mid-dispatch rather than parked on notified().
        self.shutdown.notify_one();
        self.pending.fail_all_closed();
        debug!(port = self.local_port, "Transport closed");
    }
}

/// Background reader: one per socket, alive for the socket's lifetime.
/// Holds only a weak reference so it never keeps the transport alive by
/// itself; its socket clone is released when the shutdown signal fires.
fn spawn_listener(
    socket: Arc<UdpSocket>,
    transport: Weak<PortTransport>,
    shutdown: Arc<Notify>,
    local_port: u16,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                () = shutdown.notified() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, source)) => {
                        let Some(transport) = transport.upgrade() else {
                            break;
                        };
                        transport.pending.dispatch(&buf[..len], source);
                    }
                    Err(err) => {
                        if transport.upgrade().is_none() {
                            break;
                        }
                        // Linux surfaces ICMP errors for earlier sends here;
                        // they say nothing about future datagrams.
                        warn!(port = local_port, %err, "Listener recv error");
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                },
            }
        }
        trace!(port = local_port, "Listener exited");
    })
}

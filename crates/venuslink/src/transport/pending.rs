//! # Correlation Table
//!
//! Outstanding commands keyed by correlation id, plus the id counter
//! itself. The listener resolves incoming datagrams against this table;
//! everything in here is synchronous and lock-scoped so the listener never
//! stalls behind a slow caller.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};
use venuslink_wire::{RpcResponse, CORRELATION_ID_SPACE};

use crate::error::{VenusError, VenusResult};

/// Receiving end of a discovery tap: every datagram that matches no pending
/// command is forwarded here while the tap is open.
pub(crate) type TapReceiver = mpsc::UnboundedReceiver<(RpcResponse, SocketAddr)>;

/// One command awaiting its reply.
struct PendingSlot {
    method: String,
    /// Replies are only accepted from the host the request went to;
    /// anything else on a shared port belongs to someone else's exchange.
    peer_ip: IpAddr,
    sender: oneshot::Sender<VenusResult<RpcResponse>>,
    registered_at: Instant,
}

/// Correlation table for one shared socket.
pub struct PendingTable {
    local_port: u16,
    slots: Mutex<HashMap<u64, PendingSlot>>,
    taps: Mutex<Vec<mpsc::UnboundedSender<(RpcResponse, SocketAddr)>>>,
    next_id: AtomicU64,
    dropped: AtomicU64,
}

impl PendingTable {
    pub fn new(local_port: u16) -> Self {
        Self {
            local_port,
            slots: Mutex::new(HashMap::new()),
            taps: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Hands out the next correlation id, skipping any id still occupied by
    /// a pending command after the counter wraps.
    pub fn next_correlation_id(&self) -> u64 {
        let slots = self.slots.lock().unwrap();
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) % CORRELATION_ID_SPACE;
            if !slots.contains_key(&id) {
                return id;
            }
        }
    }

    /// Registers a command under `id`. The returned receiver resolves with
    /// the matching reply, or with an error when the transport closes.
    pub fn register(
        &self,
        id: u64,
        method: &str,
        peer_ip: IpAddr,
    ) -> VenusResult<oneshot::Receiver<VenusResult<RpcResponse>>> {
        let (tx, rx) = oneshot::channel();
        let mut slots = self.slots.lock().unwrap();
        if slots.contains_key(&id) {
            return Err(VenusError::DuplicateCorrelationId {
                id,
                port: self.local_port,
            });
        }
        slots.insert(
            id,
            PendingSlot {
                method: method.to_string(),
                peer_ip,
                sender: tx,
                registered_at: Instant::now(),
            },
        );
        Ok(rx)
    }

    /// Withdraws a command that gave up waiting. Idempotent.
    pub fn deregister(&self, id: u64) {
        self.slots.lock().unwrap().remove(&id);
    }

    /// Routes one incoming datagram.
    ///
    /// A decodable reply whose id matches a pending command from the same
    /// host fulfills that command and removes it. Anything else is offered
    /// to open discovery taps, and counted as dropped when no tap takes it.
    pub fn dispatch(&self, raw: &[u8], source: SocketAddr) {
        let reply = match RpcResponse::decode(raw) {
            Ok(reply) => reply,
            Err(err) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(%source, %err, "Dropping undecodable datagram");
                return;
            }
        };

        let slot = {
            let mut slots = self.slots.lock().unwrap();
            match slots.get(&reply.id) {
                Some(slot) if slot.peer_ip == source.ip() => slots.remove(&reply.id),
                _ => None,
            }
        };

        if let Some(slot) = slot {
            trace!(
                id = reply.id,
                method = %slot.method,
                elapsed = ?slot.registered_at.elapsed(),
                "Reply matched pending command"
            );
            // The caller may have timed out between lookup and delivery.
            let _ = slot.sender.send(Ok(reply));
            return;
        }

        if self.offer_to_taps(reply, source) {
            return;
        }

        self.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(%source, "Dropping unmatched datagram");
    }

    /// Opens a tap for unmatched datagrams. The tap closes when the
    /// receiver is dropped.
    pub(crate) fn open_tap(&self) -> TapReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.taps.lock().unwrap().push(tx);
        rx
    }

    fn offer_to_taps(&self, reply: RpcResponse, source: SocketAddr) -> bool {
        let mut taps = self.taps.lock().unwrap();
        if taps.is_empty() {
            return false;
        }
        // Closed taps are pruned on the way through.
        taps.retain(|tap| !tap.is_closed());
        let mut delivered = false;
        for tap in taps.iter() {
            delivered |= tap.send((reply.clone(), source)).is_ok();
        }
        delivered
    }

    /// Fails every pending command. Called when the socket goes away.
    pub fn fail_all_closed(&self) {
        let slots: Vec<(u64, PendingSlot)> = {
            let mut slots = self.slots.lock().unwrap();
            slots.drain().collect()
        };
        for (id, slot) in slots {
            debug!(id, method = %slot.method, "Failing pending command: transport closed");
            let _ = slot.sender.send(Err(VenusError::TransportClosed));
        }
    }

    /// Number of commands currently awaiting replies.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// Datagrams dropped as undecodable or unmatched since creation.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

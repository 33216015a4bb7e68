//! # Shared UDP Transport
//!
//! Venus firmware replies to a fixed local port, so every client in the
//! process must receive on the same socket. The pool hands out
//! reference-counted handles to one shared socket per local port; a
//! background listener per socket routes incoming datagrams to whichever
//! command is waiting on the echoed correlation id.
//!
//! Lifecycle: the socket is bound lazily on first [`TransportPool::acquire`]
//! for a port and closed when the last [`TransportHandle`] drops, failing
//! any still-pending commands with
//! [`TransportClosed`](crate::error::VenusError::TransportClosed).

mod pending;
mod pool;

pub use pending::PendingTable;
pub use pool::{TransportHandle, TransportPool};

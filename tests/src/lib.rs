//! # VenusLink Test Suite
//!
//! Unified integration suite for the workspace, exercising the public API
//! of `venuslink` against scripted mock devices.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Scripted mock device on a loopback socket
//! │
//! └── integration/      # End-to-end flows through the public API
//!     ├── flows.rs      # Query, retry, mode change, polling
//!     ├── resilience.rs # Timeouts, staleness, shared sockets
//!     └── discovery.rs  # Broadcast probe plus follow-up unicast
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p venuslink-tests
//!
//! # By category
//! cargo test -p venuslink-tests integration::flows::
//! cargo test -p venuslink-tests integration::resilience::
//! cargo test -p venuslink-tests integration::discovery::
//! ```
//!
//! Every test drives a real UDP socket pair on loopback; no test talks to
//! actual hardware. Local ports are assigned one per test so suites can run
//! concurrently in one process.

#![allow(dead_code)]

pub mod integration;
pub mod support;

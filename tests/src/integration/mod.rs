//! End-to-end flows through the public client API, each running against a
//! scripted mock device on a loopback socket.

pub mod discovery;
pub mod flows;
pub mod resilience;

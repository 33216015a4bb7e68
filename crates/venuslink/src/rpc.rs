//! # RPC Client
//!
//! One `call` is up to N attempts: send, wait for the matching reply,
//! back off, try again with a fresh correlation id. A stale id is never
//! reused, so a reply that limps in after its attempt was abandoned can
//! only be dropped, never mistaken for an answer to the retry.
//!
//! Only timeouts are retried. A reply carrying a device error means the
//! request itself is wrong, and repeating it would produce the same answer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::debug;
use venuslink_wire::RpcRequest;

use crate::config::RetryConfig;
use crate::error::{VenusError, VenusResult};
use crate::stats::{CommandStats, SupportState};
use crate::transport::TransportHandle;

/// Per-call budget: reply timeout for each attempt and the attempt ceiling.
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    pub timeout: Duration,
    pub max_attempts: u32,
}

/// Sends commands to one device over a shared transport.
pub struct RpcClient {
    transport: TransportHandle,
    peer: SocketAddr,
    host: String,
    retry: RetryConfig,
    stats: Arc<CommandStats>,
}

impl RpcClient {
    pub fn new(
        transport: TransportHandle,
        peer: SocketAddr,
        retry: RetryConfig,
        stats: Arc<CommandStats>,
    ) -> Self {
        Self {
            transport,
            peer,
            host: peer.ip().to_string(),
            retry,
            stats,
        }
    }

    /// Default budget for read-only status queries.
    #[must_use]
    pub fn query_options(&self) -> CallOptions {
        CallOptions {
            timeout: self.retry.command_timeout(),
            max_attempts: self.retry.query_attempts,
        }
    }

    /// Default budget for mode changes: same timeout, more attempts.
    #[must_use]
    pub fn control_options(&self) -> CallOptions {
        CallOptions {
            timeout: self.retry.command_timeout(),
            max_attempts: self.retry.control_attempts,
        }
    }

    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[must_use]
    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    #[must_use]
    pub fn stats(&self) -> &Arc<CommandStats> {
        &self.stats
    }

    /// Sends `method` and returns the device's `result` payload.
    ///
    /// Retries timeouts with exponential backoff up to the attempt ceiling,
    /// then fails with [`VenusError::CommandTimeout`]. Device-reported
    /// errors and transport teardown fail immediately, as does a method
    /// already written off as unsupported by this firmware.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> VenusResult<Value> {
        if self.stats.support(method) == SupportState::Unsupported {
            return Err(VenusError::UnsupportedMethod {
                method: method.to_string(),
            });
        }

        let started = Instant::now();
        let max_attempts = options.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            self.stats.record_attempt(method);
            let attempt_started = Instant::now();

            let id = self.transport.next_correlation_id();
            let rx = self.transport.register(id, method, self.peer.ip())?;
            let payload = match RpcRequest::new(id, method, params.clone()).encode() {
                Ok(payload) => payload,
                Err(err) => {
                    self.transport.deregister(id);
                    return Err(err.into());
                }
            };
            if let Err(err) = self.transport.send_to(&payload, self.peer).await {
                self.transport.deregister(id);
                return Err(err);
            }
            debug!(method, id, attempt, max_attempts, "Sent command");

            match timeout(options.timeout, rx).await {
                Ok(Ok(Ok(reply))) => {
                    if let Some(device_err) = reply.error {
                        debug!(method, id, code = device_err.code, "Device rejected command");
                        return Err(VenusError::device_error(
                            method,
                            device_err.code,
                            &device_err.message,
                        ));
                    }
                    let latency = attempt_started.elapsed();
                    self.stats.record_success(method, latency);
                    debug!(method, id, ?latency, "Command succeeded");
                    return Ok(reply.result.unwrap_or(Value::Null));
                }
                Ok(Ok(Err(err))) => return Err(err),
                // Completion slot dropped without a verdict: the transport
                // was torn down between registration and delivery.
                Ok(Err(_)) => return Err(VenusError::TransportClosed),
                Err(_elapsed) => {
                    self.transport.deregister(id);
                    self.stats.record_timeout(method);
                    if attempt < max_attempts {
                        let delay = self.backoff_with_jitter(attempt);
                        debug!(method, id, attempt, ?delay, "Timeout, backing off");
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(VenusError::CommandTimeout {
            method: method.to_string(),
            host: self.host.clone(),
            attempts: max_attempts,
            elapsed: started.elapsed(),
        })
    }

    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.retry.backoff_delay(attempt);
        if self.retry.backoff_jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.retry.backoff_jitter_ms);
        base + Duration::from_millis(jitter)
    }
}

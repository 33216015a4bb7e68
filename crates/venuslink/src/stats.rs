//! # Command Diagnostics
//!
//! Per-method counters fed by the RPC layer after every completed attempt.
//! Purely observational: nothing in here influences retry behavior. The
//! one exception is the support flag, which the scheduler consults to skip
//! methods this firmware never answers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Whether a method is known to be answered by the connected firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupportState {
    /// Never seen a success or an unsupported verdict yet.
    #[default]
    Unknown,
    /// At least one successful reply observed.
    Supported,
    /// Timed out for enough consecutive cycles to give up on it.
    Unsupported,
}

/// Counters for one method.
#[derive(Debug, Clone, Default)]
pub struct MethodStats {
    pub attempts: u64,
    pub successes: u64,
    pub timeouts: u64,
    /// Round-trip of the most recent successful attempt.
    pub last_latency: Option<Duration>,
    pub support: SupportState,
}

/// Shared per-method counters for one device client.
#[derive(Debug, Default)]
pub struct CommandStats {
    methods: Mutex<HashMap<String, MethodStats>>,
}

impl CommandStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, method: &str) {
        let mut methods = self.methods.lock().unwrap();
        methods.entry(method.to_string()).or_default().attempts += 1;
    }

    /// Records a matching reply. A success always proves support.
    pub fn record_success(&self, method: &str, latency: Duration) {
        let mut methods = self.methods.lock().unwrap();
        let entry = methods.entry(method.to_string()).or_default();
        entry.successes += 1;
        entry.last_latency = Some(latency);
        entry.support = SupportState::Supported;
    }

    pub fn record_timeout(&self, method: &str) {
        let mut methods = self.methods.lock().unwrap();
        methods.entry(method.to_string()).or_default().timeouts += 1;
    }

    pub fn mark_unsupported(&self, method: &str) {
        let mut methods = self.methods.lock().unwrap();
        methods.entry(method.to_string()).or_default().support = SupportState::Unsupported;
    }

    /// Re-probe hook: forget an unsupported verdict.
    pub fn reset_support(&self, method: &str) {
        let mut methods = self.methods.lock().unwrap();
        if let Some(entry) = methods.get_mut(method) {
            entry.support = SupportState::Unknown;
        }
    }

    #[must_use]
    pub fn support(&self, method: &str) -> SupportState {
        let methods = self.methods.lock().unwrap();
        methods.get(method).map(|e| e.support).unwrap_or_default()
    }

    #[must_use]
    pub fn get(&self, method: &str) -> Option<MethodStats> {
        let methods = self.methods.lock().unwrap();
        methods.get(method).cloned()
    }

    /// Copy of every method's counters, for diagnostics output.
    #[must_use]
    pub fn all(&self) -> HashMap<String, MethodStats> {
        self.methods.lock().unwrap().clone()
    }
}

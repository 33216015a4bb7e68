//! Poll plan state.
//!
//! This is the pure scheduling logic. Actual RPC I/O and timing are handled
//! by the scheduler loop; everything here is synchronous and deterministic,
//! driven by an integer tick counter.

use venuslink_wire::Method;

use crate::config::PollConfig;

/// Priority tier of a polled method. The cadence of each tier comes from
/// [`PollConfig`]; a tier's methods run when its cadence divides the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTier {
    /// Core readings, refreshed every tick.
    High,
    /// Mode and meter, refreshed every few ticks.
    Medium,
    /// Slowly-changing inputs.
    Low,
    /// Near-static identity and link state.
    Idle,
}

impl PollTier {
    /// Ticks between runs for this tier.
    #[must_use]
    pub fn cadence(&self, config: &PollConfig) -> u64 {
        let cadence = match self {
            PollTier::High => config.high_cadence,
            PollTier::Medium => config.medium_cadence,
            PollTier::Low => config.low_cadence,
            PollTier::Idle => config.idle_cadence,
        };
        cadence.max(1)
    }
}

/// Default tier for each query method, mirroring how fast each reading
/// becomes stale in practice.
#[must_use]
pub fn default_tier(method: Method) -> PollTier {
    match method {
        Method::BatGetStatus | Method::EsGetStatus => PollTier::High,
        Method::EsGetMode | Method::EmGetStatus => PollTier::Medium,
        Method::PvGetStatus => PollTier::Low,
        Method::WifiGetStatus | Method::BleGetStatus | Method::MarstekGetDevice => PollTier::Idle,
        // Not polled; tier irrelevant.
        Method::EsSetMode => PollTier::Idle,
    }
}

/// Per-method scheduling state.
#[derive(Debug)]
struct PlanEntry {
    method: Method,
    tier: PollTier,
    /// A poll for this method is still running; due ticks are skipped.
    in_flight: bool,
    consecutive_timeouts: u32,
    /// Given up on this method until an explicit reset.
    unsupported: bool,
    /// Due ticks skipped because the previous poll was still in flight.
    missed_cycles: u64,
}

/// Decides which methods to poll on each tick.
#[derive(Debug)]
pub struct PollPlan {
    entries: Vec<PlanEntry>,
    tick: u64,
}

impl PollPlan {
    /// Plan over the standard query methods with their default tiers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tiers(
            Method::QUERIES
                .iter()
                .map(|&method| (method, default_tier(method))),
        )
    }

    /// Plan over an explicit method/tier assignment, polled in the given
    /// order on each due tick.
    pub fn with_tiers(tiers: impl IntoIterator<Item = (Method, PollTier)>) -> Self {
        let entries = tiers
            .into_iter()
            .map(|(method, tier)| PlanEntry {
                method,
                tier,
                in_flight: false,
                consecutive_timeouts: 0,
                unsupported: false,
                missed_cycles: 0,
            })
            .collect();
        Self { entries, tick: 0 }
    }

    /// Advances the tick counter and returns the methods due this tick.
    ///
    /// Unsupported methods are absent. A due method whose previous poll is
    /// still in flight is skipped and counted as a missed cycle.
    pub fn advance_tick(&mut self, config: &PollConfig) -> Vec<Method> {
        self.tick += 1;
        let tick = self.tick;
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if tick % entry.tier.cadence(config) != 0 {
                continue;
            }
            if entry.unsupported {
                continue;
            }
            if entry.in_flight {
                entry.missed_cycles += 1;
                continue;
            }
            due.push(entry.method);
        }
        due
    }

    /// Marks a due method as issued. Must be called before the poll starts.
    pub fn mark_issued(&mut self, method: Method) {
        if let Some(entry) = self.entry_mut(method) {
            entry.in_flight = true;
        }
    }

    /// A poll completed with a matching reply.
    pub fn on_success(&mut self, method: Method) {
        if let Some(entry) = self.entry_mut(method) {
            entry.in_flight = false;
            entry.consecutive_timeouts = 0;
            entry.unsupported = false;
        }
    }

    /// A poll exhausted its attempts without a reply.
    ///
    /// Returns true when this failure crosses `threshold` and the method
    /// is newly marked unsupported.
    pub fn on_timeout(&mut self, method: Method, threshold: u32) -> bool {
        let Some(entry) = self.entry_mut(method) else {
            return false;
        };
        entry.in_flight = false;
        entry.consecutive_timeouts += 1;
        if !entry.unsupported && threshold > 0 && entry.consecutive_timeouts >= threshold {
            entry.unsupported = true;
            return true;
        }
        false
    }

    /// A poll got an answer, but an error one. The device is alive and the
    /// method exists, so the timeout streak resets.
    pub fn on_answered_error(&mut self, method: Method) {
        if let Some(entry) = self.entry_mut(method) {
            entry.in_flight = false;
            entry.consecutive_timeouts = 0;
        }
    }

    /// A poll was cut short without a verdict (transport torn down).
    pub fn on_aborted(&mut self, method: Method) {
        if let Some(entry) = self.entry_mut(method) {
            entry.in_flight = false;
        }
    }

    /// Re-probe hook: forget an unsupported verdict and its timeout streak.
    /// Returns false for methods not in the plan.
    pub fn reset_method(&mut self, method: Method) -> bool {
        match self.entry_mut(method) {
            Some(entry) => {
                entry.unsupported = false;
                entry.consecutive_timeouts = 0;
                true
            }
            None => false,
        }
    }

    /// Ticks elapsed so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    #[must_use]
    pub fn is_unsupported(&self, method: Method) -> bool {
        self.entry(method).is_some_and(|e| e.unsupported)
    }

    #[must_use]
    pub fn missed_cycles(&self, method: Method) -> u64 {
        self.entry(method).map_or(0, |e| e.missed_cycles)
    }

    /// Methods currently written off as unsupported.
    #[must_use]
    pub fn unsupported_methods(&self) -> Vec<Method> {
        self.entries
            .iter()
            .filter(|e| e.unsupported)
            .map(|e| e.method)
            .collect()
    }

    fn entry(&self, method: Method) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.method == method)
    }

    fn entry_mut(&mut self, method: Method) -> Option<&mut PlanEntry> {
        self.entries.iter_mut().find(|e| e.method == method)
    }
}

impl Default for PollPlan {
    fn default() -> Self {
        Self::new()
    }
}

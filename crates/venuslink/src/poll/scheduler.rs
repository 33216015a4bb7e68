//! # Poll Scheduler
//!
//! Background loop that keeps the state cache warm. Every tick it asks the
//! [`PollPlan`] which methods are due, spawns one staggered poll task per
//! method, and folds the outcomes back into the plan as they arrive. The
//! plan is owned by the loop alone; poll tasks only talk to it through the
//! event channel.
//!
//! The first cycle after startup runs with a reduced budget so a dead or
//! absent device fails fast instead of holding the first readings hostage
//! for the full retry ladder.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};
use venuslink_wire::Method;

use crate::cache::StateCache;
use crate::config::PollConfig;
use crate::error::VenusError;
use crate::poll::plan::PollPlan;
use crate::rpc::{CallOptions, RpcClient};

/// Outcome of one issued poll, reported back to the scheduler loop.
#[derive(Debug)]
enum PollEvent {
    /// Matching reply received and folded into the cache.
    Success(Method),
    /// Every attempt timed out. Counts toward the unsupported verdict.
    Timeout(Method),
    /// The device answered with an error object. It is alive and the
    /// method exists, so this does not count toward unsupported.
    AnsweredError(Method),
    /// The poll ended without a device verdict (transport torn down,
    /// send failure).
    Aborted(Method),
}

/// Instructions for a running scheduler.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Forget an unsupported verdict and put the method back on the
    /// schedule for its next due tick.
    ResetMethod(Method),
}

/// Controls a running poll loop.
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    updates: watch::Receiver<u64>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Starts polling `rpc`'s device into `cache` and returns the handle.
    pub fn spawn(
        rpc: Arc<RpcClient>,
        cache: Arc<StateCache>,
        config: PollConfig,
        instance_id: u32,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = watch::channel(0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poll_loop = PollLoop {
            rpc,
            cache,
            config,
            instance_id,
            plan: PollPlan::new(),
            commands: command_rx,
            updates: update_tx,
            shutdown: shutdown_rx,
            first_cycle: true,
            version: 0,
        };
        let task = tokio::spawn(poll_loop.run());

        Self {
            commands: command_tx,
            updates: update_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Asks the loop to re-probe a method previously written off as
    /// unsupported.
    pub fn reset_method(&self, method: Method) {
        let _ = self.commands.send(SchedulerCommand::ResetMethod(method));
    }

    /// State version channel. The value increases every time a poll outcome
    /// lands; subscribers re-read the cache snapshot on change.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.clone()
    }

    /// Stops the loop and waits for it to exit. Polls already in flight
    /// resolve against the cache but no new ticks run.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// The loop state. Owned by the spawned task; nothing else sees the plan.
struct PollLoop {
    rpc: Arc<RpcClient>,
    cache: Arc<StateCache>,
    config: PollConfig,
    instance_id: u32,
    plan: PollPlan,
    commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    updates: watch::Sender<u64>,
    shutdown: watch::Receiver<bool>,
    first_cycle: bool,
    version: u64,
}

impl PollLoop {
    async fn run(mut self) {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            peer = %self.rpc.peer(),
            interval_ms = self.config.tick_interval_ms,
            "Poll scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_tick(&event_tx);
                }

                // event_tx lives in self's scope, so recv() never yields None
                // while the loop runs.
                Some(event) = event_rx.recv() => {
                    self.apply_event(event);
                }

                Some(command) = self.commands.recv() => {
                    self.apply_command(command);
                }

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(peer = %self.rpc.peer(), tick = self.plan.tick(), "Poll scheduler stopped");
    }

    /// Advances the plan one tick and spawns a poll task per due method,
    /// spaced out so the datagrams do not land on the device back to back.
    fn run_tick(&mut self, events: &mpsc::UnboundedSender<PollEvent>) {
        let due = self.plan.advance_tick(&self.config);
        debug!(tick = self.plan.tick(), due = due.len(), "Poll tick");

        let options = self.call_options();
        let spacing = self.config.inter_call_delay(self.first_cycle);
        for (index, method) in due.into_iter().enumerate() {
            self.plan.mark_issued(method);
            self.spawn_poll(method, index, options, spacing, events.clone());
        }
        self.first_cycle = false;
    }

    fn call_options(&self) -> CallOptions {
        if self.first_cycle {
            CallOptions {
                timeout: Duration::from_secs(self.config.first_cycle_timeout_secs),
                max_attempts: self.config.first_cycle_attempts,
            }
        } else {
            self.rpc.query_options()
        }
    }

    fn spawn_poll(
        &self,
        method: Method,
        index: usize,
        options: CallOptions,
        spacing: Duration,
        events: mpsc::UnboundedSender<PollEvent>,
    ) {
        let rpc = Arc::clone(&self.rpc);
        let cache = Arc::clone(&self.cache);
        let instance_id = self.instance_id;

        tokio::spawn(async move {
            if index > 0 && !spacing.is_zero() {
                sleep(spacing * index as u32).await;
            }

            let params = method.query_params(instance_id);
            let event = match rpc.call(method.as_str(), params, options).await {
                Ok(result) => {
                    cache.apply_result(method, &result).await;
                    PollEvent::Success(method)
                }
                Err(VenusError::CommandTimeout { .. }) => {
                    cache.mark_failed(method).await;
                    PollEvent::Timeout(method)
                }
                Err(VenusError::TransportClosed) => PollEvent::Aborted(method),
                Err(VenusError::Protocol { reason, .. }) => {
                    debug!(method = %method, reason, "Poll answered with device error");
                    cache.mark_failed(method).await;
                    PollEvent::AnsweredError(method)
                }
                Err(err) => {
                    debug!(method = %method, error = %err, "Poll failed locally");
                    cache.mark_failed(method).await;
                    PollEvent::Aborted(method)
                }
            };
            let _ = events.send(event);
        });
    }

    fn apply_event(&mut self, event: PollEvent) {
        match event {
            PollEvent::Success(method) => self.plan.on_success(method),
            PollEvent::Timeout(method) => {
                if self.plan.on_timeout(method, self.config.unsupported_after) {
                    self.rpc.stats().mark_unsupported(method.as_str());
                    warn!(
                        method = %method,
                        streak = self.config.unsupported_after,
                        "Method never answers, dropping it from the schedule"
                    );
                }
            }
            PollEvent::AnsweredError(method) => self.plan.on_answered_error(method),
            PollEvent::Aborted(method) => self.plan.on_aborted(method),
        }
        self.version += 1;
        let _ = self.updates.send(self.version);
    }

    fn apply_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::ResetMethod(method) => {
                if self.plan.reset_method(method) {
                    self.rpc.stats().reset_support(method.as_str());
                    info!(method = %method, "Re-probing method on its next due tick");
                }
            }
        }
    }
}

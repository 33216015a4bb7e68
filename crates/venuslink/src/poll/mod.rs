//! Tiered background polling.
//!
//! Not every reading ages at the same rate: battery charge moves every few
//! seconds, the firmware version never. Methods are grouped into tiers and
//! each tier refreshes on its own cadence, all derived from one tick
//! counter. The [`plan`] module holds the pure scheduling state; the
//! [`scheduler`] runs it against a live device.

pub mod plan;
pub mod scheduler;

pub use plan::{default_tier, PollPlan, PollTier};
pub use scheduler::{SchedulerCommand, SchedulerHandle};

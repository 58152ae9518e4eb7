//! Tiered deadline scheduler.
//!
//! Work items carry an absolute deadline and a one-shot `execute`. The engine
//! sorts pending items into three tiers by remaining time-to-deadline (fast,
//! slow, snail), re-tiers them toward faster tiers as deadlines approach, and
//! fires due items in parallel on a shared dispatch pool. Each tier drains
//! its inbox at its own cadence, so no pass ever scans the whole pending set.
//! Items only move upward: snail → slow → fast → execution.

pub mod clock;
pub(crate) mod dispatch;
pub mod engine;
pub mod fault;
pub mod item;
pub mod queue;
pub mod tier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    Engine, EngineConfig, EngineStats, StartError, SubmitError, TierStats, GRACE_PERIOD,
    MIN_FREQUENCY,
};
pub use fault::{Fault, FaultStage};
pub use item::{BoxedItem, FnItem, WorkItem};
pub use tier::TierKind;

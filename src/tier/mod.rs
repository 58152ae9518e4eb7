//! Tier state and the shared pass loop.
//!
//! Each tier runs the same skeleton on its own long-lived worker: drain the
//! inbox into a local batch, process the batch in parallel, re-enqueue the
//! spill lists, sleep one cadence, repeat. Only the per-item policy differs:
//! the fast tier fires due items, the slow and snail tiers reclassify toward
//! faster tiers as deadlines draw in. Items never move to a slower tier.

pub(crate) mod fast;
pub(crate) mod slow;
pub(crate) mod snail;

use crate::clock::Clock;
use crate::dispatch::Dispatcher;
use crate::engine::TierStats;
use crate::fault::{panic_message, Fault, FaultRecorder, FaultStage};
use crate::queue::Inbox;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Interval at which a sleeping tier re-checks its exit flags.
const EXIT_POLL: Duration = Duration::from_millis(20);

/// The three deadline tiers, ordered fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    /// Deadline imminent; fires items.
    Fast,
    /// Deadline moderate; promotes to fast.
    Slow,
    /// Deadline distant; promotes to slow or fast.
    Snail,
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TierKind::Fast => "fast",
            TierKind::Slow => "slow",
            TierKind::Snail => "snail",
        };
        write!(f, "{label}")
    }
}

/// State owned by one tier: its inbox, cadence, and counters.
pub(crate) struct Tier {
    pub(crate) kind: TierKind,
    pub(crate) inbox: Arc<Inbox>,
    pub(crate) cadence: Duration,
    want_exit: AtomicBool,
    pub(crate) executed: AtomicU64,
}

impl Tier {
    pub(crate) fn new(kind: TierKind, cadence: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            inbox: Arc::new(Inbox::new()),
            cadence,
            want_exit: AtomicBool::new(false),
            executed: AtomicU64::new(0),
        })
    }

    pub(crate) fn request_exit(&self) {
        self.want_exit.store(true, Ordering::Release);
    }

    pub(crate) fn stats(&self) -> TierStats {
        TierStats {
            queued: self.inbox.len(),
            executed: self.executed.load(Ordering::Relaxed),
        }
    }
}

/// Everything a tier worker needs from the engine, handed over at start.
///
/// Replaces a tier-to-engine back-pointer: workers see the clock, the
/// thresholds, the peer inboxes they promote into, the dispatcher, the fault
/// sink, and the engine-wide shutdown flag, nothing else.
pub(crate) struct TierContext {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) faults: FaultRecorder,
    pub(crate) fast_inbox: Arc<Inbox>,
    pub(crate) slow_inbox: Arc<Inbox>,
    pub(crate) fast_threshold: Duration,
    pub(crate) slow_threshold: Duration,
    pub(crate) shutting_down: Arc<AtomicBool>,
}

/// True when `deadline` falls within `threshold` of `now` (inclusive), or has
/// already passed.
pub(crate) fn within(deadline: Instant, now: Instant, threshold: Duration) -> bool {
    deadline <= now + threshold
}

fn threshold_steps(fast_threshold: Duration, slow_threshold: Duration) -> u32 {
    let fast_ms = fast_threshold.as_millis();
    if fast_ms == 0 {
        return 0;
    }
    let gap_ms = slow_threshold.saturating_sub(fast_threshold).as_millis();
    (gap_ms / fast_ms).min(u128::from(u32::MAX)) as u32
}

/// Slow tier cadence: frequent enough that an item admitted with
/// `remaining > fast_threshold` cannot shrink below the fast threshold
/// between two wakes, clamped to at least one base tick.
pub(crate) fn slow_cadence(
    frequency: Duration,
    fast_threshold: Duration,
    slow_threshold: Duration,
) -> Duration {
    frequency
        .saturating_mul(threshold_steps(fast_threshold, slow_threshold))
        .max(frequency)
}

/// Snail tier cadence: a few ticks lazier than the slow tier, since its items
/// are far from firing.
pub(crate) fn snail_cadence(
    frequency: Duration,
    fast_threshold: Duration,
    slow_threshold: Duration,
) -> Duration {
    frequency
        .saturating_mul(threshold_steps(fast_threshold, slow_threshold).saturating_add(3))
        .max(frequency)
}

pub(crate) fn exiting(tier: &Tier, ctx: &TierContext) -> bool {
    tier.want_exit.load(Ordering::Acquire) || ctx.shutting_down.load(Ordering::Acquire)
}

/// Worker entry point: one pass per cadence interval until exit is requested.
pub(crate) fn run(tier: Arc<Tier>, ctx: TierContext) {
    debug!(
        tier = %tier.kind,
        cadence_ms = tier.cadence.as_millis() as u64,
        "tier worker started"
    );

    loop {
        if exiting(&tier, &ctx) {
            break;
        }
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| run_pass(&tier, &ctx))) {
            ctx.faults.record(Fault::new(
                Some(tier.kind),
                FaultStage::Loop,
                panic_message(panic.as_ref()),
            ));
        }
        sleep_cadence(&tier, &ctx);
    }

    debug!(tier = %tier.kind, "tier worker exiting");
}

fn run_pass(tier: &Arc<Tier>, ctx: &TierContext) {
    let batch = tier.inbox.drain_all();
    trace!(tier = %tier.kind, batch = batch.len(), "pass");
    if batch.is_empty() {
        return;
    }
    match tier.kind {
        TierKind::Fast => fast::process(tier, ctx, batch),
        TierKind::Slow => slow::process(tier, ctx, batch),
        TierKind::Snail => snail::process(tier, ctx, batch),
    }
}

/// Sleep one cadence in bounded slices so `stop` is observed promptly even on
/// long snail cadences.
fn sleep_cadence(tier: &Tier, ctx: &TierContext) {
    let wake_at = Instant::now() + tier.cadence;
    loop {
        if exiting(tier, ctx) {
            return;
        }
        let now = Instant::now();
        if now >= wake_at {
            return;
        }
        thread::sleep((wake_at - now).min(EXIT_POLL));
    }
}

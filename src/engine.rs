//! Engine lifecycle, submission routing, and statistics.
//!
//! The engine owns the three tiers, the dispatch pool, and the fault sink.
//! `start` validates the configuration and launches one long-lived worker per
//! tier; `submit` classifies an item by remaining time-to-deadline and
//! appends it to the matching tier's inbox; `stop` requests cooperative exit
//! and waits out a bounded grace period.

use crate::clock::{Clock, SystemClock};
use crate::dispatch::Dispatcher;
use crate::fault::{panic_message, Fault, FaultSink, FaultStage};
use crate::item::{BoxedItem, WorkItem};
use crate::tier::{self, slow_cadence, snail_cadence, within, Tier, TierKind};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Smallest accepted base tick.
pub const MIN_FREQUENCY: Duration = Duration::from_millis(1);

/// How long `stop` waits for each tier worker before detaching it.
pub const GRACE_PERIOD: Duration = Duration::from_secs(20);

/// Engine configuration, validated at [`Engine::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base tick; the fast tier drains at exactly this cadence.
    pub frequency: Duration,
    /// Items within this much of their deadline route to the fast tier.
    pub fast_threshold: Duration,
    /// Items within this much route to the slow tier; beyond it, snail.
    pub slow_threshold: Duration,
}

impl EngineConfig {
    pub fn new(frequency: Duration, fast_threshold: Duration, slow_threshold: Duration) -> Self {
        Self {
            frequency,
            fast_threshold,
            slow_threshold,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frequency: Duration::from_millis(50),
            fast_threshold: Duration::from_millis(500),
            slow_threshold: Duration::from_secs(2),
        }
    }
}

/// Rejections surfaced synchronously by [`Engine::start`].
#[derive(Debug, Error)]
pub enum StartError {
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("frequency must be at least 1ms, got {0:?}")]
    FrequencyTooLow(Duration),
    #[error("fast threshold ({fast:?}) must be below slow threshold ({slow:?})")]
    ThresholdOrder { fast: Duration, slow: Duration },
    #[error("failed to build dispatch pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to spawn {tier} tier worker: {source}")]
    Spawn { tier: TierKind, source: io::Error },
}

/// Rejections surfaced synchronously by [`Engine::submit`].
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("engine is not running")]
    NotRunning,
}

/// Point-in-time counters for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    /// Items currently resident in the tier's inbox.
    pub queued: usize,
    /// Execution attempts made by the tier since start.
    pub executed: u64,
}

/// Per-tier statistics snapshot for operational introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub fast: TierStats,
    pub slow: TierStats,
    pub snail: TierStats,
}

/// Everything that exists only while the engine runs.
struct Started {
    config: EngineConfig,
    fast: Arc<Tier>,
    slow: Arc<Tier>,
    snail: Arc<Tier>,
    shutting_down: Arc<AtomicBool>,
    workers: Mutex<Vec<(TierKind, JoinHandle<()>)>>,
}

/// Tiered deadline scheduler engine.
///
/// Construct once, `start` with a validated configuration, `submit` from any
/// number of producer threads, and `stop` to tear the tier workers down. The
/// engine is restartable after `stop`; counters reset on each start.
pub struct Engine {
    clock: Arc<dyn Clock>,
    faults: FaultSink,
    running: AtomicBool,
    started: RwLock<Option<Started>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Build an engine reading time from `clock` instead of the system clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            faults: FaultSink::new(),
            running: AtomicBool::new(false),
            started: RwLock::new(None),
        }
    }

    /// Record configuration, derive tier cadences, and launch one worker per
    /// tier plus the shared dispatch pool.
    pub fn start(&self, config: EngineConfig) -> Result<(), StartError> {
        let mut slot = self.started.write();
        if self.running.load(Ordering::Acquire) {
            return Err(StartError::AlreadyRunning);
        }
        if config.frequency < MIN_FREQUENCY {
            return Err(StartError::FrequencyTooLow(config.frequency));
        }
        if config.fast_threshold >= config.slow_threshold {
            return Err(StartError::ThresholdOrder {
                fast: config.fast_threshold,
                slow: config.slow_threshold,
            });
        }

        // 0 == one pool worker per available core.
        let dispatcher = Arc::new(Dispatcher::new(0)?);
        let shutting_down = Arc::new(AtomicBool::new(false));

        let fast = Tier::new(TierKind::Fast, config.frequency);
        let slow = Tier::new(
            TierKind::Slow,
            slow_cadence(config.frequency, config.fast_threshold, config.slow_threshold),
        );
        let snail = Tier::new(
            TierKind::Snail,
            snail_cadence(config.frequency, config.fast_threshold, config.slow_threshold),
        );

        let mut workers: Vec<(TierKind, JoinHandle<()>)> = Vec::with_capacity(3);
        for tier_ref in [&fast, &slow, &snail] {
            let ctx = tier::TierContext {
                clock: self.clock.clone(),
                dispatcher: dispatcher.clone(),
                faults: self.faults.recorder(),
                fast_inbox: fast.inbox.clone(),
                slow_inbox: slow.inbox.clone(),
                fast_threshold: config.fast_threshold,
                slow_threshold: config.slow_threshold,
                shutting_down: shutting_down.clone(),
            };
            let worker = thread::Builder::new()
                .name(format!("tier-{}", tier_ref.kind))
                .spawn({
                    let tier = Arc::clone(tier_ref);
                    move || tier::run(tier, ctx)
                });
            match worker {
                Ok(handle) => workers.push((tier_ref.kind, handle)),
                Err(source) => {
                    // Unwind the workers that did launch.
                    shutting_down.store(true, Ordering::Release);
                    for (_, handle) in workers {
                        let _ = handle.join();
                    }
                    return Err(StartError::Spawn {
                        tier: tier_ref.kind,
                        source,
                    });
                }
            }
        }

        debug!(
            frequency_ms = config.frequency.as_millis() as u64,
            slow_cadence_ms = slow.cadence.as_millis() as u64,
            snail_cadence_ms = snail.cadence.as_millis() as u64,
            "engine started"
        );
        *slot = Some(Started {
            config,
            fast,
            slow,
            snail,
            shutting_down,
            workers: Mutex::new(workers),
        });
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Request cooperative exit from every tier worker and wait out the grace
    /// period. Idempotent; always leaves the engine not running.
    pub fn stop(&self) {
        let workers: Vec<(TierKind, JoinHandle<()>)>;
        {
            let guard = self.started.read();
            let Some(started) = guard.as_ref() else {
                self.running.store(false, Ordering::Release);
                return;
            };
            if !self.running.swap(false, Ordering::AcqRel) {
                return;
            }
            debug!("engine stopping");
            started.shutting_down.store(true, Ordering::Release);
            for tier in [&started.fast, &started.slow, &started.snail] {
                tier.request_exit();
            }
            workers = started.workers.lock().drain(..).collect();
        }

        // Join outside the lock so producers draining faults or reading
        // statistics are not blocked on the grace period.
        let grace_deadline = Instant::now() + GRACE_PERIOD;
        for (kind, handle) in workers {
            while !handle.is_finished() && Instant::now() < grace_deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                if let Err(panic) = handle.join() {
                    self.faults.record(Fault::new(
                        Some(kind),
                        FaultStage::Teardown,
                        panic_message(panic.as_ref()),
                    ));
                }
            } else {
                warn!(tier = %kind, "worker exceeded the grace period, detaching");
                self.faults.record(Fault::new(
                    Some(kind),
                    FaultStage::Teardown,
                    format!("worker did not exit within {GRACE_PERIOD:?}; detached"),
                ));
            }
        }
        debug!("engine stopped");
    }

    /// Classify `item` by remaining time-to-deadline and append it to the
    /// matching tier's inbox.
    ///
    /// Items whose deadline already passed route to the fast tier and fire on
    /// its next pass. A panic out of the payload's `deadline()` is recorded
    /// on the fault sink and the item is dropped.
    pub fn submit<W: WorkItem>(&self, item: W) -> Result<(), SubmitError> {
        self.submit_boxed(Box::new(item))
    }

    pub fn submit_boxed(&self, item: BoxedItem) -> Result<(), SubmitError> {
        if !self.running.load(Ordering::Acquire) {
            return Err(SubmitError::NotRunning);
        }
        let guard = self.started.read();
        let Some(started) = guard.as_ref() else {
            return Err(SubmitError::NotRunning);
        };

        let deadline = match catch_unwind(AssertUnwindSafe(|| item.deadline())) {
            Ok(deadline) => deadline,
            Err(panic) => {
                self.faults.record(Fault::new(
                    None,
                    FaultStage::Classify,
                    panic_message(panic.as_ref()),
                ));
                return Ok(());
            }
        };

        let now = self.clock.now();
        let kind = classify(
            deadline,
            now,
            started.config.fast_threshold,
            started.config.slow_threshold,
        );
        let target = match kind {
            TierKind::Fast => &started.fast,
            TierKind::Slow => &started.slow,
            TierKind::Snail => &started.snail,
        };
        target.inbox.push(item);
        trace!(tier = %kind, "item submitted");
        Ok(())
    }

    /// Return and clear the fault sink.
    pub fn drain_faults(&self) -> Vec<Fault> {
        self.faults.drain()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Per-tier queue depths and execution counts.
    ///
    /// Counters survive `stop` until the next `start`.
    pub fn statistics(&self) -> EngineStats {
        let guard = self.started.read();
        match guard.as_ref() {
            Some(started) => EngineStats {
                fast: started.fast.stats(),
                slow: started.slow.stats(),
                snail: started.snail.stats(),
            },
            None => EngineStats::default(),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Signal exit without waiting out the grace period; dropping the
        // handles detaches any worker still mid-pass.
        if self.running.swap(false, Ordering::AcqRel) {
            if let Some(started) = self.started.get_mut() {
                started.shutting_down.store(true, Ordering::Release);
                for tier in [&started.fast, &started.slow, &started.snail] {
                    tier.request_exit();
                }
            }
        }
    }
}

/// Route a deadline to a tier: boundaries are inclusive toward the faster
/// tier, and past deadlines are fast by construction.
pub(crate) fn classify(
    deadline: Instant,
    now: Instant,
    fast_threshold: Duration,
    slow_threshold: Duration,
) -> TierKind {
    if within(deadline, now, fast_threshold) {
        TierKind::Fast
    } else if within(deadline, now, slow_threshold) {
        TierKind::Slow
    } else {
        TierKind::Snail
    }
}

//! Parallel fan-out over a working batch.
//!
//! Each tier pass hands its drained batch to the dispatcher, which runs the
//! per-item action (fire for the fast tier, reclassify for the others) on a
//! shared rayon pool sized to the machine. Actions are independent: no
//! ordering across elements, and a panic in one action never cancels its
//! peers or the calling tier loop.

use crate::fault::{panic_message, Fault, FaultRecorder, FaultStage};
use crate::tier::TierKind;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Shared worker pool used by all three tier loops.
pub struct Dispatcher {
    pool: ThreadPool,
}

impl Dispatcher {
    /// Build the pool. `threads == 0` uses the rayon default of one worker
    /// per available core.
    pub fn new(threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("dispatch-{index}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Run `action` over every element of `batch` and wait for the whole
    /// batch to complete.
    ///
    /// A panic raised by an action is caught here and recorded on the fault
    /// sink, attributed to `tier` and `stage`.
    pub(crate) fn run_batch<T, F>(
        &self,
        tier: TierKind,
        stage: FaultStage,
        batch: Vec<T>,
        faults: &FaultRecorder,
        action: F,
    ) where
        T: Send,
        F: Fn(T) + Sync,
    {
        if batch.is_empty() {
            return;
        }
        let action = &action;
        self.pool.scope(|scope| {
            for item in batch {
                scope.spawn(move |_| {
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| action(item))) {
                        faults.record(Fault::new(
                            Some(tier),
                            stage,
                            panic_message(panic.as_ref()),
                        ));
                    }
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultSink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_element_is_visited() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let sink = FaultSink::new();
        let visited = AtomicUsize::new(0);

        dispatcher.run_batch(
            TierKind::Fast,
            FaultStage::Execute,
            (0..64).collect::<Vec<u32>>(),
            &sink.recorder(),
            |_| {
                visited.fetch_add(1, Ordering::Relaxed);
            },
        );

        assert_eq!(visited.load(Ordering::Relaxed), 64);
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn a_panicking_action_does_not_cancel_peers() {
        let dispatcher = Dispatcher::new(2).unwrap();
        let sink = FaultSink::new();
        let completed = AtomicUsize::new(0);

        dispatcher.run_batch(
            TierKind::Slow,
            FaultStage::Reclassify,
            (0..10).collect::<Vec<u32>>(),
            &sink.recorder(),
            |value| {
                if value % 2 == 0 {
                    panic!("bad element {value}");
                }
                completed.fetch_add(1, Ordering::Relaxed);
            },
        );

        assert_eq!(completed.load(Ordering::Relaxed), 5);
        let faults = sink.drain();
        assert_eq!(faults.len(), 5);
        assert!(faults
            .iter()
            .all(|fault| fault.tier == Some(TierKind::Slow)
                && fault.stage == FaultStage::Reclassify));
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let dispatcher = Dispatcher::new(1).unwrap();
        let sink = FaultSink::new();
        dispatcher.run_batch(
            TierKind::Snail,
            FaultStage::Reclassify,
            Vec::<u32>::new(),
            &sink.recorder(),
            |_| panic!("must not run"),
        );
        assert!(sink.drain().is_empty());
    }
}

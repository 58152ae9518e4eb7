//! Fault descriptors and the engine's fault sink.
//!
//! All asynchronous failures funnel here: panics out of work-item payloads,
//! reclassification, loop bodies, and teardown. The engine never crashes the
//! host on its own; the host drains the sink on its own cadence.

use crate::tier::TierKind;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::any::Any;
use std::fmt;
use tracing::warn;

/// Where in the engine a fault was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStage {
    /// Submission-time classification of an item.
    Classify,
    /// A work item's `execute` invocation.
    Execute,
    /// Re-tiering of an item during a slow or snail pass.
    Reclassify,
    /// A tier loop body outside any per-item action.
    Loop,
    /// Joining tier workers during `stop`.
    Teardown,
}

impl fmt::Display for FaultStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FaultStage::Classify => "classify",
            FaultStage::Execute => "execute",
            FaultStage::Reclassify => "reclassify",
            FaultStage::Loop => "loop",
            FaultStage::Teardown => "teardown",
        };
        write!(f, "{label}")
    }
}

/// Descriptor of an asynchronous failure captured by the engine.
#[derive(Debug, Clone)]
pub struct Fault {
    /// Tier the fault was observed on, when attributable to one.
    pub tier: Option<TierKind>,
    /// Stage of processing that produced the fault.
    pub stage: FaultStage,
    /// Rendered panic payload or error description.
    pub message: String,
}

impl Fault {
    pub(crate) fn new(tier: Option<TierKind>, stage: FaultStage, message: String) -> Self {
        Self {
            tier,
            stage,
            message,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tier {
            Some(tier) => write!(f, "[{tier}/{}] {}", self.stage, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// Write handle handed to tier workers and the dispatcher.
#[derive(Clone)]
pub(crate) struct FaultRecorder {
    tx: Sender<Fault>,
}

impl FaultRecorder {
    pub(crate) fn record(&self, fault: Fault) {
        warn!(fault = %fault, "fault recorded");
        let _ = self.tx.send(fault);
    }
}

/// Unbounded FIFO of faults: many writers, one reader (the host).
pub(crate) struct FaultSink {
    tx: Sender<Fault>,
    rx: Receiver<Fault>,
}

impl FaultSink {
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub(crate) fn recorder(&self) -> FaultRecorder {
        FaultRecorder {
            tx: self.tx.clone(),
        }
    }

    pub(crate) fn record(&self, fault: Fault) {
        self.recorder().record(fault);
    }

    /// Return and clear everything recorded so far.
    pub(crate) fn drain(&self) -> Vec<Fault> {
        let mut drained = Vec::new();
        while let Ok(fault) = self.rx.try_recv() {
            drained.push(fault);
        }
        drained
    }
}

/// Render a caught panic payload for fault reporting.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

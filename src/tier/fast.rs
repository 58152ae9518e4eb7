//! Imminent tier: fires items whose deadlines have arrived.
//!
//! Items here are by construction within one fast threshold of firing, so the
//! pass never reclassifies. Due items execute on the dispatch pool; the rest
//! go straight back onto the fast inbox for the next pass.

use super::{exiting, Tier, TierContext};
use crate::clock::Clock;
use crate::fault::FaultStage;
use crate::item::BoxedItem;
use crate::queue::SpillList;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::debug;

pub(crate) fn process(tier: &Arc<Tier>, ctx: &TierContext, batch: Vec<BoxedItem>) {
    // One captured now for the whole batch.
    let now = ctx.clock.now();
    let readd: SpillList<BoxedItem> = SpillList::new();

    ctx.dispatcher.run_batch(
        tier.kind,
        FaultStage::Execute,
        batch,
        &ctx.faults,
        |item| {
            if item.deadline() > now {
                readd.push(item);
            } else {
                // Counted as an attempt before invocation so a panicking
                // payload still registers exactly once.
                tier.executed.fetch_add(1, Ordering::Relaxed);
                item.execute();
            }
        },
    );

    let kept = readd.take();
    if exiting(tier, ctx) {
        if !kept.is_empty() {
            debug!(tier = %tier.kind, dropped = kept.len(), "discarding unfired items on shutdown");
        }
        return;
    }
    tier.inbox.push_bulk(kept);
}

//! Moderate tier: promotes items toward the fast tier as deadlines draw in.
//!
//! Never executes anything itself. An item whose remaining time has somehow
//! grown past the slow threshold stays here; demotion to snail does not
//! exist.

use super::{exiting, within, Tier, TierContext};
use crate::clock::Clock;
use crate::fault::FaultStage;
use crate::item::BoxedItem;
use crate::queue::SpillList;
use std::sync::Arc;
use tracing::debug;

pub(crate) fn process(tier: &Arc<Tier>, ctx: &TierContext, batch: Vec<BoxedItem>) {
    let now = ctx.clock.now();
    let promote: SpillList<BoxedItem> = SpillList::new();
    let keep: SpillList<BoxedItem> = SpillList::new();

    ctx.dispatcher.run_batch(
        tier.kind,
        FaultStage::Reclassify,
        batch,
        &ctx.faults,
        |item| {
            if within(item.deadline(), now, ctx.fast_threshold) {
                promote.push(item);
            } else {
                keep.push(item);
            }
        },
    );

    if exiting(tier, ctx) {
        let dropped = promote.len() + keep.len();
        if dropped > 0 {
            debug!(tier = %tier.kind, dropped, "discarding pending items on shutdown");
        }
        return;
    }
    ctx.fast_inbox.push_bulk(promote.take());
    tier.inbox.push_bulk(keep.take());
}

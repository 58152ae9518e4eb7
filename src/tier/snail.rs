//! Long-horizon tier: reclassifies into fast, slow, or back to itself.

use super::{exiting, within, Tier, TierContext};
use crate::clock::Clock;
use crate::fault::FaultStage;
use crate::item::BoxedItem;
use crate::queue::SpillList;
use std::sync::Arc;
use tracing::debug;

pub(crate) fn process(tier: &Arc<Tier>, ctx: &TierContext, batch: Vec<BoxedItem>) {
    let now = ctx.clock.now();
    let to_fast: SpillList<BoxedItem> = SpillList::new();
    let to_slow: SpillList<BoxedItem> = SpillList::new();
    let keep: SpillList<BoxedItem> = SpillList::new();

    ctx.dispatcher.run_batch(
        tier.kind,
        FaultStage::Reclassify,
        batch,
        &ctx.faults,
        |item| {
            let deadline = item.deadline();
            if within(deadline, now, ctx.fast_threshold) {
                to_fast.push(item);
            } else if within(deadline, now, ctx.slow_threshold) {
                to_slow.push(item);
            } else {
                keep.push(item);
            }
        },
    );

    if exiting(tier, ctx) {
        let dropped = to_fast.len() + to_slow.len() + keep.len();
        if dropped > 0 {
            debug!(tier = %tier.kind, dropped, "discarding pending items on shutdown");
        }
        return;
    }
    ctx.fast_inbox.push_bulk(to_fast.take());
    ctx.slow_inbox.push_bulk(to_slow.take());
    tier.inbox.push_bulk(keep.take());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::FnItem;
    use crate::tier::tests::TierHarness;
    use std::time::Duration;

    fn item_due_in(harness: &TierHarness, offset: Duration) -> BoxedItem {
        Box::new(FnItem::new(harness.clock.now() + offset, || {}))
    }

    #[test]
    fn splits_a_batch_three_ways() {
        let harness = TierHarness::new(Duration::from_millis(500), Duration::from_secs(2));
        let ctx = harness.context();

        let imminent = item_due_in(&harness, Duration::from_millis(300));
        let moderate = item_due_in(&harness, Duration::from_millis(1800));
        let at_slow_edge = item_due_in(&harness, Duration::from_secs(2));
        let distant = item_due_in(&harness, Duration::from_secs(30));
        process(
            &harness.snail,
            &ctx,
            vec![imminent, moderate, at_slow_edge, distant],
        );

        assert_eq!(harness.fast.inbox.len(), 1);
        assert_eq!(harness.slow.inbox.len(), 2);
        assert_eq!(harness.snail.inbox.len(), 1);
    }

    #[test]
    fn distant_items_circulate_until_the_clock_catches_up() {
        let harness = TierHarness::new(Duration::from_millis(500), Duration::from_secs(2));
        let ctx = harness.context();

        let item = item_due_in(&harness, Duration::from_secs(10));
        process(&harness.snail, &ctx, vec![item]);
        assert_eq!(harness.snail.inbox.len(), 1);

        // 1s remaining: past the slow threshold gate, not yet fast.
        harness.clock.advance(Duration::from_secs(9));
        let batch = harness.snail.inbox.drain_all();
        process(&harness.snail, &ctx, batch);
        assert!(harness.snail.inbox.is_empty());
        assert_eq!(harness.fast.inbox.len(), 0);
        assert_eq!(harness.slow.inbox.len(), 1);
    }

    #[test]
    fn exit_skips_requeue() {
        let harness = TierHarness::new(Duration::from_millis(500), Duration::from_secs(2));
        let ctx = harness.context();

        let item = item_due_in(&harness, Duration::from_secs(30));
        harness.snail.request_exit();
        process(&harness.snail, &ctx, vec![item]);
        assert!(harness.snail.inbox.is_empty());
    }
}

//! Concurrent containers backing the tiers.
//!
//! [`Inbox`] is the many-producer / single-drainer FIFO each tier owns; the
//! tier's loop bulk-takes everything queued at the start of a pass.
//! [`SpillList`] is the locked list a pass accumulates its re-tiering
//! decisions into while the batch is fanned out across pool workers.

use crate::item::BoxedItem;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Unbounded FIFO of pending work items with a live depth counter.
///
/// Any thread may push; the owning tier's loop is the sole drainer. The depth
/// counter is incremented before the matching send completes, so a drain never
/// observes more items than the counter accounts for.
pub struct Inbox {
    tx: Sender<BoxedItem>,
    rx: Receiver<BoxedItem>,
    depth: AtomicUsize,
}

impl Inbox {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            depth: AtomicUsize::new(0),
        }
    }

    /// Append a single item.
    pub fn push(&self, item: BoxedItem) {
        self.depth.fetch_add(1, Ordering::Release);
        self.tx
            .send(item)
            .expect("inbox receiver lives as long as the inbox");
    }

    /// Append a batch of items.
    pub fn push_bulk(&self, items: Vec<BoxedItem>) {
        for item in items {
            self.push(item);
        }
    }

    /// Move everything currently queued into a local batch.
    ///
    /// Observes every append completed before the call began. Items pushed
    /// while the drain is in progress may land in this batch or the next.
    pub fn drain_all(&self) -> Vec<BoxedItem> {
        let mut batch = Vec::with_capacity(self.depth.load(Ordering::Acquire));
        while let Ok(item) = self.rx.try_recv() {
            batch.push(item);
        }
        if !batch.is_empty() {
            self.depth.fetch_sub(batch.len(), Ordering::AcqRel);
        }
        batch
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Locked list used for per-pass spill buffers.
///
/// Pool workers append concurrently during batch processing; the tier loop
/// takes the accumulated contents once the whole batch has completed.
pub struct SpillList<T> {
    items: Mutex<Vec<T>>,
}

impl<T> SpillList<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, item: T) {
        self.items.lock().push(item);
    }

    /// Take the accumulated items, leaving the list empty.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SpillList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::FnItem;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn noop_item() -> BoxedItem {
        Box::new(FnItem::new(Instant::now(), || {}))
    }

    #[test]
    fn inbox_counts_and_drains() {
        let inbox = Inbox::new();
        assert!(inbox.is_empty());

        inbox.push(noop_item());
        inbox.push(noop_item());
        assert_eq!(inbox.len(), 2);

        let batch = inbox.drain_all();
        assert_eq!(batch.len(), 2);
        assert!(inbox.is_empty());
        assert!(inbox.drain_all().is_empty());
    }

    #[test]
    fn inbox_bulk_push_preserves_count() {
        let inbox = Inbox::new();
        inbox.push_bulk((0..5).map(|_| noop_item()).collect());
        assert_eq!(inbox.len(), 5);
        assert_eq!(inbox.drain_all().len(), 5);
    }

    #[test]
    fn inbox_accepts_concurrent_producers() {
        let inbox = Arc::new(Inbox::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let inbox = inbox.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    inbox.push(noop_item());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut total = 0;
        while total < 400 {
            total += inbox.drain_all().len();
        }
        assert_eq!(total, 400);
        assert!(inbox.is_empty());
    }

    #[test]
    fn spill_list_takes_everything() {
        let spill = SpillList::new();
        spill.push(1u32);
        spill.push(2);
        assert_eq!(spill.len(), 2);

        let taken = spill.take();
        assert_eq!(taken, vec![1, 2]);
        assert!(spill.is_empty());
        assert!(spill.take().is_empty());
    }
}

//! Work item contract shared by the engine and all tiers.

use std::time::Instant;

/// A deferred unit of work: an absolute deadline plus a one-shot effect.
///
/// The engine reads [`deadline`](WorkItem::deadline) to route and re-tier the
/// item and otherwise treats the payload opaquely. [`execute`](WorkItem::execute)
/// consumes the box, so an item can only ever fire once. It is invoked from a
/// dispatch-pool worker; payloads are responsible for their own internal
/// thread safety.
pub trait WorkItem: Send + 'static {
    /// Absolute instant at or after which the item becomes eligible to fire.
    fn deadline(&self) -> Instant;

    /// Perform the work. Invoked exactly once, on or after the deadline.
    fn execute(self: Box<Self>);
}

/// Boxed trait-object form items travel in between tiers.
pub type BoxedItem = Box<dyn WorkItem>;

/// Adapter turning a closure into a work item.
pub struct FnItem<F> {
    deadline: Instant,
    action: F,
}

impl<F> FnItem<F>
where
    F: FnOnce() + Send + 'static,
{
    /// Wrap `action` so it fires at or after `deadline`.
    pub fn new(deadline: Instant, action: F) -> Self {
        Self { deadline, action }
    }
}

impl<F> WorkItem for FnItem<F>
where
    F: FnOnce() + Send + 'static,
{
    fn deadline(&self) -> Instant {
        self.deadline
    }

    fn execute(self: Box<Self>) {
        (self.action)()
    }
}

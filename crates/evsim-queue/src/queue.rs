//! The `EventQueue` trait and the `QueueKind` selector.

use std::fmt;
use std::hash::Hash;

use evsim_core::Tick;

use crate::{HashedBucketQueue, HeapQueue, SortedBucketQueue, TieredQueue};

/// Bound satisfied by every type that can be stored in an [`EventQueue`].
///
/// Queues identify events by equality only; `Hash` lets the bucket and
/// tiered algorithms index them, and `Clone` lets them keep the event in both
/// the index and the ordering structure.
pub trait QueueItem: Clone + Eq + Hash + Send + 'static {}

impl<T: Clone + Eq + Hash + Send + 'static> QueueItem for T {}

/// A timestamp-ordered container mapping each distinct event to one [`Tick`].
///
/// The trait is object-safe so simulators and agents can hold a
/// `Box<dyn EventQueue<E>>` chosen at runtime via [`QueueKind`].
///
/// # Contract
///
/// - `enqueue` of an event already present replaces its timestamp; it never
///   creates a second entry.
/// - All reads of an empty queue return `None`.
/// - No ordering is defined among events sharing a timestamp.
pub trait EventQueue<E: QueueItem>: Send {
    /// Register `event` at `time`, overwriting any previous timestamp.
    fn enqueue(&mut self, event: E, time: Tick);

    /// Remove `event`, returning the timestamp it was registered at.
    fn dequeue_event(&mut self, event: &E) -> Option<Tick>;

    /// Timestamp currently registered for `event`.
    fn time_of(&self, event: &E) -> Option<Tick>;

    /// Smallest timestamp currently present.
    fn min_time(&self) -> Option<Tick>;

    /// Remove and return one event at the minimum timestamp.
    fn dequeue(&mut self) -> Option<(E, Tick)>;

    /// Remove and return every event at the minimum timestamp.
    fn dequeue_all(&mut self) -> Option<(Tick, Vec<E>)>;

    /// Remove and return every event registered at exactly `time`.
    ///
    /// Returns an empty `Vec` if there are none.
    fn dequeue_all_at(&mut self, time: Tick) -> Vec<E>;

    /// Number of events currently registered.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, event: &E) -> bool {
        self.time_of(event).is_some()
    }

    /// Remove every event.
    fn clear(&mut self);

    /// Short algorithm name for logs.
    fn name(&self) -> &'static str;
}

// ── QueueKind ─────────────────────────────────────────────────────────────────

/// Runtime selector for an [`EventQueue`] implementation.
///
/// Configurations carry a `QueueKind` rather than a queue so they stay
/// `Copy` and (with the `serde` feature) serializable.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QueueKind {
    /// [`HeapQueue`].
    #[default]
    Heap,
    /// [`SortedBucketQueue`].
    SortedBucket,
    /// [`HashedBucketQueue`].
    HashedBucket,
    /// [`TieredQueue`].
    Tiered,
}

impl QueueKind {
    /// Build an empty queue of this kind.
    pub fn build<E: QueueItem>(self) -> Box<dyn EventQueue<E>> {
        match self {
            QueueKind::Heap         => Box::new(HeapQueue::new()),
            QueueKind::SortedBucket => Box::new(SortedBucketQueue::new()),
            QueueKind::HashedBucket => Box::new(HashedBucketQueue::new()),
            QueueKind::Tiered       => Box::new(TieredQueue::new()),
        }
    }

    pub const ALL: [QueueKind; 4] = [
        QueueKind::Heap,
        QueueKind::SortedBucket,
        QueueKind::HashedBucket,
        QueueKind::Tiered,
    ];
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueueKind::Heap         => "heap",
            QueueKind::SortedBucket => "sorted-bucket",
            QueueKind::HashedBucket => "hashed-bucket",
            QueueKind::Tiered       => "tiered",
        };
        f.write_str(s)
    }
}

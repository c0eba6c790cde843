//! `BucketQueue`: time → bucket-of-events map.
//!
//! # Why this exists
//!
//! In synchronous models most events share a handful of exact timestamps
//! (every cell of an automaton fires at `t`, `t+1`, …).  A heap pays
//! O(log n) per event to order entries that are all equal.  Grouping events
//! into one bucket per distinct tick makes the per-event cost independent of
//! how many events share that tick: ordering work is O(log B) where B is the
//! number of distinct ticks, and `dequeue_all` hands back a whole bucket at
//! once.
//!
//! # Two key maps
//!
//! - [`SortedBucketQueue`] keeps buckets in a `BTreeMap`; min lookup is the
//!   first key.
//! - [`HashedBucketQueue`] keeps buckets in an `FxHashMap` for O(1)
//!   amortized enqueue and tracks the minimum with a lazily-cleaned heap of
//!   bucket keys.
//!
//! An event index (`event → (tick, slot in bucket)`) makes re-enqueue and
//! arbitrary removal O(1) inside a bucket via `swap_remove`.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use evsim_core::Tick;
use rustc_hash::FxHashMap;

use crate::{EventQueue, QueueItem};

// ── Key maps ──────────────────────────────────────────────────────────────────

/// Ordered-enough map from [`Tick`] to a bucket.
///
/// The trait is sealed (only implementable inside this crate) via the private
/// `Sealed` supertrait; `min_key` must always name a live bucket, and
/// external implementations could silently break that.
pub trait TickMap<V: Default>: Default + Send + sealed::Sealed {
    fn get_mut(&mut self, tick: &Tick) -> Option<&mut V>;

    /// Bucket at `tick`, creating an empty one if needed.
    fn get_or_insert(&mut self, tick: Tick) -> &mut V;

    fn remove(&mut self, tick: &Tick) -> Option<V>;

    /// Smallest key with a bucket.
    fn min_key(&self) -> Option<Tick>;

    /// Number of distinct keys.
    fn key_count(&self) -> usize;

    fn clear(&mut self);
}

mod sealed {
    pub trait Sealed {}
}

impl<V: Send> sealed::Sealed for BTreeMap<Tick, V> {}

impl<V: Default + Send> TickMap<V> for BTreeMap<Tick, V> {
    #[inline]
    fn get_mut(&mut self, tick: &Tick) -> Option<&mut V> {
        BTreeMap::get_mut(self, tick)
    }

    #[inline]
    fn get_or_insert(&mut self, tick: Tick) -> &mut V {
        self.entry(tick).or_default()
    }

    #[inline]
    fn remove(&mut self, tick: &Tick) -> Option<V> {
        BTreeMap::remove(self, tick)
    }

    #[inline]
    fn min_key(&self) -> Option<Tick> {
        self.keys().next().copied()
    }

    fn key_count(&self) -> usize {
        self.len()
    }

    fn clear(&mut self) {
        BTreeMap::clear(self);
    }
}

/// Hash map of buckets plus a min-heap of their keys.
///
/// Removing a bucket leaves its key in the heap; stale keys are popped as
/// soon as they reach the top, so `min_key` is always a live bucket.  Keys
/// buried under a live minimum are swept by rebuilding the heap once they
/// outnumber the live ones.
pub struct HashedTicks<V> {
    map:  FxHashMap<Tick, V>,
    keys: BinaryHeap<Reverse<Tick>>,
}

impl<V> Default for HashedTicks<V> {
    fn default() -> Self {
        Self {
            map:  FxHashMap::default(),
            keys: BinaryHeap::new(),
        }
    }
}

/// Stale keys tolerated beyond one per live bucket before a rebuild.
const STALE_KEY_SLACK: usize = 32;

impl<V> HashedTicks<V> {
    fn drop_stale_keys(&mut self) {
        while let Some(Reverse(top)) = self.keys.peek() {
            if self.map.contains_key(top) {
                break;
            }
            self.keys.pop();
        }
        if self.keys.len() > 2 * self.map.len() + STALE_KEY_SLACK {
            self.keys = self.map.keys().map(|&t| Reverse(t)).collect();
        }
    }

    #[cfg(test)]
    pub(crate) fn heap_len(&self) -> usize {
        self.keys.len()
    }
}

impl<V: Send> sealed::Sealed for HashedTicks<V> {}

impl<V: Default + Send> TickMap<V> for HashedTicks<V> {
    #[inline]
    fn get_mut(&mut self, tick: &Tick) -> Option<&mut V> {
        self.map.get_mut(tick)
    }

    fn get_or_insert(&mut self, tick: Tick) -> &mut V {
        if !self.map.contains_key(&tick) {
            self.keys.push(Reverse(tick));
        }
        self.map.entry(tick).or_default()
    }

    fn remove(&mut self, tick: &Tick) -> Option<V> {
        let removed = self.map.remove(tick);
        if removed.is_some() {
            self.drop_stale_keys();
        }
        removed
    }

    #[inline]
    fn min_key(&self) -> Option<Tick> {
        self.keys.peek().map(|Reverse(t)| *t)
    }

    fn key_count(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map.clear();
        self.keys.clear();
    }
}

// ── BucketQueue ───────────────────────────────────────────────────────────────

/// A priority queue mapping ticks → buckets of events due at that tick.
pub struct BucketQueue<E, K> {
    buckets: K,
    /// Event → (its tick, its position inside that tick's bucket).
    index:   FxHashMap<E, (Tick, usize)>,
}

/// Buckets kept in tick order by a `BTreeMap`.
pub type SortedBucketQueue<E> = BucketQueue<E, BTreeMap<Tick, Vec<E>>>;

/// Buckets kept in an `FxHashMap` with a lazy min-heap of keys.
pub type HashedBucketQueue<E> = BucketQueue<E, HashedTicks<Vec<E>>>;

impl<E: QueueItem, K: TickMap<Vec<E>>> Default for BucketQueue<E, K> {
    fn default() -> Self {
        Self {
            buckets: K::default(),
            index:   FxHashMap::default(),
        }
    }
}

impl<E: QueueItem, K: TickMap<Vec<E>>> BucketQueue<E, K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct ticks that have at least one queued event.
    pub fn tick_count(&self) -> usize {
        self.buckets.key_count()
    }

    /// Take `event` out of its bucket, fixing the index of whichever event
    /// `swap_remove` moved into its slot.
    fn unlink(&mut self, event: &E, time: Tick, slot: usize) {
        let Some(bucket) = self.buckets.get_mut(&time) else {
            return;
        };
        bucket.swap_remove(slot);
        if let Some(moved) = bucket.get(slot) {
            if let Some(entry) = self.index.get_mut(moved) {
                entry.1 = slot;
            }
        }
        if bucket.is_empty() {
            self.buckets.remove(&time);
        }
        debug_assert!(!self.index.contains_key(event));
    }

    fn take_bucket(&mut self, time: Tick) -> Vec<E> {
        let batch = self.buckets.remove(&time).unwrap_or_default();
        for event in &batch {
            self.index.remove(event);
        }
        batch
    }
}

impl<E: QueueItem, K: TickMap<Vec<E>>> EventQueue<E> for BucketQueue<E, K> {
    fn enqueue(&mut self, event: E, time: Tick) {
        if let Some(&(old_time, slot)) = self.index.get(&event) {
            if old_time == time {
                return;
            }
            self.index.remove(&event);
            self.unlink(&event, old_time, slot);
        }
        let bucket = self.buckets.get_or_insert(time);
        bucket.push(event.clone());
        let slot = bucket.len() - 1;
        self.index.insert(event, (time, slot));
    }

    fn dequeue_event(&mut self, event: &E) -> Option<Tick> {
        let (time, slot) = self.index.remove(event)?;
        self.unlink(event, time, slot);
        Some(time)
    }

    fn time_of(&self, event: &E) -> Option<Tick> {
        self.index.get(event).map(|(t, _)| *t)
    }

    #[inline]
    fn min_time(&self) -> Option<Tick> {
        self.buckets.min_key()
    }

    fn dequeue(&mut self) -> Option<(E, Tick)> {
        let time = self.buckets.min_key()?;
        let bucket = self.buckets.get_mut(&time)?;
        let event = bucket.pop()?;
        if bucket.is_empty() {
            self.buckets.remove(&time);
        }
        self.index.remove(&event);
        Some((event, time))
    }

    fn dequeue_all(&mut self) -> Option<(Tick, Vec<E>)> {
        let time = self.buckets.min_key()?;
        Some((time, self.take_bucket(time)))
    }

    fn dequeue_all_at(&mut self, time: Tick) -> Vec<E> {
        self.take_bucket(time)
    }

    #[inline]
    fn len(&self) -> usize {
        self.index.len()
    }

    fn clear(&mut self) {
        self.buckets.clear();
        self.index.clear();
    }

    fn name(&self) -> &'static str {
        "bucket"
    }
}

//! `TieredQueue`: three-tier queue for very large global event sets.
//!
//! # Layout
//!
//! ```text
//!   current  [ .. current_bound)            sorted, min at the end of the Vec
//!   near     [current_bound .. near_bound)  time-sliced buckets, unsorted
//!   far      [near_bound .. )               one unsorted Vec
//! ```
//!
//! Enqueue is a push into whichever tier covers the timestamp; only the
//! current tier (normally small) pays for a sorted insert.  When the current
//! tier runs dry the next non-empty near bucket is sorted into it.  When the
//! near buckets are exhausted the far tier is re-sliced into ~√n buckets
//! spanning its time range.  Sorting cost is therefore paid once per bucket,
//! amortized over the many cheap enqueues that filled it.
//!
//! # Lazy deletion
//!
//! Re-enqueue and `dequeue_event` never search the tiers.  The index maps each
//! live event to `(tick, stamp)`; an entry in a tier is live only if its
//! `(tick, stamp)` still matches the index.  Stale entries are skipped when
//! encountered and purged wholesale once they outnumber live ones.
//!
//! # Invariant
//!
//! After every mutating call the last entry of `current` is live and holds
//! the global minimum (or the queue is empty), which is what makes
//! [`min_time`](EventQueue::min_time) an O(1) `&self` read.

use std::mem;

use evsim_core::Tick;
use rustc_hash::FxHashMap;

use crate::{EventQueue, QueueItem};

/// Stale-entry count below which compaction is never attempted.
const COMPACT_FLOOR: usize = 64;

struct Entry<E> {
    time:  Tick,
    stamp: u64,
    event: E,
}

/// Multi-tier event queue with lazy promotion and lazy deletion.
pub struct TieredQueue<E> {
    index:      FxHashMap<E, (Tick, u64)>,
    next_stamp: u64,

    /// Sorted descending by time.
    current:       Vec<Entry<E>>,
    current_bound: Tick,

    near:        Vec<Vec<Entry<E>>>,
    near_start:  u64,
    near_width:  u64,
    near_cursor: usize,
    near_bound:  Tick,

    far: Vec<Entry<E>>,

    /// Entries sitting in a tier whose event was re-enqueued or removed.
    stale: usize,
}

impl<E> Default for TieredQueue<E> {
    fn default() -> Self {
        Self {
            index:         FxHashMap::default(),
            next_stamp:    0,
            current:       Vec::new(),
            current_bound: Tick::ZERO,
            near:          Vec::new(),
            near_start:    0,
            near_width:    1,
            near_cursor:   0,
            near_bound:    Tick::ZERO,
            far:           Vec::new(),
            stale:         0,
        }
    }
}

impl<E: QueueItem> TieredQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of near-future buckets created by the last far-tier promotion.
    pub fn near_bucket_count(&self) -> usize {
        self.near.len()
    }

    /// Number of entries in the (unsorted) far tier, stale ones included.
    pub fn far_len(&self) -> usize {
        self.far.len()
    }

    #[inline]
    fn is_live(index: &FxHashMap<E, (Tick, u64)>, entry: &Entry<E>) -> bool {
        index.get(&entry.event) == Some(&(entry.time, entry.stamp))
    }

    /// Exclusive upper bound of near bucket `k`.
    fn bucket_end(&self, k: usize) -> Tick {
        let end = self.near_start as u128 + self.near_width as u128 * (k as u128 + 1);
        Tick(end.min(u64::MAX as u128) as u64)
    }

    fn bucket_of(&self, time: Tick) -> usize {
        let k = ((time.0 - self.near_start) / self.near_width) as usize;
        k.min(self.near.len().saturating_sub(1))
    }

    fn place(&mut self, entry: Entry<E>) {
        if entry.time < self.current_bound {
            let pos = self.current.partition_point(|e| e.time > entry.time);
            self.current.insert(pos, entry);
        } else if entry.time < self.near_bound {
            let k = self.bucket_of(entry.time);
            self.near[k].push(entry);
        } else {
            self.far.push(entry);
        }
    }

    /// Restore the invariant: drop stale entries from the end of `current`,
    /// refilling it from the lower tiers when it empties.
    fn settle(&mut self) {
        loop {
            while let Some(last) = self.current.last() {
                if Self::is_live(&self.index, last) {
                    return;
                }
                self.current.pop();
                self.stale -= 1;
            }
            if !self.refill() {
                return;
            }
        }
    }

    /// Move the next batch of live entries into the (empty) current tier.
    ///
    /// Returns `false` if there is nothing left to promote.
    fn refill(&mut self) -> bool {
        while self.near_cursor < self.near.len() {
            let k = self.near_cursor;
            self.near_cursor += 1;
            self.current_bound = self.bucket_end(k);

            let bucket = mem::take(&mut self.near[k]);
            let mut live = Vec::with_capacity(bucket.len());
            for entry in bucket {
                if Self::is_live(&self.index, &entry) {
                    live.push(entry);
                } else {
                    self.stale -= 1;
                }
            }
            if live.is_empty() {
                continue;
            }
            live.sort_unstable_by(|a, b| b.time.cmp(&a.time));
            self.current = live;
            return true;
        }
        self.promote_far()
    }

    /// Re-slice the far tier into fresh near buckets.
    fn promote_far(&mut self) -> bool {
        self.near.clear();
        self.near_cursor = 0;

        let far = mem::take(&mut self.far);
        let mut live = Vec::with_capacity(far.len());
        for entry in far {
            if Self::is_live(&self.index, &entry) {
                live.push(entry);
            } else {
                self.stale -= 1;
            }
        }
        let (Some(min), Some(max)) = (
            live.iter().map(|e| e.time).min(),
            live.iter().map(|e| e.time).max(),
        ) else {
            self.near_bound = self.current_bound;
            return false;
        };

        let count = ((live.len() as f64).sqrt() as usize).max(1);
        let span = (max.0 - min.0) as u128 + 1;
        let width = span.div_ceil(count as u128).min(u64::MAX as u128) as u64;

        self.near_start = min.0;
        self.near_width = width.max(1);
        self.near = (0..count).map(|_| Vec::new()).collect();
        self.current_bound = min;
        let bound = self.near_start as u128 + self.near_width as u128 * count as u128;
        self.near_bound = Tick(bound.min(u64::MAX as u128) as u64);

        for entry in live {
            let k = self.bucket_of(entry.time);
            self.near[k].push(entry);
        }
        true
    }

    fn maybe_compact(&mut self) {
        if self.stale < COMPACT_FLOOR || self.stale <= self.index.len() {
            return;
        }
        let index = &self.index;
        self.current.retain(|e| Self::is_live(index, e));
        for bucket in &mut self.near {
            bucket.retain(|e| Self::is_live(index, e));
        }
        self.far.retain(|e| Self::is_live(index, e));
        self.stale = 0;
    }

    /// Remove every live entry at `time` from `entries`, pushing the events
    /// into `out`.  Returns the number of stale entries dropped.
    fn extract_at(
        entries: &mut Vec<Entry<E>>,
        time:    Tick,
        index:   &mut FxHashMap<E, (Tick, u64)>,
        out:     &mut Vec<E>,
    ) -> usize {
        let mut dropped = 0;
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if entry.time != time {
                kept.push(entry);
            } else if Self::is_live(index, &entry) {
                index.remove(&entry.event);
                out.push(entry.event);
            } else {
                dropped += 1;
            }
        }
        *entries = kept;
        dropped
    }
}

impl<E: QueueItem> EventQueue<E> for TieredQueue<E> {
    fn enqueue(&mut self, event: E, time: Tick) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        if self.index.insert(event.clone(), (time, stamp)).is_some() {
            self.stale += 1;
        }
        self.place(Entry { time, stamp, event });
        self.maybe_compact();
        self.settle();
    }

    fn dequeue_event(&mut self, event: &E) -> Option<Tick> {
        let (time, _) = self.index.remove(event)?;
        self.stale += 1;
        self.maybe_compact();
        self.settle();
        Some(time)
    }

    fn time_of(&self, event: &E) -> Option<Tick> {
        self.index.get(event).map(|(t, _)| *t)
    }

    #[inline]
    fn min_time(&self) -> Option<Tick> {
        self.current.last().map(|e| e.time)
    }

    fn dequeue(&mut self) -> Option<(E, Tick)> {
        let entry = self.current.pop()?;
        self.index.remove(&entry.event);
        self.settle();
        Some((entry.event, entry.time))
    }

    fn dequeue_all(&mut self) -> Option<(Tick, Vec<E>)> {
        let time = self.min_time()?;
        let mut batch = Vec::new();
        while self.current.last().is_some_and(|e| e.time == time) {
            let Some(entry) = self.current.pop() else { break };
            if Self::is_live(&self.index, &entry) {
                self.index.remove(&entry.event);
                batch.push(entry.event);
            } else {
                self.stale -= 1;
            }
        }
        self.settle();
        Some((time, batch))
    }

    fn dequeue_all_at(&mut self, time: Tick) -> Vec<E> {
        if self.min_time() == Some(time) {
            return self.dequeue_all().map(|(_, batch)| batch).unwrap_or_default();
        }
        let mut batch = Vec::new();
        let dropped = if time < self.current_bound {
            let lo = self.current.partition_point(|e| e.time > time);
            let hi = self.current.partition_point(|e| e.time >= time);
            let mut dropped = 0;
            for entry in self.current.drain(lo..hi).collect::<Vec<_>>() {
                if Self::is_live(&self.index, &entry) {
                    self.index.remove(&entry.event);
                    batch.push(entry.event);
                } else {
                    dropped += 1;
                }
            }
            dropped
        } else if time < self.near_bound {
            let k = self.bucket_of(time);
            Self::extract_at(&mut self.near[k], time, &mut self.index, &mut batch)
        } else {
            Self::extract_at(&mut self.far, time, &mut self.index, &mut batch)
        };
        self.stale -= dropped;
        self.settle();
        batch
    }

    #[inline]
    fn len(&self) -> usize {
        self.index.len()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }

    fn name(&self) -> &'static str {
        "tiered"
    }
}

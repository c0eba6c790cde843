//! `HeapQueue`: array binary heap keyed by timestamp.
//!
//! Lookup of an arbitrary event is a linear scan, so re-enqueue and
//! `dequeue_event` are O(n).  Min extraction is O(log n).  For the handful of
//! pending events a typical agent holds this beats every hashed structure on
//! constant factors, which is why it is the default local queue.

use evsim_core::Tick;

use crate::{EventQueue, QueueItem};

/// Binary min-heap of `(Tick, E)` entries.
pub struct HeapQueue<E> {
    heap: Vec<(Tick, E)>,
}

impl<E> Default for HeapQueue<E> {
    fn default() -> Self {
        Self { heap: Vec::new() }
    }
}

impl<E: QueueItem> HeapQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { heap: Vec::with_capacity(capacity) }
    }

    fn position(&self, event: &E) -> Option<usize> {
        self.heap.iter().position(|(_, e)| e == event)
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].0 >= self.heap[parent].0 {
                break;
            }
            self.heap.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let smallest = if right < len && self.heap[right].0 < self.heap[left].0 {
                right
            } else {
                left
            };
            if self.heap[smallest].0 >= self.heap[pos].0 {
                break;
            }
            self.heap.swap(pos, smallest);
            pos = smallest;
        }
    }

    /// Restore heap order after the entry at `pos` changed key.
    fn reheap_at(&mut self, pos: usize) {
        if pos > 0 && self.heap[pos].0 < self.heap[(pos - 1) / 2].0 {
            self.sift_up(pos);
        } else {
            self.sift_down(pos);
        }
    }

    fn remove_at(&mut self, pos: usize) -> (Tick, E) {
        let removed = self.heap.swap_remove(pos);
        if pos < self.heap.len() {
            self.reheap_at(pos);
        }
        removed
    }

    fn heapify(&mut self) {
        for pos in (0..self.heap.len() / 2).rev() {
            self.sift_down(pos);
        }
    }
}

impl<E: QueueItem> EventQueue<E> for HeapQueue<E> {
    fn enqueue(&mut self, event: E, time: Tick) {
        match self.position(&event) {
            Some(pos) => {
                self.heap[pos].0 = time;
                self.reheap_at(pos);
            }
            None => {
                self.heap.push((time, event));
                let last = self.heap.len() - 1;
                self.sift_up(last);
            }
        }
    }

    fn dequeue_event(&mut self, event: &E) -> Option<Tick> {
        let pos = self.position(event)?;
        Some(self.remove_at(pos).0)
    }

    fn time_of(&self, event: &E) -> Option<Tick> {
        self.heap.iter().find(|(_, e)| e == event).map(|(t, _)| *t)
    }

    #[inline]
    fn min_time(&self) -> Option<Tick> {
        self.heap.first().map(|(t, _)| *t)
    }

    fn dequeue(&mut self) -> Option<(E, Tick)> {
        if self.heap.is_empty() {
            return None;
        }
        let (time, event) = self.remove_at(0);
        Some((event, time))
    }

    fn dequeue_all(&mut self) -> Option<(Tick, Vec<E>)> {
        let min = self.min_time()?;
        let mut batch = Vec::new();
        while self.min_time() == Some(min) {
            batch.push(self.remove_at(0).1);
        }
        Some((min, batch))
    }

    fn dequeue_all_at(&mut self, time: Tick) -> Vec<E> {
        if self.min_time() == Some(time) {
            return self.dequeue_all().map(|(_, batch)| batch).unwrap_or_default();
        }
        let mut batch = Vec::new();
        let mut kept = Vec::with_capacity(self.heap.len());
        for (t, e) in self.heap.drain(..) {
            if t == time {
                batch.push(e);
            } else {
                kept.push((t, e));
            }
        }
        self.heap = kept;
        if !batch.is_empty() {
            self.heapify();
        }
        batch
    }

    #[inline]
    fn len(&self) -> usize {
        self.heap.len()
    }

    fn clear(&mut self) {
        self.heap.clear();
    }

    fn name(&self) -> &'static str {
        "heap"
    }
}

//! `evsim-queue`: timestamp-ordered event queues.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                        |
//! |--------------|-----------------------------------------------------------------|
//! | [`queue`]    | `EventQueue` trait, `QueueItem`, `QueueKind` selector           |
//! | [`heap`]     | `HeapQueue` - array binary heap                                 |
//! | [`bucket`]   | `BucketQueue` over sorted (`BTreeMap`) or hashed tick buckets   |
//! | [`tiered`]   | `TieredQueue` - current / near / far tiers with lazy promotion  |
//!
//! # Contract (summary)
//!
//! Every queue maps each distinct event to at most one timestamp:
//!
//! ```text
//! enqueue(e, t)        register e at t, replacing any earlier timestamp
//! dequeue_event(&e)    remove e, returning its timestamp (None if absent)
//! min_time()           smallest timestamp present (None if empty)
//! dequeue()            remove one event at min_time (tie-break unspecified)
//! dequeue_all()        remove every event at min_time as one batch
//! dequeue_all_at(t)    remove every event at exactly t
//! ```
//!
//! Reading an empty queue always yields `None`; no algorithm panics or
//! returns a sentinel.
//!
//! # Choosing an algorithm
//!
//! | Algorithm           | Enqueue        | Pop min          | Remove arbitrary | Use for                     |
//! |---------------------|----------------|------------------|------------------|-----------------------------|
//! | `HeapQueue`         | O(n) lookup    | O(log n)         | O(n)             | small per-agent queues      |
//! | `SortedBucketQueue` | O(log B)       | O(log B)         | O(log B)         | many events per timestamp   |
//! | `HashedBucketQueue` | O(1) amortized | O(log B)         | O(1) amortized   | synchronous models          |
//! | `TieredQueue`       | O(1) amortized | amortized O(√n log n) per bucket | O(1) lazy | global queues > 10⁵ events |

pub mod bucket;
pub mod heap;
pub mod queue;
pub mod tiered;


pub use bucket::{BucketQueue, HashedBucketQueue, HashedTicks, SortedBucketQueue, TickMap};
pub use heap::HeapQueue;
pub use queue::{EventQueue, QueueItem, QueueKind};
pub use tiered::TieredQueue;

//! Deterministic simulation-level RNG.
//!
//! The kernel itself is deterministic; randomness is only used to shuffle the
//! dispatch order of co-scheduled agents when a run asks for it, which flushes
//! out models that accidentally depend on the order agents are run within a
//! cycle.  The same seed always produces the same shuffle sequence.

use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Simulation-level RNG.
///
/// Used only from the simulator thread, between dispatch batches.
pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// Shuffle a mutable slice in-place (Fisher-Yates).
    #[inline]
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        use rand::seq::SliceRandom;
        slice.shuffle(&mut self.0);
    }
}

//! Simulation time model.
//!
//! # Design
//!
//! Time is represented as a monotonically increasing `Tick` counter: the
//! smallest indivisible unit of simulated time.  Using an integer tick as the
//! canonical time unit means all schedule arithmetic is exact (no
//! floating-point drift) and comparisons are O(1).
//!
//! `Tick::INFINITY` is the "never" sentinel.  It sorts after every finite
//! tick and is never inserted into the simulator's global queue: an agent
//! whose next event is infinitely far away is simply idle.

use std::fmt;

// ── Tick ─────────────────────────────────────────────────────────────────────

/// An absolute simulation tick counter.
///
/// Stored as `u64` to avoid overflow: at one tick per nanosecond a u64 lasts
/// ~584 years of simulated time.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    /// Sentinel meaning "never".  Greater than every finite tick.
    pub const INFINITY: Tick = Tick(u64::MAX);

    /// `true` for the [`Tick::INFINITY`] sentinel.
    #[inline]
    pub fn is_infinite(self) -> bool {
        self == Tick::INFINITY
    }
}

impl std::ops::Add<u64> for Tick {
    type Output = Tick;
    #[inline]
    fn add(self, rhs: u64) -> Tick {
        Tick(self.0 + rhs)
    }
}

impl std::ops::Sub for Tick {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: Tick) -> u64 {
        self.0 - rhs.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            f.write_str("T∞")
        } else {
            write!(f, "T{}", self.0)
        }
    }
}

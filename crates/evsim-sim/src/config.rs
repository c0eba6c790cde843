//! Simulator configuration.

use evsim_port::ForwardingKind;
use evsim_queue::QueueKind;

use crate::{SimError, SimResult};

/// How the agents due at one tick are run.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispatchMode {
    /// One after another on the simulator thread, in id order (or shuffled
    /// when `SimConfig::shuffle_dispatch` is set).
    #[default]
    Sequential,

    /// On a rayon pool, with a barrier after the whole batch.  `threads:
    /// None` uses rayon's global pool.  Requires the `parallel` feature.
    Concurrent { threads: Option<usize> },
}

/// Top-level simulator configuration, consumed by
/// [`SimBuilder`][crate::SimBuilder].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimConfig {
    /// Algorithm for the global queue of agents keyed by next-event time.
    pub queue: QueueKind,

    /// Forwarding strategy run after each dispatch batch.
    pub forwarding: ForwardingKind,

    pub dispatch: DispatchMode,

    /// Whether agents may submit change requests.  When `false` every
    /// submission fails with a configuration error.
    pub dynamic_mutation: bool,

    /// Shuffle each dispatch batch with the seeded RNG.  Useful to check that
    /// a model does not depend on intra-tick ordering.
    pub shuffle_dispatch: bool,

    /// Master RNG seed.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            queue:            QueueKind::Tiered,
            forwarding:       ForwardingKind::default(),
            dispatch:         DispatchMode::Sequential,
            dynamic_mutation: true,
            shuffle_dispatch: false,
            seed:             0,
        }
    }
}

impl SimConfig {
    /// Reject settings that cannot run.
    pub fn validate(&self) -> SimResult<()> {
        if let ForwardingKind::Recursive { max_hops: 0 } = self.forwarding {
            return Err(SimError::Config("recursive forwarding needs max_hops > 0".into()));
        }
        match self.dispatch {
            DispatchMode::Sequential => Ok(()),
            DispatchMode::Concurrent { threads: Some(0) } => {
                Err(SimError::Config("concurrent dispatch needs at least one thread".into()))
            }
            DispatchMode::Concurrent { .. } if !cfg!(feature = "parallel") => Err(SimError::Config(
                "concurrent dispatch requires the `parallel` feature".into(),
            )),
            DispatchMode::Concurrent { .. } => Ok(()),
        }
    }
}

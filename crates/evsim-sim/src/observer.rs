//! Simulation observer trait for progress reporting and data collection.

use evsim_core::Tick;
use evsim_model::Payload;

use crate::{CycleReport, Sim};

/// Callbacks invoked by [`Sim::run_simulation`][crate::Sim::run_simulation]
/// and [`Sim::step`][crate::Sim::step].
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.
///
/// # Example: progress printer
///
/// ```rust,ignore
/// struct ProgressPrinter { every: u64 }
///
/// impl<M: Payload> SimObserver<M> for ProgressPrinter {
///     fn on_cycle_end(&mut self, report: &CycleReport, sim: &Sim<M>) {
///         if sim.cycles() % self.every == 0 {
///             println!("t={}: dispatched {}", report.time, report.dispatched);
///         }
///     }
/// }
/// ```
pub trait SimObserver<M: Payload>: Send {
    /// Called once when `run_simulation` starts, before the first cycle.
    fn on_run_start(&mut self, _now: Tick, _stop: Tick) {}

    /// Called after every cycle, once mutations are applied.
    ///
    /// `sim` gives read-only access to the model so observers can pull any
    /// state they want to record.
    fn on_cycle_end(&mut self, _report: &CycleReport, _sim: &Sim<M>) {}

    /// Called once when `run_simulation` returns successfully.
    fn on_run_end(&mut self, _now: Tick, _cycles: u64) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl<M: Payload> SimObserver<M> for NoopObserver {}

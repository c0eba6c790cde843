//! `evsim-sim`: cycle loop orchestrator for the evsim discrete-event kernel.
//!
//! # Cycle
//!
//! ```text
//! while global_queue.min_time() < stop:
//!   now = global_queue.min_time()
//!   ① Dispatch: dequeue every agent due at `now`, call do_event(now)
//!                (on a rayon pool with DispatchMode::Concurrent), re-enqueue
//!                each at its new next-event time.
//!   ② Forward: the ForwardingStrategy moves the dispatched agents'
//!                outbound messages until they rest at endpoint ports.
//!   ③ Mutate: apply queued ChangeRequests in FIFO order, then resync the
//!                global queue with agents attached or detached.
//!   ④ Observe: SimObserver::on_cycle_end(report, &sim).
//! ```
//!
//! A message written in cycle `t` is visible to its recipient at the
//! recipient's next dispatch after `t`.  Tree changes requested in cycle `t`
//! are visible from the end of cycle `t`.
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                  |
//! |------------|---------------------------------------------------------|
//! | `parallel` | Enables `DispatchMode::Concurrent` (Rayon). On by default. |
//! | `serde`    | `Serialize`/`Deserialize` for `SimConfig`.              |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use evsim_core::Tick;
//! use evsim_model::{LocalAgent, Model};
//! use evsim_sim::SimBuilder;
//!
//! let mut model = Model::new("world");
//! model.add_agent(model.root(), "ticker", LocalAgent::new(Ticker).with_event((), Tick(0)))?;
//! let mut sim = SimBuilder::new(model).build()?;
//! sim.run_simulation(Tick(100))?;
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod observer;
pub mod sim;

#[cfg(test)]
mod tests;

pub use builder::SimBuilder;
pub use config::{DispatchMode, SimConfig};
pub use error::{SimError, SimResult};
pub use observer::{NoopObserver, SimObserver};
pub use sim::{CycleReport, Sim, SimStatus};

//! The `Sim` struct and its cycle loop.

use std::fmt;

use evsim_core::{EntityId, SimRng, Tick};
use evsim_model::{
    AgentSlot, ChangeQueue, JournalEntry, Model, ModelError, ModelResult, Payload, RunPhase,
};
use evsim_port::{ForwardReport, ForwardingStrategy};
use evsim_queue::EventQueue;
use tracing::{debug, info, warn};

use crate::{DispatchMode, SimConfig, SimError, SimObserver, SimResult};

type Outcome = (EntityId, ModelResult<Option<Tick>>);

/// Lifecycle of a [`Sim`].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SimStatus {
    /// Built, never run.
    Ready,
    /// Inside `run_simulation`, or stepped with agents still scheduled.
    Running,
    /// The last `run_simulation` reached its stop tick, or a step left
    /// nothing scheduled.  Another run with a later stop tick continues
    /// from here.
    Finished,
    /// A cycle returned an error.  Terminal.
    Failed,
}

/// What one cycle did.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CycleReport {
    /// Simulated time of the cycle.
    pub time:       Tick,
    /// Agents whose `do_event` ran.
    pub dispatched: usize,
    pub forwarded:  ForwardReport,
    /// Change requests applied in the mutation step.
    pub mutations:  usize,
}

// ── Sim ───────────────────────────────────────────────────────────────────────

/// The discrete-event simulator.
///
/// Holds the model and a global queue mapping every scheduled agent to its
/// next-event time.  Each cycle:
///
/// 1. **Dispatch**: dequeue every agent due at the global minimum and run
///    its `do_event`, sequentially or on a rayon pool (`parallel` feature).
///    Each agent is re-enqueued at its new next-event time.
/// 2. **Forward**: the configured [`ForwardingStrategy`] moves the messages
///    the dispatched agents wrote until they rest at endpoint ports.
/// 3. **Mutate**: apply queued change requests in submission order and
///    resync the global queue with the agents attached or detached.
///
/// Observers are notified after step 3.  Any error is fatal: the sim moves
/// to [`SimStatus::Failed`] and refuses to run again.
///
/// Create via [`SimBuilder`][crate::SimBuilder].
pub struct Sim<M: Payload> {
    model:      Model<M>,
    queue:      Box<dyn EventQueue<EntityId>>,
    forwarding: Box<dyn ForwardingStrategy<M>>,
    changes:    ChangeQueue<M>,
    observers:  Vec<Box<dyn SimObserver<M>>>,
    config:     SimConfig,
    rng:        SimRng,
    #[cfg(feature = "parallel")]
    pool:       Option<rayon::ThreadPool>,
    now:        Tick,
    cycles:     u64,
    status:     SimStatus,
}

impl<M: Payload> Sim<M> {
    pub(crate) fn new(
        mut model:  Model<M>,
        config:     SimConfig,
        forwarding: Box<dyn ForwardingStrategy<M>>,
        observers:  Vec<Box<dyn SimObserver<M>>>,
    ) -> SimResult<Self> {
        config.validate()?;

        #[cfg(feature = "parallel")]
        let pool = match config.dispatch {
            DispatchMode::Concurrent { threads: Some(n) } => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("evsim-dispatch-{i}"))
                    .build()
                    .map_err(|e| SimError::Config(e.to_string()))?,
            ),
            _ => None,
        };

        model.set_phase(RunPhase::Idle);
        // Everything attached now is scheduled below.
        model.take_journal();

        let mut sim = Self {
            queue: config.queue.build(),
            forwarding,
            changes: ChangeQueue::new(config.dynamic_mutation),
            observers,
            rng: SimRng::new(config.seed),
            #[cfg(feature = "parallel")]
            pool,
            now: Tick::ZERO,
            cycles: 0,
            status: SimStatus::Ready,
            model,
            config,
        };
        for id in sim.model.attached_agents() {
            sim.enqueue_agent(id, Tick::ZERO)?;
        }
        Ok(sim)
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Run cycles while the global minimum is before `stop`.
    ///
    /// Returns the number of cycles run.  Agents scheduled at or after
    /// `stop` stay queued, so a later call with a larger bound continues
    /// where this one left off.
    pub fn run_simulation(&mut self, stop: Tick) -> SimResult<u64> {
        self.ensure_runnable()?;
        self.status = SimStatus::Running;

        let start = self.now;
        let first_cycle = self.cycles;
        info!(
            %start,
            %stop,
            scheduled = self.queue.len(),
            queue = self.queue.name(),
            forwarding = self.forwarding.name(),
            "simulation started"
        );
        for observer in &mut self.observers {
            observer.on_run_start(start, stop);
        }

        self.guarded(|sim| {
            sim.sync_schedule(sim.now)?;
            while let Some(next) = sim.queue.min_time() {
                if next >= stop {
                    break;
                }
                sim.cycle()?;
            }
            Ok(())
        })?;

        self.status = SimStatus::Finished;
        let cycles = self.cycles - first_cycle;
        info!(now = %self.now, cycles, "simulation finished");
        let now = self.now;
        for observer in &mut self.observers {
            observer.on_run_end(now, cycles);
        }
        Ok(cycles)
    }

    /// Run exactly one cycle at the global minimum.
    ///
    /// Returns `None` when no agent is scheduled.  Useful for tests and
    /// incremental stepping.
    pub fn step(&mut self) -> SimResult<Option<CycleReport>> {
        self.ensure_runnable()?;
        self.status = SimStatus::Running;
        let report = self.guarded(|sim| {
            sim.sync_schedule(sim.now)?;
            sim.cycle()
        })?;
        if self.queue.min_time().is_none() {
            self.status = SimStatus::Finished;
        }
        Ok(report)
    }

    /// Re-read the next-event time of `id` into the global queue.
    ///
    /// Call after scheduling local events on an agent between runs.  Returns
    /// whether the agent is now scheduled.
    pub fn schedule_agent(&mut self, id: EntityId) -> SimResult<bool> {
        self.ensure_runnable()?;
        self.enqueue_agent(id, self.now)
    }

    pub fn add_observer(&mut self, observer: impl SimObserver<M> + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn model(&self) -> &Model<M> {
        &self.model
    }

    /// Mutable model access between runs.  Tree edits are picked up at the
    /// start of the next run or step; edits to an agent's own events need
    /// [`schedule_agent`](Self::schedule_agent).
    pub fn model_mut(&mut self) -> &mut Model<M> {
        &mut self.model
    }

    pub fn into_model(self) -> Model<M> {
        self.model
    }

    /// The change queue agents submit to.  Requests submitted here between
    /// runs are applied in the next cycle's mutation step.
    pub fn changes(&self) -> &ChangeQueue<M> {
        &self.changes
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Time of the last cycle run, `Tick::ZERO` before the first.
    pub fn now(&self) -> Tick {
        self.now
    }

    /// Cycles run since the sim was built.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn status(&self) -> SimStatus {
        self.status
    }

    /// Time of the next cycle, `None` when no agent is scheduled.
    pub fn next_time(&self) -> Option<Tick> {
        self.queue.min_time()
    }

    /// Time at which `id` is scheduled in the global queue.
    pub fn scheduled_time(&self, id: EntityId) -> Option<Tick> {
        self.queue.time_of(&id)
    }

    /// Number of agents in the global queue.
    pub fn scheduled(&self) -> usize {
        self.queue.len()
    }

    // ── Cycle ─────────────────────────────────────────────────────────────

    fn ensure_runnable(&self) -> SimResult<()> {
        match self.status {
            SimStatus::Failed => Err(SimError::Failed),
            _ => Ok(()),
        }
    }

    /// Run `f`, then return the model to `Idle` and mark the sim failed if
    /// `f` did.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> SimResult<T>) -> SimResult<T> {
        let result = f(self);
        self.model.set_phase(RunPhase::Idle);
        if result.is_err() {
            self.status = SimStatus::Failed;
        }
        result
    }

    fn cycle(&mut self) -> SimResult<Option<CycleReport>> {
        let Some((now, batch)) = self.next_batch() else {
            return Ok(None);
        };

        // ── Phase 1: dispatch ─────────────────────────────────────────────
        self.dispatch_phase(now, &batch)?;

        // ── Phase 2: forward ──────────────────────────────────────────────
        let forwarded = self.forward_phase(now, &batch)?;

        // ── Phase 3: mutate ───────────────────────────────────────────────
        let mutations = self.mutation_phase(now)?;

        self.model.set_phase(RunPhase::Idle);
        self.cycles += 1;

        let report = CycleReport { time: now, dispatched: batch.len(), forwarded, mutations };
        debug!(
            %now,
            dispatched = report.dispatched,
            passes = forwarded.passes,
            deliveries = forwarded.deliveries,
            mutations,
            "cycle complete"
        );

        let mut observers = std::mem::take(&mut self.observers);
        for observer in &mut observers {
            observer.on_cycle_end(&report, self);
        }
        self.observers = observers;

        Ok(Some(report))
    }

    /// Dequeue every agent due at the global minimum and advance the clock.
    ///
    /// The batch is in id order unless `shuffle_dispatch` is set.
    pub(crate) fn next_batch(&mut self) -> Option<(Tick, Vec<EntityId>)> {
        let (now, mut batch) = self.queue.dequeue_all()?;
        batch.sort_unstable();
        if self.config.shuffle_dispatch {
            self.rng.shuffle(&mut batch);
        }
        self.now = now;
        Some((now, batch))
    }

    pub(crate) fn dispatch_phase(&mut self, now: Tick, batch: &[EntityId]) -> SimResult<()> {
        self.model.set_phase(RunPhase::Dispatching);
        let outcomes = self.dispatch_batch(now, batch)?;

        for (id, outcome) in outcomes {
            match outcome {
                Ok(Some(next)) if !next.is_infinite() => self.queue.enqueue(id, next),
                Ok(_) => {}
                Err(source) => return Err(self.agent_error(id, now, source)),
            }
        }
        Ok(())
    }

    fn dispatch_batch(&mut self, now: Tick, batch: &[EntityId]) -> SimResult<Vec<Outcome>> {
        let changes = &self.changes;
        let mut slots = self.model.agents_many_mut(batch)?;

        let outcomes = match self.config.dispatch {
            DispatchMode::Sequential => dispatch_each(&mut slots, now, changes),

            #[cfg(feature = "parallel")]
            DispatchMode::Concurrent { .. } => match &self.pool {
                Some(pool) => pool.install(|| dispatch_par(&mut slots, now, changes)),
                None => dispatch_par(&mut slots, now, changes),
            },

            #[cfg(not(feature = "parallel"))]
            DispatchMode::Concurrent { .. } => {
                return Err(SimError::Config(
                    "concurrent dispatch requires the `parallel` feature".into(),
                ));
            }
        };
        Ok(outcomes)
    }

    pub(crate) fn forward_phase(&mut self, now: Tick, batch: &[EntityId]) -> SimResult<ForwardReport> {
        self.model.set_phase(RunPhase::Forwarding);
        let mut sources = self.model.take_injected();
        sources.extend(
            batch
                .iter()
                .flat_map(|&id| self.model.ports(id).iter().map(|p| p.id())),
        );
        self.forwarding
            .forward(&mut self.model, &sources)
            .map_err(|source| SimError::Forwarding { now, source })
    }

    /// Apply every queued change request, oldest first.  The first failure
    /// discards the rest of the batch.
    pub(crate) fn mutation_phase(&mut self, now: Tick) -> SimResult<usize> {
        self.model.set_phase(RunPhase::Mutating);
        let requests = self.changes.drain()?;
        let total = requests.len();

        for (applied, request) in requests.into_iter().enumerate() {
            let label = request.label();
            if let Err(source) = self.model.apply_change(request) {
                warn!(
                    %now,
                    request = label,
                    applied,
                    discarded = total - applied - 1,
                    error = %source,
                    "change request failed; mutation batch aborted"
                );
                return Err(SimError::Mutation { now, request: label, source });
            }
        }

        self.sync_schedule(now)?;
        Ok(total)
    }

    // ── Global queue upkeep ───────────────────────────────────────────────

    /// Apply the model's attach/detach journal to the global queue.
    fn sync_schedule(&mut self, now: Tick) -> SimResult<()> {
        for entry in self.model.take_journal() {
            match entry {
                JournalEntry::AgentAttached(id) => {
                    self.enqueue_agent(id, now)?;
                }
                JournalEntry::AgentDetached(id) => {
                    self.queue.dequeue_event(&id);
                }
            }
        }
        Ok(())
    }

    fn enqueue_agent(&mut self, id: EntityId, now: Tick) -> SimResult<bool> {
        if !self.model.is_attached(id) {
            self.queue.dequeue_event(&id);
            return Ok(false);
        }
        match self.model.time_of_next_event(id) {
            Some(next) if next < now => Err(self.agent_error(
                id,
                now,
                ModelError::TimeRegression { entity: id, now, next },
            )),
            Some(next) if !next.is_infinite() => {
                self.queue.enqueue(id, next);
                Ok(true)
            }
            _ => {
                self.queue.dequeue_event(&id);
                Ok(false)
            }
        }
    }

    fn agent_error(&self, entity: EntityId, now: Tick, source: ModelError) -> SimError {
        SimError::Agent {
            entity,
            name: self.model.name(entity).unwrap_or_default().to_string(),
            address: self.model.address(entity).cloned(),
            now,
            source,
        }
    }
}

fn dispatch_each<M: Payload>(
    slots:   &mut [AgentSlot<'_, M>],
    now:     Tick,
    changes: &ChangeQueue<M>,
) -> Vec<Outcome> {
    slots.iter_mut().map(|slot| (slot.id, slot.dispatch(now, changes))).collect()
}

#[cfg(feature = "parallel")]
fn dispatch_par<M: Payload>(
    slots:   &mut [AgentSlot<'_, M>],
    now:     Tick,
    changes: &ChangeQueue<M>,
) -> Vec<Outcome> {
    use rayon::prelude::*;

    // Collect preserves slot order, so errors are reported in batch order.
    slots.par_iter_mut().map(|slot| (slot.id, slot.dispatch(now, changes))).collect()
}

impl<M: Payload> fmt::Debug for Sim<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sim")
            .field("now", &self.now)
            .field("cycles", &self.cycles)
            .field("status", &self.status)
            .field("scheduled", &self.queue.len())
            .field("queue", &self.queue.name())
            .field("forwarding", &self.forwarding.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

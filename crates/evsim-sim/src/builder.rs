//! Fluent builder for constructing a [`Sim`].

use evsim_model::{Model, Payload};
use evsim_port::{ForwardingKind, ForwardingStrategy};
use evsim_queue::QueueKind;

use crate::{DispatchMode, Sim, SimConfig, SimObserver, SimResult};

/// Fluent builder for [`Sim<M>`].
///
/// # Required inputs
///
/// - [`Model<M>`]: the entity tree with its agents, ports and wiring.
///
/// # Optional inputs (have defaults)
///
/// | Method                   | Default                                |
/// |--------------------------|----------------------------------------|
/// | `.config(c)`             | `SimConfig::default()`                 |
/// | `.queue(k)`              | `QueueKind::Tiered`                    |
/// | `.forwarding(k)`         | `ForwardingKind::Recursive { 64 }`     |
/// | `.strategy(s)`           | built from the `forwarding` kind       |
/// | `.dispatch(m)`           | `DispatchMode::Sequential`             |
/// | `.dynamic_mutation(b)`   | `true`                                 |
/// | `.shuffle_dispatch(b)`   | `false`                                |
/// | `.seed(s)`               | `0`                                    |
/// | `.observer(o)`           | none                                   |
///
/// # Example
///
/// ```rust,ignore
/// let mut model = Model::new("world");
/// let a = model.add_agent(model.root(), "a", LocalAgent::new(Pinger).with_event((), Tick(0)))?;
/// let mut sim = SimBuilder::new(model)
///     .forwarding(ForwardingKind::Routed)
///     .dispatch(DispatchMode::Concurrent { threads: Some(4) })
///     .build()?;
/// sim.run_simulation(Tick(1_000))?;
/// ```
pub struct SimBuilder<M: Payload> {
    model:     Model<M>,
    config:    SimConfig,
    strategy:  Option<Box<dyn ForwardingStrategy<M>>>,
    observers: Vec<Box<dyn SimObserver<M>>>,
}

impl<M: Payload> SimBuilder<M> {
    pub fn new(model: Model<M>) -> Self {
        Self { model, config: SimConfig::default(), strategy: None, observers: Vec::new() }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue(mut self, kind: QueueKind) -> Self {
        self.config.queue = kind;
        self
    }

    pub fn forwarding(mut self, kind: ForwardingKind) -> Self {
        self.config.forwarding = kind;
        self
    }

    /// Use a custom forwarding strategy instead of the configured kind.
    pub fn strategy(mut self, strategy: impl ForwardingStrategy<M> + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.config.dispatch = mode;
        self
    }

    pub fn dynamic_mutation(mut self, enabled: bool) -> Self {
        self.config.dynamic_mutation = enabled;
        self
    }

    pub fn shuffle_dispatch(mut self, shuffle: bool) -> Self {
        self.config.shuffle_dispatch = shuffle;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn observer(mut self, observer: impl SimObserver<M> + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    /// Validate the configuration, build the global queue and schedule every
    /// attached agent at its next-event time.
    ///
    /// Fails with [`SimError::Config`][crate::SimError::Config] for a zero
    /// hop limit or thread count, for concurrent dispatch without the
    /// `parallel` feature, or if the thread pool cannot be created.
    pub fn build(self) -> SimResult<Sim<M>> {
        let strategy = self.strategy.unwrap_or_else(|| self.config.forwarding.build());
        Sim::new(self.model, self.config, strategy, self.observers)
    }
}

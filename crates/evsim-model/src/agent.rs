//! The agent contract and the typed `Behavior` adapter.

use std::any::Any;
use std::fmt;

use evsim_core::Tick;
use evsim_queue::{EventQueue, QueueItem, QueueKind};

use crate::{AgentContext, ModelError, ModelResult};

/// Bound on message payloads.  Payloads are shared between threads behind an
/// `Arc`, so they must be `Send + Sync`.
pub trait Payload: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Payload for T {}

/// A schedulable participant: state plus a private queue of future events.
///
/// The simulator calls [`do_event`](Self::do_event) only when the current
/// time equals [`time_of_next_event`](Self::time_of_next_event).  Inside the
/// call the agent may read its inbox, update its state, schedule further
/// local events and write outbound messages through the context.
///
/// Most models implement [`Behavior`] and wrap it in a [`LocalAgent`]
/// rather than implementing this trait directly.
pub trait Agent<M>: Send + 'static {
    /// Minimum of the local event queue, `None` when idle.
    fn time_of_next_event(&self) -> Option<Tick>;

    /// Handle every local event due at `now`.
    ///
    /// Returns the new local minimum, or `None` if no events remain.  A
    /// returned time earlier than `now` is a consistency error.
    fn do_event(&mut self, now: Tick, cx: &mut AgentContext<'_, M>) -> ModelResult<Option<Tick>>;

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;

    #[doc(hidden)]
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Typed agent logic.
///
/// `handle` receives the full batch of local events due at `now` (already
/// removed from the queue) and the queue itself so it can schedule more.
/// Inbound messages are in `cx.inbox()`.
///
/// # Example
///
/// ```rust,ignore
/// struct Ticker { period: u64, fired: u32 }
///
/// impl Behavior for Ticker {
///     type Msg   = &'static str;
///     type Event = ();
///
///     fn handle(&mut self, now: Tick, _: Vec<()>, local: &mut dyn EventQueue<()>,
///               cx: &mut AgentContext<'_, &'static str>) -> ModelResult<()> {
///         self.fired += 1;
///         cx.send(0, "tick")?;
///         local.enqueue((), now + self.period);
///         Ok(())
///     }
/// }
/// ```
pub trait Behavior: Send + 'static {
    /// Payload type of the model this behavior runs in.
    type Msg: Payload;

    /// Local event type.
    type Event: QueueItem;

    fn handle(
        &mut self,
        now:    Tick,
        events: Vec<Self::Event>,
        local:  &mut dyn EventQueue<Self::Event>,
        cx:     &mut AgentContext<'_, Self::Msg>,
    ) -> ModelResult<()>;
}

// ── LocalAgent ────────────────────────────────────────────────────────────────

/// [`Agent`] implementation pairing a [`Behavior`] with its local event queue.
pub struct LocalAgent<B: Behavior> {
    behavior: B,
    queue:    Box<dyn EventQueue<B::Event>>,
}

impl<B: Behavior> LocalAgent<B> {
    /// Wrap `behavior` with an empty heap-backed local queue.
    pub fn new(behavior: B) -> Self {
        Self::with_queue(behavior, QueueKind::Heap)
    }

    pub fn with_queue(behavior: B, kind: QueueKind) -> Self {
        Self { behavior, queue: kind.build() }
    }

    /// Builder form of [`schedule`](Self::schedule).
    pub fn with_event(mut self, event: B::Event, time: Tick) -> Self {
        self.schedule(event, time);
        self
    }

    /// Register a local event.  Between runs only; the simulator must be told
    /// about the new minimum via `Sim::schedule_agent`.
    pub fn schedule(&mut self, event: B::Event, time: Tick) {
        self.queue.enqueue(event, time);
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut B {
        &mut self.behavior
    }

    pub fn queue(&self) -> &dyn EventQueue<B::Event> {
        self.queue.as_ref()
    }
}

impl<B: Behavior> Agent<B::Msg> for LocalAgent<B> {
    fn time_of_next_event(&self) -> Option<Tick> {
        self.queue.min_time()
    }

    fn do_event(
        &mut self,
        now: Tick,
        cx:  &mut AgentContext<'_, B::Msg>,
    ) -> ModelResult<Option<Tick>> {
        let entity = cx.entity();
        let due = self.queue.min_time().ok_or(ModelError::EmptyQueue(entity))?;
        if due != now {
            return Err(ModelError::NotDue { entity, now, due });
        }

        let events = self.queue.dequeue_all_at(now);
        self.behavior.handle(now, events, self.queue.as_mut(), cx)?;

        match self.queue.min_time() {
            Some(next) if next < now => Err(ModelError::TimeRegression { entity, now, next }),
            next => Ok(next),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<B: Behavior + fmt::Debug> fmt::Debug for LocalAgent<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalAgent")
            .field("behavior", &self.behavior)
            .field("queue", &self.queue.name())
            .field("pending", &self.queue.len())
            .finish()
    }
}

//! Deferred structural changes.
//!
//! During dispatch agents only hold `&mut` to themselves, so anything that
//! reshapes the tree is queued as a [`ChangeRequest`] and applied by the
//! simulator in the mutation step, after forwarding and with no agent
//! running.  Requests are applied in submission order.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use evsim_core::{EntityId, PortId};

use crate::{Agent, Model, ModelError, ModelResult, Payload};

/// Id-only tree and wiring edits.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StructuralChange {
    Remove { entity: EntityId },
    Detach { entity: EntityId },
    Attach { entity: EntityId, parent: EntityId },
    Move { entity: EntityId, parent: EntityId },
    Connect { from: PortId, to: PortId },
    Disconnect { from: PortId, to: PortId },
    Reconnect { from: PortId, old: PortId, new: PortId },
}

impl StructuralChange {
    pub fn apply<M: Payload>(&self, model: &mut Model<M>) -> ModelResult<()> {
        match *self {
            StructuralChange::Remove { entity }            => model.remove_entity(entity),
            StructuralChange::Detach { entity }            => model.detach(entity),
            StructuralChange::Attach { entity, parent }    => model.attach(entity, parent),
            StructuralChange::Move { entity, parent }      => model.move_entity(entity, parent),
            StructuralChange::Connect { from, to }         => model.connect(from, to),
            StructuralChange::Disconnect { from, to }      => model.disconnect(from, to),
            StructuralChange::Reconnect { from, old, new } => model.reconnect(from, old, new),
        }
    }
}

type ApplyFn<M> = Box<dyn FnOnce(&mut Model<M>) -> ModelResult<()> + Send>;

/// One queued change to the model.
pub enum ChangeRequest<M> {
    AddAgent { parent: EntityId, name: String, agent: Box<dyn Agent<M>> },
    AddDomain { parent: EntityId, name: String },
    Structural(StructuralChange),
    /// Arbitrary edit, e.g. adding an agent and wiring its ports in one step.
    Apply(ApplyFn<M>),
}

impl<M: Payload> ChangeRequest<M> {
    pub fn add_agent(parent: EntityId, name: impl Into<String>, agent: impl Agent<M>) -> Self {
        ChangeRequest::AddAgent { parent, name: name.into(), agent: Box::new(agent) }
    }

    pub fn add_domain(parent: EntityId, name: impl Into<String>) -> Self {
        ChangeRequest::AddDomain { parent, name: name.into() }
    }

    pub fn custom(f: impl FnOnce(&mut Model<M>) -> ModelResult<()> + Send + 'static) -> Self {
        ChangeRequest::Apply(Box::new(f))
    }

    /// Apply this request to `model`.
    pub fn apply(self, model: &mut Model<M>) -> ModelResult<()> {
        match self {
            ChangeRequest::AddAgent { parent, name, agent } => {
                model.add_boxed_agent(parent, name, agent).map(|_| ())
            }
            ChangeRequest::AddDomain { parent, name } => model.add_domain(parent, name).map(|_| ()),
            ChangeRequest::Structural(change) => change.apply(model),
            ChangeRequest::Apply(f) => f(model),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ChangeRequest::AddAgent { .. } => "add-agent",
            ChangeRequest::AddDomain { .. } => "add-domain",
            ChangeRequest::Structural(s) => match s {
                StructuralChange::Remove { .. }     => "remove",
                StructuralChange::Detach { .. }     => "detach",
                StructuralChange::Attach { .. }     => "attach",
                StructuralChange::Move { .. }       => "move",
                StructuralChange::Connect { .. }    => "connect",
                StructuralChange::Disconnect { .. } => "disconnect",
                StructuralChange::Reconnect { .. }  => "reconnect",
            },
            ChangeRequest::Apply(_) => "apply",
        }
    }
}

impl<M> From<StructuralChange> for ChangeRequest<M> {
    fn from(change: StructuralChange) -> Self {
        ChangeRequest::Structural(change)
    }
}

impl<M> fmt::Debug for ChangeRequest<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeRequest::AddAgent { parent, name, .. } => f
                .debug_struct("AddAgent")
                .field("parent", parent)
                .field("name", name)
                .finish_non_exhaustive(),
            ChangeRequest::AddDomain { parent, name } => f
                .debug_struct("AddDomain")
                .field("parent", parent)
                .field("name", name)
                .finish(),
            ChangeRequest::Structural(s) => f.debug_tuple("Structural").field(s).finish(),
            ChangeRequest::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

// ── ChangeQueue ───────────────────────────────────────────────────────────────

/// FIFO of pending [`ChangeRequest`]s.
///
/// Shared by `&` with every agent dispatched in a cycle; concurrent agents
/// submit under the mutex and the simulator drains it single-threaded.
pub struct ChangeQueue<M> {
    pending: Mutex<VecDeque<ChangeRequest<M>>>,
    enabled: AtomicBool,
}

impl<M> ChangeQueue<M> {
    pub fn new(enabled: bool) -> Self {
        Self { pending: Mutex::new(VecDeque::new()), enabled: AtomicBool::new(enabled) }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Append a request.  Fails when dynamic mutation is disabled.
    pub fn submit(&self, request: ChangeRequest<M>) -> ModelResult<()> {
        if !self.is_enabled() {
            return Err(ModelError::MutationDisabled);
        }
        self.pending
            .lock()
            .map_err(|_| ModelError::QueuePoisoned)?
            .push_back(request);
        Ok(())
    }

    /// Take every pending request, oldest first.
    pub fn drain(&self) -> ModelResult<Vec<ChangeRequest<M>>> {
        let mut pending = self.pending.lock().map_err(|_| ModelError::QueuePoisoned)?;
        Ok(pending.drain(..).collect())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M> Default for ChangeQueue<M> {
    fn default() -> Self {
        Self::new(true)
    }
}

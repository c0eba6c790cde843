//! `Model<M>`: the entity arena and every tree, port and routing operation.

use std::fmt;
use std::sync::OnceLock;

use evsim_core::{Address, EntityId, PortId, Tick};
use evsim_port::{Message, Port, PortError, PortKind, PortTable};
use tracing::debug;

use crate::{Agent, Behavior, ChangeRequest, LocalAgent, ModelError, ModelResult, Payload};

// ── RunPhase ──────────────────────────────────────────────────────────────────

/// Where the owning simulator is in its cycle.
///
/// The tree may only change in [`Idle`](RunPhase::Idle) and
/// [`Mutating`](RunPhase::Mutating).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RunPhase {
    #[default]
    Idle,
    Dispatching,
    Forwarding,
    Mutating,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle        => "idle",
            RunPhase::Dispatching => "dispatch",
            RunPhase::Forwarding  => "forwarding",
            RunPhase::Mutating    => "mutation",
        };
        f.write_str(s)
    }
}

/// Scheduling-relevant tree change, drained by the simulator to keep its
/// global queue in step with the set of attached agents.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum JournalEntry {
    AgentAttached(EntityId),
    AgentDetached(EntityId),
}

// ── Entities ──────────────────────────────────────────────────────────────────

pub(crate) enum EntityKind<M> {
    Agent(Box<dyn Agent<M>>),
    Domain(Vec<EntityId>),
}

pub(crate) struct Entity<M> {
    pub(crate) name:    String,
    pub(crate) parent:  Option<EntityId>,
    pub(crate) kind:    EntityKind<M>,
    pub(crate) ports:   Vec<Port<M>>,
    pub(crate) router:  Option<u32>,
    /// Lazily computed; cleared whenever the path from the root changes.
    pub(crate) address: OnceLock<Address>,
}

impl<M> Entity<M> {
    fn new(name: String, parent: Option<EntityId>, kind: EntityKind<M>) -> Self {
        Self { name, parent, kind, ports: Vec::new(), router: None, address: OnceLock::new() }
    }

    fn children(&self) -> &[EntityId] {
        match &self.kind {
            EntityKind::Domain(children) => children,
            EntityKind::Agent(_) => &[],
        }
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

/// The participant tree: one root domain, nested domains and agents.
///
/// Entity `0` is the root domain, created by [`Model::new`].  Entities can be
/// *detached*: alive in the arena with no parent, invisible to scheduling
/// and routing until attached again.
pub struct Model<M> {
    pub(crate) entities: Vec<Option<Entity<M>>>,
    journal:             Vec<JournalEntry>,
    injected:            Vec<PortId>,
    phase:               RunPhase,
}

impl<M: Payload> Model<M> {
    /// A model holding only the root domain.
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = Entity::new(root_name.into(), None, EntityKind::Domain(Vec::new()));
        Self {
            entities: vec![Some(root)],
            journal:  Vec::new(),
            injected: Vec::new(),
            phase:    RunPhase::Idle,
        }
    }

    #[inline]
    pub fn root(&self) -> EntityId {
        EntityId(0)
    }

    // ── Lookup ────────────────────────────────────────────────────────────

    pub(crate) fn entity(&self, id: EntityId) -> ModelResult<&Entity<M>> {
        self.entities
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(ModelError::UnknownEntity(id))
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> ModelResult<&mut Entity<M>> {
        self.entities
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(ModelError::UnknownEntity(id))
    }

    fn children_mut(&mut self, domain: EntityId) -> ModelResult<&mut Vec<EntityId>> {
        match &mut self.entity_mut(domain)?.kind {
            EntityKind::Domain(children) => Ok(children),
            EntityKind::Agent(_) => Err(ModelError::NotADomain(domain)),
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entity(id).is_ok()
    }

    pub fn is_agent(&self, id: EntityId) -> bool {
        matches!(self.entity(id).map(|e| &e.kind), Ok(EntityKind::Agent(_)))
    }

    pub fn is_domain(&self, id: EntityId) -> bool {
        matches!(self.entity(id).map(|e| &e.kind), Ok(EntityKind::Domain(_)))
    }

    /// Number of live entities, root included.
    pub fn entity_count(&self) -> usize {
        self.entities.iter().flatten().count()
    }

    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.entity(id).ok().map(|e| e.name.as_str())
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.entity(id).ok().and_then(|e| e.parent)
    }

    /// `true` if `id` is reachable from the root.
    pub fn is_attached(&self, id: EntityId) -> bool {
        self.address(id).is_some()
    }

    /// Sibling-index path from the root, or `None` if `id` is missing or
    /// not attached.
    pub fn address(&self, id: EntityId) -> Option<&Address> {
        let entity = self.entity(id).ok()?;
        if let Some(cached) = entity.address.get() {
            return Some(cached);
        }
        let computed = match entity.parent {
            None if id == self.root() => Address::root(),
            None => return None,
            Some(parent) => {
                let index = self.entity(parent).ok()?.children().iter().position(|c| *c == id)?;
                self.address(parent)?.child(index as u32)
            }
        };
        Some(entity.address.get_or_init(|| computed))
    }

    /// The attached entity at `address`.
    pub fn find(&self, address: &Address) -> Option<EntityId> {
        let mut current = self.root();
        for &index in address.as_slice() {
            current = *self.entity(current).ok()?.children().get(index as usize)?;
        }
        Some(current)
    }

    /// Direct children of `domain`, in sibling order.
    pub fn list_domain_entities(&self, domain: EntityId) -> ModelResult<&[EntityId]> {
        match &self.entity(domain)?.kind {
            EntityKind::Domain(children) => Ok(children),
            EntityKind::Agent(_) => Err(ModelError::NotADomain(domain)),
        }
    }

    /// Agents below `domain`: direct children only, or the whole subtree in
    /// depth-first order when `recursive`.
    pub fn list_all_agents(&self, domain: EntityId, recursive: bool) -> ModelResult<Vec<EntityId>> {
        let mut agents = Vec::new();
        let mut stack: Vec<EntityId> =
            self.list_domain_entities(domain)?.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            match &self.entity(id)?.kind {
                EntityKind::Agent(_) => agents.push(id),
                EntityKind::Domain(children) if recursive => {
                    stack.extend(children.iter().rev().copied());
                }
                EntityKind::Domain(_) => {}
            }
        }
        Ok(agents)
    }

    /// Every agent currently attached to the tree.
    pub fn attached_agents(&self) -> Vec<EntityId> {
        self.list_all_agents(self.root(), true).unwrap_or_default()
    }

    fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            if let Ok(entity) = self.entity(next) {
                stack.extend(entity.children().iter().copied());
            }
        }
        out
    }

    // ── Phase and journal ─────────────────────────────────────────────────

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Set by the simulator as it moves through a cycle.
    pub fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
    }

    fn ensure_mutable(&self) -> ModelResult<()> {
        match self.phase {
            RunPhase::Idle | RunPhase::Mutating => Ok(()),
            phase => Err(ModelError::TreeLocked(phase)),
        }
    }

    /// Take the scheduling journal accumulated since the last call.
    pub fn take_journal(&mut self) -> Vec<JournalEntry> {
        std::mem::take(&mut self.journal)
    }

    fn record_subtree(&mut self, id: EntityId, attached: bool) {
        for member in self.subtree(id) {
            if self.is_agent(member) {
                self.journal.push(if attached {
                    JournalEntry::AgentAttached(member)
                } else {
                    JournalEntry::AgentDetached(member)
                });
            }
        }
    }

    fn invalidate_subtree(&mut self, id: EntityId) {
        for member in self.subtree(id) {
            if let Ok(entity) = self.entity_mut(member) {
                entity.address.take();
            }
        }
    }

    // ── Tree construction ─────────────────────────────────────────────────

    /// Add `agent` as the last child of `parent`.
    pub fn add_agent(
        &mut self,
        parent: EntityId,
        name:   impl Into<String>,
        agent:  impl Agent<M>,
    ) -> ModelResult<EntityId> {
        self.add_boxed_agent(parent, name.into(), Box::new(agent))
    }

    pub fn add_boxed_agent(
        &mut self,
        parent: EntityId,
        name:   String,
        agent:  Box<dyn Agent<M>>,
    ) -> ModelResult<EntityId> {
        self.insert(parent, name, EntityKind::Agent(agent))
    }

    /// Add an empty domain as the last child of `parent`.
    pub fn add_domain(&mut self, parent: EntityId, name: impl Into<String>) -> ModelResult<EntityId> {
        self.insert(parent, name.into(), EntityKind::Domain(Vec::new()))
    }

    fn insert(&mut self, parent: EntityId, name: String, kind: EntityKind<M>) -> ModelResult<EntityId> {
        self.ensure_mutable()?;
        self.children_mut(parent)?;
        let id = EntityId::try_from(self.entities.len())
            .map_err(|_| ModelError::Failure("entity id space exhausted".into()))?;
        self.entities.push(Some(Entity::new(name, Some(parent), kind)));
        self.children_mut(parent)?.push(id);
        if self.is_attached(id) {
            self.record_subtree(id, true);
        }
        Ok(id)
    }

    /// Delete an agent or an empty domain.
    ///
    /// Every connection into one of its ports is removed with it.
    pub fn remove_entity(&mut self, id: EntityId) -> ModelResult<()> {
        self.ensure_mutable()?;
        if id == self.root() {
            return Err(ModelError::RootFixed);
        }
        let children = self.entity(id)?.children().len();
        if children > 0 {
            return Err(ModelError::DomainNotEmpty { domain: id, children });
        }
        if self.entity(id)?.parent.is_some() {
            self.detach(id)?;
        }
        self.entities[id.index()] = None;
        for entity in self.entities.iter_mut().flatten() {
            for port in &mut entity.ports {
                port.disconnect_entity(id);
            }
        }
        debug!(entity = %id, "removed entity");
        Ok(())
    }

    /// Unlink `id` (and its subtree) from its parent, keeping it in the
    /// arena.
    pub fn detach(&mut self, id: EntityId) -> ModelResult<()> {
        self.ensure_mutable()?;
        if id == self.root() {
            return Err(ModelError::RootFixed);
        }
        let parent = self.entity(id)?.parent.ok_or(ModelError::Detached(id))?;
        let was_attached = self.is_attached(id);

        let siblings = self.children_mut(parent)?;
        let Some(pos) = siblings.iter().position(|c| *c == id) else {
            return Err(ModelError::Detached(id));
        };
        siblings.remove(pos);
        let shifted: Vec<EntityId> = siblings[pos..].to_vec();

        if was_attached {
            self.record_subtree(id, false);
        }
        self.entity_mut(id)?.parent = None;
        self.invalidate_subtree(id);
        for sibling in shifted {
            self.invalidate_subtree(sibling);
        }
        Ok(())
    }

    /// Make the detached entity `id` the last child of `parent`.
    pub fn attach(&mut self, id: EntityId, parent: EntityId) -> ModelResult<()> {
        self.ensure_mutable()?;
        if id == self.root() {
            return Err(ModelError::RootFixed);
        }
        if let Some(existing) = self.entity(id)?.parent {
            return Err(ModelError::AlreadyAttached { entity: id, parent: existing });
        }
        self.children_mut(parent)?;
        if self.subtree(id).contains(&parent) {
            return Err(ModelError::Cycle { entity: id, parent });
        }

        self.children_mut(parent)?.push(id);
        self.entity_mut(id)?.parent = Some(parent);
        self.invalidate_subtree(id);
        if self.is_attached(id) {
            self.record_subtree(id, true);
        }
        Ok(())
    }

    /// Reparent `id` under `parent`.
    pub fn move_entity(&mut self, id: EntityId, parent: EntityId) -> ModelResult<()> {
        self.ensure_mutable()?;
        if id == self.root() {
            return Err(ModelError::RootFixed);
        }
        self.children_mut(parent)?;
        if self.subtree(id).contains(&parent) {
            return Err(ModelError::Cycle { entity: id, parent });
        }
        if self.entity(id)?.parent.is_some() {
            self.detach(id)?;
        }
        self.attach(id, parent)
    }

    // ── Ports ─────────────────────────────────────────────────────────────

    /// Give `id` a new port.  Router ports go through
    /// [`enable_routing`](Self::enable_routing).
    pub fn add_port(&mut self, id: EntityId, kind: PortKind) -> ModelResult<PortId> {
        if kind == PortKind::Router {
            return self.enable_routing(id);
        }
        self.ensure_mutable()?;
        let entity = self.entity_mut(id)?;
        let port = PortId::new(id, entity.ports.len() as u32);
        entity.ports.push(Port::new(port, kind));
        Ok(port)
    }

    /// Give `id` a router port, or return the one it already has.
    pub fn enable_routing(&mut self, id: EntityId) -> ModelResult<PortId> {
        self.ensure_mutable()?;
        let entity = self.entity_mut(id)?;
        if let Some(slot) = entity.router {
            return Ok(PortId::new(id, slot));
        }
        let slot = entity.ports.len() as u32;
        let port = PortId::new(id, slot);
        entity.ports.push(Port::new(port, PortKind::Router));
        entity.router = Some(slot);
        Ok(port)
    }

    pub fn routing_port(&self, id: EntityId) -> Option<PortId> {
        let slot = self.entity(id).ok()?.router?;
        Some(PortId::new(id, slot))
    }

    pub fn port(&self, id: PortId) -> Option<&Port<M>> {
        self.entity(id.entity).ok()?.ports.get(id.slot as usize)
    }

    pub fn port_mut(&mut self, id: PortId) -> Option<&mut Port<M>> {
        self.entity_mut(id.entity).ok()?.ports.get_mut(id.slot as usize)
    }

    fn checked_port_mut(&mut self, id: PortId) -> ModelResult<&mut Port<M>> {
        self.port_mut(id).ok_or(ModelError::Port(PortError::UnknownPort(id)))
    }

    pub fn ports(&self, id: EntityId) -> &[Port<M>] {
        self.entity(id).map(|e| e.ports.as_slice()).unwrap_or(&[])
    }

    pub fn connect(&mut self, from: PortId, to: PortId) -> ModelResult<()> {
        self.ensure_mutable()?;
        if self.port(to).is_none() {
            return Err(PortError::UnknownPort(to).into());
        }
        Ok(self.checked_port_mut(from)?.connect(to)?)
    }

    pub fn disconnect(&mut self, from: PortId, to: PortId) -> ModelResult<()> {
        self.ensure_mutable()?;
        Ok(self.checked_port_mut(from)?.disconnect(to)?)
    }

    /// Swap `from → old` for `from → new` in one step.
    pub fn reconnect(&mut self, from: PortId, old: PortId, new: PortId) -> ModelResult<()> {
        self.ensure_mutable()?;
        if self.port(new).is_none() {
            return Err(PortError::UnknownPort(new).into());
        }
        Ok(self.checked_port_mut(from)?.reconnect(old, new)?)
    }

    /// Write a message into `port`'s buffer from outside any agent, e.g. to
    /// seed a run.
    ///
    /// The port joins the sources of the next forwarding phase, so a message
    /// injected on a connected port travels on even if its owner is not due.
    pub fn inject(&mut self, port: PortId, message: Message<M>) -> ModelResult<()> {
        self.checked_port_mut(port)?.send(message);
        if !self.injected.contains(&port) {
            self.injected.push(port);
        }
        Ok(())
    }

    /// Take the ports written by [`inject`](Self::inject) since the last
    /// call.
    pub fn take_injected(&mut self) -> Vec<PortId> {
        std::mem::take(&mut self.injected)
    }

    // ── Agents ────────────────────────────────────────────────────────────

    pub(crate) fn boxed_agent(&self, id: EntityId) -> ModelResult<&dyn Agent<M>> {
        match &self.entity(id)?.kind {
            EntityKind::Agent(agent) => Ok(agent.as_ref()),
            EntityKind::Domain(_) => Err(ModelError::NotAnAgent(id)),
        }
    }

    pub fn time_of_next_event(&self, id: EntityId) -> Option<Tick> {
        self.boxed_agent(id).ok()?.time_of_next_event()
    }

    /// Downcast the agent at `id` to its concrete type.
    pub fn agent<A: Agent<M>>(&self, id: EntityId) -> Option<&A> {
        self.boxed_agent(id).ok()?.as_any().downcast_ref::<A>()
    }

    pub fn agent_mut<A: Agent<M>>(&mut self, id: EntityId) -> Option<&mut A> {
        match &mut self.entity_mut(id).ok()?.kind {
            EntityKind::Agent(agent) => agent.as_any_mut().downcast_mut::<A>(),
            EntityKind::Domain(_) => None,
        }
    }

    /// State of a [`LocalAgent`]-wrapped behavior.
    pub fn behavior<B: Behavior<Msg = M>>(&self, id: EntityId) -> Option<&B> {
        self.agent::<LocalAgent<B>>(id).map(LocalAgent::behavior)
    }

    pub fn behavior_mut<B: Behavior<Msg = M>>(&mut self, id: EntityId) -> Option<&mut B> {
        self.agent_mut::<LocalAgent<B>>(id).map(LocalAgent::behavior_mut)
    }

    // ── Change requests ───────────────────────────────────────────────────

    /// Apply one queued change.
    pub fn apply_change(&mut self, request: ChangeRequest<M>) -> ModelResult<()> {
        let label = request.label();
        request.apply(self)?;
        debug!(change = label, "applied change request");
        Ok(())
    }
}

impl<M: Payload> PortTable<M> for Model<M> {
    fn port(&self, id: PortId) -> Option<&Port<M>> {
        Model::port(self, id)
    }

    fn port_mut(&mut self, id: PortId) -> Option<&mut Port<M>> {
        Model::port_mut(self, id)
    }

    fn address_of(&self, entity: EntityId) -> Option<&Address> {
        self.address(entity)
    }

    fn routing_child(&self, entity: EntityId, index: u32) -> Option<PortId> {
        let child = *self.entity(entity).ok()?.children().get(index as usize)?;
        self.routing_port(child)
    }

    fn routing_parent(&self, entity: EntityId) -> Option<PortId> {
        self.routing_port(self.parent(entity)?)
    }
}

impl<M> fmt::Debug for Model<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("entities", &self.entities.iter().flatten().count())
            .field("phase", &self.phase)
            .finish()
    }
}

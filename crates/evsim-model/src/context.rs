//! What an agent can see and touch while handling its events.

use evsim_core::{Address, EntityId, PortId, Tick};
use evsim_port::{Message, Port};

use crate::{ChangeQueue, ChangeRequest, ModelError, ModelResult, Payload};

/// Per-dispatch view handed to [`Agent::do_event`][crate::Agent::do_event].
///
/// Built by the simulator for one agent at one tick.  On construction the
/// messages delivered to the agent's ports are moved into the inbox: the
/// buffers of its endpoint ports, and whatever on its router port is
/// addressed to the agent itself.  Messages still waiting on a connected port
/// stay there for the next forwarding phase, alongside anything the agent
/// sends during the call.
///
/// The context only borrows the agent's own ports.  Agents never touch each
/// other during dispatch; structural changes go through
/// [`request`](Self::request) and are applied after forwarding.
pub struct AgentContext<'a, M> {
    now:     Tick,
    entity:  EntityId,
    address: &'a Address,
    ports:   &'a mut [Port<M>],
    router:  Option<u32>,
    inbox:   Vec<Message<M>>,
    changes: &'a ChangeQueue<M>,
}

impl<'a, M: Payload> AgentContext<'a, M> {
    pub fn new(
        now:     Tick,
        entity:  EntityId,
        address: &'a Address,
        ports:   &'a mut [Port<M>],
        router:  Option<u32>,
        changes: &'a ChangeQueue<M>,
    ) -> Self {
        let inbox = ports.iter_mut().flat_map(|p| p.take_delivered(address)).collect();
        Self { now, entity, address, ports, router, inbox, changes }
    }

    #[inline]
    pub fn now(&self) -> Tick {
        self.now
    }

    #[inline]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// This agent's tree address.
    pub fn address(&self) -> &Address {
        self.address
    }

    /// Messages delivered since the previous dispatch, in port-slot order.
    pub fn inbox(&self) -> &[Message<M>] {
        &self.inbox
    }

    pub fn take_inbox(&mut self) -> Vec<Message<M>> {
        std::mem::take(&mut self.inbox)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Id of this agent's router port, if routing is enabled.
    pub fn routing_port(&self) -> Option<PortId> {
        self.router.map(|slot| PortId::new(self.entity, slot))
    }

    /// Write `content` to the port in `slot`.
    pub fn send(&mut self, slot: u32, content: M) -> ModelResult<()> {
        let port = self.port_mut(slot)?;
        let id = port.id();
        port.send(Message::new(id, content));
        Ok(())
    }

    /// Write `content` to switch port `slot`, keyed for delivery to `peer`.
    pub fn send_to_peer(&mut self, slot: u32, peer: EntityId, content: M) -> ModelResult<()> {
        let port = self.port_mut(slot)?;
        let id = port.id();
        port.send(Message::to_peer(id, peer, content));
        Ok(())
    }

    /// Send `content` through the router port to the entity at `address`.
    pub fn send_addressed(&mut self, address: Address, content: M) -> ModelResult<()> {
        let slot = self.router.ok_or(ModelError::RoutingDisabled(self.entity))?;
        let port = self.port_mut(slot)?;
        let id = port.id();
        port.send(Message::addressed(id, address, content));
        Ok(())
    }

    /// Queue a structural change for the mutation step at the end of this
    /// cycle.
    pub fn request(&self, change: impl Into<ChangeRequest<M>>) -> ModelResult<()> {
        self.changes.submit(change.into())
    }

    fn port_mut(&mut self, slot: u32) -> ModelResult<&mut Port<M>> {
        let entity = self.entity;
        self.ports
            .get_mut(slot as usize)
            .ok_or(ModelError::UnknownPortSlot { entity, slot })
    }
}

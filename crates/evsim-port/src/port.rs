//! `Port<M>` and its wiring rules.

use std::fmt;

use evsim_core::{Address, EntityId, PortId};

use crate::{Message, PortError, PortResult};

/// How a port picks destinations for its pending messages.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortKind {
    /// At most one outgoing connection.
    #[default]
    Single,
    /// Every message is copied to every connection.
    Broadcast,
    /// Each connection is keyed by the destination's owning entity; a
    /// message goes to the connection matching its `peer`.
    Switch,
    /// Hierarchical routing by tree address.  Never wired by hand: next
    /// hops are resolved through the entity tree.
    Router,
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortKind::Single    => "single",
            PortKind::Broadcast => "broadcast",
            PortKind::Switch    => "switch",
            PortKind::Router    => "router",
        };
        f.write_str(s)
    }
}

/// A message buffer plus its outgoing connections.
///
/// Connections are directed: `self → destination`.  A port with no
/// connections is an *endpoint*: messages written to it stay in its buffer
/// until the owner takes them.
pub struct Port<M> {
    id:          PortId,
    kind:        PortKind,
    connections: Vec<PortId>,
    buffer:      Vec<Message<M>>,
}

impl<M> Port<M> {
    pub fn new(id: PortId, kind: PortKind) -> Self {
        Self { id, kind, connections: Vec::new(), buffer: Vec::new() }
    }

    #[inline]
    pub fn id(&self) -> PortId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> PortKind {
        self.kind
    }

    /// Outgoing connections in the order they were made.
    pub fn connections(&self) -> &[PortId] {
        &self.connections
    }

    pub fn is_connected_to(&self, to: PortId) -> bool {
        self.connections.contains(&to)
    }

    /// `true` if the port has no outgoing connections.
    ///
    /// Router ports have no connections but are endpoints only for messages
    /// addressed to their own entity, so this is always `false` for them.
    pub fn is_endpoint(&self) -> bool {
        self.kind != PortKind::Router && self.connections.is_empty()
    }

    /// Add a connection `self → to`.
    pub fn connect(&mut self, to: PortId) -> PortResult<()> {
        if let Some(existing) = self.conflict(to, None)? {
            return Err(PortError::AlreadyConnected { from: self.id, to: existing });
        }
        self.connections.push(to);
        Ok(())
    }

    /// Remove the connection `self → to`.
    pub fn disconnect(&mut self, to: PortId) -> PortResult<()> {
        let pos = self.position(to)?;
        self.connections.remove(pos);
        Ok(())
    }

    /// Replace `self → old` with `self → new`.
    ///
    /// Either both steps happen or neither does.
    pub fn reconnect(&mut self, old: PortId, new: PortId) -> PortResult<()> {
        let pos = self.position(old)?;
        if let Some(existing) = self.conflict(new, Some(pos))? {
            return Err(PortError::AlreadyConnected { from: self.id, to: existing });
        }
        self.connections[pos] = new;
        Ok(())
    }

    /// Drop every connection into a port owned by `entity`.
    ///
    /// Returns how many were removed.
    pub fn disconnect_entity(&mut self, entity: EntityId) -> usize {
        let before = self.connections.len();
        self.connections.retain(|c| c.entity != entity);
        before - self.connections.len()
    }

    /// Write a message into this port's buffer.
    pub fn send(&mut self, message: Message<M>) {
        self.buffer.push(message);
    }

    /// Messages currently buffered, oldest first.
    pub fn messages(&self) -> &[Message<M>] {
        &self.buffer
    }

    pub fn has_messages(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Drain the buffer.
    pub fn take_messages(&mut self) -> Vec<Message<M>> {
        std::mem::take(&mut self.buffer)
    }

    /// Drain the messages that have arrived here for good: the whole buffer
    /// of an endpoint, or the messages addressed to `own` on a router port.
    ///
    /// Messages still waiting to be forwarded stay buffered.
    pub fn take_delivered(&mut self, own: &Address) -> Vec<Message<M>> {
        match self.kind {
            PortKind::Router => {
                let (mine, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.buffer)
                    .into_iter()
                    .partition(|m| m.address() == Some(own));
                self.buffer = pending;
                mine
            }
            _ if self.connections.is_empty() => self.take_messages(),
            _ => Vec::new(),
        }
    }

    /// Connections a non-router message should be copied to.
    pub(crate) fn destinations(&self, message: &Message<M>) -> PortResult<Vec<PortId>> {
        match self.kind {
            PortKind::Single | PortKind::Broadcast => Ok(self.connections.clone()),
            PortKind::Switch => {
                let peer = message.peer();
                self.connections
                    .iter()
                    .find(|c| Some(c.entity) == peer)
                    .map(|c| vec![*c])
                    .ok_or(PortError::NoDestination { port: self.id, peer })
            }
            PortKind::Router => Ok(Vec::new()),
        }
    }

    fn position(&self, to: PortId) -> PortResult<usize> {
        self.connections
            .iter()
            .position(|c| *c == to)
            .ok_or(PortError::NotConnected { from: self.id, to })
    }

    /// The connection that would clash with adding `to`, ignoring the one at
    /// `skip`.
    fn conflict(&self, to: PortId, skip: Option<usize>) -> PortResult<Option<PortId>> {
        let others = self
            .connections
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .map(|(_, c)| *c);
        let clash = match self.kind {
            PortKind::Router    => return Err(PortError::NotWirable(self.id)),
            PortKind::Single    => others.into_iter().next(),
            PortKind::Broadcast => others.into_iter().find(|c| *c == to),
            PortKind::Switch    => others.into_iter().find(|c| c.entity == to.entity),
        };
        Ok(clash)
    }
}

impl<M> fmt::Debug for Port<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("connections", &self.connections)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

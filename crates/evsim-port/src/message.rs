//! Immutable message envelopes.

use std::fmt;
use std::sync::Arc;

use evsim_core::{Address, EntityId, PortId};

/// A message travelling through the port fabric.
///
/// The envelope is immutable once sent; only the fabric's hop counter
/// changes as it moves.  The payload sits behind an `Arc` so broadcast
/// copies share it instead of requiring `M: Clone`.
///
/// Routing metadata:
///
/// - `peer`: the entity a switch port should deliver to.
/// - `address`: the tree address a router port should deliver to.
pub struct Message<M> {
    source:  PortId,
    peer:    Option<EntityId>,
    address: Option<Address>,
    content: Arc<M>,
    hops:    u32,
}

impl<M> Message<M> {
    /// A plain message for point-to-point or broadcast ports.
    pub fn new(source: PortId, content: M) -> Self {
        Self {
            source,
            peer: None,
            address: None,
            content: Arc::new(content),
            hops: 0,
        }
    }

    /// A message a switch port routes to the connection registered under
    /// `peer`.
    pub fn to_peer(source: PortId, peer: EntityId, content: M) -> Self {
        Self { peer: Some(peer), ..Self::new(source, content) }
    }

    /// A message router ports deliver to the entity at `address`.
    pub fn addressed(source: PortId, address: Address, content: M) -> Self {
        Self { address: Some(address), ..Self::new(source, content) }
    }

    #[inline]
    pub fn source(&self) -> PortId {
        self.source
    }

    #[inline]
    pub fn peer(&self) -> Option<EntityId> {
        self.peer
    }

    #[inline]
    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    #[inline]
    pub fn content(&self) -> &M {
        &self.content
    }

    /// Shared handle to the payload.
    pub fn shared_content(&self) -> Arc<M> {
        Arc::clone(&self.content)
    }

    /// Number of forwarding hops this message has taken.
    #[inline]
    pub fn hops(&self) -> u32 {
        self.hops
    }

    pub(crate) fn hopped(mut self) -> Self {
        self.hops += 1;
        self
    }
}

impl<M> Clone for Message<M> {
    fn clone(&self) -> Self {
        Self {
            source:  self.source,
            peer:    self.peer,
            address: self.address.clone(),
            content: Arc::clone(&self.content),
            hops:    self.hops,
        }
    }
}

impl<M: fmt::Debug> fmt::Debug for Message<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("source", &self.source)
            .field("peer", &self.peer)
            .field("address", &self.address)
            .field("content", &self.content)
            .field("hops", &self.hops)
            .finish()
    }
}

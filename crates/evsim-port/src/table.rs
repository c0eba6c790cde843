use evsim_core::{Address, EntityId, PortId};

use crate::Port;

/// Port storage as seen by the forwarding code.
///
/// The entity tree implements this; forwarding only needs port lookup plus
/// enough of the tree to resolve router next hops.
pub trait PortTable<M> {
    fn port(&self, id: PortId) -> Option<&Port<M>>;

    fn port_mut(&mut self, id: PortId) -> Option<&mut Port<M>>;

    /// Tree address of `entity`, or `None` if it is not attached.
    fn address_of(&self, entity: EntityId) -> Option<&Address>;

    /// Router port of the `index`-th child of `entity`, if that child exists
    /// and has routing enabled.
    fn routing_child(&self, entity: EntityId, index: u32) -> Option<PortId>;

    /// Router port of `entity`'s parent, if it has one with routing enabled.
    fn routing_parent(&self, entity: EntityId) -> Option<PortId>;
}

use evsim_core::{Address, EntityId, ErrorKind, PortId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("{from} is already connected to {to}")]
    AlreadyConnected { from: PortId, to: PortId },

    #[error("{from} is not connected to {to}")]
    NotConnected { from: PortId, to: PortId },

    #[error("routing port {0} is wired by the entity tree and cannot be connected by hand")]
    NotWirable(PortId),

    #[error("port {0} not found")]
    UnknownPort(PortId),

    #[error("port {0} belongs to an entity that is not attached to the tree")]
    Detached(PortId),

    #[error("switch port {port} has no connection registered for peer {peer:?}")]
    NoDestination { port: PortId, peer: Option<EntityId> },

    #[error("routing port {port} has no next hop towards {address}")]
    NoRoute { port: PortId, address: Address },

    #[error("message on routing port {0} carries no address")]
    Unaddressed(PortId),

    #[error("forwarding exceeded {max_hops} hops with {pending} ports still pending")]
    HopLimitExceeded { max_hops: usize, pending: usize },

    #[error("direct forwarding delivered to {0}, which needs a further hop")]
    UnexpectedRelay(PortId),

    #[error("routed forwarding reached {port} at depth {depth}, which does not descend the tree")]
    NonHierarchicalHop { port: PortId, depth: usize },
}

impl PortError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PortError::AlreadyConnected { .. }
            | PortError::NotConnected { .. }
            | PortError::NotWirable(_)
            | PortError::UnknownPort(_)
            | PortError::Detached(_) => ErrorKind::Configuration,

            PortError::NoDestination { .. }
            | PortError::NoRoute { .. }
            | PortError::Unaddressed(_)
            | PortError::HopLimitExceeded { .. }
            | PortError::UnexpectedRelay(_)
            | PortError::NonHierarchicalHop { .. } => ErrorKind::Protocol,
        }
    }
}

pub type PortResult<T> = Result<T, PortError>;

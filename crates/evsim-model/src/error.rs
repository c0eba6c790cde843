use evsim_core::{EntityId, ErrorKind, Tick};
use evsim_port::PortError;
use thiserror::Error;

use crate::RunPhase;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Port(#[from] PortError),

    #[error("entity {0} does not exist")]
    UnknownEntity(EntityId),

    #[error("entity {0} is not a domain")]
    NotADomain(EntityId),

    #[error("entity {0} is not an agent")]
    NotAnAgent(EntityId),

    #[error("domain {domain} still has {children} children")]
    DomainNotEmpty { domain: EntityId, children: usize },

    #[error("the root domain cannot be removed, detached or moved")]
    RootFixed,

    #[error("entity {entity} is already attached under {parent}")]
    AlreadyAttached { entity: EntityId, parent: EntityId },

    #[error("entity {0} is not attached to the tree")]
    Detached(EntityId),

    #[error("attaching {entity} under {parent} would create a cycle")]
    Cycle { entity: EntityId, parent: EntityId },

    #[error("the entity tree cannot change during the {0} phase")]
    TreeLocked(RunPhase),

    #[error("agent {0} appears twice in one dispatch batch")]
    DuplicateDispatch(EntityId),

    #[error("agent {0} was dispatched with an empty local event queue")]
    EmptyQueue(EntityId),

    #[error("agent {entity} was dispatched at {now} but its next event is at {due}")]
    NotDue { entity: EntityId, now: Tick, due: Tick },

    #[error("agent {entity} returned next event time {next}, before the current time {now}")]
    TimeRegression { entity: EntityId, now: Tick, next: Tick },

    #[error("entity {entity} has no port in slot {slot}")]
    UnknownPortSlot { entity: EntityId, slot: u32 },

    #[error("entity {0} has no routing port")]
    RoutingDisabled(EntityId),

    #[error("dynamic mutation is disabled for this simulation")]
    MutationDisabled,

    #[error("the change-request queue lock was poisoned")]
    QueuePoisoned,

    #[error("{0}")]
    Failure(String),
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Port(e) => e.kind(),

            ModelError::UnknownEntity(_)
            | ModelError::NotADomain(_)
            | ModelError::NotAnAgent(_)
            | ModelError::AlreadyAttached { .. }
            | ModelError::Detached(_)
            | ModelError::Cycle { .. }
            | ModelError::TreeLocked(_)
            | ModelError::UnknownPortSlot { .. }
            | ModelError::RoutingDisabled(_)
            | ModelError::MutationDisabled => ErrorKind::Configuration,

            ModelError::DomainNotEmpty { .. } | ModelError::RootFixed => ErrorKind::Precondition,

            ModelError::DuplicateDispatch(_)
            | ModelError::EmptyQueue(_)
            | ModelError::NotDue { .. }
            | ModelError::TimeRegression { .. }
            | ModelError::QueuePoisoned
            | ModelError::Failure(_) => ErrorKind::Consistency,
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

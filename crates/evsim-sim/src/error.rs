use evsim_core::{Address, EntityId, ErrorKind, Tick};
use evsim_model::ModelError;
use evsim_port::PortError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    #[error(
        "agent {name:?} ({entity}) at {} failed at {now}: {source}",
        .address.as_ref().map_or_else(|| "<detached>".to_string(), ToString::to_string)
    )]
    Agent {
        entity:  EntityId,
        name:    String,
        address: Option<Address>,
        now:     Tick,
        #[source]
        source:  ModelError,
    },

    #[error("forwarding failed at {now}: {source}")]
    Forwarding {
        now:    Tick,
        #[source]
        source: PortError,
    },

    #[error("{request} change request failed at {now}: {source}")]
    Mutation {
        now:     Tick,
        request: &'static str,
        #[source]
        source:  ModelError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("simulation has failed and cannot run again")]
    Failed,
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::Config(_) => ErrorKind::Configuration,
            SimError::Agent { source, .. } | SimError::Mutation { source, .. } => source.kind(),
            SimError::Forwarding { source, .. } => source.kind(),
            SimError::Model(e) => e.kind(),
            SimError::Failed => ErrorKind::Precondition,
        }
    }

    /// The entity whose dispatch failed, if any.
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            SimError::Agent { entity, .. } => Some(*entity),
            _ => None,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;

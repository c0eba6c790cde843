//! `evsim-model`: the entity tree that a simulation runs over.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                              |
//! |-------------|-----------------------------------------------------------------------|
//! | [`model`]   | `Model<M>` arena: agents, domains, addresses, ports, `RunPhase`       |
//! | [`agent`]   | `Agent<M>` contract, typed `Behavior` + `LocalAgent` adapter          |
//! | [`context`] | `AgentContext` - what an agent sees while handling its events         |
//! | [`change`]  | `ChangeRequest`, `StructuralChange`, `ChangeQueue`                    |
//! | [`dispatch`]| `AgentSlot` - disjoint `&mut` access to due agents for dispatch       |
//! | [`error`]   | `ModelError`, `ModelResult<T>`                                        |
//!
//! # Ownership
//!
//! The [`Model`] owns every entity in a flat arena indexed by
//! [`EntityId`](evsim_core::EntityId).  Domains list their children by id and
//! children store their parent's id, so the tree has no reference cycles.
//! Ids are never reused: a removed entity leaves a hole.
//!
//! `M` is the message payload type shared by every port in the model.

pub mod agent;
pub mod change;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod model;


pub use agent::{Agent, Behavior, LocalAgent, Payload};
pub use change::{ChangeQueue, ChangeRequest, StructuralChange};
pub use context::AgentContext;
pub use dispatch::AgentSlot;
pub use error::{ModelError, ModelResult};
pub use model::{JournalEntry, Model, RunPhase};

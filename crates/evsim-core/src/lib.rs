//! `evsim-core`: foundational types for the `evsim` discrete-event kernel.
//!
//! This crate is a dependency of every other `evsim-*` crate.  It intentionally
//! has no `evsim-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module          | Contents                                              |
//! |-----------------|-------------------------------------------------------|
//! | [`ids`]         | `EntityId`, `PortId`                                  |
//! | [`time`]        | `Tick` (with the `INFINITY` sentinel)                 |
//! | [`address`]     | `Address` - sibling-index path from the tree root     |
//! | [`rng`]         | `SimRng` (simulation-level, seeded)                   |
//! | [`error`]       | `ErrorKind`, `AddressParseError`                      |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |

pub mod address;
pub mod error;
pub mod ids;
pub mod rng;
pub mod time;

#[cfg(test)]
mod tests;

// ── Re-exports ────────────────────────────────────────────────────────────────

pub use address::Address;
pub use error::{AddressParseError, ErrorKind};
pub use ids::{EntityId, PortId};
pub use rng::SimRng;
pub use time::Tick;

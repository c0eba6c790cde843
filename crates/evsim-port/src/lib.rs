//! `evsim-port`: message ports and forwarding strategies.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                       |
//! |---------------|----------------------------------------------------------------|
//! | [`message`]   | `Message<M>` - immutable envelope around an `Arc<M>` payload   |
//! | [`port`]      | `Port<M>`, `PortKind` (single, broadcast, switch, router)      |
//! | [`table`]     | `PortTable<M>` - port storage seen by the forwarding code      |
//! | [`forward`]   | `forward_pending`, `needs_forwarding`                          |
//! | [`strategy`]  | `ForwardingStrategy` + direct / recursive / routed, `ForwardingKind` |
//! | [`error`]     | `PortError`, `PortResult<T>`                                   |
//!
//! # Delivery model
//!
//! A port holds one buffer.  If the port has somewhere to send a message
//! (a connection, or for router ports a next hop), the message is *pending*
//! and the next forwarding pass moves it on.  Otherwise the port is the
//! message's endpoint and the message stays put until the owning agent reads
//! it at its next dispatch.
//!
//! This crate knows nothing about the entity tree: everything it needs
//! (addresses, routing ports of parents and children) comes through the
//! [`PortTable`] trait, which `evsim-model` implements.

pub mod error;
pub mod forward;
pub mod message;
pub mod port;
pub mod strategy;
pub mod table;


pub use error::{PortError, PortResult};
pub use forward::{forward_pending, needs_forwarding};
pub use message::Message;
pub use port::{Port, PortKind};
pub use strategy::{
    DirectForwarding, ForwardReport, ForwardingKind, ForwardingStrategy, RecursiveForwarding,
    RoutedForwarding,
};
pub use table::PortTable;

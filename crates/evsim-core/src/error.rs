//! Error taxonomy shared by every `evsim-*` crate.
//!
//! Each sub-crate defines its own `thiserror` enum (`PortError`,
//! `ModelError`, `SimError`) and maps every variant onto one [`ErrorKind`]
//! via a `kind()` method.  Callers that only care about the category of a
//! failure match on the kind rather than on crate-specific variants.

use std::fmt;

use thiserror::Error;

/// Category of a fatal simulation error.
///
/// Every category aborts the run: the engine never retries or skips the
/// offending agent, port or change request.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// The model was wired or mutated illegally: duplicate connection,
    /// disconnect of an unconnected port, duplicate entity attachment,
    /// mutating the tree while agents are dispatched.
    Configuration,
    /// Scheduling state is inconsistent: an empty local queue was consulted,
    /// or a returned next-event time precedes the current time.
    Consistency,
    /// Message propagation failed: hop bound exceeded, or no destination
    /// found for a message.
    Protocol,
    /// An operation's precondition does not hold, e.g. removing a non-empty
    /// domain.
    Precondition,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Consistency   => "consistency",
            ErrorKind::Protocol      => "protocol",
            ErrorKind::Precondition  => "precondition",
        };
        f.write_str(s)
    }
}

/// Returned by `Address::from_str` for malformed address strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address must start with '/': {0:?}")]
    MissingRoot(String),

    #[error("invalid address segment {segment:?} in {input:?}")]
    BadSegment { input: String, segment: String },
}

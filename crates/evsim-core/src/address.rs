//! Tree addresses.
//!
//! An [`Address`] is the path of sibling indices from the root domain down to
//! an entity.  The root's address is empty; its second child is `/1`; that
//! child's first child is `/1/0`.  The address length equals the entity's
//! depth in the tree.
//!
//! Hierarchical routing reads a message's address at index `depth` to pick
//! the next hop, so an address is only meaningful for the tree shape it was
//! computed against.  The model recomputes (and re-caches) addresses after
//! every structural change.

use std::fmt;
use std::str::FromStr;

use crate::AddressParseError;

/// Sibling-index path from the root to an entity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address(Vec<u32>);

impl Address {
    /// The root's address (empty path).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(path: Vec<u32>) -> Self {
        Self(path)
    }

    /// Number of hops from the root.
    #[inline]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Sibling index at `depth`, or `None` past the end of the path.
    #[inline]
    pub fn get(&self, depth: usize) -> Option<u32> {
        self.0.get(depth).copied()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Address of this entity's `index`-th child.
    pub fn child(&self, index: u32) -> Address {
        let mut path = Vec::with_capacity(self.0.len() + 1);
        path.extend_from_slice(&self.0);
        path.push(index);
        Address(path)
    }

    /// Address of the parent, or `None` for the root.
    pub fn parent(&self) -> Option<Address> {
        let (_, rest) = self.0.split_last()?;
        Some(Address(rest.to_vec()))
    }

    /// `true` if `self` lies inside the subtree rooted at `ancestor`
    /// (including `self == ancestor`).
    pub fn starts_with(&self, ancestor: &Address) -> bool {
        self.0.starts_with(&ancestor.0)
    }
}

impl From<Vec<u32>> for Address {
    fn from(path: Vec<u32>) -> Self {
        Address(path)
    }
}

impl From<&[u32]> for Address {
    fn from(path: &[u32]) -> Self {
        Address(path.to_vec())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for idx in &self.0 {
            write!(f, "/{idx}")?;
        }
        Ok(())
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Parse the `Display` form: `/` for the root, `/1/0` otherwise.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| AddressParseError::MissingRoot(s.to_string()))?;
        if rest.is_empty() {
            return Ok(Address::root());
        }
        rest.split('/')
            .map(|seg| {
                seg.parse::<u32>().map_err(|_| AddressParseError::BadSegment {
                    input:   s.to_string(),
                    segment: seg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Address)
    }
}

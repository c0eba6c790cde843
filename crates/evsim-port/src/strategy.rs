//! Forwarding strategies: how pending messages spread across the fabric in
//! one forwarding phase.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use evsim_core::PortId;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::{PortError, PortResult, PortTable, forward_pending, needs_forwarding};

/// What one forwarding phase did.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct ForwardReport {
    /// Number of forwarding passes run.
    pub passes: usize,
    /// Port deliveries: one per (pass, destination port) that received
    /// messages.
    pub deliveries: usize,
}

/// Propagates pending messages from a set of source ports until every
/// message has reached an endpoint.
///
/// Strategies are stateless and shared across cycles, hence `Send + Sync`.
pub trait ForwardingStrategy<M>: Send + Sync {
    fn forward(
        &self,
        table:   &mut dyn PortTable<M>,
        sources: &[PortId],
    ) -> PortResult<ForwardReport>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

fn pending_sources<M>(table: &dyn PortTable<M>, sources: &[PortId]) -> Vec<PortId> {
    let mut seen = FxHashSet::default();
    sources
        .iter()
        .copied()
        .filter(|p| seen.insert(*p) && needs_forwarding(table, *p))
        .collect()
}

fn depth_of<M>(table: &dyn PortTable<M>, port: PortId) -> PortResult<usize> {
    table
        .address_of(port.entity)
        .map(|a| a.depth())
        .ok_or(PortError::Detached(port))
}

// ── Direct ────────────────────────────────────────────────────────────────────

/// One pass over the sources.  Suitable when every connection ends at an
/// endpoint; a destination that would need a further hop is an error.
#[derive(Copy, Clone, Debug, Default)]
pub struct DirectForwarding;

impl<M> ForwardingStrategy<M> for DirectForwarding {
    fn forward(
        &self,
        table:   &mut dyn PortTable<M>,
        sources: &[PortId],
    ) -> PortResult<ForwardReport> {
        let mut report = ForwardReport::default();
        let pending = pending_sources(table, sources);
        if pending.is_empty() {
            return Ok(report);
        }
        report.passes = 1;
        let mut reached = Vec::new();
        for port in pending {
            let dests = forward_pending(table, port)?;
            report.deliveries += dests.len();
            reached.extend(dests);
        }
        if let Some(relay) = reached.into_iter().find(|d| needs_forwarding(table, *d)) {
            return Err(PortError::UnexpectedRelay(relay));
        }
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

// ── Recursive ─────────────────────────────────────────────────────────────────

/// Repeats passes over the frontier of ports that received messages and still
/// need forwarding, until the frontier is empty.
///
/// `max_hops` bounds the number of passes and so catches connection cycles.
#[derive(Copy, Clone, Debug)]
pub struct RecursiveForwarding {
    pub max_hops: usize,
}

impl Default for RecursiveForwarding {
    fn default() -> Self {
        Self { max_hops: ForwardingKind::DEFAULT_MAX_HOPS }
    }
}

impl<M> ForwardingStrategy<M> for RecursiveForwarding {
    fn forward(
        &self,
        table:   &mut dyn PortTable<M>,
        sources: &[PortId],
    ) -> PortResult<ForwardReport> {
        let mut report = ForwardReport::default();
        let mut frontier = pending_sources(table, sources);
        while !frontier.is_empty() {
            if report.passes == self.max_hops {
                return Err(PortError::HopLimitExceeded {
                    max_hops: self.max_hops,
                    pending:  frontier.len(),
                });
            }
            report.passes += 1;
            trace!(pass = report.passes, ports = frontier.len(), "recursive forwarding pass");

            let mut seen = FxHashSet::default();
            let mut next = Vec::new();
            for port in frontier {
                for dest in forward_pending(table, port)? {
                    report.deliveries += 1;
                    if seen.insert(dest) {
                        next.push(dest);
                    }
                }
            }
            next.retain(|d| needs_forwarding(table, *d));
            frontier = next;
        }
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "recursive"
    }
}

// ── Routed ────────────────────────────────────────────────────────────────────

/// Layered sweep over the tree: ports are grouped by the depth of their
/// owning entity, swept upward from the deepest layer to depth 1, exchanged
/// once at the root, then swept downward.
///
/// In the upward sweep a destination shallower than the current layer joins
/// its own layer and anything else is deferred to the downward sweep.  In
/// the downward sweep every further hop must go strictly deeper.
#[derive(Copy, Clone, Debug, Default)]
pub struct RoutedForwarding;

impl RoutedForwarding {
    fn pass<M>(
        table:  &mut dyn PortTable<M>,
        layer:  BTreeSet<PortId>,
        report: &mut ForwardReport,
    ) -> PortResult<Vec<(PortId, usize)>> {
        report.passes += 1;
        let mut onward = Vec::new();
        for port in layer {
            for dest in forward_pending(table, port)? {
                report.deliveries += 1;
                if needs_forwarding(table, dest) {
                    onward.push((dest, depth_of(table, dest)?));
                }
            }
        }
        Ok(onward)
    }
}

impl<M> ForwardingStrategy<M> for RoutedForwarding {
    fn forward(
        &self,
        table:   &mut dyn PortTable<M>,
        sources: &[PortId],
    ) -> PortResult<ForwardReport> {
        let mut report = ForwardReport::default();
        let mut up: BTreeMap<usize, BTreeSet<PortId>> = BTreeMap::new();
        let mut down: BTreeMap<usize, BTreeSet<PortId>> = BTreeMap::new();
        for port in pending_sources(table, sources) {
            up.entry(depth_of(table, port)?).or_default().insert(port);
        }

        while let Some(depth) = up.last_key_value().map(|(d, _)| *d) {
            if depth == 0 {
                break;
            }
            let Some(layer) = up.remove(&depth) else { break };
            trace!(depth, ports = layer.len(), "routed upward pass");
            for (dest, d) in Self::pass(table, layer, &mut report)? {
                let bucket = if d < depth { &mut up } else { &mut down };
                bucket.entry(d).or_default().insert(dest);
            }
        }

        if let Some(root) = up.remove(&0) {
            trace!(ports = root.len(), "routed root exchange");
            for (dest, d) in Self::pass(table, root, &mut report)? {
                if d == 0 {
                    return Err(PortError::NonHierarchicalHop { port: dest, depth: d });
                }
                down.entry(d).or_default().insert(dest);
            }
        }

        while let Some((depth, layer)) = down.pop_first() {
            trace!(depth, ports = layer.len(), "routed downward pass");
            for (dest, d) in Self::pass(table, layer, &mut report)? {
                if d <= depth {
                    return Err(PortError::NonHierarchicalHop { port: dest, depth: d });
                }
                down.entry(d).or_default().insert(dest);
            }
        }
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "routed"
    }
}

// ── ForwardingKind ────────────────────────────────────────────────────────────

/// Runtime selector for a [`ForwardingStrategy`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ForwardingKind {
    Direct,
    Recursive { max_hops: usize },
    Routed,
}

impl ForwardingKind {
    pub const DEFAULT_MAX_HOPS: usize = 64;

    pub fn build<M>(self) -> Box<dyn ForwardingStrategy<M>> {
        match self {
            ForwardingKind::Direct                => Box::new(DirectForwarding),
            ForwardingKind::Recursive { max_hops } => Box::new(RecursiveForwarding { max_hops }),
            ForwardingKind::Routed                => Box::new(RoutedForwarding),
        }
    }
}

impl Default for ForwardingKind {
    fn default() -> Self {
        ForwardingKind::Recursive { max_hops: Self::DEFAULT_MAX_HOPS }
    }
}

impl fmt::Display for ForwardingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardingKind::Direct                 => f.write_str("direct"),
            ForwardingKind::Recursive { max_hops } => write!(f, "recursive(max_hops={max_hops})"),
            ForwardingKind::Routed                 => f.write_str("routed"),
        }
    }
}

//! Single-port forwarding primitives shared by every strategy.

use evsim_core::PortId;
use rustc_hash::FxHashSet;
use tracing::trace;

use crate::{Message, Port, PortError, PortKind, PortResult, PortTable};

/// Move the pending messages of `port` into its destinations' buffers.
///
/// Messages for which `port` is the endpoint stay in its buffer.  Each
/// forwarded copy has its hop count incremented.  Returns the distinct
/// destination ports that received at least one message, in first-delivery
/// order; an empty buffer is a no-op.
///
/// Routes are resolved for the whole buffer before anything moves, so an
/// error leaves every buffer untouched.
pub fn forward_pending<M, T>(table: &mut T, port: PortId) -> PortResult<Vec<PortId>>
where
    T: PortTable<M> + ?Sized,
{
    let routes = {
        let source = table.port(port).ok_or(PortError::UnknownPort(port))?;
        if !source.has_messages() || source.is_endpoint() {
            return Ok(Vec::new());
        }
        let mut routes = Vec::with_capacity(source.messages().len());
        for message in source.messages() {
            let dests = match source.kind() {
                PortKind::Router => next_hop(&*table, source, message)?.into_iter().collect(),
                _ => source.destinations(message)?,
            };
            for dest in &dests {
                if table.port(*dest).is_none() {
                    return Err(PortError::UnknownPort(*dest));
                }
            }
            routes.push(dests);
        }
        routes
    };

    let pending = table
        .port_mut(port)
        .ok_or(PortError::UnknownPort(port))?
        .take_messages();

    let mut retained = Vec::new();
    let mut seen = FxHashSet::default();
    let mut reached = Vec::new();
    for (message, dests) in pending.into_iter().zip(routes) {
        if dests.is_empty() {
            retained.push(message);
            continue;
        }
        let hopped = message.hopped();
        for dest in dests {
            if let Some(target) = table.port_mut(dest) {
                target.send(hopped.clone());
            }
            if seen.insert(dest) {
                reached.push(dest);
            }
        }
    }

    if let Some(source) = table.port_mut(port) {
        for message in retained {
            source.send(message);
        }
    }
    trace!(%port, destinations = reached.len(), "forwarded port");
    Ok(reached)
}

/// `true` if `port` holds messages that a forwarding pass would move.
///
/// Router ports count unaddressed messages as pending so the forwarding pass
/// reports them instead of silently keeping them.
pub fn needs_forwarding<M, T>(table: &T, port: PortId) -> bool
where
    T: PortTable<M> + ?Sized,
{
    let Some(p) = table.port(port) else { return false };
    if !p.has_messages() {
        return false;
    }
    match p.kind() {
        PortKind::Router => {
            let own = table.address_of(port.entity);
            p.messages()
                .iter()
                .any(|m| m.address().is_none() || m.address() != own)
        }
        _ => !p.connections().is_empty(),
    }
}

/// Next router port for `message` sitting on router port `port`, or `None`
/// if `port` is its destination.
fn next_hop<M, T>(table: &T, port: &Port<M>, message: &Message<M>) -> PortResult<Option<PortId>>
where
    T: PortTable<M> + ?Sized,
{
    let id = port.id();
    let target = message.address().ok_or(PortError::Unaddressed(id))?;
    let own = table.address_of(id.entity).ok_or(PortError::Detached(id))?;
    if target == own {
        return Ok(None);
    }
    let next = if target.starts_with(own) {
        target
            .get(own.depth())
            .and_then(|index| table.routing_child(id.entity, index))
    } else {
        table.routing_parent(id.entity)
    };
    next.map(Some).ok_or_else(|| PortError::NoRoute { port: id, address: target.clone() })
}

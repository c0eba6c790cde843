//! Disjoint mutable access to a batch of due agents.
//!
//! The simulator dispatches every agent due at one tick, possibly on several
//! threads.  [`Model::agents_many_mut`] hands out one [`AgentSlot`] per
//! agent, each holding `&mut` to that agent and its ports only, so the batch
//! can be processed with `into_par_iter()` without locks.

use evsim_core::{Address, EntityId, Tick};
use evsim_port::Port;
use rustc_hash::FxHashSet;

use crate::model::{Entity, EntityKind};
use crate::{Agent, AgentContext, ChangeQueue, Model, ModelError, ModelResult, Payload};

/// One agent borrowed out of the model for dispatch.
pub struct AgentSlot<'a, M> {
    pub id:      EntityId,
    pub name:    &'a str,
    pub address: &'a Address,
    agent:       &'a mut Box<dyn Agent<M>>,
    ports:       &'a mut [Port<M>],
    router:      Option<u32>,
}

impl<M: Payload> AgentSlot<'_, M> {
    pub fn time_of_next_event(&self) -> Option<Tick> {
        self.agent.time_of_next_event()
    }

    /// Run the agent's events due at `now` and return its new next-event
    /// time.
    ///
    /// Checks the agent is due before the call and that its new time does
    /// not precede `now` after it.
    pub fn dispatch(&mut self, now: Tick, changes: &ChangeQueue<M>) -> ModelResult<Option<Tick>> {
        let entity = self.id;
        match self.agent.time_of_next_event() {
            None => return Err(ModelError::EmptyQueue(entity)),
            Some(due) if due != now => return Err(ModelError::NotDue { entity, now, due }),
            Some(_) => {}
        }

        let mut cx =
            AgentContext::new(now, entity, self.address, &mut *self.ports, self.router, changes);
        let next = self.agent.do_event(now, &mut cx)?;

        match next {
            Some(next) if next < now => Err(ModelError::TimeRegression { entity, now, next }),
            next => Ok(next),
        }
    }
}

impl<M: Payload> Model<M> {
    /// Borrow each agent in `ids` mutably, all at once.
    ///
    /// Fails if an id repeats, is not an agent, or is not attached.
    pub fn agents_many_mut(&mut self, ids: &[EntityId]) -> ModelResult<Vec<AgentSlot<'_, M>>> {
        let mut seen = FxHashSet::default();
        for &id in ids {
            if !seen.insert(id) {
                return Err(ModelError::DuplicateDispatch(id));
            }
            if !matches!(self.entity(id)?.kind, EntityKind::Agent(_)) {
                return Err(ModelError::NotAnAgent(id));
            }
            // Caches the address so the slot can borrow it below.
            if self.address(id).is_none() {
                return Err(ModelError::Detached(id));
            }
        }

        let ptr = self.entities.as_mut_ptr();
        let mut slots = Vec::with_capacity(ids.len());
        for &id in ids {
            // SAFETY: every id was checked above to be unique and to index a
            // live entity, so each pointer targets a distinct element of
            // `self.entities` and the resulting `&mut` never overlap.  The
            // vector is not resized while the slots borrow `self`.
            let slot: &mut Option<Entity<M>> = unsafe { &mut *ptr.add(id.index()) };
            let Some(Entity { name, kind: EntityKind::Agent(agent), ports, router, address, .. }) =
                slot.as_mut()
            else {
                return Err(ModelError::NotAnAgent(id));
            };
            let address = address.get().ok_or(ModelError::Detached(id))?;
            slots.push(AgentSlot {
                id,
                name: name.as_str(),
                address,
                agent,
                ports: ports.as_mut_slice(),
                router: *router,
            });
        }
        Ok(slots)
    }
}

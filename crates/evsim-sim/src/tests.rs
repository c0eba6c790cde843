//! Unit tests for evsim-sim.

use std::sync::{Arc, Mutex};

use evsim_core::{Address, EntityId, ErrorKind, PortId, Tick};
use evsim_model::{
    AgentContext, Behavior, ChangeRequest, LocalAgent, Model, ModelError, ModelResult,
    StructuralChange,
};
use evsim_port::{ForwardingKind, Message, PortError, PortKind};
use evsim_queue::{EventQueue, QueueKind};

use crate::{CycleReport, DispatchMode, Sim, SimBuilder, SimError, SimObserver, SimStatus};

// ── Fixtures ──────────────────────────────────────────────────────────────────

type Msg = &'static str;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Runs every `period` ticks, `limit` times, recording what it read.
#[derive(Debug, Default)]
struct Listener {
    period: u64,
    limit:  usize,
    runs:   Vec<Tick>,
    seen:   Vec<(Tick, Msg)>,
}

impl Listener {
    fn agent(period: u64, limit: usize, first: Tick) -> LocalAgent<Self> {
        LocalAgent::new(Self { period, limit, ..Self::default() }).with_event((), first)
    }
}

impl Behavior for Listener {
    type Msg = Msg;
    type Event = ();

    fn handle(
        &mut self,
        now:   Tick,
        _:     Vec<()>,
        local: &mut dyn EventQueue<()>,
        cx:    &mut AgentContext<'_, Msg>,
    ) -> ModelResult<()> {
        self.runs.push(now);
        self.seen.extend(cx.inbox().iter().map(|m| (now, *m.content())));
        if self.runs.len() < self.limit {
            local.enqueue((), now + self.period);
        }
        Ok(())
    }
}

/// Sends `payload` on port 0 at its first event, then wakes once more
/// `gap` ticks later and does nothing.
#[derive(Debug)]
struct Pinger {
    payload: Msg,
    gap:     u64,
    sent:    bool,
}

impl Pinger {
    fn agent(payload: Msg, gap: u64, first: Tick) -> LocalAgent<Self> {
        LocalAgent::new(Self { payload, gap, sent: false }).with_event((), first)
    }
}

impl Behavior for Pinger {
    type Msg = Msg;
    type Event = ();

    fn handle(
        &mut self,
        now:   Tick,
        _:     Vec<()>,
        local: &mut dyn EventQueue<()>,
        cx:    &mut AgentContext<'_, Msg>,
    ) -> ModelResult<()> {
        if !self.sent {
            self.sent = true;
            cx.send(0, self.payload)?;
            local.enqueue((), now + self.gap);
        }
        Ok(())
    }
}

/// Sends one addressed message through its routing port.
struct Courier {
    to: Address,
}

impl Behavior for Courier {
    type Msg = Msg;
    type Event = ();

    fn handle(
        &mut self,
        _:  Tick,
        _:  Vec<()>,
        _:  &mut dyn EventQueue<()>,
        cx: &mut AgentContext<'_, Msg>,
    ) -> ModelResult<()> {
        cx.send_addressed(self.to.clone(), "hello")
    }
}

/// Submits a fixed list of change requests the first time it runs.
struct Requester {
    requests: Vec<ChangeRequest<Msg>>,
}

impl Requester {
    fn agent(requests: Vec<ChangeRequest<Msg>>, at: Tick) -> LocalAgent<Self> {
        LocalAgent::new(Self { requests }).with_event((), at)
    }
}

impl Behavior for Requester {
    type Msg = Msg;
    type Event = ();

    fn handle(
        &mut self,
        _:  Tick,
        _:  Vec<()>,
        _:  &mut dyn EventQueue<()>,
        cx: &mut AgentContext<'_, Msg>,
    ) -> ModelResult<()> {
        for request in self.requests.drain(..) {
            cx.request(request)?;
        }
        Ok(())
    }
}

/// Schedules its next event one tick in the past.
struct Rewind;

impl Behavior for Rewind {
    type Msg = Msg;
    type Event = ();

    fn handle(
        &mut self,
        now:   Tick,
        _:     Vec<()>,
        local: &mut dyn EventQueue<()>,
        _:     &mut AgentContext<'_, Msg>,
    ) -> ModelResult<()> {
        local.enqueue((), Tick(now.0 - 1));
        Ok(())
    }
}

struct Ping {
    model: Model<Msg>,
    a:     EntityId,
    b:     EntityId,
    b_in:  PortId,
}

/// A sends "ping" at 0 and wakes again at 5; B wakes at 0 and 10.
fn ping_model() -> Ping {
    let mut model = Model::new("root");
    let a = model.add_agent(model.root(), "a", Pinger::agent("ping", 5, Tick(0))).unwrap();
    let b = model.add_agent(model.root(), "b", Listener::agent(10, 2, Tick(0))).unwrap();
    let a_out = model.add_port(a, PortKind::Single).unwrap();
    let b_in = model.add_port(b, PortKind::Single).unwrap();
    model.connect(a_out, b_in).unwrap();
    Ping { model, a, b, b_in }
}

fn buffered(sim: &Sim<Msg>, port: PortId) -> Vec<Msg> {
    sim.model().port(port).unwrap().messages().iter().map(|m| *m.content()).collect()
}

fn listener(sim: &Sim<Msg>, id: EntityId) -> &Listener {
    sim.model().behavior::<Listener>(id).unwrap()
}

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl SimObserver<Msg> for Log {
    fn on_run_start(&mut self, now: Tick, stop: Tick) {
        self.0.lock().unwrap().push(format!("start {} {}", now.0, stop.0));
    }

    fn on_cycle_end(&mut self, report: &CycleReport, sim: &Sim<Msg>) {
        let entities = sim.model().entity_count();
        self.0.lock().unwrap().push(format!("cycle {} {entities}", report.time.0));
    }

    fn on_run_end(&mut self, now: Tick, cycles: u64) {
        self.0.lock().unwrap().push(format!("end {} {cycles}", now.0));
    }
}

// ── Cycle ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod cycle {
    use super::*;

    #[test]
    fn ping_reaches_b_by_tick_six() {
        init_tracing();
        let Ping { model, a, b, b_in } = ping_model();
        let mut sim = SimBuilder::new(model).build().unwrap();

        let cycles = sim.run_simulation(Tick(6)).unwrap();

        assert_eq!(cycles, 2);
        assert_eq!(sim.now(), Tick(5));
        assert_eq!(buffered(&sim, b_in), vec!["ping"]);
        assert_eq!(listener(&sim, b).runs, vec![Tick(0)]);
        assert_eq!(sim.scheduled_time(b), Some(Tick(10)));
        assert_eq!(sim.scheduled_time(a), None);
        assert_eq!(sim.status(), SimStatus::Finished);
    }

    #[test]
    fn b_reads_ping_on_its_next_dispatch() {
        let Ping { model, b, b_in, .. } = ping_model();
        let mut sim = SimBuilder::new(model).build().unwrap();

        sim.run_simulation(Tick(6)).unwrap();
        sim.run_simulation(Tick(100)).unwrap();

        assert_eq!(listener(&sim, b).seen, vec![(Tick(10), "ping")]);
        assert!(buffered(&sim, b_in).is_empty());
        assert_eq!(sim.next_time(), None);
    }

    #[test]
    fn every_queue_and_forwarding_kind_gives_the_same_run() {
        let kinds = [
            ForwardingKind::Direct,
            ForwardingKind::default(),
            ForwardingKind::Routed,
        ];
        for queue in QueueKind::ALL {
            for forwarding in kinds {
                let Ping { model, b, b_in, .. } = ping_model();
                let mut sim =
                    SimBuilder::new(model).queue(queue).forwarding(forwarding).build().unwrap();
                sim.run_simulation(Tick(6)).unwrap();
                assert_eq!(buffered(&sim, b_in), vec!["ping"], "{queue} / {forwarding}");
                assert_eq!(sim.scheduled_time(b), Some(Tick(10)), "{queue} / {forwarding}");
            }
        }
    }

    #[test]
    fn step_runs_one_cycle_at_a_time() {
        let Ping { model, .. } = ping_model();
        let mut sim = SimBuilder::new(model).build().unwrap();
        assert_eq!(sim.status(), SimStatus::Ready);

        let first = sim.step().unwrap().unwrap();
        assert_eq!(sim.status(), SimStatus::Running);
        assert_eq!(first.time, Tick(0));
        assert_eq!(first.dispatched, 2);
        assert_eq!(first.forwarded.deliveries, 1);
        assert_eq!(first.mutations, 0);

        let second = sim.step().unwrap().unwrap();
        assert_eq!((second.time, second.dispatched), (Tick(5), 1));
        assert_eq!(second.forwarded.deliveries, 0);

        let third = sim.step().unwrap().unwrap();
        assert_eq!((third.time, third.dispatched), (Tick(10), 1));
        assert_eq!(sim.status(), SimStatus::Finished);

        assert_eq!(sim.step().unwrap(), None);
        assert_eq!(sim.cycles(), 3);
        assert_eq!(sim.status(), SimStatus::Finished);
    }

    /// `a` with its out port wired to `b`'s in port, and "seed" injected on
    /// the out port.
    fn seeded(a_first: Tick, b: LocalAgent<Listener>) -> (Model<Msg>, EntityId, EntityId) {
        let mut model = Model::new("root");
        let a = model.add_agent(model.root(), "a", Listener::agent(10, 1, a_first)).unwrap();
        let b = model.add_agent(model.root(), "b", b).unwrap();
        let a_out = model.add_port(a, PortKind::Single).unwrap();
        let b_in = model.add_port(b, PortKind::Single).unwrap();
        model.connect(a_out, b_in).unwrap();
        model.inject(a_out, Message::new(a_out, "seed")).unwrap();
        (model, a, b)
    }

    #[test]
    fn injected_message_on_a_wired_port_reaches_its_peer() {
        let (model, a, b) = seeded(Tick(0), Listener::agent(1, 1, Tick(3)));
        let mut sim = SimBuilder::new(model).build().unwrap();

        sim.run_simulation(Tick(10)).unwrap();

        assert!(listener(&sim, a).seen.is_empty());
        assert_eq!(listener(&sim, b).seen, vec![(Tick(3), "seed")]);
    }

    #[test]
    fn injected_message_travels_before_its_owner_is_due() {
        let (model, a, b) = seeded(Tick(8), Listener::agent(2, 2, Tick(3)));
        let mut sim = SimBuilder::new(model).build().unwrap();

        sim.run_simulation(Tick(10)).unwrap();

        assert_eq!(listener(&sim, b).runs, vec![Tick(3), Tick(5)]);
        assert_eq!(listener(&sim, b).seen, vec![(Tick(5), "seed")]);
        assert_eq!(listener(&sim, a).runs, vec![Tick(8)]);
        assert!(listener(&sim, a).seen.is_empty());
    }

    #[test]
    fn events_at_the_stop_tick_are_left_queued() {
        let mut model: Model<Msg> = Model::new("root");
        let x = model.add_agent(model.root(), "x", Listener::agent(1, 1, Tick(6))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        assert_eq!(sim.run_simulation(Tick(6)).unwrap(), 0);
        assert!(listener(&sim, x).runs.is_empty());

        assert_eq!(sim.run_simulation(Tick(7)).unwrap(), 1);
        assert_eq!(listener(&sim, x).runs, vec![Tick(6)]);
    }

    #[test]
    fn agents_waiting_forever_are_not_scheduled() {
        let mut model: Model<Msg> = Model::new("root");
        let x = model.add_agent(model.root(), "x", Listener::agent(1, 1, Tick::INFINITY)).unwrap();
        let idle = model.add_agent(model.root(), "idle", LocalAgent::new(Listener::default())).unwrap();
        let sim = SimBuilder::new(model).build().unwrap();

        assert_eq!(sim.scheduled(), 0);
        assert_eq!(sim.scheduled_time(x), None);
        assert_eq!(sim.scheduled_time(idle), None);
        assert_eq!(sim.next_time(), None);
    }

    #[test]
    fn simultaneous_agents_share_one_cycle() {
        let mut model: Model<Msg> = Model::new("root");
        let ids: Vec<EntityId> = (0..4)
            .map(|i| {
                let name = format!("l{i}");
                model.add_agent(model.root(), name, Listener::agent(3, 3, Tick(2))).unwrap()
            })
            .collect();
        let mut sim = SimBuilder::new(model).build().unwrap();

        assert_eq!(sim.run_simulation(Tick(100)).unwrap(), 3);
        for id in ids {
            assert_eq!(listener(&sim, id).runs, vec![Tick(2), Tick(5), Tick(8)]);
        }
    }

    #[test]
    fn shuffled_dispatch_does_not_change_outcome() {
        let build = |shuffle: bool| {
            let mut model: Model<Msg> = Model::new("root");
            let ids: Vec<EntityId> = (0..6u64)
                .map(|i| {
                    let name = format!("l{i}");
                    model.add_agent(model.root(), name, Listener::agent(i + 1, 4, Tick(0))).unwrap()
                })
                .collect();
            let mut sim =
                SimBuilder::new(model).shuffle_dispatch(shuffle).seed(7).build().unwrap();
            sim.run_simulation(Tick(50)).unwrap();
            ids.iter().map(|&id| listener(&sim, id).runs.clone()).collect::<Vec<_>>()
        };
        assert_eq!(build(true), build(false));
    }

    #[test]
    fn routed_message_crosses_the_tree() {
        let mut model: Model<Msg> = Model::new("root");
        let left = model.add_domain(model.root(), "left").unwrap();
        let right = model.add_domain(model.root(), "right").unwrap();
        let courier = Courier { to: Address::from(&[1, 0][..]) };
        let a = model.add_agent(left, "a", LocalAgent::new(courier).with_event((), Tick(1))).unwrap();
        let b = model.add_agent(right, "b", Listener::agent(4, 2, Tick(1))).unwrap();
        for id in [model.root(), left, right, a, b] {
            model.enable_routing(id).unwrap();
        }
        let b_router = model.routing_port(b).unwrap();
        let mut sim = SimBuilder::new(model).forwarding(ForwardingKind::Routed).build().unwrap();

        let report = sim.step().unwrap().unwrap();
        assert_eq!(report.forwarded.passes, 4);
        assert_eq!(buffered(&sim, b_router), vec!["hello"]);
        assert_eq!(sim.model().port(b_router).unwrap().messages()[0].hops(), 4);

        sim.run_simulation(Tick(100)).unwrap();
        assert_eq!(listener(&sim, b).seen, vec![(Tick(5), "hello")]);
    }

    #[test]
    fn observers_see_every_cycle() {
        let Ping { model, .. } = ping_model();
        let log = Log::default();
        let mut sim = SimBuilder::new(model).observer(log.clone()).build().unwrap();

        sim.run_simulation(Tick(6)).unwrap();

        assert_eq!(log.lines(), vec!["start 0 6", "cycle 0 3", "cycle 5 3", "end 5 2"]);
    }

    #[test]
    fn observer_added_later_joins_next_run() {
        let Ping { model, .. } = ping_model();
        let mut sim = SimBuilder::new(model).build().unwrap();
        sim.run_simulation(Tick(6)).unwrap();

        let log = Log::default();
        sim.add_observer(log.clone());
        sim.run_simulation(Tick(11)).unwrap();

        assert_eq!(log.lines(), vec!["start 5 11", "cycle 10 3", "end 10 1"]);
    }

    #[test]
    fn schedule_agent_picks_up_events_added_between_runs() {
        let mut model: Model<Msg> = Model::new("root");
        let idle = LocalAgent::new(Listener { period: 1, limit: 1, ..Listener::default() });
        let x = model.add_agent(model.root(), "x", idle).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();
        assert_eq!(sim.run_simulation(Tick(10)).unwrap(), 0);

        sim.model_mut().agent_mut::<LocalAgent<Listener>>(x).unwrap().schedule((), Tick(3));
        assert!(sim.schedule_agent(x).unwrap());
        sim.run_simulation(Tick(10)).unwrap();

        assert_eq!(listener(&sim, x).runs, vec![Tick(3)]);
    }

    #[test]
    fn schedule_agent_rejects_past_events() {
        let Ping { model, b, .. } = ping_model();
        let mut sim = SimBuilder::new(model).build().unwrap();
        sim.run_simulation(Tick(6)).unwrap();

        sim.model_mut().agent_mut::<LocalAgent<Listener>>(b).unwrap().schedule((), Tick(1));
        let err = sim.schedule_agent(b).unwrap_err();

        assert!(matches!(
            err,
            SimError::Agent { source: ModelError::TimeRegression { .. }, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Consistency);
    }
}

// ── Failures ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod failures {
    use super::*;

    #[test]
    fn agent_error_names_the_agent_and_fails_the_sim() {
        let mut model: Model<Msg> = Model::new("root");
        let d = model.add_domain(model.root(), "d").unwrap();
        let r = model
            .add_agent(d, "rewinder", LocalAgent::new(Rewind).with_event((), Tick(3)))
            .unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        let err = sim.run_simulation(Tick(10)).unwrap_err();

        match &err {
            SimError::Agent { entity, name, address, now, source } => {
                assert_eq!(*entity, r);
                assert_eq!(name, "rewinder");
                assert_eq!(address.as_ref(), Some(&Address::from(&[0, 0][..])));
                assert_eq!(*now, Tick(3));
                assert!(matches!(source, ModelError::TimeRegression { next: Tick(2), .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(err.entity(), Some(r));
        assert!(err.to_string().contains("rewinder"));
        assert_eq!(sim.status(), SimStatus::Failed);
    }

    #[test]
    fn failed_sim_refuses_to_run_again() {
        let mut model: Model<Msg> = Model::new("root");
        model.add_agent(model.root(), "r", LocalAgent::new(Rewind).with_event((), Tick(3))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();
        assert!(sim.run_simulation(Tick(10)).is_err());

        let err = sim.run_simulation(Tick(20)).unwrap_err();
        assert!(matches!(err, SimError::Failed));
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(matches!(sim.step(), Err(SimError::Failed)));
    }

    #[test]
    fn forwarding_error_is_fatal() {
        let mut model: Model<Msg> = Model::new("root");
        let a = model.add_agent(model.root(), "a", Pinger::agent("lost", 1, Tick(0))).unwrap();
        let b = model.add_agent(model.root(), "b", LocalAgent::new(Listener::default())).unwrap();
        let sw = model.add_port(a, PortKind::Switch).unwrap();
        let b_in = model.add_port(b, PortKind::Single).unwrap();
        model.connect(sw, b_in).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        let err = sim.run_simulation(Tick(10)).unwrap_err();

        assert!(matches!(
            err,
            SimError::Forwarding { now: Tick(0), source: PortError::NoDestination { .. } }
        ));
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(sim.status(), SimStatus::Failed);
    }

    #[test]
    fn zero_hop_limit_is_rejected() {
        let model: Model<Msg> = Model::new("root");
        let err = SimBuilder::new(model)
            .forwarding(ForwardingKind::Recursive { max_hops: 0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn zero_threads_is_rejected() {
        let model: Model<Msg> = Model::new("root");
        let err = SimBuilder::new(model)
            .dispatch(DispatchMode::Concurrent { threads: Some(0) })
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[cfg(not(feature = "parallel"))]
    #[test]
    fn concurrent_dispatch_needs_the_parallel_feature() {
        let model: Model<Msg> = Model::new("root");
        let err = SimBuilder::new(model)
            .dispatch(DispatchMode::Concurrent { threads: None })
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }
}

// ── Mutation ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod mutation {
    use super::*;

    #[test]
    fn added_domain_appears_only_after_the_mutation_step() {
        init_tracing();
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let request = ChangeRequest::add_domain(root, "new");
        let spawner = model.add_agent(root, "spawner", Requester::agent(vec![request], Tick(0))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        let (now, batch) = sim.next_batch().unwrap();
        assert_eq!(batch, vec![spawner]);

        sim.dispatch_phase(now, &batch).unwrap();
        assert_eq!(sim.model().list_domain_entities(root).unwrap(), &[spawner]);
        assert_eq!(sim.changes().len(), 1);

        sim.forward_phase(now, &batch).unwrap();
        assert_eq!(sim.model().list_domain_entities(root).unwrap().len(), 1);

        assert_eq!(sim.mutation_phase(now).unwrap(), 1);
        let children = sim.model().list_domain_entities(root).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(sim.model().name(children[1]), Some("new"));
        assert!(sim.changes().is_empty());
    }

    #[test]
    fn cycle_report_counts_applied_requests() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let requests = vec![ChangeRequest::add_domain(root, "x"), ChangeRequest::add_domain(root, "y")];
        model.add_agent(root, "spawner", Requester::agent(requests, Tick(2))).unwrap();
        let log = Log::default();
        let mut sim = SimBuilder::new(model).observer(log.clone()).build().unwrap();

        let report = sim.step().unwrap().unwrap();

        assert_eq!(report.mutations, 2);
        // The observer sees the tree after mutation.
        assert_eq!(log.lines(), vec!["cycle 2 4"]);
    }

    #[test]
    fn removing_a_non_empty_domain_fails_and_leaves_the_tree() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let d = model.add_domain(root, "d").unwrap();
        let x = model.add_agent(d, "x", LocalAgent::new(Listener::default())).unwrap();
        let remove = StructuralChange::Remove { entity: d };
        let r = model.add_agent(root, "remover", Requester::agent(vec![remove.into()], Tick(0))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        let err = sim.run_simulation(Tick(10)).unwrap_err();

        assert!(matches!(
            err,
            SimError::Mutation {
                request: "remove",
                source: ModelError::DomainNotEmpty { children: 1, .. },
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(sim.model().list_domain_entities(root).unwrap(), &[d, r]);
        assert_eq!(sim.model().list_domain_entities(d).unwrap(), &[x]);
        assert_eq!(sim.status(), SimStatus::Failed);
    }

    #[test]
    fn failed_request_discards_the_rest_of_the_batch() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let d = model.add_domain(root, "d").unwrap();
        model.add_agent(d, "x", LocalAgent::new(Listener::default())).unwrap();
        let requests = vec![
            ChangeRequest::add_domain(root, "first"),
            StructuralChange::Remove { entity: d }.into(),
            ChangeRequest::add_domain(root, "third"),
        ];
        model.add_agent(root, "r", Requester::agent(requests, Tick(0))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        assert!(sim.step().is_err());

        let names: Vec<&str> = sim
            .model()
            .list_domain_entities(root)
            .unwrap()
            .iter()
            .filter_map(|&id| sim.model().name(id))
            .collect();
        assert_eq!(names, vec!["d", "r", "first"]);
        assert!(sim.changes().is_empty());
    }

    #[test]
    fn disabled_mutation_rejects_requests() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let request = ChangeRequest::add_domain(root, "no");
        let r = model.add_agent(root, "r", Requester::agent(vec![request], Tick(0))).unwrap();
        let mut sim = SimBuilder::new(model).dynamic_mutation(false).build().unwrap();

        let err = sim.run_simulation(Tick(10)).unwrap_err();

        assert!(matches!(err, SimError::Agent { source: ModelError::MutationDisabled, .. }));
        assert_eq!(err.entity(), Some(r));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(sim.model().entity_count(), 2);
    }

    #[test]
    fn spawned_agent_is_scheduled_and_runs() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let child = ChangeRequest::add_agent(root, "child", Listener::agent(2, 2, Tick(4)));
        model.add_agent(root, "spawner", Requester::agent(vec![child], Tick(1))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        sim.step().unwrap();
        let child = *sim.model().list_domain_entities(root).unwrap().last().unwrap();
        assert_eq!(sim.scheduled_time(child), Some(Tick(4)));

        sim.run_simulation(Tick(100)).unwrap();
        assert_eq!(listener(&sim, child).runs, vec![Tick(4), Tick(6)]);
    }

    #[test]
    fn removed_agent_is_unscheduled() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let x = model.add_agent(root, "x", Listener::agent(1, 1, Tick(10))).unwrap();
        let remove = StructuralChange::Remove { entity: x };
        model.add_agent(root, "r", Requester::agent(vec![remove.into()], Tick(0))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();
        assert_eq!(sim.scheduled_time(x), Some(Tick(10)));

        assert_eq!(sim.run_simulation(Tick(100)).unwrap(), 1);

        assert!(!sim.model().contains(x));
        assert_eq!(sim.scheduled_time(x), None);
    }

    #[test]
    fn detached_agent_sleeps_until_reattached() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let x = model.add_agent(root, "x", Listener::agent(1, 1, Tick(10))).unwrap();
        let detach = StructuralChange::Detach { entity: x };
        model.add_agent(root, "r", Requester::agent(vec![detach.into()], Tick(0))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        sim.run_simulation(Tick(5)).unwrap();
        assert_eq!(sim.scheduled_time(x), None);

        sim.model_mut().attach(x, root).unwrap();
        sim.run_simulation(Tick(100)).unwrap();

        assert_eq!(listener(&sim, x).runs, vec![Tick(10)]);
    }

    #[test]
    fn moved_agent_keeps_its_schedule() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        let d = model.add_domain(root, "d").unwrap();
        let x = model.add_agent(root, "x", Listener::agent(1, 1, Tick(7))).unwrap();
        let mv = StructuralChange::Move { entity: x, parent: d };
        model.add_agent(root, "r", Requester::agent(vec![mv.into()], Tick(0))).unwrap();
        let mut sim = SimBuilder::new(model).build().unwrap();

        sim.step().unwrap();

        assert_eq!(sim.model().parent(x), Some(d));
        assert_eq!(sim.scheduled_time(x), Some(Tick(7)));
    }
}

// ── Concurrent dispatch ───────────────────────────────────────────────────────

#[cfg(all(test, feature = "parallel"))]
mod concurrent {
    use super::*;

    /// Eight pingers each feeding their own listener.
    fn fan(mode: DispatchMode) -> Vec<Vec<(Tick, Msg)>> {
        let mut model: Model<Msg> = Model::new("root");
        let mut listeners = Vec::new();
        for i in 0..8u64 {
            let a = model
                .add_agent(model.root(), format!("p{i}"), Pinger::agent("ping", 1, Tick(i % 3)))
                .unwrap();
            let b = model
                .add_agent(model.root(), format!("l{i}"), Listener::agent(2, 5, Tick(0)))
                .unwrap();
            let out = model.add_port(a, PortKind::Single).unwrap();
            let inp = model.add_port(b, PortKind::Single).unwrap();
            model.connect(out, inp).unwrap();
            listeners.push(b);
        }
        let mut sim = SimBuilder::new(model).dispatch(mode).build().unwrap();
        sim.run_simulation(Tick(50)).unwrap();
        listeners.iter().map(|&b| listener(&sim, b).seen.clone()).collect()
    }

    #[test]
    fn concurrent_matches_sequential() {
        let sequential = fan(DispatchMode::Sequential);
        assert_eq!(fan(DispatchMode::Concurrent { threads: Some(3) }), sequential);
        assert_eq!(fan(DispatchMode::Concurrent { threads: None }), sequential);
    }

    #[test]
    fn concurrent_requests_are_all_applied() {
        let mut model: Model<Msg> = Model::new("root");
        let root = model.root();
        for i in 0..16 {
            let request = ChangeRequest::add_domain(root, format!("d{i}"));
            model.add_agent(root, format!("r{i}"), Requester::agent(vec![request], Tick(0))).unwrap();
        }
        let mut sim = SimBuilder::new(model)
            .dispatch(DispatchMode::Concurrent { threads: Some(4) })
            .build()
            .unwrap();

        let report = sim.step().unwrap().unwrap();

        assert_eq!(report.dispatched, 16);
        assert_eq!(report.mutations, 16);
        assert_eq!(sim.model().list_domain_entities(root).unwrap().len(), 32);
    }

    #[test]
    fn concurrent_agent_error_is_reported() {
        let mut model: Model<Msg> = Model::new("root");
        for i in 0..4 {
            model.add_agent(model.root(), format!("l{i}"), Listener::agent(1, 3, Tick(3))).unwrap();
        }
        let r = model.add_agent(model.root(), "r", LocalAgent::new(Rewind).with_event((), Tick(3))).unwrap();
        let mut sim = SimBuilder::new(model)
            .dispatch(DispatchMode::Concurrent { threads: Some(2) })
            .build()
            .unwrap();

        let err = sim.run_simulation(Tick(10)).unwrap_err();
        assert_eq!(err.entity(), Some(r));
        assert_eq!(sim.status(), SimStatus::Failed);
    }
}

//! Hook pipeline behavior: ordering, verdicts, queue and reinject.

mod common;

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use common::*;
use ipfwd_core::constants::protocol;
use ipfwd_core::{Datagram, InterfaceId};
use ipfwd_engine::{
    Disposition, DropReason, Egress, EngineError, Hook, HookId, HookResult, HookStage,
    SendRequest,
};

/// What a scripted hook does at the one stage it watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Accept,
    Drop,
    Queue,
    Steal,
}

/// Logs its tag whenever `stage` runs and answers with `action`.
struct Scripted {
    tag: &'static str,
    stage: HookStage,
    action: Action,
    log: Arc<Mutex<Vec<&'static str>>>,
    stolen: Arc<Mutex<Vec<Datagram>>>,
}

impl Scripted {
    fn verdict(&mut self, stage: HookStage, datagram: Datagram) -> HookResult {
        if stage != self.stage {
            return HookResult::Accept(datagram);
        }
        self.log.lock().unwrap().push(self.tag);
        match self.action {
            Action::Accept => HookResult::Accept(datagram),
            Action::Drop => HookResult::Drop,
            Action::Queue => HookResult::Queue(datagram),
            Action::Steal => {
                self.stolen.lock().unwrap().push(datagram);
                HookResult::Stolen
            }
        }
    }
}

impl Hook for Scripted {
    fn pre_routing(&mut self, datagram: Datagram, _in_if: Option<InterfaceId>) -> HookResult {
        self.verdict(HookStage::PreRouting, datagram)
    }

    fn local_in(&mut self, datagram: Datagram, _in_if: Option<InterfaceId>) -> HookResult {
        self.verdict(HookStage::LocalIn, datagram)
    }

    fn forward(
        &mut self,
        datagram: Datagram,
        _in_if: Option<InterfaceId>,
        _egress: &mut Egress,
    ) -> HookResult {
        self.verdict(HookStage::Forward, datagram)
    }

    fn post_routing(
        &mut self,
        datagram: Datagram,
        _in_if: Option<InterfaceId>,
        _egress: &mut Egress,
    ) -> HookResult {
        self.verdict(HookStage::PostRouting, datagram)
    }

    fn local_out(&mut self, datagram: Datagram, _out_if: &mut Option<InterfaceId>) -> HookResult {
        self.verdict(HookStage::LocalOut, datagram)
    }
}

#[derive(Default)]
struct Journal {
    log: Arc<Mutex<Vec<&'static str>>>,
    stolen: Arc<Mutex<Vec<Datagram>>>,
}

impl Journal {
    fn hook(&self, tag: &'static str, stage: HookStage, action: Action) -> Box<dyn Hook> {
        Box::new(Scripted {
            tag,
            stage,
            action,
            log: Arc::clone(&self.log),
            stolen: Arc::clone(&self.stolen),
        })
    }

    fn entries(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

#[test]
fn hooks_run_by_priority_then_registration() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(20, j.hook("c", HookStage::PreRouting, Action::Accept));
    h.engine.register_hook(-5, j.hook("a", HookStage::PreRouting, Action::Accept));
    h.engine.register_hook(20, j.hook("d", HookStage::PreRouting, Action::Accept));
    h.engine.register_hook(0, j.hook("b", HookStage::PreRouting, Action::Accept));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);

    assert_eq!(out.transmissions(), 1);
    assert_eq!(j.entries(), vec!["a", "b", "c", "d"]);
}

#[test]
fn drop_stops_higher_priorities() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(1, j.hook("first", HookStage::PreRouting, Action::Accept));
    h.engine.register_hook(5, j.hook("dropper", HookStage::PreRouting, Action::Drop));
    h.engine.register_hook(9, j.hook("never", HookStage::PreRouting, Action::Accept));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);

    assert_eq!(out, Disposition::Dropped(DropReason::Hook(HookStage::PreRouting)));
    assert_eq!(j.entries(), vec!["first", "dropper"]);
    assert!(h.transmits.is_empty());
    assert!(h.errors.is_empty());
}

#[test]
fn stages_follow_pipeline_order() {
    let mut h = harness();
    let j = Journal::default();
    for (tag, stage) in [
        ("post", HookStage::PostRouting),
        ("fwd", HookStage::Forward),
        ("in", HookStage::LocalIn),
        ("pre", HookStage::PreRouting),
    ] {
        h.engine.register_hook(0, j.hook(tag, stage, Action::Accept));
    }

    h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    assert_eq!(j.entries(), vec!["pre", "fwd", "post"]);

    h.engine.receive(udp(NEIGHBOUR, ETH1_ADDR, 8), ETH1, 0);
    assert_eq!(j.entries(), vec!["pre", "fwd", "post", "pre", "in"]);
}

#[test]
fn unregistered_hook_no_longer_runs() {
    let mut h = harness();
    let j = Journal::default();
    let id = h.engine.register_hook(3, j.hook("gone", HookStage::PreRouting, Action::Drop));

    assert!(h.engine.unregister_hook(4, id).is_err());
    assert!(h.engine.unregister_hook(3, id).is_ok());

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    assert_eq!(out.transmissions(), 1);
    assert!(j.entries().is_empty());
}

#[test]
fn unregister_unknown_hook_is_an_error() {
    let mut h = harness();
    let err = h.engine.unregister_hook(0, HookId(99)).err().unwrap();
    assert!(matches!(
        err,
        EngineError::HookNotRegistered {
            id: HookId(99),
            priority: 0
        }
    ));
}

// ---------------------------------------------------------------------------
// Steal
// ---------------------------------------------------------------------------

#[test]
fn stolen_datagram_belongs_to_the_hook() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("thief", HookStage::Forward, Action::Steal));
    h.engine.register_hook(1, j.hook("later", HookStage::Forward, Action::Accept));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);

    assert_eq!(out, Disposition::Stolen);
    assert_eq!(j.entries(), vec!["thief"]);
    assert_eq!(j.stolen.lock().unwrap()[0].destination, REMOTE_HOST);
    assert!(h.transmits.is_empty());
    assert_eq!(h.engine.stats().stolen, 1);
}

// ---------------------------------------------------------------------------
// Queue and reinject
// ---------------------------------------------------------------------------

#[test]
fn queue_at_forward_then_reinject_with_new_next_hop() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::Forward, Action::Queue));
    h.engine.register_hook(0, j.hook("post", HookStage::PostRouting, Action::Accept));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    let Disposition::Queued(id) = out else {
        panic!("expected queued, got {out:?}");
    };
    assert!(h.transmits.is_empty());

    {
        let entry = h.engine.queued(id).unwrap();
        assert_eq!(entry.stage, HookStage::Forward);
        assert_eq!(entry.in_if, Some(ETH1));
        assert_eq!(entry.out_if, Some(ETH2));
        assert_eq!(entry.next_hop, ETH2_GATEWAY);
    }
    let new_hop = Ipv4Addr::new(10, 0, 2, 253);
    h.engine.queued_mut(id).unwrap().next_hop = new_hop;

    let out = h.engine.reinject(id, 5).unwrap();

    assert_eq!(
        out,
        Disposition::Forwarded {
            interface: ETH2,
            next_hop: new_hop,
            fragments: 1,
        }
    );
    assert_eq!(h.transmits.take()[0].next_hop, new_hop);
    // The forward stage is not replayed; later stages still run.
    assert_eq!(j.entries(), vec!["hold", "post"]);
    assert!(h.engine.queued_ids().is_empty());
}

#[test]
fn reinject_onto_another_interface() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::Forward, Action::Queue));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    let id = out.queued_ids()[0];
    {
        let entry = h.engine.queued_mut(id).unwrap();
        entry.out_if = Some(ETH3);
        entry.next_hop = Ipv4Addr::new(10, 0, 3, 254);
    }

    h.engine.reinject(id, 0).unwrap();
    assert_eq!(h.transmits.take()[0].interface, ETH3);
}

#[test]
fn reinject_after_forward_without_egress_is_no_route() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::Forward, Action::Queue));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    let id = out.queued_ids()[0];
    h.engine.queued_mut(id).unwrap().out_if = None;

    assert_eq!(
        h.engine.reinject(id, 0).unwrap(),
        Disposition::Dropped(DropReason::NoRoute)
    );
    assert_eq!(h.errors.len(), 1);
}

#[test]
fn reinject_at_post_routing_requires_an_interface() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::PostRouting, Action::Queue));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    let id = out.queued_ids()[0];
    h.engine.queued_mut(id).unwrap().out_if = None;

    let err = h.engine.reinject(id, 0).unwrap_err();
    assert!(matches!(err, EngineError::MissingEgress { stage: HookStage::PostRouting, .. }));
    // Still queued, so the caller can fix it up.
    assert!(h.engine.queued(id).is_ok());

    h.engine.queued_mut(id).unwrap().out_if = Some(ETH2);
    assert_eq!(h.engine.reinject(id, 0).unwrap().transmissions(), 1);
}

#[test]
fn queue_at_pre_routing_resumes_with_classification() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::PreRouting, Action::Queue));

    let out = h.engine.receive(udp(NEIGHBOUR, ETH1_ADDR, 8), ETH1, 0);
    let id = out.queued_ids()[0];
    h.engine.queued_mut(id).unwrap().datagram.destination = REMOTE_HOST;

    let out = h.engine.reinject(id, 0).unwrap();
    assert_eq!(out.transmissions(), 1);
    assert!(h.deliveries.is_empty());
}

#[test]
fn queue_at_local_in_resumes_with_delivery() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::LocalIn, Action::Queue));

    let out = h.engine.receive(udp(NEIGHBOUR, ETH1_ADDR, 8), ETH1, 0);
    let id = out.queued_ids()[0];
    assert!(h.deliveries.is_empty());

    assert_eq!(h.engine.reinject(id, 0).unwrap(), Disposition::Delivered);
    assert_eq!(h.deliveries.len(), 1);
}

#[test]
fn queue_at_local_out_keeps_multicast_loop() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::LocalOut, Action::Queue));

    let request =
        SendRequest::new(protocol::UDP, Ipv4Addr::new(239, 9, 9, 9)).with_multicast_loop();
    let out = h.engine.send(request, vec![1, 2, 3], 0).unwrap();
    let id = out.queued_ids()[0];
    assert!(h.engine.queued(id).unwrap().multicast_loop);

    assert_eq!(h.engine.reinject(id, 0).unwrap().transmissions(), 2);
}

#[test]
fn queued_ids_are_unique_across_copies() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::PostRouting, Action::Queue));

    let out = h
        .engine
        .send(SendRequest::new(protocol::UDP, Ipv4Addr::BROADCAST), vec![0; 4], 0)
        .unwrap();
    let ids = out.queued_ids();
    assert_eq!(ids.len(), 4);
    assert_eq!(h.engine.queued_ids(), ids);
    assert_eq!(h.engine.stats().queued, 4);
}

#[test]
fn drop_queued_and_stale_ids() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::Forward, Action::Queue));

    let id = h
        .engine
        .receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0)
        .queued_ids()[0];

    h.engine.drop_queued(id).unwrap();
    assert!(h.transmits.is_empty());
    assert!(matches!(h.engine.drop_queued(id), Err(EngineError::NotQueued(_))));
    assert!(matches!(h.engine.reinject(id, 0), Err(EngineError::NotQueued(_))));
    assert!(h.engine.queued(id).is_err());
    assert!(h.engine.queued_mut(id).is_err());
}

#[test]
fn flush_discards_queued_datagrams() {
    let mut h = harness();
    let j = Journal::default();
    h.engine.register_hook(0, j.hook("hold", HookStage::Forward, Action::Queue));
    h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);

    assert_eq!(h.engine.flush().queued, 2);
    assert!(h.engine.queued_ids().is_empty());
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

struct Redirect {
    to: InterfaceId,
    next_hop: Ipv4Addr,
}

impl Hook for Redirect {
    fn forward(
        &mut self,
        datagram: Datagram,
        _in_if: Option<InterfaceId>,
        egress: &mut Egress,
    ) -> HookResult {
        *egress = Egress::new(self.to, self.next_hop);
        HookResult::Accept(datagram)
    }
}

struct ClearRoute;

impl Hook for ClearRoute {
    fn forward(
        &mut self,
        datagram: Datagram,
        _in_if: Option<InterfaceId>,
        egress: &mut Egress,
    ) -> HookResult {
        egress.interface = None;
        HookResult::Accept(datagram)
    }
}

struct PinOutgoing(InterfaceId);

impl Hook for PinOutgoing {
    fn local_out(&mut self, datagram: Datagram, out_if: &mut Option<InterfaceId>) -> HookResult {
        *out_if = Some(self.0);
        HookResult::Accept(datagram)
    }
}

struct RewriteDestination(Ipv4Addr);

impl Hook for RewriteDestination {
    fn pre_routing(&mut self, mut datagram: Datagram, _in_if: Option<InterfaceId>) -> HookResult {
        datagram.destination = self.0;
        HookResult::Accept(datagram)
    }
}

#[test]
fn forward_hook_can_redirect() {
    let mut h = harness();
    let next_hop = Ipv4Addr::new(10, 0, 4, 254);
    h.engine
        .register_hook(0, Box::new(Redirect { to: ETH4, next_hop }));

    h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    let sent = h.transmits.take();
    assert_eq!(sent[0].interface, ETH4);
    assert_eq!(sent[0].next_hop, next_hop);
}

#[test]
fn forward_hook_clearing_egress_yields_no_route() {
    let mut h = harness();
    h.engine.register_hook(0, Box::new(ClearRoute));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    assert_eq!(out, Disposition::Dropped(DropReason::NoRoute));
    assert_eq!(h.errors.len(), 1);
}

#[test]
fn local_out_hook_can_pick_the_interface() {
    let mut h = harness();
    h.engine.register_hook(0, Box::new(PinOutgoing(ETH3)));

    h.engine
        .send(SendRequest::new(protocol::UDP, REMOTE_HOST), vec![0; 4], 0)
        .unwrap();
    let sent = h.transmits.take();
    assert_eq!(sent[0].interface, ETH3);
    assert_eq!(sent[0].next_hop, REMOTE_HOST);
}

#[test]
fn pre_routing_rewrite_changes_classification() {
    let mut h = harness();
    h.engine
        .register_hook(0, Box::new(RewriteDestination(ETH1_ADDR)));

    let out = h.engine.receive(udp(NEIGHBOUR, REMOTE_HOST, 8), ETH1, 0);
    assert_eq!(out, Disposition::Delivered);
    assert_eq!(h.deliveries.all()[0].destination, ETH1_ADDR);
}

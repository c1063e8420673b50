//! Received datagrams: classification, local delivery, unicast and
//! multicast forwarding.

use std::net::Ipv4Addr;
use std::ops::ControlFlow;

use ipfwd_core::address::Ipv4AddrExt;
use ipfwd_core::datagram::Datagram;
use ipfwd_core::icmp::ErrorKind;
use ipfwd_core::types::InterfaceId;

use super::ForwardingEngine;
use super::types::{Disposition, DropReason};
use crate::collab::LocalDelivery;
use crate::error::ReassemblyError;
use crate::hook::{Egress, HookStage};
use crate::reassembly::FragmentOutcome;

/// Bytes of payload quoted after the header in an ICMP error.
const ICMP_QUOTE_LEN: usize = 8;

/// Where a received datagram is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Multicast,
    LimitedBroadcast,
    /// Directed broadcast of the given local interface's subnet.
    DirectedBroadcast(InterfaceId),
    Local,
    Remote,
}

impl ForwardingEngine {
    /// Process a datagram that arrived on `in_if`.
    pub fn receive(&mut self, mut datagram: Datagram, in_if: InterfaceId, now_ms: u64) -> Disposition {
        self.maybe_sweep(now_ms);
        self.stamp(&mut datagram);
        let id = datagram.id();
        tracing::trace!(
            datagram = %id,
            src = %datagram.source,
            dst = %datagram.destination,
            %in_if,
            ttl = datagram.ttl,
            len = datagram.total_length(),
            "received datagram"
        );

        // Expiry is enforced where the datagram would leave again.
        datagram.ttl = datagram.ttl.saturating_sub(1);

        let in_if = Some(in_if);
        let mut egress = Egress::unresolved();
        match self.run_hooks(HookStage::PreRouting, datagram, in_if, &mut egress) {
            ControlFlow::Continue(datagram) => self.route_received(datagram, in_if, now_ms),
            ControlFlow::Break(disposition) => disposition,
        }
    }

    fn classify(&self, datagram: &Datagram, in_if: Option<InterfaceId>) -> Class {
        let dest = datagram.destination;
        if dest.is_multicast() {
            return Class::Multicast;
        }
        if dest.is_limited_broadcast() {
            return Class::LimitedBroadcast;
        }
        let interfaces = &self.collab.interfaces;
        // An interface without an address yet accepts everything it hears.
        let unconfigured = in_if
            .and_then(|i| interfaces.interface(i))
            .is_some_and(|e| e.address.is_unspecified());
        if unconfigured || interfaces.is_local_address(dest) {
            return Class::Local;
        }
        match interfaces.by_broadcast(dest) {
            Some(entry) => Class::DirectedBroadcast(entry.id),
            None => Class::Remote,
        }
    }

    /// Everything after the pre-routing hook.
    pub(super) fn route_received(
        &mut self,
        datagram: Datagram,
        in_if: Option<InterfaceId>,
        now_ms: u64,
    ) -> Disposition {
        let class = self.classify(&datagram, in_if);
        tracing::trace!(datagram = %datagram.id(), ?class, "classified datagram");
        match class {
            Class::Multicast => self.receive_multicast(datagram, in_if, now_ms),
            Class::LimitedBroadcast | Class::Local => self.deliver_local(datagram, in_if, now_ms),
            Class::DirectedBroadcast(target) => {
                self.receive_directed_broadcast(datagram, in_if, target, now_ms)
            }
            Class::Remote => self.forward_unicast(datagram, in_if),
        }
    }

    fn receive_directed_broadcast(
        &mut self,
        datagram: Datagram,
        in_if: Option<InterfaceId>,
        target: InterfaceId,
        now_ms: u64,
    ) -> Disposition {
        if !self.config.forwarding || in_if == Some(target) || datagram.ttl == 0 {
            return self.deliver_local(datagram, in_if, now_ms);
        }
        let mut relay = datagram.clone();
        self.stamp(&mut relay);
        tracing::debug!(
            datagram = %datagram.id(),
            to = %target,
            "relaying directed broadcast"
        );
        let relayed = self.post_route(relay, in_if, Egress::new(target, Ipv4Addr::BROADCAST));
        let local = self.deliver_local(datagram, in_if, now_ms);
        Disposition::Replicated(vec![local, relayed])
    }

    fn receive_multicast(
        &mut self,
        datagram: Datagram,
        in_if: Option<InterfaceId>,
        now_ms: u64,
    ) -> Disposition {
        self.stats.multicast += 1;
        let group = datagram.destination;
        let member = in_if
            .and_then(|i| self.collab.interfaces.interface(i))
            .is_some_and(|e| e.is_member_of(group));
        let forward = self.config.forwarding && !group.is_link_local_multicast();

        match (member, forward) {
            (false, false) => self.discard(DropReason::NotMember, datagram.id()),
            (true, false) => self.deliver_local(datagram, in_if, now_ms),
            (false, true) => self.forward_multicast(datagram, in_if),
            (true, true) => {
                let mut copy = datagram.clone();
                self.stamp(&mut copy);
                let forwarded = self.forward_multicast(copy, in_if);
                let local = self.deliver_local(datagram, in_if, now_ms);
                Disposition::Replicated(vec![local, forwarded])
            }
        }
    }

    /// One copy per eligible child of the multicast route, each through
    /// post-routing with the group as next hop.
    fn forward_multicast(&mut self, datagram: Datagram, in_if: Option<InterfaceId>) -> Disposition {
        let id = datagram.id();
        let group = datagram.destination;
        let Some(route) = self.collab.routes.multicast_route(datagram.source, group) else {
            self.stats.unroutable += 1;
            return self.discard(DropReason::NoRoute, id);
        };
        if let (Some(parent), Some(arrival)) = (route.parent, in_if) {
            if parent != arrival {
                tracing::debug!(datagram = %id, %parent, %arrival, "multicast failed reverse path check");
                return self.discard(DropReason::RpfFailure, id);
            }
        }

        let ttl = datagram.ttl;
        let interfaces = &self.collab.interfaces;
        let targets: Vec<InterfaceId> = route
            .children
            .iter()
            .filter(|child| Some(child.interface) != in_if)
            .filter_map(|child| {
                let entry = interfaces.interface(child.interface)?;
                let eligible = entry.is_enabled()
                    && entry.multicast_ttl_threshold < ttl
                    && (!child.is_leaf || entry.has_listener(group));
                eligible.then_some(child.interface)
            })
            .collect();
        tracing::debug!(datagram = %id, %group, copies = targets.len(), "forwarding multicast");

        let mut copies = Vec::with_capacity(targets.len());
        for target in targets {
            let mut copy = datagram.clone();
            self.stamp(&mut copy);
            copies.push(self.post_route(copy, in_if, Egress::new(target, group)));
        }
        Disposition::Replicated(copies)
    }

    fn deliver_local(
        &mut self,
        datagram: Datagram,
        in_if: Option<InterfaceId>,
        now_ms: u64,
    ) -> Disposition {
        let mut egress = Egress::unresolved();
        match self.run_hooks(HookStage::LocalIn, datagram, in_if, &mut egress) {
            ControlFlow::Continue(datagram) => self.reassemble_and_deliver(datagram, in_if, now_ms),
            ControlFlow::Break(disposition) => disposition,
        }
    }

    /// Everything after the local-in hook.
    pub(super) fn reassemble_and_deliver(
        &mut self,
        datagram: Datagram,
        in_if: Option<InterfaceId>,
        now_ms: u64,
    ) -> Disposition {
        let id = datagram.id();
        let was_fragment = datagram.is_fragment();
        match self.reassembly.add_fragment(datagram, now_ms) {
            Ok(FragmentOutcome::Completed(datagram)) => {
                if was_fragment {
                    self.stats.reassembled += 1;
                }
                self.deliver(datagram, in_if)
            }
            Ok(FragmentOutcome::Incomplete) => {
                tracing::trace!(datagram = %id, "fragment stored");
                Disposition::Absorbed
            }
            Ok(FragmentOutcome::DuplicateDiscarded) => {
                self.discard(DropReason::DuplicateFragment, id)
            }
            Err(ReassemblyError::BufferFull(entries)) => {
                tracing::warn!(datagram = %id, entries, "reassembly buffer full, dropping fragment");
                self.discard(DropReason::BufferFull, id)
            }
            Err(error) => {
                tracing::warn!(datagram = %id, %error, "discarding malformed fragment");
                self.discard(DropReason::Malformed, id)
            }
        }
    }

    fn deliver(&mut self, datagram: Datagram, in_if: Option<InterfaceId>) -> Disposition {
        let id = datagram.id();
        let quote = datagram.with_same_header(
            datagram.payload.iter().take(ICMP_QUOTE_LEN).copied().collect(),
        );
        let delivery = LocalDelivery {
            protocol: datagram.protocol,
            source: datagram.source,
            destination: datagram.destination,
            in_if,
            ttl: datagram.ttl,
            payload: datagram.payload,
        };
        if self.collab.delivery.deliver(delivery) {
            self.stats.local_deliver += 1;
            tracing::trace!(datagram = %id, "delivered locally");
            Disposition::Delivered
        } else {
            self.report_error(&quote, ErrorKind::ProtocolUnreachable);
            self.discard(DropReason::ProtocolUnreachable, id)
        }
    }

    fn forward_unicast(&mut self, datagram: Datagram, in_if: Option<InterfaceId>) -> Disposition {
        if !self.config.forwarding {
            return self.discard(DropReason::ForwardingDisabled, datagram.id());
        }
        if datagram.ttl == 0 {
            self.report_error(&datagram, ErrorKind::TtlExceeded);
            return self.discard(DropReason::TtlExceeded, datagram.id());
        }
        let dest = datagram.destination;
        let mut egress = match self.collab.routes.route(dest) {
            Some(route) => Egress::new(route.interface, route.next_hop_for(dest)),
            None => Egress::unresolved(),
        };
        match self.run_hooks(HookStage::Forward, datagram, in_if, &mut egress) {
            ControlFlow::Continue(datagram) => self.finish_forward(datagram, in_if, egress),
            ControlFlow::Break(disposition) => disposition,
        }
    }

    /// Everything after the forward hook: fail without an egress, otherwise
    /// post-routing.
    pub(super) fn finish_forward(
        &mut self,
        datagram: Datagram,
        in_if: Option<InterfaceId>,
        egress: Egress,
    ) -> Disposition {
        if egress.interface.is_none() {
            return self.unroutable(datagram);
        }
        self.post_route(datagram, in_if, egress)
    }

    pub(super) fn unroutable(&mut self, datagram: Datagram) -> Disposition {
        self.stats.unroutable += 1;
        tracing::debug!(datagram = %datagram.id(), dst = %datagram.destination, "no route");
        self.report_error(&datagram, ErrorKind::NoRoute);
        self.discard(DropReason::NoRoute, datagram.id())
    }
}

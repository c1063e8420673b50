//! Locally originated datagrams and the shared transmit tail.

use std::net::Ipv4Addr;
use std::ops::ControlFlow;

use ipfwd_core::address::Ipv4AddrExt;
use ipfwd_core::datagram::Datagram;
use ipfwd_core::icmp::ErrorKind;
use ipfwd_core::types::InterfaceId;

use super::ForwardingEngine;
use super::types::{Disposition, DropReason, SendRequest};
use crate::error::EngineError;
use crate::fragment;
use crate::hook::{Egress, HookStage};

impl ForwardingEngine {
    /// Encapsulate `payload` for an upper-layer protocol and send it.
    ///
    /// Fails only when the payload cannot fit a single datagram.
    pub fn send(
        &mut self,
        request: SendRequest,
        payload: Vec<u8>,
        now_ms: u64,
    ) -> Result<Disposition, EngineError> {
        self.maybe_sweep(now_ms);
        let destination = request.destination;
        let mut datagram = Datagram::try_new(
            request.source.unwrap_or(Ipv4Addr::UNSPECIFIED),
            destination,
            request.protocol,
            payload,
        )?;
        datagram.ttl = request.ttl.unwrap_or(if destination.is_multicast() {
            self.config.default_multicast_ttl
        } else {
            self.config.default_ttl
        });
        datagram.identification = self.next_identification();
        datagram.flags.dont_fragment = request.dont_fragment;

        let egress = Egress {
            interface: request.interface,
            next_hop: request.next_hop.unwrap_or(Ipv4Addr::UNSPECIFIED),
        };
        Ok(self.originate(datagram, egress, request.multicast_loop))
    }

    /// Send a datagram built by the caller, optionally on a designated interface.
    pub fn local_out(
        &mut self,
        datagram: Datagram,
        out_if: Option<InterfaceId>,
        now_ms: u64,
    ) -> Disposition {
        self.maybe_sweep(now_ms);
        let egress = Egress {
            interface: out_if,
            next_hop: Ipv4Addr::UNSPECIFIED,
        };
        self.originate(datagram, egress, false)
    }

    fn originate(&mut self, mut datagram: Datagram, mut egress: Egress, multicast_loop: bool) -> Disposition {
        self.stamp(&mut datagram);
        tracing::trace!(
            datagram = %datagram.id(),
            dst = %datagram.destination,
            protocol = datagram.protocol,
            len = datagram.total_length(),
            "sending datagram"
        );
        match self.run_hooks(HookStage::LocalOut, datagram, None, &mut egress) {
            ControlFlow::Continue(datagram) => self.route_local(datagram, egress, multicast_loop),
            ControlFlow::Break(Disposition::Queued(id)) => {
                if let Some(entry) = self.queued.get_mut(id) {
                    entry.multicast_loop = multicast_loop;
                }
                Disposition::Queued(id)
            }
            ControlFlow::Break(disposition) => disposition,
        }
    }

    /// Everything after the local-out hook.
    pub(super) fn route_local(
        &mut self,
        datagram: Datagram,
        mut egress: Egress,
        multicast_loop: bool,
    ) -> Disposition {
        let dest = datagram.destination;
        if dest.is_multicast() {
            return self.send_multicast(datagram, egress, multicast_loop);
        }
        if dest.is_limited_broadcast() {
            return self.send_broadcast(datagram, egress);
        }

        if egress.interface.is_some() {
            if egress.next_hop.is_unspecified() {
                egress.next_hop = dest;
            }
        } else if let Some(route) = self.collab.routes.route(dest) {
            egress.interface = Some(route.interface);
            if egress.next_hop.is_unspecified() {
                egress.next_hop = route.next_hop_for(dest);
            }
        }
        self.finish_forward(datagram, None, egress)
    }

    fn send_multicast(
        &mut self,
        mut datagram: Datagram,
        egress: Egress,
        multicast_loop: bool,
    ) -> Disposition {
        let group = datagram.destination;
        let interfaces = &self.collab.interfaces;
        let out_if = egress
            .interface
            .or_else(|| self.collab.routes.route(group).map(|r| r.interface))
            .or_else(|| {
                interfaces
                    .enabled_interfaces()
                    .into_iter()
                    .find(|e| e.flags.multicast && !e.is_loopback())
                    .map(|e| e.id)
            });

        // The looped copy carries the same source as the one on the wire.
        if datagram.source.is_unspecified() {
            if let Some(entry) = out_if.and_then(|i| interfaces.interface(i)) {
                datagram.source = entry.address;
            }
        }
        let loopback = interfaces
            .first_loopback()
            .map(|e| e.id)
            .filter(|lo| multicast_loop && Some(*lo) != out_if);

        let mut outcomes = Vec::with_capacity(2);
        if let Some(lo) = loopback {
            let mut copy = datagram.clone();
            self.stamp(&mut copy);
            outcomes.push(self.post_route(copy, None, Egress::new(lo, group)));
        }
        match out_if {
            Some(out_if) => {
                let next_hop = if egress.next_hop.is_unspecified() {
                    group
                } else {
                    egress.next_hop
                };
                outcomes.push(self.post_route(datagram, None, Egress::new(out_if, next_hop)));
            }
            None => outcomes.push(self.discard(DropReason::NoInterface, datagram.id())),
        }
        Disposition::from_copies(outcomes)
    }

    fn send_broadcast(&mut self, datagram: Datagram, egress: Egress) -> Disposition {
        let next_hop = if egress.next_hop.is_unspecified() {
            Ipv4Addr::BROADCAST
        } else {
            egress.next_hop
        };
        if let Some(out_if) = egress.interface {
            return self.post_route(datagram, None, Egress::new(out_if, next_hop));
        }
        if !self.config.force_broadcast {
            return self.discard(DropReason::NoInterface, datagram.id());
        }

        let targets: Vec<InterfaceId> = self
            .collab
            .interfaces
            .enabled_interfaces()
            .into_iter()
            .filter(|e| !e.is_loopback())
            .map(|e| e.id)
            .collect();
        if targets.is_empty() {
            return self.discard(DropReason::NoInterface, datagram.id());
        }
        tracing::debug!(datagram = %datagram.id(), copies = targets.len(), "fanning out broadcast");

        let mut copies = Vec::with_capacity(targets.len());
        for target in targets {
            let mut copy = datagram.clone();
            self.stamp(&mut copy);
            copies.push(self.post_route(copy, None, Egress::new(target, next_hop)));
        }
        Disposition::Replicated(copies)
    }

    /// Post-routing hook, then fragment-on-send.
    pub(super) fn post_route(
        &mut self,
        datagram: Datagram,
        in_if: Option<InterfaceId>,
        mut egress: Egress,
    ) -> Disposition {
        match self.run_hooks(HookStage::PostRouting, datagram, in_if, &mut egress) {
            ControlFlow::Continue(datagram) => match egress.interface {
                Some(out_if) => self.fragment_and_send(datagram, in_if, out_if, egress.next_hop),
                None => self.unroutable(datagram),
            },
            ControlFlow::Break(disposition) => disposition,
        }
    }

    /// Hand the datagram to `out_if`, fragmenting it to the interface MTU.
    pub(super) fn fragment_and_send(
        &mut self,
        mut datagram: Datagram,
        in_if: Option<InterfaceId>,
        out_if: InterfaceId,
        next_hop: Ipv4Addr,
    ) -> Disposition {
        let id = datagram.id();
        let Some(entry) = self
            .collab
            .interfaces
            .interface(out_if)
            .filter(|e| e.is_enabled())
        else {
            tracing::debug!(datagram = %id, %out_if, "outgoing interface unknown or disabled");
            return self.discard(DropReason::NoInterface, id);
        };
        let (mtu, loopback, address) = (entry.mtu, entry.is_loopback(), entry.address);

        if datagram.source.is_unspecified() {
            datagram.source = address;
        }
        let next_hop = if next_hop.is_unspecified() {
            datagram.destination
        } else {
            next_hop
        };

        let fragments = if datagram.total_length() <= mtu || loopback {
            self.collab.transmit.transmit(datagram, out_if, next_hop);
            1
        } else if datagram.flags.dont_fragment {
            self.report_error(&datagram, ErrorKind::FragmentationNeeded { mtu });
            return self.discard(DropReason::FragmentationNeeded { mtu }, id);
        } else {
            let Some(pieces) = fragment::split(&datagram, mtu) else {
                tracing::warn!(datagram = %id, %out_if, mtu, "mtu too small to fragment");
                return self.discard(DropReason::MtuTooSmall, id);
            };
            let count = pieces.len();
            for mut piece in pieces {
                self.stamp(&mut piece);
                self.collab.transmit.transmit(piece, out_if, next_hop);
            }
            self.stats.fragments_created += count as u64;
            tracing::debug!(datagram = %id, %out_if, mtu, fragments = count, "fragmented datagram");
            count
        };

        if in_if.is_some() {
            self.stats.forwarded += 1;
        } else {
            self.stats.sent += 1;
        }
        tracing::trace!(datagram = %id, %out_if, %next_hop, fragments, "transmitted");
        Disposition::Forwarded {
            interface: out_if,
            next_hop,
            fragments,
        }
    }
}

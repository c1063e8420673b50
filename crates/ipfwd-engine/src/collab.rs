//! Collaborator traits: everything the engine consults or emits to but does
//! not own.
//!
//! Route storage, interface enumeration, ICMP encoding, upper-layer
//! protocols and link drivers all live behind these seams. The engine holds
//! one boxed implementation of each in [`Collaborators`].

use std::net::Ipv4Addr;

use ipfwd_core::datagram::Datagram;
use ipfwd_core::icmp::ErrorKind;
use ipfwd_core::interface::InterfaceEntry;
use ipfwd_core::route::{MulticastRoute, Route};
use ipfwd_core::types::InterfaceId;

/// Route lookups.
pub trait RoutingTable: Send {
    /// Best unicast route for `destination`.
    fn route(&self, destination: Ipv4Addr) -> Option<Route>;

    /// Multicast distribution entry for datagrams from `origin` to `group`.
    fn multicast_route(&self, origin: Ipv4Addr, group: Ipv4Addr) -> Option<MulticastRoute>;
}

/// Interface enumeration and per-interface address queries.
pub trait InterfaceTable: Send {
    fn interface(&self, id: InterfaceId) -> Option<&InterfaceEntry>;

    /// All interfaces in a stable order.
    fn interfaces(&self) -> Vec<&InterfaceEntry>;

    fn enabled_interfaces(&self) -> Vec<&InterfaceEntry> {
        self.interfaces()
            .into_iter()
            .filter(|e| e.is_enabled())
            .collect()
    }

    fn first_loopback(&self) -> Option<&InterfaceEntry> {
        self.interfaces().into_iter().find(|e| e.is_loopback())
    }

    /// Interface owning `address` as its unicast address.
    fn by_address(&self, address: Ipv4Addr) -> Option<&InterfaceEntry> {
        self.interfaces()
            .into_iter()
            .find(|e| !e.address.is_unspecified() && e.address == address)
    }

    /// Interface whose directed broadcast address is `address`.
    fn by_broadcast(&self, address: Ipv4Addr) -> Option<&InterfaceEntry> {
        self.interfaces()
            .into_iter()
            .find(|e| e.broadcast_address() == Some(address))
    }

    fn is_local_address(&self, address: Ipv4Addr) -> bool {
        self.by_address(address).is_some()
    }

    fn is_local_broadcast(&self, address: Ipv4Addr) -> bool {
        self.by_broadcast(address).is_some()
    }
}

/// Emits ICMP errors. Fire-and-forget.
pub trait ErrorReporter: Send {
    fn report(&mut self, datagram: &Datagram, kind: ErrorKind);
}

/// A reassembled datagram handed to the upper layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDelivery {
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub in_if: Option<InterfaceId>,
    pub ttl: u8,
    pub payload: Vec<u8>,
}

/// Upper-layer protocol dispatch.
pub trait DeliverySink: Send {
    /// Returns `false` when no protocol is bound to `delivery.protocol`.
    fn deliver(&mut self, delivery: LocalDelivery) -> bool;
}

/// Hands finished datagrams to a link.
pub trait TransmitSink: Send {
    fn transmit(&mut self, datagram: Datagram, interface: InterfaceId, next_hop: Ipv4Addr);
}

/// The engine's view of the rest of the stack.
pub struct Collaborators {
    pub routes: Box<dyn RoutingTable>,
    pub interfaces: Box<dyn InterfaceTable>,
    pub errors: Box<dyn ErrorReporter>,
    pub delivery: Box<dyn DeliverySink>,
    pub transmit: Box<dyn TransmitSink>,
}

impl Collaborators {
    pub fn new(
        routes: impl RoutingTable + 'static,
        interfaces: impl InterfaceTable + 'static,
        errors: impl ErrorReporter + 'static,
        delivery: impl DeliverySink + 'static,
        transmit: impl TransmitSink + 'static,
    ) -> Self {
        Self {
            routes: Box::new(routes),
            interfaces: Box::new(interfaces),
            errors: Box::new(errors),
            delivery: Box::new(delivery),
            transmit: Box::new(transmit),
        }
    }
}

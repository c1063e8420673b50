//! Collaborators that only log what the engine hands them.
//!
//! Used by the `ipfwd` binary, which has no link layer or transport
//! protocols attached. Embedders supply their own sinks through
//! [`Sinks`](crate::node::Sinks).

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use ipfwd_core::{Datagram, ErrorKind, InterfaceId};
use ipfwd_engine::{DeliverySink, ErrorReporter, LocalDelivery, TransmitSink};

#[derive(Debug, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn report(&mut self, datagram: &Datagram, kind: ErrorKind) {
        tracing::info!(
            src = %datagram.source,
            dst = %datagram.destination,
            protocol = datagram.protocol,
            icmp_type = kind.icmp_type(),
            icmp_code = kind.icmp_code(),
            "icmp error: {kind}"
        );
    }
}

#[derive(Debug, Default)]
pub struct TracingTransmit;

impl TransmitSink for TracingTransmit {
    fn transmit(&mut self, datagram: Datagram, interface: InterfaceId, next_hop: Ipv4Addr) {
        tracing::trace!(
            %interface,
            %next_hop,
            src = %datagram.source,
            dst = %datagram.destination,
            len = datagram.total_length(),
            "transmit"
        );
    }
}

/// Accepts deliveries for a fixed set of protocols and logs them.
#[derive(Debug, Default)]
pub struct TracingDelivery {
    bound: BTreeSet<u8>,
}

impl TracingDelivery {
    pub fn new(protocols: impl IntoIterator<Item = u8>) -> Self {
        Self {
            bound: protocols.into_iter().collect(),
        }
    }
}

impl DeliverySink for TracingDelivery {
    fn deliver(&mut self, delivery: LocalDelivery) -> bool {
        if !self.bound.contains(&delivery.protocol) {
            return false;
        }
        tracing::debug!(
            protocol = delivery.protocol,
            src = %delivery.source,
            dst = %delivery.destination,
            len = delivery.payload.len(),
            "delivered locally"
        );
        true
    }
}

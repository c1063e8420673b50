//! Recording collaborators for tests and benches.
//!
//! Each recorder is a cheap handle around shared state: hand one clone to the
//! engine and keep another to inspect what it received.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ipfwd_core::datagram::Datagram;
use ipfwd_core::icmp::ErrorKind;
use ipfwd_core::types::InterfaceId;

use crate::collab::{Collaborators, DeliverySink, ErrorReporter, LocalDelivery, TransmitSink};
use crate::engine::{EngineConfig, ForwardingEngine};
use crate::tables::{StaticInterfaceTable, StaticRoutingTable};

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One call to [`TransmitSink::transmit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub datagram: Datagram,
    pub interface: InterfaceId,
    pub next_hop: Ipv4Addr,
}

#[derive(Debug, Clone, Default)]
pub struct TransmitRecorder {
    sent: Arc<Mutex<Vec<Transmission>>>,
}

impl TransmitRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        locked(&self.sent).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Transmission> {
        locked(&self.sent).clone()
    }

    /// Return and forget everything recorded so far.
    pub fn take(&self) -> Vec<Transmission> {
        std::mem::take(&mut *locked(&self.sent))
    }
}

impl TransmitSink for TransmitRecorder {
    fn transmit(&mut self, datagram: Datagram, interface: InterfaceId, next_hop: Ipv4Addr) {
        locked(&self.sent).push(Transmission {
            datagram,
            interface,
            next_hop,
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorRecorder {
    reports: Arc<Mutex<Vec<(Datagram, ErrorKind)>>>,
}

impl ErrorRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        locked(&self.reports).iter().map(|(_, k)| *k).collect()
    }

    pub fn all(&self) -> Vec<(Datagram, ErrorKind)> {
        locked(&self.reports).clone()
    }

    pub fn len(&self) -> usize {
        locked(&self.reports).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorReporter for ErrorRecorder {
    fn report(&mut self, datagram: &Datagram, kind: ErrorKind) {
        locked(&self.reports).push((datagram.clone(), kind));
    }
}

/// Accepts every protocol except the ones marked unbound.
#[derive(Debug, Clone, Default)]
pub struct DeliveryRecorder {
    delivered: Arc<Mutex<Vec<LocalDelivery>>>,
    unbound: Arc<Mutex<BTreeSet<u8>>>,
}

impl DeliveryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse deliveries for `protocol` from now on.
    pub fn unbind(&self, protocol: u8) {
        locked(&self.unbound).insert(protocol);
    }

    pub fn all(&self) -> Vec<LocalDelivery> {
        locked(&self.delivered).clone()
    }

    pub fn len(&self) -> usize {
        locked(&self.delivered).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeliverySink for DeliveryRecorder {
    fn deliver(&mut self, delivery: LocalDelivery) -> bool {
        if locked(&self.unbound).contains(&delivery.protocol) {
            return false;
        }
        locked(&self.delivered).push(delivery);
        true
    }
}

/// An engine wired to static tables and recording sinks.
pub struct Harness {
    pub engine: ForwardingEngine,
    pub transmits: TransmitRecorder,
    pub errors: ErrorRecorder,
    pub deliveries: DeliveryRecorder,
}

impl Harness {
    pub fn new(
        config: EngineConfig,
        routes: StaticRoutingTable,
        interfaces: StaticInterfaceTable,
    ) -> Self {
        let transmits = TransmitRecorder::new();
        let errors = ErrorRecorder::new();
        let deliveries = DeliveryRecorder::new();
        let collab = Collaborators::new(
            routes,
            interfaces,
            errors.clone(),
            deliveries.clone(),
            transmits.clone(),
        );
        Self {
            engine: ForwardingEngine::new(config, collab),
            transmits,
            errors,
            deliveries,
        }
    }
}

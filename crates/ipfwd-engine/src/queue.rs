//! Datagrams suspended by a hook returning `Queue`.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use ipfwd_core::datagram::Datagram;
use ipfwd_core::types::{DatagramId, InterfaceId};

use crate::hook::{Egress, HookStage};

/// A suspended datagram and the pipeline state needed to resume it.
///
/// `out_if` and `next_hop` may be edited while queued; reinjection uses the
/// edited values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedDatagram {
    pub datagram: Datagram,
    pub in_if: Option<InterfaceId>,
    pub out_if: Option<InterfaceId>,
    pub next_hop: Ipv4Addr,
    pub stage: HookStage,
    /// Locally originated multicast only: also loop a copy back.
    pub multicast_loop: bool,
}

impl QueuedDatagram {
    pub fn new(datagram: Datagram, in_if: Option<InterfaceId>, stage: HookStage) -> Self {
        Self {
            datagram,
            in_if,
            out_if: None,
            next_hop: Ipv4Addr::UNSPECIFIED,
            stage,
            multicast_loop: false,
        }
    }

    pub fn with_egress(mut self, egress: Egress) -> Self {
        self.out_if = egress.interface;
        self.next_hop = egress.next_hop;
        self
    }

    pub fn id(&self) -> DatagramId {
        self.datagram.id()
    }

    pub fn egress(&self) -> Egress {
        Egress {
            interface: self.out_if,
            next_hop: self.next_hop,
        }
    }
}

/// Queued datagrams by identity. No timeout: entries stay until the caller
/// reinjects or drops them.
#[derive(Debug, Default)]
pub struct QueuedMap {
    entries: BTreeMap<DatagramId, QueuedDatagram>,
}

impl QueuedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: QueuedDatagram) -> DatagramId {
        let id = entry.id();
        self.entries.insert(id, entry);
        id
    }

    pub fn get(&self, id: DatagramId) -> Option<&QueuedDatagram> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: DatagramId) -> Option<&mut QueuedDatagram> {
        self.entries.get_mut(&id)
    }

    pub fn remove(&mut self, id: DatagramId) -> Option<QueuedDatagram> {
        self.entries.remove(&id)
    }

    pub fn ids(&self) -> Vec<DatagramId> {
        self.entries.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

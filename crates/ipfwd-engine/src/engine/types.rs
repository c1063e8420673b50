//! Engine outcome and request types.

use std::fmt;
use std::net::Ipv4Addr;

use ipfwd_core::types::{DatagramId, InterfaceId};

use crate::hook::HookStage;

/// Why a datagram left the pipeline without being delivered or transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    TtlExceeded,
    /// Larger than the outgoing MTU with don't-fragment set.
    FragmentationNeeded { mtu: usize },
    NoRoute,
    /// A hook at this stage returned drop.
    Hook(HookStage),
    /// A fragment the reassembly buffer rejected.
    Malformed,
    DuplicateFragment,
    ForwardingDisabled,
    /// The chosen interface is unknown or disabled, or none could be chosen.
    NoInterface,
    ProtocolUnreachable,
    /// Multicast arrived on an interface other than the route's parent.
    RpfFailure,
    /// Multicast for a group this node neither joined nor forwards.
    NotMember,
    /// The outgoing MTU cannot carry a header and 8 payload bytes.
    MtuTooSmall,
    /// The reassembly buffer refused to open another group.
    BufferFull,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::TtlExceeded => f.write_str("ttl exceeded"),
            DropReason::FragmentationNeeded { mtu } => {
                write!(f, "fragmentation needed (mtu {mtu})")
            }
            DropReason::NoRoute => f.write_str("no route"),
            DropReason::Hook(stage) => write!(f, "dropped by {stage} hook"),
            DropReason::Malformed => f.write_str("malformed fragment"),
            DropReason::DuplicateFragment => f.write_str("duplicate fragment"),
            DropReason::ForwardingDisabled => f.write_str("forwarding disabled"),
            DropReason::NoInterface => f.write_str("no usable interface"),
            DropReason::ProtocolUnreachable => f.write_str("protocol unreachable"),
            DropReason::RpfFailure => f.write_str("reverse path check failed"),
            DropReason::NotMember => f.write_str("not a group member"),
            DropReason::MtuTooSmall => f.write_str("mtu too small"),
            DropReason::BufferFull => f.write_str("reassembly buffer full"),
        }
    }
}

/// Terminal state of one pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handed to the delivery sink.
    Delivered,
    /// Stored as a fragment awaiting the rest of its group.
    Absorbed,
    /// Handed to the transmit sink, possibly as several fragments.
    Forwarded {
        interface: InterfaceId,
        next_hop: Ipv4Addr,
        fragments: usize,
    },
    Dropped(DropReason),
    /// Suspended by a hook; resume with `reinject` or discard with `drop_queued`.
    Queued(DatagramId),
    /// Owned by a hook.
    Stolen,
    /// The datagram was copied; one outcome per copy.
    Replicated(Vec<Disposition>),
}

impl Disposition {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Disposition::Dropped(_))
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        match self {
            Disposition::Dropped(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Datagrams handed to the transmit sink, counting every fragment and copy.
    pub fn transmissions(&self) -> usize {
        match self {
            Disposition::Forwarded { fragments, .. } => *fragments,
            Disposition::Replicated(copies) => copies.iter().map(Disposition::transmissions).sum(),
            _ => 0,
        }
    }

    /// Ids of every copy left queued by this pass.
    pub fn queued_ids(&self) -> Vec<DatagramId> {
        match self {
            Disposition::Queued(id) => vec![*id],
            Disposition::Replicated(copies) => {
                copies.iter().flat_map(Disposition::queued_ids).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Collapse a list of per-copy outcomes.
    pub(crate) fn from_copies(mut copies: Vec<Disposition>) -> Disposition {
        if copies.len() == 1 {
            if let Some(only) = copies.pop() {
                return only;
            }
        }
        Disposition::Replicated(copies)
    }
}

/// Upper-layer request to originate a datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub protocol: u8,
    /// Unspecified means "the address of the outgoing interface".
    pub source: Option<Ipv4Addr>,
    pub destination: Ipv4Addr,
    /// Falls back to the configured unicast or multicast default.
    pub ttl: Option<u8>,
    pub dont_fragment: bool,
    /// Designated outgoing interface.
    pub interface: Option<InterfaceId>,
    /// Overrides the next hop chosen by routing.
    pub next_hop: Option<Ipv4Addr>,
    /// Loop multicast back through the loopback interface.
    pub multicast_loop: bool,
}

impl SendRequest {
    pub fn new(protocol: u8, destination: Ipv4Addr) -> Self {
        Self {
            protocol,
            source: None,
            destination,
            ttl: None,
            dont_fragment: false,
            interface: None,
            next_hop: None,
            multicast_loop: false,
        }
    }

    pub fn with_source(mut self, source: Ipv4Addr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_dont_fragment(mut self) -> Self {
        self.dont_fragment = true;
        self
    }

    pub fn via(mut self, interface: InterfaceId) -> Self {
        self.interface = Some(interface);
        self
    }

    pub fn with_next_hop(mut self, next_hop: Ipv4Addr) -> Self {
        self.next_hop = Some(next_hop);
        self
    }

    pub fn with_multicast_loop(mut self) -> Self {
        self.multicast_loop = true;
        self
    }
}

/// What [`super::ForwardingEngine::flush`] discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub queued: usize,
    pub reassembly_groups: usize,
}

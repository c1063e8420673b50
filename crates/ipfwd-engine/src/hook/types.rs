//! Hook types.

use std::fmt;
use std::net::Ipv4Addr;

use ipfwd_core::datagram::Datagram;
use ipfwd_core::types::InterfaceId;

/// Identity of one hook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub u64);

/// The five interception points of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    PreRouting,
    LocalIn,
    Forward,
    PostRouting,
    LocalOut,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookStage::PreRouting => "pre-routing",
            HookStage::LocalIn => "local-in",
            HookStage::Forward => "forward",
            HookStage::PostRouting => "post-routing",
            HookStage::LocalOut => "local-out",
        };
        f.write_str(name)
    }
}

/// Verdict of a single hook.
///
/// The datagram travels by value: `Accept` and `Queue` hand it back to the
/// engine, `Drop` and `Stolen` do not. A stolen datagram therefore stays with
/// the hook and the engine has nothing left to touch.
#[derive(Debug)]
pub enum HookResult {
    /// Continue with the next hook, then the stage's default action.
    Accept(Datagram),
    /// Discard now. No further hooks run.
    Drop,
    /// Suspend processing until the datagram is reinjected or dropped.
    Queue(Datagram),
    /// The hook has taken ownership.
    Stolen,
}

impl HookResult {
    pub fn is_accept(&self) -> bool {
        matches!(self, HookResult::Accept(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            HookResult::Accept(_) => "accept",
            HookResult::Drop => "drop",
            HookResult::Queue(_) => "queue",
            HookResult::Stolen => "stolen",
        }
    }
}

/// Outgoing interface and next hop, mutable by forward and post-routing hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Egress {
    pub interface: Option<InterfaceId>,
    pub next_hop: Ipv4Addr,
}

impl Egress {
    pub fn new(interface: InterfaceId, next_hop: Ipv4Addr) -> Self {
        Self {
            interface: Some(interface),
            next_hop,
        }
    }

    /// No routing decision yet.
    pub fn unresolved() -> Self {
        Self {
            interface: None,
            next_hop: Ipv4Addr::UNSPECIFIED,
        }
    }
}

/// An interception point plugged into the pipeline.
///
/// Every stage defaults to accepting unchanged, so implementations override
/// only the stages they care about. Header fields may be edited in place
/// before accepting.
pub trait Hook: Send {
    /// Before a datagram arriving from the network is routed.
    fn pre_routing(&mut self, datagram: Datagram, _in_if: Option<InterfaceId>) -> HookResult {
        HookResult::Accept(datagram)
    }

    /// Before a datagram arriving from the network is delivered locally.
    fn local_in(&mut self, datagram: Datagram, _in_if: Option<InterfaceId>) -> HookResult {
        HookResult::Accept(datagram)
    }

    /// Before a datagram arriving from the network is forwarded.
    fn forward(
        &mut self,
        datagram: Datagram,
        _in_if: Option<InterfaceId>,
        _egress: &mut Egress,
    ) -> HookResult {
        HookResult::Accept(datagram)
    }

    /// Before any datagram is handed to an outgoing interface.
    fn post_routing(
        &mut self,
        datagram: Datagram,
        _in_if: Option<InterfaceId>,
        _egress: &mut Egress,
    ) -> HookResult {
        HookResult::Accept(datagram)
    }

    /// Before a locally originated datagram is routed.
    fn local_out(&mut self, datagram: Datagram, _out_if: &mut Option<InterfaceId>) -> HookResult {
        HookResult::Accept(datagram)
    }
}

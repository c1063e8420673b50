//! Forwarding engine for the ipfwd IPv4 stack.
//!
//! This crate decides, per datagram, between local delivery, forwarding,
//! fragmentation and dropping. It owns the hook pipeline, the fragment
//! reassembly buffer and the queue of datagrams suspended by hooks; routing
//! answers, interface data and every output go through collaborator traits.

pub mod collab;
pub mod engine;
pub mod error;
pub mod fragment;
pub mod hook;
pub mod queue;
pub mod reassembly;
pub mod tables;
pub mod testing;

pub use collab::{
    Collaborators, DeliverySink, ErrorReporter, InterfaceTable, LocalDelivery, RoutingTable,
    TransmitSink,
};
pub use engine::{
    Disposition, DropReason, EngineConfig, EngineStats, FlushSummary, ForwardingEngine,
    SendRequest,
};
pub use error::{EngineError, ReassemblyError};
pub use hook::{Egress, Hook, HookId, HookResult, HookStage};
pub use queue::QueuedDatagram;
pub use reassembly::{ExpiredGroup, FragmentOutcome, ReassemblyBuffer};
pub use tables::{StaticInterfaceTable, StaticRoutingTable};

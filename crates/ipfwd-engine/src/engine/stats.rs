//! Engine counters.

/// Monotonic counters, reset only by constructing a new engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Datagrams handed to the delivery sink.
    pub local_deliver: u64,
    /// Received datagrams sent on towards another node.
    pub forwarded: u64,
    /// Locally originated datagrams handed to a link.
    pub sent: u64,
    /// Multicast datagrams received.
    pub multicast: u64,
    pub unroutable: u64,
    pub dropped: u64,
    pub fragments_created: u64,
    pub reassembled: u64,
    pub reassembly_timeouts: u64,
    pub queued: u64,
    pub stolen: u64,
    pub reinjected: u64,
}

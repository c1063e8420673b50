//! Engine configuration.

use ipfwd_core::constants::{DEFAULT_MULTICAST_TTL, DEFAULT_TTL};

use crate::reassembly::constants::{
    DEFAULT_FRAGMENT_TIMEOUT_MS, DEFAULT_MAX_REASSEMBLY_ENTRIES, DEFAULT_SWEEP_INTERVAL_MS,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Forward datagrams not addressed to this node.
    pub forwarding: bool,
    /// Send undirected local broadcasts on every enabled interface.
    pub force_broadcast: bool,
    pub default_ttl: u8,
    pub default_multicast_ttl: u8,
    pub fragment_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    pub max_reassembly_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            forwarding: true,
            force_broadcast: true,
            default_ttl: DEFAULT_TTL,
            default_multicast_ttl: DEFAULT_MULTICAST_TTL,
            fragment_timeout_ms: DEFAULT_FRAGMENT_TIMEOUT_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            max_reassembly_entries: DEFAULT_MAX_REASSEMBLY_ENTRIES,
        }
    }
}

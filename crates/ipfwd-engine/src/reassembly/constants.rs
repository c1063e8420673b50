//! Reassembly constants.

/// Fragment group lifetime, measured from its first fragment (60 seconds).
pub const DEFAULT_FRAGMENT_TIMEOUT_MS: u64 = 60_000;

/// How often the engine sweeps the buffer for expired groups.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Concurrent reassembly groups before new groups are refused.
pub const DEFAULT_MAX_REASSEMBLY_ENTRIES: usize = 1024;

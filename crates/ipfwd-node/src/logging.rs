//! Tracing subscriber configuration for the forwarding node.
//!
//! Log levels follow these conventions:
//! - ERROR: Failures that stop the node
//! - WARN: Malformed datagrams, misuse of the queued-datagram API
//! - INFO: Node lifecycle (start, shutdown, flush counts), ICMP error reports
//! - DEBUG: Per-datagram forwarding decisions
//! - TRACE: Hook verdicts, fragment spans, transmissions

use tracing_subscriber::EnvFilter;

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually the
/// `[logging] level` config value) applies.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize the tracing subscriber with JSON output.
///
/// Activated by setting `RUST_LOG_FORMAT=json`.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` so repeated calls are harmless.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}

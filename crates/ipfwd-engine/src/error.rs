//! Engine error types.
//!
//! Datagram-level failures never surface here: they end as a
//! [`crate::engine::Disposition::Dropped`]. `EngineError` is reserved for
//! callers breaking a precondition of the engine API.

use ipfwd_core::error::DatagramError;
use ipfwd_core::types::DatagramId;

use crate::hook::{HookId, HookStage};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("datagram {0} is not queued")]
    NotQueued(DatagramId),

    #[error("hook {id:?} not registered at priority {priority}")]
    HookNotRegistered { id: HookId, priority: i32 },

    #[error("queued datagram {id} has no outgoing interface for {stage} resumption")]
    MissingEgress { id: DatagramId, stage: HookStage },

    #[error("invalid datagram: {0}")]
    Datagram(#[from] DatagramError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassemblyError {
    #[error("fragment end {end} exceeds maximum payload {max}")]
    TooLarge { end: usize, max: usize },

    #[error("non-terminal fragment length {0} is not a multiple of 8")]
    Misaligned(usize),

    #[error("empty non-terminal fragment at offset {0}")]
    Empty(usize),

    #[error("fragment [{start}, {end}) extends past total length {total}")]
    BeyondTotal { start: usize, end: usize, total: usize },

    #[error("conflicting total length: had {existing}, got {new}")]
    ConflictingTotal { existing: usize, new: usize },

    #[error("fragment [{start}, {end}) partially overlaps held data")]
    Overlap { start: usize, end: usize },

    #[error("reassembly buffer full ({0} entries)")]
    BufferFull(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err = EngineError::NotQueued(DatagramId(12));
        assert_eq!(err.to_string(), "datagram #12 is not queued");

        let err = EngineError::HookNotRegistered {
            id: HookId(3),
            priority: -5,
        };
        assert_eq!(err.to_string(), "hook HookId(3) not registered at priority -5");

        let err = EngineError::MissingEgress {
            id: DatagramId(1),
            stage: HookStage::PostRouting,
        };
        assert_eq!(
            err.to_string(),
            "queued datagram #1 has no outgoing interface for post-routing resumption"
        );
    }

    #[test]
    fn test_reassembly_error_display() {
        let err = ReassemblyError::Misaligned(13);
        assert_eq!(
            err.to_string(),
            "non-terminal fragment length 13 is not a multiple of 8"
        );

        let err = ReassemblyError::Overlap { start: 8, end: 24 };
        assert_eq!(err.to_string(), "fragment [8, 24) partially overlaps held data");

        let err = ReassemblyError::BufferFull(1024);
        assert_eq!(err.to_string(), "reassembly buffer full (1024 entries)");
    }
}

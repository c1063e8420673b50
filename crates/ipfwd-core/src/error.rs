//! Error types for the ipfwd-core crate.

#[derive(Debug, thiserror::Error)]
pub enum DatagramError {
    #[error("reserved flag bit set: {0:#05b}")]
    ReservedFlag(u8),

    #[error("payload too large: at most {max} bytes, got {actual}")]
    PayloadTooLarge { max: usize, actual: usize },

    #[error("fragment offset out of range: {0}")]
    OffsetOutOfRange(u32),

    #[error("invalid prefix length: {0}")]
    InvalidPrefixLength(u8),
}

//! Fragment reassembly.
//!
//! Fragments addressed to this node are collected per group until they form
//! one contiguous payload from offset 0 to the length announced by the
//! terminal fragment. Groups that stay incomplete past the fragment timeout
//! are purged and reported once.

pub mod buffer;
pub mod constants;
pub mod entry;

pub use buffer::{ExpiredGroup, FragmentOutcome, ReassemblyBuffer};
pub use entry::ReassemblyEntry;

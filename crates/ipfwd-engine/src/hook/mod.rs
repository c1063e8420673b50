//! Netfilter-style interception points.
//!
//! Hooks are registered with a priority and invoked in ascending priority
//! order at each of five stages. A hook may accept, drop, queue or steal the
//! datagram it is given.

pub mod registry;
pub mod types;

pub use registry::HookRegistry;
pub use types::{Egress, Hook, HookId, HookResult, HookStage};

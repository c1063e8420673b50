//! Runtime embedding of the ipfwd forwarding engine.
//!
//! This crate loads a TOML configuration into the engine's static tables,
//! sets up tracing, and runs one [`ForwardingEngine`](ipfwd_engine::ForwardingEngine)
//! inside a tokio task that owns it exclusively. Callers talk to it through a
//! cloneable [`NodeHandle`].

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod sinks;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{Node, NodeHandle, Sinks};

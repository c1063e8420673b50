//! Core types and constants for the ipfwd IPv4 forwarding engine.
//!
//! This crate defines the datagram model, fragment flags, addressing helpers,
//! interface and route value types, and the ICMP error kinds reported by the
//! engine. It carries no forwarding logic of its own.

pub mod address;
pub mod constants;
pub mod datagram;
pub mod error;
pub mod flags;
pub mod icmp;
pub mod interface;
pub mod route;
pub mod types;

pub use address::Ipv4AddrExt;
pub use datagram::Datagram;
pub use error::DatagramError;
pub use flags::FragmentFlags;
pub use icmp::ErrorKind;
pub use interface::{InterfaceEntry, InterfaceFlags};
pub use route::{MulticastChild, MulticastRoute, Route, RouteSource};
pub use types::{DatagramId, FragmentKey, InterfaceId};

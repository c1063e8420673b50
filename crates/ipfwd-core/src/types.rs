//! Newtype identifiers shared across the workspace.

use std::fmt;
use std::net::Ipv4Addr;

/// Lightweight interface identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(pub u32);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// Engine-assigned identity of one datagram instance.
///
/// Every datagram that enters the engine, and every replica or fragment the
/// engine creates, gets a fresh id. Queued datagrams are looked up by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatagramId(pub u64);

impl fmt::Display for DatagramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one in-flight fragment reassembly.
///
/// Two unrelated datagrams that share all four fields within the fragment
/// timeout are indistinguishable and will be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FragmentKey {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub identification: u16,
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} proto={} id={}",
            self.source, self.destination, self.protocol, self.identification
        )
    }
}

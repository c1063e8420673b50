//! Protocol constants for IPv4 datagrams.

// Header and datagram sizes
pub const IPV4_HEADER_SIZE: usize = 20;
pub const MAX_DATAGRAM_SIZE: usize = 65_535;
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - IPV4_HEADER_SIZE; // 65515

/// Fragment offsets are carried in units of this many bytes.
pub const FRAGMENT_UNIT: usize = 8;

/// Largest value the 13-bit fragment offset field can hold.
pub const MAX_FRAGMENT_OFFSET: u16 = 0x1FFF;

// Defaults
pub const DEFAULT_TTL: u8 = 32;
pub const DEFAULT_MULTICAST_TTL: u8 = 1;
pub const DEFAULT_MTU: usize = 1500;

/// Transport protocol identifiers (IANA assigned numbers).
pub mod protocol {
    pub const ICMP: u8 = 1;
    pub const IGMP: u8 = 2;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

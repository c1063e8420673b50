//! Error conditions the engine reports to the ICMP collaborator.
//!
//! Message encoding lives with the collaborator; this module only fixes the
//! type/code pair each condition maps to.

use std::fmt;

pub const ICMP_DESTINATION_UNREACHABLE: u8 = 3;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

pub const ICMP_DU_NETWORK_UNREACHABLE: u8 = 0;
pub const ICMP_DU_PROTOCOL_UNREACHABLE: u8 = 2;
pub const ICMP_DU_FRAGMENTATION_NEEDED: u8 = 4;

pub const ICMP_TE_TTL_EXCEEDED: u8 = 0;
pub const ICMP_TE_REASSEMBLY_TIMEOUT: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// TTL reached zero before delivery.
    TtlExceeded,
    /// Datagram exceeds the outgoing MTU and DF is set.
    FragmentationNeeded { mtu: usize },
    /// A fragment group aged out before completion.
    ReassemblyTimeout,
    /// No route to a remote unicast destination.
    NoRoute,
    /// The local delivery sink has no handler for the protocol.
    ProtocolUnreachable,
}

impl ErrorKind {
    pub fn icmp_type(&self) -> u8 {
        match self {
            ErrorKind::TtlExceeded | ErrorKind::ReassemblyTimeout => ICMP_TIME_EXCEEDED,
            ErrorKind::FragmentationNeeded { .. }
            | ErrorKind::NoRoute
            | ErrorKind::ProtocolUnreachable => ICMP_DESTINATION_UNREACHABLE,
        }
    }

    /// Context code accompanying the type.
    pub fn icmp_code(&self) -> u8 {
        match self {
            ErrorKind::TtlExceeded => ICMP_TE_TTL_EXCEEDED,
            ErrorKind::ReassemblyTimeout => ICMP_TE_REASSEMBLY_TIMEOUT,
            ErrorKind::FragmentationNeeded { .. } => ICMP_DU_FRAGMENTATION_NEEDED,
            ErrorKind::NoRoute => ICMP_DU_NETWORK_UNREACHABLE,
            ErrorKind::ProtocolUnreachable => ICMP_DU_PROTOCOL_UNREACHABLE,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TtlExceeded => write!(f, "ttl exceeded"),
            ErrorKind::FragmentationNeeded { mtu } => {
                write!(f, "fragmentation needed (mtu {mtu})")
            }
            ErrorKind::ReassemblyTimeout => write!(f, "reassembly timeout"),
            ErrorKind::NoRoute => write!(f, "no route"),
            ErrorKind::ProtocolUnreachable => write!(f, "protocol unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_pairs() {
        let cases = [
            (ErrorKind::TtlExceeded, 11, 0),
            (ErrorKind::ReassemblyTimeout, 11, 1),
            (ErrorKind::NoRoute, 3, 0),
            (ErrorKind::ProtocolUnreachable, 3, 2),
            (ErrorKind::FragmentationNeeded { mtu: 576 }, 3, 4),
        ];
        for (kind, ty, code) in cases {
            assert_eq!(kind.icmp_type(), ty, "type mismatch for {kind}");
            assert_eq!(kind.icmp_code(), code, "code mismatch for {kind}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ErrorKind::FragmentationNeeded { mtu: 1400 }.to_string(),
            "fragmentation needed (mtu 1400)"
        );
    }
}

//! IPv4 address classification helpers.

use std::net::Ipv4Addr;

use crate::error::DatagramError;

/// Network mask for a prefix length, e.g. 24 -> 255.255.255.0.
pub fn prefix_mask(prefix_len: u8) -> Result<Ipv4Addr, DatagramError> {
    match prefix_len {
        0 => Ok(Ipv4Addr::UNSPECIFIED),
        1..=32 => Ok(Ipv4Addr::from(u32::MAX << (32 - u32::from(prefix_len)))),
        other => Err(DatagramError::InvalidPrefixLength(other)),
    }
}

/// Prefix length of a contiguous netmask, `None` for non-contiguous masks.
pub fn mask_prefix_len(mask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(mask);
    let ones = bits.leading_ones();
    if bits.checked_shl(ones).unwrap_or(0) != 0 {
        return None;
    }
    Some(ones as u8)
}

pub trait Ipv4AddrExt {
    /// 255.255.255.255.
    fn is_limited_broadcast(&self) -> bool;

    /// 224.0.0.0/24: never forwarded by multicast routers.
    fn is_link_local_multicast(&self) -> bool;

    /// Directed broadcast address of the subnet `self/netmask`.
    fn directed_broadcast(&self, netmask: Ipv4Addr) -> Ipv4Addr;

    /// Whether `self` lies inside `prefix/prefix_len`. Lengths above 32 never match.
    fn in_prefix(&self, prefix: Ipv4Addr, prefix_len: u8) -> bool;
}

impl Ipv4AddrExt for Ipv4Addr {
    fn is_limited_broadcast(&self) -> bool {
        *self == Ipv4Addr::BROADCAST
    }

    fn is_link_local_multicast(&self) -> bool {
        let [a, b, c, _] = self.octets();
        a == 224 && b == 0 && c == 0
    }

    fn directed_broadcast(&self, netmask: Ipv4Addr) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(*self) | !u32::from(netmask))
    }

    fn in_prefix(&self, prefix: Ipv4Addr, prefix_len: u8) -> bool {
        match prefix_mask(prefix_len) {
            Ok(mask) => {
                let mask = u32::from(mask);
                u32::from(*self) & mask == u32::from(prefix) & mask
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_mask() {
        assert_eq!(prefix_mask(0).unwrap(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(prefix_mask(8).unwrap(), Ipv4Addr::new(255, 0, 0, 0));
        assert_eq!(prefix_mask(24).unwrap(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix_mask(32).unwrap(), Ipv4Addr::BROADCAST);
        assert!(prefix_mask(33).is_err());
    }

    #[test]
    fn test_mask_prefix_len() {
        assert_eq!(mask_prefix_len(Ipv4Addr::new(255, 255, 255, 0)), Some(24));
        assert_eq!(mask_prefix_len(Ipv4Addr::UNSPECIFIED), Some(0));
        assert_eq!(mask_prefix_len(Ipv4Addr::BROADCAST), Some(32));
        assert_eq!(mask_prefix_len(Ipv4Addr::new(255, 0, 255, 0)), None);
    }

    #[test]
    fn test_classification() {
        assert!(Ipv4Addr::BROADCAST.is_limited_broadcast());
        assert!(!Ipv4Addr::new(10, 0, 0, 255).is_limited_broadcast());
        assert!(Ipv4Addr::new(224, 0, 0, 5).is_link_local_multicast());
        assert!(!Ipv4Addr::new(239, 1, 2, 3).is_link_local_multicast());
    }

    #[test]
    fn test_directed_broadcast() {
        let addr = Ipv4Addr::new(192, 168, 4, 17);
        assert_eq!(
            addr.directed_broadcast(Ipv4Addr::new(255, 255, 255, 0)),
            Ipv4Addr::new(192, 168, 4, 255)
        );
        assert_eq!(
            addr.directed_broadcast(Ipv4Addr::new(255, 255, 0, 0)),
            Ipv4Addr::new(192, 168, 255, 255)
        );
    }

    #[test]
    fn test_in_prefix() {
        let addr = Ipv4Addr::new(10, 1, 2, 3);
        assert!(addr.in_prefix(Ipv4Addr::new(10, 0, 0, 0), 8));
        assert!(!addr.in_prefix(Ipv4Addr::new(10, 2, 0, 0), 16));
        assert!(addr.in_prefix(Ipv4Addr::UNSPECIFIED, 0));
        assert!(!addr.in_prefix(addr, 40));
    }
}

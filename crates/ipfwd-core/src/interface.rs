//! Interface table entries as seen by the forwarding engine.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::address::Ipv4AddrExt;
use crate::constants::DEFAULT_MTU;
use crate::types::InterfaceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceFlags {
    pub enabled: bool,
    pub loopback: bool,
    pub broadcast: bool,
    pub multicast: bool,
}

impl Default for InterfaceFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            loopback: false,
            broadcast: true,
            multicast: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceEntry {
    pub id: InterfaceId,
    pub name: String,
    pub mtu: usize,
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub flags: InterfaceFlags,
    /// Multicast datagrams whose TTL is at or below this are not sent here.
    pub multicast_ttl_threshold: u8,
    /// Groups with known listeners on the attached link.
    pub listeners: BTreeSet<Ipv4Addr>,
    /// Groups this node itself has joined on this interface.
    pub memberships: BTreeSet<Ipv4Addr>,
}

impl InterfaceEntry {
    pub fn new(id: InterfaceId, name: impl Into<String>, address: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            id,
            name: name.into(),
            mtu: DEFAULT_MTU,
            address,
            netmask,
            flags: InterfaceFlags::default(),
            multicast_ttl_threshold: 0,
            listeners: BTreeSet::new(),
            memberships: BTreeSet::new(),
        }
    }

    /// A loopback interface (127.0.0.1/8, large MTU, no broadcast).
    pub fn loopback(id: InterfaceId) -> Self {
        let mut entry = Self::new(
            id,
            "lo",
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(255, 0, 0, 0),
        );
        entry.mtu = 65_535;
        entry.flags.loopback = true;
        entry.flags.broadcast = false;
        entry
    }

    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.enabled
    }

    pub fn is_loopback(&self) -> bool {
        self.flags.loopback
    }

    /// Directed broadcast address of the attached subnet, if broadcast capable.
    pub fn broadcast_address(&self) -> Option<Ipv4Addr> {
        if !self.flags.broadcast || self.address.is_unspecified() {
            return None;
        }
        Some(self.address.directed_broadcast(self.netmask))
    }

    pub fn has_listener(&self, group: Ipv4Addr) -> bool {
        self.listeners.contains(&group)
    }

    pub fn is_member_of(&self, group: Ipv4Addr) -> bool {
        self.memberships.contains(&group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_address() {
        let eth = InterfaceEntry::new(
            InterfaceId(1),
            "eth0",
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        assert_eq!(eth.broadcast_address(), Some(Ipv4Addr::new(10, 0, 0, 255)));
        assert_eq!(eth.mtu, DEFAULT_MTU);
        assert!(eth.is_enabled());
    }

    #[test]
    fn test_loopback_has_no_broadcast() {
        let lo = InterfaceEntry::loopback(InterfaceId(0));
        assert!(lo.is_loopback());
        assert_eq!(lo.broadcast_address(), None);
    }

    #[test]
    fn test_group_sets() {
        let group = Ipv4Addr::new(239, 1, 1, 1);
        let mut eth = InterfaceEntry::new(
            InterfaceId(1),
            "eth0",
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        assert!(!eth.has_listener(group));
        eth.listeners.insert(group);
        eth.memberships.insert(group);
        assert!(eth.has_listener(group));
        assert!(eth.is_member_of(group));
    }
}

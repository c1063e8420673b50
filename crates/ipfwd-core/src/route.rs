//! Routing answers consumed by the engine.
//!
//! Routes are read-only values produced by the routing-table collaborator;
//! the engine never stores or mutates them.

use std::net::Ipv4Addr;

use crate::address::Ipv4AddrExt;
use crate::types::InterfaceId;

/// Where a route came from. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RouteSource {
    #[default]
    Static,
    Connected,
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destination: Ipv4Addr,
    pub prefix_len: u8,
    /// Gateway; unspecified for directly connected destinations.
    pub next_hop: Ipv4Addr,
    pub interface: InterfaceId,
    pub metric: u32,
    pub enabled: bool,
    pub expired: bool,
    pub source: RouteSource,
}

impl Route {
    pub fn new(destination: Ipv4Addr, prefix_len: u8, next_hop: Ipv4Addr, interface: InterfaceId) -> Self {
        Self {
            destination,
            prefix_len,
            next_hop,
            interface,
            metric: 0,
            enabled: true,
            expired: false,
            source: RouteSource::Static,
        }
    }

    /// Whether the route may be used for `dest`.
    pub fn matches(&self, dest: Ipv4Addr) -> bool {
        self.enabled && !self.expired && dest.in_prefix(self.destination, self.prefix_len)
    }

    /// Address the datagram is handed to on the link: the gateway, or the
    /// destination itself when directly connected.
    pub fn next_hop_for(&self, dest: Ipv4Addr) -> Ipv4Addr {
        if self.next_hop.is_unspecified() {
            dest
        } else {
            self.next_hop
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastChild {
    pub interface: InterfaceId,
    /// No downstream routers on this interface.
    pub is_leaf: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastRoute {
    pub origin: Ipv4Addr,
    pub prefix_len: u8,
    pub group: Ipv4Addr,
    /// Upstream interface; datagrams must arrive here to be forwarded.
    pub parent: Option<InterfaceId>,
    pub children: Vec<MulticastChild>,
    pub enabled: bool,
}

impl MulticastRoute {
    pub fn new(origin: Ipv4Addr, prefix_len: u8, group: Ipv4Addr) -> Self {
        Self {
            origin,
            prefix_len,
            group,
            parent: None,
            children: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_parent(mut self, parent: InterfaceId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_child(mut self, interface: InterfaceId, is_leaf: bool) -> Self {
        self.children.push(MulticastChild { interface, is_leaf });
        self
    }

    /// Unspecified group matches any group.
    pub fn matches(&self, origin: Ipv4Addr, group: Ipv4Addr) -> bool {
        self.enabled
            && origin.in_prefix(self.origin, self.prefix_len)
            && (self.group.is_unspecified() || self.group == group)
    }
}

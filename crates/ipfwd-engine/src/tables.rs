//! In-memory routing and interface tables.

use std::net::Ipv4Addr;

use ipfwd_core::interface::InterfaceEntry;
use ipfwd_core::route::{MulticastRoute, Route};
use ipfwd_core::types::InterfaceId;

use crate::collab::{InterfaceTable, RoutingTable};

/// Route list with longest-prefix-match lookup.
///
/// Ties on prefix length go to the lower metric, then to the route added first.
#[derive(Debug, Clone, Default)]
pub struct StaticRoutingTable {
    routes: Vec<Route>,
    multicast_routes: Vec<MulticastRoute>,
}

impl StaticRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.add_route(route);
        self
    }

    pub fn with_multicast_route(mut self, route: MulticastRoute) -> Self {
        self.add_multicast_route(route);
        self
    }

    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn add_multicast_route(&mut self, route: MulticastRoute) {
        self.multicast_routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn multicast_routes(&self) -> &[MulticastRoute] {
        &self.multicast_routes
    }

    /// Drop every unicast route for which `keep` returns false.
    pub fn retain<F: FnMut(&Route) -> bool>(&mut self, keep: F) -> usize {
        let before = self.routes.len();
        self.routes.retain(keep);
        before - self.routes.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RoutingTable for StaticRoutingTable {
    fn route(&self, destination: Ipv4Addr) -> Option<Route> {
        let mut best: Option<&Route> = None;
        for route in self.routes.iter().filter(|r| r.matches(destination)) {
            best = match best {
                Some(b)
                    if b.prefix_len > route.prefix_len
                        || (b.prefix_len == route.prefix_len && b.metric <= route.metric) =>
                {
                    Some(b)
                }
                _ => Some(route),
            };
        }
        best.cloned()
    }

    fn multicast_route(&self, origin: Ipv4Addr, group: Ipv4Addr) -> Option<MulticastRoute> {
        // Exact group beats wildcard, then the longer origin prefix wins.
        self.multicast_routes
            .iter()
            .filter(|r| r.matches(origin, group))
            .max_by_key(|r| (!r.group.is_unspecified(), r.prefix_len))
            .cloned()
    }
}

/// Interfaces in insertion order; ids are unique.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaceTable {
    entries: Vec<InterfaceEntry>,
}

impl StaticInterfaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entry: InterfaceEntry) -> Self {
        self.insert(entry);
        self
    }

    /// Add an interface, replacing any entry with the same id.
    pub fn insert(&mut self, entry: InterfaceEntry) -> Option<InterfaceEntry> {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => Some(std::mem::replace(existing, entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn get_mut(&mut self, id: InterfaceId) -> Option<&mut InterfaceEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&InterfaceEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl InterfaceTable for StaticInterfaceTable {
    fn interface(&self, id: InterfaceId) -> Option<&InterfaceEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn interfaces(&self) -> Vec<&InterfaceEntry> {
        self.entries.iter().collect()
    }
}

//! TOML-based configuration for the forwarding node.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::Deserialize;

use ipfwd_core::address::{mask_prefix_len, prefix_mask};
use ipfwd_core::constants::{
    DEFAULT_MTU, DEFAULT_MULTICAST_TTL, DEFAULT_TTL, FRAGMENT_UNIT, IPV4_HEADER_SIZE,
};
use ipfwd_core::{InterfaceEntry, InterfaceFlags, InterfaceId, MulticastRoute, Route, RouteSource};
use ipfwd_engine::reassembly::constants::{
    DEFAULT_FRAGMENT_TIMEOUT_MS, DEFAULT_MAX_REASSEMBLY_ENTRIES, DEFAULT_SWEEP_INTERVAL_MS,
};
use ipfwd_engine::{EngineConfig, StaticInterfaceTable, StaticRoutingTable};

use crate::error::NodeError;

/// Smallest MTU that still carries one fragment unit of payload.
pub const MIN_MTU: usize = IPV4_HEADER_SIZE + FRAGMENT_UNIT;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub interfaces: Vec<InterfaceSection>,
    #[serde(default)]
    pub routes: Vec<RouteSection>,
    #[serde(default)]
    pub multicast_routes: Vec<MulticastRouteSection>,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// The `[engine]` section as an [`EngineConfig`].
    pub fn engine_config(&self) -> Result<EngineConfig, NodeError> {
        let e = &self.engine;
        if e.sweep_interval_ms == 0 {
            return Err(NodeError::Config("sweep_interval_ms must be positive".into()));
        }
        if e.fragment_timeout_ms == 0 {
            return Err(NodeError::Config("fragment_timeout_ms must be positive".into()));
        }
        if e.default_ttl == 0 {
            return Err(NodeError::Config("default_ttl must be positive".into()));
        }
        Ok(EngineConfig {
            forwarding: e.forwarding,
            force_broadcast: e.force_broadcast,
            default_ttl: e.default_ttl,
            default_multicast_ttl: e.default_multicast_ttl,
            fragment_timeout_ms: e.fragment_timeout_ms,
            sweep_interval_ms: e.sweep_interval_ms,
            max_reassembly_entries: e.max_reassembly_entries,
        })
    }

    /// Build the interface and routing tables.
    ///
    /// Interfaces are numbered in the order they appear, starting at 0.
    /// Every enabled interface with an address contributes a connected route
    /// for its subnet ahead of the configured routes.
    pub fn build_tables(&self) -> Result<(StaticRoutingTable, StaticInterfaceTable), NodeError> {
        let mut interfaces = StaticInterfaceTable::new();
        let mut routes = StaticRoutingTable::new();
        let mut ids = BTreeMap::new();

        for (index, section) in self.interfaces.iter().enumerate() {
            let id = u32::try_from(index)
                .map(InterfaceId)
                .map_err(|_| NodeError::Config("too many interfaces".into()))?;
            if ids.insert(section.name.as_str(), id).is_some() {
                return Err(NodeError::Config(format!(
                    "duplicate interface name \"{}\"",
                    section.name
                )));
            }
            interfaces.insert(section.to_entry(id)?);
            if let Some(route) = section.connected_route(id) {
                routes.add_route(route);
            }
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| NodeError::Config(format!("unknown interface \"{name}\"")))
        };

        for section in &self.routes {
            routes.add_route(section.to_route(lookup(section.interface.as_str())?)?);
        }
        for section in &self.multicast_routes {
            routes.add_multicast_route(section.to_route(&lookup)?);
        }

        Ok((routes, interfaces))
    }
}

/// The `[engine]` section.
#[derive(Debug, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_true")]
    pub forwarding: bool,
    /// Send undirected local broadcasts on every enabled interface.
    #[serde(default = "default_true")]
    pub force_broadcast: bool,
    #[serde(default = "default_ttl")]
    pub default_ttl: u8,
    #[serde(default = "default_multicast_ttl")]
    pub default_multicast_ttl: u8,
    #[serde(default = "default_fragment_timeout_ms")]
    pub fragment_timeout_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_max_reassembly_entries")]
    pub max_reassembly_entries: usize,
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> u8 {
    DEFAULT_TTL
}

fn default_multicast_ttl() -> u8 {
    DEFAULT_MULTICAST_TTL
}

fn default_fragment_timeout_ms() -> u64 {
    DEFAULT_FRAGMENT_TIMEOUT_MS
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

fn default_max_reassembly_entries() -> usize {
    DEFAULT_MAX_REASSEMBLY_ENTRIES
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            forwarding: true,
            force_broadcast: true,
            default_ttl: default_ttl(),
            default_multicast_ttl: default_multicast_ttl(),
            fragment_timeout_ms: default_fragment_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            max_reassembly_entries: default_max_reassembly_entries(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// An `[[interfaces]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceSection {
    pub name: String,
    #[serde(default = "unspecified")]
    pub address: Ipv4Addr,
    #[serde(default = "unspecified")]
    pub netmask: Ipv4Addr,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub loopback: bool,
    #[serde(default = "default_true")]
    pub broadcast: bool,
    #[serde(default = "default_true")]
    pub multicast: bool,
    /// Multicast datagrams leave this interface only with TTL above this.
    #[serde(default)]
    pub multicast_ttl_threshold: u8,
    /// Groups with listeners on the attached link.
    #[serde(default)]
    pub listeners: Vec<Ipv4Addr>,
    /// Groups this node has joined on the interface.
    #[serde(default)]
    pub memberships: Vec<Ipv4Addr>,
}

fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_mtu() -> usize {
    DEFAULT_MTU
}

impl InterfaceSection {
    fn to_entry(&self, id: InterfaceId) -> Result<InterfaceEntry, NodeError> {
        if self.name.is_empty() {
            return Err(NodeError::Config("interface name must not be empty".into()));
        }
        if mask_prefix_len(self.netmask).is_none() {
            return Err(NodeError::Config(format!(
                "interface \"{}\": netmask {} is not contiguous",
                self.name, self.netmask
            )));
        }
        if self.mtu < MIN_MTU {
            return Err(NodeError::Config(format!(
                "interface \"{}\": mtu {} is below the minimum of {MIN_MTU}",
                self.name, self.mtu
            )));
        }
        if let Some(group) = self
            .listeners
            .iter()
            .chain(&self.memberships)
            .find(|g| !g.is_multicast())
        {
            return Err(NodeError::Config(format!(
                "interface \"{}\": {group} is not a multicast group",
                self.name
            )));
        }

        let mut entry = InterfaceEntry::new(id, self.name.as_str(), self.address, self.netmask)
            .with_mtu(self.mtu);
        entry.flags = InterfaceFlags {
            enabled: self.enabled,
            loopback: self.loopback,
            broadcast: self.broadcast,
            multicast: self.multicast,
        };
        entry.multicast_ttl_threshold = self.multicast_ttl_threshold;
        entry.listeners = self.listeners.iter().copied().collect();
        entry.memberships = self.memberships.iter().copied().collect();
        Ok(entry)
    }

    fn connected_route(&self, id: InterfaceId) -> Option<Route> {
        if !self.enabled || self.address.is_unspecified() {
            return None;
        }
        let prefix_len = mask_prefix_len(self.netmask).filter(|len| *len > 0)?;
        let network = Ipv4Addr::from(u32::from(self.address) & u32::from(self.netmask));
        let mut route = Route::new(network, prefix_len, Ipv4Addr::UNSPECIFIED, id);
        route.source = RouteSource::Connected;
        Some(route)
    }
}

/// A `[[routes]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteSection {
    pub destination: Ipv4Addr,
    pub prefix_len: u8,
    /// Omitted for directly connected destinations.
    pub gateway: Option<Ipv4Addr>,
    pub interface: String,
    #[serde(default)]
    pub metric: u32,
}

impl RouteSection {
    fn to_route(&self, interface: InterfaceId) -> Result<Route, NodeError> {
        prefix_mask(self.prefix_len).map_err(|e| {
            NodeError::Config(format!("route {}/{}: {e}", self.destination, self.prefix_len))
        })?;
        let mut route = Route::new(
            self.destination,
            self.prefix_len,
            self.gateway.unwrap_or(Ipv4Addr::UNSPECIFIED),
            interface,
        );
        route.metric = self.metric;
        Ok(route)
    }
}

/// A `[[multicast_routes]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct MulticastRouteSection {
    #[serde(default = "unspecified")]
    pub origin: Ipv4Addr,
    #[serde(default)]
    pub prefix_len: u8,
    /// Omitted to match every group.
    #[serde(default = "unspecified")]
    pub group: Ipv4Addr,
    /// Upstream interface name; omitted to skip the reverse-path check.
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<MulticastChildSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MulticastChildSection {
    pub interface: String,
    #[serde(default)]
    pub leaf: bool,
}

impl MulticastRouteSection {
    fn to_route(
        &self,
        lookup: &impl Fn(&str) -> Result<InterfaceId, NodeError>,
    ) -> Result<MulticastRoute, NodeError> {
        prefix_mask(self.prefix_len).map_err(|e| {
            NodeError::Config(format!("multicast route {}/{}: {e}", self.origin, self.prefix_len))
        })?;
        if !self.group.is_unspecified() && !self.group.is_multicast() {
            return Err(NodeError::Config(format!(
                "multicast route: {} is not a multicast group",
                self.group
            )));
        }

        let mut route = MulticastRoute::new(self.origin, self.prefix_len, self.group);
        if let Some(parent) = &self.parent {
            route = route.with_parent(lookup(parent.as_str())?);
        }
        for child in &self.children {
            route = route.with_child(lookup(child.interface.as_str())?, child.leaf);
        }
        Ok(route)
    }
}

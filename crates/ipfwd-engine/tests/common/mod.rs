//! Shared four-link topology for engine integration tests.
//!
//! ```text
//!   if0 lo    127.0.0.1/8
//!   if1 eth1  10.0.1.1/24   mtu 1500
//!   if2 eth2  10.0.2.1/24   mtu 576    192.168.0.0/16 via 10.0.2.254
//!   if3 eth3  10.0.3.1/24   mtu 1500
//!   if4 eth4  10.0.4.1/24   mtu 1500
//! ```

#![allow(dead_code)]

use std::net::Ipv4Addr;

use ipfwd_core::constants::protocol;
use ipfwd_core::{Datagram, InterfaceEntry, InterfaceId, Route};
use ipfwd_engine::testing::Harness;
use ipfwd_engine::{EngineConfig, StaticInterfaceTable, StaticRoutingTable};

pub const LO: InterfaceId = InterfaceId(0);
pub const ETH1: InterfaceId = InterfaceId(1);
pub const ETH2: InterfaceId = InterfaceId(2);
pub const ETH3: InterfaceId = InterfaceId(3);
pub const ETH4: InterfaceId = InterfaceId(4);

pub const ETH1_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);
pub const ETH2_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 1);
pub const ETH2_GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 254);
pub const REMOTE_HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 7, 7);
pub const NEIGHBOUR: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 50);

const NETMASK_24: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

pub fn interfaces() -> StaticInterfaceTable {
    StaticInterfaceTable::new()
        .with(InterfaceEntry::loopback(LO))
        .with(InterfaceEntry::new(ETH1, "eth1", ETH1_ADDR, NETMASK_24))
        .with(InterfaceEntry::new(ETH2, "eth2", ETH2_ADDR, NETMASK_24).with_mtu(576))
        .with(InterfaceEntry::new(ETH3, "eth3", Ipv4Addr::new(10, 0, 3, 1), NETMASK_24))
        .with(InterfaceEntry::new(ETH4, "eth4", Ipv4Addr::new(10, 0, 4, 1), NETMASK_24))
}

pub fn routes() -> StaticRoutingTable {
    StaticRoutingTable::new()
        .with_route(Route::new(Ipv4Addr::new(127, 0, 0, 0), 8, Ipv4Addr::UNSPECIFIED, LO))
        .with_route(Route::new(Ipv4Addr::new(10, 0, 1, 0), 24, Ipv4Addr::UNSPECIFIED, ETH1))
        .with_route(Route::new(Ipv4Addr::new(10, 0, 2, 0), 24, Ipv4Addr::UNSPECIFIED, ETH2))
        .with_route(Route::new(Ipv4Addr::new(10, 0, 3, 0), 24, Ipv4Addr::UNSPECIFIED, ETH3))
        .with_route(Route::new(Ipv4Addr::new(10, 0, 4, 0), 24, Ipv4Addr::UNSPECIFIED, ETH4))
        .with_route(Route::new(Ipv4Addr::new(192, 168, 0, 0), 16, ETH2_GATEWAY, ETH2))
}

pub fn harness() -> Harness {
    Harness::new(EngineConfig::default(), routes(), interfaces())
}

pub fn harness_with(
    config: EngineConfig,
    routes: StaticRoutingTable,
    interfaces: StaticInterfaceTable,
) -> Harness {
    Harness::new(config, routes, interfaces)
}

pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

pub fn udp(source: Ipv4Addr, destination: Ipv4Addr, len: usize) -> Datagram {
    Datagram::new(source, destination, protocol::UDP, payload(len)).with_ttl(16)
}

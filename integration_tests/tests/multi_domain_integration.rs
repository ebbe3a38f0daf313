//! Multi-domain integration tests
//!
//! Three systems on a chain run two gPTP domains over one shared link delay
//! service; each domain elects its own grandmaster.

use gptp::testing::{SimClock, SimNetwork, sim_config};
use gptp::types::{DelayMechanism, DomainConfig, GptpConfig};
use gptp::{PllState, PortRole};

mod common;
use common::init_logging;

const START_NS: u64 = 1_000_000_000;
const IDS: [u64; 3] = [
    0x00A0_C9FF_FE00_0001,
    0x00A0_C9FF_FE00_0002,
    0x00A0_C9FF_FE00_0003,
];

/// Domain 0 prefers the first system, domain 1 the last.
fn config(n: usize, ports: usize) -> GptpConfig {
    let priorities: [(u8, u8); 3] = [(100, 250), (200, 200), (250, 100)];
    let (p0, p1) = priorities[n];
    let mut config = sim_config(IDS[n], p0, ports);
    config.domains.push(DomainConfig {
        domain_number: 7,
        priority1: p1,
        ..DomainConfig::default()
    });
    config
}

fn chain() -> SimNetwork {
    let mut net = SimNetwork::new();
    let drifts = [0.0, 25.0, -40.0];
    for n in 0..3 {
        let ports = if n == 1 { 2 } else { 1 };
        let clock = SimClock::new(START_NS * (n as u64 + 1)).with_drift(drifts[n]);
        net.add_system(config(n, ports), clock).unwrap();
    }
    net.connect(0, 0, 1, 0, 350);
    net.connect(1, 1, 2, 0, 650);
    net.start();
    net
}

#[test]
fn test_domains_elect_independent_grandmasters() {
    init_logging();
    let mut net = chain();
    net.run_for(30_000);

    for n in 0..3 {
        let system = net.system(n);
        assert_eq!(system.instance_count(), 2);
        assert_eq!(system.domain(1), Some(7));
        assert_eq!(system.grandmaster_identity(0), Some(IDS[0]), "system {n}");
        assert_eq!(system.grandmaster_identity(1), Some(IDS[2]), "system {n}");
    }
    assert!(net.system(0).is_grandmaster(0));
    assert!(net.system(2).is_grandmaster(1));

    // The bridge points opposite ways in the two domains.
    let bridge = net.system(1);
    assert_eq!(bridge.port_role(0, 0), Some(PortRole::Slave));
    assert_eq!(bridge.port_role(0, 1), Some(PortRole::Master));
    assert_eq!(bridge.port_role(1, 0), Some(PortRole::Master));
    assert_eq!(bridge.port_role(1, 1), Some(PortRole::Slave));
    assert_eq!(bridge.pll_state(0), Some(PllState::Locked));
    assert_eq!(bridge.pll_state(1), Some(PllState::Locked));
}

#[test]
fn test_shared_link_delay_serves_both_domains() {
    init_logging();
    let mut net = chain();
    net.run_for(10_000);

    let bridge = net.system(1);
    assert_eq!(
        bridge.config().ports[0].delay_mechanism_for(1),
        DelayMechanism::CommonP2p
    );
    for (port, expected) in [(0, 350.0), (1, 650.0)] {
        let delay = bridge.mean_link_delay(port).unwrap();
        assert!((delay - expected).abs() < 5.0, "port {port} delay {delay}");
        assert!(bridge.as_capable(0, port));
        assert!(bridge.as_capable(1, port));
    }
}

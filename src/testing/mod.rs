//! Simulation helpers: drifting clocks and a wire between systems.
//!
//! ```no_run
//! use gptp::testing::{SimClock, SimNetwork};
//! use gptp::types::GptpConfig;
//!
//! let mut net = SimNetwork::new();
//! let gm = GptpConfig::builder().clock_identity(1).priority1(100).build();
//! let slave = GptpConfig::builder().clock_identity(2).build();
//! let a = net.add_system(gm, SimClock::new(1_000_000_000)).unwrap();
//! let b = net.add_system(slave, SimClock::new(5_000_000_000).with_drift(20.0)).unwrap();
//! net.connect(a, 0, b, 0, 500);
//! net.start();
//! net.run_for(10_000);
//! assert!(net.system(a).is_grandmaster(0));
//! ```

mod sim_clock;
mod wire;

#[cfg(test)]
mod tests;

pub use sim_clock::SimClock;
pub use wire::{SimLink, SimNetwork, SimSystem, TICK_NS};

use crate::types::{DomainConfig, GptpConfig, PortConfig};

/// Standard profile configuration with `ports` ports and one domain.
///
/// `priority1` below 255 makes the system grandmaster capable.
#[must_use]
pub fn sim_config(clock_identity: u64, priority1: u8, ports: usize) -> GptpConfig {
    let domain = DomainConfig {
        gm_capable: priority1 < u8::MAX,
        priority1,
        ..DomainConfig::default()
    };
    GptpConfig::builder()
        .clock_identity(clock_identity)
        .domains(vec![domain])
        .ports(vec![PortConfig::default(); ports])
        .stats_interval_s(0)
        .build()
}

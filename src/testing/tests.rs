use crate::clock::{AdjustMode, ClockId, ClockInterface};
use crate::error::GptpError;
use crate::testing::{SimClock, SimNetwork, TICK_NS, sim_config};

// ===== SimClock =====

#[test]
fn test_sim_clock_advances_all_clocks() {
    let clock = SimClock::new(1_000);
    clock.advance(500);
    assert_eq!(clock.time_of(ClockId::Local), 1_500);
    assert_eq!(clock.time_of(ClockId::Monotonic), 1_500);
}

#[test]
fn test_sim_clock_target_copies_local() {
    let clock = SimClock::new(1_000_000);
    clock.advance(1_000);
    assert_eq!(clock.time_of(ClockId::Target(3)), 1_001_000);
    clock.advance(1_000);
    assert_eq!(clock.time_of(ClockId::Target(3)), 1_002_000);
}

#[test]
fn test_sim_clock_drift() {
    let clock = SimClock::new(0).with_drift(100.0);
    clock.advance(1_000_000_000);
    assert!(clock.time_of(ClockId::Local).abs_diff(1_000_000_100) <= 1);
    assert_eq!(clock.time_of(ClockId::Monotonic), 1_000_000_000);
}

#[test]
fn test_sim_clock_frequency_and_offset() {
    let mut clock = SimClock::new(0);
    let target = ClockId::Target(0);
    clock.set_freq(target, -50).unwrap();
    clock.advance(1_000_000_000);
    assert!(clock.time_of(target).abs_diff(999_999_950) <= 1);
    assert_eq!(clock.freq_of(target), -50);

    clock.set_offset(target, 50).unwrap();
    assert!(clock.time_of(target).abs_diff(1_000_000_000) <= 1);
    assert_eq!(clock.offset_steps(), 1);
    assert_eq!(clock.time_of(ClockId::Local), 1_000_000_000);
}

#[test]
fn test_sim_clock_convert() {
    let clock = SimClock::new(5_000);
    clock.jump(ClockId::Target(0), 2_000);
    let converted = clock.convert(ClockId::Local, 6_000, ClockId::Target(0)).unwrap();
    assert_eq!(converted, 8_000);
}

#[test]
fn test_sim_clock_hardware_mode_steers_local() {
    let mut clock = SimClock::new(0).with_mode(AdjustMode::HARDWARE);
    assert_eq!(clock.adjust_mode(ClockId::Target(0)), AdjustMode::HARDWARE);
    clock.set_offset(ClockId::Target(0), 700).unwrap();
    assert_eq!(clock.time_of(ClockId::Local), 700);
}

#[test]
fn test_sim_clock_failure() {
    let clock = SimClock::new(0);
    clock.set_failing(true);
    assert!(matches!(clock.now(ClockId::Local), Err(GptpError::Clock { .. })));
    clock.set_failing(false);
    assert_eq!(clock.now(ClockId::Local).unwrap(), 0);
}

// ===== SimNetwork =====

#[test]
fn test_network_counts_time_and_frames() {
    let mut net = SimNetwork::new();
    assert!(net.is_empty());
    let a = net.add_system(sim_config(1, 100, 1), SimClock::new(0)).unwrap();
    let b = net.add_system(sim_config(2, 200, 1), SimClock::new(0)).unwrap();
    assert_eq!(net.len(), 2);
    net.connect(a, 0, b, 0, 100);

    net.run_for(2_000);
    assert_eq!(net.elapsed_ns(), 2_000 * TICK_NS);
    assert_eq!(net.delivered(), 0);

    net.start();
    net.run_for(2_000);
    assert!(net.delivered() > 0);
    assert_eq!(net.dropped(), 0);
}

#[test]
fn test_network_drops_on_unplugged_link() {
    let mut net = SimNetwork::new();
    let a = net.add_system(sim_config(1, 100, 1), SimClock::new(0)).unwrap();
    let b = net.add_system(sim_config(2, 200, 1), SimClock::new(0)).unwrap();
    let link = net.connect(a, 0, b, 0, 100);
    net.start();
    net.run_for(3_000);

    // One end still believes the link is up.
    net.set_link(link, false);
    net.system_mut(a).on_link_change(crate::net::LinkEvent {
        port: 0,
        up: true,
        rate_mbps: 1000,
    });
    net.run_for(3_000);
    assert!(net.dropped() > 0);
}

#[test]
fn test_network_rejects_invalid_config() {
    let mut net = SimNetwork::new();
    let mut config = sim_config(1, 100, 1);
    config.ports.clear();
    assert!(net.add_system(config, SimClock::new(0)).is_err());
    assert!(net.is_empty());
}

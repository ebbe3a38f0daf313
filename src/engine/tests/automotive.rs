use super::{START_NS, SYS_A, SYS_B, advance, link_up, receive, sent, system};
use crate::clock::PllState;
use crate::engine::port::LinkTxState;
use crate::engine::{GptpEvent, SyncState};
use crate::protocol::message::{
    AnnounceBody, Body, INTERVAL_RESET_TO_INITIAL, Message, MessageType, PortIdentity,
    SignalingTlv,
};
use crate::testing::{SimClock, SimNetwork};
use crate::types::{DomainConfig, GptpConfig, PdelayMode, PortConfig, PortRole, Profile};

fn automotive(clock_identity: u64, role: PortRole, mode: PdelayMode) -> GptpConfig {
    let domain = DomainConfig {
        gm_capable: role == PortRole::Master,
        ..DomainConfig::default()
    };
    GptpConfig::builder()
        .profile(Profile::Automotive)
        .clock_identity(clock_identity)
        .gm_id(SYS_A)
        .domains(vec![domain])
        .ports(vec![PortConfig {
            port_role: role,
            ..PortConfig::default()
        }])
        .pdelay_mode(mode)
        .stats_interval_s(0)
        .build()
}

fn automotive_pair(mode: PdelayMode) -> SimNetwork {
    let mut net = SimNetwork::new();
    let gm = automotive(SYS_A, PortRole::Master, mode);
    let slave = automotive(SYS_B, PortRole::Slave, mode);
    let a = net.add_system(gm, SimClock::new(START_NS)).unwrap();
    let b = net.add_system(slave, SimClock::new(7 * START_NS).with_drift(-30.0)).unwrap();
    net.connect(a, 0, b, 0, 400);
    net.start();
    net
}

// ===== Static Roles =====

#[test]
fn test_static_roles_before_link_up() {
    let (mut gm, _clock) = system(automotive(SYS_A, PortRole::Master, PdelayMode::Static));
    assert!(gm.is_grandmaster(0));
    assert_eq!(gm.port_role(0, 0), Some(PortRole::Master));
    assert!(matches!(
        gm.drain_events().as_slice(),
        [GptpEvent::GmChange {
            is_grandmaster: true,
            ..
        }]
    ));

    let (slave, _clock) = system(automotive(SYS_B, PortRole::Slave, PdelayMode::Static));
    assert!(!slave.is_grandmaster(0));
    assert!(slave.gm_present(0));
    assert_eq!(slave.grandmaster_identity(0), Some(SYS_A));
    assert_eq!(slave.port_role(0, 0), Some(PortRole::Slave));
}

#[test]
fn test_as_capable_on_link_up_with_static_delay() {
    let (mut sys, _clock) = system(automotive(SYS_B, PortRole::Slave, PdelayMode::Static));
    assert!(!sys.as_capable(0, 0));
    link_up(&mut sys, 0);
    assert!(sys.as_capable(0, 0));
    assert_eq!(sys.mean_link_delay(0), Some(250.0));
    assert_eq!(sys.link_tx_state(0, 0), Some(LinkTxState::Initial));

    let request = sent(&mut sys).into_iter().find_map(|(_, msg)| match msg.body {
        Body::Signaling {
            tlv: SignalingTlv::IntervalRequest(tlv),
            ..
        } => Some(tlv),
        _ => None,
    });
    let request = request.unwrap();
    assert_eq!(request.link_delay_interval, INTERVAL_RESET_TO_INITIAL);
    assert_eq!(request.time_sync_interval, INTERVAL_RESET_TO_INITIAL);
}

#[test]
fn test_as_capable_survives_lost_responses() {
    let (mut sys, clock) = system(automotive(SYS_B, PortRole::Slave, PdelayMode::Static));
    link_up(&mut sys, 0);
    advance(&mut sys, &clock, 15_000);
    assert!(sys.as_capable(0, 0));
    assert_eq!(sys.mean_link_delay(0), Some(250.0));
}

#[test]
fn test_announce_dropped() {
    let (mut sys, _clock) = system(automotive(SYS_B, PortRole::Slave, PdelayMode::Static));
    link_up(&mut sys, 0);
    let body = AnnounceBody {
        grandmaster_priority1: 1,
        grandmaster_identity: 0x42,
        ..AnnounceBody::default()
    };
    let msg = Message::announce(PortIdentity::new(0x42, 1), 1, 0, 0, body);
    receive(&mut sys, 0, &msg, START_NS);
    assert_eq!(sys.port_counters(0, 0).unwrap().rx_announce_dropped, 1);
    assert_eq!(sys.grandmaster_identity(0), Some(SYS_A));
}

#[test]
fn test_grandmaster_sends_no_announce() {
    let (mut sys, clock) = system(automotive(SYS_A, PortRole::Master, PdelayMode::Static));
    link_up(&mut sys, 0);
    advance(&mut sys, &clock, 3_000);
    let frames = sent(&mut sys);
    assert!(frames.iter().any(|(_, msg)| msg.header.message_type == MessageType::Sync));
    assert!(!frames.iter().any(|(_, msg)| msg.header.message_type == MessageType::Announce));
}

// ===== Link Delay Modes =====

#[test]
fn test_silent_mode_never_requests() {
    let (mut sys, clock) = system(automotive(SYS_B, PortRole::Slave, PdelayMode::Silent));
    link_up(&mut sys, 0);
    advance(&mut sys, &clock, 5_000);
    let frames = sent(&mut sys);
    assert!(!frames.iter().any(|(_, msg)| msg.header.message_type == MessageType::PdelayReq));

    let changes: Vec<_> = sys
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, GptpEvent::PdelayChange { .. }))
        .collect();
    assert_eq!(
        changes,
        vec![GptpEvent::PdelayChange {
            port: 0,
            mean_link_delay_ns: 250.0,
        }]
    );
}

#[test]
fn test_static_mode_reports_measured_delay() {
    let mut net = automotive_pair(PdelayMode::Static);
    net.run_for(5_000);
    let measured = net.system_mut(1).drain_events().into_iter().find_map(|event| match event {
        GptpEvent::PdelayChange {
            mean_link_delay_ns,
            ..
        } => Some(mean_link_delay_ns),
        _ => None,
    });
    let measured = measured.unwrap();
    assert!((measured - 400.0).abs() < 2.0, "delay {measured}");
}

// ===== Sync =====

#[test]
fn test_slave_reaches_operational_intervals() {
    let mut net = automotive_pair(PdelayMode::Static);
    net.run_for(20_000);

    let slave = net.system(1);
    assert_eq!(slave.pll_state(0), Some(PllState::Locked));
    assert_eq!(slave.sync_state(0, 0), Some(SyncState::Synchronized));
    assert_eq!(slave.link_tx_state(0, 0), Some(LinkTxState::Oper));
    assert!(net.system(0).port_counters(0, 0).unwrap().rx_signaling >= 2);
}

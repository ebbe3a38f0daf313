mod automotive;
mod pdelay;
mod role_proptest;

use crate::clock::ClockId;
use crate::engine::TimeAwareSystem;
use crate::error::{ConfigError, GptpError};
use crate::net::{LinkEvent, Outbox, RxFrame, TxFrame, TxTimestamp};
use crate::protocol::message::{Body, Message, MessageType, PortIdentity, SignalingTlv};
use crate::protocol::time::{NS_PER_MS, PtpTimestamp};
use crate::testing::{SimClock, SimNetwork, sim_config};
use crate::types::{DelayMechanism, DomainConfig, GptpConfig, PortConfig};

type System = TimeAwareSystem<SimClock, Outbox>;

const START_NS: u64 = 1_000_000_000;

/// Clock identities of simulated systems.
const SYS_A: u64 = 0x0011_22FF_FE33_4401;
const SYS_B: u64 = 0x0011_22FF_FE33_4402;
const SYS_C: u64 = 0x0011_22FF_FE33_4403;

fn system(config: GptpConfig) -> (System, SimClock) {
    let clock = SimClock::new(START_NS);
    let sys = TimeAwareSystem::new(config, clock.clone(), Outbox::new()).unwrap();
    (sys, clock)
}

fn link_up(sys: &mut System, port: usize) {
    sys.on_link_change(LinkEvent {
        port,
        up: true,
        rate_mbps: 1000,
    });
}

/// Drain the outbox, decoding every frame.
fn sent(sys: &mut System) -> Vec<(TxFrame, Message)> {
    sys.net_mut()
        .drain()
        .into_iter()
        .map(|frame| {
            let msg = Message::decode(&frame.frame).unwrap();
            (frame, msg)
        })
        .collect()
}

fn receive(sys: &mut System, port: usize, msg: &Message, timestamp: u64) {
    sys.on_frame(&RxFrame {
        port,
        data: msg.encode(),
        timestamp,
    });
}

fn advance(sys: &mut System, clock: &SimClock, ms: u64) {
    for _ in 0..ms {
        clock.advance(NS_PER_MS);
        sys.poll_timers();
    }
}

/// Two systems on one cable; `a` has the better priority.
fn pair(delay_ns: u64) -> SimNetwork {
    let mut net = SimNetwork::new();
    let a = net.add_system(sim_config(SYS_A, 100, 1), SimClock::new(START_NS)).unwrap();
    let b = net
        .add_system(sim_config(SYS_B, 248, 1), SimClock::new(3 * START_NS).with_drift(40.0))
        .unwrap();
    net.connect(a, 0, b, 0, delay_ns);
    net.start();
    net
}

/// Domain 0 and domain 1 on every port, domain 1 over CMLDS.
fn two_domain_config(clock_identity: u64, priority1: u8) -> GptpConfig {
    let mut config = sim_config(clock_identity, priority1, 1);
    let mut second = config.domains[0].clone();
    second.domain_number = 1;
    config.domains.push(second);
    config
}

/// Responder clock offset from the requester, in ns.
const RESPONDER_OFFSET_NS: u64 = 3_000_000;
/// Time the responder holds a request before answering, in ns.
const TURNAROUND_NS: u64 = 20_000;

/// Answer to one `Pdelay_Req`, ready to be delivered.
struct PdelayAnswer {
    resp: Message,
    fup: Message,
    /// Ingress timestamp of the response
    t4: u64,
}

impl PdelayAnswer {
    fn deliver(&self, sys: &mut System) {
        receive(sys, 0, &self.resp, self.t4);
        receive(sys, 0, &self.fup, self.t4);
    }
}

/// Take the pending `Pdelay_Req` of port 0 from the outbox, report its
/// egress timestamp and build an answer from `responder` that measures
/// `raw_delay_ns`.
fn answer_pdelay(
    sys: &mut System,
    clock: &SimClock,
    responder: PortIdentity,
    raw_delay_ns: i64,
) -> PdelayAnswer {
    let frames = sent(sys);
    let (frame, req) = frames
        .into_iter()
        .find(|(_, msg)| msg.header.message_type == MessageType::PdelayReq)
        .unwrap();
    let t1 = clock.time_of(ClockId::Local);
    sys.on_tx_timestamp(&TxTimestamp {
        port: 0,
        tag: frame.tag.unwrap(),
        timestamp: t1,
    });

    let seq = req.header.sequence_id;
    let requester = req.header.source_port_identity;
    let t2 = t1 + RESPONDER_OFFSET_NS;
    let t3 = t2 + TURNAROUND_NS;
    let round_trip = i64::try_from(TURNAROUND_NS).unwrap() + 2 * raw_delay_ns;
    let t4 = t1.checked_add_signed(round_trip).unwrap();
    let t2 = PtpTimestamp::from_u64_ns(t2);
    let t3 = PtpTimestamp::from_u64_ns(t3);
    PdelayAnswer {
        resp: Message::pdelay_resp(responder, seq, false, t2, requester),
        fup: Message::pdelay_resp_follow_up(responder, seq, false, t3, requester),
        t4,
    }
}

/// Run `count` peer delay exchanges of one second each against `responder`.
fn exchange_pdelay(
    sys: &mut System,
    clock: &SimClock,
    responder: PortIdentity,
    raw_delay_ns: i64,
    count: usize,
) {
    for _ in 0..count {
        answer_pdelay(sys, clock, responder, raw_delay_ns).deliver(sys);
        advance(sys, clock, 1000);
    }
}

/// Bring port 0 up and make its link AS-capable against `SYS_B`.
fn capable_system(config: GptpConfig) -> (System, SimClock) {
    let (mut sys, clock) = system(config);
    link_up(&mut sys, 0);
    exchange_pdelay(&mut sys, &clock, PortIdentity::new(SYS_B, 1), 500, 3);
    assert!(sys.as_capable(0, 0));
    (sys, clock)
}

// ===== Construction =====

#[test]
fn test_new_rejects_invalid_config() {
    let config = GptpConfig::builder()
        .domains(vec![DomainConfig::with_number(3)])
        .build();
    let result = TimeAwareSystem::new(config, SimClock::new(START_NS), Outbox::new());
    assert!(matches!(
        result,
        Err(GptpError::Config(ConfigError::FirstDomainNotZero(3)))
    ));
}

#[test]
fn test_new_reports_clock_failure() {
    let clock = SimClock::new(START_NS);
    clock.set_failing(true);
    let result = TimeAwareSystem::new(sim_config(SYS_A, 100, 1), clock, Outbox::new());
    assert!(matches!(result, Err(GptpError::Clock { .. })));
}

#[test]
fn test_new_builds_one_instance_per_enabled_domain() {
    let mut config = two_domain_config(SYS_A, 100);
    config.domains.push(DomainConfig::with_number(-1));
    let (sys, _clock) = system(config);

    assert_eq!(sys.instance_count(), 2);
    assert_eq!(sys.domain(0), Some(0));
    assert_eq!(sys.domain(1), Some(1));
    assert_eq!(sys.domain(2), None);
    assert!(sys.link_counters(0).is_some());
}

#[test]
fn test_quiet_while_links_down() {
    let (mut sys, clock) = system(sim_config(SYS_A, 100, 2));
    assert!(sys.next_deadline().is_some());
    advance(&mut sys, &clock, 3000);
    assert!(sent(&mut sys).is_empty());
    assert!(!sys.as_capable(0, 0));
}

#[test]
fn test_delay_mechanism_selects_cmlds() {
    let mut config = sim_config(SYS_A, 100, 1);
    config.ports[0] = PortConfig {
        delay_mechanism: vec![DelayMechanism::CommonP2p],
        ..PortConfig::default()
    };
    let (mut sys, _clock) = system(config);
    link_up(&mut sys, 0);

    let frames = sent(&mut sys);
    let (_, req) = frames
        .iter()
        .find(|(_, msg)| msg.header.message_type == MessageType::PdelayReq)
        .unwrap();
    assert_eq!(req.header.major_sdo_id, crate::protocol::message::SDO_ID_CMLDS);
}

// ===== Link Events =====

#[test]
fn test_link_up_starts_peer_delay_and_capable_signaling() {
    let (mut sys, _clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);

    let frames = sent(&mut sys);
    let pdelay = frames
        .iter()
        .find(|(_, msg)| msg.header.message_type == MessageType::PdelayReq)
        .unwrap();
    assert!(pdelay.0.tag.is_some());
    assert!(frames.iter().any(|(_, msg)| matches!(
        msg.body,
        Body::Signaling {
            tlv: SignalingTlv::GptpCapable(_),
            ..
        }
    )));
    assert_eq!(sys.net_port_counters(0).unwrap().tx_timestamp_requests, 1);
    assert_eq!(sys.link_counters(0).unwrap().tx_pdelay_req, 1);
}

#[test]
fn test_link_down_silences_port() {
    let (mut sys, clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    advance(&mut sys, &clock, 2500);
    assert!(!sent(&mut sys).is_empty());

    sys.on_link_change(LinkEvent {
        port: 0,
        up: false,
        rate_mbps: 0,
    });
    sent(&mut sys);
    advance(&mut sys, &clock, 5000);
    assert!(sent(&mut sys).is_empty());
}

#[test]
fn test_link_event_on_unknown_port_ignored() {
    let (mut sys, _clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 7);
    assert!(sent(&mut sys).is_empty());
}

// ===== Statistics =====

#[test]
fn test_dump_stats_resets_link_statistics() {
    let mut net = pair(500);
    net.run_for(5000);
    net.system_mut(1).dump_stats();
    assert!(net.system(1).as_capable(0, 0));
}

#[test]
fn test_stats_timer_keeps_running() {
    let config = GptpConfig {
        stats_interval_s: 1,
        ..sim_config(SYS_A, 100, 1)
    };
    let (mut sys, clock) = system(config);
    advance(&mut sys, &clock, 3500);
    assert!(sys.next_deadline().is_some());
}

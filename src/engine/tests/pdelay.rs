use super::{
    START_NS, SYS_A, SYS_B, SYS_C, advance, answer_pdelay, capable_system, exchange_pdelay,
    link_up, pair, receive, sent, system,
};
use crate::measure::FilterKind;
use crate::net::{TxKind, TxTimestamp};
use crate::protocol::message::{
    Body, INTERVAL_STOP, IntervalRequestTlv, Message, MessageType, PortIdentity, SignalingTlv,
};
use crate::protocol::time::PtpTimestamp;
use crate::testing::sim_config;
use crate::types::DelayMechanism;

fn interval_request(link_delay_interval: i8) -> Message {
    let tlv = IntervalRequestTlv {
        link_delay_interval,
        ..IntervalRequestTlv::default()
    };
    let peer = PortIdentity::new(SYS_B, 1);
    Message::signaling(peer, 3, 0, PortIdentity::ALL, SignalingTlv::IntervalRequest(tlv))
}

fn responder() -> PortIdentity {
    PortIdentity::new(SYS_B, 1)
}

fn pdelay_reqs(frames: &[(crate::net::TxFrame, Message)]) -> usize {
    frames
        .iter()
        .filter(|(_, msg)| msg.header.message_type == MessageType::PdelayReq)
        .count()
}

// ===== Responder =====

#[test]
fn test_responder_answers_with_two_step_response() {
    let (mut sys, _clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    sent(&mut sys);

    let requester = PortIdentity::new(SYS_B, 1);
    let t2 = START_NS + 1_234;
    receive(&mut sys, 0, &Message::pdelay_req(requester, 77, false), t2);

    let frames = sent(&mut sys);
    assert_eq!(frames.len(), 1);
    let (frame, resp) = &frames[0];
    let tag = frame.tag.unwrap();
    assert_eq!(tag.kind, TxKind::PdelayResp);
    assert_eq!(tag.sequence_id, 77);
    assert_eq!(resp.header.sequence_id, 77);
    match resp.body {
        Body::PdelayResp {
            request_receipt_timestamp,
            requesting_port_identity,
        } => {
            assert_eq!(request_receipt_timestamp, PtpTimestamp::from_u64_ns(t2));
            assert_eq!(requesting_port_identity, requester);
        }
        ref other => panic!("expected Pdelay_Resp, got {other:?}"),
    }

    let t3 = t2 + 5_000;
    sys.on_tx_timestamp(&TxTimestamp {
        port: 0,
        tag,
        timestamp: t3,
    });
    let frames = sent(&mut sys);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].0.tag.is_none());
    match frames[0].1.body {
        Body::PdelayRespFollowUp {
            response_origin_timestamp,
            requesting_port_identity,
        } => {
            assert_eq!(response_origin_timestamp, PtpTimestamp::from_u64_ns(t3));
            assert_eq!(requesting_port_identity, requester);
        }
        ref other => panic!("expected Pdelay_Resp_Follow_Up, got {other:?}"),
    }

    let counters = sys.link_counters(0).unwrap();
    assert_eq!(counters.rx_pdelay_req, 1);
    assert_eq!(counters.tx_pdelay_resp, 1);
    assert_eq!(counters.tx_pdelay_resp_follow_up, 1);
}

#[test]
fn test_responder_silent_while_link_down() {
    let (mut sys, _clock) = system(sim_config(SYS_A, 100, 1));
    let requester = PortIdentity::new(SYS_B, 1);
    receive(&mut sys, 0, &Message::pdelay_req(requester, 1, false), START_NS);
    assert!(sent(&mut sys).is_empty());
}

#[test]
fn test_pdelay_for_unconfigured_mechanism_counted() {
    let mut config = sim_config(SYS_A, 100, 1);
    config.ports[0].delay_mechanism = vec![DelayMechanism::CommonP2p];
    let (mut sys, _clock) = system(config);
    link_up(&mut sys, 0);
    let requester = PortIdentity::new(SYS_B, 1);
    receive(&mut sys, 0, &Message::pdelay_req(requester, 1, false), START_NS);
    assert_eq!(sys.net_port_counters(0).unwrap().rx_err_domain_unknown, 1);
}

// ===== Requester =====

#[test]
fn test_measured_link_delay() {
    let mut net = pair(600);
    net.run_for(5_000);
    for i in 0..2 {
        let delay = net.system(i).mean_link_delay(0).unwrap();
        assert!((delay - 600.0).abs() < 2.0, "system {i}: delay {delay}");
        assert!(net.system(i).as_capable(0, 0));
    }
}

#[test]
fn test_neighbor_rate_ratio_tracks_drift() {
    let mut net = pair(500);
    net.run_for(5_000);
    // b runs 40 ppb fast, so a's clock is slow relative to it.
    let ratio = net.system(1).neighbor_rate_ratio(0).unwrap();
    assert!((ratio - (1.0 - 40e-9)).abs() < 5e-9, "ratio {ratio}");
    let ratio = net.system(0).neighbor_rate_ratio(0).unwrap();
    assert!((ratio - (1.0 + 40e-9)).abs() < 5e-9, "ratio {ratio}");
}

#[test]
fn test_delay_above_threshold_not_as_capable() {
    let mut net = pair(2_000);
    net.run_for(5_000);
    assert!(!net.system(1).as_capable(0, 0));
    let delay = net.system(1).mean_link_delay(0).unwrap();
    assert!((delay - 2_000.0).abs() < 2.0, "delay {delay}");
}

#[test]
fn test_no_responder_never_capable() {
    let (mut sys, clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    advance(&mut sys, &clock, 12_000);

    let counters = sys.link_counters(0).unwrap();
    assert_eq!(counters.tx_pdelay_req, 13);
    assert_eq!(counters.pdelay_req_sm_reset, 12);
    assert_eq!(counters.pdelay_lost_exceeded, 3);
    assert!(!sys.as_capable(0, 0));
}

#[test]
fn test_capable_until_allowed_lost_responses_exceeded() {
    let (mut sys, clock) = capable_system(sim_config(SYS_A, 100, 1));

    // Requests keep their egress timestamps but are never answered.
    for lost in 1..=9 {
        answer_pdelay(&mut sys, &clock, responder(), 500);
        advance(&mut sys, &clock, 1000);
        assert!(sys.as_capable(0, 0), "capable after {lost} lost responses");
    }
    assert_eq!(sys.link_counters(0).unwrap().pdelay_lost_exceeded, 0);

    answer_pdelay(&mut sys, &clock, responder(), 500);
    advance(&mut sys, &clock, 1000);
    assert!(!sys.as_capable(0, 0));
    let counters = sys.link_counters(0).unwrap();
    assert_eq!(counters.pdelay_lost_exceeded, 1);
    assert_eq!(counters.pdelay_req_sm_reset, 10);
}

#[test]
fn test_answered_after_losses_stays_capable() {
    let (mut sys, clock) = capable_system(sim_config(SYS_A, 100, 1));
    for _ in 0..9 {
        answer_pdelay(&mut sys, &clock, responder(), 500);
        advance(&mut sys, &clock, 1000);
    }
    exchange_pdelay(&mut sys, &clock, responder(), 500, 1);

    // The answered exchange clears the lost response count.
    for _ in 0..9 {
        answer_pdelay(&mut sys, &clock, responder(), 500);
        advance(&mut sys, &clock, 1000);
    }
    assert!(sys.as_capable(0, 0));
    assert_eq!(sys.link_counters(0).unwrap().pdelay_lost_exceeded, 0);
}

// ===== Negative Delay =====

#[test]
fn test_large_negative_delay_not_capable() {
    let (mut sys, clock) = capable_system(sim_config(SYS_A, 100, 1));
    let delay = sys.mean_link_delay(0).unwrap();
    assert!((delay - 500.0).abs() < 1.0, "delay {delay}");

    exchange_pdelay(&mut sys, &clock, responder(), -1_000, 1);
    assert!(!sys.as_capable(0, 0));
    let delay = sys.mean_link_delay(0).unwrap();
    assert!(delay > 800.0, "delay {delay}");

    // The filter restarts, so one good exchange is enough to recover.
    exchange_pdelay(&mut sys, &clock, responder(), 500, 1);
    assert!(sys.as_capable(0, 0));
    let delay = sys.mean_link_delay(0).unwrap();
    assert!((delay - 500.0).abs() < 1.0, "delay {delay}");
}

#[test]
fn test_small_negative_delay_clamped_to_zero() {
    let mut config = sim_config(SYS_A, 100, 1);
    config.pdelay_filter = FilterKind::Identity;
    let (mut sys, clock) = capable_system(config);

    exchange_pdelay(&mut sys, &clock, responder(), -20, 1);
    assert_eq!(sys.mean_link_delay(0), Some(0.0));
    assert!(sys.as_capable(0, 0));

    exchange_pdelay(&mut sys, &clock, responder(), 500, 1);
    let delay = sys.mean_link_delay(0).unwrap();
    assert!((delay - 500.0).abs() < 1.0, "delay {delay}");
}

// ===== Response Correlation =====

#[test]
fn test_response_with_wrong_sequence_discarded() {
    let (mut sys, clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    for _ in 0..3 {
        let mut answer = answer_pdelay(&mut sys, &clock, responder(), 500);
        let seq = answer.resp.header.sequence_id.wrapping_add(1);
        answer.resp.header.sequence_id = seq;
        answer.fup.header.sequence_id = seq;
        answer.deliver(&mut sys);
        advance(&mut sys, &clock, 1000);
    }

    let counters = sys.link_counters(0).unwrap();
    assert_eq!(counters.pdelay_resp_discard, 3);
    assert_eq!(counters.pdelay_req_sm_reset, 3);
    assert!(!sys.as_capable(0, 0));

    exchange_pdelay(&mut sys, &clock, responder(), 500, 2);
    assert!(sys.as_capable(0, 0));
}

#[test]
fn test_response_for_other_requester_discarded() {
    let (mut sys, clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    for _ in 0..3 {
        let mut answer = answer_pdelay(&mut sys, &clock, responder(), 500);
        let other = PortIdentity::new(SYS_C, 1);
        answer.resp = Message::pdelay_resp(
            responder(),
            answer.resp.header.sequence_id,
            false,
            PtpTimestamp::from_u64_ns(START_NS),
            other,
        );
        answer.deliver(&mut sys);
        advance(&mut sys, &clock, 1000);
    }
    assert_eq!(sys.link_counters(0).unwrap().pdelay_resp_discard, 3);
    assert!(!sys.as_capable(0, 0));
}

#[test]
fn test_follow_up_with_wrong_sequence_discarded() {
    let (mut sys, clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    for _ in 0..3 {
        let mut answer = answer_pdelay(&mut sys, &clock, responder(), 500);
        answer.fup.header.sequence_id = answer.fup.header.sequence_id.wrapping_sub(1);
        answer.deliver(&mut sys);
        advance(&mut sys, &clock, 1000);
    }

    let counters = sys.link_counters(0).unwrap();
    assert_eq!(counters.pdelay_resp_follow_up_discard, 3);
    assert_eq!(counters.pdelay_resp_discard, 0);
    assert_eq!(counters.pdelay_req_sm_reset, 3);
    assert!(!sys.as_capable(0, 0));
}

#[test]
fn test_follow_up_from_other_responder_discarded() {
    let (mut sys, clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    for _ in 0..3 {
        let mut answer = answer_pdelay(&mut sys, &clock, responder(), 500);
        answer.fup.header.source_port_identity = PortIdentity::new(SYS_C, 1);
        answer.deliver(&mut sys);
        advance(&mut sys, &clock, 1000);
    }
    assert_eq!(sys.link_counters(0).unwrap().pdelay_resp_follow_up_discard, 3);
    assert!(!sys.as_capable(0, 0));
}

// ===== Multiple Responders =====

#[test]
fn test_multiple_responders_hold_off_requests() {
    let (mut sys, clock) = capable_system(sim_config(SYS_A, 100, 1));
    for round in 1..=3 {
        let answer = answer_pdelay(&mut sys, &clock, responder(), 500);
        let mut second = answer.resp.clone();
        second.header.source_port_identity = PortIdentity::new(SYS_C, 1);
        receive(&mut sys, 0, &answer.resp, answer.t4);
        receive(&mut sys, 0, &second, answer.t4 + 100);
        assert!(!sys.as_capable(0, 0));
        assert_eq!(sys.link_counters(0).unwrap().pdelay_multiple_responses, round);
        if round < 3 {
            advance(&mut sys, &clock, 1000);
        }
    }

    sent(&mut sys);
    advance(&mut sys, &clock, 299_000);
    assert_eq!(pdelay_reqs(&sent(&mut sys)), 0);
    advance(&mut sys, &clock, 1_000);
    assert_eq!(pdelay_reqs(&sent(&mut sys)), 1);
}

#[test]
fn test_single_duplicate_does_not_hold_off() {
    let (mut sys, clock) = capable_system(sim_config(SYS_A, 100, 1));
    let answer = answer_pdelay(&mut sys, &clock, responder(), 500);
    receive(&mut sys, 0, &answer.resp, answer.t4);
    receive(&mut sys, 0, &answer.resp, answer.t4 + 100);
    assert_eq!(sys.link_counters(0).unwrap().pdelay_multiple_responses, 1);

    advance(&mut sys, &clock, 1000);
    assert_eq!(pdelay_reqs(&sent(&mut sys)), 1);
}

// ===== Interval Requests =====

#[test]
fn test_link_delay_interval_request() {
    let (mut sys, _clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    assert_eq!(sys.pdelay_interval_log(0), Some(0));

    receive(&mut sys, 0, &interval_request(2), START_NS);
    assert_eq!(sys.pdelay_interval_log(0), Some(2));

    receive(&mut sys, 0, &interval_request(9), START_NS);
    assert_eq!(sys.pdelay_interval_log(0), Some(3));
}

#[test]
fn test_link_delay_interval_stop() {
    let (mut sys, clock) = system(sim_config(SYS_A, 100, 1));
    link_up(&mut sys, 0);
    receive(&mut sys, 0, &interval_request(INTERVAL_STOP), START_NS);
    assert_eq!(sys.pdelay_interval_log(0), Some(INTERVAL_STOP));

    sent(&mut sys);
    advance(&mut sys, &clock, 10_000);
    assert_eq!(pdelay_reqs(&sent(&mut sys)), 0);
}

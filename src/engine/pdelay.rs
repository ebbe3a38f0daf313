//! Peer delay: request and response state machines plus the link delay
//! interval setting.
//!
//! One set per [`Link`](super::port::Link). The requester measures the
//! neighbor rate ratio and mean link delay; the responder answers the
//! neighbor's requests with a two-step `Pdelay_Resp`.

use crate::clock::ClockInterface;
use crate::net::{NetworkInterface, TxKind, TxTag};
use crate::protocol::message::{
    INTERVAL_NO_CHANGE, INTERVAL_RESET_TO_INITIAL, INTERVAL_STOP, IntervalRequestTlv, Message,
};
use crate::protocol::time::{NS_PER_MS, PtpTimestamp, ScaledNs, log_to_ns};
use crate::types::PdelayMode;

use super::port::{IntervalState, PdelayReqState, PdelayRespState};
use super::timer::TimerId;
use super::{GptpEvent, TimeAwareSystem};

/// Responses tolerated below the clock granularity before a negative
/// delay counts as invalid, in ns.
const MAX_MEASURE_ERROR_NS: f64 = 48.0;

/// Consecutive multiple-response resets before requests are held off.
const MULTIPLE_RESPONSES_MAX: u16 = 3;

/// Hold-off after repeated multiple responses, in ms.
const MULTIPLE_RESPONSES_HOLD_OFF_MS: u64 = 300_000;

/// Shortest supported peer delay interval.
const LOG_PDELAY_REQ_INTERVAL_MIN: i8 = 0;
/// Longest supported peer delay interval.
const LOG_PDELAY_REQ_INTERVAL_MAX: i8 = 3;

/// Stimulus of the peer delay request state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PdelayReqEvent {
    Run,
    ReqInterval,
    RespReceived,
    RespFollowUpReceived,
    TimestampReceived,
}

/// Stimulus of the peer delay response state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PdelayRespEvent {
    Run,
    ReqReceived,
    TimestampReceived,
}

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    fn link_enabled(&self, l: usize) -> bool {
        let link = &self.links[l];
        self.net_ports[link.port].oper && link.port_enabled
    }

    // ===== Request =====

    pub(crate) fn pdelay_req_sm(&mut self, l: usize, event: PdelayReqEvent) {
        let mut event = event;
        loop {
            if !self.link_enabled(l) {
                let link = &mut self.links[l];
                if link.req_state != PdelayReqState::NotEnabled {
                    tracing::debug!(
                        port = link.port,
                        cmlds = link.cmlds,
                        "pdelay req: {} -> NOT_ENABLED",
                        link.req_state
                    );
                }
                link.req_state = PdelayReqState::NotEnabled;
                link.compute_nrr = true;
                link.compute_mld = true;
                self.timers.stop(TimerId::PdelayReq(l));
                return;
            }

            let state = self.links[l].req_state;
            let mut rerun = None;
            match state {
                PdelayReqState::NotEnabled => {
                    if self.links[l].pdelay_transmit_enabled {
                        self.pdelay_initial_send(l);
                    } else {
                        self.pdelay_silent(l);
                    }
                }
                PdelayReqState::Reset => {
                    if event == PdelayReqEvent::ReqInterval {
                        let link = &mut self.links[l];
                        link.rcvd_resp = None;
                        link.rcvd_resp_fup = None;
                        self.pdelay_send(l);
                    }
                }
                PdelayReqState::InitialSendPdelayReq | PdelayReqState::SendPdelayReq => {
                    match event {
                        PdelayReqEvent::TimestampReceived => {
                            rerun = self.pdelay_waiting_resp(l);
                        }
                        PdelayReqEvent::ReqInterval => {
                            tracing::debug!(
                                port = self.links[l].port,
                                "pdelay req: no egress timestamp before interval"
                            );
                            self.pdelay_reset(l);
                        }
                        // Kept until the request egress timestamp is known.
                        _ => {}
                    }
                }
                PdelayReqState::WaitingForPdelayResp => match event {
                    PdelayReqEvent::RespReceived => {
                        if self.pdelay_resp_valid(l) {
                            rerun = self.pdelay_waiting_fup(l);
                        } else {
                            self.pdelay_resp_discard(l);
                            self.pdelay_reset(l);
                        }
                    }
                    PdelayReqEvent::ReqInterval => {
                        if self.links[l].rcvd_resp.is_some() {
                            if self.pdelay_resp_valid(l) {
                                rerun = self.pdelay_waiting_fup(l);
                            } else {
                                self.pdelay_resp_discard(l);
                                self.pdelay_reset(l);
                            }
                        } else {
                            if self.config.is_automotive()
                                && self.config.pdelay_mode == PdelayMode::Static
                            {
                                self.pdelay_waiting_interval_static(l);
                            }
                            self.pdelay_reset(l);
                        }
                    }
                    _ => {}
                },
                PdelayReqState::WaitingForPdelayRespFollowUp => match event {
                    PdelayReqEvent::RespFollowUpReceived => {
                        if self.pdelay_resp_fup_valid(l) {
                            self.pdelay_waiting_interval(l);
                        } else {
                            let link = &mut self.links[l];
                            link.counters.pdelay_resp_follow_up_discard += 1;
                            tracing::debug!(
                                port = link.port,
                                "pdelay req: Pdelay_Resp_Follow_Up does not match, ignored"
                            );
                        }
                    }
                    PdelayReqEvent::RespReceived => {
                        let link = &mut self.links[l];
                        let req_seq = link.req_seq;
                        let duplicate =
                            link.rcvd_resp.take().is_some_and(|resp| resp.sequence_id == req_seq);
                        if duplicate {
                            tracing::warn!(
                                port = link.port,
                                seq = link.req_seq,
                                "multiple Pdelay_Resp for one request"
                            );
                            link.multiple_responses += 1;
                            link.counters.pdelay_multiple_responses += 1;
                            link.counters.pdelay_resp_discard += 1;
                            self.as_capable_across_domains_down(l);
                            self.pdelay_reset(l);
                        }
                    }
                    PdelayReqEvent::ReqInterval => self.pdelay_reset(l),
                    _ => {}
                },
                PdelayReqState::WaitingForPdelayIntervalTimer => {
                    if event == PdelayReqEvent::ReqInterval {
                        self.pdelay_send(l);
                    }
                }
            }

            let new_state = self.links[l].req_state;
            if new_state != state {
                tracing::debug!(
                    port = self.links[l].port,
                    "pdelay req: {} {:?} -> {}",
                    state,
                    event,
                    new_state
                );
            }

            if let Some(next) = rerun {
                event = next;
                continue;
            }
            // RESET to SEND is unconditional once the interval timer has fired.
            if new_state == PdelayReqState::Reset
                && event == PdelayReqEvent::ReqInterval
                && state != PdelayReqState::Reset
            {
                continue;
            }
            return;
        }
    }

    fn pdelay_resp_discard(&mut self, l: usize) {
        let link = &mut self.links[l];
        link.counters.pdelay_resp_discard += 1;
        if let Some(resp) = link.rcvd_resp {
            tracing::debug!(
                port = link.port,
                "pdelay req: Pdelay_Resp seq {} requester {} does not match request seq {}",
                resp.sequence_id,
                resp.requesting,
                link.req_seq
            );
        }
    }

    fn pdelay_resp_valid(&self, l: usize) -> bool {
        let link = &self.links[l];
        link.rcvd_resp.is_some_and(|resp| {
            resp.requesting == link.identity && resp.sequence_id == link.req_seq
        })
    }

    fn pdelay_resp_fup_valid(&self, l: usize) -> bool {
        let link = &self.links[l];
        match (link.rcvd_resp_fup, link.accepted_resp) {
            (Some(fup), Some(resp)) => {
                fup.sequence_id == link.req_seq && fup.source == resp.source
            }
            _ => false,
        }
    }

    fn pdelay_request(&mut self, l: usize) {
        let link = &self.links[l];
        let msg = Message::pdelay_req(link.identity, link.req_seq, link.cmlds);
        let tag = TxTag {
            kind: TxKind::PdelayReq,
            owner: l,
            sequence_id: link.req_seq,
        };
        let port = link.port;
        self.links[l].req_tx_ts = None;
        self.transmit(port, &msg, Some(tag));
        self.links[l].counters.tx_pdelay_req += 1;
    }

    fn pdelay_initial_send(&mut self, l: usize) {
        let seq = rand::random::<u16>();
        let link = &mut self.links[l];
        link.neighbor_rate_ratio = 1.0;
        link.lost_responses = 0;
        link.is_measuring_delay = false;
        link.prev_responder_ts = None;
        link.nrr_valid = false;
        link.rcvd_resp = None;
        link.accepted_resp = None;
        link.rcvd_resp_fup = None;
        link.filter.reset();
        link.req_seq = seq;
        let interval_ns = link.pdelay_req_interval_ns;
        self.as_capable_across_domains_down(l);

        self.pdelay_request(l);
        self.timers.start_ns(TimerId::PdelayReq(l), interval_ns);
        self.links[l].req_state = PdelayReqState::InitialSendPdelayReq;
    }

    fn pdelay_send(&mut self, l: usize) {
        let phase_discont = self.local_clock.phase_discont;
        let link = &mut self.links[l];
        link.req_seq = link.req_seq.wrapping_add(1);
        link.prev_delay_phase_discont = phase_discont;
        let interval_ns = link.pdelay_req_interval_ns;

        self.pdelay_request(l);
        self.timers.start_ns(TimerId::PdelayReq(l), interval_ns);
        self.links[l].req_state = PdelayReqState::SendPdelayReq;
    }

    fn pdelay_waiting_resp(&mut self, l: usize) -> Option<PdelayReqEvent> {
        let link = &mut self.links[l];
        link.req_state = PdelayReqState::WaitingForPdelayResp;
        link.rcvd_resp.is_some().then_some(PdelayReqEvent::RespReceived)
    }

    fn pdelay_waiting_fup(&mut self, l: usize) -> Option<PdelayReqEvent> {
        let link = &mut self.links[l];
        link.accepted_resp = link.rcvd_resp.take();
        link.req_state = PdelayReqState::WaitingForPdelayRespFollowUp;
        link.rcvd_resp_fup.is_some().then_some(PdelayReqEvent::RespFollowUpReceived)
    }

    fn pdelay_reset(&mut self, l: usize) {
        let link = &mut self.links[l];
        link.counters.pdelay_req_sm_reset += 1;
        link.rcvd_resp = None;

        // allowed_lost_responses + 1 resets before the link is declared down
        let exceeded = if link.lost_responses < link.allowed_lost_responses {
            link.lost_responses += 1;
            false
        } else {
            link.counters.pdelay_lost_exceeded += 1;
            link.is_measuring_delay = false;
            link.prev_responder_ts = None;
            link.nrr_valid = false;
            true
        };

        if link.multiple_responses >= MULTIPLE_RESPONSES_MAX {
            tracing::warn!(
                port = link.port,
                "multiple responders on {} successive requests, holding off for {} s",
                MULTIPLE_RESPONSES_MAX,
                MULTIPLE_RESPONSES_HOLD_OFF_MS / 1000
            );
            link.multiple_responses = 0;
            self.timers.start(TimerId::PdelayReq(l), MULTIPLE_RESPONSES_HOLD_OFF_MS);
        }
        self.links[l].req_state = PdelayReqState::Reset;

        if exceeded {
            self.as_capable_across_domains_down(l);
        }
    }

    /// Silent mode: no request is sent, the configured delay is used.
    fn pdelay_silent(&mut self, l: usize) {
        let link = &mut self.links[l];
        link.neighbor_rate_ratio = 1.0;
        link.mean_link_delay = link.static_delay_ns;
        if link.last_indicated_delay != Some(link.mean_link_delay) {
            link.last_indicated_delay = Some(link.mean_link_delay);
            let event = GptpEvent::PdelayChange {
                port: link.port,
                mean_link_delay_ns: link.mean_link_delay,
            };
            self.events.push_back(event);
        }
    }

    /// No response in static mode: fall back to the configured delay.
    fn pdelay_waiting_interval_static(&mut self, l: usize) {
        let link = &mut self.links[l];
        link.rcvd_resp_fup = None;
        link.lost_responses = link.lost_responses.saturating_add(1);
        link.is_measuring_delay = false;
        link.neighbor_rate_ratio = 1.0;
        link.mean_link_delay = link.static_delay_ns;
        tracing::debug!(
            port = link.port,
            "no Pdelay_Resp, static delay {} ns",
            link.static_delay_ns
        );
        link.req_state = PdelayReqState::WaitingForPdelayIntervalTimer;
    }

    fn pdelay_waiting_interval(&mut self, l: usize) {
        let phase_discont = if self.links[l].compute_nrr {
            self.compute_neighbor_rate_ratio(l)
        } else {
            // Restart from scratch once computation resumes.
            self.links[l].prev_responder_ts = None;
            false
        };
        if self.links[l].compute_mld && !phase_discont {
            self.compute_mean_link_delay(l);
        }

        let threshold = self.config.neighbor_prop_delay_threshold_ns;
        let link = &mut self.links[l];
        link.rcvd_resp_fup = None;
        link.lost_responses = 0;
        link.multiple_responses = 0;
        link.is_measuring_delay = true;
        if let Some(resp) = link.accepted_resp {
            link.peer_clock_id = resp.source.clock_identity;
        }

        #[allow(clippy::cast_precision_loss, reason = "threshold is at most 1e7")]
        let threshold = threshold as f64;
        let requester_matches = link.accepted_resp.is_some_and(|r| r.requesting == link.identity);
        let capable = link.mean_link_delay <= threshold && requester_matches && link.nrr_valid;
        link.req_state = PdelayReqState::WaitingForPdelayIntervalTimer;

        if capable {
            self.as_capable_across_domains_up(l);
        } else {
            tracing::debug!(
                port = link.port,
                "link not AS-capable: delay {:.1} ns threshold {} ns ratio valid {}",
                link.mean_link_delay,
                threshold,
                link.nrr_valid
            );
            link.filter.reset();
            self.as_capable_across_domains_down(l);
        }
    }

    /// `(t3 - t3') / (t4 - t4')`. Returns true when a local clock phase
    /// step made the sample unusable.
    fn compute_neighbor_rate_ratio(&mut self, l: usize) -> bool {
        let phase_discont = self.local_clock.phase_discont;
        let max_deviation = self.config.max_rate_ratio_deviation;
        let link = &mut self.links[l];
        let (Some(resp), Some(fup)) = (link.accepted_resp, link.rcvd_resp_fup) else {
            return false;
        };
        let t3 = (fup.response_origin_timestamp.to_scaled().as_signed()
            + ScaledNs::from_correction_field(fup.correction_field))
        .as_unsigned();
        let t4 = resp.timestamp;

        let mut discont = false;
        if let Some(prev_t3) = link.prev_responder_ts {
            if link.prev_ratio_phase_discont == phase_discont {
                if t4 > link.prev_resp_rx_ts && t3 > prev_t3 {
                    #[allow(clippy::cast_precision_loss, reason = "interval between two responses")]
                    let local = (t4 - link.prev_resp_rx_ts) as f64;
                    let mut ratio = (t3 - prev_t3).to_f64() / local;
                    if (1.0 - ratio).abs() > max_deviation {
                        tracing::warn!(
                            port = link.port,
                            "neighbor rate ratio {} out of bound, using 1.0",
                            ratio
                        );
                        ratio = 1.0;
                    }
                    link.neighbor_rate_ratio = ratio;
                    link.nrr_valid = true;
                } else {
                    link.nrr_valid = false;
                }
            } else {
                discont = true;
            }
        }

        link.prev_responder_ts = Some(t3);
        link.prev_resp_rx_ts = t4;
        link.prev_ratio_phase_discont = phase_discont;
        discont
    }

    /// `(r * (t4 - t1) - (t3 - t2)) / 2`, filtered.
    fn compute_mean_link_delay(&mut self, l: usize) {
        if self.links[l].prev_delay_phase_discont != self.local_clock.phase_discont {
            return;
        }
        let indicate = self.config.is_automotive() && self.config.pdelay_mode == PdelayMode::Static;
        let sensitivity = self.config.neighbor_prop_delay_sensitivity_ns;
        let link = &mut self.links[l];
        if !link.nrr_valid {
            return;
        }
        let (Some(t1), Some(resp), Some(fup)) =
            (link.req_tx_ts, link.accepted_resp, link.rcvd_resp_fup)
        else {
            return;
        };
        let t2 = resp.request_receipt_timestamp.to_scaled().as_signed()
            + ScaledNs::from_correction_field(resp.correction_field);
        let t3 = fup.response_origin_timestamp.to_scaled().as_signed()
            + ScaledNs::from_correction_field(fup.correction_field);
        #[allow(clippy::cast_precision_loss, reason = "round trip of one exchange")]
        let local = (i128::from(resp.timestamp) - i128::from(t1)) as f64;
        let remote = (t3 - t2).to_f64();
        let mut raw = (link.neighbor_rate_ratio * local - remote) / 2.0;

        #[allow(clippy::cast_possible_truncation, reason = "float to int casts saturate")]
        let sample = raw as i64;
        link.pdelay_stats.update(sample);

        // Small negative values are timestamp granularity; others are pushed
        // far above any threshold.
        if raw < -MAX_MEASURE_ERROR_NS {
            raw += f64::from(u32::MAX);
        }
        let delay = link.filter.apply(raw).max(0.0);
        link.mean_link_delay = delay;

        if indicate {
            let previous = link.last_indicated_delay.unwrap_or(0.0);
            if (delay - previous).abs() > sensitivity {
                link.last_indicated_delay = Some(delay);
                let event = GptpEvent::PdelayChange {
                    port: link.port,
                    mean_link_delay_ns: delay,
                };
                self.events.push_back(event);
            }
        }
    }

    // ===== Response =====

    pub(crate) fn pdelay_resp_sm(&mut self, l: usize, event: PdelayRespEvent) {
        if !self.link_enabled(l) {
            self.links[l].resp_state = PdelayRespState::NotEnabled;
            return;
        }
        let state = self.links[l].resp_state;
        match state {
            PdelayRespState::NotEnabled => {
                let link = &mut self.links[l];
                link.rcvd_req = None;
                link.resp_state = PdelayRespState::InitialWaitingForPdelayReq;
            }
            PdelayRespState::InitialWaitingForPdelayReq | PdelayRespState::WaitingForPdelayReq => {
                if event == PdelayRespEvent::ReqReceived {
                    self.pdelay_respond(l);
                }
            }
            PdelayRespState::SentPdelayRespWaitingForTimestamp => match event {
                PdelayRespEvent::TimestampReceived => self.pdelay_respond_follow_up(l),
                PdelayRespEvent::ReqReceived => {
                    tracing::debug!(
                        port = self.links[l].port,
                        "pdelay resp: new request before egress timestamp"
                    );
                    self.pdelay_respond(l);
                }
                PdelayRespEvent::Run => {}
            },
        }
        let new_state = self.links[l].resp_state;
        if new_state != state {
            tracing::debug!(
                port = self.links[l].port,
                "pdelay resp: {} {:?} -> {}",
                state,
                event,
                new_state
            );
        }
    }

    fn pdelay_respond(&mut self, l: usize) {
        let link = &mut self.links[l];
        let Some(req) = link.rcvd_req.take() else {
            return;
        };
        let msg = Message::pdelay_resp(
            link.identity,
            req.sequence_id,
            link.cmlds,
            PtpTimestamp::from_u64_ns(req.timestamp),
            req.source,
        );
        let tag = TxTag {
            kind: TxKind::PdelayResp,
            owner: l,
            sequence_id: req.sequence_id,
        };
        link.resp_tx_ts = None;
        link.rcvd_req = Some(req);
        link.resp_state = PdelayRespState::SentPdelayRespWaitingForTimestamp;
        let port = link.port;
        self.transmit(port, &msg, Some(tag));
        self.links[l].counters.tx_pdelay_resp += 1;
    }

    fn pdelay_respond_follow_up(&mut self, l: usize) {
        let link = &mut self.links[l];
        let (Some(req), Some(t3)) = (link.rcvd_req.take(), link.resp_tx_ts.take()) else {
            return;
        };
        let msg = Message::pdelay_resp_follow_up(
            link.identity,
            req.sequence_id,
            link.cmlds,
            PtpTimestamp::from_u64_ns(t3),
            req.source,
        );
        link.resp_state = PdelayRespState::WaitingForPdelayReq;
        let port = link.port;
        self.transmit(port, &msg, None);
        self.links[l].counters.tx_pdelay_resp_follow_up += 1;
    }

    // ===== Link delay interval setting =====

    pub(crate) fn link_interval_sm(&mut self, l: usize, request: Option<IntervalRequestTlv>) {
        if !self.link_enabled(l) {
            self.links[l].interval_state = IntervalState::NotEnabled;
            return;
        }
        match self.links[l].interval_state {
            IntervalState::NotEnabled => {
                let link = &mut self.links[l];
                link.current_log_pdelay_req_interval = link.initial_log_pdelay_req_interval;
                link.pdelay_req_interval_ns = log_to_ns(link.initial_log_pdelay_req_interval);
                link.compute_nrr = true;
                link.compute_mld = true;
                link.interval_state = IntervalState::Initialize;
            }
            IntervalState::Initialize | IntervalState::SetInterval => {
                if let Some(tlv) = request {
                    self.link_interval_set(l, &tlv);
                }
            }
        }
    }

    fn link_interval_set(&mut self, l: usize, tlv: &IntervalRequestTlv) {
        let link = &mut self.links[l];
        match tlv.link_delay_interval {
            INTERVAL_NO_CHANGE => {}
            INTERVAL_RESET_TO_INITIAL => {
                link.current_log_pdelay_req_interval = link.initial_log_pdelay_req_interval;
                link.pdelay_req_interval_ns = log_to_ns(link.initial_log_pdelay_req_interval);
                self.timers.start_ns(TimerId::PdelayReq(l), link.pdelay_req_interval_ns);
            }
            INTERVAL_STOP => {
                link.current_log_pdelay_req_interval = INTERVAL_STOP;
                self.timers.stop(TimerId::PdelayReq(l));
            }
            requested => {
                let log = requested.clamp(LOG_PDELAY_REQ_INTERVAL_MIN, LOG_PDELAY_REQ_INTERVAL_MAX);
                link.current_log_pdelay_req_interval = log;
                link.pdelay_req_interval_ns = log_to_ns(log);
                self.timers.start_ns(TimerId::PdelayReq(l), link.pdelay_req_interval_ns);
            }
        }
        link.compute_nrr = tlv.compute_neighbor_rate_ratio();
        link.compute_mld = tlv.compute_mean_link_delay();
        tracing::info!(
            port = link.port,
            "peer delay interval {} (compute ratio {} delay {})",
            link.current_log_pdelay_req_interval,
            link.compute_nrr,
            link.compute_mld
        );
        link.interval_state = IntervalState::SetInterval;
    }

    /// Move a synchronized slave port's link to the operational interval.
    pub(crate) fn link_use_oper_pdelay_interval(&mut self, l: usize) {
        let link = &mut self.links[l];
        if link.oper_log_pdelay_req_interval != link.initial_log_pdelay_req_interval {
            link.current_log_pdelay_req_interval = link.oper_log_pdelay_req_interval;
            link.pdelay_req_interval_ns = log_to_ns(link.oper_log_pdelay_req_interval);
            tracing::info!(
                port = link.port,
                "operational peer delay interval {} ({} ms)",
                link.oper_log_pdelay_req_interval,
                link.pdelay_req_interval_ns / NS_PER_MS
            );
        }
    }

    // ===== AS-capable across domains =====

    pub(crate) fn as_capable_across_domains_down(&mut self, l: usize) {
        let link = &mut self.links[l];
        if !link.as_capable_across_domains || link.as_capable_static {
            return;
        }
        link.as_capable_across_domains = false;
        link.pdelay_stats.reset();
        tracing::info!(port = link.port, cmlds = link.cmlds, "link not AS-capable across domains");
        for (i, p) in self.ports_on_link(l) {
            self.update_as_capable(i, p);
        }
    }

    pub(crate) fn as_capable_across_domains_up(&mut self, l: usize) {
        let link = &mut self.links[l];
        if link.as_capable_across_domains {
            return;
        }
        link.as_capable_across_domains = true;
        tracing::info!(
            port = link.port,
            cmlds = link.cmlds,
            delay_ns = link.mean_link_delay,
            ratio = link.neighbor_rate_ratio,
            "link AS-capable across domains"
        );
        for (i, p) in self.ports_on_link(l) {
            self.update_as_capable(i, p);
        }
    }
}

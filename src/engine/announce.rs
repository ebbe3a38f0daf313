//! Announce family: PortAnnounceReceive, PortAnnounceInformation and
//! PortAnnounceTransmit.
//!
//! The receiver qualifies an Announce, the information state machine ranks
//! its priority vector against the port's and asks for a new role
//! selection, and the transmitter advertises the master priority vector on
//! master ports. None of them run when the grandmaster is static.

use crate::clock::ClockInterface;
use crate::net::NetworkInterface;
use crate::protocol::bmca::{VectorOrder, compare_message_vector};
use crate::protocol::message::{AnnounceBody, INTERVAL_STOP, MAX_PATH_TRACE_ENTRIES, Message, flags};
use crate::protocol::time::log_to_ns;
use crate::types::PortRole;

use super::TimeAwareSystem;
use super::port::{AnnounceInfoState, AnnounceRcvState, AnnounceTxState, InfoIs, Port, RcvdInfo};
use super::timer::TimerId;

/// Largest steps removed of a qualified Announce.
const STEPS_REMOVED_MAX: u16 = 255;

/// Stimulus of the announce information state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnnounceInfoEvent {
    Run,
    AnnounceTimeout,
    SyncTimeout,
}

/// Stimulus of the announce transmit state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnnounceTxEvent {
    Run,
    TransmitInterval,
}

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    // ===== Receive =====

    pub(crate) fn announce_rcv_sm(&mut self, i: usize, p: usize) {
        if self.instances[i].gm_id_static {
            return;
        }
        let ready = self.port_ready(i, p);
        let instance = &mut self.instances[i];
        let enabled = instance.enabled;
        let domain = instance.domain;
        let port = &mut instance.ports[p];
        let state = port.announce_rcv_state;

        if !enabled || (port.rcvd_announce.is_some() && !ready) {
            port.rcvd_msg = false;
            port.rcvd_announce = None;
            port.announce_rcv_state = AnnounceRcvState::Discard;
            if state != AnnounceRcvState::Discard {
                let next = AnnounceRcvState::Discard;
                tracing::debug!(port = p, domain, "announce rcv: {} -> {}", state, next);
            }
            return;
        }

        let pending = port.rcvd_announce.is_some() && ready;
        let receive = match state {
            AnnounceRcvState::Discard => pending,
            AnnounceRcvState::Receive => pending && !port.rcvd_msg,
        };
        if !receive {
            return;
        }
        if state != AnnounceRcvState::Receive {
            let next = AnnounceRcvState::Receive;
            tracing::debug!(port = p, domain, "announce rcv: {} -> {}", state, next);
        }
        port.announce_rcv_state = AnnounceRcvState::Receive;

        let qualified = self.announce_qualify(i, p);
        let port = &mut self.instances[i].ports[p];
        port.rcvd_msg = qualified;
        if !qualified {
            port.rcvd_announce = None;
        }
        self.announce_info_sm(i, p, AnnounceInfoEvent::Run);
    }

    /// Reject announces that originate here, loop back or travel too far.
    fn announce_qualify(&mut self, i: usize, p: usize) -> bool {
        let instance = &mut self.instances[i];
        let this_clock = instance.this_clock;
        let port = &mut instance.ports[p];
        let Some(rx) = port.rcvd_announce.as_ref() else {
            return false;
        };

        let reason = if rx.vector.source_port_identity.clock_identity == this_clock {
            Some("sent by this system")
        } else if rx.vector.steps_removed >= STEPS_REMOVED_MAX {
            Some("too many steps removed")
        } else if rx.path_trace.contains(&this_clock) {
            Some("path trace contains this system")
        } else {
            None
        };
        if let Some(reason) = reason {
            let domain = instance.domain;
            tracing::debug!(port = p, domain, "announce not qualified: {}", reason);
            port.counters.announce_not_qualified += 1;
            return false;
        }

        if port.role == PortRole::Slave && !rx.path_trace.is_empty() {
            let mut trace: Vec<_> =
                rx.path_trace.iter().take(MAX_PATH_TRACE_ENTRIES - 1).copied().collect();
            trace.push(this_clock);
            instance.path_trace = trace;
        }
        true
    }

    // ===== Information =====

    pub(crate) fn announce_info_sm(&mut self, i: usize, p: usize, event: AnnounceInfoEvent) {
        if self.instances[i].gm_id_static {
            return;
        }
        let ready = self.port_ready(i, p);
        let instance = &self.instances[i];
        if !instance.enabled || (!ready && instance.ports[p].info_is != InfoIs::Disabled) {
            self.announce_info_disabled(i, p);
            return;
        }

        let mut event = event;
        loop {
            let instance = &self.instances[i];
            let gm_present = instance.gm_present;
            let port = &instance.ports[p];
            let state = port.announce_info_state;
            match state {
                AnnounceInfoState::Disabled => {
                    if ready {
                        self.announce_info_aged(i, p);
                    } else if port.rcvd_msg {
                        self.announce_info_disabled(i, p);
                    }
                }
                AnnounceInfoState::Aged => {
                    if port.selected && port.updt_info {
                        self.announce_info_update(i, p);
                    }
                }
                AnnounceInfoState::Current => {
                    let timeout = event == AnnounceInfoEvent::AnnounceTimeout
                        || (event == AnnounceInfoEvent::SyncTimeout && gm_present);
                    if timeout
                        && port.info_is == InfoIs::Received
                        && !port.updt_info
                        && !port.rcvd_msg
                    {
                        self.announce_info_aged(i, p);
                    } else if port.rcvd_msg && !port.updt_info {
                        self.announce_info_receive(i, p);
                    } else if port.selected && port.updt_info {
                        self.announce_info_update(i, p);
                    }
                }
                AnnounceInfoState::Update
                | AnnounceInfoState::Receive
                | AnnounceInfoState::SuperiorMasterPort
                | AnnounceInfoState::RepeatedMasterPort
                | AnnounceInfoState::InferiorMasterOrOtherPort => {
                    self.instances[i].ports[p].announce_info_state = AnnounceInfoState::Current;
                }
            }

            let new_state = self.instances[i].ports[p].announce_info_state;
            if new_state == state {
                return;
            }
            tracing::debug!(
                port = p,
                domain = self.instances[i].domain,
                "announce info: {} {:?} -> {}",
                state,
                event,
                new_state
            );
            event = AnnounceInfoEvent::Run;
        }
    }

    fn announce_info_disabled(&mut self, i: usize, p: usize) {
        self.timers.stop(TimerId::AnnounceReceipt(i, p));
        let port = &mut self.instances[i].ports[p];
        port.rcvd_msg = false;
        port.rcvd_announce = None;
        port.info_is = InfoIs::Disabled;
        port.reselect = true;
        port.selected = false;
        port.announce_info_state = AnnounceInfoState::Disabled;
        self.port_state_selection(i);
    }

    fn announce_info_aged(&mut self, i: usize, p: usize) {
        let port = &mut self.instances[i].ports[p];
        port.info_is = InfoIs::Aged;
        port.reselect = true;
        port.selected = false;
        port.announce_info_state = AnnounceInfoState::Aged;
        self.port_state_selection(i);
    }

    fn announce_info_update(&mut self, i: usize, p: usize) {
        let instance = &mut self.instances[i];
        let steps_removed = instance.master_steps_removed;
        let port = &mut instance.ports[p];
        port.port_priority = port.master_priority;
        port.port_steps_removed = steps_removed;
        port.updt_info = false;
        port.info_is = InfoIs::Mine;
        port.new_info = true;
        port.announce_info_state = AnnounceInfoState::Update;
        self.announce_tx_sm(i, p, AnnounceTxEvent::Run);
    }

    fn announce_info_receive(&mut self, i: usize, p: usize) {
        let instance = &mut self.instances[i];
        let port = &mut instance.ports[p];
        port.announce_info_state = AnnounceInfoState::Receive;
        port.rcvd_msg = false;
        let Some(rx) = port.rcvd_announce.take() else {
            return;
        };

        port.rcvd_info = match compare_message_vector(&rx.vector, &port.port_priority) {
            VectorOrder::ABetter => RcvdInfo::SuperiorMasterInfo,
            VectorOrder::Same => RcvdInfo::RepeatedMasterInfo,
            VectorOrder::BBetter => RcvdInfo::InferiorMasterInfo,
        };
        match port.rcvd_info {
            RcvdInfo::SuperiorMasterInfo => {
                port.port_priority = rx.vector;
                port.port_steps_removed = rx.vector.steps_removed;
                port.message_steps_removed = rx.vector.steps_removed;
                port.ann = rx.props;
                port.announce_receipt_interval_ns = u64::from(port.announce_receipt_timeout)
                    * log_to_ns(rx.log_message_interval);
                port.info_is = InfoIs::Received;
                port.reselect = true;
                port.selected = false;
                port.announce_info_state = AnnounceInfoState::SuperiorMasterPort;
                let interval = port.announce_receipt_interval_ns;
                instance.counters.gm_change += 1;
                self.timers.start_ns(TimerId::AnnounceReceipt(i, p), interval);
                self.port_state_selection(i);
            }
            RcvdInfo::RepeatedMasterInfo => {
                port.announce_info_state = AnnounceInfoState::RepeatedMasterPort;
                let interval = port.announce_receipt_interval_ns;
                self.timers.start_ns(TimerId::AnnounceReceipt(i, p), interval);
            }
            RcvdInfo::InferiorMasterInfo => {
                port.announce_info_state = AnnounceInfoState::InferiorMasterOrOtherPort;
            }
        }
    }

    // ===== Transmit =====

    pub(crate) fn announce_tx_sm(&mut self, i: usize, p: usize, event: AnnounceTxEvent) {
        if self.instances[i].gm_id_static {
            return;
        }
        let enabled = self.instances[i].enabled;
        let port = &mut self.instances[i].ports[p];
        if !enabled {
            port.new_info = true;
            port.announce.slow_down = false;
            port.announce_count = 0;
            port.announce_tx_state = AnnounceTxState::TransmitInit;
            self.timers.stop(TimerId::AnnounceTransmit(i, p));
            return;
        }

        let mut event = event;
        loop {
            let port = &mut self.instances[i].ports[p];
            let state = port.announce_tx_state;
            let master = port.role == PortRole::Master;
            let quiet = port.selected && !port.updt_info;
            match state {
                AnnounceTxState::TransmitInit | AnnounceTxState::TransmitPeriodic => {
                    let interval = port.announce.interval_ns;
                    self.announce_tx_idle(i, p, interval);
                }
                AnnounceTxState::TransmitAnnounce => {
                    let interval = announce_interval(port);
                    self.announce_tx_idle(i, p, interval);
                }
                AnnounceTxState::Idle => {
                    if event == AnnounceTxEvent::TransmitInterval && quiet {
                        port.new_info |= master;
                        port.announce_tx_state = AnnounceTxState::TransmitPeriodic;
                    } else if port.new_info && master && quiet {
                        port.new_info = false;
                        port.announce_tx_state = AnnounceTxState::TransmitAnnounce;
                        self.announce_transmit(i, p);
                    }
                }
            }

            let new_state = self.instances[i].ports[p].announce_tx_state;
            if new_state == state {
                return;
            }
            tracing::debug!(
                port = p,
                domain = self.instances[i].domain,
                "announce tx: {} {:?} -> {}",
                state,
                event,
                new_state
            );
            event = AnnounceTxEvent::Run;
        }
    }

    fn announce_tx_idle(&mut self, i: usize, p: usize, interval_ns: u64) {
        let port = &mut self.instances[i].ports[p];
        port.announce_tx_state = AnnounceTxState::Idle;
        // The interval is unset until the port has been enabled.
        if port.announce.current_log == INTERVAL_STOP || interval_ns == 0 {
            self.timers.stop(TimerId::AnnounceTransmit(i, p));
        } else {
            self.timers.start_ns(TimerId::AnnounceTransmit(i, p), interval_ns);
        }
    }

    fn announce_transmit(&mut self, i: usize, p: usize) {
        let instance = &self.instances[i];
        let port = &instance.ports[p];
        let gm = instance.gm_priority.root_system_identity;
        let props = instance.props;
        let trace_len =
            (usize::from(instance.master_steps_removed) + 1).min(MAX_PATH_TRACE_ENTRIES);
        let body = AnnounceBody {
            current_utc_offset: props.current_utc_offset,
            grandmaster_priority1: gm.priority1,
            grandmaster_clock_quality: gm.clock_quality,
            grandmaster_priority2: gm.priority2,
            grandmaster_identity: gm.clock_identity,
            steps_removed: instance.master_steps_removed,
            time_source: props.time_source,
            path_trace: instance.path_trace.iter().take(trace_len).copied().collect(),
        };
        let mut msg = Message::announce(
            port.identity,
            port.announce_seq,
            instance.domain,
            port.announce.current_log,
            body,
        );
        for (set, flag) in [
            (props.leap61, flags::LEAP_61),
            (props.leap59, flags::LEAP_59),
            (props.current_utc_offset_valid, flags::CURRENT_UTC_OFFSET_VALID),
            (props.time_traceable, flags::TIME_TRACEABLE),
            (props.frequency_traceable, flags::FREQUENCY_TRACEABLE),
        ] {
            if set {
                msg.header.flags |= flag;
            }
        }
        let net_port = port.index;

        self.transmit(net_port, &msg, None);
        let port = &mut self.instances[i].ports[p];
        port.announce_seq = port.announce_seq.wrapping_add(1);
        port.counters.tx_announce += 1;
    }
}

/// Next announce interval, honouring a pending slow down.
fn announce_interval(port: &mut Port) -> u64 {
    if !port.announce.slow_down {
        port.announce_count = 0;
        return port.announce.interval_ns;
    }
    if port.announce_count >= port.announce_receipt_timeout {
        port.announce_count = 0;
        port.announce.slow_down = false;
        port.announce.interval_ns
    } else {
        port.announce_count += 1;
        port.announce.old_interval_ns
    }
}

//! gPTP-capable message transmit and receive.
//!
//! Ports of domains other than 0 are only AS-capable once the neighbor
//! announced itself gPTP-capable in that domain.

use crate::clock::ClockInterface;
use crate::net::NetworkInterface;
use crate::protocol::message::{GptpCapableTlv, INTERVAL_STOP, Message, PortIdentity, SignalingTlv};
use crate::protocol::time::log_to_ns;

use super::TimeAwareSystem;
use super::port::{CapableRcvState, CapableTxState};
use super::timer::TimerId;

/// Stimulus of the gPTP-capable receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CapableRcvEvent {
    Run,
    Tlv(GptpCapableTlv),
    Timeout,
}

/// Stimulus of the gPTP-capable transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CapableTxEvent {
    Run,
    Interval,
}

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    fn capable_enabled(&self, i: usize, p: usize) -> bool {
        let instance = &self.instances[i];
        let port = &instance.ports[p];
        instance.enabled && self.net_ports[port.index].oper && port.ptp_port_enabled
    }

    // ===== Receive =====

    pub(crate) fn capable_rcv_sm(&mut self, i: usize, p: usize, event: CapableRcvEvent) {
        let state = self.instances[i].ports[p].capable_rcv_state;
        if !self.capable_enabled(i, p) {
            self.instances[i].ports[p].capable_rcv_state = CapableRcvState::NotEnabled;
            self.timers.stop(TimerId::GptpCapableReceipt(i, p));
            return;
        }

        match (state, event) {
            (CapableRcvState::NotEnabled, _) => {
                self.instances[i].ports[p].capable_rcv_state = CapableRcvState::Initialize;
                self.neighbor_gptp_capable_down(i, p);
            }
            (_, CapableRcvEvent::Tlv(tlv)) => {
                let port = &mut self.instances[i].ports[p];
                let timeout_ns = u64::from(port.gptp_capable_receipt_timeout)
                    * log_to_ns(tlv.log_gptp_capable_message_interval);
                port.capable_rcv_state = CapableRcvState::ReceivedTlv;
                self.timers.start_ns(TimerId::GptpCapableReceipt(i, p), timeout_ns);
                self.neighbor_gptp_capable_up(i, p);
            }
            (CapableRcvState::ReceivedTlv, CapableRcvEvent::Timeout) => {
                self.instances[i].ports[p].capable_rcv_state = CapableRcvState::Initialize;
                self.neighbor_gptp_capable_down(i, p);
            }
            _ => {}
        }

        let new_state = self.instances[i].ports[p].capable_rcv_state;
        if new_state != state {
            tracing::debug!(
                port = p,
                domain = self.instances[i].domain,
                "gPTP-capable rcv: {} -> {}",
                state,
                new_state
            );
        }
    }

    // ===== Transmit =====

    pub(crate) fn capable_tx_sm(&mut self, i: usize, p: usize, event: CapableTxEvent) {
        if !self.capable_enabled(i, p) {
            self.instances[i].ports[p].capable_tx_state = CapableTxState::NotEnabled;
            self.timers.stop(TimerId::GptpCapableTransmit(i, p));
            return;
        }

        let state = self.instances[i].ports[p].capable_tx_state;
        match state {
            CapableTxState::NotEnabled => {
                let port = &mut self.instances[i].ports[p];
                port.gptp_capable.slow_down = false;
                port.capable_count = 0;
                port.capable_tx_state = CapableTxState::Initialize;
                self.capable_transmit(i, p);
            }
            CapableTxState::Initialize => self.capable_transmit(i, p),
            CapableTxState::TransmitTlv => {
                if event == CapableTxEvent::Interval {
                    self.capable_transmit(i, p);
                }
            }
        }

        let new_state = self.instances[i].ports[p].capable_tx_state;
        if new_state != state {
            tracing::debug!(
                port = p,
                domain = self.instances[i].domain,
                "gPTP-capable tx: {} -> {}",
                state,
                new_state
            );
        }
    }

    fn capable_transmit(&mut self, i: usize, p: usize) {
        let domain = self.instances[i].domain;
        let port = &mut self.instances[i].ports[p];
        let tlv = GptpCapableTlv {
            log_gptp_capable_message_interval: port.gptp_capable.current_log,
            flags: 0,
        };
        let msg = Message::signaling(
            port.identity,
            port.signaling_seq,
            domain,
            PortIdentity::ALL,
            SignalingTlv::GptpCapable(tlv),
        );
        port.signaling_seq = port.signaling_seq.wrapping_add(1);
        port.counters.tx_signaling += 1;

        let setting = &mut port.gptp_capable;
        let interval = if setting.slow_down {
            if port.capable_count >= port.gptp_capable_receipt_timeout {
                port.capable_count = 0;
                setting.slow_down = false;
                setting.interval_ns
            } else {
                port.capable_count += 1;
                setting.old_interval_ns
            }
        } else {
            port.capable_count = 0;
            setting.interval_ns
        };
        port.capable_tx_state = CapableTxState::TransmitTlv;
        let stopped = port.gptp_capable.current_log == INTERVAL_STOP;
        let net_port = port.index;

        if stopped {
            self.timers.stop(TimerId::GptpCapableTransmit(i, p));
        } else {
            self.timers.start_ns(TimerId::GptpCapableTransmit(i, p), interval);
        }
        self.transmit(net_port, &msg, None);
    }
}

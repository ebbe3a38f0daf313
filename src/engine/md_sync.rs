//! Media-dependent sync: MDSyncReceive and MDSyncSend.
//!
//! The receiver pairs a two-step Sync with its Follow_Up and hands the
//! result to the port layer. The sender emits a Sync, waits for its egress
//! timestamp and then sends the Follow_Up carrying the residence time.

use crate::clock::ClockInterface;
use crate::net::{NetworkInterface, TxKind, TxTag};
use crate::protocol::message::{FollowUpTlv, Message};
use crate::protocol::time::{PtpTimestamp, ScaledNs, UScaledNs, log_to_ms};

use super::TimeAwareSystem;
use super::port::{SyncInfo, SyncRcvState, SyncRx, SyncSendState};
use super::timer::TimerId;

/// Received Follow_Up, reduced to what the receiver needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FollowUpRx {
    pub(crate) sequence_id: u16,
    pub(crate) correction_field: i64,
    pub(crate) log_message_interval: i8,
    pub(crate) precise_origin_timestamp: PtpTimestamp,
    pub(crate) tlv: FollowUpTlv,
}

/// Stimulus of the media sync receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SyncRcvEvent {
    Sync(SyncRx),
    FollowUp(FollowUpRx),
    FollowUpTimeout,
}

impl SyncRcvEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Sync(_) => "SYNC",
            Self::FollowUp(_) => "FOLLOW_UP",
            Self::FollowUpTimeout => "FOLLOW_UP_TIMEOUT",
        }
    }
}

/// Stimulus of the media sync sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncSendEvent {
    MdSync,
    TimestampReceived,
}

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    // ===== Receive =====

    pub(crate) fn md_sync_rcv_sm(&mut self, i: usize, p: usize, event: SyncRcvEvent) {
        if !self.instances[i].enabled {
            return;
        }
        let domain = self.instances[i].domain;
        if matches!(event, SyncRcvEvent::Sync(_)) && !self.port_ready(i, p) {
            let port = &mut self.instances[i].ports[p];
            port.counters.md_sync_rcv_sm_reset += 1;
            port.rcvd_sync = None;
            port.sync_rcv_state = SyncRcvState::Discard;
            return;
        }

        let state = self.instances[i].ports[p].sync_rcv_state;
        match (state, event) {
            (SyncRcvState::Discard | SyncRcvState::WaitingForSync, SyncRcvEvent::Sync(sync)) => {
                let port = &mut self.instances[i].ports[p];
                port.rcvd_sync = Some(sync);
                port.upstream_sync_interval = sync.log_message_interval;
                port.sync_rcv_state = SyncRcvState::WaitingForFollowUp;
                self.timers
                    .start(TimerId::FollowUpReceipt(i, p), log_to_ms(sync.log_message_interval));
            }
            (SyncRcvState::WaitingForFollowUp, SyncRcvEvent::Sync(sync)) => {
                // A newer Sync replaces the one still waiting.
                self.instances[i].ports[p].rcvd_sync = Some(sync);
            }
            (SyncRcvState::WaitingForFollowUp, SyncRcvEvent::FollowUp(fup)) => {
                self.timers.stop(TimerId::FollowUpReceipt(i, p));
                let port = &mut self.instances[i].ports[p];
                match port.rcvd_sync {
                    Some(sync) if sync.sequence_id == fup.sequence_id => {
                        port.sync_rcv_state = SyncRcvState::WaitingForSync;
                        let info = self.sync_info_from_follow_up(i, p, &sync, &fup);
                        self.port_sync_rcv_sm(i, p, info);
                    }
                    _ => {
                        port.counters.follow_up_discard += 1;
                        tracing::debug!(
                            port = p,
                            domain,
                            seq = fup.sequence_id,
                            "Follow_Up does not match the pending Sync"
                        );
                        port.rcvd_sync = None;
                        port.sync_rcv_state = SyncRcvState::Discard;
                    }
                }
            }
            (SyncRcvState::WaitingForFollowUp, SyncRcvEvent::FollowUpTimeout) => {
                let port = &mut self.instances[i].ports[p];
                port.rcvd_sync = None;
                port.sync_rcv_state = SyncRcvState::Discard;
            }
            _ => {}
        }

        let new_state = self.instances[i].ports[p].sync_rcv_state;
        if new_state != state {
            tracing::debug!(
                port = p,
                domain,
                "md sync rcv: {} {} -> {}",
                state,
                event.name(),
                new_state
            );
        }
    }

    /// Normalize a matched Sync/Follow_Up pair.
    fn sync_info_from_follow_up(
        &self,
        i: usize,
        p: usize,
        sync: &SyncRx,
        fup: &FollowUpRx,
    ) -> SyncInfo {
        let link = &self.links[self.instances[i].ports[p].link.index()];
        let upstream_delay = ScaledNs::from_f64(link.mean_link_delay / link.neighbor_rate_ratio);
        let upstream_tx_time =
            (UScaledNs::from_ns(sync.timestamp).as_signed() - upstream_delay).as_unsigned();
        SyncInfo {
            local_port_number: 0,
            follow_up_correction: ScaledNs::from_correction_field(fup.correction_field),
            source_port_identity: sync.source,
            log_message_interval: fup.log_message_interval,
            precise_origin_timestamp: fup.precise_origin_timestamp,
            upstream_tx_time,
            rate_ratio: fup.tlv.rate_ratio(),
            gm_time_base_indicator: fup.tlv.gm_time_base_indicator,
            last_gm_phase_change: fup.tlv.last_gm_phase_change,
            last_gm_freq_change: fup.tlv.last_gm_freq_change(),
            sync_receipt_timeout_time: 0,
        }
    }

    // ===== Send =====

    pub(crate) fn md_sync_send_init(&mut self, i: usize, p: usize) {
        let port = &mut self.instances[i].ports[p];
        port.sync_send_state = SyncSendState::Initializing;
        port.sync_seq = rand::random::<u16>();
        port.md_sync_send = None;
        port.sync_tx_ts = None;
    }

    pub(crate) fn md_sync_send_sm(&mut self, i: usize, p: usize, event: SyncSendEvent) {
        if !self.instances[i].enabled || !self.port_ready(i, p) {
            self.md_sync_send_init(i, p);
            return;
        }

        let state = self.instances[i].ports[p].sync_send_state;
        match (state, event) {
            (SyncSendState::SendSync, SyncSendEvent::MdSync) => {
                tracing::debug!(
                    port = p,
                    domain = self.instances[i].domain,
                    "md sync send: no egress timestamp for the previous Sync"
                );
                self.md_sync_transmit_sync(i, p);
            }
            (
                SyncSendState::Initializing | SyncSendState::SendFollowUp,
                SyncSendEvent::MdSync,
            ) => self.md_sync_transmit_sync(i, p),
            (SyncSendState::SendSync, SyncSendEvent::TimestampReceived) => {
                self.md_sync_transmit_follow_up(i, p);
            }
            _ => {}
        }

        let new_state = self.instances[i].ports[p].sync_send_state;
        if new_state != state {
            tracing::debug!(
                port = p,
                domain = self.instances[i].domain,
                "md sync send: {} {:?} -> {}",
                state,
                event,
                new_state
            );
        }
    }

    fn md_sync_transmit_sync(&mut self, i: usize, p: usize) {
        let domain = self.instances[i].domain;
        let port = &mut self.instances[i].ports[p];
        let Some(send) = port.md_sync_send else {
            return;
        };
        let mut msg = Message::sync(send.source_port_identity, port.sync_seq, domain);
        msg.header.log_message_interval = send.log_message_interval;
        let tag = TxTag {
            kind: TxKind::Sync,
            owner: i,
            sequence_id: port.sync_seq,
        };
        port.sync_tx_ts = None;
        port.sync_send_state = SyncSendState::SendSync;
        let net_port = port.index;
        self.transmit(net_port, &msg, Some(tag));
        self.instances[i].ports[p].counters.tx_sync += 1;
    }

    fn md_sync_transmit_follow_up(&mut self, i: usize, p: usize) {
        let domain = self.instances[i].domain;
        let port = &mut self.instances[i].ports[p];
        let (Some(send), Some(egress)) = (port.md_sync_send, port.sync_tx_ts.take()) else {
            return;
        };

        let residence = (UScaledNs::from_ns(egress) - send.upstream_tx_time).as_signed();
        let correction = send.follow_up_correction
            + ScaledNs::from_f64(residence.to_f64() * send.rate_ratio);
        let (correction_field, origin) = if send.local_port_number == 0 {
            // Clock master: fold the correction into the origin timestamp.
            let origin = (send.precise_origin_timestamp.to_scaled().as_signed() + correction)
                .as_unsigned();
            (0, PtpTimestamp::from_scaled(origin))
        } else {
            (correction.to_correction_field(), send.precise_origin_timestamp)
        };

        let mut tlv = FollowUpTlv::with_rate_ratio(send.rate_ratio);
        tlv.gm_time_base_indicator = send.gm_time_base_indicator;
        tlv.last_gm_phase_change = send.last_gm_phase_change;
        tlv.scaled_last_gm_freq_change = FollowUpTlv::scale_freq_change(send.last_gm_freq_change);

        let mut msg =
            Message::follow_up(send.source_port_identity, port.sync_seq, domain, origin, tlv);
        msg.header.correction_field = correction_field;
        msg.header.log_message_interval = send.log_message_interval;

        port.sync_seq = port.sync_seq.wrapping_add(1);
        port.sync_send_state = SyncSendState::SendFollowUp;
        let net_port = port.index;
        self.transmit(net_port, &msg, None);
        self.instances[i].ports[p].counters.tx_follow_up += 1;
    }
}

//! ClockSlaveSync and the automotive link delay sync transmit.
//!
//! The clock slave turns the relayed sync information into a pair of
//! (grandmaster time, target clock time) at the same instant, feeds it to
//! the target clock control loop and reports the synchronization state of
//! the slave port with hysteresis.

use crate::clock::{ClockId, ClockInterface};
use crate::net::NetworkInterface;
use crate::protocol::message::{
    INTERVAL_NO_CHANGE, INTERVAL_RESET_TO_INITIAL, IntervalRequestTlv, Message, SignalingTlv,
};
use crate::protocol::message::tlv::{ITLV_FLAG_COMPUTE_DELAY, ITLV_FLAG_COMPUTE_RATIO};
use crate::protocol::time::{NS_PER_MS, ScaledNs, log_to_ns};

use super::port::{LinkTxState, SyncInfo, SyncState};
use super::timer::TimerId;
use super::{GptpEvent, TimeAwareSystem};

/// 2^41, scale of the cumulative rate offset.
const RATE_OFFSET_SCALE: f64 = 2_199_023_255_552.0;

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    pub(crate) fn clock_slave_sync(&mut self, i: usize, info: &SyncInfo) {
        let Some(p) = usize::from(info.local_port_number).checked_sub(1) else {
            return;
        };
        let link = &self.links[self.instances[i].ports[p].link.index()];
        let (mld, nrr) = (link.mean_link_delay, link.neighbor_rate_ratio);

        // Grandmaster time when the Sync reached this system.
        let sync_receipt_time = (info.precise_origin_timestamp.to_scaled().as_signed()
            + info.follow_up_correction
            + ScaledNs::from_f64(mld * (info.rate_ratio / nrr)))
        .as_unsigned();
        // Local clock time of the same instant, seen by the target clock.
        let receipt_local = info.upstream_tx_time + ScaledNs::from_f64(mld / nrr).as_unsigned();
        let converted =
            self.clock.convert(ClockId::Local, receipt_local.to_u64(), ClockId::Target(i));
        let receipt_target = match converted {
            Ok(ns) => ns,
            Err(e) => {
                let domain = self.instances[i].domain;
                tracing::warn!(port = p, domain, "clock slave: {}", e);
                return;
            }
        };

        let now = self.timers.now();
        let instance = &mut self.instances[i];
        instance.sync_receipt_time = sync_receipt_time;
        instance.sync_receipt_local_time = receipt_local;
        #[allow(clippy::cast_possible_truncation, reason = "float to int casts saturate")]
        let cumulative = ((info.rate_ratio - 1.0) * RATE_OFFSET_SCALE) as i32;
        instance.cumulative_rate_ratio = cumulative;

        if info.gm_time_base_indicator != instance.gm_time_base_indicator {
            instance.gm_time_base_indicator = info.gm_time_base_indicator;
            instance.last_gm_phase_change = info.last_gm_phase_change;
            instance.last_gm_freq_change = info.last_gm_freq_change;
            instance.time_of_last_gm_phase_change = now;
            instance.time_of_last_gm_freq_change = now;
        }

        let gm_identity = instance.gm_priority.root_system_identity.clock_identity;
        if gm_identity != instance.prev_gm_identity {
            instance.prev_gm_identity = gm_identity;
            instance.adjuster.gm_change();
        }

        let srt = sync_receipt_time.to_u64();
        let outcome = instance.adjuster.adjust_on_sync(
            &mut self.clock,
            &mut self.local_clock,
            srt,
            receipt_target,
            info.rate_ratio,
        );
        instance.counters.adjust_on_sync += 1;
        if let Some(step) = outcome.phase_step_ns {
            tracing::info!(port = p, domain = instance.domain, "target clock stepped by {step} ns");
        }

        self.clock_master_sync_offset(i);
        self.clock_slave_sync_state(i, p, srt.abs_diff(receipt_target));
    }

    /// Synchronized / not synchronized indication with hysteresis.
    fn clock_slave_sync_state(&mut self, i: usize, p: usize, offset_ns: u64) {
        let (low, high) = (self.config.sync_thresh_low_ns, self.config.sync_thresh_high_ns);
        let automotive = self.config.is_automotive();
        let now = self.timers.now();
        let instance = &mut self.instances[i];
        let domain = instance.domain;
        let is_grandmaster = instance.is_grandmaster;
        let port = &mut instance.ports[p];
        let previous = port.sync_state;
        let state = if offset_ns <= low {
            SyncState::Synchronized
        } else if offset_ns >= high {
            SyncState::NotSynchronized
        } else {
            previous
        };
        if state == previous {
            return;
        }

        port.sync_state = state;
        if state == SyncState::Synchronized {
            port.sync_time_ns = now;
        } else {
            port.nosync_time_ns = now;
        }
        let sync_time_ms = now / NS_PER_MS;
        if state == SyncState::NotSynchronized && previous != SyncState::Undefined {
            instance.counters.synchro_loss += 1;
        }
        tracing::info!(port = p, domain, offset_ns, "{} -> {}", previous, state);

        if is_grandmaster {
            return;
        }
        self.events.push_back(GptpEvent::SyncState {
            instance: i,
            domain,
            port: p,
            state,
            sync_time_ms,
        });

        if automotive && state == SyncState::Synchronized {
            self.link_delay_sync_transmit(i, p, LinkTxState::Oper);
            let port = &self.instances[i].ports[p];
            let timeout_ns =
                u64::from(port.sync_receipt_timeout) * log_to_ns(port.oper_log_sync_interval);
            let l = port.link.index();
            self.timers.start_ns(TimerId::SyncReceipt(i, p), timeout_ns);
            self.link_use_oper_pdelay_interval(l);
        }
    }

    // ===== Link delay sync transmit =====

    /// Ask the link partner for the initial or operational intervals.
    pub(crate) fn link_delay_sync_transmit(&mut self, i: usize, p: usize, state: LinkTxState) {
        let domain = self.instances[i].domain;
        let port = &mut self.instances[i].ports[p];
        let link = &self.links[port.link.index()];
        let mut tlv = IntervalRequestTlv {
            flags: if port.ratio_is_valid {
                ITLV_FLAG_COMPUTE_RATIO | ITLV_FLAG_COMPUTE_DELAY
            } else {
                0
            },
            ..IntervalRequestTlv::default()
        };
        match state {
            LinkTxState::NotEnabled => {
                port.link_tx_state = LinkTxState::NotEnabled;
                return;
            }
            LinkTxState::Initial => {
                tlv.link_delay_interval = INTERVAL_RESET_TO_INITIAL;
                tlv.time_sync_interval = INTERVAL_RESET_TO_INITIAL;
                tlv.announce_interval = INTERVAL_RESET_TO_INITIAL;
            }
            LinkTxState::Oper => {
                tlv.link_delay_interval = link.oper_log_pdelay_req_interval;
                tlv.time_sync_interval = port.oper_log_sync_interval;
                tlv.announce_interval = INTERVAL_NO_CHANGE;
            }
        }

        let msg = Message::signaling(
            port.identity,
            port.signaling_seq,
            domain,
            port.identity,
            SignalingTlv::IntervalRequest(tlv),
        );
        port.signaling_seq = port.signaling_seq.wrapping_add(1);
        if port.link_tx_state != state {
            tracing::debug!(
                port = p,
                domain,
                "link delay sync transmit: {} -> {}",
                port.link_tx_state,
                state
            );
        }
        port.link_tx_state = state;
        let net_port = port.index;
        self.transmit(net_port, &msg, None);
        self.instances[i].ports[p].counters.tx_signaling += 1;
    }
}

//! Clock master entities.
//!
//! ClockMasterSyncSend injects the local target clock into site sync every
//! clock master sync interval, with port number 0. It only reaches the
//! master ports when this system is the grandmaster. ClockMasterSyncOffset
//! tracks the frequency offset of the grandmaster while this system is not
//! the grandmaster.

use crate::clock::{ClockId, ClockInterface};
use crate::net::NetworkInterface;
use crate::protocol::message::PortIdentity;
use crate::protocol::time::{PtpTimestamp, ScaledNs, UScaledNs, log_to_ms, log_to_ns};
use crate::types::PortRole;

use super::TimeAwareSystem;
use super::port::SyncInfo;
use super::timer::TimerId;

/// Weight of a new sample in the smoothed sync receipt ratio.
const RATIO_SMOOTHING: f64 = 0.1;

/// Receipt timeout multiplier of the clock master info.
const CLOCK_MASTER_SYNC_RECEIPT_TIMEOUT: u64 = 3;

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    /// Latch the target clock and its local clock equivalent.
    fn clock_master_sync_receive(&mut self, i: usize) -> bool {
        let target = ClockId::Target(i);
        let master = self.clock.now(target).and_then(|ns| {
            let local = self.clock.convert(target, ns, ClockId::Local)?;
            Ok((ns, local))
        });
        match master {
            Ok((master_ns, local_ns)) => {
                let instance = &mut self.instances[i];
                instance.gm_rate_ratio = 1.0;
                instance.master_time = UScaledNs::from_ns(master_ns);
                instance.local_time = UScaledNs::from_ns(local_ns);
                true
            }
            Err(e) => {
                tracing::warn!(domain = self.instances[i].domain, "clock master: {}", e);
                false
            }
        }
    }

    pub(crate) fn clock_master_sync_send(&mut self, i: usize) {
        if !self.instances[i].enabled {
            return;
        }
        let log = self.instances[i].clock_master_log_sync_interval;
        self.timers.start(TimerId::ClockMasterSync(i), log_to_ms(log));
        if !self.clock_master_sync_receive(i) {
            return;
        }

        let instance = &self.instances[i];
        let info = SyncInfo {
            local_port_number: 0,
            follow_up_correction: ScaledNs::ZERO,
            source_port_identity: PortIdentity::new(instance.this_clock, 0),
            log_message_interval: log,
            precise_origin_timestamp: PtpTimestamp::from_scaled(instance.master_time),
            upstream_tx_time: instance.local_time,
            rate_ratio: instance.gm_rate_ratio,
            gm_time_base_indicator: instance.clock_source_time_base_indicator,
            last_gm_phase_change: instance.clock_source_phase_offset,
            last_gm_freq_change: instance.clock_source_freq_offset,
            sync_receipt_timeout_time: CLOCK_MASTER_SYNC_RECEIPT_TIMEOUT * log_to_ns(log),
        };
        self.site_sync_sm(i, info);
    }

    /// Smooth the grandmaster to local rate over successive sync receipts.
    pub(crate) fn clock_master_sync_offset(&mut self, i: usize) {
        let instance = &mut self.instances[i];
        if instance.role_of(0) != PortRole::Passive {
            return;
        }
        let (prev, prev_local) =
            (instance.prev_sync_receipt_time, instance.prev_sync_receipt_local_time);
        instance.prev_sync_receipt_time = instance.sync_receipt_time;
        instance.prev_sync_receipt_local_time = instance.sync_receipt_local_time;
        if prev == UScaledNs::ZERO
            || instance.sync_receipt_time <= prev
            || instance.sync_receipt_local_time <= prev_local
        {
            return;
        }
        let dt_gm = (instance.sync_receipt_time - prev).to_f64();
        let dt_local = (instance.sync_receipt_local_time - prev_local).to_f64();

        let ratio = dt_gm / dt_local;
        if instance.freq_offset_init {
            instance.ratio_average =
                RATIO_SMOOTHING * ratio + (1.0 - RATIO_SMOOTHING) * instance.ratio_average;
        } else {
            instance.ratio_average = ratio;
            instance.freq_offset_init = true;
        }
        instance.clock_source_freq_offset = instance.ratio_average - 1.0;
    }
}

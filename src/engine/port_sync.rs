//! Port layer sync: PortSyncSyncReceive and PortSyncSyncSend.

use crate::clock::ClockInterface;
use crate::net::NetworkInterface;
use crate::protocol::time::log_to_ns;
use crate::types::PortRole;

use super::TimeAwareSystem;
use super::md_sync::SyncSendEvent;
use super::port::{PortSyncRcvState, PortSyncSendState, SyncInfo};
use super::timer::TimerId;

/// Stimulus of the port sync sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PortSyncSendEvent {
    Run,
    PsSync,
    Interval,
    PsSyncTimeout,
}

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    // ===== Receive =====

    /// Accumulate the neighbor rate ratio into `info` and relay it to the
    /// site sync entity.
    pub(crate) fn port_sync_rcv_sm(&mut self, i: usize, p: usize, info: SyncInfo) {
        let ready = self.port_ready(i, p);
        let instance = &mut self.instances[i];
        if !instance.enabled || !ready {
            let port = &mut instance.ports[p];
            port.port_sync_rate_ratio = 1.0;
            port.port_sync_rcv_state = PortSyncRcvState::Discard;
            return;
        }
        let gm_id_static = instance.gm_id_static;
        let gm_clock = instance.gm_priority.source_port_identity.clock_identity;

        let port = &mut self.instances[i].ports[p];
        let state = port.port_sync_rcv_state;
        let accept = match state {
            PortSyncRcvState::Discard => true,
            PortSyncRcvState::ReceivedSync => {
                gm_id_static || info.source_port_identity.clock_identity == gm_clock
            }
        };
        if !accept {
            tracing::debug!(
                port = p,
                source = %info.source_port_identity,
                "port sync rcv: sync not from the parent port, ignored"
            );
            return;
        }

        let nrr = self.links[port.link.index()].neighbor_rate_ratio;
        let rate_ratio = info.rate_ratio + (nrr - 1.0);
        let timeout_ns =
            u64::from(port.sync_receipt_timeout) * log_to_ns(info.log_message_interval);
        port.port_sync_rate_ratio = rate_ratio;
        port.port_sync_rcv_state = PortSyncRcvState::ReceivedSync;
        let pssync = SyncInfo {
            local_port_number: port.port_number(),
            rate_ratio,
            sync_receipt_timeout_time: timeout_ns,
            ..info
        };
        self.timers.start_ns(TimerId::SyncReceipt(i, p), timeout_ns);
        if state != PortSyncRcvState::ReceivedSync {
            tracing::debug!(
                port = p,
                domain = self.instances[i].domain,
                "port sync rcv: {} -> {}",
                state,
                PortSyncRcvState::ReceivedSync
            );
        }
        self.site_sync_sm(i, pssync);
    }

    // ===== Send =====

    pub(crate) fn port_sync_send_sm(&mut self, i: usize, p: usize, event: PortSyncSendEvent) {
        let ready = self.port_ready(i, p);
        let enabled = self.instances[i].enabled;
        let port = &mut self.instances[i].ports[p];
        if !enabled || (port.rcvd_pssync && !ready) {
            if port.port_sync_send_state != PortSyncSendState::TransmitInit {
                tracing::debug!(
                    port = p,
                    "port sync send: {} -> {}",
                    port.port_sync_send_state,
                    PortSyncSendState::TransmitInit
                );
            }
            port.rcvd_pssync = false;
            port.sync.slow_down = false;
            port.sync_count = 0;
            port.port_sync_send_state = PortSyncSendState::TransmitInit;
            return;
        }

        loop {
            let instance = &self.instances[i];
            let port = &instance.ports[p];
            let this_port = port.port_number();
            let master = port.role == PortRole::Master;
            let state = port.port_sync_send_state;
            let from_other_port = port
                .pssync
                .is_some_and(|info| info.local_port_number != this_port);

            match state {
                PortSyncSendState::TransmitInit | PortSyncSendState::SyncReceiptTimeout => {
                    if port.rcvd_pssync && from_other_port && ready && master {
                        self.port_sync_send_md_sync(i, p);
                    }
                }
                PortSyncSendState::SendMdSync => {
                    if event == PortSyncSendEvent::PsSyncTimeout && !port.sync_locked {
                        let port = &mut self.instances[i].ports[p];
                        port.rcvd_pssync = false;
                        port.port_sync_send_state = PortSyncSendState::SyncReceiptTimeout;
                    } else {
                        let last_from_other_port = port
                            .last_pssync
                            .is_some_and(|info| info.local_port_number != this_port);
                        let relay = port.rcvd_pssync && port.sync_locked && from_other_port;
                        let free_run = !port.sync_locked
                            && !self.timers.is_running(TimerId::SyncTransmit(i, p))
                            && last_from_other_port;
                        if (relay || free_run) && ready && master {
                            self.port_sync_send_md_sync(i, p);
                        }
                    }
                }
            }

            let new_state = self.instances[i].ports[p].port_sync_send_state;
            if new_state == state {
                return;
            }
            tracing::debug!(
                port = p,
                domain = self.instances[i].domain,
                "port sync send: {} {:?} -> {}",
                state,
                event,
                new_state
            );
        }
    }

    fn port_sync_send_md_sync(&mut self, i: usize, p: usize) {
        let parent_log = self.instances[i].parent_log_sync_interval;
        let port = &mut self.instances[i].ports[p];
        if port.rcvd_pssync {
            port.last_pssync = port.pssync;
            port.sync_locked = parent_log == port.sync.current_log;
            if let Some(info) = port.last_pssync {
                self.timers
                    .start_ns(TimerId::PsSyncReceipt(i, p), info.sync_receipt_timeout_time);
            }
        }
        let port = &mut self.instances[i].ports[p];
        port.rcvd_pssync = false;
        port.md_sync_send = port.last_pssync.map(|info| SyncInfo {
            source_port_identity: port.identity,
            log_message_interval: port.sync.current_log,
            ..info
        });

        self.md_sync_send_sm(i, p, SyncSendEvent::MdSync);

        let port = &mut self.instances[i].ports[p];
        let interval = if port.sync.slow_down {
            if port.sync_count > port.sync_receipt_timeout {
                port.sync_count = 0;
                port.sync.slow_down = false;
                port.sync.interval_ns
            } else {
                port.sync_count += 1;
                port.sync.old_interval_ns
            }
        } else {
            port.sync_count = 0;
            port.sync.interval_ns
        };
        port.port_sync_send_state = PortSyncSendState::SendMdSync;
        self.timers.start_ns(TimerId::SyncTransmit(i, p), interval);
    }
}

//! Sync, announce and gPTP-capable interval setting.
//!
//! All three follow the same machine: a received interval request either
//! leaves the interval alone, resets it to the initial value, stops the
//! transmitter or sets a clamped new value. A longer interval is applied
//! after a slow down period handled by the transmitter.

use crate::clock::ClockInterface;
use crate::net::NetworkInterface;
use crate::protocol::message::{INTERVAL_NO_CHANGE, INTERVAL_RESET_TO_INITIAL, INTERVAL_STOP};
use crate::protocol::time::log_to_ns;
use crate::types::PortRole;

use super::TimeAwareSystem;
use super::port::{IntervalSetting, IntervalState, Port};
use super::timer::TimerId;

/// Interval managed by [`TimeAwareSystem::interval_sm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntervalKind {
    Sync,
    Announce,
    GptpCapable,
}

impl IntervalKind {
    fn name(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Announce => "announce",
            Self::GptpCapable => "gPTP-capable",
        }
    }

    fn setting(self, port: &mut Port) -> &mut IntervalSetting {
        match self {
            Self::Sync => &mut port.sync,
            Self::Announce => &mut port.announce,
            Self::GptpCapable => &mut port.gptp_capable,
        }
    }

    fn timer(self, i: usize, p: usize) -> TimerId {
        match self {
            Self::Sync => TimerId::SyncTransmit(i, p),
            Self::Announce => TimerId::AnnounceTransmit(i, p),
            Self::GptpCapable => TimerId::GptpCapableTransmit(i, p),
        }
    }
}

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    pub(crate) fn sync_interval_sm(&mut self, i: usize, p: usize, request: Option<i8>) {
        // Only domain 0 honours sync interval requests.
        let request = request.filter(|_| self.instances[i].domain == 0);
        self.interval_sm(i, p, IntervalKind::Sync, request);
        let instance = &mut self.instances[i];
        let current = instance.ports[p].sync.current_log;
        if current != INTERVAL_STOP {
            instance.clock_master_log_sync_interval =
                instance.clock_master_log_sync_interval.min(current);
        }
    }

    pub(crate) fn announce_interval_sm(&mut self, i: usize, p: usize, request: Option<i8>) {
        let static_master = self.config.is_automotive()
            && self.instances[i].ports[p].role == PortRole::Master;
        let request = request.filter(|_| !static_master);
        self.interval_sm(i, p, IntervalKind::Announce, request);
    }

    pub(crate) fn capable_interval_sm(&mut self, i: usize, p: usize, request: Option<i8>) {
        self.interval_sm(i, p, IntervalKind::GptpCapable, request);
    }

    fn interval_sm(&mut self, i: usize, p: usize, kind: IntervalKind, request: Option<i8>) {
        let enabled = self.instances[i].enabled;
        let domain = self.instances[i].domain;
        let port = &mut self.instances[i].ports[p];
        let oper = self.net_ports[port.index].oper;
        let ptp_port_enabled = port.ptp_port_enabled;
        let setting = kind.setting(port);

        if !enabled || !oper || !ptp_port_enabled {
            setting.state = IntervalState::NotEnabled;
            return;
        }

        let state = setting.state;
        let timer = kind.timer(i, p);
        match state {
            IntervalState::NotEnabled => {
                setting.current_log = setting.initial_log;
                setting.interval_ns = log_to_ns(setting.initial_log);
                setting.old_interval_ns = setting.interval_ns;
                setting.slow_down = false;
                setting.state = IntervalState::Initialize;
            }
            IntervalState::Initialize | IntervalState::SetInterval => {
                let Some(requested) = request else {
                    return;
                };
                let previous_ns = setting.interval_ns;
                match requested {
                    INTERVAL_NO_CHANGE => {}
                    INTERVAL_RESET_TO_INITIAL => {
                        setting.current_log = setting.initial_log;
                        setting.interval_ns = log_to_ns(setting.initial_log);
                        self.timers.start_ns(timer, setting.interval_ns);
                    }
                    INTERVAL_STOP => {
                        setting.current_log = INTERVAL_STOP;
                        self.timers.stop(timer);
                    }
                    log => {
                        setting.current_log = setting.compute(log);
                        setting.interval_ns = log_to_ns(setting.current_log);
                        self.timers.start_ns(timer, setting.interval_ns);
                    }
                }
                setting.old_interval_ns = previous_ns;
                setting.slow_down = setting.interval_ns > previous_ns;
                setting.state = IntervalState::SetInterval;
                tracing::info!(
                    port = p,
                    domain,
                    "{} interval {} (slow down {})",
                    kind.name(),
                    setting.current_log,
                    setting.slow_down
                );
            }
        }
        if setting.state != state {
            tracing::debug!(
                port = p,
                domain,
                "{} interval: {} -> {}",
                kind.name(),
                state,
                setting.state
            );
        }
    }
}

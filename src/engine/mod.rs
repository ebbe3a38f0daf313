//! The time-aware system: every gPTP state machine of one bridge or end
//! station, driven by frames, egress timestamps, link events and timers.
//!
//! [`TimeAwareSystem`] performs no I/O of its own. The embedding loop feeds
//! it through [`TimeAwareSystem::on_frame`],
//! [`TimeAwareSystem::on_tx_timestamp`], [`TimeAwareSystem::on_link_change`]
//! and [`TimeAwareSystem::poll_timers`], and collects indications with
//! [`TimeAwareSystem::drain_events`].
//!
//! State is split in three layers, addressed by index:
//!
//! - network ports, one per configured port;
//! - links, the peer delay measurement of a network port (one owned by
//!   domain 0 and/or one shared CMLDS record);
//! - instances, one per enabled domain, each with one gPTP port per
//!   network port.

mod announce;
mod capable;
mod clock_master;
mod clock_slave;
mod counters;
mod interval;
mod md_sync;
mod pdelay;
mod port;
mod port_sync;
mod role;
mod rx;
mod site_sync;
mod timer;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;

use crate::clock::{ClockAdjuster, ClockId, ClockInterface, LocalClock, PllState};
use crate::error::{ConfigError, GptpError, Result};
use crate::measure::{Filter, Stats};
use crate::net::{LinkEvent, NetworkInterface, TxTag};
use crate::protocol::bmca::{ClockQuality, PriorityVector, SystemIdentity};
use crate::protocol::message::{ClockIdentity, Message, PortIdentity};
use crate::protocol::time::{ScaledNs, UScaledNs, log_to_ms, log_to_ns};
use crate::types::{DelayMechanism, DomainConfig, GptpConfig, PdelayMode, PortConfig, PortRole};

pub use counters::{InstanceCounters, LinkCounters, NetPortCounters, PortCounters};
pub use port::SyncState;

use announce::{AnnounceInfoEvent, AnnounceTxEvent};
use capable::{CapableRcvEvent, CapableTxEvent};
use md_sync::SyncRcvEvent;
use pdelay::{PdelayReqEvent, PdelayRespEvent};
use port::{
    AnnounceInfoState, AnnounceRcvState, AnnounceTxState, CapableRcvState, CapableTxState,
    InfoIs, Instance, IntervalSetting, IntervalState, Link, LinkRef, LinkTxState,
    PdelayReqState, PdelayRespState, Port, PortSyncRcvState, PortSyncSendState, RcvdInfo,
    SelectionState, SiteSyncState, SyncRcvState, SyncSendState, TimeProperties,
};
use port_sync::PortSyncSendEvent;
use timer::{TimerId, TimerTable};

/// Upper bound on timers handled by one [`TimeAwareSystem::poll_timers`].
const MAX_TIMERS_PER_POLL: usize = 1024;

/// Sync interval range accepted from interval requests.
const SYNC_LOG_INTERVAL_RANGE: (i8, i8) = (-5, 0);
/// Announce interval range accepted from interval requests.
const ANNOUNCE_LOG_INTERVAL_RANGE: (i8, i8) = (0, 3);

const ANNOUNCE_RECEIPT_TIMEOUT: u8 = 3;
const SYNC_RECEIPT_TIMEOUT: u8 = 3;
const GPTP_CAPABLE_RECEIPT_TIMEOUT: u8 = 9;

/// Internal oscillator, the time source of a free-running grandmaster.
const TIME_SOURCE_INTERNAL_OSCILLATOR: u8 = 0xA0;

/// Indication for the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum GptpEvent {
    /// The mean link delay of a port moved by more than the configured
    /// sensitivity (automotive static and silent modes only).
    PdelayChange {
        /// Network port index
        port: usize,
        /// New mean link delay, in ns
        mean_link_delay_ns: f64,
    },
    /// A new grandmaster was elected.
    GmChange {
        /// Instance index
        instance: usize,
        /// Domain number
        domain: u8,
        /// Identity of the grandmaster
        gm_identity: ClockIdentity,
        /// Whether a grandmaster-capable system is present
        gm_present: bool,
        /// Whether this system is the grandmaster
        is_grandmaster: bool,
    },
    /// A slave port crossed a synchronization threshold.
    SyncState {
        /// Instance index
        instance: usize,
        /// Domain number
        domain: u8,
        /// Network port index
        port: usize,
        /// New state
        state: SyncState,
        /// Monotonic time of the change, in ms
        sync_time_ms: u64,
    },
}

/// One physical port.
#[derive(Debug)]
pub(crate) struct NetPort {
    pub(crate) oper: bool,
    pub(crate) rate_mbps: u32,
    pub(crate) rx_comp: i32,
    pub(crate) tx_comp: i32,
    pub(crate) counters: NetPortCounters,
    /// Link owned by domain 0
    pub(crate) domain_link: Option<usize>,
    /// CMLDS link
    pub(crate) cmlds_link: Option<usize>,
}

/// gPTP time-aware system.
///
/// Protocol failures are logged and counted, never returned: every input
/// method is infallible once the system is built.
#[derive(Debug)]
pub struct TimeAwareSystem<C: ClockInterface, N: NetworkInterface> {
    config: GptpConfig,
    clock: C,
    net: N,
    local_clock: LocalClock,
    timers: TimerTable,
    net_ports: Vec<NetPort>,
    links: Vec<Link>,
    instances: Vec<Instance>,
    events: VecDeque<GptpEvent>,
}

fn system_priority(domain: &DomainConfig, this_clock: ClockIdentity) -> PriorityVector {
    PriorityVector {
        root_system_identity: SystemIdentity {
            priority1: if domain.gm_capable { domain.priority1 } else { u8::MAX },
            clock_quality: ClockQuality {
                clock_class: domain.clock_class,
                clock_accuracy: domain.clock_accuracy,
                offset_scaled_log_variance: domain.offset_scaled_log_variance,
            },
            priority2: domain.priority2,
            clock_identity: this_clock,
        },
        steps_removed: 0,
        source_port_identity: PortIdentity::new(this_clock, 0),
        port_number: 0,
    }
}

fn new_link(port: usize, cmlds: bool, config: &GptpConfig, pc: &PortConfig) -> Link {
    let automotive = config.is_automotive();
    let number = u16::try_from(port + 1).unwrap_or(u16::MAX);
    Link {
        port,
        cmlds,
        identity: PortIdentity::new(config.clock_identity, number),
        port_enabled: pc.ptp_port_enabled,
        pdelay_transmit_enabled: !(automotive && config.pdelay_mode == PdelayMode::Silent),
        as_capable_static: automotive,
        static_delay_ns: pc.initial_neighbor_prop_delay_ns,
        allowed_lost_responses: pc.allowed_lost_responses,
        mean_link_delay: if automotive { pc.initial_neighbor_prop_delay_ns } else { 0.0 },
        neighbor_rate_ratio: 1.0,
        nrr_valid: false,
        as_capable_across_domains: false,
        is_measuring_delay: false,
        compute_nrr: true,
        compute_mld: true,
        initial_log_pdelay_req_interval: pc.initial_log_pdelay_req_interval,
        current_log_pdelay_req_interval: pc.initial_log_pdelay_req_interval,
        oper_log_pdelay_req_interval: pc.oper_log_pdelay_req_interval,
        pdelay_req_interval_ns: log_to_ns(pc.initial_log_pdelay_req_interval),
        interval_state: IntervalState::NotEnabled,
        req_state: PdelayReqState::NotEnabled,
        req_seq: 0,
        req_tx_ts: None,
        rcvd_resp: None,
        accepted_resp: None,
        rcvd_resp_fup: None,
        lost_responses: 0,
        multiple_responses: 0,
        prev_responder_ts: None,
        prev_resp_rx_ts: 0,
        prev_ratio_phase_discont: 0,
        prev_delay_phase_discont: 0,
        filter: Filter::new(config.pdelay_filter.clone()),
        last_indicated_delay: None,
        resp_state: PdelayRespState::NotEnabled,
        rcvd_req: None,
        resp_tx_ts: None,
        peer_clock_id: 0,
        pdelay_stats: Stats::new(if cmlds { "cmlds link delay" } else { "link delay" }),
        counters: LinkCounters::default(),
    }
}

fn new_port(
    index: usize,
    link: LinkRef,
    config: &GptpConfig,
    pc: &PortConfig,
    system: &PriorityVector,
) -> Port {
    let number = u16::try_from(index + 1).unwrap_or(u16::MAX);
    let (sync_min, sync_max) = SYNC_LOG_INTERVAL_RANGE;
    let (announce_min, announce_max) = ANNOUNCE_LOG_INTERVAL_RANGE;
    Port {
        index,
        identity: PortIdentity::new(config.clock_identity, number),
        link,
        ptp_port_enabled: pc.ptp_port_enabled,
        as_capable: false,
        neighbor_gptp_capable: false,
        static_role: pc.port_role,
        role: PortRole::Disabled,
        info_is: InfoIs::Disabled,
        port_priority: *system,
        master_priority: *system,
        port_steps_removed: 0,
        message_steps_removed: 0,
        updt_info: false,
        new_info: false,
        reselect: false,
        selected: false,
        rcvd_msg: false,
        rcvd_announce: None,
        rcvd_info: RcvdInfo::InferiorMasterInfo,
        ann: TimeProperties::default(),
        announce_rcv_state: AnnounceRcvState::Discard,
        announce_info_state: AnnounceInfoState::Disabled,
        announce_tx_state: AnnounceTxState::TransmitInit,
        announce_seq: 0,
        announce_count: 0,
        announce_receipt_timeout: ANNOUNCE_RECEIPT_TIMEOUT,
        announce_receipt_interval_ns: 0,
        announce: IntervalSetting::new(
            pc.initial_log_announce_interval,
            announce_min,
            announce_max,
        ),
        sync: IntervalSetting::new(pc.initial_log_sync_interval, sync_min, sync_max),
        oper_log_sync_interval: pc.oper_log_sync_interval,
        sync_receipt_timeout: SYNC_RECEIPT_TIMEOUT,
        sync_rcv_state: SyncRcvState::Discard,
        rcvd_sync: None,
        upstream_sync_interval: pc.initial_log_sync_interval,
        sync_send_state: SyncSendState::Initializing,
        sync_seq: 0,
        md_sync_send: None,
        sync_tx_ts: None,
        port_sync_rcv_state: PortSyncRcvState::Discard,
        port_sync_rate_ratio: 1.0,
        port_sync_send_state: PortSyncSendState::TransmitInit,
        pssync: None,
        rcvd_pssync: false,
        last_pssync: None,
        sync_locked: false,
        sync_count: 0,
        gptp_capable: IntervalSetting::new(
            pc.log_gptp_capable_message_interval,
            config.log_interval_min,
            config.log_interval_max,
        ),
        gptp_capable_receipt_timeout: GPTP_CAPABLE_RECEIPT_TIMEOUT,
        capable_rcv_state: CapableRcvState::NotEnabled,
        capable_tx_state: CapableTxState::NotEnabled,
        capable_count: 0,
        signaling_seq: 0,
        link_tx_state: LinkTxState::NotEnabled,
        ratio_is_valid: true,
        sync_state: SyncState::Undefined,
        sync_time_ns: 0,
        nosync_time_ns: 0,
        counters: PortCounters::default(),
    }
}

impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    /// Build and start a system.
    ///
    /// Every port starts with its link down; report link state with
    /// [`TimeAwareSystem::on_link_change`].
    ///
    /// # Errors
    ///
    /// Returns the first configuration error, or the clock error raised
    /// while reading the monotonic clock.
    pub fn new(config: GptpConfig, clock: C, net: N) -> Result<Self> {
        if let Err(errors) = config.validate() {
            for e in &errors {
                tracing::error!("invalid configuration: {}", e);
            }
            let first = errors.into_iter().next().unwrap_or(ConfigError::InvalidValue {
                name: "config",
                message: "rejected".to_string(),
            });
            return Err(GptpError::Config(first));
        }

        let enabled: Vec<(usize, &DomainConfig)> =
            config.domains.iter().enumerate().filter(|(_, d)| d.is_enabled()).collect();

        let mut net_ports = Vec::with_capacity(config.ports.len());
        let mut links = Vec::new();
        for (p, pc) in config.ports.iter().enumerate() {
            let uses = |mechanism| {
                enabled.iter().any(|&(d, _)| pc.delay_mechanism_for(d) == mechanism)
            };
            let domain_link = uses(DelayMechanism::P2p).then(|| {
                links.push(new_link(p, false, &config, pc));
                links.len() - 1
            });
            let cmlds_link = uses(DelayMechanism::CommonP2p).then(|| {
                links.push(new_link(p, true, &config, pc));
                links.len() - 1
            });
            net_ports.push(NetPort {
                oper: false,
                rate_mbps: 0,
                rx_comp: pc.rx_delay_compensation_ns,
                tx_comp: pc.tx_delay_compensation_ns,
                counters: NetPortCounters::default(),
                domain_link,
                cmlds_link,
            });
        }

        let automotive = config.is_automotive();
        let mut instances = Vec::with_capacity(enabled.len());
        for &(d, dc) in &enabled {
            let i = instances.len();
            let this_clock = config.clock_identity;
            let domain = u8::try_from(dc.domain_number).unwrap_or_default();
            let system = system_priority(dc, this_clock);
            let mut ports = Vec::with_capacity(config.ports.len());
            for (p, pc) in config.ports.iter().enumerate() {
                let np = &net_ports[p];
                let link = match (pc.delay_mechanism_for(d), np.domain_link, np.cmlds_link) {
                    (DelayMechanism::CommonP2p, _, Some(l)) => LinkRef::Cmlds(l),
                    (_, Some(l), _) => LinkRef::Domain(l),
                    (_, None, Some(l)) => LinkRef::Cmlds(l),
                    (_, None, None) => {
                        return Err(GptpError::Config(ConfigError::InvalidValue {
                            name: "delay_mechanism",
                            message: format!("port {p} has no link delay mechanism"),
                        }));
                    }
                };
                ports.push(new_port(p, link, &config, pc, &system));
            }
            let initial_sync = ports.iter().map(|port| port.sync.initial_log).min().unwrap_or(0);
            let adjuster = ClockAdjuster::new(
                ClockId::Target(i),
                i,
                domain,
                clock.adjust_mode(ClockId::Target(i)),
                config.phase_discont_threshold_ns,
            );
            instances.push(Instance {
                domain,
                enabled: true,
                gm_capable: dc.gm_capable,
                gm_id_static: automotive,
                this_clock,
                system_priority: system,
                gm_priority: system,
                last_gm_priority: system,
                path_trace: vec![this_clock],
                gm_present: false,
                is_grandmaster: false,
                master_steps_removed: 0,
                system_role: PortRole::Slave,
                props: TimeProperties::default(),
                sys_props: TimeProperties {
                    time_source: TIME_SOURCE_INTERNAL_OSCILLATOR,
                    ..TimeProperties::default()
                },
                parent_log_sync_interval: initial_sync,
                selection_state: SelectionState::InitBridge,
                selecting: false,
                reselect_pending: false,
                site_sync_state: SiteSyncState::Initializing,
                reported_gm: None,
                clock_master_log_sync_interval: initial_sync,
                gm_rate_ratio: 1.0,
                master_time: UScaledNs::ZERO,
                local_time: UScaledNs::ZERO,
                clock_source_time_base_indicator: 0,
                clock_source_phase_offset: ScaledNs::ZERO,
                clock_source_freq_offset: 0.0,
                freq_offset_init: false,
                ratio_average: 1.0,
                prev_sync_receipt_time: UScaledNs::ZERO,
                prev_sync_receipt_local_time: UScaledNs::ZERO,
                sync_receipt_time: UScaledNs::ZERO,
                sync_receipt_local_time: UScaledNs::ZERO,
                prev_gm_identity: 0,
                gm_time_base_indicator: 0,
                last_gm_phase_change: ScaledNs::ZERO,
                last_gm_freq_change: 0.0,
                time_of_last_gm_phase_change: 0,
                time_of_last_gm_freq_change: 0,
                cumulative_rate_ratio: 0,
                adjuster,
                ports,
                counters: InstanceCounters::default(),
            });
        }

        let mut system = Self {
            config,
            clock,
            net,
            local_clock: LocalClock::new(),
            timers: TimerTable::new(),
            net_ports,
            links,
            instances,
            events: VecDeque::new(),
        };
        system.begin()?;
        Ok(system)
    }

    fn begin(&mut self) -> Result<()> {
        let now = self.clock.now(ClockId::Monotonic)?;
        self.timers.set_now(now);
        tracing::info!(
            clock_identity = %format_args!("{:016x}", self.config.clock_identity),
            ports = self.net_ports.len(),
            links = self.links.len(),
            instances = self.instances.len(),
            profile = ?self.config.profile,
            "gPTP started"
        );

        for i in 0..self.instances.len() {
            let instance = &mut self.instances[i];
            instance.adjuster.init(&mut self.clock, &mut self.local_clock);
            if instance.gm_id_static {
                self.static_port_roles(i);
            } else {
                self.port_state_selection_init(i);
                self.port_state_selection(i);
            }
            for p in 0..self.instances[i].ports.len() {
                self.md_sync_send_init(i, p);
            }
            let log = self.instances[i].clock_master_log_sync_interval;
            self.timers.start(TimerId::ClockMasterSync(i), log_to_ms(log));
        }

        if self.config.is_automotive() {
            for l in 0..self.links.len() {
                if !self.links[l].cmlds {
                    self.as_capable_across_domains_up(l);
                }
            }
        }
        if self.config.stats_interval_s > 0 {
            self.timers.start(TimerId::Stats, u64::from(self.config.stats_interval_s) * 1000);
        }
        for n in 0..self.net_ports.len() {
            self.port_update(n);
        }
        Ok(())
    }

    // ===== Inputs =====

    /// Report a link state change.
    pub fn on_link_change(&mut self, event: LinkEvent) {
        let Some(net_port) = self.net_ports.get_mut(event.port) else {
            tracing::warn!(port = event.port, "link event on unknown port dropped");
            return;
        };
        if net_port.oper == event.up && net_port.rate_mbps == event.rate_mbps {
            return;
        }
        net_port.oper = event.up;
        net_port.rate_mbps = event.rate_mbps;
        if event.up {
            tracing::info!(port = event.port, rate_mbps = event.rate_mbps, "link up");
        } else {
            tracing::info!(port = event.port, "link down");
        }
        self.latch_now();
        self.port_update(event.port);
    }

    /// Run every state machine of network port `n` after a port change.
    fn port_update(&mut self, n: usize) {
        let oper = self.net_ports[n].oper;
        let links = [self.net_ports[n].domain_link, self.net_ports[n].cmlds_link];
        for l in links.into_iter().flatten() {
            if !oper {
                self.as_capable_across_domains_down(l);
            }
            self.link_interval_sm(l, None);
            self.pdelay_req_sm(l, PdelayReqEvent::Run);
            self.pdelay_resp_sm(l, PdelayRespEvent::Run);
        }

        for i in 0..self.instances.len() {
            let p = n;
            self.update_as_capable(i, p);
            self.sync_interval_sm(i, p, None);
            self.announce_interval_sm(i, p, None);
            self.capable_interval_sm(i, p, None);
            self.announce_info_sm(i, p, AnnounceInfoEvent::Run);
            self.announce_rcv_sm(i, p);
            self.announce_tx_sm(i, p, AnnounceTxEvent::Run);
            self.capable_rcv_sm(i, p, CapableRcvEvent::Run);
            self.capable_tx_sm(i, p, CapableTxEvent::Run);
            if !self.port_ready(i, p) {
                self.md_sync_rcv_reset(i, p);
                self.md_sync_send_init(i, p);
            }
            self.port_sync_send_sm(i, p, PortSyncSendEvent::Run);
        }
    }

    fn md_sync_rcv_reset(&mut self, i: usize, p: usize) {
        self.timers.stop(TimerId::FollowUpReceipt(i, p));
        self.timers.stop(TimerId::SyncReceipt(i, p));
        let port = &mut self.instances[i].ports[p];
        port.rcvd_sync = None;
        port.sync_rcv_state = SyncRcvState::Discard;
        port.port_sync_rcv_state = PortSyncRcvState::Discard;
        port.port_sync_rate_ratio = 1.0;
    }

    fn latch_now(&mut self) {
        match self.clock.now(ClockId::Monotonic) {
            Ok(now) => self.timers.set_now(now),
            Err(e) => tracing::warn!("monotonic clock: {}", e),
        }
    }

    /// Earliest timer deadline, in monotonic ns.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    /// Fire every expired timer.
    pub fn poll_timers(&mut self) {
        self.latch_now();
        for _ in 0..MAX_TIMERS_PER_POLL {
            let Some(id) = self.timers.pop_expired() else {
                return;
            };
            self.on_timer(id);
        }
        tracing::warn!("timer storm: deferring expired timers to the next poll");
    }

    fn on_timer(&mut self, id: TimerId) {
        match id {
            TimerId::PdelayReq(l) => self.pdelay_req_sm(l, PdelayReqEvent::ReqInterval),
            TimerId::FollowUpReceipt(i, p) => {
                self.instances[i].ports[p].counters.follow_up_receipt_timeout += 1;
                self.md_sync_rcv_sm(i, p, SyncRcvEvent::FollowUpTimeout);
            }
            TimerId::SyncReceipt(i, p) => {
                let port = &mut self.instances[i].ports[p];
                port.counters.sync_receipt_timeout += 1;
                port.port_sync_rcv_state = PortSyncRcvState::Discard;
                let domain = self.instances[i].domain;
                tracing::debug!(port = p, domain, "sync receipt timeout");
                self.announce_info_sm(i, p, AnnounceInfoEvent::SyncTimeout);
            }
            TimerId::AnnounceReceipt(i, p) => {
                self.instances[i].ports[p].counters.announce_receipt_timeout += 1;
                self.announce_info_sm(i, p, AnnounceInfoEvent::AnnounceTimeout);
            }
            TimerId::AnnounceTransmit(i, p) => {
                self.announce_tx_sm(i, p, AnnounceTxEvent::TransmitInterval);
            }
            TimerId::SyncTransmit(i, p) => {
                self.port_sync_send_sm(i, p, PortSyncSendEvent::Interval);
            }
            TimerId::PsSyncReceipt(i, p) => {
                self.port_sync_send_sm(i, p, PortSyncSendEvent::PsSyncTimeout);
            }
            TimerId::GptpCapableTransmit(i, p) => {
                self.capable_tx_sm(i, p, CapableTxEvent::Interval);
            }
            TimerId::GptpCapableReceipt(i, p) => {
                self.capable_rcv_sm(i, p, CapableRcvEvent::Timeout);
            }
            TimerId::ClockMasterSync(i) => self.clock_master_sync_send(i),
            TimerId::Stats => {
                self.dump_stats();
                let ms = u64::from(self.config.stats_interval_s) * 1000;
                self.timers.start(TimerId::Stats, ms);
            }
        }
    }

    /// Take the queued indications.
    pub fn drain_events(&mut self) -> Vec<GptpEvent> {
        self.events.drain(..).collect()
    }

    /// Log and reset the link delay and clock control statistics.
    pub fn dump_stats(&mut self) {
        for link in &mut self.links {
            tracing::info!(port = link.port, cmlds = link.cmlds, "link statistics");
            link.pdelay_stats.dump();
        }
        for instance in &mut self.instances {
            instance.adjuster.dump_stats();
        }
    }

    // ===== Shared helpers =====

    /// Encode and send `msg`, logging transport failures.
    pub(crate) fn transmit(&mut self, port: usize, msg: &Message, tag: Option<TxTag>) {
        if !self.net_ports[port].oper {
            tracing::debug!(port, "link down, {} not sent", msg.header.message_type);
            return;
        }
        if tag.is_some() {
            self.net_ports[port].counters.tx_timestamp_requests += 1;
        }
        if let Err(e) = self.net.send(port, msg.encode(), tag) {
            tracing::warn!(port, "{} transmit failed: {}", msg.header.message_type, e);
        }
    }

    /// Every `(instance, port)` measuring its link delay on link `l`.
    pub(crate) fn ports_on_link(&self, l: usize) -> Vec<(usize, usize)> {
        self.instances
            .iter()
            .enumerate()
            .flat_map(|(i, instance)| {
                instance
                    .ports
                    .iter()
                    .enumerate()
                    .filter(move |(_, port)| port.link.index() == l)
                    .map(move |(p, _)| (i, p))
            })
            .collect()
    }

    pub(crate) fn port_ready(&self, i: usize, p: usize) -> bool {
        let port = &self.instances[i].ports[p];
        self.net_ports[port.index].oper && port.ptp_port_enabled && port.as_capable
    }

    /// Recompute asCapable of one port from its link and neighbor state.
    pub(crate) fn update_as_capable(&mut self, i: usize, p: usize) {
        let instance = &self.instances[i];
        let port = &instance.ports[p];
        let link = &self.links[port.link.index()];
        let as_capable = self.net_ports[port.index].oper
            && port.ptp_port_enabled
            && link.as_capable_across_domains
            && (port.neighbor_gptp_capable || instance.domain == 0);
        if as_capable == port.as_capable {
            return;
        }

        let domain = instance.domain;
        let port = &mut self.instances[i].ports[p];
        port.as_capable = as_capable;
        if as_capable {
            tracing::info!(port = p, domain, "AS-capable");
        } else {
            port.counters.not_as_capable += 1;
            tracing::info!(port = p, domain, "not AS-capable");
        }

        if self.config.is_automotive() && port.role == PortRole::Slave {
            if !as_capable {
                self.link_delay_sync_transmit(i, p, LinkTxState::NotEnabled);
            } else if port.link_tx_state == LinkTxState::NotEnabled {
                self.link_delay_sync_transmit(i, p, LinkTxState::Initial);
            }
        }
        self.announce_info_sm(i, p, AnnounceInfoEvent::Run);
        self.announce_rcv_sm(i, p);
    }

    pub(crate) fn neighbor_gptp_capable_up(&mut self, i: usize, p: usize) {
        let port = &mut self.instances[i].ports[p];
        if !port.neighbor_gptp_capable {
            port.neighbor_gptp_capable = true;
            tracing::debug!(port = p, domain = self.instances[i].domain, "neighbor gPTP-capable");
        }
        self.update_as_capable(i, p);
    }

    pub(crate) fn neighbor_gptp_capable_down(&mut self, i: usize, p: usize) {
        let port = &mut self.instances[i].ports[p];
        if port.neighbor_gptp_capable {
            port.neighbor_gptp_capable = false;
            let domain = self.instances[i].domain;
            tracing::debug!(port = p, domain, "neighbor not gPTP-capable");
        }
        self.update_as_capable(i, p);
    }

    // ===== Accessors =====

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &GptpConfig {
        &self.config
    }

    /// Clock collaborator.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mutable clock collaborator.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Network collaborator.
    #[must_use]
    pub fn net(&self) -> &N {
        &self.net
    }

    /// Mutable network collaborator.
    pub fn net_mut(&mut self) -> &mut N {
        &mut self.net
    }

    /// Number of running instances (enabled domains).
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Domain number of instance `i`.
    #[must_use]
    pub fn domain(&self, i: usize) -> Option<u8> {
        self.instances.get(i).map(|instance| instance.domain)
    }

    /// Selected role of network port `port` in instance `i`.
    #[must_use]
    pub fn port_role(&self, i: usize, port: usize) -> Option<PortRole> {
        self.port(i, port).map(|port| port.role)
    }

    /// Whether this system is the grandmaster of instance `i`.
    #[must_use]
    pub fn is_grandmaster(&self, i: usize) -> bool {
        self.instances.get(i).is_some_and(|instance| instance.is_grandmaster)
    }

    /// Whether instance `i` has a grandmaster-capable system.
    #[must_use]
    pub fn gm_present(&self, i: usize) -> bool {
        self.instances.get(i).is_some_and(|instance| instance.gm_present)
    }

    /// Identity of the grandmaster of instance `i`, if one is present.
    #[must_use]
    pub fn grandmaster_identity(&self, i: usize) -> Option<ClockIdentity> {
        self.instances
            .get(i)
            .filter(|instance| instance.gm_present)
            .map(|instance| instance.gm_priority.root_system_identity.clock_identity)
    }

    /// Whether network port `port` is AS-capable in instance `i`.
    #[must_use]
    pub fn as_capable(&self, i: usize, port: usize) -> bool {
        self.port(i, port).is_some_and(|port| port.as_capable)
    }

    /// Mean link delay of network port `port`, in ns.
    #[must_use]
    pub fn mean_link_delay(&self, port: usize) -> Option<f64> {
        self.link_of(port).map(|link| link.mean_link_delay)
    }

    /// Neighbor rate ratio of network port `port`.
    #[must_use]
    pub fn neighbor_rate_ratio(&self, port: usize) -> Option<f64> {
        self.link_of(port).map(|link| link.neighbor_rate_ratio)
    }

    /// Target clock control loop state of instance `i`.
    #[must_use]
    pub fn pll_state(&self, i: usize) -> Option<PllState> {
        self.instances.get(i).map(|instance| instance.adjuster.state())
    }

    /// Synchronization state of network port `port` in instance `i`.
    #[must_use]
    pub fn sync_state(&self, i: usize, port: usize) -> Option<SyncState> {
        self.port(i, port).map(|port| port.sync_state)
    }

    /// Counters of network port `port` in instance `i`.
    #[must_use]
    pub fn port_counters(&self, i: usize, port: usize) -> Option<&PortCounters> {
        self.port(i, port).map(|port| &port.counters)
    }

    /// Peer delay counters of network port `port`.
    #[must_use]
    pub fn link_counters(&self, port: usize) -> Option<&LinkCounters> {
        self.link_of(port).map(|link| &link.counters)
    }

    /// Counters of instance `i`.
    #[must_use]
    pub fn instance_counters(&self, i: usize) -> Option<&InstanceCounters> {
        self.instances.get(i).map(|instance| &instance.counters)
    }

    /// Receive counters of network port `port`.
    #[must_use]
    pub fn net_port_counters(&self, port: usize) -> Option<&NetPortCounters> {
        self.net_ports.get(port).map(|net_port| &net_port.counters)
    }

    fn port(&self, i: usize, port: usize) -> Option<&Port> {
        self.instances.get(i).and_then(|instance| instance.ports.get(port))
    }

    /// Domain-owned link of a port, or its CMLDS link.
    fn link_of(&self, port: usize) -> Option<&Link> {
        let net_port = self.net_ports.get(port)?;
        net_port.domain_link.or(net_port.cmlds_link).map(|l| &self.links[l])
    }
}

#[cfg(test)]
impl<C: ClockInterface, N: NetworkInterface> TimeAwareSystem<C, N> {
    pub(crate) fn link_tx_state(&self, i: usize, p: usize) -> Option<LinkTxState> {
        self.port(i, p).map(|port| port.link_tx_state)
    }

    pub(crate) fn sync_log_interval(&self, i: usize, p: usize) -> Option<i8> {
        self.port(i, p).map(|port| port.sync.current_log)
    }

    pub(crate) fn pdelay_interval_log(&self, port: usize) -> Option<i8> {
        self.link_of(port).map(|link| link.current_log_pdelay_req_interval)
    }
}

//! Per-link, per-port and per-instance state.
//!
//! Everything here is plain data. Transitions live in the state machine
//! modules and address these records by index.

use std::fmt;

use crate::clock::ClockAdjuster;
use crate::measure::{Filter, Stats};
use crate::protocol::bmca::PriorityVector;
use crate::protocol::message::{ClockIdentity, PortIdentity};
use crate::protocol::time::{PtpTimestamp, ScaledNs, UScaledNs};
use crate::types::PortRole;

use super::counters::{InstanceCounters, LinkCounters, PortCounters};

/// Reference from an instance port to the link carrying its delay
/// measurement, resolved once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkRef {
    /// Peer delay owned by domain 0 on this port
    Domain(usize),
    /// Shared Common Mean Link Delay Service record
    Cmlds(usize),
}

impl LinkRef {
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Domain(i) | Self::Cmlds(i) => i,
        }
    }
}

macro_rules! state_names {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub(crate) enum $name {
            $($variant),+
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self {
                    $(Self::$variant => $text),+
                })
            }
        }
    };
}

state_names!(PdelayReqState {
    NotEnabled => "NOT_ENABLED",
    InitialSendPdelayReq => "INITIAL_SEND_PDELAY_REQ",
    SendPdelayReq => "SEND_PDELAY_REQ",
    WaitingForPdelayResp => "WAITING_FOR_PDELAY_RESP",
    WaitingForPdelayRespFollowUp => "WAITING_FOR_PDELAY_RESP_FOLLOW_UP",
    WaitingForPdelayIntervalTimer => "WAITING_FOR_PDELAY_INTERVAL_TIMER",
    Reset => "RESET",
});

state_names!(PdelayRespState {
    NotEnabled => "NOT_ENABLED",
    InitialWaitingForPdelayReq => "INITIAL_WAITING_FOR_PDELAY_REQ",
    WaitingForPdelayReq => "WAITING_FOR_PDELAY_REQ",
    SentPdelayRespWaitingForTimestamp => "SENT_PDELAY_RESP_WAITING_FOR_TIMESTAMP",
});

state_names!(IntervalState {
    NotEnabled => "NOT_ENABLED",
    Initialize => "INITIALIZE",
    SetInterval => "SET_INTERVAL",
});

state_names!(SyncRcvState {
    Discard => "DISCARD",
    WaitingForFollowUp => "WAITING_FOR_FOLLOW_UP",
    WaitingForSync => "WAITING_FOR_SYNC",
});

state_names!(SyncSendState {
    Initializing => "INITIALIZING",
    SendSync => "SEND_SYNC",
    SendFollowUp => "SEND_FOLLOW_UP",
});

state_names!(PortSyncRcvState {
    Discard => "DISCARD",
    ReceivedSync => "RECEIVED_SYNC",
});

state_names!(PortSyncSendState {
    TransmitInit => "TRANSMIT_INIT",
    SendMdSync => "SEND_MD_SYNC",
    SyncReceiptTimeout => "SYNC_RECEIPT_TIMEOUT",
});

state_names!(AnnounceRcvState {
    Discard => "DISCARD",
    Receive => "RECEIVE",
});

state_names!(AnnounceInfoState {
    Disabled => "DISABLED",
    Aged => "AGED",
    Update => "UPDATE",
    Current => "CURRENT",
    Receive => "RECEIVE",
    SuperiorMasterPort => "SUPERIOR_MASTER_PORT",
    RepeatedMasterPort => "REPEATED_MASTER_PORT",
    InferiorMasterOrOtherPort => "INFERIOR_MASTER_OR_OTHER_PORT",
});

state_names!(AnnounceTxState {
    TransmitInit => "TRANSMIT_INIT",
    Idle => "IDLE",
    TransmitPeriodic => "TRANSMIT_PERIODIC",
    TransmitAnnounce => "TRANSMIT_ANNOUNCE",
});

state_names!(CapableRcvState {
    NotEnabled => "NOT_ENABLED",
    Initialize => "INITIALIZE",
    ReceivedTlv => "RECEIVED_TLV",
});

state_names!(CapableTxState {
    NotEnabled => "NOT_ENABLED",
    Initialize => "INITIALIZE",
    TransmitTlv => "TRANSMIT_TLV",
});

state_names!(LinkTxState {
    NotEnabled => "NOT_ENABLED",
    Initial => "INITIAL",
    Oper => "OPER",
});

state_names!(SelectionState {
    InitBridge => "INIT_BRIDGE",
    Selection => "SELECTION",
});

state_names!(SiteSyncState {
    Initializing => "INITIALIZING",
    ReceivingSync => "RECEIVING_SYNC",
});

/// Origin of a port's priority vector (spanning tree `infoIs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InfoIs {
    Received,
    Mine,
    Aged,
    Disabled,
}

/// Outcome of ranking a received announce against the port vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RcvdInfo {
    SuperiorMasterInfo,
    RepeatedMasterInfo,
    InferiorMasterInfo,
}

/// Synchronization state reported by a slave port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No sync received yet
    #[default]
    Undefined,
    /// Offset to the grandmaster below the low threshold
    Synchronized,
    /// Offset to the grandmaster above the high threshold
    NotSynchronized,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Undefined => "UNDEFINED",
            Self::Synchronized => "SYNCHRONIZED",
            Self::NotSynchronized => "NOT_SYNCHRONIZED",
        })
    }
}

/// Announce-derived time properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct TimeProperties {
    pub(crate) leap61: bool,
    pub(crate) leap59: bool,
    pub(crate) current_utc_offset_valid: bool,
    pub(crate) time_traceable: bool,
    pub(crate) frequency_traceable: bool,
    pub(crate) current_utc_offset: i16,
    pub(crate) time_source: u8,
}

/// Time-synchronization information relayed between the sync layers
/// (MDSyncReceive, PortSyncSync and MDSyncSend share this shape).
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SyncInfo {
    /// Port the info arrived on, 0 when it comes from the clock master
    pub(crate) local_port_number: u16,
    pub(crate) follow_up_correction: ScaledNs,
    pub(crate) source_port_identity: PortIdentity,
    pub(crate) log_message_interval: i8,
    pub(crate) precise_origin_timestamp: PtpTimestamp,
    /// Local clock time the info left the upstream system
    pub(crate) upstream_tx_time: UScaledNs,
    /// Cumulative grandmaster to local frequency ratio
    pub(crate) rate_ratio: f64,
    pub(crate) gm_time_base_indicator: u16,
    pub(crate) last_gm_phase_change: ScaledNs,
    pub(crate) last_gm_freq_change: f64,
    /// Validity of the info after receipt, in ns
    pub(crate) sync_receipt_timeout_time: u64,
}

/// Received Sync awaiting its Follow_Up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SyncRx {
    pub(crate) sequence_id: u16,
    pub(crate) source: PortIdentity,
    pub(crate) log_message_interval: i8,
    pub(crate) correction_field: i64,
    pub(crate) timestamp: u64,
}

/// Received Announce, kept until the receive state machine consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AnnounceRx {
    pub(crate) vector: PriorityVector,
    pub(crate) props: TimeProperties,
    pub(crate) log_message_interval: i8,
    pub(crate) path_trace: Vec<ClockIdentity>,
}

/// Received `Pdelay_Req`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PdelayReqRx {
    pub(crate) sequence_id: u16,
    pub(crate) source: PortIdentity,
    pub(crate) correction_field: i64,
    pub(crate) timestamp: u64,
}

/// Received `Pdelay_Resp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PdelayRespRx {
    pub(crate) sequence_id: u16,
    pub(crate) source: PortIdentity,
    pub(crate) requesting: PortIdentity,
    pub(crate) correction_field: i64,
    pub(crate) request_receipt_timestamp: PtpTimestamp,
    pub(crate) timestamp: u64,
}

/// Received `Pdelay_Resp_Follow_Up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PdelayRespFupRx {
    pub(crate) sequence_id: u16,
    pub(crate) source: PortIdentity,
    pub(crate) requesting: PortIdentity,
    pub(crate) correction_field: i64,
    pub(crate) response_origin_timestamp: PtpTimestamp,
}

/// Interval-setting bookkeeping shared by the sync, announce and
/// gPTP-capable interval state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IntervalSetting {
    pub(crate) state: IntervalState,
    pub(crate) initial_log: i8,
    pub(crate) current_log: i8,
    pub(crate) interval_ns: u64,
    pub(crate) old_interval_ns: u64,
    pub(crate) slow_down: bool,
    pub(crate) closest_longer_log: i8,
    pub(crate) max_log: i8,
}

impl IntervalSetting {
    pub(crate) fn new(initial_log: i8, closest_longer_log: i8, max_log: i8) -> Self {
        Self {
            state: IntervalState::NotEnabled,
            initial_log,
            current_log: initial_log,
            interval_ns: 0,
            old_interval_ns: 0,
            slow_down: false,
            closest_longer_log,
            max_log,
        }
    }

    /// Clamp a requested log interval to the supported range.
    pub(crate) fn compute(&self, requested: i8) -> i8 {
        requested.clamp(self.closest_longer_log, self.max_log)
    }
}

/// Peer delay measurement on one physical port.
#[derive(Debug)]
pub(crate) struct Link {
    /// Network port index
    pub(crate) port: usize,
    pub(crate) cmlds: bool,
    pub(crate) identity: PortIdentity,
    pub(crate) port_enabled: bool,
    pub(crate) pdelay_transmit_enabled: bool,
    pub(crate) as_capable_static: bool,
    pub(crate) static_delay_ns: f64,
    pub(crate) allowed_lost_responses: u16,

    pub(crate) mean_link_delay: f64,
    pub(crate) neighbor_rate_ratio: f64,
    pub(crate) nrr_valid: bool,
    pub(crate) as_capable_across_domains: bool,
    pub(crate) is_measuring_delay: bool,
    pub(crate) compute_nrr: bool,
    pub(crate) compute_mld: bool,
    pub(crate) initial_log_pdelay_req_interval: i8,
    pub(crate) current_log_pdelay_req_interval: i8,
    pub(crate) oper_log_pdelay_req_interval: i8,
    pub(crate) pdelay_req_interval_ns: u64,
    pub(crate) interval_state: IntervalState,

    pub(crate) req_state: PdelayReqState,
    pub(crate) req_seq: u16,
    pub(crate) req_tx_ts: Option<u64>,
    pub(crate) rcvd_resp: Option<PdelayRespRx>,
    /// Response matched to the outstanding request
    pub(crate) accepted_resp: Option<PdelayRespRx>,
    pub(crate) rcvd_resp_fup: Option<PdelayRespFupRx>,
    pub(crate) lost_responses: u16,
    pub(crate) multiple_responses: u16,
    pub(crate) prev_responder_ts: Option<UScaledNs>,
    pub(crate) prev_resp_rx_ts: u64,
    pub(crate) prev_ratio_phase_discont: u32,
    pub(crate) prev_delay_phase_discont: u32,
    pub(crate) filter: Filter,
    pub(crate) last_indicated_delay: Option<f64>,

    pub(crate) resp_state: PdelayRespState,
    pub(crate) rcvd_req: Option<PdelayReqRx>,
    pub(crate) resp_tx_ts: Option<u64>,

    pub(crate) peer_clock_id: ClockIdentity,
    pub(crate) pdelay_stats: Stats,
    pub(crate) counters: LinkCounters,
}

/// One gPTP port: a network port seen from one instance.
#[derive(Debug)]
pub(crate) struct Port {
    /// Network port index
    pub(crate) index: usize,
    pub(crate) identity: PortIdentity,
    pub(crate) link: LinkRef,
    pub(crate) ptp_port_enabled: bool,
    pub(crate) as_capable: bool,
    pub(crate) neighbor_gptp_capable: bool,
    pub(crate) static_role: PortRole,
    pub(crate) role: PortRole,

    // Announce and spanning tree
    pub(crate) info_is: InfoIs,
    pub(crate) port_priority: PriorityVector,
    pub(crate) master_priority: PriorityVector,
    pub(crate) port_steps_removed: u16,
    pub(crate) message_steps_removed: u16,
    pub(crate) updt_info: bool,
    pub(crate) new_info: bool,
    pub(crate) reselect: bool,
    pub(crate) selected: bool,
    pub(crate) rcvd_msg: bool,
    pub(crate) rcvd_announce: Option<AnnounceRx>,
    pub(crate) rcvd_info: RcvdInfo,
    pub(crate) ann: TimeProperties,
    pub(crate) announce_rcv_state: AnnounceRcvState,
    pub(crate) announce_info_state: AnnounceInfoState,
    pub(crate) announce_tx_state: AnnounceTxState,
    pub(crate) announce_seq: u16,
    pub(crate) announce_count: u8,
    pub(crate) announce_receipt_timeout: u8,
    pub(crate) announce_receipt_interval_ns: u64,
    pub(crate) announce: IntervalSetting,

    // Sync
    pub(crate) sync: IntervalSetting,
    pub(crate) oper_log_sync_interval: i8,
    pub(crate) sync_receipt_timeout: u8,
    pub(crate) sync_rcv_state: SyncRcvState,
    pub(crate) rcvd_sync: Option<SyncRx>,
    pub(crate) upstream_sync_interval: i8,
    pub(crate) sync_send_state: SyncSendState,
    pub(crate) sync_seq: u16,
    pub(crate) md_sync_send: Option<SyncInfo>,
    pub(crate) sync_tx_ts: Option<u64>,
    pub(crate) port_sync_rcv_state: PortSyncRcvState,
    pub(crate) port_sync_rate_ratio: f64,
    pub(crate) port_sync_send_state: PortSyncSendState,
    pub(crate) pssync: Option<SyncInfo>,
    pub(crate) rcvd_pssync: bool,
    pub(crate) last_pssync: Option<SyncInfo>,
    pub(crate) sync_locked: bool,
    pub(crate) sync_count: u8,

    // gPTP-capable signaling
    pub(crate) gptp_capable: IntervalSetting,
    pub(crate) gptp_capable_receipt_timeout: u8,
    pub(crate) capable_rcv_state: CapableRcvState,
    pub(crate) capable_tx_state: CapableTxState,
    pub(crate) capable_count: u8,
    pub(crate) signaling_seq: u16,

    // Automotive link delay sync transmit
    pub(crate) link_tx_state: LinkTxState,
    pub(crate) ratio_is_valid: bool,

    // Clock slave indication
    pub(crate) sync_state: SyncState,
    pub(crate) sync_time_ns: u64,
    pub(crate) nosync_time_ns: u64,

    pub(crate) counters: PortCounters,
}

impl Port {
    pub(crate) fn port_number(&self) -> u16 {
        self.identity.port_number
    }
}

/// One gPTP instance (domain).
#[derive(Debug)]
pub(crate) struct Instance {
    pub(crate) domain: u8,
    pub(crate) enabled: bool,
    pub(crate) gm_capable: bool,
    pub(crate) gm_id_static: bool,
    pub(crate) this_clock: ClockIdentity,

    pub(crate) system_priority: PriorityVector,
    pub(crate) gm_priority: PriorityVector,
    pub(crate) last_gm_priority: PriorityVector,
    pub(crate) path_trace: Vec<ClockIdentity>,
    pub(crate) gm_present: bool,
    pub(crate) is_grandmaster: bool,
    pub(crate) master_steps_removed: u16,
    pub(crate) system_role: PortRole,
    pub(crate) props: TimeProperties,
    pub(crate) sys_props: TimeProperties,
    pub(crate) parent_log_sync_interval: i8,
    pub(crate) selection_state: SelectionState,
    pub(crate) selecting: bool,
    pub(crate) reselect_pending: bool,
    pub(crate) site_sync_state: SiteSyncState,
    pub(crate) reported_gm: Option<(ClockIdentity, bool)>,

    // Clock master
    pub(crate) clock_master_log_sync_interval: i8,
    pub(crate) gm_rate_ratio: f64,
    pub(crate) master_time: UScaledNs,
    pub(crate) local_time: UScaledNs,
    pub(crate) clock_source_time_base_indicator: u16,
    pub(crate) clock_source_phase_offset: ScaledNs,
    pub(crate) clock_source_freq_offset: f64,
    pub(crate) freq_offset_init: bool,
    pub(crate) ratio_average: f64,
    pub(crate) prev_sync_receipt_time: UScaledNs,
    pub(crate) prev_sync_receipt_local_time: UScaledNs,

    // Clock slave
    pub(crate) sync_receipt_time: UScaledNs,
    pub(crate) sync_receipt_local_time: UScaledNs,
    pub(crate) prev_gm_identity: ClockIdentity,
    pub(crate) gm_time_base_indicator: u16,
    pub(crate) last_gm_phase_change: ScaledNs,
    pub(crate) last_gm_freq_change: f64,
    pub(crate) time_of_last_gm_phase_change: u64,
    pub(crate) time_of_last_gm_freq_change: u64,
    pub(crate) cumulative_rate_ratio: i32,
    pub(crate) adjuster: ClockAdjuster,

    pub(crate) ports: Vec<Port>,
    pub(crate) counters: InstanceCounters,
}

impl Instance {
    /// Selected role by port number, 0 being the instance itself.
    pub(crate) fn role_of(&self, port_number: u16) -> PortRole {
        if port_number == 0 {
            return self.system_role;
        }
        self.ports
            .get(usize::from(port_number) - 1)
            .map_or(PortRole::Disabled, |port| port.role)
    }
}

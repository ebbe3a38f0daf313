//! Protocol counters.
//!
//! Counters only ever increase; they are read through the accessors of
//! [`TimeAwareSystem`](super::TimeAwareSystem).

/// Per gPTP port counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortCounters {
    /// Sync messages received
    pub rx_sync: u64,
    /// Follow_Up messages received
    pub rx_follow_up: u64,
    /// Announce messages received
    pub rx_announce: u64,
    /// Announce messages dropped (static grandmaster or oversized)
    pub rx_announce_dropped: u64,
    /// Signaling messages received
    pub rx_signaling: u64,
    /// Sync messages sent
    pub tx_sync: u64,
    /// Follow_Up messages sent
    pub tx_follow_up: u64,
    /// Announce messages sent
    pub tx_announce: u64,
    /// Signaling messages sent
    pub tx_signaling: u64,
    /// Follow_Up receipt timeouts
    pub follow_up_receipt_timeout: u64,
    /// Sync receipt timeouts
    pub sync_receipt_timeout: u64,
    /// Announce receipt timeouts
    pub announce_receipt_timeout: u64,
    /// Follow_Up messages discarded for a sequence mismatch
    pub follow_up_discard: u64,
    /// Sync messages dropped by the media receiver
    pub md_sync_rcv_sm_reset: u64,
    /// Transitions to not AS-capable caused by the link
    pub not_as_capable: u64,
    /// Announce messages failing qualification
    pub announce_not_qualified: u64,
}

/// Per link (peer delay) counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkCounters {
    /// `Pdelay_Req` received
    pub rx_pdelay_req: u64,
    /// `Pdelay_Resp` received
    pub rx_pdelay_resp: u64,
    /// `Pdelay_Resp_Follow_Up` received
    pub rx_pdelay_resp_follow_up: u64,
    /// `Pdelay_Req` sent
    pub tx_pdelay_req: u64,
    /// `Pdelay_Resp` sent
    pub tx_pdelay_resp: u64,
    /// `Pdelay_Resp_Follow_Up` sent
    pub tx_pdelay_resp_follow_up: u64,
    /// Responses not matching the outstanding request
    pub pdelay_resp_discard: u64,
    /// Follow-ups not matching the outstanding response
    pub pdelay_resp_follow_up_discard: u64,
    /// Request state machine resets
    pub pdelay_req_sm_reset: u64,
    /// Times the allowed lost responses were exceeded
    pub pdelay_lost_exceeded: u64,
    /// Requests answered by more than one responder
    pub pdelay_multiple_responses: u64,
}

/// Per instance counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceCounters {
    /// Sync samples fed to the clock control loop
    pub adjust_on_sync: u64,
    /// Transitions from synchronized to not synchronized
    pub synchro_loss: u64,
    /// Superior announce information received
    pub gm_change: u64,
}

/// Per network port receive counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetPortCounters {
    /// Frames accepted
    pub rx_frames: u64,
    /// Frames that failed to decode
    pub rx_err_parse: u64,
    /// Frames with an invalid SdoId
    pub rx_err_sdoid: u64,
    /// Frames with an invalid domain number
    pub rx_err_domain: u64,
    /// Frames for a domain without instance
    pub rx_err_domain_unknown: u64,
    /// Frames sent with an egress timestamp request
    pub tx_timestamp_requests: u64,
    /// Egress timestamps that matched nothing
    pub tx_timestamp_unmatched: u64,
}

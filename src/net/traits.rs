//! Transport-facing types and traits

use std::fmt;

use bytes::Bytes;

use crate::error::Result;

/// Kind of event message awaiting an egress timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    /// Sync, per gPTP instance
    Sync,
    /// `Pdelay_Req`
    PdelayReq,
    /// `Pdelay_Resp`
    PdelayResp,
}

/// Opaque correlation id for a hardware egress timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxTag {
    /// Message awaiting the timestamp
    pub kind: TxKind,
    /// Instance index for Sync, link index for peer delay messages
    pub owner: usize,
    /// Sequence id of the transmitted message
    pub sequence_id: u16,
}

impl fmt::Display for TxTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}/{}", self.kind, self.owner, self.sequence_id)
    }
}

/// Outbound frame transport.
pub trait NetworkInterface {
    /// Transmit `frame` on network port `port`.
    ///
    /// When `tag` is set, the transport must later report the egress
    /// timestamp of the frame with the same tag.
    fn send(&mut self, port: usize, frame: Bytes, tag: Option<TxTag>) -> Result<()>;
}

/// One received frame with its ingress timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    /// Network port index
    pub port: usize,
    /// Raw PDU, starting at the PTP header
    pub data: Bytes,
    /// Local clock ingress timestamp, in ns
    pub timestamp: u64,
}

/// Egress timestamp reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxTimestamp {
    /// Network port index
    pub port: usize,
    /// Correlation id given at send time
    pub tag: TxTag,
    /// Local clock egress timestamp, in ns
    pub timestamp: u64,
}

/// Physical link state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEvent {
    /// Network port index
    pub port: usize,
    /// Whether the link is up
    pub up: bool,
    /// Link speed in Mbps
    pub rate_mbps: u32,
}

//! gPTP message types, parsing, and encoding.
//!
//! Implements the 802.1AS-2020 full-duplex point-to-point PDUs: the common
//! 34-byte header followed by a fixed body per message type. Encoding always
//! produces the 2020 layout (minor version 1, control field 0).

pub mod tlv;

#[cfg(test)]
mod tests;

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes};

pub use tlv::{
    FollowUpTlv, GptpCapableTlv, INTERVAL_NO_CHANGE, INTERVAL_RESET_TO_INITIAL, INTERVAL_STOP,
    IntervalRequestTlv, MAX_PATH_TRACE_ENTRIES, SignalingTlv,
};

use crate::error::ParseError;
use crate::protocol::bmca::ClockQuality;
use crate::protocol::time::PtpTimestamp;

/// EUI-64 clock identity.
pub type ClockIdentity = u64;

/// Major PTP version.
pub const PTP_VERSION: u8 = 2;
/// Minor PTP version written on transmit.
pub const PTP_MINOR_VERSION: u8 = 1;

/// Highest valid domain number.
pub const DOMAIN_NUMBER_MAX: u8 = 127;

/// Major SdoId of gPTP domains (transport-specific nibble).
pub const SDO_ID_GPTP: u8 = 0x1;
/// Major SdoId of the Common Mean Link Delay Service.
pub const SDO_ID_CMLDS: u8 = 0x2;

/// Log message interval of Pdelay_Resp, Pdelay_Resp_Follow_Up and Signaling.
pub const LOG_INTERVAL_UNSPECIFIED: i8 = 0x7F;

/// Header flag bits, with octet 0 in the high byte.
pub mod flags {
    /// Leap second 61.
    pub const LEAP_61: u16 = 1 << 0;
    /// Leap second 59.
    pub const LEAP_59: u16 = 1 << 1;
    /// Current UTC offset valid.
    pub const CURRENT_UTC_OFFSET_VALID: u16 = 1 << 2;
    /// PTP timescale.
    pub const PTP_TIMESCALE: u16 = 1 << 3;
    /// Time traceable.
    pub const TIME_TRACEABLE: u16 = 1 << 4;
    /// Frequency traceable.
    pub const FREQUENCY_TRACEABLE: u16 = 1 << 5;
    /// Two-step clock.
    pub const TWO_STEP: u16 = (1 << 1) << 8;
    /// Unicast.
    pub const UNICAST: u16 = (1 << 2) << 8;
}

/// gPTP message type identifiers (802.1AS Tables 10-5 and 11-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageType {
    /// Sync (event).
    Sync = 0x0,
    /// Peer delay request (event).
    PdelayReq = 0x2,
    /// Peer delay response (event).
    PdelayResp = 0x3,
    /// Follow_Up.
    FollowUp = 0x8,
    /// Peer delay response follow-up.
    PdelayRespFollowUp = 0xA,
    /// Announce.
    Announce = 0xB,
    /// Signaling.
    Signaling = 0xC,
}

impl MessageType {
    /// Parse from the lower 4 bits of a byte.
    pub fn from_nibble(value: u8) -> Result<Self, ParseError> {
        match value & 0x0F {
            0x0 => Ok(Self::Sync),
            0x2 => Ok(Self::PdelayReq),
            0x3 => Ok(Self::PdelayResp),
            0x8 => Ok(Self::FollowUp),
            0xA => Ok(Self::PdelayRespFollowUp),
            0xB => Ok(Self::Announce),
            0xC => Ok(Self::Signaling),
            other => Err(ParseError::UnknownMessageType(other)),
        }
    }

    /// Whether this message type is an event message (timestamped).
    #[must_use]
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Sync | Self::PdelayReq | Self::PdelayResp)
    }

    /// Whether this message belongs to the peer delay exchange.
    #[must_use]
    pub fn is_pdelay(&self) -> bool {
        matches!(
            self,
            Self::PdelayReq | Self::PdelayResp | Self::PdelayRespFollowUp
        )
    }

    /// Fixed message length (Announce without path trace).
    #[must_use]
    pub fn fixed_length(&self) -> usize {
        Header::SIZE
            + match self {
                Self::Sync => PtpTimestamp::SIZE,
                Self::FollowUp => PtpTimestamp::SIZE + FollowUpTlv::SIZE,
                Self::PdelayReq | Self::PdelayResp | Self::PdelayRespFollowUp => 20,
                Self::Announce => AnnounceBody::FIXED_SIZE,
                Self::Signaling => PortIdentity::SIZE + SignalingTlv::SIZE,
            }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "Sync"),
            Self::PdelayReq => write!(f, "Pdelay_Req"),
            Self::PdelayResp => write!(f, "Pdelay_Resp"),
            Self::FollowUp => write!(f, "Follow_Up"),
            Self::PdelayRespFollowUp => write!(f, "Pdelay_Resp_Follow_Up"),
            Self::Announce => write!(f, "Announce"),
            Self::Signaling => write!(f, "Signaling"),
        }
    }
}

/// Port identity: 8-byte clock identity + 2-byte port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct PortIdentity {
    /// Clock identity.
    pub clock_identity: ClockIdentity,
    /// Port number (1-based, 0 for the clock master).
    pub port_number: u16,
}

impl PortIdentity {
    /// Wire size in bytes.
    pub const SIZE: usize = 10;

    /// Wildcard target used by gPTP-capable signaling.
    pub const ALL: Self = Self {
        clock_identity: u64::MAX,
        port_number: u16::MAX,
    };

    /// Create a new port identity.
    #[must_use]
    pub fn new(clock_identity: ClockIdentity, port_number: u16) -> Self {
        Self {
            clock_identity,
            port_number,
        }
    }

    /// Encode as 10 bytes (BE).
    #[must_use]
    pub fn encode(&self) -> [u8; 10] {
        let mut buf = [0u8; 10];
        buf[0..8].copy_from_slice(&self.clock_identity.to_be_bytes());
        buf[8..10].copy_from_slice(&self.port_number.to_be_bytes());
        buf
    }

    /// Decode from 10 bytes.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            clock_identity: BigEndian::read_u64(&data[0..8]),
            port_number: BigEndian::read_u16(&data[8..10]),
        })
    }
}

impl std::fmt::Display for PortIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}-{}", self.clock_identity, self.port_number)
    }
}

/// Common message header (34 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Major SdoId (transport-specific nibble).
    pub major_sdo_id: u8,
    /// Message type.
    pub message_type: MessageType,
    /// Minor PTP version.
    pub minor_version: u8,
    /// Major PTP version.
    pub version: u8,
    /// Total message length including header.
    pub message_length: u16,
    /// Domain number.
    pub domain_number: u8,
    /// Minor SdoId.
    pub minor_sdo_id: u8,
    /// Flags, octet 0 in the high byte.
    pub flags: u16,
    /// Correction field (ns x 2^16, signed).
    pub correction_field: i64,
    /// Message type specific field.
    pub message_type_specific: u32,
    /// Source port identity.
    pub source_port_identity: PortIdentity,
    /// Sequence id.
    pub sequence_id: u16,
    /// Control field.
    pub control: u8,
    /// Log message interval.
    pub log_message_interval: i8,
}

impl Header {
    /// Header size in bytes.
    pub const SIZE: usize = 34;

    /// Create a gPTP domain header with default fields.
    #[must_use]
    pub fn new(message_type: MessageType, source: PortIdentity, sequence_id: u16) -> Self {
        Self {
            major_sdo_id: SDO_ID_GPTP,
            message_type,
            minor_version: PTP_MINOR_VERSION,
            version: PTP_VERSION,
            message_length: 0,
            domain_number: 0,
            minor_sdo_id: 0,
            flags: 0,
            correction_field: 0,
            message_type_specific: 0,
            source_port_identity: source,
            sequence_id,
            control: 0,
            log_message_interval: 0,
        }
    }

    /// Encode the header into `buf`.
    #[allow(clippy::cast_sign_loss, reason = "log interval is a signed byte on the wire")]
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.put_u8((self.major_sdo_id << 4) | (self.message_type as u8 & 0x0F));
        buf.put_u8((self.minor_version << 4) | (self.version & 0x0F));
        buf.put_u16(self.message_length);
        buf.put_u8(self.domain_number);
        buf.put_u8(self.minor_sdo_id);
        buf.put_u16(self.flags);
        buf.put_i64(self.correction_field);
        buf.put_u32(self.message_type_specific);
        buf.put_slice(&self.source_port_identity.encode());
        buf.put_u16(self.sequence_id);
        buf.put_u8(self.control);
        buf.put_u8(self.log_message_interval as u8);
    }

    /// Decode from bytes.
    #[allow(clippy::cast_possible_wrap, reason = "log interval is a signed byte on the wire")]
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < Self::SIZE {
            return Err(ParseError::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            });
        }
        let message_type = MessageType::from_nibble(data[0])?;
        let version = data[1] & 0x0F;
        if version != PTP_VERSION {
            return Err(ParseError::UnsupportedVersion(version));
        }
        let message_length = BigEndian::read_u16(&data[2..4]);
        if usize::from(message_length) > data.len() {
            return Err(ParseError::BadLength {
                declared: usize::from(message_length),
                have: data.len(),
            });
        }
        let source_port_identity =
            PortIdentity::decode(&data[20..30]).ok_or(ParseError::TooShort {
                needed: 30,
                have: data.len(),
            })?;
        Ok(Self {
            major_sdo_id: data[0] >> 4,
            message_type,
            minor_version: data[1] >> 4,
            version,
            message_length,
            domain_number: data[4],
            minor_sdo_id: data[5],
            flags: BigEndian::read_u16(&data[6..8]),
            correction_field: BigEndian::read_i64(&data[8..16]),
            message_type_specific: BigEndian::read_u32(&data[16..20]),
            source_port_identity,
            sequence_id: BigEndian::read_u16(&data[30..32]),
            control: data[32],
            log_message_interval: data[33] as i8,
        })
    }
}

/// Announce body (802.1AS Table 10-7).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnnounceBody {
    /// Current UTC offset in seconds.
    pub current_utc_offset: i16,
    /// Grandmaster priority 1.
    pub grandmaster_priority1: u8,
    /// Grandmaster clock quality.
    pub grandmaster_clock_quality: ClockQuality,
    /// Grandmaster priority 2.
    pub grandmaster_priority2: u8,
    /// Grandmaster clock identity.
    pub grandmaster_identity: ClockIdentity,
    /// Steps removed from the grandmaster.
    pub steps_removed: u16,
    /// Time source enumeration.
    pub time_source: u8,
    /// Path trace, one clock identity per hop.
    pub path_trace: Vec<ClockIdentity>,
}

impl AnnounceBody {
    /// Body size without the path trace TLV.
    pub const FIXED_SIZE: usize = 30;

    /// Largest Announce accepted: fixed part plus a full path trace.
    pub const MAX_MESSAGE_SIZE: usize =
        Header::SIZE + Self::FIXED_SIZE + 4 + 8 * MAX_PATH_TRACE_ENTRIES;
}

/// Message body variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Sync: origin timestamp (zero for two-step).
    Sync {
        /// Origin timestamp.
        origin_timestamp: PtpTimestamp,
    },
    /// Follow_Up: precise origin timestamp and information TLV.
    FollowUp {
        /// Precise origin timestamp of the associated Sync.
        precise_origin_timestamp: PtpTimestamp,
        /// Follow_Up information TLV.
        tlv: FollowUpTlv,
    },
    /// Pdelay_Req: 20 reserved bytes.
    PdelayReq,
    /// Pdelay_Resp: t2 and the requester identity.
    PdelayResp {
        /// Receipt time of the Pdelay_Req (t2).
        request_receipt_timestamp: PtpTimestamp,
        /// Identity of the requesting port.
        requesting_port_identity: PortIdentity,
    },
    /// Pdelay_Resp_Follow_Up: t3 and the requester identity.
    PdelayRespFollowUp {
        /// Transmit time of the Pdelay_Resp (t3).
        response_origin_timestamp: PtpTimestamp,
        /// Identity of the requesting port.
        requesting_port_identity: PortIdentity,
    },
    /// Announce.
    Announce(AnnounceBody),
    /// Signaling.
    Signaling {
        /// Target port identity.
        target_port_identity: PortIdentity,
        /// Carried TLV.
        tlv: SignalingTlv,
    },
}

/// A parsed gPTP message with header and typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message header.
    pub header: Header,
    /// Message body.
    pub body: Body,
}

fn too_short(needed: MessageType, have: usize) -> ParseError {
    ParseError::TooShort {
        needed: needed.fixed_length(),
        have,
    }
}

impl Message {
    /// Parse a complete gPTP message from bytes.
    #[allow(clippy::cast_possible_wrap, reason = "UTC offset is signed on the wire")]
    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let header = Header::decode(data)?;
        let kind = header.message_type;
        if data.len() < kind.fixed_length() {
            return Err(too_short(kind, data.len()));
        }
        let b = &data[Header::SIZE..];

        let body = match kind {
            MessageType::Sync => Body::Sync {
                origin_timestamp: PtpTimestamp::decode(b).ok_or(too_short(kind, data.len()))?,
            },
            MessageType::FollowUp => Body::FollowUp {
                precise_origin_timestamp: PtpTimestamp::decode(b)
                    .ok_or(too_short(kind, data.len()))?,
                tlv: FollowUpTlv::decode(&b[PtpTimestamp::SIZE..])?,
            },
            MessageType::PdelayReq => Body::PdelayReq,
            MessageType::PdelayResp => Body::PdelayResp {
                request_receipt_timestamp: PtpTimestamp::decode(b)
                    .ok_or(too_short(kind, data.len()))?,
                requesting_port_identity: PortIdentity::decode(&b[10..20])
                    .ok_or(too_short(kind, data.len()))?,
            },
            MessageType::PdelayRespFollowUp => Body::PdelayRespFollowUp {
                response_origin_timestamp: PtpTimestamp::decode(b)
                    .ok_or(too_short(kind, data.len()))?,
                requesting_port_identity: PortIdentity::decode(&b[10..20])
                    .ok_or(too_short(kind, data.len()))?,
            },
            MessageType::Announce => Body::Announce(AnnounceBody {
                current_utc_offset: BigEndian::read_u16(&b[10..12]) as i16,
                grandmaster_priority1: b[13],
                grandmaster_clock_quality: ClockQuality::decode(&b[14..18])
                    .ok_or(too_short(kind, data.len()))?,
                grandmaster_priority2: b[18],
                grandmaster_identity: BigEndian::read_u64(&b[19..27]),
                steps_removed: BigEndian::read_u16(&b[27..29]),
                time_source: b[29],
                path_trace: tlv::decode_path_trace(&b[AnnounceBody::FIXED_SIZE..]),
            }),
            MessageType::Signaling => Body::Signaling {
                target_port_identity: PortIdentity::decode(b)
                    .ok_or(too_short(kind, data.len()))?,
                tlv: SignalingTlv::decode(&b[PortIdentity::SIZE..])?,
            },
        };

        Ok(Self { header, body })
    }

    /// Encode to bytes. The header length field is computed.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "largest message is under 256 bytes")]
    pub fn encode(&self) -> Bytes {
        let mut body = Vec::with_capacity(64);
        self.encode_body(&mut body);
        let mut header = self.header;
        header.message_length = (Header::SIZE + body.len()) as u16;

        let mut buf = Vec::with_capacity(Header::SIZE + body.len());
        header.encode_into(&mut buf);
        buf.extend_from_slice(&body);
        Bytes::from(buf)
    }

    #[allow(clippy::cast_sign_loss, reason = "UTC offset is signed on the wire")]
    fn encode_body(&self, buf: &mut Vec<u8>) {
        match &self.body {
            Body::Sync { origin_timestamp } => buf.put_slice(&origin_timestamp.encode()),
            Body::FollowUp {
                precise_origin_timestamp,
                tlv,
            } => {
                buf.put_slice(&precise_origin_timestamp.encode());
                tlv.encode_into(buf);
            }
            Body::PdelayReq => buf.put_slice(&[0u8; 20]),
            Body::PdelayResp {
                request_receipt_timestamp: ts,
                requesting_port_identity: id,
            }
            | Body::PdelayRespFollowUp {
                response_origin_timestamp: ts,
                requesting_port_identity: id,
            } => {
                buf.put_slice(&ts.encode());
                buf.put_slice(&id.encode());
            }
            Body::Announce(a) => {
                buf.put_slice(&[0u8; 10]);
                buf.put_u16(a.current_utc_offset as u16);
                buf.put_u8(0);
                buf.put_u8(a.grandmaster_priority1);
                buf.put_slice(&a.grandmaster_clock_quality.encode());
                buf.put_u8(a.grandmaster_priority2);
                buf.put_u64(a.grandmaster_identity);
                buf.put_u16(a.steps_removed);
                buf.put_u8(a.time_source);
                tlv::encode_path_trace(&a.path_trace, buf);
            }
            Body::Signaling {
                target_port_identity,
                tlv,
            } => {
                buf.put_slice(&target_port_identity.encode());
                tlv.encode_into(buf);
            }
        }
    }

    /// Sequence id shortcut.
    #[must_use]
    pub fn sequence_id(&self) -> u16 {
        self.header.sequence_id
    }

    /// Create a two-step Sync message.
    #[must_use]
    pub fn sync(source: PortIdentity, sequence_id: u16, domain_number: u8) -> Self {
        let mut header = Header::new(MessageType::Sync, source, sequence_id);
        header.domain_number = domain_number;
        header.flags = flags::TWO_STEP | timescale(domain_number);
        Self {
            header,
            body: Body::Sync {
                origin_timestamp: PtpTimestamp::ZERO,
            },
        }
    }

    /// Create a Follow_Up message.
    #[must_use]
    pub fn follow_up(
        source: PortIdentity,
        sequence_id: u16,
        domain_number: u8,
        precise_origin_timestamp: PtpTimestamp,
        tlv: FollowUpTlv,
    ) -> Self {
        let mut header = Header::new(MessageType::FollowUp, source, sequence_id);
        header.domain_number = domain_number;
        header.flags = timescale(domain_number);
        Self {
            header,
            body: Body::FollowUp {
                precise_origin_timestamp,
                tlv,
            },
        }
    }

    /// Create a Pdelay_Req message. `cmlds` selects the CMLDS SdoId.
    #[must_use]
    pub fn pdelay_req(source: PortIdentity, sequence_id: u16, cmlds: bool) -> Self {
        Self {
            header: pdelay_header(MessageType::PdelayReq, source, sequence_id, cmlds),
            body: Body::PdelayReq,
        }
    }

    /// Create a two-step Pdelay_Resp message.
    #[must_use]
    pub fn pdelay_resp(
        source: PortIdentity,
        sequence_id: u16,
        cmlds: bool,
        request_receipt_timestamp: PtpTimestamp,
        requesting_port_identity: PortIdentity,
    ) -> Self {
        let mut header = pdelay_header(MessageType::PdelayResp, source, sequence_id, cmlds);
        header.flags |= flags::TWO_STEP;
        header.log_message_interval = LOG_INTERVAL_UNSPECIFIED;
        Self {
            header,
            body: Body::PdelayResp {
                request_receipt_timestamp,
                requesting_port_identity,
            },
        }
    }

    /// Create a Pdelay_Resp_Follow_Up message.
    #[must_use]
    pub fn pdelay_resp_follow_up(
        source: PortIdentity,
        sequence_id: u16,
        cmlds: bool,
        response_origin_timestamp: PtpTimestamp,
        requesting_port_identity: PortIdentity,
    ) -> Self {
        let mut header =
            pdelay_header(MessageType::PdelayRespFollowUp, source, sequence_id, cmlds);
        header.log_message_interval = LOG_INTERVAL_UNSPECIFIED;
        Self {
            header,
            body: Body::PdelayRespFollowUp {
                response_origin_timestamp,
                requesting_port_identity,
            },
        }
    }

    /// Create an Announce message.
    #[must_use]
    pub fn announce(
        source: PortIdentity,
        sequence_id: u16,
        domain_number: u8,
        log_message_interval: i8,
        body: AnnounceBody,
    ) -> Self {
        let mut header = Header::new(MessageType::Announce, source, sequence_id);
        header.domain_number = domain_number;
        header.flags = timescale(domain_number);
        header.log_message_interval = log_message_interval;
        Self {
            header,
            body: Body::Announce(body),
        }
    }

    /// Create a Signaling message.
    #[must_use]
    pub fn signaling(
        source: PortIdentity,
        sequence_id: u16,
        domain_number: u8,
        target_port_identity: PortIdentity,
        tlv: SignalingTlv,
    ) -> Self {
        let mut header = Header::new(MessageType::Signaling, source, sequence_id);
        header.domain_number = domain_number;
        header.log_message_interval = LOG_INTERVAL_UNSPECIFIED;
        Self {
            header,
            body: Body::Signaling {
                target_port_identity,
                tlv,
            },
        }
    }
}

fn timescale(domain_number: u8) -> u16 {
    if domain_number == 0 {
        flags::PTP_TIMESCALE
    } else {
        0
    }
}

fn pdelay_header(
    message_type: MessageType,
    source: PortIdentity,
    sequence_id: u16,
    cmlds: bool,
) -> Header {
    let mut header = Header::new(message_type, source, sequence_id);
    if cmlds {
        header.major_sdo_id = SDO_ID_CMLDS;
    } else {
        header.flags = flags::PTP_TIMESCALE;
    }
    header
}

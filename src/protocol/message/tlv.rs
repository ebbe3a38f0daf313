//! TLV encodings carried by Follow_Up, Announce and Signaling messages.
//!
//! All organization extensions use the IEEE 802.1 OUI `00:80:C2` and a
//! three-byte subtype whose last byte selects the variant.

use byteorder::{BigEndian, ByteOrder};
use bytes::BufMut;

use super::ClockIdentity;
use crate::error::ParseError;
use crate::protocol::time::ScaledNs;

/// Organization extension TLV type.
pub const TLV_TYPE_ORGANIZATION_EXTENSION: u16 = 0x0003;
/// Path trace TLV type.
pub const TLV_TYPE_PATH_TRACE: u16 = 0x0008;
/// Organization extension that must not be forwarded.
pub const TLV_TYPE_ORGANIZATION_EXTENSION_DO_NOT_PROPAGATE: u16 = 0x8000;

/// IEEE 802.1 organization id.
pub const ORGANIZATION_ID_IEEE_8021: [u8; 3] = [0x00, 0x80, 0xC2];

/// Follow_Up information TLV subtype.
pub const SUBTYPE_FOLLOW_UP_INFORMATION: u8 = 1;
/// Message interval request TLV subtype.
pub const SUBTYPE_INTERVAL_REQUEST: u8 = 2;
/// gPTP-capable TLV subtype.
pub const SUBTYPE_GPTP_CAPABLE_MESSAGE: u8 = 4;
/// gPTP-capable interval request TLV subtype.
pub const SUBTYPE_GPTP_CAPABLE_INTERVAL: u8 = 5;

/// Maximum number of clock identities kept in a path trace.
pub const MAX_PATH_TRACE_ENTRIES: usize = 16;

/// Interval request: keep the current interval.
pub const INTERVAL_NO_CHANGE: i8 = -128;
/// Interval request: return to the initial interval.
pub const INTERVAL_RESET_TO_INITIAL: i8 = 126;
/// Interval request: stop sending.
pub const INTERVAL_STOP: i8 = 127;

/// Interval request flag: the receiver should compute neighbor rate ratio.
pub const ITLV_FLAG_COMPUTE_RATIO: u8 = 0x01;
/// Interval request flag: the receiver should compute mean link delay.
pub const ITLV_FLAG_COMPUTE_DELAY: u8 = 0x02;

fn organization_header(buf: &mut Vec<u8>, tlv_type: u16, length: u16, subtype: u8) {
    buf.put_u16(tlv_type);
    buf.put_u16(length);
    buf.put_slice(&ORGANIZATION_ID_IEEE_8021);
    buf.put_slice(&[0, 0, subtype]);
}

/// Follow_Up information TLV (802.1AS 11.4.4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FollowUpTlv {
    /// (rateRatio - 1) x 2^41.
    pub cumulative_scaled_rate_offset: i32,
    /// Time base indicator of the current grandmaster.
    pub gm_time_base_indicator: u16,
    /// Phase change at the last grandmaster change.
    pub last_gm_phase_change: ScaledNs,
    /// Frequency change at the last grandmaster change, x 2^41.
    pub scaled_last_gm_freq_change: i32,
}

impl FollowUpTlv {
    /// Encoded size including the TLV header.
    pub const SIZE: usize = 32;

    const SCALE: f64 = (1u64 << 41) as f64;

    /// Build from a rate ratio, truncating toward negative infinity.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "offset is bounded by the 1% rate check")]
    pub fn with_rate_ratio(rate_ratio: f64) -> Self {
        Self {
            cumulative_scaled_rate_offset: ((rate_ratio - 1.0) * Self::SCALE).floor() as i32,
            ..Self::default()
        }
    }

    /// Rate ratio encoded by the cumulative offset.
    #[must_use]
    pub fn rate_ratio(&self) -> f64 {
        f64::from(self.cumulative_scaled_rate_offset) / Self::SCALE + 1.0
    }

    /// Frequency change as a plain ratio.
    #[must_use]
    pub fn last_gm_freq_change(&self) -> f64 {
        f64::from(self.scaled_last_gm_freq_change) / Self::SCALE
    }

    /// Encode a plain frequency change, truncating toward negative infinity.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "float to int casts saturate")]
    pub fn scale_freq_change(change: f64) -> i32 {
        (change * Self::SCALE).floor() as i32
    }

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        organization_header(
            buf,
            TLV_TYPE_ORGANIZATION_EXTENSION,
            28,
            SUBTYPE_FOLLOW_UP_INFORMATION,
        );
        buf.put_i32(self.cumulative_scaled_rate_offset);
        buf.put_u16(self.gm_time_base_indicator);
        buf.put_slice(&self.last_gm_phase_change.encode());
        buf.put_i32(self.scaled_last_gm_freq_change);
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < Self::SIZE {
            return Err(ParseError::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            });
        }
        Ok(Self {
            cumulative_scaled_rate_offset: BigEndian::read_i32(&data[10..14]),
            gm_time_base_indicator: BigEndian::read_u16(&data[14..16]),
            last_gm_phase_change: ScaledNs::decode(&data[16..28]).unwrap_or_default(),
            scaled_last_gm_freq_change: BigEndian::read_i32(&data[28..32]),
        })
    }
}

/// Message interval request TLV (802.1AS-2020 Table 10-14).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalRequestTlv {
    /// Requested log2 Pdelay_Req interval.
    pub link_delay_interval: i8,
    /// Requested log2 Sync interval.
    pub time_sync_interval: i8,
    /// Requested log2 Announce interval.
    pub announce_interval: i8,
    /// `ITLV_FLAG_*` bits.
    pub flags: u8,
}

impl Default for IntervalRequestTlv {
    fn default() -> Self {
        Self {
            link_delay_interval: INTERVAL_NO_CHANGE,
            time_sync_interval: INTERVAL_NO_CHANGE,
            announce_interval: INTERVAL_NO_CHANGE,
            flags: ITLV_FLAG_COMPUTE_RATIO | ITLV_FLAG_COMPUTE_DELAY,
        }
    }
}

impl IntervalRequestTlv {
    /// Whether the compute-neighbor-rate-ratio flag is set.
    #[must_use]
    pub fn compute_neighbor_rate_ratio(&self) -> bool {
        self.flags & ITLV_FLAG_COMPUTE_RATIO != 0
    }

    /// Whether the compute-mean-link-delay flag is set.
    #[must_use]
    pub fn compute_mean_link_delay(&self) -> bool {
        self.flags & ITLV_FLAG_COMPUTE_DELAY != 0
    }
}

/// gPTP-capable TLV (802.1AS-2020 Table 10-19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GptpCapableTlv {
    /// Interval at which the sender transmits gPTP-capable messages.
    pub log_gptp_capable_message_interval: i8,
    /// Flags, currently unused.
    pub flags: u8,
}

/// TLV carried by a Signaling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingTlv {
    /// Message interval request.
    IntervalRequest(IntervalRequestTlv),
    /// gPTP-capable announcement.
    GptpCapable(GptpCapableTlv),
    /// Request to change the gPTP-capable message interval.
    GptpCapableInterval {
        /// Requested log2 interval.
        log_gptp_capable_message_interval: i8,
    },
    /// Anything else, kept for counting.
    Other {
        /// TLV type.
        tlv_type: u16,
        /// Organization id.
        organization_id: [u8; 3],
        /// Organization subtype.
        organization_sub_type: [u8; 3],
    },
}

impl SignalingTlv {
    /// Encoded size including TLV header and organization fields.
    pub const SIZE: usize = 16;

    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::IntervalRequest(t) => {
                organization_header(
                    buf,
                    TLV_TYPE_ORGANIZATION_EXTENSION,
                    12,
                    SUBTYPE_INTERVAL_REQUEST,
                );
                buf.put_i8(t.link_delay_interval);
                buf.put_i8(t.time_sync_interval);
                buf.put_i8(t.announce_interval);
                buf.put_u8(t.flags);
                buf.put_u16(0);
            }
            Self::GptpCapable(t) => {
                organization_header(
                    buf,
                    TLV_TYPE_ORGANIZATION_EXTENSION_DO_NOT_PROPAGATE,
                    12,
                    SUBTYPE_GPTP_CAPABLE_MESSAGE,
                );
                buf.put_i8(t.log_gptp_capable_message_interval);
                buf.put_u8(t.flags);
                buf.put_u32(0);
            }
            Self::GptpCapableInterval {
                log_gptp_capable_message_interval,
            } => {
                organization_header(
                    buf,
                    TLV_TYPE_ORGANIZATION_EXTENSION_DO_NOT_PROPAGATE,
                    12,
                    SUBTYPE_GPTP_CAPABLE_INTERVAL,
                );
                buf.put_i8(*log_gptp_capable_message_interval);
                buf.put_slice(&[0u8; 5]);
            }
            Self::Other {
                tlv_type,
                organization_id,
                organization_sub_type,
            } => {
                buf.put_u16(*tlv_type);
                buf.put_u16(12);
                buf.put_slice(organization_id);
                buf.put_slice(organization_sub_type);
                buf.put_slice(&[0u8; 6]);
            }
        }
    }

    #[allow(clippy::cast_possible_wrap, reason = "signed log intervals on the wire")]
    pub(crate) fn decode(data: &[u8]) -> Result<Self, ParseError> {
        const ORG_DO_NOT_PROPAGATE: u16 = TLV_TYPE_ORGANIZATION_EXTENSION_DO_NOT_PROPAGATE;
        if data.len() < Self::SIZE {
            return Err(ParseError::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            });
        }
        let tlv_type = BigEndian::read_u16(&data[0..2]);
        let organization_id = [data[4], data[5], data[6]];
        let organization_sub_type = [data[7], data[8], data[9]];
        let p = &data[10..16];
        let ieee = organization_id == ORGANIZATION_ID_IEEE_8021
            && organization_sub_type[0] == 0
            && organization_sub_type[1] == 0;

        let tlv = match (tlv_type, ieee, organization_sub_type[2]) {
            (TLV_TYPE_ORGANIZATION_EXTENSION, true, SUBTYPE_INTERVAL_REQUEST) => {
                Self::IntervalRequest(IntervalRequestTlv {
                    link_delay_interval: p[0] as i8,
                    time_sync_interval: p[1] as i8,
                    announce_interval: p[2] as i8,
                    flags: p[3],
                })
            }
            (ORG_DO_NOT_PROPAGATE, true, SUBTYPE_GPTP_CAPABLE_MESSAGE) => {
                Self::GptpCapable(GptpCapableTlv {
                    log_gptp_capable_message_interval: p[0] as i8,
                    flags: p[1],
                })
            }
            (ORG_DO_NOT_PROPAGATE, true, SUBTYPE_GPTP_CAPABLE_INTERVAL) => {
                Self::GptpCapableInterval {
                    log_gptp_capable_message_interval: p[0] as i8,
                }
            }
            _ => Self::Other {
                tlv_type,
                organization_id,
                organization_sub_type,
            },
        };
        Ok(tlv)
    }
}

/// Encode a path trace TLV, truncated to [`MAX_PATH_TRACE_ENTRIES`].
#[allow(clippy::cast_possible_truncation, reason = "at most 16 entries of 8 bytes")]
pub(crate) fn encode_path_trace(path: &[ClockIdentity], buf: &mut Vec<u8>) {
    let n = path.len().min(MAX_PATH_TRACE_ENTRIES);
    buf.put_u16(TLV_TYPE_PATH_TRACE);
    buf.put_u16((n * 8) as u16);
    for id in &path[..n] {
        buf.put_u64(*id);
    }
}

/// Decode a path trace TLV if one is present. Entries beyond the frame or
/// beyond [`MAX_PATH_TRACE_ENTRIES`] are ignored.
pub(crate) fn decode_path_trace(data: &[u8]) -> Vec<ClockIdentity> {
    if data.len() < 4 || BigEndian::read_u16(&data[0..2]) != TLV_TYPE_PATH_TRACE {
        return Vec::new();
    }
    let declared = usize::from(BigEndian::read_u16(&data[2..4])) / 8;
    data[4..]
        .chunks_exact(8)
        .take(declared.min(MAX_PATH_TRACE_ENTRIES))
        .map(BigEndian::read_u64)
        .collect()
}

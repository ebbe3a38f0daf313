//! Wire timestamp representation and conversions.
//!
//! IEEE 1588 / 802.1AS timestamps are 80 bits on the wire (48-bit seconds +
//! 32-bit nanoseconds). Local hardware timestamps are plain `u64`
//! nanoseconds, which covers wire seconds whose high 16 bits are below 4.

use super::{NS_PER_SEC, UScaledNs};

/// IEEE 1588 PTP timestamp: 48-bit seconds + 32-bit nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PtpTimestamp {
    /// Seconds since the PTP epoch (48 bits significant).
    pub seconds: u64,
    /// Nanoseconds within the current second (`0..999_999_999`).
    pub nanoseconds: u32,
}

impl PtpTimestamp {
    /// Wire size in bytes.
    pub const SIZE: usize = 10;

    /// Nanoseconds in one second.
    pub const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// Maximum seconds representable in 48 bits.
    pub const MAX_SECONDS_48BIT: u64 = (1u64 << 48) - 1;

    /// Zero timestamp.
    pub const ZERO: Self = Self {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Create a new timestamp, masking seconds to 48 bits and clamping
    /// nanoseconds to the valid range.
    #[must_use]
    pub fn new(seconds: u64, nanoseconds: u32) -> Self {
        Self {
            seconds: seconds & Self::MAX_SECONDS_48BIT,
            nanoseconds: nanoseconds.min(Self::NANOS_PER_SEC - 1),
        }
    }

    /// High 16 bits of the 48-bit seconds field.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "48-bit seconds, top limb is 16 bits")]
    pub fn seconds_msb(&self) -> u16 {
        (self.seconds >> 32) as u16
    }

    /// Build from a local `u64` nanosecond count.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "remainder is below 1e9")]
    pub fn from_u64_ns(ns: u64) -> Self {
        Self {
            seconds: ns / NS_PER_SEC,
            nanoseconds: (ns % NS_PER_SEC) as u32,
        }
    }

    /// Convert to a local `u64` nanosecond count.
    ///
    /// Returns `None` when the high seconds limb is 4 or more, which would
    /// overflow 64 bits.
    #[must_use]
    pub fn to_u64_ns(&self) -> Option<u64> {
        if self.seconds_msb() >= 4 {
            tracing::error!("timestamp {} out of u64 ns range", self);
            return None;
        }
        self.seconds
            .checked_mul(NS_PER_SEC)?
            .checked_add(u64::from(self.nanoseconds))
    }

    /// Convert to 96-bit scaled nanoseconds. Exact for every wire value.
    #[must_use]
    pub fn to_scaled(&self) -> UScaledNs {
        let ns = u128::from(self.seconds) * u128::from(NS_PER_SEC) + u128::from(self.nanoseconds);
        UScaledNs::from_bits(ns << 16)
    }

    /// Convert from 96-bit scaled nanoseconds, truncating the fraction.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "96-bit input divided by 1e9 fits in 64 bits, remainder below 1e9"
    )]
    pub fn from_scaled(value: UScaledNs) -> Self {
        let ns = value.to_bits() >> 16;
        let seconds = (ns / u128::from(NS_PER_SEC)) as u64;
        if seconds > Self::MAX_SECONDS_48BIT {
            tracing::error!("scaled value {} exceeds 48-bit seconds", value);
        }
        Self {
            seconds: seconds & Self::MAX_SECONDS_48BIT,
            nanoseconds: (ns % u128::from(NS_PER_SEC)) as u32,
        }
    }

    /// Encode as IEEE 1588 wire format: 6-byte seconds (BE) + 4-byte nanoseconds (BE).
    #[must_use]
    pub fn encode(&self) -> [u8; 10] {
        let mut buf = [0u8; 10];
        let sec_bytes = self.seconds.to_be_bytes();
        buf[0..6].copy_from_slice(&sec_bytes[2..8]);
        buf[6..10].copy_from_slice(&self.nanoseconds.to_be_bytes());
        buf
    }

    /// Decode from IEEE 1588 wire format.
    ///
    /// Returns `None` if the slice is too short.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        let seconds =
            u64::from_be_bytes([0, 0, data[0], data[1], data[2], data[3], data[4], data[5]]);
        let nanoseconds = u32::from_be_bytes([data[6], data[7], data[8], data[9]]);
        Some(Self {
            seconds,
            nanoseconds,
        })
    }
}

impl std::fmt::Display for PtpTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}

impl From<PtpTimestamp> for UScaledNs {
    fn from(ts: PtpTimestamp) -> Self {
        ts.to_scaled()
    }
}

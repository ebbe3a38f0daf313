//! 96-bit scaled-nanosecond arithmetic and interval helpers.
//!
//! gPTP carries most time quantities as `ScaledNs` / `UScaledNs`: a 96-bit
//! fixed-point value in units of 2^-16 ns, laid out on the wire as
//!
//! ```text
//! +----------------+--------------------------------+----------------+
//! | ns msb (16 bit)|      nanoseconds (64 bit)      |  frac (16 bit) |
//! +----------------+--------------------------------+----------------+
//! ```
//!
//! Arithmetic wraps at 96 bits exactly; conversions to `u64` and `f64`
//! are lossy and report precision loss through `tracing`.

pub mod timestamp;


pub use timestamp::PtpTimestamp;

/// Nanoseconds per second.
pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Nanoseconds per millisecond.
pub const NS_PER_MS: u64 = 1_000_000;

/// Smallest log2 interval accepted by [`log_to_ns`] (31.25 ms).
pub const LOG_INTERVAL_MIN: i8 = -5;

/// Largest log2 interval accepted by [`log_to_ns`] (about 48 days).
pub const LOG_INTERVAL_MAX: i8 = 22;

const MASK_96: u128 = (1u128 << 96) - 1;
const SIGN_96: u128 = 1u128 << 95;
const FRAC_ONE: f64 = 65536.0;

/// Unsigned 96-bit scaled nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UScaledNs(u128);

/// Signed (two's complement) 96-bit scaled nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScaledNs(u128);

macro_rules! scaled_common {
    ($ty:ident) => {
        impl $ty {
            /// Wire size in bytes.
            pub const SIZE: usize = 12;

            /// Zero.
            pub const ZERO: Self = Self(0);

            /// Build from the three wire limbs.
            #[must_use]
            pub fn from_parts(nanoseconds_msb: u16, nanoseconds: u64, fractional: u16) -> Self {
                Self(
                    (u128::from(nanoseconds_msb) << 80)
                        | (u128::from(nanoseconds) << 16)
                        | u128::from(fractional),
                )
            }

            /// Build from a raw 96-bit image; upper bits are discarded.
            #[must_use]
            pub fn from_bits(bits: u128) -> Self {
                Self(bits & MASK_96)
            }

            /// Raw 96-bit image.
            #[must_use]
            pub fn to_bits(self) -> u128 {
                self.0
            }

            /// High-order 16 bits of the nanosecond count.
            #[must_use]
            #[allow(
                clippy::cast_possible_truncation,
                reason = "value is masked to 96 bits, the shifted limb fits in 16 bits"
            )]
            pub fn nanoseconds_msb(self) -> u16 {
                (self.0 >> 80) as u16
            }

            /// Low-order 64 bits of the nanosecond count.
            #[must_use]
            #[allow(clippy::cast_possible_truncation, reason = "limb extraction")]
            pub fn nanoseconds(self) -> u64 {
                (self.0 >> 16) as u64
            }

            /// Fractional nanoseconds, in units of 2^-16 ns.
            #[must_use]
            #[allow(clippy::cast_possible_truncation, reason = "limb extraction")]
            pub fn fractional_nanoseconds(self) -> u16 {
                self.0 as u16
            }

            /// Whole nanoseconds with no fraction.
            #[must_use]
            pub fn from_ns(ns: u64) -> Self {
                Self(u128::from(ns) << 16)
            }

            /// Encode as 12 bytes, network byte order.
            #[must_use]
            pub fn encode(self) -> [u8; 12] {
                let mut buf = [0u8; 12];
                buf.copy_from_slice(&self.0.to_be_bytes()[4..16]);
                buf
            }

            /// Decode from 12 bytes, network byte order.
            #[must_use]
            pub fn decode(data: &[u8]) -> Option<Self> {
                let bytes: &[u8; 12] = data.get(..12)?.try_into().ok()?;
                let mut wide = [0u8; 16];
                wide[4..].copy_from_slice(bytes);
                Some(Self(u128::from_be_bytes(wide)))
            }
        }
    };
}

scaled_common!(UScaledNs);
scaled_common!(ScaledNs);

impl UScaledNs {
    /// Round to whole nanoseconds.
    ///
    /// Rounds half-up on the fractional part. A non-zero msb limb cannot be
    /// represented and is dropped with an error log.
    #[must_use]
    pub fn to_u64(self) -> u64 {
        if self.nanoseconds_msb() != 0 {
            tracing::error!(
                "u_scaled_ns overflow: msb {} dropped converting to u64",
                self.nanoseconds_msb()
            );
        }
        let ns = self.nanoseconds();
        if self.fractional_nanoseconds() >= 0x8000 {
            ns.wrapping_add(1)
        } else {
            ns
        }
    }

    /// Convert to floating point nanoseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "loss is detected and logged")]
    pub fn to_f64(self) -> f64 {
        if self.nanoseconds_msb() != 0 || self.nanoseconds() > (1u64 << 53) {
            tracing::error!("u_scaled_ns precision loss converting to f64");
        }
        self.0 as f64 / FRAC_ONE
    }

    /// Convert from floating point nanoseconds.
    ///
    /// Negative and non-finite inputs yield zero.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "input is checked non-negative, float to int casts saturate"
    )]
    pub fn from_f64(ns: f64) -> Self {
        if !ns.is_finite() || ns < 0.0 {
            tracing::error!("cannot convert {} ns to u_scaled_ns", ns);
            return Self::ZERO;
        }
        Self::from_bits((ns * FRAC_ONE) as u128)
    }

    /// Reinterpret as a signed value.
    #[must_use]
    pub fn as_signed(self) -> ScaledNs {
        ScaledNs(self.0)
    }
}

impl ScaledNs {
    /// Sign-extended value in units of 2^-16 ns.
    #[must_use]
    #[allow(clippy::cast_possible_wrap, reason = "two's complement reinterpretation")]
    pub fn to_scaled_i128(self) -> i128 {
        if self.0 & SIGN_96 == 0 {
            self.0 as i128
        } else {
            (self.0 | !MASK_96) as i128
        }
    }

    /// Build from a signed value in units of 2^-16 ns, wrapping at 96 bits.
    #[must_use]
    #[allow(clippy::cast_sign_loss, reason = "two's complement reinterpretation")]
    pub fn from_scaled_i128(v: i128) -> Self {
        Self((v as u128) & MASK_96)
    }

    /// Whether the value is negative.
    #[must_use]
    pub fn is_negative(self) -> bool {
        self.0 & SIGN_96 != 0
    }

    /// Build from a header correction field (ns x 2^16, signed 64 bit).
    #[must_use]
    pub fn from_correction_field(cf: i64) -> Self {
        Self::from_scaled_i128(i128::from(cf))
    }

    /// Convert to a header correction field, saturating at the `i64` range.
    #[must_use]
    pub fn to_correction_field(self) -> i64 {
        let v = self.to_scaled_i128();
        i64::try_from(v).unwrap_or_else(|_| {
            tracing::error!("scaled_ns does not fit a correction field, saturating");
            if v < 0 { i64::MIN } else { i64::MAX }
        })
    }

    /// Signed whole nanoseconds, rounded half-up and saturated to `i64`.
    #[must_use]
    pub fn to_i64(self) -> i64 {
        let v = self.to_scaled_i128() + 0x8000;
        i64::try_from(v >> 16).unwrap_or_else(|_| {
            tracing::error!("scaled_ns overflow converting to i64");
            if v < 0 { i64::MIN } else { i64::MAX }
        })
    }

    /// Convert to floating point nanoseconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "loss is detected and logged")]
    pub fn to_f64(self) -> f64 {
        let v = self.to_scaled_i128();
        if v.unsigned_abs() > (1u128 << 69) {
            tracing::error!("scaled_ns precision loss converting to f64");
        }
        v as f64 / FRAC_ONE
    }

    /// Convert from floating point nanoseconds. Non-finite inputs yield zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, reason = "float to int casts saturate")]
    pub fn from_f64(ns: f64) -> Self {
        if !ns.is_finite() {
            tracing::error!("cannot convert {} ns to scaled_ns", ns);
            return Self::ZERO;
        }
        Self::from_scaled_i128((ns * FRAC_ONE) as i128)
    }

    /// Reinterpret as an unsigned value.
    #[must_use]
    pub fn as_unsigned(self) -> UScaledNs {
        UScaledNs(self.0)
    }
}

impl std::ops::Add for UScaledNs {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0) & MASK_96)
    }
}

impl std::ops::Sub for UScaledNs {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + Self((!rhs.0).wrapping_add(1) & MASK_96)
    }
}

impl std::ops::Add for ScaledNs {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0) & MASK_96)
    }
}

impl std::ops::Neg for ScaledNs {
    type Output = Self;

    fn neg(self) -> Self {
        Self((!self.0).wrapping_add(1) & MASK_96)
    }
}

impl std::ops::Sub for ScaledNs {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl PartialOrd for ScaledNs {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScaledNs {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.to_scaled_i128().cmp(&other.to_scaled_i128())
    }
}

impl std::fmt::Display for UScaledNs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.nanoseconds_msb(),
            self.nanoseconds(),
            self.fractional_nanoseconds()
        )
    }
}

impl std::fmt::Display for ScaledNs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} ns", self.to_f64())
    }
}

/// Convert a log2 interval (seconds) to nanoseconds, clamped to
/// [`LOG_INTERVAL_MIN`, `LOG_INTERVAL_MAX`].
#[must_use]
pub fn log_to_ns(log_interval: i8) -> u64 {
    log_to_ns_clamped(log_interval, LOG_INTERVAL_MIN, LOG_INTERVAL_MAX)
}

/// Convert a log2 interval to nanoseconds, clamped to `[min, max]`.
///
/// Out-of-range inputs are replaced by the nearest bound rather than
/// rejected. Bounds are themselves limited to [-30, 30].
#[must_use]
pub fn log_to_ns_clamped(log_interval: i8, min: i8, max: i8) -> u64 {
    let min = min.clamp(-30, 30);
    let max = max.clamp(min, 30);
    let v = log_interval.clamp(min, max);
    if v != log_interval {
        tracing::debug!("log interval {} out of bounds, replaced by {}", log_interval, v);
    }
    if v < 0 {
        NS_PER_SEC >> v.unsigned_abs()
    } else {
        NS_PER_SEC << v.unsigned_abs()
    }
}

/// Convert a log2 interval to milliseconds (see [`log_to_ns`]).
#[must_use]
pub fn log_to_ms(log_interval: i8) -> u64 {
    log_to_ns(log_interval) / NS_PER_MS
}

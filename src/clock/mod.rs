//! Local clock collaborators.
//!
//! The engine never reads an OS clock directly. It goes through
//! [`ClockInterface`], which exposes three logical clocks:
//!
//! - [`ClockId::Local`]: the free-running clock that stamps frames.
//! - [`ClockId::Target`]: per-domain clock steered to the grandmaster.
//! - [`ClockId::Monotonic`]: timer base, never adjusted.
//!
//! [`LocalClock`] tracks side effects of target clock adjustments on the
//! local clock (phase steps and rate corrections) so link delay
//! measurements can discard samples that straddle them.

pub mod adjust;


use crate::error::Result;

pub use adjust::{ClockAdjuster, PllState};

/// Maximum frequency offset accepted from the control loop, in ppb.
pub const MAX_FREQ_PPB: i64 = 200_000;

/// Logical clock selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockId {
    /// Free-running timestamping clock
    Local,
    /// Steered clock of one domain, by instance index
    Target(usize),
    /// Timer base
    Monotonic,
}

/// What an adjustment of a target clock does to the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdjustMode {
    /// Frequency corrections change the local clock rate
    pub hw_ratio: bool,
    /// Offset corrections step the local clock
    pub hw_offset: bool,
}

impl AdjustMode {
    /// Target adjustments are tracked in software only.
    pub const SOFTWARE: Self = Self {
        hw_ratio: false,
        hw_offset: false,
    };

    /// Target and local clock are the same hardware clock.
    pub const HARDWARE: Self = Self {
        hw_ratio: true,
        hw_offset: true,
    };

    /// No adjustment reaches the local clock.
    #[must_use]
    pub fn is_software(self) -> bool {
        !self.hw_ratio && !self.hw_offset
    }
}

/// Access to the system's clocks.
///
/// All times are nanoseconds in the selected clock's own timescale.
pub trait ClockInterface {
    /// Current time of `id`.
    fn now(&self, id: ClockId) -> Result<u64>;

    /// Set the time of `id`.
    fn set_time(&mut self, id: ClockId, ns: u64) -> Result<()>;

    /// Set the absolute frequency offset of `id`, in ppb.
    fn set_freq(&mut self, id: ClockId, ppb: i64) -> Result<()>;

    /// Step `id` by `ns`.
    fn set_offset(&mut self, id: ClockId, ns: i64) -> Result<()>;

    /// How adjustments of `id` propagate to the local clock.
    fn adjust_mode(&self, id: ClockId) -> AdjustMode;

    /// Translate a time of clock `from` into clock `to`.
    fn convert(&self, from: ClockId, ns: u64, to: ClockId) -> Result<u64>;
}

/// Local clock bookkeeping shared by every domain.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalClock {
    /// Incremented whenever a phase step reaches the local clock
    pub phase_discont: u32,
    /// Rate correction applied to the local clock (1.0 when untouched)
    pub rate_ratio_adjustment: f64,
}

impl LocalClock {
    /// Untouched clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase_discont: 0,
            rate_ratio_adjustment: 1.0,
        }
    }
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

//! Target clock control loop.
//!
//! A type 2 second order PLL steers a target clock to the grandmaster:
//!
//! ```text
//! integral(n) = integral(n-1) + (e(n-1) + e(n)) / 2
//! ppb(n)      = e(n) / KP + integral(n) / KI - 1e9
//! ```
//!
//! `e(n)` is the phase error per unit of time, in ppb. The loop is very
//! sensitive to the initial frequency estimate, so the locking phase
//! measures the ratio before seeding the integral term. Phase errors above
//! the discontinuity threshold restart the loop.

use std::fmt;

use super::{AdjustMode, ClockId, ClockInterface, LocalClock, MAX_FREQ_PPB};
use crate::measure::Stats;

/// Proportional divisor.
const KP: i128 = 2;
/// Integral divisor.
const KI: i128 = 16;
const NS_PER_SEC: i128 = 1_000_000_000;

/// Default phase error above which the loop restarts.
pub const DEFAULT_PHASE_DISCONT_THRESHOLD_NS: u64 = 4000;

/// Lock state of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PllState {
    /// No estimate; the next sample starts locking
    Unlocked,
    /// Estimating the initial ratio
    Locking,
    /// PI control active
    Locked,
}

impl fmt::Display for PllState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unlocked => "UNLOCKED",
            Self::Locking => "LOCKING",
            Self::Locked => "LOCKED",
        };
        f.write_str(name)
    }
}

/// Result of feeding one sync sample to the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdjustOutcome {
    /// Frequency written to the target clock, if it changed
    pub freq_ppb: Option<i64>,
    /// Phase step applied to the target clock
    pub phase_step_ns: Option<i64>,
    /// The loop dropped out of lock on this sample
    pub unlocked: bool,
}

/// Per-domain PI controller for one target clock.
#[derive(Debug, Clone)]
pub struct ClockAdjuster {
    clock: ClockId,
    instance_index: usize,
    domain: u8,
    mode: AdjustMode,
    phase_discont_threshold_ns: u64,

    state: PllState,
    freq_change: bool,
    phase_change: bool,
    last_ppb: i64,
    integral: i128,
    previous_err: i128,
    previous_receipt_time: u64,
    previous_receipt_local_time: u64,
    unlock_count: u64,

    freq_stats: Stats,
    diff_stats: Stats,
}

impl ClockAdjuster {
    /// Create a controller for `clock`.
    ///
    /// Call [`ClockAdjuster::init`] before the first sample.
    #[must_use]
    pub fn new(
        clock: ClockId,
        instance_index: usize,
        domain: u8,
        mode: AdjustMode,
        phase_discont_threshold_ns: u64,
    ) -> Self {
        Self {
            clock,
            instance_index,
            domain,
            mode,
            phase_discont_threshold_ns,
            state: PllState::Unlocked,
            freq_change: true,
            phase_change: false,
            last_ppb: 0,
            integral: 0,
            previous_err: 0,
            previous_receipt_time: 0,
            previous_receipt_local_time: 0,
            unlock_count: 0,
            freq_stats: Stats::new("target clock correction (ppb)"),
            diff_stats: Stats::new("offset between GM and target clock (ns)"),
        }
    }

    /// Current lock state.
    #[must_use]
    pub fn state(&self) -> PllState {
        self.state
    }

    /// Last frequency written to the target clock.
    #[must_use]
    pub fn last_ppb(&self) -> i64 {
        self.last_ppb
    }

    /// Number of times the loop dropped out of lock.
    #[must_use]
    pub fn unlock_count(&self) -> u64 {
        self.unlock_count
    }

    /// Adjustment mode the controller runs in.
    #[must_use]
    pub fn mode(&self) -> AdjustMode {
        self.mode
    }

    /// Reset the loop and the target clock frequency.
    pub fn init(&mut self, clocks: &mut dyn ClockInterface, local: &mut LocalClock) {
        local.phase_discont = 0;
        self.reset(clocks, local);
    }

    fn reset(&mut self, clocks: &mut dyn ClockInterface, local: &mut LocalClock) {
        self.state = PllState::Unlocked;
        if let Err(e) = clocks.set_freq(self.clock, 0) {
            tracing::warn!(domain = self.domain, "failed to reset target clock frequency: {}", e);
        }
        self.freq_change = true;
        self.last_ppb = 0;
        local.rate_ratio_adjustment = 1.0;
        if self.mode.hw_offset {
            local.phase_discont = local.phase_discont.wrapping_add(1);
        }
    }

    /// The domain's grandmaster changed.
    pub fn gm_change(&mut self) {
        tracing::info!(
            instance = self.instance_index,
            domain = self.domain,
            "GM change, target clock unlocked"
        );
        self.state = PllState::Unlocked;
    }

    /// This system entered or left the grandmaster role.
    pub fn system_role_change(
        &mut self,
        is_grandmaster: bool,
        clocks: &mut dyn ClockInterface,
        local: &mut LocalClock,
    ) {
        tracing::info!(
            instance = self.instance_index,
            domain = self.domain,
            is_grandmaster,
            "system role change"
        );
        if is_grandmaster {
            self.reset(clocks, local);
        }
    }

    /// Feed one sync sample.
    ///
    /// `sync_receipt_time` is grandmaster time at sync receipt and
    /// `sync_receipt_local_time` the target clock time of the same instant.
    /// `gm_rate_ratio` is the relayed grandmaster to local rate ratio.
    pub fn adjust_on_sync(
        &mut self,
        clocks: &mut dyn ClockInterface,
        local: &mut LocalClock,
        sync_receipt_time: u64,
        sync_receipt_local_time: u64,
        gm_rate_ratio: f64,
    ) -> AdjustOutcome {
        let mut outcome = AdjustOutcome::default();
        let mut err_ns = i128::from(sync_receipt_time) - i128::from(sync_receipt_local_time);
        let dt_ns = i128::from(sync_receipt_time) - i128::from(self.previous_receipt_time);
        let threshold = i128::from(self.phase_discont_threshold_ns);
        let mut freq_change = false;
        let mut phase_change = false;

        let computed = loop {
            match self.state {
                PllState::Unlocked => {
                    tracing::info!(
                        instance = self.instance_index,
                        domain = self.domain,
                        "PLL unlocked"
                    );
                    self.freq_stats.reset();
                    self.diff_stats.reset();
                    self.state = PllState::Locking;
                }
                PllState::Locking => {
                    let estimate =
                        self.estimate_ppb(sync_receipt_local_time, dt_ns, gm_rate_ratio);
                    let Some(ppb) = estimate else {
                        break None;
                    };
                    if ppb.abs() > i128::from(MAX_FREQ_PPB) {
                        tracing::error!(domain = self.domain, "invalid ratio: {} ppb", ppb);
                        break None;
                    }
                    if err_ns.abs() > threshold {
                        tracing::info!(
                            domain = self.domain,
                            "initial adjustment, offset: {} ns, freq_adjust: {} ppb",
                            err_ns,
                            ppb
                        );
                        let step = saturate_i64(err_ns);
                        if let Err(e) = clocks.set_offset(self.clock, step) {
                            tracing::warn!(
                                domain = self.domain,
                                "failed to step target clock: {}",
                                e
                            );
                        }
                        outcome.phase_step_ns = Some(step);
                        err_ns = 0;
                        phase_change = true;
                    }
                    self.integral = (ppb + NS_PER_SEC) * KI;
                    self.state = PllState::Locked;
                    break Some((ppb, 0));
                }
                PllState::Locked => {
                    if err_ns.abs() > threshold {
                        self.unlock_count += 1;
                        outcome.unlocked = true;
                        self.state = PllState::Unlocked;
                        continue;
                    }
                    if dt_ns <= 0 {
                        tracing::warn!(
                            domain = self.domain,
                            "non-increasing sync receipt time, sample ignored"
                        );
                        break None;
                    }
                    let err = err_ns * NS_PER_SEC / dt_ns;
                    self.integral += (err + self.previous_err) / 2;
                    let ppb = err / KP + self.integral / KI - NS_PER_SEC;
                    break Some((ppb, err));
                }
            }
        };

        if let Some((ppb, err)) = computed {
            let ppb = saturate_i64(ppb);
            if ppb != self.last_ppb {
                if let Err(e) = clocks.set_freq(self.clock, ppb) {
                    tracing::warn!(
                        domain = self.domain,
                        "failed to set target clock frequency: {}",
                        e
                    );
                }
                freq_change = true;
                self.last_ppb = ppb;
                outcome.freq_ppb = Some(ppb);
            }
            self.previous_err = err;
            tracing::debug!(
                domain = self.domain,
                "err: {} dt: {} err_ppb: {} integral_ppb: {} ppb: {}",
                err_ns,
                dt_ns,
                err / KP,
                self.integral / KI - NS_PER_SEC,
                ppb
            );
            self.freq_stats.update(ppb);
            self.diff_stats.update(saturate_i64(err_ns));
        }

        self.freq_change = freq_change;
        self.phase_change = phase_change;
        self.previous_receipt_time = sync_receipt_time;
        self.previous_receipt_local_time = sync_receipt_local_time;

        if freq_change && self.mode.hw_ratio {
            local.rate_ratio_adjustment = 1.0 + ppb_to_f64(self.last_ppb) / 1.0e9;
        }
        if phase_change && self.mode.hw_offset {
            local.phase_discont = local.phase_discont.wrapping_add(1);
        }
        outcome
    }

    /// Initial frequency estimate for the locking phase.
    fn estimate_ppb(
        &self,
        sync_receipt_local_time: u64,
        dt_ns: i128,
        gm_rate_ratio: f64,
    ) -> Option<i128> {
        if self.mode.is_software() {
            // Local clock untouched, the relayed ratio is usable as is.
            return Some(ratio_to_ppb(gm_rate_ratio));
        }
        // Measured rate depends on the applied rate; wait for a quiet sample.
        if self.freq_change || (self.mode.hw_offset && self.phase_change) {
            return None;
        }
        if sync_receipt_local_time <= self.previous_receipt_local_time {
            tracing::error!(
                domain = self.domain,
                "invalid local sync receipt time, check local clock"
            );
            return None;
        }
        let dt_local = i128::from(sync_receipt_local_time - self.previous_receipt_local_time);
        let ratio = dt_ns * NS_PER_SEC / dt_local;
        Some(ratio - NS_PER_SEC + i128::from(self.last_ppb))
    }

    /// Log frequency and offset statistics and reset them.
    pub fn dump_stats(&mut self) {
        tracing::info!(
            instance = self.instance_index,
            domain = self.domain,
            "target clock statistics"
        );
        self.freq_stats.dump();
        self.diff_stats.dump();
    }
}

#[allow(clippy::cast_possible_truncation, reason = "value is clamped first")]
fn saturate_i64(v: i128) -> i64 {
    v.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[allow(clippy::cast_possible_truncation, reason = "bounded by the ppb sanity check")]
fn ratio_to_ppb(ratio: f64) -> i128 {
    (1.0e9 * (ratio - 1.0)) as i128
}

#[allow(clippy::cast_precision_loss, reason = "ppb well inside f64 mantissa")]
fn ppb_to_f64(ppb: i64) -> f64 {
    ppb as f64
}

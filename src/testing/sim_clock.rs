//! Simulated clocks with configurable drift

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clock::{AdjustMode, ClockId, ClockInterface};
use crate::error::{GptpError, Result};

#[derive(Debug, Clone, Copy)]
struct Oscillator {
    time_ns: f64,
    drift_ppb: f64,
    freq_ppb: i64,
}

impl Oscillator {
    fn advance(&mut self, dt_ns: u64) {
        #[allow(clippy::cast_precision_loss, reason = "simulation time")]
        let dt = dt_ns as f64;
        #[allow(clippy::cast_precision_loss, reason = "ppb fits f64")]
        let freq = self.freq_ppb as f64;
        self.time_ns += dt * (1.0 + (self.drift_ppb + freq) * 1e-9);
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "simulation keeps time positive"
    )]
    fn now(&self) -> u64 {
        self.time_ns.max(0.0) as u64
    }
}

#[derive(Debug)]
struct SimState {
    oscillators: HashMap<ClockId, Oscillator>,
    mode: AdjustMode,
    offset_steps: u32,
    fail: bool,
}

impl SimState {
    /// Hardware mode steers the local oscillator itself.
    fn resolve(&self, id: ClockId) -> ClockId {
        match id {
            ClockId::Target(_) if self.mode.hw_ratio => ClockId::Local,
            other => other,
        }
    }

    fn oscillator(&mut self, id: ClockId) -> &mut Oscillator {
        let id = self.resolve(id);
        let local = self.oscillators.get(&ClockId::Local).copied();
        self.oscillators.entry(id).or_insert_with(|| {
            let mut osc = local.unwrap_or(Oscillator {
                time_ns: 0.0,
                drift_ppb: 0.0,
                freq_ppb: 0,
            });
            osc.freq_ppb = 0;
            osc
        })
    }
}

/// Set of simulated oscillators shared between the engine and the test
/// harness.
///
/// Target clocks are created on first use as a copy of the local clock.
/// Cloning yields another handle on the same oscillators.
#[derive(Debug, Clone)]
pub struct SimClock {
    inner: Arc<Mutex<SimState>>,
}

impl SimClock {
    /// All clocks start at `start_ns` with no drift.
    #[must_use]
    pub fn new(start_ns: u64) -> Self {
        #[allow(clippy::cast_precision_loss, reason = "simulation time")]
        let time_ns = start_ns as f64;
        let base = Oscillator {
            time_ns,
            drift_ppb: 0.0,
            freq_ppb: 0,
        };
        let mut oscillators = HashMap::new();
        oscillators.insert(ClockId::Local, base);
        oscillators.insert(ClockId::Monotonic, base);
        Self {
            inner: Arc::new(Mutex::new(SimState {
                oscillators,
                mode: AdjustMode::SOFTWARE,
                offset_steps: 0,
                fail: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give the local oscillator (and clocks derived from it later) a drift.
    #[must_use]
    pub fn with_drift(self, ppb: f64) -> Self {
        self.state().oscillator(ClockId::Local).drift_ppb = ppb;
        self
    }

    /// Select how target adjustments reach the local clock.
    #[must_use]
    pub fn with_mode(self, mode: AdjustMode) -> Self {
        self.state().mode = mode;
        self
    }

    /// Make every subsequent clock call fail.
    pub fn set_failing(&self, fail: bool) {
        self.state().fail = fail;
    }

    /// Advance true time by `dt_ns`.
    pub fn advance(&self, dt_ns: u64) {
        let mut state = self.state();
        for osc in state.oscillators.values_mut() {
            osc.advance(dt_ns);
        }
    }

    /// Current reading of `id`.
    #[must_use]
    pub fn time_of(&self, id: ClockId) -> u64 {
        self.state().oscillator(id).now()
    }

    /// Frequency offset last written to `id`.
    #[must_use]
    pub fn freq_of(&self, id: ClockId) -> i64 {
        self.state().oscillator(id).freq_ppb
    }

    /// Shift `id` by `ns` without counting it as an adjustment.
    pub fn jump(&self, id: ClockId, ns: i64) {
        #[allow(clippy::cast_precision_loss, reason = "simulation time")]
        let delta = ns as f64;
        self.state().oscillator(id).time_ns += delta;
    }

    /// Number of `set_offset` calls seen.
    #[must_use]
    pub fn offset_steps(&self) -> u32 {
        self.state().offset_steps
    }

    fn check(&self) -> Result<()> {
        if self.state().fail {
            return Err(GptpError::Clock {
                message: "simulated clock failure".to_string(),
            });
        }
        Ok(())
    }
}

impl ClockInterface for SimClock {
    fn now(&self, id: ClockId) -> Result<u64> {
        self.check()?;
        Ok(self.time_of(id))
    }

    fn set_time(&mut self, id: ClockId, ns: u64) -> Result<()> {
        self.check()?;
        #[allow(clippy::cast_precision_loss, reason = "simulation time")]
        let time_ns = ns as f64;
        self.state().oscillator(id).time_ns = time_ns;
        Ok(())
    }

    fn set_freq(&mut self, id: ClockId, ppb: i64) -> Result<()> {
        self.check()?;
        self.state().oscillator(id).freq_ppb = ppb;
        Ok(())
    }

    fn set_offset(&mut self, id: ClockId, ns: i64) -> Result<()> {
        self.check()?;
        let mut state = self.state();
        state.offset_steps += 1;
        #[allow(clippy::cast_precision_loss, reason = "simulation time")]
        let delta = ns as f64;
        state.oscillator(id).time_ns += delta;
        Ok(())
    }

    fn adjust_mode(&self, _id: ClockId) -> AdjustMode {
        self.state().mode
    }

    fn convert(&self, from: ClockId, ns: u64, to: ClockId) -> Result<u64> {
        self.check()?;
        let mut state = self.state();
        let from_now = state.oscillator(from).time_ns;
        let to_now = state.oscillator(to).time_ns;
        #[allow(clippy::cast_precision_loss, reason = "simulation time")]
        let ns = ns as f64;
        let converted = Oscillator {
            time_ns: to_now + (ns - from_now),
            drift_ppb: 0.0,
            freq_ppb: 0,
        };
        Ok(converted.now())
    }
}

use serde::{Deserialize, Serialize};

/// Smoothing applied to a stream of samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterKind {
    /// Pass samples through unchanged
    Identity,
    /// Sliding-window arithmetic mean
    Mean {
        /// Number of samples in the window
        window: usize,
    },
    /// Exponential decay: `mean = mean * (1 - coef) + coef * val`
    ExpDecay {
        /// Decay coefficient in `(0, 1]`
        coef: f64,
    },
    /// Finite impulse response over the given taps (newest sample first)
    Fir {
        /// Filter coefficients
        taps: Vec<f64>,
    },
}

impl Default for FilterKind {
    fn default() -> Self {
        Self::ExpDecay { coef: 0.125 }
    }
}

/// `1 - exp(-1/M)` for M = 1, 2, 4 .. 32. A past sample's weight drops to
/// 1/e after M further samples.
const EXP_COEF_TABLE: [f64; 6] = [
    0.632_120_558_8,
    0.393_469_340_3,
    0.221_199_216_9,
    0.117_503_097_4,
    0.060_586_937_2,
    0.030_766_765_5,
];

const EXP_DIVISOR_MAX: f64 = 64.0;

#[derive(Debug, Clone)]
enum State {
    Identity,
    Mean {
        samples: Vec<f64>,
        pos: usize,
        count: usize,
        mean: f64,
    },
    ExpDecay {
        coef: f64,
        divisor: f64,
        count: u32,
        mean: f64,
    },
    Fir {
        taps: Vec<f64>,
        taps_sum: f64,
        samples: Vec<f64>,
        pos: usize,
        count: usize,
    },
}

/// A stateful sample filter.
#[derive(Debug, Clone)]
pub struct Filter {
    kind: FilterKind,
    state: State,
}

impl Filter {
    /// Build a filter of the given kind.
    #[must_use]
    pub fn new(kind: FilterKind) -> Self {
        let state = Self::initial_state(&kind);
        Self { kind, state }
    }

    /// Kind this filter was built from.
    #[must_use]
    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    /// Feed one sample and return the filtered value.
    pub fn apply(&mut self, val: f64) -> f64 {
        match &mut self.state {
            State::Identity => val,
            State::Mean {
                samples,
                pos,
                count,
                mean,
            } => {
                let size = samples.len();
                let total = *mean * (*count as f64) - samples[*pos] + val;
                if *count < size {
                    *count += 1;
                }
                samples[*pos] = val;
                *pos = (*pos + 1) % size;
                *mean = total / (*count as f64);
                *mean
            }
            State::ExpDecay {
                coef,
                divisor,
                count,
                mean,
            } => {
                // Cumulative mean until `divisor` samples have been seen.
                if f64::from(*count) <= *divisor {
                    *mean = (f64::from(*count - 1) * *mean + val) / f64::from(*count);
                    *count += 1;
                } else {
                    *mean = *mean * (1.0 - *coef) + *coef * val;
                }
                *mean
            }
            State::Fir {
                taps,
                taps_sum,
                samples,
                pos,
                count,
            } => {
                let size = taps.len();
                samples[*pos] = val;
                let newest = *pos;
                *pos = (*pos + 1) % size;
                if *count < size {
                    *count += 1;
                    return val;
                }
                let mut acc = 0.0;
                for (i, tap) in taps.iter().enumerate() {
                    let idx = (newest + size - i) % size;
                    acc += tap * samples[idx];
                }
                acc / *taps_sum
            }
        }
    }

    /// Drop all history.
    pub fn reset(&mut self) {
        self.state = Self::initial_state(&self.kind);
    }

    fn initial_state(kind: &FilterKind) -> State {
        match kind {
            FilterKind::Identity => State::Identity,
            FilterKind::Mean { window } => {
                let window = (*window).max(1);
                State::Mean {
                    samples: vec![0.0; window],
                    pos: 0,
                    count: 0,
                    mean: 0.0,
                }
            }
            FilterKind::ExpDecay { coef } => {
                let coef = if *coef > 1.0 || *coef <= 0.0 {
                    tracing::warn!("exp-decay coefficient {} out of (0, 1], using 1", coef);
                    1.0
                } else {
                    *coef
                };
                let divisor = EXP_COEF_TABLE
                    .iter()
                    .position(|threshold| coef > *threshold)
                    .map_or(EXP_DIVISOR_MAX, |i| f64::from(1u32 << i));
                State::ExpDecay {
                    coef,
                    divisor,
                    count: 1,
                    mean: 0.0,
                }
            }
            FilterKind::Fir { taps } => {
                let taps = if taps.is_empty() { vec![1.0] } else { taps.clone() };
                let taps_sum: f64 = taps.iter().sum();
                let taps_sum = if taps_sum == 0.0 { 1.0 } else { taps_sum };
                State::Fir {
                    samples: vec![0.0; taps.len()],
                    taps,
                    taps_sum,
                    pos: 0,
                    count: 0,
                }
            }
        }
    }

    /// Power-of-two divisor used by an exponential-decay filter.
    #[must_use]
    pub fn exp_divisor(&self) -> Option<f64> {
        match self.state {
            State::ExpDecay { divisor, .. } => Some(divisor),
            _ => None,
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(FilterKind::default())
    }
}

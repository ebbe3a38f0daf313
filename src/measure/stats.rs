use std::fmt;

/// Snapshot of a [`Stats`] accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSummary {
    /// Number of samples
    pub count: u64,
    /// Smallest sample
    pub min: i64,
    /// Arithmetic mean
    pub mean: f64,
    /// Largest sample
    pub max: i64,
    /// Population variance
    pub variance: f64,
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min {} mean {:.1} max {} rms^2 {:.1} (n = {})",
            self.min, self.mean, self.max, self.variance, self.count
        )
    }
}

/// Running min / mean / max / variance over integer samples.
#[derive(Debug, Clone)]
pub struct Stats {
    name: &'static str,
    count: u64,
    min: i64,
    max: i64,
    sum: i128,
    sum_sq: u128,
}

impl Stats {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            count: 0,
            min: i64::MAX,
            max: i64::MIN,
            sum: 0,
            sum_sq: 0,
        }
    }

    /// Label used when the summary is logged.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of samples since the last reset.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Add one sample.
    pub fn update(&mut self, value: i64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += i128::from(value);
        self.sum_sq = self
            .sum_sq
            .saturating_add(u128::from(value.unsigned_abs()).pow(2));
    }

    /// Summarize the samples so far, `None` when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "statistics are reported as f64")]
    pub fn compute(&self) -> Option<StatsSummary> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        let mean = self.sum as f64 / n;
        let variance = (self.sum_sq as f64 / n - mean * mean).max(0.0);
        Some(StatsSummary {
            count: self.count,
            min: self.min,
            mean,
            max: self.max,
            variance,
        })
    }

    /// Log the current summary at info level and start over.
    pub fn dump(&mut self) -> Option<StatsSummary> {
        let summary = self.compute();
        if let Some(s) = &summary {
            tracing::info!("{}: {}", self.name, s);
        }
        self.reset();
        summary
    }

    /// Discard all samples.
    pub fn reset(&mut self) {
        *self = Self::new(self.name);
    }
}

//! Light-curve series model
//!
//! A light curve is a pair of equal-length vectors: observation times in
//! days and normalized flux. Raw and cleaned series share the same type;
//! cleaning always produces a new value. Folding at a trial period is the
//! primitive every detector and vetting test builds on.

use serde::{Deserialize, Serialize};

/// Time series of brightness measurements for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurve {
    /// Observation times in days
    pub time: Vec<f64>,
    /// Normalized flux (1.0 = baseline brightness)
    pub flux: Vec<f64>,
}

impl LightCurve {
    /// Build a series from parallel time/flux vectors.
    ///
    /// Lengths must match; mismatch is a programming error upstream.
    pub fn new(time: Vec<f64>, flux: Vec<f64>) -> Self {
        debug_assert_eq!(time.len(), flux.len());
        LightCurve { time, flux }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Fold the series at `period_days` around `epoch_days`.
    ///
    /// Output phase is in days, wrapped to `[-period/2, period/2)`, sorted
    /// ascending. Each sample also carries its orbit cycle index
    /// (`round((t - epoch) / period)`) so callers can separate odd and
    /// even transits.
    pub fn fold(&self, period_days: f64, epoch_days: f64) -> FoldedCurve {
        let half = period_days / 2.0;
        let mut samples: Vec<(f64, f64, i64)> = self
            .time
            .iter()
            .zip(self.flux.iter())
            .map(|(&t, &f)| {
                let rel = t - epoch_days;
                let phase = (rel + half).rem_euclid(period_days) - half;
                let cycle = (rel / period_days).round() as i64;
                (phase, f, cycle)
            })
            .collect();
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut folded = FoldedCurve {
            phase: Vec::with_capacity(samples.len()),
            flux: Vec::with_capacity(samples.len()),
            cycle: Vec::with_capacity(samples.len()),
        };
        for (p, f, c) in samples {
            folded.phase.push(p);
            folded.flux.push(f);
            folded.cycle.push(c);
        }
        folded
    }
}

/// A light curve folded at a trial period, sorted by phase
#[derive(Debug, Clone)]
pub struct FoldedCurve {
    /// Phase offset from epoch in days, in `[-period/2, period/2)`
    pub phase: Vec<f64>,
    pub flux: Vec<f64>,
    /// Orbit cycle index of each sample
    pub cycle: Vec<i64>,
}

impl FoldedCurve {
    pub fn len(&self) -> usize {
        self.phase.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phase.is_empty()
    }
}

/// Median of a slice; 0.0 for an empty slice
pub fn median(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation of a slice; 0.0 for fewer than two samples
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// Arithmetic mean of a slice; 0.0 for an empty slice
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

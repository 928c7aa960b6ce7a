//! Transit detection estimators
//!
//! Two box-fit estimators over a cleaned series. [`BoxSearch`] is the
//! fast first pass: a coarse period grid, phase-binned box fitting, an
//! SNR-like power statistic thresholded directly. [`RefinedSearch`] runs
//! a denser grid and judges the peak by its signal detection efficiency
//! (SDE), how far the best power stands above the grid's own
//! distribution. The pipeline runs the refined pass only on targets the
//! fast pass already flagged.

use serde::{Deserialize, Serialize};
use tracing::debug;

use starsweep_common::config::DetectionConfig;
use starsweep_common::series::{mean, std_dev, LightCurve};
use starsweep_common::Result;

/// Best-fit transit geometry from an estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitParams {
    pub period_days: f64,
    /// Transit center time, normalized near the start of the series
    pub epoch: f64,
    pub duration_days: f64,
}

/// One estimator's verdict on a series
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Detection {
    pub params: TransitParams,
    /// Fractional dip of the fitted box
    pub depth: f64,
    /// The estimator's own strength statistic (power for the fast pass,
    /// SDE for the refined pass)
    pub power: f64,
    pub significant: bool,
}

/// A transit estimator. Returns `Ok(None)` when the series cannot be
/// searched at all (too short, no valid fit window); a detection with
/// `significant = false` means the search ran and found nothing.
pub trait TransitDetector: Send + Sync {
    fn detect(&self, series: &LightCurve) -> Result<Option<Detection>>;
}

/// Phase bins for the fast scan
const FAST_BINS: usize = 200;
/// Phase bins for the refined scan
const REFINED_BINS: usize = 300;
/// Trial durations as fractions of the trial period
const FAST_DURATIONS: &[f64] = &[0.01, 0.02, 0.04, 0.07, 0.10];
const REFINED_DURATIONS: &[f64] = &[0.008, 0.012, 0.017, 0.025, 0.035, 0.05, 0.07, 0.10];

/// Best box fit at one trial period
#[derive(Debug, Clone, Copy)]
struct PeriodFit {
    power: f64,
    depth: f64,
    phase_center: f64,
    duration_days: f64,
}

/// Fast box-least-squares estimator
pub struct BoxSearch {
    config: DetectionConfig,
}

impl BoxSearch {
    pub fn new(config: DetectionConfig) -> Self {
        BoxSearch { config }
    }
}

impl TransitDetector for BoxSearch {
    fn detect(&self, series: &LightCurve) -> Result<Option<Detection>> {
        if series.len() < self.config.min_points {
            return Ok(None);
        }

        let sigma = std_dev(&series.flux).max(1e-10);
        let grid = period_grid(
            self.config.min_period_days,
            self.config.max_period_days,
            self.config.period_steps,
        );

        let mut best: Option<(f64, PeriodFit)> = None;
        for period in grid {
            if let Some(fit) = scan_period(series, period, FAST_BINS, FAST_DURATIONS, sigma) {
                if best.map_or(true, |(_, b)| fit.power > b.power) {
                    best = Some((period, fit));
                }
            }
        }

        let (period, fit) = match best {
            Some(found) => found,
            None => return Ok(None),
        };

        let significant = fit.power > self.config.power_threshold
            && fit.depth > 0.0
            && fit.depth < self.config.max_depth;
        debug!(
            period_days = period,
            power = fit.power,
            depth = fit.depth,
            significant,
            "Box search complete"
        );

        Ok(Some(Detection {
            params: TransitParams {
                period_days: period,
                epoch: normalize_epoch(fit.phase_center, period, &series.time),
                duration_days: fit.duration_days,
            },
            depth: fit.depth,
            power: fit.power,
            significant,
        }))
    }
}

/// Dense-grid estimator judged by signal detection efficiency
pub struct RefinedSearch {
    config: DetectionConfig,
}

impl RefinedSearch {
    pub fn new(config: DetectionConfig) -> Self {
        RefinedSearch { config }
    }
}

impl TransitDetector for RefinedSearch {
    fn detect(&self, series: &LightCurve) -> Result<Option<Detection>> {
        if series.len() < self.config.min_points {
            return Ok(None);
        }

        let sigma = std_dev(&series.flux).max(1e-10);
        let grid = period_grid(
            self.config.min_period_days,
            self.config.max_period_days,
            self.config.refined_steps,
        );

        let mut powers = Vec::with_capacity(grid.len());
        let mut best: Option<(f64, PeriodFit)> = None;
        for period in grid {
            let fit = match scan_period(series, period, REFINED_BINS, REFINED_DURATIONS, sigma) {
                Some(fit) => fit,
                None => continue,
            };
            powers.push(fit.power);
            if best.map_or(true, |(_, b)| fit.power > b.power) {
                best = Some((period, fit));
            }
        }

        let (period, fit) = match best {
            Some(found) => found,
            None => return Ok(None),
        };

        // SDE: peak power against the grid's own power distribution
        let spread = std_dev(&powers).max(1e-10);
        let sde = (fit.power - mean(&powers)) / spread;
        let significant =
            sde > self.config.sde_threshold && fit.depth > 0.0 && fit.depth < self.config.max_depth;
        debug!(period_days = period, sde, depth = fit.depth, significant, "Refined search complete");

        Ok(Some(Detection {
            params: TransitParams {
                period_days: period,
                epoch: normalize_epoch(fit.phase_center, period, &series.time),
                duration_days: fit.duration_days,
            },
            depth: fit.depth,
            power: sde,
            significant,
        }))
    }
}

/// Evenly spaced trial periods over `[min, max]`
fn period_grid(min: f64, max: f64, steps: usize) -> Vec<f64> {
    if steps < 2 {
        return vec![min];
    }
    let step = (max - min) / (steps - 1) as f64;
    (0..steps).map(|i| min + i as f64 * step).collect()
}

/// Fit boxes of several widths at every phase offset for one trial
/// period. Returns the strongest dip, or `None` when no window had
/// enough samples on both sides.
fn scan_period(
    series: &LightCurve,
    period: f64,
    bins: usize,
    durations: &[f64],
    sigma: f64,
) -> Option<PeriodFit> {
    let n = series.len();
    let mut bin_sum = vec![0.0f64; bins];
    let mut bin_count = vec![0usize; bins];

    for i in 0..n {
        let phase = series.time[i].rem_euclid(period) / period;
        let b = ((phase * bins as f64) as usize).min(bins - 1);
        bin_sum[b] += series.flux[i];
        bin_count[b] += 1;
    }

    let total_sum: f64 = bin_sum.iter().sum();
    let total_count: usize = bin_count.iter().sum();

    let mut best: Option<PeriodFit> = None;
    for &q in durations {
        let width = ((q * bins as f64).round() as usize).max(1);
        if width >= bins {
            continue;
        }

        // Circular window sums
        let mut window_sum: f64 = bin_sum[..width].iter().sum();
        let mut window_count: usize = bin_count[..width].iter().sum();
        for start in 0..bins {
            let in_count = window_count;
            let out_count = total_count - in_count;
            if in_count >= 3 && out_count >= 3 {
                let mean_in = window_sum / in_count as f64;
                let mean_out = (total_sum - window_sum) / out_count as f64;
                let depth = mean_out - mean_in;
                if depth > 0.0 {
                    let power = depth * (in_count as f64).sqrt() / sigma;
                    if best.map_or(true, |b| power > b.power) {
                        best = Some(PeriodFit {
                            power,
                            depth,
                            phase_center: (start as f64 + width as f64 / 2.0) / bins as f64
                                * period,
                            duration_days: width as f64 / bins as f64 * period,
                        });
                    }
                }
            }

            // Slide: drop the leading bin, append the next one (wrapping)
            let leading = start;
            let trailing = (start + width) % bins;
            window_sum += bin_sum[trailing] - bin_sum[leading];
            window_count = window_count + bin_count[trailing] - bin_count[leading];
        }
    }
    best
}

/// Shift a phase-space transit center to an absolute time near the start
/// of the series
fn normalize_epoch(phase_center: f64, period: f64, time: &[f64]) -> f64 {
    let t_min = time.first().copied().unwrap_or(0.0);
    let mut epoch = phase_center + (t_min / period).floor() * period;
    if epoch < t_min {
        epoch += period;
    }
    epoch
}

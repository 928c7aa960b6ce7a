//! Acquisition and preparation boundary
//!
//! The survey core never talks to an archive directly. It sees two
//! seams: a [`LightCurveSource`] that either produces a raw series or
//! says "no data", and a [`SeriesCleaner`] that turns a raw series into
//! something a detector can search. Implementations own their retries,
//! rate limits and failure handling; transient trouble surfaces as
//! `Ok(None)`, never as a hang or a crash of the survey loop.

use starsweep_common::series::{median, std_dev, LightCurve};
use starsweep_common::{Result, TargetId};

/// Produces raw observations for a target.
///
/// `Ok(None)` means the target has no usable data, which the pipeline
/// memoizes in the tracker. Implementations must bound their own
/// retries; an `Err` escaping this boundary is treated as unexpected
/// and leaves the target eligible for a later retry.
#[async_trait::async_trait]
pub trait LightCurveSource: Send + Sync {
    async fn acquire(&self, target: &TargetId) -> Result<Option<LightCurve>>;
}

/// Turns a raw series into a detrended, normalized one.
///
/// Returns `None` when too little usable series remains, which the
/// pipeline records as a processing failure.
pub trait SeriesCleaner: Send + Sync {
    fn clean(&self, raw: &LightCurve) -> Option<LightCurve>;
}

/// Standard cleaning chain: drop non-finite samples, normalize to the
/// median, clip upward outliers (flares) while keeping every dip, then
/// remove slow trends with a moving median wide enough to pass transits
/// through untouched.
pub struct DetrendCleaner {
    /// Minimum samples that must survive cleaning
    min_points: usize,
    /// Detrend window in days; must exceed any transit duration
    window_days: f64,
}

impl DetrendCleaner {
    pub fn new(min_points: usize) -> Self {
        DetrendCleaner { min_points, window_days: 1.4 }
    }
}

impl SeriesCleaner for DetrendCleaner {
    fn clean(&self, raw: &LightCurve) -> Option<LightCurve> {
        // 1. Drop non-finite samples
        let mut time = Vec::with_capacity(raw.len());
        let mut flux = Vec::with_capacity(raw.len());
        for i in 0..raw.len() {
            if raw.time[i].is_finite() && raw.flux[i].is_finite() {
                time.push(raw.time[i]);
                flux.push(raw.flux[i]);
            }
        }
        if time.len() < self.min_points {
            return None;
        }

        // 2. Normalize to the median level
        let level = median(&flux);
        if level <= 0.0 {
            return None;
        }
        for f in &mut flux {
            *f /= level;
        }

        // 3. Upper sigma clip only; dips are the signal
        let m = median(&flux);
        let s = std_dev(&flux);
        let ceiling = m + 3.0 * s;
        let mut kept_time = Vec::with_capacity(time.len());
        let mut kept_flux = Vec::with_capacity(flux.len());
        for i in 0..time.len() {
            if flux[i] <= ceiling {
                kept_time.push(time[i]);
                kept_flux.push(flux[i]);
            }
        }
        if kept_time.len() < self.min_points {
            return None;
        }

        // 4. Divide out the moving-median trend
        let window = self.window_samples(&kept_time);
        let trend = moving_median(&kept_flux, window);
        for i in 0..kept_flux.len() {
            if trend[i] > 0.0 {
                kept_flux[i] /= trend[i];
            }
        }

        Some(LightCurve::new(kept_time, kept_flux))
    }
}

impl DetrendCleaner {
    /// Odd window length covering `window_days` at the series cadence
    fn window_samples(&self, time: &[f64]) -> usize {
        let mut diffs: Vec<f64> = time.windows(2).map(|w| w[1] - w[0]).collect();
        diffs.retain(|d| *d > 0.0);
        let cadence = if diffs.is_empty() { 0.02 } else { median(&diffs) };
        let mut window = (self.window_days / cadence).round() as usize;
        if window % 2 == 0 {
            window += 1;
        }
        window.clamp(5, time.len())
    }
}

/// Centered moving median, window truncated at the edges
fn moving_median(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    let n = values.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(n);
        out.push(median(&values[lo..hi]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize, f: impl Fn(usize) -> f64) -> LightCurve {
        let time: Vec<f64> = (0..n).map(|i| i as f64 * 0.02).collect();
        let flux: Vec<f64> = (0..n).map(f).collect();
        LightCurve::new(time, flux)
    }

    #[test]
    fn drops_non_finite_samples() {
        let cleaner = DetrendCleaner::new(100);
        let raw = series(300, |i| if i % 30 == 0 { f64::NAN } else { 1000.0 });
        let clean = cleaner.clean(&raw).unwrap();
        assert_eq!(clean.len(), 290);
        assert!(clean.flux.iter().all(|f| f.is_finite()));
    }

    #[test]
    fn normalizes_to_unity() {
        let cleaner = DetrendCleaner::new(100);
        let raw = series(300, |_| 12345.0);
        let clean = cleaner.clean(&raw).unwrap();
        assert!(clean.flux.iter().all(|f| (f - 1.0).abs() < 1e-9));
    }

    #[test]
    fn clips_flares_but_keeps_dips() {
        let cleaner = DetrendCleaner::new(100);
        let raw = series(500, |i| {
            if (100..105).contains(&i) {
                1100.0
            } else if (300..310).contains(&i) {
                990.0
            } else {
                1000.0
            }
        });
        let clean = cleaner.clean(&raw).unwrap();
        // Flare samples removed
        assert!(clean.len() < 500);
        // The dip survives
        let min = clean.flux.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(min < 0.995, "dip was clipped away, min {}", min);
    }

    #[test]
    fn removes_slow_trends() {
        let cleaner = DetrendCleaner::new(100);
        // 1% amplitude sinusoid over ~6 day period
        let raw = series(1000, |i| {
            let t = i as f64 * 0.02;
            1000.0 * (1.0 + 0.01 * (t / 6.0 * std::f64::consts::TAU).sin())
        });
        let clean = cleaner.clean(&raw).unwrap();
        let spread = std_dev(&clean.flux);
        assert!(spread < 0.004, "trend left residual spread {}", spread);
    }

    #[test]
    fn too_short_series_is_rejected() {
        let cleaner = DetrendCleaner::new(100);
        let raw = series(50, |_| 1000.0);
        assert!(cleaner.clean(&raw).is_none());
    }
}

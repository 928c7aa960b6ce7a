//! Candidate vetting battery
//!
//! Four independent tests that separate planet transits from the false
//! positives a box search loves, above all eclipsing binaries. A
//! candidate must pass every test; every failing test is reported, not
//! just the first. Each test auto-passes when it cannot be evaluated
//! (too few samples, degenerate inputs) so vetting never blocks
//! acceptance for lack of evidence; rejection always has a stated reason.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use starsweep_common::config::VettingConfig;
use starsweep_common::series::{median, std_dev, LightCurve};

use crate::detect::TransitParams;

/// Result of the full battery for one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VettingOutcome {
    pub passed: bool,
    /// One entry per failing test, in battery order
    pub reasons: Vec<String>,
    /// Computed metric per test, keyed by test name
    pub metrics: HashMap<String, f64>,
}

/// Pure vetting engine; one instance per survey, shared freely
pub struct Vetter {
    config: VettingConfig,
}

impl Vetter {
    pub fn new(config: VettingConfig) -> Self {
        Vetter { config }
    }

    /// Run all four tests and combine them
    pub fn vet(&self, series: &LightCurve, params: &TransitParams) -> VettingOutcome {
        let mut reasons = Vec::new();
        let mut metrics = HashMap::new();

        if !params.period_days.is_finite()
            || !params.epoch.is_finite()
            || !params.duration_days.is_finite()
            || params.period_days <= 0.0
        {
            warn!(
                period_days = params.period_days,
                duration_days = params.duration_days,
                "Vetting got degenerate transit parameters, passing by default"
            );
            for key in ["odd_even_diff", "shape_metric", "secondary_depth", "depth_duration_ratio"]
            {
                metrics.insert(key.to_string(), 0.0);
            }
            return VettingOutcome { passed: true, reasons, metrics };
        }

        let (balance_pass, balance_metric) = self.odd_even_test(series, params);
        metrics.insert("odd_even_diff".to_string(), balance_metric);
        if !balance_pass {
            reasons.push(format!("Odd/Even mismatch ({:.3})", balance_metric));
        }

        let (shape_pass, shape_metric) = self.shape_test(series, params);
        metrics.insert("shape_metric".to_string(), shape_metric);
        if !shape_pass {
            reasons.push(format!("V-shaped transit (binary-like, metric={:.3})", shape_metric));
        }

        let (secondary_pass, secondary_metric) = self.secondary_eclipse_test(series, params);
        metrics.insert("secondary_depth".to_string(), secondary_metric);
        if !secondary_pass {
            reasons.push(format!("Secondary eclipse detected ({:.4})", secondary_metric));
        }

        let (ratio_pass, ratio_metric) = self.depth_duration_ratio_test(series, params);
        metrics.insert("depth_duration_ratio".to_string(), ratio_metric);
        if !ratio_pass {
            reasons.push(format!("Unusual depth/duration ratio ({:.3})", ratio_metric));
        }

        let passed = reasons.is_empty();
        debug!(passed, failures = reasons.len(), "Vetting battery complete");
        VettingOutcome { passed, reasons, metrics }
    }

    /// Balance test: a true single-period transit dips equally on odd and
    /// even orbits. A double-eclipsing binary folded at half its real
    /// period shows two different depths.
    fn odd_even_test(&self, series: &LightCurve, params: &TransitParams) -> (bool, f64) {
        let folded = series.fold(params.period_days, params.epoch);
        let half_window = 0.5 * params.duration_days;

        let mut odd_depths = Vec::new();
        let mut even_depths = Vec::new();
        for i in 0..folded.len() {
            if folded.phase[i].abs() < half_window {
                let dip = 1.0 - folded.flux[i];
                if folded.cycle[i].rem_euclid(2) == 1 {
                    odd_depths.push(dip);
                } else {
                    even_depths.push(dip);
                }
            }
        }

        if odd_depths.len() < 5 || even_depths.len() < 5 {
            return (true, 0.0);
        }

        let odd_median = median(&odd_depths);
        let even_median = median(&even_depths);
        let diff = (odd_median - even_median).abs();
        let threshold = self.config.odd_even_tolerance * odd_median.abs().max(even_median.abs());

        (diff <= threshold, diff)
    }

    /// Shape test: a planet crossing a stellar disk leaves a broad flat
    /// minimum (U), a grazing binary a sharp one (V). Measures scatter of
    /// the central fifth of the in-dip window, normalized by depth.
    fn shape_test(&self, series: &LightCurve, params: &TransitParams) -> (bool, f64) {
        let folded = series.fold(params.period_days, params.epoch);
        let window = 0.6 * params.duration_days;

        // Folded output is already phase-sorted
        let transit_flux: Vec<f64> = folded
            .phase
            .iter()
            .zip(folded.flux.iter())
            .filter(|(p, _)| p.abs() < window)
            .map(|(_, &f)| f)
            .collect();

        if transit_flux.len() < 10 {
            return (true, 0.0);
        }

        let n = transit_flux.len();
        let central_start = (0.4 * n as f64) as usize;
        let central_end = (0.6 * n as f64) as usize;
        if central_end - central_start < 3 {
            return (true, 0.0);
        }

        let central_std = std_dev(&transit_flux[central_start..central_end]);
        let depth = 1.0 - transit_flux.iter().cloned().fold(f64::INFINITY, f64::min);
        if depth < 0.001 {
            return (true, 0.0);
        }

        let normalized_std = central_std / depth;
        (normalized_std < self.config.shape_threshold, normalized_std)
    }

    /// Secondary-event test: fold half a period away from the primary and
    /// look for a dip there. Planets reflect too little light to show
    /// one; a companion star does not.
    fn secondary_eclipse_test(&self, series: &LightCurve, params: &TransitParams) -> (bool, f64) {
        let secondary_epoch = params.epoch + params.period_days * 0.5;
        let folded = series.fold(params.period_days, secondary_epoch);

        let central: Vec<f64> = folded
            .phase
            .iter()
            .zip(folded.flux.iter())
            .filter(|(p, _)| p.abs() < 0.1)
            .map(|(_, &f)| f)
            .collect();
        if central.len() < 5 {
            return (true, 0.0);
        }

        let out: Vec<f64> = folded
            .phase
            .iter()
            .zip(folded.flux.iter())
            .filter(|(p, _)| p.abs() > 0.2)
            .map(|(_, &f)| f)
            .collect();

        let central_median = median(&central);
        let secondary_depth = if out.is_empty() {
            1.0 - central_median
        } else {
            median(&out) - central_median
        };

        (secondary_depth < self.config.secondary_threshold, secondary_depth)
    }

    /// Plausibility test: depth over duration must sit in a broad
    /// physical band. Deep-and-brief means grazing binary, hair-thin and
    /// day-long means noise artifact.
    fn depth_duration_ratio_test(&self, series: &LightCurve, params: &TransitParams) -> (bool, f64) {
        let folded = series.fold(params.period_days, params.epoch);
        let half_window = 0.5 * params.duration_days;

        let in_transit: Vec<f64> = folded
            .phase
            .iter()
            .zip(folded.flux.iter())
            .filter(|(p, _)| p.abs() < half_window)
            .map(|(_, &f)| f)
            .collect();
        if in_transit.len() < 3 {
            return (true, 0.0);
        }

        let depth = 1.0 - in_transit.iter().cloned().fold(f64::INFINITY, f64::min);
        let ratio = depth / params.duration_days;

        let passed = ratio > self.config.min_depth_duration_ratio
            && ratio < self.config.max_depth_duration_ratio;
        (passed, ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: f64 = 2.0;
    const DURATION: f64 = 0.2;

    fn params() -> TransitParams {
        TransitParams { period_days: PERIOD, epoch: 0.0, duration_days: DURATION }
    }

    fn vetter() -> Vetter {
        Vetter::new(VettingConfig::default())
    }

    /// Ten orbits of a box transit, 0.005 day cadence. `odd_depth` and
    /// `even_depth` set the dip per cycle parity.
    fn box_series(odd_depth: f64, even_depth: f64) -> LightCurve {
        series_with(|cycle, phase| {
            if phase.abs() < DURATION / 2.0 {
                if cycle % 2 == 1 {
                    1.0 - odd_depth
                } else {
                    1.0 - even_depth
                }
            } else {
                1.0
            }
        })
    }

    /// Build ten orbits from a (cycle, phase) -> flux function
    fn series_with(flux_at: impl Fn(i64, f64) -> f64) -> LightCurve {
        let mut time = Vec::new();
        let mut flux = Vec::new();
        let mut t = 0.0;
        while t < 10.0 * PERIOD {
            let cycle = (t / PERIOD).round() as i64;
            let phase = t - cycle as f64 * PERIOD;
            time.push(t);
            flux.push(flux_at(cycle, phase));
            t += 0.005;
        }
        LightCurve::new(time, flux)
    }

    #[test]
    fn balanced_transits_pass_everything() {
        let outcome = vetter().vet(&box_series(0.01, 0.01), &params());
        assert!(outcome.passed, "failed: {:?}", outcome.reasons);
        assert!(outcome.reasons.is_empty());
        assert!(outcome.metrics.contains_key("odd_even_diff"));
        assert!(outcome.metrics.contains_key("depth_duration_ratio"));
    }

    #[test]
    fn unbalanced_odd_even_depths_fail_the_balance_test() {
        // 20% depth difference against the default 5% tolerance
        let outcome = vetter().vet(&box_series(0.012, 0.010), &params());
        assert!(!outcome.passed);
        assert_eq!(outcome.reasons.len(), 1, "reasons: {:?}", outcome.reasons);
        assert!(outcome.reasons[0].contains("Odd/Even"));
        assert!(outcome.metrics["odd_even_diff"] > 0.0015);
    }

    #[test]
    fn narrow_v_shaped_dip_fails_the_shape_test() {
        // Dip four times narrower than the claimed duration: the central
        // fifth of the window holds the whole V, scatter is high
        let v_half_width = 0.025;
        let series = series_with(|_, phase| {
            if phase.abs() < v_half_width {
                1.0 - 0.01 * (1.0 - phase.abs() / v_half_width)
            } else {
                1.0
            }
        });
        let outcome = vetter().vet(&series, &params());
        assert!(!outcome.passed);
        assert!(
            outcome.reasons.iter().any(|r| r.contains("V-shaped")),
            "reasons: {:?}",
            outcome.reasons
        );
    }

    #[test]
    fn flat_bottomed_dip_passes_the_shape_test() {
        let outcome = vetter().vet(&box_series(0.01, 0.01), &params());
        assert!(outcome.metrics["shape_metric"] < 0.05);
    }

    #[test]
    fn secondary_eclipse_fails_the_secondary_test() {
        // Primary at phase 0 plus a shallower eclipse half a period later
        let series = series_with(|_, phase| {
            if phase.abs() < DURATION / 2.0 {
                0.99
            } else if (phase.abs() - PERIOD / 2.0).abs() < 0.1 {
                0.995
            } else {
                1.0
            }
        });
        let outcome = vetter().vet(&series, &params());
        assert!(!outcome.passed);
        assert!(
            outcome.reasons.iter().any(|r| r.contains("Secondary")),
            "reasons: {:?}",
            outcome.reasons
        );
        assert!(outcome.metrics["secondary_depth"] > 0.004);
    }

    #[test]
    fn implausible_depth_duration_ratio_fails() {
        // 30% deep at 0.2 day duration: ratio 1.5, far past the ceiling
        let outcome = vetter().vet(&box_series(0.3, 0.3), &params());
        assert!(!outcome.passed);
        assert!(
            outcome.reasons.iter().any(|r| r.contains("depth/duration")),
            "reasons: {:?}",
            outcome.reasons
        );
    }

    #[test]
    fn all_failing_tests_are_reported_together() {
        // Unbalanced, deep and with a secondary: at least three reasons
        let series = series_with(|cycle, phase| {
            if phase.abs() < DURATION / 2.0 {
                if cycle % 2 == 1 {
                    0.60
                } else {
                    0.75
                }
            } else if (phase.abs() - PERIOD / 2.0).abs() < 0.1 {
                0.95
            } else {
                1.0
            }
        });
        let outcome = vetter().vet(&series, &params());
        assert!(!outcome.passed);
        assert!(outcome.reasons.len() >= 3, "reasons: {:?}", outcome.reasons);
    }

    #[test]
    fn sparse_series_auto_passes() {
        let series = LightCurve::new(vec![0.0, 0.5, 1.0], vec![1.0, 0.99, 1.0]);
        let outcome = vetter().vet(&series, &params());
        assert!(outcome.passed);
        assert!(outcome.reasons.is_empty());
    }

    #[test]
    fn degenerate_parameters_pass_by_default() {
        let series = box_series(0.01, 0.01);
        let bad = TransitParams { period_days: f64::NAN, epoch: 0.0, duration_days: 0.2 };
        let outcome = vetter().vet(&series, &bad);
        assert!(outcome.passed);
        assert_eq!(outcome.metrics.len(), 4);
    }
}

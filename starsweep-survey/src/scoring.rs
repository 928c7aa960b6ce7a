//! Candidate quality scoring
//!
//! Maps raw detection metrics onto a 0-100 score and a five-bucket
//! quality label. Three piecewise-linear sub-scores (strength statistic,
//! transit depth, orbital period) are combined 60/25/15; a vetting
//! failure caps the result so a failed candidate can never reach the top
//! tier regardless of raw signal strength.

use serde::{Deserialize, Serialize};

use starsweep_common::QualityLabel;

/// Full scoring breakdown for one candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score: u8,
    pub quality: QualityLabel,
    pub snr_score: f64,
    pub depth_score: f64,
    pub period_score: f64,
}

/// Score a candidate from its stored metrics.
///
/// `snr` is the best strength statistic across estimators, `depth` the
/// fractional dip, `period_days` the orbital period. `snr_threshold` is
/// the fast estimator's significance threshold, anchoring the strength
/// bands.
pub fn assess(
    snr: f64,
    depth: f64,
    period_days: f64,
    vetting_passed: bool,
    snr_threshold: f64,
) -> QualityAssessment {
    let snr_score = score_snr(snr, snr_threshold);
    let depth_score = score_depth(depth);
    let period_score = score_period(period_days);

    let base = (snr_score * 60.0 + depth_score * 25.0 + period_score * 15.0).round() as i64;
    let base = base.clamp(0, 100) as u8;

    let score = if vetting_passed {
        base
    } else {
        // Strong signal that fails vetting is the classic eclipsing-binary
        // signature; push it below the good tier, harder when the raw
        // score was high.
        let capped = base.min(60);
        if base > 80 {
            capped.min(50)
        } else {
            capped
        }
    };

    QualityAssessment {
        score,
        quality: quality_label(score),
        snr_score,
        depth_score,
        period_score,
    }
}

/// Strength sub-score in [0, 1], anchored at the detection threshold `t`:
/// below t/2 scores zero, t..2t is the useful range, 5t and beyond
/// saturates.
pub fn score_snr(snr: f64, t: f64) -> f64 {
    if snr < t / 2.0 {
        0.0
    } else if snr < t {
        0.1 + (snr - t / 2.0) / (t / 2.0) * 0.2
    } else if snr < 2.0 * t {
        0.3 + (snr - t) / t * 0.4
    } else if snr < 5.0 * t {
        0.7 + (snr - 2.0 * t) / (3.0 * t) * 0.25
    } else {
        (0.95 + (snr - 5.0 * t) / 100.0 * 0.05).min(1.0)
    }
}

/// Depth sub-score in [0, 1] over the dip expressed in percent.
/// Hot-Jupiter-like dips (0.05%..1%) score best; hair-thin and very deep
/// dips are penalized.
pub fn score_depth(depth: f64) -> f64 {
    let percent = depth.abs() * 100.0;
    if percent <= 0.0 {
        0.0
    } else if percent < 0.01 {
        0.2
    } else if (0.05..=1.0).contains(&percent) {
        1.0
    } else if percent <= 5.0 {
        0.8
    } else {
        (0.8 - (percent - 5.0) / 10.0).max(0.2)
    }
}

/// Period sub-score in [0, 1]; 0.5..20 days is the sweet spot for a
/// transit survey with a ~27 day observing baseline.
pub fn score_period(period_days: f64) -> f64 {
    if period_days <= 0.0 {
        0.0
    } else if period_days < 0.3 {
        0.3
    } else if (0.5..=20.0).contains(&period_days) {
        1.0
    } else if period_days <= 50.0 {
        0.8
    } else {
        (0.8 - (period_days - 50.0) / 100.0).max(0.3)
    }
}

/// Five-bucket step function over the final score
pub fn quality_label(score: u8) -> QualityLabel {
    if score >= 75 {
        QualityLabel::Excellent
    } else if score >= 60 {
        QualityLabel::Good
    } else if score >= 40 {
        QualityLabel::Fair
    } else if score >= 20 {
        QualityLabel::Poor
    } else {
        QualityLabel::VeryPoor
    }
}

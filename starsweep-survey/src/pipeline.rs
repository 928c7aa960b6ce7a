//! Per-target analysis pipeline
//!
//! One target in, one report out. Stages run in order: tracker check,
//! acquisition, cleaning, fast search, refined search, vetting,
//! scoring. Terminal outcomes mark the dedup tracker so the target is
//! never fetched again; unexpected errors leave it unmarked and
//! eligible for retry on a later pass.

use std::sync::Arc;

use tracing::{debug, info, warn};

use starsweep_common::series::LightCurve;
use starsweep_common::{QualityLabel, Result, TargetId, TargetStatus};

use crate::candidates::NewDetection;
use crate::context::SurveyContext;
use crate::detect::{Detection, TransitDetector};
use crate::scoring;

/// Everything the survey loop needs to account for one submission
#[derive(Debug, Clone)]
pub struct TargetReport {
    pub target: TargetId,
    pub status: TargetStatus,
    pub period_days: Option<f64>,
    pub depth: Option<f64>,
    pub snr: Option<f64>,
    pub score: Option<u8>,
    pub quality: Option<QualityLabel>,
    pub vetting_reasons: Vec<String>,
    pub error: Option<String>,
}

impl TargetReport {
    fn bare(target: TargetId, status: TargetStatus) -> Self {
        TargetReport {
            target,
            status,
            period_days: None,
            depth: None,
            snr: None,
            score: None,
            quality: None,
            vetting_reasons: Vec::new(),
            error: None,
        }
    }

    fn failed(target: TargetId, detail: String) -> Self {
        let mut report = TargetReport::bare(target, TargetStatus::Failed);
        report.error = Some(detail);
        report
    }
}

/// Run one target through the full pipeline. Never panics outward and
/// never returns early without a status the loop can account for.
pub async fn analyze_target(ctx: Arc<SurveyContext>, target: TargetId) -> TargetReport {
    if ctx.tracker.is_marked(&target) {
        debug!(target = %target, "Already analyzed, skipping");
        return TargetReport::bare(target, TargetStatus::AlreadyAnalyzed);
    }

    let raw = match ctx.source.acquire(&target).await {
        Ok(Some(curve)) => curve,
        Ok(None) => {
            ctx.tracker.mark(&target);
            debug!(target = %target, "No data in archive");
            return TargetReport::bare(target, TargetStatus::NoData);
        }
        Err(e) => {
            // Unexpected acquisition failure: leave the target unmarked
            // so a later pass can retry it
            warn!(target = %target, error = %e, "Acquisition failed");
            return TargetReport::failed(target, e.to_string());
        }
    };

    let cleaned = match ctx.cleaner.clean(&raw) {
        Some(series) => series,
        None => {
            ctx.tracker.mark(&target);
            debug!(target = %target, raw_len = raw.len(), "Too little usable data after cleaning");
            return TargetReport::bare(target, TargetStatus::ProcessingFailed);
        }
    };

    let fast = match run_detector(&ctx.fast, &cleaned).await {
        Err(detail) => return TargetReport::failed(target, detail),
        Ok(Err(e)) => {
            ctx.tracker.mark(&target);
            debug!(target = %target, error = %e, "Fast search errored");
            return TargetReport::bare(target, TargetStatus::DetectFailed);
        }
        Ok(Ok(None)) => {
            ctx.tracker.mark(&target);
            return TargetReport::bare(target, TargetStatus::DetectFailed);
        }
        Ok(Ok(Some(detection))) => detection,
    };
    // The fast search ran to completion; whatever happens next, this
    // target never needs fetching again
    ctx.tracker.mark(&target);

    if !fast.significant {
        debug!(target = %target, power = fast.power, "No significant signal");
        return TargetReport::bare(target, TargetStatus::NoSignal);
    }

    // Refined pass sharpens the period before vetting. Its failures
    // never lose the fast detection.
    let mut best = fast;
    let mut refined_sde = None;
    match run_detector(&ctx.precise, &cleaned).await {
        Ok(Ok(Some(refined))) => {
            refined_sde = Some(refined.power);
            if refined.significant {
                best = refined;
            }
        }
        Ok(Ok(None)) => {}
        Ok(Err(e)) => warn!(target = %target, error = %e, "Refined search errored"),
        Err(detail) => warn!(target = %target, detail = %detail, "Refined search task failed"),
    }

    let outcome = ctx.vetter.vet(&cleaned, &best.params);
    let snr = fast.power.max(refined_sde.unwrap_or(0.0));

    if !outcome.passed {
        info!(
            target = %target,
            period_days = best.params.period_days,
            failures = outcome.reasons.len(),
            "Detection rejected by vetting"
        );
        let mut report = TargetReport::bare(target, TargetStatus::Rejected);
        report.period_days = Some(best.params.period_days);
        report.depth = Some(best.depth);
        report.snr = Some(snr);
        report.vetting_reasons = outcome.reasons;
        return report;
    }

    let assessment = scoring::assess(
        snr,
        best.depth,
        best.params.period_days,
        true,
        ctx.config.detection.power_threshold,
    );

    let detection = NewDetection {
        period_days: best.params.period_days,
        depth: best.depth,
        epoch: best.params.epoch,
        duration_days: best.params.duration_days,
        box_power: Some(fast.power),
        refined_sde,
        vetting_passed: true,
    };
    if let Err(e) = ctx.store.upsert(&target, &detection) {
        warn!(target = %target, error = %e, "Failed to persist candidate");
        return TargetReport::failed(target, e.to_string());
    }
    if let Err(e) = ctx.store.apply_quality(&target, assessment.score, assessment.quality) {
        warn!(target = %target, error = %e, "Failed to persist quality");
        return TargetReport::failed(target, e.to_string());
    }

    info!(
        target = %target,
        period_days = best.params.period_days,
        depth = best.depth,
        snr,
        score = assessment.score,
        quality = %assessment.quality,
        "Candidate confirmed"
    );
    let mut report = TargetReport::bare(target, TargetStatus::Confirmed);
    report.period_days = Some(best.params.period_days);
    report.depth = Some(best.depth);
    report.snr = Some(snr);
    report.score = Some(assessment.score);
    report.quality = Some(assessment.quality);
    report
}

/// Detectors are CPU-bound; keep them off the async workers. An outer
/// `Err` means the blocking task itself died.
async fn run_detector(
    detector: &Arc<dyn TransitDetector>,
    series: &LightCurve,
) -> std::result::Result<Result<Option<Detection>>, String> {
    let detector = Arc::clone(detector);
    let series = series.clone();
    tokio::task::spawn_blocking(move || detector.detect(&series))
        .await
        .map_err(|e| format!("search task failed: {e}"))
}

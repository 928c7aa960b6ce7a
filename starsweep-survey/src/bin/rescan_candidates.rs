//! Re-run detection, vetting and scoring over every stored candidate
//!
//! Useful after threshold changes: each candidate's curve is fetched
//! and analyzed again with the current configuration, and its detection
//! and score fields are rewritten. Review verdicts are never touched. A
//! candidate whose signal no longer reaches significance is reported
//! and left as it was.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starsweep_common::config::{self, DATA_DIR_ENV};
use starsweep_survey::candidates::NewDetection;
use starsweep_survey::scoring;
use starsweep_survey::SurveyContext;

#[derive(Parser, Debug)]
#[command(name = "starsweep-rescan-candidates")]
#[command(about = "Re-run detection and scoring over the candidate store")]
#[command(version)]
struct Args {
    /// Data directory holding the tracker and candidate store
    #[arg(short, long, env = "STARSWEEP_DATA_DIR")]
    data_dir: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starsweep_survey=info,starsweep_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let survey_config =
        config::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let data_dir = config::resolve_data_dir(
        args.data_dir.as_deref(),
        DATA_DIR_ENV,
        survey_config.data_dir.as_deref(),
    );

    let ctx = Arc::new(
        SurveyContext::open(survey_config, &data_dir).context("Failed to open survey stores")?,
    );

    let records = ctx.store.all();
    if records.is_empty() {
        println!("No candidates on file");
        return Ok(());
    }
    println!("Rescanning {} candidates with current thresholds", records.len());

    let mut updated = 0usize;
    let mut newly_failed = 0usize;
    let mut lost = 0usize;
    let mut unavailable = 0usize;

    for record in records {
        let target = record.target_id.clone();

        let raw = match ctx.source.acquire(&target).await {
            Ok(Some(curve)) => curve,
            Ok(None) => {
                warn!(target = %target, "No data available, record left as is");
                unavailable += 1;
                continue;
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Acquisition failed, record left as is");
                unavailable += 1;
                continue;
            }
        };
        let cleaned = match ctx.cleaner.clean(&raw) {
            Some(series) => series,
            None => {
                warn!(target = %target, "Too little usable data, record left as is");
                unavailable += 1;
                continue;
            }
        };

        let fast = match ctx.fast.detect(&cleaned) {
            Ok(Some(detection)) if detection.significant => detection,
            Ok(_) => {
                warn!(target = %target, "Signal no longer significant, record left as is");
                lost += 1;
                continue;
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Fast search failed, record left as is");
                unavailable += 1;
                continue;
            }
        };
        let mut best = fast;
        let mut refined_sde = None;
        match ctx.precise.detect(&cleaned) {
            Ok(Some(refined)) => {
                refined_sde = Some(refined.power);
                if refined.significant {
                    best = refined;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(target = %target, error = %e, "Refined search errored"),
        }

        let outcome = ctx.vetter.vet(&cleaned, &best.params);
        let snr = fast.power.max(refined_sde.unwrap_or(0.0));
        let assessment = scoring::assess(
            snr,
            best.depth,
            best.params.period_days,
            outcome.passed,
            ctx.config.detection.power_threshold,
        );

        ctx.store.upsert(
            &target,
            &NewDetection {
                period_days: best.params.period_days,
                depth: best.depth,
                epoch: best.params.epoch,
                duration_days: best.params.duration_days,
                box_power: Some(fast.power),
                refined_sde,
                vetting_passed: outcome.passed,
            },
        )?;
        ctx.store.apply_quality(&target, assessment.score, assessment.quality)?;

        if !outcome.passed {
            newly_failed += 1;
            println!(
                "{target}: now fails vetting ({}), score {}",
                outcome.reasons.join("; "),
                assessment.score
            );
        }
        updated += 1;
    }

    println!(
        "Rescan complete: {updated} updated ({newly_failed} now fail vetting), \
         {lost} no longer significant, {unavailable} unavailable"
    );
    Ok(())
}

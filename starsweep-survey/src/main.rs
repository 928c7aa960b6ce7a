//! Survey daemon entry point
//!
//! Wires configuration, the durable stores, the worker pool and the
//! signal handlers, then hands control to the survey loop until a
//! shutdown signal arrives. SIGUSR1 toggles a pause that stops new
//! submissions while in-flight targets finish.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starsweep_common::config::{self, DATA_DIR_ENV};
use starsweep_common::events::SurveyEvent;
use starsweep_survey::{SurveyContext, SurveyRunner};

/// Command-line arguments for starsweep-survey
#[derive(Parser, Debug)]
#[command(name = "starsweep-survey")]
#[command(about = "Continuous transit-survey scanner")]
#[command(version)]
struct Args {
    /// Data directory holding the tracker and candidate store
    #[arg(short, long, env = "STARSWEEP_DATA_DIR")]
    data_dir: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker pool capacity override
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starsweep_survey=info,starsweep_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let mut survey_config =
        config::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(workers) = args.workers {
        survey_config.workers = workers.max(1);
    }

    let data_dir = config::resolve_data_dir(
        args.data_dir.as_deref(),
        DATA_DIR_ENV,
        survey_config.data_dir.as_deref(),
    );
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

    info!(
        data_dir = %data_dir.display(),
        workers = survey_config.workers,
        "Starting starsweep survey"
    );

    // A corrupt candidate store is fatal here: candidates are the
    // product of days of scanning and must be inspected by hand
    let ctx = SurveyContext::open(survey_config, &data_dir)
        .context("Failed to open survey stores")?;
    ctx.store
        .migrate_schema(ctx.config.detection.power_threshold)
        .context("Candidate store migration failed")?;
    let ctx = Arc::new(ctx);

    let cancel = CancellationToken::new();
    let runner = SurveyRunner::new(Arc::clone(&ctx), cancel.clone());
    let pause = runner.pause_flag();

    // Console reporter: candidate banners on stdout, everything else
    // already goes through tracing
    let mut events = ctx.events.subscribe();
    let reporter = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match events.recv().await {
                Ok(SurveyEvent::CandidateConfirmed {
                    target,
                    period_days,
                    depth,
                    snr,
                    score,
                    quality,
                    ..
                }) => {
                    println!(
                        "CANDIDATE {target}: period {period_days:.4} d, depth {:.3}%, \
                         snr {snr:.1}, score {score}/100 ({quality})",
                        depth * 100.0
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Console reporter lagged behind the event bus")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Shutdown on Ctrl+C or SIGTERM
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, draining workers");
        signal_cancel.cancel();
    });

    // SIGUSR1 toggles the pause flag
    #[cfg(unix)]
    {
        let pause = Arc::clone(&pause);
        tokio::spawn(async move {
            let mut stream = match signal::unix::signal(signal::unix::SignalKind::user_defined1())
            {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "SIGUSR1 handler unavailable");
                    return;
                }
            };
            while stream.recv().await.is_some() {
                let was_paused = pause.fetch_xor(true, std::sync::atomic::Ordering::Relaxed);
                info!(paused = !was_paused, "Pause toggled");
            }
        });
    }

    let stats = runner.run().await;
    reporter.abort();

    println!(
        "Session complete: {} analyzed, {} candidates, {} rejected, {} errors ({} total on file)",
        stats.analyzed, stats.candidates, stats.rejected, stats.errors, stats.total_analyzed
    );
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

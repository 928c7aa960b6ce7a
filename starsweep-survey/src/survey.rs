//! Continuous survey loop
//!
//! Draws targets, feeds the worker pool, accounts for every result
//! envelope and emits progress events. The loop never blocks on a full
//! pool or an empty result channel; it interleaves one submission and
//! one poll per iteration. Pausing stops submissions while in-flight
//! work drains. Shutdown waits for the pool, flushes both stores and
//! emits a closing event.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use starsweep_common::events::{SessionSnapshot, SurveyEvent};
use starsweep_common::TargetStatus;

use crate::context::SurveyContext;
use crate::pipeline::{analyze_target, TargetReport};
use crate::pool::{PoolResult, WorkerPool};
use crate::targeting::TargetSelector;

pub struct SurveyRunner {
    ctx: Arc<SurveyContext>,
    selector: TargetSelector,
    pool: WorkerPool<TargetReport>,
    cancel: CancellationToken,
    pause: Arc<AtomicBool>,
    stats: SessionSnapshot,
    session_id: Uuid,
    started: Instant,
    last_stats: Instant,
}

impl SurveyRunner {
    pub fn new(ctx: Arc<SurveyContext>, cancel: CancellationToken) -> Self {
        let selector = TargetSelector::new(&ctx.config.targeting);
        let pool = WorkerPool::new(ctx.config.workers);
        SurveyRunner {
            ctx,
            selector,
            pool,
            cancel,
            pause: Arc::new(AtomicBool::new(false)),
            stats: SessionSnapshot::default(),
            session_id: Uuid::new_v4(),
            started: Instant::now(),
            last_stats: Instant::now(),
        }
    }

    /// Flip this flag to pause submissions without stopping the run
    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pause)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Scan until cancelled, then drain and flush. Returns the final
    /// session counters.
    pub async fn run(mut self) -> SessionSnapshot {
        let previously = self.ctx.tracker.count() as u64;
        self.stats.total_analyzed = previously;
        info!(
            session = %self.session_id,
            workers = self.pool.capacity(),
            previously_analyzed = previously,
            "Survey started"
        );
        self.ctx.events.emit_lossy(SurveyEvent::SurveyStarted {
            session_id: self.session_id,
            workers: self.pool.capacity(),
            previously_analyzed: previously,
            timestamp: Utc::now(),
        });

        let mut rng = StdRng::from_entropy();
        let poll = Duration::from_millis(self.ctx.config.result_poll_ms);
        let idle = Duration::from_millis(self.ctx.config.idle_sleep_ms);
        let pause_poll = Duration::from_millis(self.ctx.config.pause_poll_ms);

        while !self.cancel.is_cancelled() {
            if self.pause.load(Ordering::Relaxed) {
                // In-flight work still drains while paused
                match self.pool.poll_result(poll).await {
                    Some(envelope) => self.account(envelope),
                    None => tokio::time::sleep(pause_poll).await,
                }
                continue;
            }

            let submitted = self.try_submit(&mut rng);

            let drained = match self.pool.poll_result(poll).await {
                Some(envelope) => {
                    self.account(envelope);
                    true
                }
                None => false,
            };

            self.maybe_emit_stats();

            if !submitted && !drained {
                tokio::time::sleep(idle).await;
            }
        }

        self.finish().await
    }

    /// Draw one target and hand it to the pool if there is room.
    /// Already-marked draws are discarded without a submission.
    fn try_submit(&mut self, rng: &mut StdRng) -> bool {
        if !self.pool.has_capacity() {
            return false;
        }
        let target = self.selector.draw(rng);
        if self.ctx.tracker.is_marked(&target) {
            debug!(target = %target, "Drawn target already analyzed");
            return false;
        }
        let work = analyze_target(Arc::clone(&self.ctx), target.clone());
        match self.pool.submit(target.clone(), work) {
            Ok(()) => {
                self.ctx.events.emit_lossy(SurveyEvent::TargetSubmitted {
                    target,
                    active: self.pool.active_count(),
                    capacity: self.pool.capacity(),
                    timestamp: Utc::now(),
                });
                true
            }
            Err(e) => {
                debug!(target = %target, error = %e, "Submission refused");
                false
            }
        }
    }

    /// Fold one result envelope into the session counters and events
    fn account(&mut self, envelope: PoolResult<TargetReport>) {
        let report = match envelope.outcome {
            Ok(report) => report,
            Err(e) => {
                warn!(target = %envelope.target, error = %e, "Worker failed");
                self.stats.errors += 1;
                self.ctx.events.emit_lossy(SurveyEvent::TargetCompleted {
                    target: envelope.target,
                    status: TargetStatus::Failed,
                    timestamp: Utc::now(),
                });
                return;
            }
        };

        match report.status {
            TargetStatus::AlreadyAnalyzed => {}
            TargetStatus::NoData | TargetStatus::ProcessingFailed => {
                self.stats.analyzed += 1;
                self.stats.skipped += 1;
            }
            TargetStatus::DetectFailed | TargetStatus::NoSignal => {
                self.stats.analyzed += 1;
            }
            TargetStatus::Rejected => {
                self.stats.analyzed += 1;
                self.stats.rejected += 1;
                self.ctx.events.emit_lossy(SurveyEvent::CandidateRejected {
                    target: report.target.clone(),
                    reasons: report.vetting_reasons.clone(),
                    timestamp: Utc::now(),
                });
            }
            TargetStatus::Confirmed => {
                self.stats.analyzed += 1;
                self.stats.candidates += 1;
                self.ctx.events.emit_lossy(SurveyEvent::CandidateConfirmed {
                    target: report.target.clone(),
                    period_days: report.period_days.unwrap_or_default(),
                    depth: report.depth.unwrap_or_default(),
                    snr: report.snr.unwrap_or_default(),
                    score: report.score.unwrap_or_default(),
                    quality: report.quality.unwrap_or(starsweep_common::QualityLabel::VeryPoor),
                    timestamp: Utc::now(),
                });
            }
            TargetStatus::Failed => {
                self.stats.errors += 1;
            }
        }
        self.stats.total_analyzed = self.ctx.tracker.count() as u64;

        self.ctx.events.emit_lossy(SurveyEvent::TargetCompleted {
            target: report.target,
            status: report.status,
            timestamp: Utc::now(),
        });
    }

    fn maybe_emit_stats(&mut self) {
        let interval = Duration::from_secs_f64(self.ctx.config.stats_interval_secs);
        if self.last_stats.elapsed() < interval {
            return;
        }
        self.last_stats = Instant::now();

        let pool = self.pool.snapshot();
        let elapsed_min = self.started.elapsed().as_secs_f64() / 60.0;
        let rate = if elapsed_min > 0.0 { self.stats.analyzed as f64 / elapsed_min } else { 0.0 };
        info!(
            analyzed = self.stats.analyzed,
            candidates = self.stats.candidates,
            rejected = self.stats.rejected,
            errors = self.stats.errors,
            active = pool.in_progress,
            total_analyzed = self.stats.total_analyzed,
            rate_per_min = rate,
            "Survey progress"
        );
        self.ctx.events.emit_lossy(SurveyEvent::StatsSnapshot {
            session: self.stats,
            pool,
            rate_per_min: rate,
            timestamp: Utc::now(),
        });
    }

    async fn finish(mut self) -> SessionSnapshot {
        info!("Draining worker pool");
        self.pool.shutdown(true).await;
        while let Some(envelope) = self.pool.try_result() {
            self.account(envelope);
        }

        if let Err(e) = self.ctx.tracker.flush() {
            warn!(error = %e, "Final tracker flush failed");
        }
        if let Err(e) = self.ctx.store.flush() {
            warn!(error = %e, "Final candidate store flush failed");
        }

        self.ctx.events.emit_lossy(SurveyEvent::SurveyStopped {
            session_id: self.session_id,
            analyzed: self.stats.analyzed,
            candidates: self.stats.candidates,
            timestamp: Utc::now(),
        });
        info!(
            session = %self.session_id,
            analyzed = self.stats.analyzed,
            candidates = self.stats.candidates,
            errors = self.stats.errors,
            "Survey stopped"
        );
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starsweep_common::config::SurveyConfig;
    use starsweep_common::{Error, QualityLabel, TargetId};

    fn runner(dir: &std::path::Path) -> SurveyRunner {
        let ctx = SurveyContext::open(SurveyConfig::default(), dir).unwrap();
        SurveyRunner::new(Arc::new(ctx), CancellationToken::new())
    }

    fn tic(n: u64) -> TargetId {
        TargetId::from_catalog_number(n)
    }

    fn report(status: TargetStatus) -> TargetReport {
        TargetReport {
            target: tic(1),
            status,
            period_days: Some(2.5),
            depth: Some(0.01),
            snr: Some(15.0),
            score: Some(80),
            quality: Some(QualityLabel::Good),
            vetting_reasons: vec![],
            error: None,
        }
    }

    #[tokio::test]
    async fn counters_follow_report_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner(dir.path());

        for status in [
            TargetStatus::NoData,
            TargetStatus::NoSignal,
            TargetStatus::Rejected,
            TargetStatus::Confirmed,
            TargetStatus::AlreadyAnalyzed,
        ] {
            runner.account(PoolResult { target: tic(1), outcome: Ok(report(status)) });
        }
        runner.account(PoolResult { target: tic(2), outcome: Err(Error::Internal("x".into())) });

        assert_eq!(runner.stats.analyzed, 4);
        assert_eq!(runner.stats.skipped, 1);
        assert_eq!(runner.stats.rejected, 1);
        assert_eq!(runner.stats.candidates, 1);
        assert_eq!(runner.stats.errors, 1);
    }

    #[tokio::test]
    async fn confirmed_report_emits_candidate_event() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner(dir.path());
        let mut rx = runner.ctx.events.subscribe();

        runner.account(PoolResult { target: tic(5), outcome: Ok(report(TargetStatus::Confirmed)) });

        match rx.recv().await.unwrap() {
            SurveyEvent::CandidateConfirmed { score, quality, .. } => {
                assert_eq!(score, 80);
                assert_eq!(quality, QualityLabel::Good);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            SurveyEvent::TargetCompleted { status, .. } => {
                assert_eq!(status, TargetStatus::Confirmed)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}

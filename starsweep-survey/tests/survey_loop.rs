//! End-to-end survey loop tests over the bundled synthetic archive

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use starsweep_common::config::{PriorityRange, SurveyConfig};
use starsweep_common::events::{SessionSnapshot, SurveyEvent};
use starsweep_survey::{SurveyContext, SurveyRunner};

/// Small search grids and a narrow catalog span keep sessions fast
fn quick_config() -> SurveyConfig {
    let mut config = SurveyConfig::default();
    config.workers = 3;
    config.result_poll_ms = 20;
    config.idle_sleep_ms = 5;
    config.stats_interval_secs = 0.5;
    config.targeting.ranges = vec![PriorityRange { lo: 1, hi: 400, weight: 1.0 }];
    config.targeting.wildcard_probability = 0.0;
    config.targeting.full_range_lo = 1;
    config.targeting.full_range_hi = 400;
    config.synthetic.baseline_days = 12.0;
    config.detection.period_steps = 500;
    config.detection.refined_steps = 800;
    config.detection.max_period_days = 6.0;
    config
}

async fn run_for(
    dir: &std::path::Path,
    config: SurveyConfig,
    millis: u64,
) -> (SessionSnapshot, Vec<SurveyEvent>) {
    let ctx = Arc::new(SurveyContext::open(config, dir).unwrap());
    let mut rx = ctx.events.subscribe();
    let cancel = CancellationToken::new();
    let runner = SurveyRunner::new(Arc::clone(&ctx), cancel.clone());

    let collector = tokio::spawn(async move {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let stop = matches!(event, SurveyEvent::SurveyStopped { .. });
                    events.push(event);
                    if stop {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
        events
    });

    let run = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_millis(millis)).await;
    cancel.cancel();
    let stats = run.await.unwrap();
    let events = collector.await.unwrap();
    (stats, events)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_analyzes_targets_and_resumes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let (stats, events) = run_for(dir.path(), quick_config(), 3000).await;

    assert!(stats.analyzed > 0, "nothing analyzed in a 3 s session");
    assert!(stats.total_analyzed >= stats.analyzed);
    assert!(matches!(events.first(), Some(SurveyEvent::SurveyStarted { .. })));
    assert!(matches!(events.last(), Some(SurveyEvent::SurveyStopped { .. })));
    assert!(dir.path().join("analyzed_targets.json").exists());

    // Every submission came back as exactly one completion
    let submitted = events
        .iter()
        .filter(|e| matches!(e, SurveyEvent::TargetSubmitted { .. }))
        .count();
    let completed = events
        .iter()
        .filter(|e| matches!(e, SurveyEvent::TargetCompleted { .. }))
        .count();
    assert_eq!(submitted, completed);

    // The pool never reported more occupancy than its capacity
    for event in &events {
        if let SurveyEvent::TargetSubmitted { active, capacity, .. } = event {
            assert!(active <= capacity, "active {active} over capacity {capacity}");
        }
    }

    // A second session over the same directory resumes from the tracker
    let (_, events2) = run_for(dir.path(), quick_config(), 800).await;
    match events2.first() {
        Some(SurveyEvent::SurveyStarted { previously_analyzed, .. }) => {
            assert!(*previously_analyzed > 0, "tracker not carried across sessions");
        }
        other => panic!("expected a start event, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn paused_runner_submits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(SurveyContext::open(quick_config(), dir.path()).unwrap());
    let cancel = CancellationToken::new();
    let runner = SurveyRunner::new(Arc::clone(&ctx), cancel.clone());
    runner.pause_flag().store(true, std::sync::atomic::Ordering::Relaxed);

    let run = tokio::spawn(runner.run());
    tokio::time::sleep(Duration::from_millis(700)).await;
    cancel.cancel();
    let stats = run.await.unwrap();

    assert_eq!(stats.analyzed, 0);
    assert_eq!(ctx.tracker.count(), 0);
}

//! Merge analyzed-target trackers from parallel survey machines
//!
//! Running the survey on several machines splits the tracker; this tool
//! folds any number of exported tracker files into the local one so the
//! next session skips everything any machine already covered.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starsweep_common::config::{self, DATA_DIR_ENV};
use starsweep_survey::context::TRACKER_FILE;
use starsweep_survey::tracker::TargetTracker;

#[derive(Parser, Debug)]
#[command(name = "starsweep-merge-trackers")]
#[command(about = "Merge analyzed-target tracker files into the local tracker")]
#[command(version)]
struct Args {
    /// Data directory holding the local tracker
    #[arg(short, long, env = "STARSWEEP_DATA_DIR")]
    data_dir: Option<String>,

    /// Tracker files to fold in
    #[arg(required = true)]
    trackers: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starsweep_survey=info,starsweep_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let data_dir = config::resolve_data_dir(args.data_dir.as_deref(), DATA_DIR_ENV, None);

    let tracker = TargetTracker::load(data_dir.join(TRACKER_FILE), 1)
        .context("Failed to load local tracker")?;
    let before = tracker.count();

    for file in &args.trackers {
        let added = tracker
            .merge_from(file)
            .with_context(|| format!("Failed to merge {}", file.display()))?;
        println!("{}: {} new targets", file.display(), added);
    }

    println!(
        "Tracker now holds {} targets ({} added this merge)",
        tracker.count(),
        tracker.count() - before
    );
    Ok(())
}

//! Processed-target tracker
//!
//! Survival memory of the survey: every target that has ever been fully
//! accounted for (analyzed, or confirmed to have no data) is marked here
//! so it is never fetched twice. The set lives in memory with a JSON
//! mirror on disk, flushed every few marks and on shutdown.
//!
//! Durable writes go through a temp file, fsync and atomic rename, so a
//! crash leaves either the previous state or the new one, never a torn
//! file. A corrupt mirror at load time is moved aside and the tracker
//! restarts empty; re-analyzing old targets costs time, not correctness.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use starsweep_common::{Error, Result, TargetId};

use crate::persist::write_json_atomic;

/// On-disk shape of the tracker mirror
#[derive(Debug, Serialize, Deserialize)]
struct TrackerFile {
    analyzed: Vec<TargetId>,
}

struct TrackerInner {
    marked: HashSet<TargetId>,
    /// New marks since the last successful flush
    pending: usize,
}

/// Thread-safe set of fully-accounted-for targets with a durable mirror
pub struct TargetTracker {
    path: PathBuf,
    flush_every: usize,
    inner: Mutex<TrackerInner>,
    /// Serializes durable writes; never held together with `inner`
    io_lock: Mutex<()>,
}

impl TargetTracker {
    /// Load the tracker mirror, or start empty when none exists.
    ///
    /// A file that exists but fails to parse is renamed aside to
    /// `<path>.corrupt` and the tracker starts empty. That trades
    /// re-analysis time for a running survey and is logged loudly.
    pub fn load(path: impl Into<PathBuf>, flush_every: usize) -> Result<Self> {
        let path = path.into();
        let marked = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<TrackerFile>(&raw) {
                Ok(file) => {
                    let set: HashSet<TargetId> = file.analyzed.into_iter().collect();
                    info!(path = %path.display(), count = set.len(), "Loaded target tracker");
                    set
                }
                Err(e) => {
                    let backup = PathBuf::from(format!("{}.corrupt", path.display()));
                    match std::fs::rename(&path, &backup) {
                        Ok(()) => error!(
                            path = %path.display(),
                            backup = %backup.display(),
                            error = %e,
                            "CORRUPTION DETECTED in target tracker, starting empty; \
                             corrupt file moved aside"
                        ),
                        Err(rename_err) => error!(
                            path = %path.display(),
                            error = %e,
                            rename_error = %rename_err,
                            "CORRUPTION DETECTED in target tracker and backup rename \
                             failed; starting empty"
                        ),
                    }
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No tracker file yet, starting empty");
                HashSet::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(TargetTracker {
            path,
            flush_every: flush_every.max(1),
            inner: Mutex::new(TrackerInner { marked, pending: 0 }),
            io_lock: Mutex::new(()),
        })
    }

    /// Whether the target has already been fully accounted for
    pub fn is_marked(&self, target: &TargetId) -> bool {
        self.inner.lock().unwrap().marked.contains(target)
    }

    /// Mark a target as fully accounted for.
    ///
    /// Returns true when the mark is new. Idempotent; a repeat mark does
    /// not count toward the flush interval. Every `flush_every` new marks
    /// the mirror is flushed; flush failures are logged and retried at
    /// the next interval rather than crashing the survey.
    pub fn mark(&self, target: &TargetId) -> bool {
        let (newly_marked, due) = {
            let mut inner = self.inner.lock().unwrap();
            let newly_marked = inner.marked.insert(target.clone());
            if newly_marked {
                inner.pending += 1;
            }
            (newly_marked, inner.pending >= self.flush_every)
        };

        if due {
            if let Err(e) = self.flush() {
                warn!(error = %e, "Tracker flush failed, will retry");
            }
        }
        newly_marked
    }

    /// Number of marked targets
    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().marked.len()
    }

    /// Write the mirror durably (temp file, fsync, atomic rename)
    pub fn flush(&self) -> Result<()> {
        let _io = self.io_lock.lock().unwrap();

        let snapshot: Vec<TargetId> = {
            let mut inner = self.inner.lock().unwrap();
            inner.pending = 0;
            let mut ids: Vec<TargetId> = inner.marked.iter().cloned().collect();
            ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            ids
        };

        write_json_atomic(&self.path, &TrackerFile { analyzed: snapshot })
    }

    /// Path of the durable mirror
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Union in the marks from another tracker file.
    ///
    /// Returns the number of newly absorbed targets and flushes once. A
    /// malformed input file is an error; merge never guesses.
    pub fn merge_from(&self, other: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(other)?;
        let file: TrackerFile = serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidInput(format!("Unreadable tracker file {}: {}", other.display(), e))
        })?;

        let added = {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.marked.len();
            inner.marked.extend(file.analyzed);
            inner.marked.len() - before
        };

        self.flush()?;
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(n: u64) -> TargetId {
        TargetId::from_catalog_number(n)
    }

    #[test]
    fn starts_empty_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TargetTracker::load(dir.path().join("analyzed.json"), 10).unwrap();
        assert_eq!(tracker.count(), 0);
        assert!(!tracker.is_marked(&target(1)));
    }

    #[test]
    fn mark_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TargetTracker::load(dir.path().join("analyzed.json"), 10).unwrap();

        assert!(tracker.mark(&target(5)));
        assert!(!tracker.mark(&target(5)));
        assert_eq!(tracker.count(), 1);
        assert!(tracker.is_marked(&target(5)));
    }

    #[test]
    fn flush_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzed.json");

        let tracker = TargetTracker::load(&path, 10).unwrap();
        tracker.mark(&target(1));
        tracker.mark(&target(2));
        tracker.flush().unwrap();

        let reloaded = TargetTracker::load(&path, 10).unwrap();
        assert_eq!(reloaded.count(), 2);
        assert!(reloaded.is_marked(&target(1)));
        assert!(reloaded.is_marked(&target(2)));
    }

    #[test]
    fn auto_flush_happens_at_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzed.json");

        let tracker = TargetTracker::load(&path, 3).unwrap();
        tracker.mark(&target(1));
        tracker.mark(&target(2));
        // Two marks, below the interval; nothing written yet
        assert!(!path.exists());

        tracker.mark(&target(3));
        assert!(path.exists());
        let reloaded = TargetTracker::load(&path, 3).unwrap();
        assert_eq!(reloaded.count(), 3);
    }

    #[test]
    fn unflushed_marks_are_lost_flushed_marks_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzed.json");

        let tracker = TargetTracker::load(&path, 100).unwrap();
        tracker.mark(&target(1));
        tracker.flush().unwrap();
        tracker.mark(&target(2));
        // Simulated crash: tracker dropped without a final flush

        let reloaded = TargetTracker::load(&path, 100).unwrap();
        assert!(reloaded.is_marked(&target(1)));
        assert!(!reloaded.is_marked(&target(2)));
    }

    #[test]
    fn corrupt_file_is_moved_aside_and_tracker_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzed.json");
        std::fs::write(&path, "{ not json").unwrap();

        let tracker = TargetTracker::load(&path, 10).unwrap();
        assert_eq!(tracker.count(), 0);

        let backup = PathBuf::from(format!("{}.corrupt", path.display()));
        assert!(backup.exists(), "corrupt file should be preserved aside");
        assert!(!path.exists(), "original slot should be clear for the next flush");
    }

    #[test]
    fn flush_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyzed.json");

        let tracker = TargetTracker::load(&path, 10).unwrap();
        tracker.mark(&target(9));
        tracker.flush().unwrap();

        let tmp = PathBuf::from(format!("{}.tmp", path.display()));
        assert!(!tmp.exists());
        assert!(path.exists());
    }

    #[test]
    fn merge_from_unions_and_reports_new_marks() {
        let dir = tempfile::tempdir().unwrap();
        let main_path = dir.path().join("analyzed.json");
        let other_path = dir.path().join("other.json");

        let other = TargetTracker::load(&other_path, 10).unwrap();
        other.mark(&target(1));
        other.mark(&target(2));
        other.flush().unwrap();

        let tracker = TargetTracker::load(&main_path, 10).unwrap();
        tracker.mark(&target(2));
        tracker.mark(&target(3));

        let added = tracker.merge_from(&other_path).unwrap();
        assert_eq!(added, 1);
        assert_eq!(tracker.count(), 3);

        // Merge flushed; a reload sees the union
        let reloaded = TargetTracker::load(&main_path, 10).unwrap();
        assert_eq!(reloaded.count(), 3);
    }

    #[test]
    fn merge_from_rejects_malformed_input() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[1, 2, 3]").unwrap();

        let tracker = TargetTracker::load(dir.path().join("analyzed.json"), 10).unwrap();
        assert!(tracker.merge_from(&bad).is_err());
    }
}

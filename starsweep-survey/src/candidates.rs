//! Confirmed-candidate store
//!
//! Every detection that passes vetting lands here, keyed by target. The
//! store must always reflect every confirmed candidate ever found, so it
//! flushes durably after each mutation and refuses to start from a file
//! it cannot parse. Detection fields are overwritten on re-detection;
//! the human review fields survive any number of re-detections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use starsweep_common::{DiscoveryStatus, Error, QualityLabel, Result, TargetId};

use crate::persist::write_json_atomic;
use crate::scoring;

/// One persisted candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub target_id: TargetId,
    pub period_days: f64,
    pub depth: f64,
    #[serde(default)]
    pub epoch: f64,
    #[serde(default)]
    pub duration_days: f64,
    /// Fast estimator power, when it ran
    pub box_power: Option<f64>,
    /// Precise estimator SDE, when it ran and superseded
    pub refined_sde: Option<f64>,
    /// Best strength statistic across estimators; absent only in records
    /// written before the statistic was stored
    pub snr: Option<f64>,
    pub vetting_passed: bool,
    pub detected_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewed: bool,
    #[serde(default)]
    pub discovery: DiscoveryStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Filled lazily by schema migration for pre-scoring records
    #[serde(default)]
    pub score: Option<u8>,
    #[serde(default)]
    pub quality: Option<QualityLabel>,
}

impl CandidateRecord {
    /// Best strength statistic, deriving from whichever raw estimator
    /// fields are present when the stored one is missing
    pub fn effective_snr(&self) -> f64 {
        self.snr
            .unwrap_or_else(|| self.box_power.unwrap_or(0.0).max(self.refined_sde.unwrap_or(0.0)))
    }
}

/// Detection fields written by an upsert
#[derive(Debug, Clone, Copy)]
pub struct NewDetection {
    pub period_days: f64,
    pub depth: f64,
    pub epoch: f64,
    pub duration_days: f64,
    pub box_power: Option<f64>,
    pub refined_sde: Option<f64>,
    pub vetting_passed: bool,
}

impl NewDetection {
    fn best_snr(&self) -> f64 {
        self.box_power.unwrap_or(0.0).max(self.refined_sde.unwrap_or(0.0))
    }
}

/// Review-status counts for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub reviewed: usize,
    pub unreviewed: usize,
    pub potentially_new: usize,
}

/// Thread-safe candidate store with a durable JSON file
pub struct CandidateStore {
    path: PathBuf,
    inner: Mutex<BTreeMap<TargetId, CandidateRecord>>,
    /// Serializes durable writes; never held together with `inner`
    io_lock: Mutex<()>,
}

impl CandidateStore {
    /// Load the store, or start empty when no file exists.
    ///
    /// Unlike the tracker, a file that exists but fails to parse is fatal:
    /// silently dropping confirmed candidates is the one data loss this
    /// system must never accept. The operator decides what to do with the
    /// file.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<TargetId, CandidateRecord>>(&raw) {
                Ok(map) => {
                    info!(path = %path.display(), count = map.len(), "Loaded candidate store");
                    map
                }
                Err(e) => {
                    return Err(Error::StoreCorrupt { path, detail: e.to_string() });
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No candidate store yet, starting fresh");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(CandidateStore {
            path,
            inner: Mutex::new(records),
            io_lock: Mutex::new(()),
        })
    }

    /// Insert or update a candidate's detection fields.
    ///
    /// First insertion sets the review fields to their defaults; a
    /// re-detection overwrites only detection fields and clears the
    /// computed score so the follow-up quality pass recomputes it.
    pub fn upsert(&self, target: &TargetId, det: &NewDetection) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.get_mut(target) {
                Some(record) => {
                    record.period_days = det.period_days;
                    record.depth = det.depth;
                    record.epoch = det.epoch;
                    record.duration_days = det.duration_days;
                    record.box_power = det.box_power;
                    record.refined_sde = det.refined_sde;
                    record.snr = Some(det.best_snr());
                    record.vetting_passed = det.vetting_passed;
                    record.detected_at = Utc::now();
                    record.score = None;
                    record.quality = None;
                    info!(target = %target, period_days = det.period_days, "Updated candidate");
                }
                None => {
                    inner.insert(
                        target.clone(),
                        CandidateRecord {
                            target_id: target.clone(),
                            period_days: det.period_days,
                            depth: det.depth,
                            epoch: det.epoch,
                            duration_days: det.duration_days,
                            box_power: det.box_power,
                            refined_sde: det.refined_sde,
                            snr: Some(det.best_snr()),
                            vetting_passed: det.vetting_passed,
                            detected_at: Utc::now(),
                            reviewed: false,
                            discovery: DiscoveryStatus::Unknown,
                            notes: String::new(),
                            reviewed_at: None,
                            score: None,
                            quality: None,
                        },
                    );
                    info!(
                        target = %target,
                        period_days = det.period_days,
                        depth = det.depth,
                        "Added new candidate"
                    );
                }
            }
        }
        self.flush()
    }

    /// Partial update: attach the computed score and label, touching
    /// nothing else
    pub fn apply_quality(&self, target: &TargetId, score: u8, quality: QualityLabel) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            let record = inner
                .get_mut(target)
                .ok_or_else(|| Error::NotFound(format!("candidate {}", target)))?;
            record.score = Some(score);
            record.quality = Some(quality);
        }
        self.flush()
    }

    /// Record a human review verdict
    pub fn mark_reviewed(
        &self,
        target: &TargetId,
        discovery: DiscoveryStatus,
        notes: &str,
    ) -> Result<()> {
        {
            let mut inner = self.inner.lock().unwrap();
            let record = inner
                .get_mut(target)
                .ok_or_else(|| Error::NotFound(format!("candidate {}", target)))?;
            record.reviewed = true;
            record.discovery = discovery;
            record.notes = notes.to_string();
            record.reviewed_at = Some(Utc::now());
        }
        info!(target = %target, discovery = %discovery, "Marked candidate reviewed");
        self.flush()
    }

    /// Fill `score`/`quality` (and a missing stored statistic) for records
    /// written by older schema versions.
    ///
    /// Idempotent: complete records are never touched, so a second run
    /// migrates zero. Flushes once, and only when something changed.
    /// Returns the number of migrated records.
    pub fn migrate_schema(&self, snr_threshold: f64) -> Result<usize> {
        let migrated = {
            let mut inner = self.inner.lock().unwrap();
            let mut migrated = 0;
            for record in inner.values_mut() {
                if record.score.is_some() && record.quality.is_some() {
                    continue;
                }
                let snr = record.effective_snr();
                let assessment = scoring::assess(
                    snr,
                    record.depth,
                    record.period_days,
                    record.vetting_passed,
                    snr_threshold,
                );
                record.snr = Some(snr);
                record.score = Some(assessment.score);
                record.quality = Some(assessment.quality);
                migrated += 1;
            }
            migrated
        };

        if migrated > 0 {
            warn!(migrated, "Migrated candidate records to the scored schema");
            self.flush()?;
        }
        Ok(migrated)
    }

    pub fn get(&self, target: &TargetId) -> Option<CandidateRecord> {
        self.inner.lock().unwrap().get(target).cloned()
    }

    /// All records, ordered by target
    pub fn all(&self) -> Vec<CandidateRecord> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    pub fn unreviewed(&self) -> Vec<CandidateRecord> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .filter(|r| !r.reviewed)
            .cloned()
            .collect()
    }

    /// Reviewed candidates with no catalog match
    pub fn potentially_new(&self) -> Vec<CandidateRecord> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.reviewed && r.discovery == DiscoveryStatus::PotentiallyNew)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock().unwrap();
        let total = inner.len();
        let reviewed = inner.values().filter(|r| r.reviewed).count();
        let potentially_new = inner
            .values()
            .filter(|r| r.reviewed && r.discovery == DiscoveryStatus::PotentiallyNew)
            .count();
        StoreStats {
            total,
            reviewed,
            unreviewed: total - reviewed,
            potentially_new,
        }
    }

    /// Write the store durably (temp file, fsync, atomic rename)
    pub fn flush(&self) -> Result<()> {
        let _io = self.io_lock.lock().unwrap();
        let snapshot = self.inner.lock().unwrap().clone();
        write_json_atomic(&self.path, &snapshot)
    }

    /// Path of the durable file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(n: u64) -> TargetId {
        TargetId::from_catalog_number(n)
    }

    fn detection() -> NewDetection {
        NewDetection {
            period_days: 3.5,
            depth: 0.01,
            epoch: 1.2,
            duration_days: 0.12,
            box_power: Some(15.0),
            refined_sde: Some(9.0),
            vetting_passed: true,
        }
    }

    fn store() -> (tempfile::TempDir, CandidateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CandidateStore::load(dir.path().join("candidates.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn first_upsert_sets_defaults() {
        let (_dir, store) = store();
        store.upsert(&target(1), &detection()).unwrap();

        let record = store.get(&target(1)).unwrap();
        assert!(!record.reviewed);
        assert_eq!(record.discovery, DiscoveryStatus::Unknown);
        assert_eq!(record.notes, "");
        assert!(record.reviewed_at.is_none());
        assert_eq!(record.snr, Some(15.0));
    }

    #[test]
    fn reupsert_preserves_review_fields() {
        let (_dir, store) = store();
        store.upsert(&target(1), &detection()).unwrap();
        store
            .mark_reviewed(&target(1), DiscoveryStatus::PotentiallyNew, "clean dip")
            .unwrap();

        let mut second = detection();
        second.period_days = 7.0;
        second.refined_sde = Some(22.0);
        store.upsert(&target(1), &second).unwrap();

        let record = store.get(&target(1)).unwrap();
        assert_eq!(record.period_days, 7.0);
        assert_eq!(record.snr, Some(22.0));
        // Review verdict survives the re-detection
        assert!(record.reviewed);
        assert_eq!(record.discovery, DiscoveryStatus::PotentiallyNew);
        assert_eq!(record.notes, "clean dip");
        assert!(record.reviewed_at.is_some());
    }

    #[test]
    fn apply_quality_touches_only_score_fields() {
        let (_dir, store) = store();
        store.upsert(&target(1), &detection()).unwrap();
        store.apply_quality(&target(1), 82, QualityLabel::Excellent).unwrap();

        let record = store.get(&target(1)).unwrap();
        assert_eq!(record.score, Some(82));
        assert_eq!(record.quality, Some(QualityLabel::Excellent));
        assert_eq!(record.period_days, 3.5);
        assert!(!record.reviewed);
    }

    #[test]
    fn apply_quality_on_missing_candidate_errors() {
        let (_dir, store) = store();
        assert!(store.apply_quality(&target(404), 10, QualityLabel::Poor).is_err());
    }

    #[test]
    fn upsert_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.json");

        let store = CandidateStore::load(&path).unwrap();
        store.upsert(&target(1), &detection()).unwrap();
        drop(store);

        let reloaded = CandidateStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&target(1)).unwrap().period_days, 3.5);
    }

    #[test]
    fn corrupt_store_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.json");
        std::fs::write(&path, "{ definitely not json").unwrap();

        match CandidateStore::load(&path) {
            Err(Error::StoreCorrupt { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected StoreCorrupt, got {:?}", other.map(|_| ())),
        }
        // The file is left in place for the operator
        assert!(path.exists());
    }

    #[test]
    fn migration_fills_missing_score_fields_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.json");

        // A record written before scores or the stored statistic existed
        std::fs::write(
            &path,
            r#"{
                "TIC 1": {
                    "target_id": "TIC 1",
                    "period_days": 3.0,
                    "depth": 0.01,
                    "box_power": 14.0,
                    "refined_sde": 8.0,
                    "snr": null,
                    "vetting_passed": true,
                    "detected_at": "2024-03-01T00:00:00Z"
                }
            }"#,
        )
        .unwrap();

        let store = CandidateStore::load(&path).unwrap();
        assert_eq!(store.migrate_schema(10.0).unwrap(), 1);

        let record = store.get(&target(1)).unwrap();
        assert_eq!(record.snr, Some(14.0));
        assert!(record.score.is_some());
        assert!(record.quality.is_some());

        // Second pass migrates nothing and rewrites nothing
        assert_eq!(store.migrate_schema(10.0).unwrap(), 0);

        // Migrated state is durable
        let reloaded = CandidateStore::load(&path).unwrap();
        assert!(reloaded.get(&target(1)).unwrap().score.is_some());
    }

    #[test]
    fn migration_never_rewrites_complete_records() {
        let (_dir, store) = store();
        store.upsert(&target(1), &detection()).unwrap();
        store.apply_quality(&target(1), 90, QualityLabel::Excellent).unwrap();

        assert_eq!(store.migrate_schema(10.0).unwrap(), 0);
        assert_eq!(store.get(&target(1)).unwrap().score, Some(90));
    }

    #[test]
    fn stats_count_review_states() {
        let (_dir, store) = store();
        store.upsert(&target(1), &detection()).unwrap();
        store.upsert(&target(2), &detection()).unwrap();
        store.upsert(&target(3), &detection()).unwrap();
        store
            .mark_reviewed(&target(1), DiscoveryStatus::AlreadyKnown, "")
            .unwrap();
        store
            .mark_reviewed(&target(2), DiscoveryStatus::PotentiallyNew, "check")
            .unwrap();

        let stats = store.stats();
        assert_eq!(
            stats,
            StoreStats { total: 3, reviewed: 2, unreviewed: 1, potentially_new: 1 }
        );
        assert_eq!(store.unreviewed().len(), 1);
        assert_eq!(store.potentially_new().len(), 1);
    }
}

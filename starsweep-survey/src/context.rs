//! Shared handles for a survey run

use std::path::Path;
use std::sync::Arc;

use starsweep_common::config::SurveyConfig;
use starsweep_common::events::EventBus;
use starsweep_common::Result;

use crate::candidates::CandidateStore;
use crate::detect::{BoxSearch, RefinedSearch, TransitDetector};
use crate::source::{DetrendCleaner, LightCurveSource, SeriesCleaner};
use crate::synthetic::SyntheticArchive;
use crate::tracker::TargetTracker;
use crate::vetting::Vetter;

pub const TRACKER_FILE: &str = "analyzed_targets.json";
pub const CANDIDATES_FILE: &str = "candidates.json";

/// Everything a worker needs, behind one `Arc`
pub struct SurveyContext {
    pub config: SurveyConfig,
    pub tracker: Arc<TargetTracker>,
    pub store: Arc<CandidateStore>,
    pub source: Arc<dyn LightCurveSource>,
    pub cleaner: Arc<dyn SeriesCleaner>,
    pub fast: Arc<dyn TransitDetector>,
    pub precise: Arc<dyn TransitDetector>,
    pub vetter: Vetter,
    pub events: EventBus,
}

impl SurveyContext {
    /// Wire the bundled archive and both estimators against the files
    /// under `data_dir`. A corrupt candidate store comes back as an
    /// error; the caller decides whether to exit.
    pub fn open(config: SurveyConfig, data_dir: &Path) -> Result<Self> {
        let tracker =
            TargetTracker::load(data_dir.join(TRACKER_FILE), config.tracker_flush_every)?;
        let store = CandidateStore::load(data_dir.join(CANDIDATES_FILE))?;
        Ok(SurveyContext {
            tracker: Arc::new(tracker),
            store: Arc::new(store),
            source: Arc::new(SyntheticArchive::new(config.synthetic.clone())),
            cleaner: Arc::new(DetrendCleaner::new(config.detection.min_points)),
            fast: Arc::new(BoxSearch::new(config.detection.clone())),
            precise: Arc::new(RefinedSearch::new(config.detection.clone())),
            vetter: Vetter::new(config.vetting.clone()),
            events: EventBus::new(config.event_capacity),
            config,
        })
    }
}

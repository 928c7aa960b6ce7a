//! Continuous transit-survey scanner
//!
//! Draws targets from weighted catalog ranges, fetches and cleans their
//! light curves, runs a fast box search plus a refined period search,
//! vets surviving detections against common false positives and
//! persists scored candidates. Designed to run unattended for days:
//! every completed target lands in a durable tracker so restarts never
//! repeat work, and the candidate store survives crashes mid-write.

pub mod candidates;
pub mod context;
pub mod detect;
pub mod pipeline;
pub mod pool;
pub mod scoring;
pub mod source;
pub mod survey;
pub mod synthetic;
pub mod targeting;
pub mod tracker;
pub mod vetting;

mod persist;

pub use context::SurveyContext;
pub use pipeline::{analyze_target, TargetReport};
pub use survey::SurveyRunner;

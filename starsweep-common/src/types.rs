//! Shared identifier and classification types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Catalog identifier of a survey target, e.g. `"TIC 12345678"`.
///
/// The sole key used for dedup tracking and candidate lookup. Stored and
/// serialized as its display string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Build an identifier from a raw catalog number
    pub fn from_catalog_number(n: u64) -> Self {
        TargetId(format!("TIC {}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        TargetId(s)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        TargetId(s.to_string())
    }
}

/// Terminal outcome of one pass through the analysis pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Tracker already held the target; nothing was re-analyzed
    AlreadyAnalyzed,
    /// Source had no observations for the target
    NoData,
    /// Cleaning left too little series to analyze
    ProcessingFailed,
    /// Fast estimator could not produce a result
    DetectFailed,
    /// Detection ran but found nothing significant
    NoSignal,
    /// Significant detection failed the vetting battery
    Rejected,
    /// Significant detection passed vetting and was stored
    Confirmed,
    /// Unexpected failure; target stays unmarked and eligible for retry
    #[serde(rename = "error")]
    Failed,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::AlreadyAnalyzed => "already_analyzed",
            TargetStatus::NoData => "no_data",
            TargetStatus::ProcessingFailed => "processing_failed",
            TargetStatus::DetectFailed => "detect_failed",
            TargetStatus::NoSignal => "no_signal",
            TargetStatus::Rejected => "rejected",
            TargetStatus::Confirmed => "confirmed",
            TargetStatus::Failed => "error",
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality bucket assigned from a candidate's numeric score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityLabel {
    Excellent,
    Good,
    Fair,
    Poor,
    VeryPoor,
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QualityLabel::Excellent => "EXCELLENT",
            QualityLabel::Good => "GOOD",
            QualityLabel::Fair => "FAIR",
            QualityLabel::Poor => "POOR",
            QualityLabel::VeryPoor => "VERY_POOR",
        };
        f.write_str(s)
    }
}

/// Human review verdict on a confirmed candidate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryStatus {
    /// Not yet reviewed
    #[default]
    Unknown,
    /// Matched against a published object
    AlreadyKnown,
    /// No catalog match found during review
    PotentiallyNew,
}

impl fmt::Display for DiscoveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiscoveryStatus::Unknown => "unknown",
            DiscoveryStatus::AlreadyKnown => "already_known",
            DiscoveryStatus::PotentiallyNew => "potentially_new",
        };
        f.write_str(s)
    }
}

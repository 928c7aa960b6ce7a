//! # Starsweep Common Library
//!
//! Shared code for the starsweep binaries including:
//! - Error types
//! - Event types (SurveyEvent enum) and EventBus
//! - Light-curve series model
//! - Target identifiers and status vocabulary
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod series;
pub mod types;

pub use error::{Error, Result};
pub use types::{DiscoveryStatus, QualityLabel, TargetId, TargetStatus};

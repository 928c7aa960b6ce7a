//! Configuration loading and data directory resolution
//!
//! All knobs live in one TOML-backed [`SurveyConfig`] with compiled
//! defaults, so the daemon starts with zero configuration present. The
//! data directory follows the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable consulted for the data directory
pub const DATA_DIR_ENV: &str = "STARSWEEP_DATA_DIR";

/// Top-level survey configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Worker pool capacity; defaults to core count minus one
    pub workers: usize,
    /// Data directory from the config file (lowest-priority source bar the
    /// compiled default)
    pub data_dir: Option<PathBuf>,
    /// Tracker marks between durable flushes
    pub tracker_flush_every: usize,
    /// Seconds between progress snapshots
    pub stats_interval_secs: f64,
    /// Result poll timeout per loop iteration, milliseconds
    pub result_poll_ms: u64,
    /// Idle sleep per loop iteration, milliseconds
    pub idle_sleep_ms: u64,
    /// Pause flag poll interval, milliseconds
    pub pause_poll_ms: u64,
    /// Event bus channel capacity
    pub event_capacity: usize,
    pub targeting: TargetingConfig,
    pub detection: DetectionConfig,
    pub vetting: VettingConfig,
    pub synthetic: SyntheticConfig,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        SurveyConfig {
            workers: default_workers(),
            data_dir: None,
            tracker_flush_every: 10,
            stats_interval_secs: 2.0,
            result_poll_ms: 100,
            idle_sleep_ms: 50,
            pause_poll_ms: 500,
            event_capacity: 1000,
            targeting: TargetingConfig::default(),
            detection: DetectionConfig::default(),
            vetting: VettingConfig::default(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

/// One weighted catalog-number range for target selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityRange {
    pub lo: u64,
    pub hi: u64,
    /// Relative draw weight; expanded to `round(weight * 10)` table slots
    pub weight: f64,
}

/// Target selection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetingConfig {
    /// Priority ranges covering well-observed catalog zones
    pub ranges: Vec<PriorityRange>,
    /// Fraction of draws taken uniformly from the full span
    pub wildcard_probability: f64,
    /// Full catalog span for wildcard draws
    pub full_range_lo: u64,
    pub full_range_hi: u64,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        TargetingConfig {
            ranges: vec![
                PriorityRange { lo: 10_000_000, hi: 100_000_000, weight: 0.6 },
                PriorityRange { lo: 100_000_000, hi: 200_000_000, weight: 0.6 },
                PriorityRange { lo: 200_000_000, hi: 300_000_000, weight: 0.5 },
                PriorityRange { lo: 300_000_000, hi: 410_000_000, weight: 0.4 },
            ],
            wildcard_probability: 0.1,
            full_range_lo: 1_000_000,
            full_range_hi: 450_000_000,
        }
    }
}

/// Detection estimator configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Fast estimator significance threshold on its power statistic
    pub power_threshold: f64,
    /// Depth ceiling; deeper dips are treated as non-planetary
    pub max_depth: f64,
    /// Precise estimator significance threshold on its SDE statistic
    pub sde_threshold: f64,
    pub min_period_days: f64,
    pub max_period_days: f64,
    /// Trial periods for the fast estimator
    pub period_steps: usize,
    /// Trial periods for the precise estimator
    pub refined_steps: usize,
    /// Minimum cleaned samples required to attempt detection
    pub min_points: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            power_threshold: 10.0,
            max_depth: 0.1,
            sde_threshold: 7.0,
            min_period_days: 0.5,
            max_period_days: 15.0,
            period_steps: 2000,
            refined_steps: 4000,
            min_points: 100,
        }
    }
}

/// Vetting battery thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VettingConfig {
    /// Allowed odd/even depth difference as a fraction of the deeper one
    pub odd_even_tolerance: f64,
    /// Maximum normalized in-transit scatter for a box-like shape
    pub shape_threshold: f64,
    /// Maximum depth at phase 0.5 before flagging a secondary eclipse
    pub secondary_threshold: f64,
    /// Physically plausible depth/duration ratio window
    pub min_depth_duration_ratio: f64,
    pub max_depth_duration_ratio: f64,
}

impl Default for VettingConfig {
    fn default() -> Self {
        VettingConfig {
            odd_even_tolerance: 0.05,
            shape_threshold: 0.2,
            secondary_threshold: 0.001,
            min_depth_duration_ratio: 0.0001,
            max_depth_duration_ratio: 0.5,
        }
    }
}

/// Bundled synthetic archive configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Session-level salt mixed into per-target seeds
    pub seed: u64,
    /// Fraction of targets with no observations at all
    pub no_data_fraction: f64,
    /// Fraction of targets carrying an injected transit
    pub planet_fraction: f64,
    /// Fraction of targets carrying an eclipsing-binary signature
    pub binary_fraction: f64,
    pub cadence_minutes: f64,
    pub baseline_days: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            seed: 0,
            no_data_fraction: 0.55,
            planet_fraction: 0.05,
            binary_fraction: 0.03,
            cadence_minutes: 30.0,
            baseline_days: 27.4,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

/// Load configuration from an explicit path or the platform default
/// locations.
///
/// An explicit path that is missing or malformed is an error. With no
/// explicit path, a missing file degrades to compiled defaults with a
/// warning; a present but malformed file is still an error (silently
/// ignoring an operator's file would hide typos).
pub fn load_config(explicit: Option<&Path>) -> Result<SurveyConfig> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(Error::Config(format!("Config file not found: {}", p.display())));
            }
            Some(p.to_path_buf())
        }
        None => default_config_path(),
    };

    match path {
        Some(p) => {
            let raw = std::fs::read_to_string(&p)?;
            let config: SurveyConfig = toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("Failed to parse {}: {}", p.display(), e)))?;
            info!(path = %p.display(), "Loaded configuration");
            Ok(config)
        }
        None => {
            warn!("No config file found, using compiled defaults");
            Ok(SurveyConfig::default())
        }
    }
}

/// First existing config file among the platform default locations
fn default_config_path() -> Option<PathBuf> {
    if let Some(user) = dirs::config_dir().map(|d| d.join("starsweep").join("config.toml")) {
        if user.exists() {
            return Some(user);
        }
    }
    if cfg!(target_os = "linux") {
        let system = PathBuf::from("/etc/starsweep/config.toml");
        if system.exists() {
            return Some(system);
        }
    }
    None
}

/// Data directory resolution following the priority order:
/// CLI argument, then environment variable, then config file, then the
/// OS-dependent compiled default.
pub fn resolve_data_dir(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config_data_dir: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = config_data_dir {
        return path.to_path_buf();
    }

    default_data_dir()
}

/// OS-dependent default data directory
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("starsweep"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/starsweep"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("starsweep"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/starsweep"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("starsweep"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\starsweep"))
    } else {
        PathBuf::from("./starsweep_data")
    }
}

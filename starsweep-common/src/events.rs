//! Event types for the starsweep survey
//!
//! Provides the shared event enum and EventBus used to report survey
//! progress to in-process consumers (console reporter, tests, any future
//! surface). Events are broadcast lossily; a slow or absent consumer never
//! blocks the survey loop.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{QualityLabel, TargetId, TargetStatus};

/// Worker pool counters at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Total tasks accepted since startup
    pub submitted: u64,
    /// Total tasks that produced a result
    pub completed: u64,
    /// Tasks currently running
    pub in_progress: usize,
}

/// Survey-loop counters for the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Targets that reached a terminal analysis status this session
    pub analyzed: u64,
    /// Targets that exited early (no data, processing failed)
    pub skipped: u64,
    /// Confirmed candidates this session
    pub candidates: u64,
    /// Detections rejected by vetting this session
    pub rejected: u64,
    /// Targets that failed with an unexpected error this session
    pub errors: u64,
    /// Tracker size including previous sessions
    pub total_analyzed: u64,
}

/// Survey event types
///
/// Broadcast via [`EventBus`]. Serializable with a `type` tag so external
/// consumers can be attached later without changing emitters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SurveyEvent {
    /// Survey loop started
    SurveyStarted {
        /// Identifier for this run, carried by the closing event too
        session_id: Uuid,
        /// Worker pool capacity
        workers: usize,
        /// Tracker size loaded from previous sessions
        previously_analyzed: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Target handed to the worker pool
    TargetSubmitted {
        target: TargetId,
        /// Pool occupancy after the submit
        active: usize,
        capacity: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Target reached a terminal status
    TargetCompleted {
        target: TargetId,
        status: TargetStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A detection passed vetting and was persisted
    CandidateConfirmed {
        target: TargetId,
        period_days: f64,
        depth: f64,
        /// Best strength statistic across estimators
        snr: f64,
        score: u8,
        quality: QualityLabel,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A significant detection failed the vetting battery
    CandidateRejected {
        target: TargetId,
        /// Every failing test, in battery order
        reasons: Vec<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic progress snapshot (default every 2 s)
    StatsSnapshot {
        session: SessionSnapshot,
        pool: PoolSnapshot,
        /// Targets analyzed per minute over the session so far
        rate_per_min: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Survey loop exited after draining the pool and flushing stores
    SurveyStopped {
        session_id: Uuid,
        analyzed: u64,
        candidates: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for survey events
///
/// Wraps `tokio::sync::broadcast`. Every subscriber receives every event
/// emitted after it subscribed; when a subscriber lags past the channel
/// capacity it loses the oldest events, never blocking emitters.
pub struct EventBus {
    tx: broadcast::Sender<SurveyEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SurveyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// The survey loop must keep scanning with zero subscribers attached,
    /// so every emitter in this workspace uses the lossy form.
    pub fn emit_lossy(&self, event: SurveyEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

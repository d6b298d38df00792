//! Append-only job event models (PRD-08).
//!
//! Events are the audit trail and the replay source for progress
//! streaming. They are never updated or deleted, and within one job they
//! are strictly ordered by `sequence` (assigned at append, not
//! wall-clock, so ordering has no ties).

use serde::{Deserialize, Serialize};
use triage_core::types::{DbId, Timestamp};

use super::status::JobStatus;

/// Event type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    StageStarted,
    StageCompleted,
    StageFailed,
    LifecycleTransition,
}

impl EventKind {
    /// Wire/database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StageStarted => "stage-started",
            Self::StageCompleted => "stage-completed",
            Self::StageFailed => "stage-failed",
            Self::LifecycleTransition => "lifecycle-transition",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stage-started" => Some(Self::StageStarted),
            "stage-completed" => Some(Self::StageCompleted),
            "stage-failed" => Some(Self::StageFailed),
            "lifecycle-transition" => Some(Self::LifecycleTransition),
            _ => None,
        }
    }
}

/// A stored job event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub id: DbId,
    pub job_id: DbId,
    /// Per-job sequence number, strictly increasing from 1.
    pub sequence: i64,
    pub kind: EventKind,
    /// Stage name for stage events; `None` for lifecycle transitions.
    pub stage: Option<String>,
    pub message: String,
    /// Overall job progress at the time of the event, 0–100.
    pub progress_percent: i16,
    /// Event-specific structured detail (counts, error info, artifacts).
    pub detail: serde_json::Value,
    pub created_at: Timestamp,
}

impl JobEvent {
    /// Whether this event marks the job's arrival in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::LifecycleTransition
            && self
                .detail
                .get("status")
                .and_then(|s| s.as_str())
                .map(|s| {
                    matches!(s, "completed" | "failed" | "cancelled")
                })
                .unwrap_or(false)
    }
}

/// An event awaiting append; the store assigns id, sequence, timestamp.
#[derive(Debug, Clone)]
pub struct NewJobEvent {
    pub kind: EventKind,
    pub stage: Option<String>,
    pub message: String,
    pub progress_percent: i16,
    pub detail: serde_json::Value,
}

impl NewJobEvent {
    pub fn stage_started(stage: &str, progress: i16) -> Self {
        Self {
            kind: EventKind::StageStarted,
            stage: Some(stage.to_string()),
            message: format!("Stage {stage} started"),
            progress_percent: progress,
            detail: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn stage_completed(
        stage: &str,
        progress: i16,
        message: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            kind: EventKind::StageCompleted,
            stage: Some(stage.to_string()),
            message: message.into(),
            progress_percent: progress,
            detail,
        }
    }

    pub fn stage_failed(
        stage: &str,
        progress: i16,
        message: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            kind: EventKind::StageFailed,
            stage: Some(stage.to_string()),
            message: message.into(),
            progress_percent: progress,
            detail,
        }
    }

    /// A lifecycle transition into `status`.
    pub fn lifecycle(status: JobStatus, progress: i16, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::LifecycleTransition,
            stage: None,
            message: message.into(),
            progress_percent: progress,
            detail: serde_json::json!({ "status": status.label() }),
        }
    }
}

//! Job lifecycle status mapping to the `job_statuses` lookup table.
//!
//! Discriminant values match the seed data order (1-based) in the
//! migration. The legal transition graph is enforced here so both store
//! backends share one source of truth.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

/// Job lifecycle status.
///
/// `draft → pending → running → {completed | failed}`; `pending` and
/// `running` may also move to `cancelled`. No transition skips states and
/// terminal states are sinks.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Draft = 1,
    Pending = 2,
    Running = 3,
    Completed = 4,
    Failed = 5,
    Cancelled = 6,
}

impl JobStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Resolve a database status ID to the corresponding enum variant.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Draft),
            2 => Some(Self::Pending),
            3 => Some(Self::Running),
            4 => Some(Self::Completed),
            5 => Some(Self::Failed),
            6 => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Human-readable label matching the `label` column in `job_statuses`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed, failed, and cancelled jobs never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a direct transition from `self` to `next` is legal.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl From<JobStatus> for StatusId {
    fn from(value: JobStatus) -> Self {
        value as StatusId
    }
}

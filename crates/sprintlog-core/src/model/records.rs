//! Output records produced by the reconstruction engine.
//!
//! Every record has a natural primary key; the sink upserts on that key and
//! overwrites all other columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::DomainId;
use super::stage::Stage;

/// Assignee value recorded when an issue is explicitly unassigned.
pub const UNASSIGNED: &str = "<unassigned>";

/// Read-only sprint reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SprintMetadata {
    pub sprint_id: DomainId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SprintMetadata {
    #[must_use]
    pub fn stage_at(&self, at: DateTime<Utc>) -> Stage {
        Stage::classify(at, self.started_at, self.completed_at)
    }
}

/// An issue's membership in one sprint. Primary key: `(sprint_id, issue_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipInterval {
    pub sprint_id: DomainId,
    pub issue_id: DomainId,
    pub added_at: Option<DateTime<Utc>>,
    pub added_stage: Option<Stage>,
    pub removed_at: Option<DateTime<Utc>>,
    pub is_removed: bool,
}

impl MembershipInterval {
    /// `true` while no removal is recorded.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.removed_at.is_none()
    }
}

/// A span during which an issue sat in a sprint.
/// Primary key: `(issue_id, sprint_id, start_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageHistoryRecord {
    pub issue_id: DomainId,
    pub sprint_id: DomainId,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Which single-valued field a [`FieldInterval`] tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Status,
    Assignee,
}

impl TrackedField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Assignee => "assignee",
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A span during which a status or assignee held one value.
/// Primary key: `(field, issue_id, start_at)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInterval {
    pub field: TrackedField,
    pub issue_id: DomainId,
    pub value: String,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
}

/// Anything the engine hands to a [`crate::sink::Sink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Membership(MembershipInterval),
    StageHistory(StageHistoryRecord),
    Field(FieldInterval),
}

impl Record {
    /// Short label for logs and error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Membership(_) => "sprint_issue",
            Self::StageHistory(_) => "issue_sprints_history",
            Self::Field(interval) => match interval.field {
                TrackedField::Status => "issue_status_history",
                TrackedField::Assignee => "issue_assignee_history",
            },
        }
    }
}

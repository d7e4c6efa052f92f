//! When, relative to a sprint's lifetime, an issue joined it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sprint stage at the moment an issue was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    BeforeSprint,
    DuringSprint,
    AfterSprint,
}

/// Error returned when parsing an unknown stage string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sprint stage '{raw}': expected BEFORE_SPRINT, DURING_SPRINT or AFTER_SPRINT")]
pub struct UnknownStage {
    pub raw: String,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeSprint => "BEFORE_SPRINT",
            Self::DuringSprint => "DURING_SPRINT",
            Self::AfterSprint => "AFTER_SPRINT",
        }
    }

    /// Classify `at` against a sprint's start and completion times.
    ///
    /// Both boundaries are inclusive for `DuringSprint`: an addition at
    /// exactly `started` or exactly `completed` is during the sprint.
    #[must_use]
    pub fn classify(
        at: DateTime<Utc>,
        started: Option<DateTime<Utc>>,
        completed: Option<DateTime<Utc>>,
    ) -> Self {
        let Some(started) = started else {
            return Self::BeforeSprint;
        };
        if started > at {
            return Self::BeforeSprint;
        }
        match completed {
            None => Self::DuringSprint,
            Some(completed) if completed < at => Self::AfterSprint,
            Some(_) => Self::DuringSprint,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BEFORE_SPRINT" => Ok(Self::BeforeSprint),
            "DURING_SPRINT" => Ok(Self::DuringSprint),
            "AFTER_SPRINT" => Ok(Self::AfterSprint),
            _ => Err(UnknownStage { raw: s.to_string() }),
        }
    }
}

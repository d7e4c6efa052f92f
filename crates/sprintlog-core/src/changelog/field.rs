//! Changelog field names.
//!
//! The tracker reports field names as free-form strings. Only three matter
//! to interval reconstruction; everything else is carried through as
//! [`ChangeField::Other`] so the dispatcher can ignore it.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// The field a changelog item modified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeField {
    /// Workflow status (`status`).
    Status,
    /// Assigned user (`assignee`).
    Assignee,
    /// Sprint membership list (`Sprint`).
    Sprint,
    /// Any other field, kept verbatim.
    Other(String),
}

impl ChangeField {
    /// The tracker's own spelling of the field name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Status => "status",
            Self::Assignee => "assignee",
            Self::Sprint => "Sprint",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ChangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeField {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "status" => Self::Status,
            "assignee" => Self::Assignee,
            "Sprint" => Self::Sprint,
            other => Self::Other(other.to_string()),
        })
    }
}

impl From<&str> for ChangeField {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(field) => field,
            Err(never) => match never {},
        }
    }
}

// Custom serde: serialize as the tracker's field name.
impl Serialize for ChangeField {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChangeField {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

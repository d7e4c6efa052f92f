//! Issue changelog input model.
//!
//! A [`ChangeEvent`] is one field transition on one issue, already fetched
//! and deserialized by the collection layer. Events for an issue are
//! grouped into an [`IssueChangelog`] and fed to the engine in order.

pub mod field;
pub mod parser;
pub mod sprint_set;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use field::ChangeField;

/// A single recorded field transition on an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Tracker-side numeric issue id.
    #[serde(rename = "issue_id")]
    pub issue_source_id: u64,
    pub field: ChangeField,
    /// Raw value before the change.
    #[serde(rename = "from", default)]
    pub from_value: String,
    /// Raw value after the change.
    #[serde(rename = "to", default)]
    pub to_value: String,
    #[serde(rename = "created")]
    pub occurred_at: DateTime<Utc>,
}

/// All events for one issue, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueChangelog {
    pub issue_source_id: u64,
    pub events: Vec<ChangeEvent>,
}

/// Group events by issue.
///
/// Issues appear in order of their first event; each issue keeps its events
/// in delivery order. Nothing is re-sorted by time.
#[must_use]
pub fn group_by_issue(events: Vec<ChangeEvent>) -> Vec<IssueChangelog> {
    let mut slots: HashMap<u64, usize> = HashMap::new();
    let mut grouped: Vec<IssueChangelog> = Vec::new();

    for event in events {
        let slot = *slots.entry(event.issue_source_id).or_insert_with(|| {
            grouped.push(IssueChangelog {
                issue_source_id: event.issue_source_id,
                events: Vec::new(),
            });
            grouped.len() - 1
        });
        grouped[slot].events.push(event);
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(issue: u64, minute: u32) -> ChangeEvent {
        ChangeEvent {
            issue_source_id: issue,
            field: ChangeField::Status,
            from_value: String::new(),
            to_value: format!("s{minute}"),
            occurred_at: Utc
                .with_ymd_and_hms(2021, 6, 1, 9, minute, 0)
                .single()
                .expect("date"),
        }
    }

    #[test]
    fn grouping_keeps_first_seen_issue_order() {
        let grouped = group_by_issue(vec![event(7, 1), event(3, 2), event(7, 3), event(3, 4)]);
        let ids: Vec<u64> = grouped.iter().map(|g| g.issue_source_id).collect();
        assert_eq!(ids, vec![7, 3]);
        assert_eq!(grouped[0].events.len(), 2);
        assert_eq!(grouped[0].events[1].to_value, "s3");
    }

    #[test]
    fn grouping_does_not_resort_by_time() {
        let grouped = group_by_issue(vec![event(1, 30), event(1, 10)]);
        assert_eq!(grouped[0].events[0].to_value, "s30");
        assert_eq!(grouped[0].events[1].to_value, "s10");
    }

    #[test]
    fn deserializes_tracker_field_names() {
        let json = r#"{"issue_id": 10, "field": "Sprint", "from": "1,2", "to": "2,3", "created": "2021-06-01T10:00:00Z"}"#;
        let parsed: ChangeEvent = serde_json::from_str(json).expect("parse");
        assert_eq!(parsed.issue_source_id, 10);
        assert_eq!(parsed.field, ChangeField::Sprint);
        assert_eq!(parsed.from_value, "1,2");
        assert_eq!(parsed.to_value, "2,3");
    }

    #[test]
    fn missing_from_and_to_default_to_empty() {
        let json = r#"{"issue_id": 4, "field": "assignee", "created": "2021-06-01T10:00:00+02:00"}"#;
        let parsed: ChangeEvent = serde_json::from_str(json).expect("parse");
        assert!(parsed.from_value.is_empty());
        assert!(parsed.to_value.is_empty());
        assert_eq!(
            parsed.occurred_at,
            Utc.with_ymd_and_hms(2021, 6, 1, 8, 0, 0).single().expect("date")
        );
    }
}

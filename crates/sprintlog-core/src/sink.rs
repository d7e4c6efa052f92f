//! Record persistence capability.
//!
//! The engine never talks to a database directly. It hands each record to a
//! [`Sink`], which must upsert by the record's primary key and overwrite
//! every other column on conflict. [`crate::db::sink::SqliteSink`] is the
//! production implementation; [`MemorySink`] keeps everything in maps and
//! backs dry runs and tests.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::DependencyError;
use crate::model::{
    DomainId, FieldInterval, MembershipInterval, Record, StageHistoryRecord, TrackedField,
};

/// Upsert-by-primary-key persistence.
pub trait Sink {
    /// Insert `record`, or overwrite the row with the same primary key.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError`] if the write fails.
    fn persist(&mut self, record: &Record) -> Result<(), DependencyError>;
}

type FieldKey = (TrackedField, DomainId, DateTime<Utc>);
type HistoryKey = (DomainId, DomainId, DateTime<Utc>);

/// In-memory sink with the same key and overwrite rules as the SQLite sink.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub memberships: BTreeMap<(DomainId, DomainId), MembershipInterval>,
    pub stage_history: BTreeMap<HistoryKey, StageHistoryRecord>,
    pub fields: BTreeMap<FieldKey, FieldInterval>,
    /// Number of `persist` calls, including overwrites.
    pub writes: usize,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Intervals for one field of one issue, ordered by start time.
    #[must_use]
    pub fn field_history(&self, field: TrackedField, issue_id: &DomainId) -> Vec<&FieldInterval> {
        self.fields
            .values()
            .filter(|interval| interval.field == field && &interval.issue_id == issue_id)
            .collect()
    }

    #[must_use]
    pub fn membership(
        &self,
        sprint_id: &DomainId,
        issue_id: &DomainId,
    ) -> Option<&MembershipInterval> {
        self.memberships.get(&(sprint_id.clone(), issue_id.clone()))
    }
}

impl Sink for MemorySink {
    fn persist(&mut self, record: &Record) -> Result<(), DependencyError> {
        self.writes += 1;
        match record {
            Record::Membership(m) => {
                self.memberships
                    .insert((m.sprint_id.clone(), m.issue_id.clone()), m.clone());
            }
            Record::StageHistory(h) => {
                self.stage_history.insert(
                    (h.issue_id.clone(), h.sprint_id.clone(), h.start_at),
                    h.clone(),
                );
            }
            Record::Field(f) => {
                self.fields
                    .insert((f.field, f.issue_id.clone(), f.start_at), f.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn same_key_overwrites() {
        let mut sink = MemorySink::new();
        let at = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).single().expect("date");
        let issue = DomainId::new("jira:Issue:1:10");
        let mut interval = FieldInterval {
            field: TrackedField::Status,
            issue_id: issue.clone(),
            value: "Open".into(),
            start_at: at,
            end_at: None,
        };
        sink.persist(&Record::Field(interval.clone())).expect("persist");
        interval.end_at = Some(at + chrono::Duration::hours(1));
        sink.persist(&Record::Field(interval)).expect("persist");

        let history = sink.field_history(TrackedField::Status, &issue);
        assert_eq!(history.len(), 1);
        assert!(history[0].end_at.is_some());
        assert_eq!(sink.writes, 2);
    }

    #[test]
    fn status_and_assignee_do_not_share_keys() {
        let mut sink = MemorySink::new();
        let at = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).single().expect("date");
        let issue = DomainId::new("jira:Issue:1:10");
        for field in [TrackedField::Status, TrackedField::Assignee] {
            sink.persist(&Record::Field(FieldInterval {
                field,
                issue_id: issue.clone(),
                value: "x".into(),
                start_at: at,
                end_at: None,
            }))
            .expect("persist");
        }
        assert_eq!(sink.fields.len(), 2);
    }
}

//! Batch driver over grouped changelogs.
//!
//! Issues are processed independently. A malformed sprint list drops one
//! event; a collaborator failure abandons the rest of that issue's changelog
//! and discards its unflushed state, then the batch moves on to the next
//! issue. Accumulated memberships are flushed once at the end.

use serde::Serialize;

use super::{FeedOutcome, ReconcileError, Reconciler};
use crate::changelog::IssueChangelog;

// ---------------------------------------------------------------------------
// BatchReport
// ---------------------------------------------------------------------------

/// One issue whose changelog was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueFailure {
    pub issue_source_id: u64,
    /// Stable error code, e.g. `E3002`.
    pub code: String,
    pub error: String,
}

/// Statistics returned after a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Number of issue changelogs seen.
    pub issues: usize,
    /// Events routed to a handler.
    pub processed: usize,
    /// Events on fields the engine does not track.
    pub skipped: usize,
    /// Events dropped because their value did not parse.
    pub errored: usize,
    /// Records written by the final flush.
    pub flushed: usize,
    /// Sprint store queries issued.
    pub sprint_queries: usize,
    pub failed_issues: Vec<IssueFailure>,
}

impl BatchReport {
    /// `true` when no issue was abandoned.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed_issues.is_empty()
    }

    /// Fold another worker's report into this one.
    pub fn merge(&mut self, other: Self) {
        self.issues += other.issues;
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.errored += other.errored;
        self.flushed += other.flushed;
        self.sprint_queries += other.sprint_queries;
        self.failed_issues.extend(other.failed_issues);
    }
}

// ---------------------------------------------------------------------------
// run_batch
// ---------------------------------------------------------------------------

/// Feed every changelog through `reconciler`, then flush it.
///
/// # Errors
///
/// Only the final flush can fail the batch; per-issue failures are
/// collected in [`BatchReport::failed_issues`].
pub fn run_batch(
    mut reconciler: Reconciler<'_>,
    changelogs: &[IssueChangelog],
) -> Result<BatchReport, ReconcileError> {
    let mut report = BatchReport::default();

    for changelog in changelogs {
        report.issues += 1;
        for event in &changelog.events {
            match reconciler.feed(event) {
                Ok(FeedOutcome::Applied) => report.processed += 1,
                Ok(FeedOutcome::Ignored) => report.skipped += 1,
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(
                        issue_source_id = changelog.issue_source_id,
                        error = %e,
                        "dropping changelog event"
                    );
                    report.errored += 1;
                }
                Err(e) => {
                    tracing::error!(
                        issue_source_id = changelog.issue_source_id,
                        code = %e.code(),
                        error = %e,
                        "abandoning issue changelog"
                    );
                    reconciler.abandon_issue(changelog.issue_source_id);
                    report.failed_issues.push(IssueFailure {
                        issue_source_id: changelog.issue_source_id,
                        code: e.code().code().to_string(),
                        error: e.to_string(),
                    });
                    break;
                }
            }
        }
    }

    report.sprint_queries = reconciler.sprint_queries();
    report.flushed = reconciler.finish()?;

    tracing::info!(
        issues = report.issues,
        processed = report.processed,
        skipped = report.skipped,
        errored = report.errored,
        failed = report.failed_issues.len(),
        flushed = report.flushed,
        "reconcile batch complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::{ChangeEvent, ChangeField, group_by_issue};
    use crate::error::DependencyError;
    use crate::model::{DomainId, PrefixedIdGenerator, Record, SprintMetadata, TrackedField};
    use crate::reconcile::PassContext;
    use crate::sink::{MemorySink, Sink};
    use crate::sprint_cache::SprintStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, day, 9, 0, 0)
            .single()
            .expect("valid date")
    }

    struct OneSprint;

    impl SprintStore for OneSprint {
        fn find_sprint(
            &self,
            sprint_id: &DomainId,
        ) -> Result<Option<SprintMetadata>, DependencyError> {
            if sprint_id.as_str() == "jira:Sprint:1:5" {
                Ok(Some(SprintMetadata {
                    sprint_id: sprint_id.clone(),
                    name: Some("Sprint 5".into()),
                    started_at: Some(t(3)),
                    completed_at: Some(t(17)),
                }))
            } else {
                Ok(None)
            }
        }
    }

    /// Rejects status writes for one issue.
    struct FlakySink {
        inner: MemorySink,
        poisoned_issue: DomainId,
    }

    impl Sink for FlakySink {
        fn persist(&mut self, record: &Record) -> Result<(), DependencyError> {
            if matches!(record, Record::Field(f) if f.issue_id == self.poisoned_issue) {
                return Err(DependencyError::Unavailable("disk full".into()));
            }
            self.inner.persist(record)
        }
    }

    fn event(
        issue: u64,
        field: ChangeField,
        from: &str,
        to: &str,
        at: DateTime<Utc>,
    ) -> ChangeEvent {
        ChangeEvent {
            issue_source_id: issue,
            field,
            from_value: from.into(),
            to_value: to.into(),
            occurred_at: at,
        }
    }

    #[test]
    fn malformed_sprint_list_drops_only_that_event() {
        let changelogs = group_by_issue(vec![
            event(10, ChangeField::Sprint, "", "5", t(4)),
            event(10, ChangeField::Sprint, "5", "five", t(5)),
            event(10, ChangeField::Status, "", "Done", t(6)),
        ]);
        let ids = PrefixedIdGenerator::new("jira");
        let mut sink = MemorySink::new();
        let reconciler = Reconciler::new(PassContext::at(1, t(20)), &ids, &OneSprint, &mut sink);
        let report = run_batch(reconciler, &changelogs).expect("batch");

        assert_eq!(report.processed, 2);
        assert_eq!(report.errored, 1);
        assert!(report.is_success());
        assert_eq!(report.flushed, 2);

        let membership = sink
            .membership(&DomainId::new("jira:Sprint:1:5"), &DomainId::new("jira:Issue:1:10"))
            .expect("membership");
        assert!(membership.is_open());
    }

    #[test]
    fn failing_issue_is_isolated() {
        let changelogs = group_by_issue(vec![
            event(10, ChangeField::Sprint, "", "5", t(4)),
            event(10, ChangeField::Status, "", "Done", t(6)),
            event(11, ChangeField::Sprint, "", "5", t(4)),
            event(11, ChangeField::Status, "", "Done", t(6)),
            event(11, ChangeField::Other("labels".into()), "", "x", t(7)),
        ]);
        let ids = PrefixedIdGenerator::new("jira");
        let mut sink = FlakySink {
            inner: MemorySink::new(),
            poisoned_issue: DomainId::new("jira:Issue:1:10"),
        };
        let reconciler = Reconciler::new(PassContext::at(1, t(20)), &ids, &OneSprint, &mut sink);
        let report = run_batch(reconciler, &changelogs).expect("batch");

        assert_eq!(report.issues, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed_issues.len(), 1);
        assert_eq!(report.failed_issues[0].issue_source_id, 10);
        assert_eq!(report.failed_issues[0].code, "E3002");

        let sprint = DomainId::new("jira:Sprint:1:5");
        assert!(sink.inner.membership(&sprint, &DomainId::new("jira:Issue:1:10")).is_none());
        assert!(sink.inner.membership(&sprint, &DomainId::new("jira:Issue:1:11")).is_some());
        assert_eq!(
            sink.inner
                .field_history(TrackedField::Status, &DomainId::new("jira:Issue:1:11"))
                .len(),
            1
        );
    }

    #[test]
    fn sprint_queries_are_counted_once_per_sprint() {
        let changelogs = group_by_issue(vec![
            event(10, ChangeField::Sprint, "", "5,6", t(4)),
            event(11, ChangeField::Sprint, "", "5,6", t(4)),
            event(12, ChangeField::Sprint, "", "5", t(4)),
        ]);
        let ids = PrefixedIdGenerator::new("jira");
        let mut sink = MemorySink::new();
        let reconciler = Reconciler::new(PassContext::at(1, t(20)), &ids, &OneSprint, &mut sink);
        let report = run_batch(reconciler, &changelogs).expect("batch");
        assert_eq!(report.sprint_queries, 2);
    }

    #[test]
    fn merge_sums_counters() {
        let mut left = BatchReport {
            issues: 2,
            processed: 5,
            ..BatchReport::default()
        };
        let right = BatchReport {
            issues: 1,
            processed: 1,
            failed_issues: vec![IssueFailure {
                issue_source_id: 3,
                code: "E3002".into(),
                error: "boom".into(),
            }],
            ..BatchReport::default()
        };
        left.merge(right);
        assert_eq!(left.issues, 3);
        assert_eq!(left.processed, 6);
        assert!(!left.is_success());
    }
}

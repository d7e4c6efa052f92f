//! Integration tests: changelog document → engine → SQLite projection.
//!
//! Covers the full path a `reconcile` run takes:
//!   - JSONL parsing with malformed lines skipped
//!   - sprint membership, stage history, status and assignee reconstruction
//!   - a second pass over the same input overwrites instead of duplicating
//!   - a failing sprint lookup isolates one issue

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use sprintlog_core::changelog::group_by_issue;
use sprintlog_core::changelog::parser::parse_document;
use sprintlog_core::db::sink::{SqliteSink, SqliteSprintStore, upsert_sprint};
use sprintlog_core::db::{migrations, query, to_us};
use sprintlog_core::model::{DomainId, PrefixedIdGenerator, SprintMetadata, UNASSIGNED};
use sprintlog_core::{BatchReport, PassContext, Reconciler, run_batch};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const CHANGELOG: &str = r#"# issue 10: planned into sprint 5, moved to 6 mid-sprint
{"issue_id":10,"field":"status","from":"","to":"To Do","created":"2021-06-01T09:00:00Z"}
{"issue_id":10,"field":"Sprint","from":"","to":"5","created":"2021-06-02T09:00:00Z"}
{"issue_id":10,"field":"assignee","from":"","to":"alice","created":"2021-06-03T09:00:00Z"}
{"issue_id":10,"field":"status","from":"To Do","to":"In Progress","created":"2021-06-05T09:00:00Z"}
{"issue_id":10,"field":"Sprint","from":"5","to":"6","created":"2021-06-16T09:00:00Z"}
{"issue_id":10,"field":"assignee","from":"alice","to":"","created":"2021-06-20T09:00:00Z"}
{"issue_id":10,"field":"labels","from":"","to":"backend","created":"2021-06-20T10:00:00Z"}

this line is not json
{"issue_id":11,"field":"Sprint","from":"","to":"5, 99","created":"2021-06-08T09:00:00Z"}
"#;

fn t(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, day, 9, 0, 0)
        .single()
        .expect("valid date")
}

fn test_db() -> Connection {
    let mut conn = Connection::open_in_memory().expect("open in-memory db");
    migrations::migrate(&mut conn).expect("migrate schema");
    for (id, start, end) in [(5, t(3), t(15)), (6, t(16), t(30))] {
        upsert_sprint(
            &conn,
            &SprintMetadata {
                sprint_id: DomainId::new(format!("jira:Sprint:1:{id}")),
                name: Some(format!("Sprint {id}")),
                started_at: Some(start),
                completed_at: Some(end),
            },
        )
        .expect("seed sprint");
    }
    conn
}

fn reconcile(conn: &Connection, text: &str, now: DateTime<Utc>) -> (BatchReport, usize) {
    let parsed = parse_document(text);
    let changelogs = group_by_issue(parsed.events);
    let ids = PrefixedIdGenerator::new("jira");
    let store = SqliteSprintStore::new(conn);
    let mut sink = SqliteSink::new(conn);
    let reconciler = Reconciler::new(PassContext::at(1, now), &ids, &store, &mut sink);
    let report = run_batch(reconciler, &changelogs).expect("batch");
    (report, parsed.errors.len())
}

fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("count rows")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn full_changelog_reconstructs_every_history() {
    let conn = test_db();
    let (report, malformed) = reconcile(&conn, CHANGELOG, t(28));

    assert_eq!(malformed, 1);
    assert_eq!(report.issues, 2);
    assert_eq!(report.skipped, 1);
    assert!(report.is_success());

    let issue = "jira:Issue:1:10";

    let memberships = query::membership_for_issue(&conn, issue).expect("membership");
    assert_eq!(memberships.len(), 2);
    let sprint5 = memberships
        .iter()
        .find(|m| m.sprint_id == "jira:Sprint:1:5")
        .expect("sprint 5 row");
    assert_eq!(sprint5.added_at_us, Some(to_us(t(2))));
    assert_eq!(sprint5.added_stage.as_deref(), Some("BEFORE_SPRINT"));
    assert_eq!(sprint5.removed_at_us, Some(to_us(t(16))));
    assert!(sprint5.is_removed);
    let sprint6 = memberships
        .iter()
        .find(|m| m.sprint_id == "jira:Sprint:1:6")
        .expect("sprint 6 row");
    assert_eq!(sprint6.added_stage.as_deref(), Some("DURING_SPRINT"));
    assert!(!sprint6.is_removed);

    let stages = query::stage_history(&conn, issue).expect("stage history");
    let spans: Vec<_> = stages
        .iter()
        .map(|s| (s.sprint_id.as_str(), s.start_at_us, s.end_at_us))
        .collect();
    assert_eq!(
        spans,
        vec![
            ("jira:Sprint:1:5", to_us(t(2)), to_us(t(16))),
            ("jira:Sprint:1:6", to_us(t(16)), to_us(t(28))),
        ]
    );

    let statuses = query::status_history(&conn, issue).expect("status history");
    let spans: Vec<_> = statuses
        .iter()
        .map(|s| (s.value.as_str(), s.start_at_us, s.end_at_us))
        .collect();
    assert_eq!(
        spans,
        vec![
            ("To Do", to_us(t(1)), Some(to_us(t(5)))),
            ("In Progress", to_us(t(5)), Some(to_us(t(28)))),
        ]
    );

    let assignees = query::assignee_history(&conn, issue).expect("assignee history");
    assert_eq!(assignees.len(), 2);
    assert_eq!(assignees[0].value, "jira:User:1:alice");
    assert_eq!(assignees[1].value, UNASSIGNED);
}

#[test]
fn untracked_sprint_in_list_is_skipped() {
    let conn = test_db();
    reconcile(&conn, CHANGELOG, t(28));

    let memberships = query::membership_for_issue(&conn, "jira:Issue:1:11").expect("membership");
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].sprint_id, "jira:Sprint:1:5");
}

#[test]
fn second_pass_overwrites_provisional_rows() {
    let conn = test_db();
    reconcile(&conn, CHANGELOG, t(28));
    let counts_before: Vec<i64> = [
        "sprint_issues",
        "issue_sprints_history",
        "issue_status_history",
        "issue_assignee_history",
    ]
    .iter()
    .map(|table| row_count(&conn, table))
    .collect();

    reconcile(&conn, CHANGELOG, t(29));
    let counts_after: Vec<i64> = [
        "sprint_issues",
        "issue_sprints_history",
        "issue_status_history",
        "issue_assignee_history",
    ]
    .iter()
    .map(|table| row_count(&conn, table))
    .collect();
    assert_eq!(counts_before, counts_after);

    let statuses = query::status_history(&conn, "jira:Issue:1:10").expect("status history");
    assert_eq!(statuses[1].end_at_us, Some(to_us(t(29))));
}

#[test]
fn corrupt_sprint_row_fails_only_its_issues() {
    let conn = test_db();
    conn.execute(
        "UPDATE sprints SET completed_at_us = started_at_us - 1 WHERE sprint_id = 'jira:Sprint:1:6'",
        [],
    )
    .expect("corrupt sprint 6");

    let (report, _) = reconcile(&conn, CHANGELOG, t(28));
    assert!(!report.is_success());
    assert_eq!(report.failed_issues.len(), 1);
    assert_eq!(report.failed_issues[0].issue_source_id, 10);
    assert_eq!(report.failed_issues[0].code, "E2003");

    // Issue 10's unflushed membership is discarded; issue 11 still lands.
    assert!(
        query::membership_for_issue(&conn, "jira:Issue:1:10")
            .expect("membership")
            .is_empty()
    );
    assert_eq!(
        query::membership_for_issue(&conn, "jira:Issue:1:11")
            .expect("membership")
            .len(),
        1
    );
    // Rows persisted before the failure stay.
    assert!(
        !query::status_history(&conn, "jira:Issue:1:10")
            .expect("status")
            .is_empty()
    );
}

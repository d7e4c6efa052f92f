//! `SQLite` query helpers for the projection database.
//!
//! Typed read paths over the reconstructed history and the run log. All
//! functions take a shared `&Connection` and return `anyhow::Result<T>`
//! with typed structs (never raw rows). Timestamps stay in their stored
//! `*_at_us` form; callers convert with [`super::from_us`] when needed.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A row from `sprint_issues`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryMembership {
    pub sprint_id: String,
    pub sprint_name: Option<String>,
    pub issue_id: String,
    pub added_at_us: Option<i64>,
    pub added_stage: Option<String>,
    pub removed_at_us: Option<i64>,
    pub is_removed: bool,
}

/// A row from `issue_sprints_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryStageSpan {
    pub issue_id: String,
    pub sprint_id: String,
    pub start_at_us: i64,
    pub end_at_us: i64,
}

/// A row from `issue_status_history` or `issue_assignee_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFieldSpan {
    pub issue_id: String,
    pub value: String,
    pub start_at_us: i64,
    pub end_at_us: Option<i64>,
}

/// A row from `reconcile_runs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRun {
    pub run_id: i64,
    pub source_id: i64,
    pub started_at_us: i64,
    pub finished_at_us: i64,
    pub issues: i64,
    pub processed: i64,
    pub skipped: i64,
    pub errored: i64,
    pub flushed: i64,
    pub malformed_lines: i64,
    pub failed: i64,
}

/// A row from `failed_issues`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFailedIssue {
    pub run_id: i64,
    pub issue_source_id: i64,
    pub code: String,
    pub error: String,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Sprint memberships of one issue, oldest addition first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn membership_for_issue(conn: &Connection, issue_id: &str) -> Result<Vec<QueryMembership>> {
    let sql = "SELECT m.sprint_id, s.name, m.issue_id, m.added_at_us, m.added_stage, \
               m.removed_at_us, m.is_removed \
               FROM sprint_issues m LEFT JOIN sprints s ON s.sprint_id = m.sprint_id \
               WHERE m.issue_id = ?1 \
               ORDER BY m.added_at_us IS NULL, m.added_at_us ASC, m.sprint_id ASC";
    let mut stmt = conn
        .prepare(sql)
        .context("prepare membership_for_issue")?;
    let rows = stmt
        .query_map(params![issue_id], |row| {
            Ok(QueryMembership {
                sprint_id: row.get(0)?,
                sprint_name: row.get(1)?,
                issue_id: row.get(2)?,
                added_at_us: row.get(3)?,
                added_stage: row.get(4)?,
                removed_at_us: row.get(5)?,
                is_removed: row.get(6)?,
            })
        })
        .context("execute membership_for_issue")?;

    let mut memberships = Vec::new();
    for row in rows {
        memberships.push(row.context("read membership row")?);
    }
    Ok(memberships)
}

/// Sprint stage history spans of one issue, by start time.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn stage_history(conn: &Connection, issue_id: &str) -> Result<Vec<QueryStageSpan>> {
    let sql = "SELECT issue_id, sprint_id, start_at_us, end_at_us \
               FROM issue_sprints_history WHERE issue_id = ?1 \
               ORDER BY start_at_us ASC, sprint_id ASC";
    let mut stmt = conn.prepare(sql).context("prepare stage_history")?;
    let rows = stmt
        .query_map(params![issue_id], |row| {
            Ok(QueryStageSpan {
                issue_id: row.get(0)?,
                sprint_id: row.get(1)?,
                start_at_us: row.get(2)?,
                end_at_us: row.get(3)?,
            })
        })
        .context("execute stage_history")?;

    let mut spans = Vec::new();
    for row in rows {
        spans.push(row.context("read stage history row")?);
    }
    Ok(spans)
}

/// Status spans of one issue, by start time.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn status_history(conn: &Connection, issue_id: &str) -> Result<Vec<QueryFieldSpan>> {
    field_history(conn, "issue_status_history", "status", issue_id)
}

/// Assignee spans of one issue, by start time.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn assignee_history(conn: &Connection, issue_id: &str) -> Result<Vec<QueryFieldSpan>> {
    field_history(conn, "issue_assignee_history", "assignee", issue_id)
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Most recent runs first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn recent_runs(conn: &Connection, limit: u32) -> Result<Vec<QueryRun>> {
    let sql = "SELECT run_id, source_id, started_at_us, finished_at_us, issues, processed, \
               skipped, errored, flushed, malformed_lines, failed \
               FROM reconcile_runs ORDER BY started_at_us DESC, run_id DESC LIMIT ?1";
    let mut stmt = conn.prepare(sql).context("prepare recent_runs")?;
    let rows = stmt
        .query_map(params![limit], |row| {
            Ok(QueryRun {
                run_id: row.get(0)?,
                source_id: row.get(1)?,
                started_at_us: row.get(2)?,
                finished_at_us: row.get(3)?,
                issues: row.get(4)?,
                processed: row.get(5)?,
                skipped: row.get(6)?,
                errored: row.get(7)?,
                flushed: row.get(8)?,
                malformed_lines: row.get(9)?,
                failed: row.get(10)?,
            })
        })
        .context("execute recent_runs")?;

    let mut runs = Vec::new();
    for row in rows {
        runs.push(row.context("read run row")?);
    }
    Ok(runs)
}

/// Issues that failed in one run.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn failed_issues(conn: &Connection, run_id: i64) -> Result<Vec<QueryFailedIssue>> {
    let sql = "SELECT run_id, issue_source_id, code, error FROM failed_issues \
               WHERE run_id = ?1 ORDER BY issue_source_id ASC";
    let mut stmt = conn.prepare(sql).context("prepare failed_issues")?;
    let rows = stmt
        .query_map(params![run_id], |row| {
            Ok(QueryFailedIssue {
                run_id: row.get(0)?,
                issue_source_id: row.get(1)?,
                code: row.get(2)?,
                error: row.get(3)?,
            })
        })
        .context("execute failed_issues")?;

    let mut failures = Vec::new();
    for row in rows {
        failures.push(row.context("read failed issue row")?);
    }
    Ok(failures)
}

/// Time of the last recorded run, in microseconds. `0` when none.
///
/// # Errors
///
/// Returns an error if the query fails or no `projection_meta` row exists.
pub fn last_run_at(conn: &Connection) -> Result<i64> {
    conn.query_row(
        "SELECT last_run_at_us FROM projection_meta WHERE id = 1",
        [],
        |row| row.get(0),
    )
    .context("read projection_meta")
}

/// Open the projection if it exists and looks sane.
///
/// Returns `Ok(None)` when the file is missing or unreadable, so callers
/// can tell the user to run `sprintlog init`.
///
/// # Errors
///
/// Currently never fails; the `Result` leaves room for hard I/O errors.
pub fn try_open_projection(path: &std::path::Path) -> Result<Option<Connection>> {
    if !path.exists() {
        return Ok(None);
    }

    match super::open_projection(path) {
        Ok(conn) => {
            if last_run_at(&conn).is_ok() {
                Ok(Some(conn))
            } else {
                tracing::warn!(
                    path = %path.display(),
                    "projection database corrupt, needs init"
                );
                Ok(None)
            }
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to open projection database"
            );
            Ok(None)
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn field_history(
    conn: &Connection,
    table: &str,
    column: &str,
    issue_id: &str,
) -> Result<Vec<QueryFieldSpan>> {
    let sql = format!(
        "SELECT issue_id, {column}, start_at_us, end_at_us FROM {table} \
         WHERE issue_id = ?1 ORDER BY start_at_us ASC"
    );
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("prepare {table} query"))?;
    let rows = stmt
        .query_map(params![issue_id], |row| {
            Ok(QueryFieldSpan {
                issue_id: row.get(0)?,
                value: row.get(1)?,
                start_at_us: row.get(2)?,
                end_at_us: row.get(3)?,
            })
        })
        .with_context(|| format!("execute {table} query"))?;

    let mut spans = Vec::new();
    for row in rows {
        spans.push(row.with_context(|| format!("read {table} row"))?);
    }
    Ok(spans)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! SQLite adapters for the engine's collaborators.
//!
//! [`SqliteSink`] writes records with `INSERT .. ON CONFLICT DO UPDATE`,
//! overwriting every non-key column. [`SqliteSprintStore`] serves sprint
//! reference data from the `sprints` table. Both borrow a connection, so a
//! worker thread owns its connection and builds its adapters around it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::{from_us, to_us};
use crate::error::DependencyError;
use crate::model::{
    DomainId, FieldInterval, MembershipInterval, Record, SprintMetadata, Stage,
    StageHistoryRecord, TrackedField,
};
use crate::reconcile::batch::BatchReport;
use crate::sink::Sink;
use crate::sprint_cache::SprintStore;

// ---------------------------------------------------------------------------
// SqliteSink
// ---------------------------------------------------------------------------

pub struct SqliteSink<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSink<'conn> {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn upsert_membership(&self, m: &MembershipInterval) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO sprint_issues \
             (sprint_id, issue_id, added_at_us, added_stage, removed_at_us, is_removed) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(sprint_id, issue_id) DO UPDATE SET \
             added_at_us = excluded.added_at_us, \
             added_stage = excluded.added_stage, \
             removed_at_us = excluded.removed_at_us, \
             is_removed = excluded.is_removed",
            params![
                m.sprint_id.as_str(),
                m.issue_id.as_str(),
                m.added_at.map(to_us),
                m.added_stage.map(Stage::as_str),
                m.removed_at.map(to_us),
                m.is_removed,
            ],
        )?;
        Ok(())
    }

    fn upsert_stage_history(&self, h: &StageHistoryRecord) -> rusqlite::Result<()> {
        self.conn.execute(
            "INSERT INTO issue_sprints_history (issue_id, sprint_id, start_at_us, end_at_us) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(issue_id, sprint_id, start_at_us) DO UPDATE SET \
             end_at_us = excluded.end_at_us",
            params![
                h.issue_id.as_str(),
                h.sprint_id.as_str(),
                to_us(h.start_at),
                to_us(h.end_at),
            ],
        )?;
        Ok(())
    }

    fn upsert_field(&self, f: &FieldInterval) -> rusqlite::Result<()> {
        let sql = match f.field {
            TrackedField::Status => {
                "INSERT INTO issue_status_history (issue_id, start_at_us, status, end_at_us) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(issue_id, start_at_us) DO UPDATE SET \
                 status = excluded.status, end_at_us = excluded.end_at_us"
            }
            TrackedField::Assignee => {
                "INSERT INTO issue_assignee_history (issue_id, start_at_us, assignee, end_at_us) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(issue_id, start_at_us) DO UPDATE SET \
                 assignee = excluded.assignee, end_at_us = excluded.end_at_us"
            }
        };
        self.conn.prepare_cached(sql)?.execute(params![
            f.issue_id.as_str(),
            to_us(f.start_at),
            f.value,
            f.end_at.map(to_us),
        ])?;
        Ok(())
    }
}

impl Sink for SqliteSink<'_> {
    fn persist(&mut self, record: &Record) -> Result<(), DependencyError> {
        match record {
            Record::Membership(m) => self.upsert_membership(m)?,
            Record::StageHistory(h) => self.upsert_stage_history(h)?,
            Record::Field(f) => self.upsert_field(f)?,
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqliteSprintStore
// ---------------------------------------------------------------------------

pub struct SqliteSprintStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSprintStore<'conn> {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SprintStore for SqliteSprintStore<'_> {
    fn find_sprint(&self, sprint_id: &DomainId) -> Result<Option<SprintMetadata>, DependencyError> {
        let row = self
            .conn
            .query_row(
                "SELECT name, started_at_us, completed_at_us FROM sprints WHERE sprint_id = ?1",
                params![sprint_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((name, started_us, completed_us)) = row else {
            return Ok(None);
        };

        let malformed = |reason: &str| DependencyError::MalformedRecord {
            table: "sprints",
            key: sprint_id.to_string(),
            reason: reason.to_string(),
        };
        let started_at = started_us
            .map(|us| from_us(us).ok_or_else(|| malformed("started_at_us out of range")))
            .transpose()?;
        let completed_at = completed_us
            .map(|us| from_us(us).ok_or_else(|| malformed("completed_at_us out of range")))
            .transpose()?;
        if started_at
            .zip(completed_at)
            .is_some_and(|(start, end)| end < start)
        {
            return Err(malformed("completed before it started"));
        }

        Ok(Some(SprintMetadata {
            sprint_id: sprint_id.clone(),
            name,
            started_at,
            completed_at,
        }))
    }
}

// ---------------------------------------------------------------------------
// Reference data and run bookkeeping
// ---------------------------------------------------------------------------

/// Insert or replace one sprint's reference data.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn upsert_sprint(conn: &Connection, sprint: &SprintMetadata) -> Result<()> {
    conn.execute(
        "INSERT INTO sprints (sprint_id, name, started_at_us, completed_at_us, updated_at_us) \
         VALUES (?1, ?2, ?3, ?4, ?5) \
         ON CONFLICT(sprint_id) DO UPDATE SET \
         name = excluded.name, \
         started_at_us = excluded.started_at_us, \
         completed_at_us = excluded.completed_at_us, \
         updated_at_us = excluded.updated_at_us",
        params![
            sprint.sprint_id.as_str(),
            sprint.name,
            sprint.started_at.map(to_us),
            sprint.completed_at.map(to_us),
            Utc::now().timestamp_micros(),
        ],
    )
    .with_context(|| format!("upsert sprint {}", sprint.sprint_id))?;
    Ok(())
}

/// Timing and input accounting for one `reconcile` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMeta {
    pub source_id: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Input lines that did not parse as change events.
    pub malformed_lines: usize,
}

/// Record a finished run and its failed issues. Returns the run id.
///
/// # Errors
///
/// Returns an error if the transaction fails.
pub fn record_run(conn: &Connection, meta: &RunMeta, report: &BatchReport) -> Result<i64> {
    let tx = conn
        .unchecked_transaction()
        .context("begin run bookkeeping transaction")?;

    tx.execute(
        "INSERT INTO reconcile_runs \
         (source_id, started_at_us, finished_at_us, issues, processed, skipped, errored, \
          flushed, malformed_lines, failed) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            i64::try_from(meta.source_id).context("source id exceeds i64")?,
            to_us(meta.started_at),
            to_us(meta.finished_at),
            count(report.issues)?,
            count(report.processed)?,
            count(report.skipped)?,
            count(report.errored)?,
            count(report.flushed)?,
            count(meta.malformed_lines)?,
            count(report.failed_issues.len())?,
        ],
    )
    .context("insert reconcile run")?;
    let run_id = tx.last_insert_rowid();

    {
        let mut stmt = tx
            .prepare(
                "INSERT OR REPLACE INTO failed_issues (run_id, issue_source_id, code, error) \
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .context("prepare failed issue insert")?;
        for failure in &report.failed_issues {
            stmt.execute(params![
                run_id,
                i64::try_from(failure.issue_source_id).context("issue id exceeds i64")?,
                failure.code,
                failure.error,
            ])
            .with_context(|| format!("record failed issue {}", failure.issue_source_id))?;
        }
    }

    tx.execute(
        "UPDATE projection_meta SET last_run_at_us = ?1 WHERE id = 1",
        params![to_us(meta.finished_at)],
    )
    .context("update projection_meta")?;
    tx.commit().context("commit run bookkeeping")?;

    Ok(run_id)
}

fn count(n: usize) -> Result<i64> {
    i64::try_from(n).context("counter exceeds i64")
}

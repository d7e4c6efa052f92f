//! Canonical SQLite schema for the sprintlog projection.
//!
//! - `sprints` holds read-only sprint reference data
//! - `sprint_issues` holds one membership interval per `(sprint, issue)`
//! - `issue_sprints_history`, `issue_status_history` and
//!   `issue_assignee_history` hold the reconstructed spans
//! - `reconcile_runs` / `failed_issues` record batch outcomes for retry
//!
//! Every timestamp is stored as microseconds since the Unix epoch in an
//! `*_at_us` column.

/// Migration v1: reference and interval tables plus projection metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sprints (
    sprint_id TEXT PRIMARY KEY,
    name TEXT,
    started_at_us INTEGER,
    completed_at_us INTEGER,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sprint_issues (
    sprint_id TEXT NOT NULL,
    issue_id TEXT NOT NULL,
    added_at_us INTEGER,
    added_stage TEXT CHECK (
        added_stage IS NULL
        OR added_stage IN ('BEFORE_SPRINT', 'DURING_SPRINT', 'AFTER_SPRINT')
    ),
    removed_at_us INTEGER,
    is_removed INTEGER NOT NULL DEFAULT 0 CHECK (is_removed IN (0, 1)),
    PRIMARY KEY (sprint_id, issue_id)
);

CREATE TABLE IF NOT EXISTS issue_sprints_history (
    issue_id TEXT NOT NULL,
    sprint_id TEXT NOT NULL,
    start_at_us INTEGER NOT NULL,
    end_at_us INTEGER NOT NULL,
    PRIMARY KEY (issue_id, sprint_id, start_at_us)
);

CREATE TABLE IF NOT EXISTS issue_status_history (
    issue_id TEXT NOT NULL,
    start_at_us INTEGER NOT NULL,
    status TEXT NOT NULL,
    end_at_us INTEGER,
    PRIMARY KEY (issue_id, start_at_us)
);

CREATE TABLE IF NOT EXISTS issue_assignee_history (
    issue_id TEXT NOT NULL,
    start_at_us INTEGER NOT NULL,
    assignee TEXT NOT NULL,
    end_at_us INTEGER,
    PRIMARY KEY (issue_id, start_at_us)
);

CREATE TABLE IF NOT EXISTS projection_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    last_run_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO projection_meta (id, schema_version, last_run_at_us)
VALUES (1, 1, 0);
";

/// Migration v2: read-path indexes and run bookkeeping.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_sprint_issues_issue
    ON sprint_issues(issue_id, sprint_id);

CREATE INDEX IF NOT EXISTS idx_issue_sprints_history_sprint
    ON issue_sprints_history(sprint_id, start_at_us);

CREATE TABLE IF NOT EXISTS reconcile_runs (
    run_id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL,
    started_at_us INTEGER NOT NULL,
    finished_at_us INTEGER NOT NULL,
    issues INTEGER NOT NULL,
    processed INTEGER NOT NULL,
    skipped INTEGER NOT NULL,
    errored INTEGER NOT NULL,
    flushed INTEGER NOT NULL,
    malformed_lines INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS failed_issues (
    run_id INTEGER NOT NULL REFERENCES reconcile_runs(run_id) ON DELETE CASCADE,
    issue_source_id INTEGER NOT NULL,
    code TEXT NOT NULL,
    error TEXT NOT NULL,
    PRIMARY KEY (run_id, issue_source_id)
);

CREATE INDEX IF NOT EXISTS idx_reconcile_runs_started
    ON reconcile_runs(started_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_failed_issues_issue
    ON failed_issues(issue_source_id, run_id);
";

/// Indexes expected by the history and run query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_sprint_issues_issue",
    "idx_issue_sprints_history_sprint",
    "idx_reconcile_runs_started",
    "idx_failed_issues_issue",
];

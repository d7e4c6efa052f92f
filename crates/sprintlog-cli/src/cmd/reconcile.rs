use crate::cmd::{CodedError, open_existing};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Args;
use rusqlite::Connection;
use serde::Serialize;
use sprintlog_core::changelog::group_by_issue;
use sprintlog_core::changelog::parser::parse_reader;
use sprintlog_core::config::{self, ProjectConfig};
use sprintlog_core::db::open_projection;
use sprintlog_core::db::sink::{RunMeta, SqliteSink, SqliteSprintStore, record_run};
use sprintlog_core::model::PrefixedIdGenerator;
use sprintlog_core::sink::MemorySink;
use sprintlog_core::{BatchReport, IssueChangelog, PassContext, Reconciler, run_batch};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Changelog file, one JSON change item per line.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Number of worker threads. Defaults to `reconcile.jobs` from config.
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Reconstruct in memory and report, without touching the database.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct ReconcileOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<i64>,
    dry_run: bool,
    jobs: usize,
    malformed_lines: usize,
    #[serde(flatten)]
    report: BatchReport,
}

/// Execute `sprintlog reconcile <FILE>`.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the file cannot be
/// read, the final flush fails, or any issue failed during the pass.
pub fn run_reconcile(
    args: &ReconcileArgs,
    project: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let conn = open_existing(project_root)?;
    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let parsed = parse_reader(BufReader::new(file))
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let malformed_lines = parsed.errors.len();
    let changelogs = group_by_issue(parsed.events);

    let jobs = args
        .jobs
        .unwrap_or(project.reconcile.jobs)
        .clamp(1, changelogs.len().max(1));
    let ctx = PassContext::new(project.source.id);
    let ids = PrefixedIdGenerator::new(project.source.provider.as_str());

    tracing::info!(
        file = %args.file.display(),
        issues = changelogs.len(),
        malformed_lines,
        jobs,
        dry_run = args.dry_run,
        "starting reconcile pass"
    );

    let report = if args.dry_run {
        reconcile_dry_run(&conn, ctx, &ids, &changelogs)?
    } else if jobs == 1 {
        reconcile_into(&conn, ctx, &ids, &changelogs)?
    } else {
        let db_path = config::db_path(project_root);
        reconcile_parallel(&db_path, ctx, &ids, changelogs, jobs)?
    };

    let run_id = if args.dry_run {
        None
    } else {
        let meta = RunMeta {
            source_id: project.source.id,
            started_at: ctx.now,
            finished_at: Utc::now(),
            malformed_lines,
        };
        Some(record_run(&conn, &meta, &report)?)
    };

    let failed = report.failed_issues.len();
    let result = ReconcileOutput {
        run_id,
        dry_run: args.dry_run,
        jobs,
        malformed_lines,
        report,
    };

    render_mode(
        output,
        &result,
        |r, w| {
            writeln!(
                w,
                "issues\t{}\tprocessed\t{}\tskipped\t{}\terrored\t{}\tfailed\t{}\tflushed\t{}",
                r.report.issues,
                r.report.processed,
                r.report.skipped,
                r.report.errored,
                r.report.failed_issues.len(),
                r.report.flushed
            )?;
            for failure in &r.report.failed_issues {
                writeln!(
                    w,
                    "failed\t{}\t{}\t{}",
                    failure.issue_source_id, failure.code, failure.error
                )?;
            }
            Ok(())
        },
        |r, w| {
            let heading = if r.dry_run {
                "Reconcile (dry run)"
            } else {
                "Reconcile"
            };
            pretty_section(w, heading)?;
            if let Some(run_id) = r.run_id {
                pretty_kv(w, "Run", run_id.to_string())?;
            }
            pretty_kv(w, "Workers", r.jobs.to_string())?;
            pretty_kv(w, "Issues", r.report.issues.to_string())?;
            pretty_kv(w, "Processed", r.report.processed.to_string())?;
            pretty_kv(w, "Skipped", r.report.skipped.to_string())?;
            pretty_kv(w, "Errored", r.report.errored.to_string())?;
            pretty_kv(w, "Bad lines", r.malformed_lines.to_string())?;
            pretty_kv(w, "Sprint lookups", r.report.sprint_queries.to_string())?;
            pretty_kv(w, "Flushed", r.report.flushed.to_string())?;
            pretty_kv(w, "Failed", r.report.failed_issues.len().to_string())?;
            for failure in &r.report.failed_issues {
                writeln!(
                    w,
                    "  issue {} [{}] {}",
                    failure.issue_source_id, failure.code, failure.error
                )?;
            }
            Ok(())
        },
    )?;

    if failed > 0 {
        anyhow::bail!("{failed} issue(s) failed; rerun reconcile on the same input to retry them");
    }
    Ok(())
}

fn reconcile_into(
    conn: &Connection,
    ctx: PassContext,
    ids: &PrefixedIdGenerator,
    changelogs: &[IssueChangelog],
) -> Result<BatchReport> {
    let store = SqliteSprintStore::new(conn);
    let mut sink = SqliteSink::new(conn);
    let reconciler = Reconciler::new(ctx, ids, &store, &mut sink);
    run_batch(reconciler, changelogs).map_err(|e| CodedError::new(e.code(), e.to_string()).into())
}

fn reconcile_dry_run(
    conn: &Connection,
    ctx: PassContext,
    ids: &PrefixedIdGenerator,
    changelogs: &[IssueChangelog],
) -> Result<BatchReport> {
    let store = SqliteSprintStore::new(conn);
    let mut sink = MemorySink::new();
    let reconciler = Reconciler::new(ctx, ids, &store, &mut sink);
    let report = run_batch(reconciler, changelogs)
        .map_err(|e| CodedError::new(e.code(), e.to_string()))?;
    tracing::debug!(
        writes = sink.writes,
        memberships = sink.memberships.len(),
        "dry run complete, nothing persisted"
    );
    Ok(report)
}

/// Split issues round-robin across `jobs` workers. Each worker owns a
/// connection; issues never span workers, so their rows never collide.
fn reconcile_parallel(
    db_path: &Path,
    ctx: PassContext,
    ids: &PrefixedIdGenerator,
    changelogs: Vec<IssueChangelog>,
    jobs: usize,
) -> Result<BatchReport> {
    let mut partitions: Vec<Vec<IssueChangelog>> = (0..jobs).map(|_| Vec::new()).collect();
    for (idx, changelog) in changelogs.into_iter().enumerate() {
        partitions[idx % jobs].push(changelog);
    }

    std::thread::scope(|scope| {
        let handles: Vec<_> = partitions
            .iter()
            .enumerate()
            .map(|(worker, partition)| {
                scope.spawn(move || -> Result<BatchReport> {
                    let conn = open_projection(db_path)
                        .with_context(|| format!("worker {worker}: open projection"))?;
                    tracing::debug!(worker, issues = partition.len(), "worker started");
                    reconcile_into(&conn, ctx, ids, partition)
                })
            })
            .collect();

        let mut merged = BatchReport::default();
        for handle in handles {
            let report = handle
                .join()
                .map_err(|_| anyhow::anyhow!("reconcile worker panicked"))??;
            merged.merge(report);
        }
        Ok(merged)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::init::{InitArgs, run_init};
    use sprintlog_core::db::query;

    const CHANGELOG: &str = "\
{\"issue_id\": 1, \"field\": \"status\", \"from\": \"\", \"to\": \"Open\", \"created\": \"2021-06-01T09:00:00Z\"}
{\"issue_id\": 2, \"field\": \"status\", \"from\": \"\", \"to\": \"Open\", \"created\": \"2021-06-01T09:00:00Z\"}
{\"issue_id\": 3, \"field\": \"assignee\", \"from\": \"\", \"to\": \"ana\", \"created\": \"2021-06-02T09:00:00Z\"}
not json
";

    fn project_with_changelog() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).expect("init");
        let file = dir.path().join("changelog.jsonl");
        std::fs::write(&file, CHANGELOG).expect("write changelog");
        (dir, file)
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (dir, file) = project_with_changelog();
        let args = ReconcileArgs {
            file,
            jobs: None,
            dry_run: true,
        };
        run_reconcile(&args, &ProjectConfig::default(), OutputMode::Json, dir.path())
            .expect("dry run");

        let conn = open_existing(dir.path()).expect("open");
        assert!(query::recent_runs(&conn, 10).expect("runs").is_empty());
        assert!(query::status_history(&conn, "jira:Issue:1:1").expect("status").is_empty());
    }

    #[test]
    fn parallel_workers_cover_every_issue() {
        let (dir, file) = project_with_changelog();
        let args = ReconcileArgs {
            file,
            jobs: Some(2),
            dry_run: false,
        };
        run_reconcile(&args, &ProjectConfig::default(), OutputMode::Json, dir.path())
            .expect("reconcile");

        let conn = open_existing(dir.path()).expect("open");
        let runs = query::recent_runs(&conn, 10).expect("runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].issues, 3);
        assert_eq!(runs[0].processed, 3);
        assert_eq!(runs[0].malformed_lines, 1);
        assert_eq!(query::status_history(&conn, "jira:Issue:1:2").expect("status").len(), 1);
        assert_eq!(query::assignee_history(&conn, "jira:Issue:1:3").expect("assignee").len(), 1);
    }
}

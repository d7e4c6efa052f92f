use crate::cmd::open_existing;
use crate::output::{OutputMode, format_us, pretty_kv, pretty_rule, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use sprintlog_core::db::query::{self, QueryFailedIssue, QueryRun};
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct RunsArgs {
    /// How many runs to show, newest first.
    #[arg(long, default_value_t = 10)]
    pub limit: u32,
}

#[derive(Debug, Serialize)]
struct RunReport {
    #[serde(flatten)]
    run: QueryRun,
    failures: Vec<QueryFailedIssue>,
}

/// Execute `sprintlog runs`.
///
/// # Errors
///
/// Returns an error if the project is not initialized or a query fails.
pub fn run_runs(args: &RunsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let conn = open_existing(project_root)?;
    let mut reports = Vec::new();
    for run in query::recent_runs(&conn, args.limit)? {
        let failures = query::failed_issues(&conn, run.run_id)?;
        reports.push(RunReport { run, failures });
    }

    render_mode(
        output,
        &reports,
        |reports, w| {
            for r in reports {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    r.run.run_id,
                    format_us(Some(r.run.started_at_us)),
                    r.run.issues,
                    r.run.processed,
                    r.run.skipped,
                    r.run.errored,
                    r.run.failed
                )?;
            }
            Ok(())
        },
        |reports, w| {
            pretty_section(w, "Reconcile runs")?;
            if reports.is_empty() {
                writeln!(w, "No runs recorded yet.")?;
                return Ok(());
            }
            for r in reports {
                pretty_kv(w, "Run", r.run.run_id.to_string())?;
                pretty_kv(w, "Started", format_us(Some(r.run.started_at_us)))?;
                pretty_kv(w, "Finished", format_us(Some(r.run.finished_at_us)))?;
                pretty_kv(
                    w,
                    "Events",
                    format!(
                        "{} processed, {} skipped, {} errored",
                        r.run.processed, r.run.skipped, r.run.errored
                    ),
                )?;
                pretty_kv(
                    w,
                    "Issues",
                    format!("{} seen, {} failed", r.run.issues, r.run.failed),
                )?;
                pretty_kv(w, "Bad lines", r.run.malformed_lines.to_string())?;
                for failure in &r.failures {
                    writeln!(
                        w,
                        "  issue {} [{}] {}",
                        failure.issue_source_id, failure.code, failure.error
                    )?;
                }
                pretty_rule(w)?;
            }
            Ok(())
        },
    )
}

use crate::cmd::open_existing;
use crate::output::{OutputMode, format_us, pretty_rule, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use sprintlog_core::config::ProjectConfig;
use sprintlog_core::db::query::{self, QueryFieldSpan, QueryMembership, QueryStageSpan};
use sprintlog_core::model::{EntityKind, IdGenerator, PrefixedIdGenerator};
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Source issue id, as it appears in the changelog.
    #[arg(value_name = "ISSUE_ID")]
    pub issue_id: u64,
}

#[derive(Debug, Serialize)]
struct IssueHistory {
    issue_id: String,
    status: Vec<QueryFieldSpan>,
    assignee: Vec<QueryFieldSpan>,
    sprints: Vec<QueryMembership>,
    stage_history: Vec<QueryStageSpan>,
}

/// Execute `sprintlog history <ISSUE_ID>`.
///
/// # Errors
///
/// Returns an error if the project is not initialized or a query fails.
pub fn run_history(
    args: &HistoryArgs,
    project: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let conn = open_existing(project_root)?;
    let ids = PrefixedIdGenerator::new(project.source.provider.as_str());
    let issue_id = ids.generate_numeric(EntityKind::Issue, project.source.id, args.issue_id);

    let history = IssueHistory {
        status: query::status_history(&conn, issue_id.as_str())?,
        assignee: query::assignee_history(&conn, issue_id.as_str())?,
        sprints: query::membership_for_issue(&conn, issue_id.as_str())?,
        stage_history: query::stage_history(&conn, issue_id.as_str())?,
        issue_id: issue_id.to_string(),
    };

    render_mode(output, &history, write_text, write_pretty)
}

fn write_text(h: &IssueHistory, w: &mut dyn Write) -> std::io::Result<()> {
    for span in &h.status {
        writeln!(
            w,
            "status\t{}\t{}\t{}",
            span.value,
            format_us(Some(span.start_at_us)),
            format_us(span.end_at_us)
        )?;
    }
    for span in &h.assignee {
        writeln!(
            w,
            "assignee\t{}\t{}\t{}",
            span.value,
            format_us(Some(span.start_at_us)),
            format_us(span.end_at_us)
        )?;
    }
    for m in &h.sprints {
        writeln!(
            w,
            "sprint\t{}\t{}\t{}\t{}\t{}",
            m.sprint_id,
            m.added_stage.as_deref().unwrap_or("-"),
            format_us(m.added_at_us),
            format_us(m.removed_at_us),
            if m.is_removed { "removed" } else { "member" }
        )?;
    }
    for span in &h.stage_history {
        writeln!(
            w,
            "stage\t{}\t{}\t{}",
            span.sprint_id,
            format_us(Some(span.start_at_us)),
            format_us(Some(span.end_at_us))
        )?;
    }
    Ok(())
}

fn write_pretty(h: &IssueHistory, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("History of {}", h.issue_id))?;

    writeln!(w, "Status")?;
    write_field_spans(w, &h.status)?;
    writeln!(w, "Assignee")?;
    write_field_spans(w, &h.assignee)?;

    writeln!(w, "Sprints")?;
    if h.sprints.is_empty() {
        writeln!(w, "  (none)")?;
    }
    for m in &h.sprints {
        let name = m.sprint_name.as_deref().unwrap_or(&m.sprint_id);
        writeln!(
            w,
            "  {name:<24} added {} ({}){}",
            format_us(m.added_at_us),
            m.added_stage.as_deref().unwrap_or("unknown stage"),
            if m.is_removed {
                format!(", removed {}", format_us(m.removed_at_us))
            } else {
                String::new()
            }
        )?;
    }

    writeln!(w, "Active-sprint stays")?;
    if h.stage_history.is_empty() {
        writeln!(w, "  (none)")?;
    }
    for span in &h.stage_history {
        writeln!(
            w,
            "  {:<24} {} .. {}",
            span.sprint_id,
            format_us(Some(span.start_at_us)),
            format_us(Some(span.end_at_us))
        )?;
    }
    pretty_rule(w)
}

fn write_field_spans(w: &mut dyn Write, spans: &[QueryFieldSpan]) -> std::io::Result<()> {
    if spans.is_empty() {
        return writeln!(w, "  (none)");
    }
    for span in spans {
        writeln!(
            w,
            "  {:<24} {} .. {}",
            span.value,
            format_us(Some(span.start_at_us)),
            format_us(span.end_at_us)
        )?;
    }
    Ok(())
}

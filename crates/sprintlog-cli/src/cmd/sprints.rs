use crate::cmd::open_existing;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::{Deserialize, Serialize};
use sprintlog_core::config::ProjectConfig;
use sprintlog_core::db::sink::upsert_sprint;
use sprintlog_core::model::{EntityKind, IdGenerator, PrefixedIdGenerator, SprintMetadata};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum SprintsCommand {
    /// Load sprint reference data from a JSON-lines file.
    Import(ImportArgs),
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// File with one sprint object per line.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

/// One input line: `{"sprint_id": 42, "name": "...", "started_at": ..., "completed_at": ...}`.
#[derive(Debug, Deserialize)]
struct SprintLine {
    sprint_id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize)]
struct ImportReport {
    imported: usize,
    malformed: usize,
}

pub fn run_sprints(
    command: &SprintsCommand,
    project: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    match command {
        SprintsCommand::Import(args) => run_import(args, project, output, project_root),
    }
}

fn run_import(
    args: &ImportArgs,
    project: &ProjectConfig,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let conn = open_existing(project_root)?;
    let file = File::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let ids = PrefixedIdGenerator::new(project.source.provider.as_str());

    let mut report = ImportReport::default();
    let tx = conn
        .unchecked_transaction()
        .context("begin sprint import transaction")?;
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", args.file.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_sprint_line(trimmed, &ids, project.source.id) {
            Ok(sprint) => {
                upsert_sprint(&tx, &sprint)?;
                report.imported += 1;
            }
            Err(reason) => {
                tracing::warn!(line_no = idx + 1, %reason, "skipping malformed sprint line");
                report.malformed += 1;
            }
        }
    }
    tx.commit().context("commit sprint import")?;

    tracing::info!(
        imported = report.imported,
        malformed = report.malformed,
        "sprint import complete"
    );

    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "imported\t{}\tmalformed\t{}", r.imported, r.malformed),
        |r, w| {
            pretty_section(w, "Sprint import")?;
            pretty_kv(w, "Imported", r.imported.to_string())?;
            pretty_kv(w, "Malformed", r.malformed.to_string())
        },
    )
}

fn parse_sprint_line(
    line: &str,
    ids: &dyn IdGenerator,
    source_id: u64,
) -> std::result::Result<SprintMetadata, String> {
    let parsed: SprintLine = serde_json::from_str(line).map_err(|e| e.to_string())?;
    if let (Some(start), Some(end)) = (parsed.started_at, parsed.completed_at)
        && end < start
    {
        return Err(format!("sprint {} completed before it started", parsed.sprint_id));
    }
    Ok(SprintMetadata {
        sprint_id: ids.generate_numeric(EntityKind::Sprint, source_id, parsed.sprint_id),
        name: parsed.name,
        started_at: parsed.started_at,
        completed_at: parsed.completed_at,
    })
}

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use sprintlog_core::config::{self, ProjectConfig};
use sprintlog_core::db::{self, migrations};
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `.sprintlog/config.toml` even if it already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitReport {
    config_path: String,
    db_path: String,
    schema_version: u32,
}

/// Execute `sprintlog init`. Creates the project skeleton:
///
/// ```text
/// .sprintlog/
///   config.toml     (source id/provider, reconcile workers)
///   sprintlog.db    (projection, migrated to the latest schema)
/// ```
///
/// An existing database is kept and migrated; its rows survive `--force`.
///
/// # Errors
///
/// Returns an error if the config already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config_path = config::project_config_path(project_root);
    let exists = config_path.exists();
    if exists && !args.force {
        anyhow::bail!(
            "{} already exists. Use `sprintlog init --force` to rewrite it.",
            config_path.display()
        );
    }

    let project = if exists {
        // Keep the user's values; --force only normalizes the file.
        config::load_project_config(project_root).unwrap_or_default()
    } else {
        ProjectConfig::default()
    };
    config::write_project_config(project_root, &project)?;

    let db_path = config::db_path(project_root);
    let conn = db::open_projection(&db_path)?;
    let schema_version =
        migrations::current_schema_version(&conn).context("read projection schema version")?;

    tracing::info!(
        path = %db_path.display(),
        schema_version,
        source_id = project.source.id,
        "initialized sprintlog project"
    );

    let report = InitReport {
        config_path: config_path.display().to_string(),
        db_path: db_path.display().to_string(),
        schema_version,
    };

    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "initialized\t{}\t{}", r.config_path, r.db_path),
        |r, w| {
            pretty_section(w, "Initialized sprintlog project")?;
            pretty_kv(w, "Config", &r.config_path)?;
            pretty_kv(w, "Database", &r.db_path)?;
            pretty_kv(w, "Schema", r.schema_version.to_string())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_config_and_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).expect("init");
        assert!(config::project_config_path(dir.path()).exists());
        assert!(config::db_path(dir.path()).exists());
    }

    #[test]
    fn second_init_requires_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).expect("init");
        assert!(run_init(&InitArgs { force: false }, OutputMode::Json, dir.path()).is_err());
        run_init(&InitArgs { force: true }, OutputMode::Json, dir.path()).expect("force init");
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Directory holding project state, relative to the project root.
pub const PROJECT_DIR: &str = ".sprintlog";
/// Projection database file name inside [`PROJECT_DIR`].
pub const DB_FILE: &str = "sprintlog.db";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Where the changelogs come from. Both fields feed id generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_id")]
    pub id: u64,
    #[serde(default = "default_provider")]
    pub provider: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id: default_source_id(),
            provider: default_provider(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Worker threads for `reconcile` when `--jobs` is not given.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

#[must_use]
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join("config.toml")
}

#[must_use]
pub fn db_path(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR).join(DB_FILE)
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_config_path(project_root);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write `config` to `.sprintlog/config.toml`, creating the directory.
pub fn write_project_config(project_root: &Path, config: &ProjectConfig) -> Result<PathBuf> {
    let path = project_config_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize project config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("sprintlog/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("SPRINTLOG_FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format);

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(
    cli_json: bool,
    user_output: Option<String>,
    env_format: Option<String>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_source_id() -> u64 {
    1
}

fn default_provider() -> String {
    "jira".to_string()
}

const fn default_jobs() -> usize {
    1
}

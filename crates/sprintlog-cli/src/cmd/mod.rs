pub mod history;
pub mod init;
pub mod reconcile;
pub mod runs;
pub mod sprints;

use anyhow::Result;
use rusqlite::Connection;
use sprintlog_core::config;
use sprintlog_core::db::query::try_open_projection;
use sprintlog_core::error::ErrorCode;
use std::fmt;
use std::path::Path;

/// An error carrying a stable [`ErrorCode`] for CLI rendering.
#[derive(Debug)]
pub struct CodedError {
    pub code: ErrorCode,
    pub detail: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CodedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.message(), self.detail)
    }
}

impl std::error::Error for CodedError {}

/// Open the project's projection, or fail with `E1001` when there is none.
pub fn open_existing(project_root: &Path) -> Result<Connection> {
    let db_path = config::db_path(project_root);
    try_open_projection(&db_path)?.ok_or_else(|| {
        CodedError::new(
            ErrorCode::NotInitialized,
            format!("no usable projection at {}", db_path.display()),
        )
        .into()
    })
}

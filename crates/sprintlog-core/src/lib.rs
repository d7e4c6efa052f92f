//! sprintlog-core library.
//!
//! Rebuilds sprint membership, sprint stage history, status history and
//! assignee history for issues from their field-change logs.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums in the engine ([`reconcile::ReconcileError`],
//!   [`error::DependencyError`]); `anyhow::Result` in the `db` and `config`
//!   layers.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).

pub mod changelog;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod sink;
pub mod sprint_cache;

pub use changelog::{ChangeEvent, ChangeField, IssueChangelog};
pub use reconcile::batch::{BatchReport, IssueFailure, run_batch};
pub use reconcile::{FeedOutcome, PassContext, ReconcileError, Reconciler};

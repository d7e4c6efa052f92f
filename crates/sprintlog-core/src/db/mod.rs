//! SQLite projection database utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so `reconcile --jobs N` workers can write through
//!   their own connections while readers keep going
//! - `busy_timeout = 5s` for transient lock contention between workers
//! - `foreign_keys = ON` for the run bookkeeping tables

pub mod migrations;
pub mod query;
pub mod schema;
pub mod sink;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// Busy timeout used for projection DB connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the projection SQLite database, apply runtime pragmas,
/// and migrate schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_projection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create projection db directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open projection database {}", path.display()))?;

    configure_connection(&conn).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply projection migrations")?;

    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Timestamp → `*_at_us` column value.
#[must_use]
#[allow(clippy::missing_const_for_fn)]
pub fn to_us(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

/// `*_at_us` column value → timestamp. `None` when out of chrono's range.
#[must_use]
#[allow(clippy::missing_const_for_fn)]
pub fn from_us(us: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
}

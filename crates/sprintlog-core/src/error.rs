use std::fmt;

/// Machine-readable error codes surfaced by the CLI and recorded with failed issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    MalformedChangelogLine,
    MalformedChangelogValue,
    MalformedSprintRecord,
    SprintLookupFailed,
    PersistFailed,
    CorruptProjection,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::MalformedChangelogLine => "E2001",
            Self::MalformedChangelogValue => "E2002",
            Self::MalformedSprintRecord => "E2003",
            Self::SprintLookupFailed => "E3001",
            Self::PersistFailed => "E3002",
            Self::CorruptProjection => "E3003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::MalformedChangelogLine => "Malformed changelog line",
            Self::MalformedChangelogValue => "Malformed changelog value",
            Self::MalformedSprintRecord => "Malformed sprint record",
            Self::SprintLookupFailed => "Sprint lookup failed",
            Self::PersistFailed => "Failed to persist interval",
            Self::CorruptProjection => "Corrupt SQLite projection",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `sprintlog init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .sprintlog/config.toml and retry."),
            Self::MalformedChangelogLine => {
                Some("Each line must be a JSON object with issue_id, field and created.")
            }
            Self::MalformedChangelogValue => {
                Some("Sprint from/to values must be comma-separated sprint ids.")
            }
            Self::MalformedSprintRecord => {
                Some("Re-import sprint metadata with `sprintlog sprints import`.")
            }
            Self::SprintLookupFailed | Self::PersistFailed => {
                Some("The issue was marked failed; rerun `sprintlog reconcile` to retry it.")
            }
            Self::CorruptProjection => {
                Some("Delete .sprintlog/sprintlog.db and run `sprintlog init`.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure of an injected collaborator: the sprint store or the record sink.
///
/// "Not found" is never a `DependencyError`; lookups report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed {table} row {key}: {reason}")]
    MalformedRecord {
        table: &'static str,
        key: String,
        reason: String,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl DependencyError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedRecord { .. } => ErrorCode::MalformedSprintRecord,
            Self::Sqlite(_) | Self::Unavailable(_) => ErrorCode::SprintLookupFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DependencyError, ErrorCode};
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::NotInitialized,
            ErrorCode::ConfigParseError,
            ErrorCode::MalformedChangelogLine,
            ErrorCode::MalformedChangelogValue,
            ErrorCode::MalformedSprintRecord,
            ErrorCode::SprintLookupFailed,
            ErrorCode::PersistFailed,
            ErrorCode::CorruptProjection,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::MalformedChangelogValue.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn malformed_rows_map_to_sprint_record_code() {
        let err = DependencyError::MalformedRecord {
            table: "sprints",
            key: "jira:Sprint:1:7".into(),
            reason: "completed before start".into(),
        };
        assert_eq!(err.code(), ErrorCode::MalformedSprintRecord);
        assert!(err.to_string().contains("jira:Sprint:1:7"));
    }
}

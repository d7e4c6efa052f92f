//! Domain identifiers.
//!
//! Source systems hand out their own numeric or string keys. Downstream
//! reporting correlates records through a [`DomainId`] that is stable
//! across runs: `<provider>:<Kind>:<source_id>:<key>`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, source-independent identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(String);

impl DomainId {
    /// Wrap an already-rendered identifier.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The kinds of entity the engine needs identifiers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Sprint,
    Issue,
    User,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sprint => "Sprint",
            Self::Issue => "Issue",
            Self::User => "User",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a source-specific key to a [`DomainId`].
///
/// Implementations must be deterministic: the same inputs always produce
/// the same identifier.
pub trait IdGenerator {
    fn generate(&self, kind: EntityKind, source_id: u64, key: &str) -> DomainId;

    /// Convenience for numeric source keys (sprints, issues).
    fn generate_numeric(&self, kind: EntityKind, source_id: u64, key: u64) -> DomainId {
        self.generate(kind, source_id, &key.to_string())
    }
}

/// Default generator rendering `<provider>:<Kind>:<source_id>:<key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixedIdGenerator {
    provider: String,
}

impl PrefixedIdGenerator {
    #[must_use]
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
        }
    }
}

impl IdGenerator for PrefixedIdGenerator {
    fn generate(&self, kind: EntityKind, source_id: u64, key: &str) -> DomainId {
        DomainId(format!("{}:{kind}:{source_id}:{key}", self.provider))
    }
}

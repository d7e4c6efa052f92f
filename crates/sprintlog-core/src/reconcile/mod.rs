//! Changelog → interval reconstruction.
//!
//! A [`Reconciler`] owns one pass: its accumulators, its sprint cache and
//! its wall-clock marker. Events are fed one at a time with
//! [`Reconciler::feed`], which dispatches on the changed field:
//!
//! | field      | handler                                   |
//! |------------|-------------------------------------------|
//! | `status`   | status [`field::FieldTracker`]            |
//! | `assignee` | assignee [`field::FieldTracker`]          |
//! | `Sprint`   | [`membership::MembershipLedger`]          |
//! | other      | ignored                                   |
//!
//! Status and assignee intervals are persisted as they open and close.
//! Sprint memberships accumulate in memory and are written by
//! [`Reconciler::finish`].
//!
//! # Event order
//!
//! Events for one issue must arrive in non-decreasing time order. The
//! reconciler does not re-sort; it logs a warning when an issue's event is
//! older than the previous one and applies it anyway.

pub mod batch;
pub mod field;
pub mod membership;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::changelog::sprint_set::SprintListError;
use crate::changelog::{ChangeEvent, ChangeField};
use crate::error::{DependencyError, ErrorCode};
use crate::model::{
    DomainId, EntityKind, IdGenerator, Record, SprintMetadata, TrackedField, UNASSIGNED,
};
use crate::sink::Sink;
use crate::sprint_cache::{SprintCache, SprintStore};

use field::FieldTracker;
use membership::MembershipLedger;

/// Per-pass parameters threaded through every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassContext {
    /// Connection/source the changelog was collected from.
    pub source_id: u64,
    /// Wall-clock time of the pass, used as the provisional end of every
    /// interval that is still open.
    pub now: DateTime<Utc>,
}

impl PassContext {
    /// Context stamped with the current time.
    #[must_use]
    pub fn new(source_id: u64) -> Self {
        Self::at(source_id, Utc::now())
    }

    #[must_use]
    pub const fn at(source_id: u64, now: DateTime<Utc>) -> Self {
        Self { source_id, now }
    }
}

/// Errors raised while feeding events.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A sprint list did not parse. Only the offending event is dropped.
    #[error("malformed {field} value on issue {issue_source_id}: {source}")]
    MalformedChangelogValue {
        issue_source_id: u64,
        field: ChangeField,
        #[source]
        source: SprintListError,
    },
    /// The sprint store failed for a reason other than "not found".
    #[error("sprint lookup failed for {sprint_id}: {source}")]
    SprintLookup {
        sprint_id: DomainId,
        #[source]
        source: DependencyError,
    },
    /// The sink rejected a write.
    #[error("failed to persist {record} record: {source}")]
    Persist {
        record: &'static str,
        #[source]
        source: DependencyError,
    },
}

impl ReconcileError {
    /// `true` when the rest of the issue's changelog must not be applied.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::MalformedChangelogValue { .. })
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedChangelogValue { .. } => ErrorCode::MalformedChangelogValue,
            Self::SprintLookup { source, .. } => source.code(),
            Self::Persist { .. } => ErrorCode::PersistFailed,
        }
    }
}

/// What [`Reconciler::feed`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Routed to a handler. Membership changes against untracked sprints
    /// still count as applied.
    Applied,
    /// The field is not one the engine tracks.
    Ignored,
}

/// Borrowed collaborators handed to each handler for the duration of one
/// event.
pub(crate) struct Scope<'r, 'a> {
    pub ctx: &'r PassContext,
    pub ids: &'r dyn IdGenerator,
    pub sprints: &'r mut SprintCache<'a>,
    pub sink: &'r mut (dyn Sink + 'a),
}

impl Scope<'_, '_> {
    pub fn issue_id(&self, issue_source_id: u64) -> DomainId {
        self.ids
            .generate_numeric(EntityKind::Issue, self.ctx.source_id, issue_source_id)
    }

    pub fn sprint_id(&self, sprint_source_id: u64) -> DomainId {
        self.ids
            .generate_numeric(EntityKind::Sprint, self.ctx.source_id, sprint_source_id)
    }

    pub fn resolve_sprint(
        &mut self,
        sprint_id: &DomainId,
    ) -> Result<Option<SprintMetadata>, ReconcileError> {
        self.sprints
            .resolve(sprint_id)
            .map(|found| found.cloned())
            .map_err(|source| ReconcileError::SprintLookup {
                sprint_id: sprint_id.clone(),
                source,
            })
    }

    pub fn persist(&mut self, record: &Record) -> Result<(), ReconcileError> {
        self.sink
            .persist(record)
            .map_err(|source| ReconcileError::Persist {
                record: record.kind(),
                source,
            })
    }
}

/// One reconstruction pass.
pub struct Reconciler<'a> {
    ctx: PassContext,
    ids: &'a dyn IdGenerator,
    sprints: SprintCache<'a>,
    sink: &'a mut (dyn Sink + 'a),
    membership: MembershipLedger,
    status: FieldTracker,
    assignee: FieldTracker,
    last_seen: HashMap<u64, DateTime<Utc>>,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        ctx: PassContext,
        ids: &'a dyn IdGenerator,
        store: &'a dyn SprintStore,
        sink: &'a mut (dyn Sink + 'a),
    ) -> Self {
        Self {
            ctx,
            ids,
            sprints: SprintCache::new(store),
            sink,
            membership: MembershipLedger::default(),
            status: FieldTracker::new(TrackedField::Status),
            assignee: FieldTracker::new(TrackedField::Assignee),
            last_seen: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn context(&self) -> &PassContext {
        &self.ctx
    }

    /// Apply one changelog event.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::MalformedChangelogValue`] means the event was
    /// dropped and the caller may continue. Any other error means a
    /// collaborator failed; see [`ReconcileError::is_fatal`].
    pub fn feed(&mut self, event: &ChangeEvent) -> Result<FeedOutcome, ReconcileError> {
        self.note_order(event);

        let mut scope = Scope {
            ctx: &self.ctx,
            ids: self.ids,
            sprints: &mut self.sprints,
            sink: &mut *self.sink,
        };

        match &event.field {
            ChangeField::Status => {
                let issue_id = scope.issue_id(event.issue_source_id);
                self.status.apply(
                    &mut scope,
                    issue_id,
                    event.to_value.clone(),
                    event.occurred_at,
                )?;
            }
            ChangeField::Assignee => {
                let issue_id = scope.issue_id(event.issue_source_id);
                let assignee = if event.to_value.is_empty() {
                    UNASSIGNED.to_string()
                } else {
                    scope
                        .ids
                        .generate(EntityKind::User, scope.ctx.source_id, &event.to_value)
                        .to_string()
                };
                self.assignee
                    .apply(&mut scope, issue_id, assignee, event.occurred_at)?;
            }
            ChangeField::Sprint => self.membership.apply(&mut scope, event)?,
            ChangeField::Other(name) => {
                debug!(
                    field = %name,
                    issue_source_id = event.issue_source_id,
                    "ignoring untracked changelog field"
                );
                return Ok(FeedOutcome::Ignored);
            }
        }

        Ok(FeedOutcome::Applied)
    }

    /// Drop every unflushed accumulator entry for an issue.
    ///
    /// Used after a fatal error so a half-applied changelog is not written
    /// by [`Reconciler::finish`]. Rows already persisted stay.
    pub fn abandon_issue(&mut self, issue_source_id: u64) {
        let issue_id = self
            .ids
            .generate_numeric(EntityKind::Issue, self.ctx.source_id, issue_source_id);
        self.membership.forget_issue(issue_source_id);
        self.status.forget(&issue_id);
        self.assignee.forget(&issue_id);
        self.last_seen.remove(&issue_source_id);
    }

    /// Number of sprint store queries issued by this pass.
    #[must_use]
    pub const fn sprint_queries(&self) -> usize {
        self.sprints.queries()
    }

    /// Persist every accumulated membership interval and every stage
    /// history record that is still open. Returns the number of records
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Persist`] on the first failed write.
    pub fn finish(mut self) -> Result<usize, ReconcileError> {
        let mut scope = Scope {
            ctx: &self.ctx,
            ids: self.ids,
            sprints: &mut self.sprints,
            sink: &mut *self.sink,
        };
        self.membership.flush(&mut scope)
    }

    fn note_order(&mut self, event: &ChangeEvent) {
        if let Some(previous) = self
            .last_seen
            .insert(event.issue_source_id, event.occurred_at)
            .filter(|previous| event.occurred_at < *previous)
        {
            warn!(
                issue_source_id = event.issue_source_id,
                field = %event.field,
                occurred_at = %event.occurred_at,
                previous = %previous,
                "changelog event older than its predecessor; intervals may overlap"
            );
        }
    }
}

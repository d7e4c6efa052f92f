//! Sprint membership reconstruction.
//!
//! A `Sprint` changelog item carries the full sprint list before and after
//! the edit. Ids on both sides cancel out; the rest are removals (from-only)
//! and additions (to-only). All removals of an item are applied before any
//! of its additions, each side in ascending sprint id order.
//!
//! Two ledgers are maintained:
//!
//! - one [`MembershipInterval`] per `(source, sprint, issue)`, written at
//!   the end of the pass;
//! - one provisional [`StageHistoryRecord`] per `(sprint, issue)` while the
//!   issue sits in the sprint, written immediately when a removal closes it.
//!
//! # Tie-breaks
//!
//! Both `added_at` and `removed_at` keep the earliest time observed: a later
//! addition or removal for the same key never overwrites an earlier one.
//! An addition never clears a recorded removal, so an issue that left a
//! sprint and came back keeps `is_removed` set; the stage history is the
//! authoritative record of when it was actually in the sprint.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tracing::{debug, warn};

use super::{ReconcileError, Scope};
use crate::changelog::ChangeEvent;
use crate::changelog::sprint_set::SprintDelta;
use crate::model::{MembershipInterval, Record, StageHistoryRecord};

/// Accumulator key for membership intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MembershipKey {
    pub source_id: u64,
    pub sprint_source_id: u64,
    pub issue_source_id: u64,
}

/// Accumulator key for provisional stage history records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StageHistoryKey {
    pub sprint_source_id: u64,
    pub issue_source_id: u64,
}

#[derive(Debug, Default)]
pub(crate) struct MembershipLedger {
    intervals: BTreeMap<MembershipKey, MembershipInterval>,
    history: BTreeMap<StageHistoryKey, StageHistoryRecord>,
}

impl MembershipLedger {
    pub(crate) fn apply(
        &mut self,
        scope: &mut Scope<'_, '_>,
        event: &ChangeEvent,
    ) -> Result<(), ReconcileError> {
        let delta = SprintDelta::between(&event.from_value, &event.to_value).map_err(|source| {
            ReconcileError::MalformedChangelogValue {
                issue_source_id: event.issue_source_id,
                field: event.field.clone(),
                source,
            }
        })?;

        for &sprint_source_id in &delta.removed {
            self.remove(scope, sprint_source_id, event)?;
        }
        for &sprint_source_id in &delta.added {
            self.add(scope, sprint_source_id, event)?;
        }
        Ok(())
    }

    fn remove(
        &mut self,
        scope: &mut Scope<'_, '_>,
        sprint_source_id: u64,
        event: &ChangeEvent,
    ) -> Result<(), ReconcileError> {
        let sprint_id = scope.sprint_id(sprint_source_id);
        if scope.resolve_sprint(&sprint_id)?.is_none() {
            debug!(
                sprint_id = %sprint_id,
                issue_source_id = event.issue_source_id,
                "removal from untracked sprint skipped"
            );
            return Ok(());
        }

        let at = event.occurred_at;
        let key = MembershipKey {
            source_id: scope.ctx.source_id,
            sprint_source_id,
            issue_source_id: event.issue_source_id,
        };

        match self.intervals.entry(key) {
            Entry::Occupied(entry) => {
                let interval = entry.into_mut();
                if interval.removed_at.is_none_or(|removed| at < removed) {
                    interval.removed_at = Some(at);
                }
                interval.is_removed = true;
            }
            Entry::Vacant(entry) => {
                entry.insert(MembershipInterval {
                    sprint_id: sprint_id.clone(),
                    issue_id: scope.issue_id(event.issue_source_id),
                    added_at: None,
                    added_stage: None,
                    removed_at: Some(at),
                    is_removed: true,
                });
            }
        }

        let history_key = StageHistoryKey {
            sprint_source_id,
            issue_source_id: event.issue_source_id,
        };
        if let Some(mut record) = self.history.remove(&history_key) {
            if at < record.start_at {
                warn!(
                    sprint_id = %sprint_id,
                    issue_source_id = event.issue_source_id,
                    start_at = %record.start_at,
                    end_at = %at,
                    "closing sprint history record before its start"
                );
            }
            record.end_at = at;
            scope.persist(&Record::StageHistory(record))?;
        }

        Ok(())
    }

    fn add(
        &mut self,
        scope: &mut Scope<'_, '_>,
        sprint_source_id: u64,
        event: &ChangeEvent,
    ) -> Result<(), ReconcileError> {
        let sprint_id = scope.sprint_id(sprint_source_id);
        let Some(sprint) = scope.resolve_sprint(&sprint_id)? else {
            debug!(
                sprint_id = %sprint_id,
                issue_source_id = event.issue_source_id,
                "addition to untracked sprint skipped"
            );
            return Ok(());
        };

        let at = event.occurred_at;
        let stage = sprint.stage_at(at);
        let issue_id = scope.issue_id(event.issue_source_id);
        let key = MembershipKey {
            source_id: scope.ctx.source_id,
            sprint_source_id,
            issue_source_id: event.issue_source_id,
        };

        match self.intervals.entry(key) {
            Entry::Occupied(entry) => {
                let interval = entry.into_mut();
                if interval.added_at.is_none_or(|added| added > at) {
                    interval.added_at = Some(at);
                    interval.added_stage = Some(stage);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(MembershipInterval {
                    sprint_id: sprint_id.clone(),
                    issue_id: issue_id.clone(),
                    added_at: Some(at),
                    added_stage: Some(stage),
                    removed_at: None,
                    is_removed: false,
                });
            }
        }

        self.history.insert(
            StageHistoryKey {
                sprint_source_id,
                issue_source_id: event.issue_source_id,
            },
            StageHistoryRecord {
                issue_id,
                sprint_id,
                start_at: at,
                end_at: scope.ctx.now,
            },
        );

        Ok(())
    }

    /// Drop unflushed entries for one issue.
    pub(crate) fn forget_issue(&mut self, issue_source_id: u64) {
        self.intervals
            .retain(|key, _| key.issue_source_id != issue_source_id);
        self.history
            .retain(|key, _| key.issue_source_id != issue_source_id);
    }

    /// Write every accumulated record and empty the ledger.
    pub(crate) fn flush(&mut self, scope: &mut Scope<'_, '_>) -> Result<usize, ReconcileError> {
        let intervals = std::mem::take(&mut self.intervals);
        let history = std::mem::take(&mut self.history);
        let mut written = 0;

        for interval in intervals.into_values() {
            scope.persist(&Record::Membership(interval))?;
            written += 1;
        }
        for record in history.into_values() {
            scope.persist(&Record::StageHistory(record))?;
            written += 1;
        }

        debug!(written, "flushed sprint membership ledger");
        Ok(written)
    }
}

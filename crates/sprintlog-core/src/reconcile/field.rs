//! Single-valued field history (status, assignee).
//!
//! Each change closes the issue's open interval at the change time and opens
//! a new one. Both writes happen immediately; the open interval carries the
//! pass's `now` as its provisional end so a later pass overwrites it by key.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::{ReconcileError, Scope};
use crate::model::{DomainId, FieldInterval, Record, TrackedField};

#[derive(Debug)]
pub(crate) struct FieldTracker {
    field: TrackedField,
    open: HashMap<DomainId, FieldInterval>,
}

impl FieldTracker {
    pub(crate) fn new(field: TrackedField) -> Self {
        Self {
            field,
            open: HashMap::new(),
        }
    }

    pub(crate) fn apply(
        &mut self,
        scope: &mut Scope<'_, '_>,
        issue_id: DomainId,
        value: String,
        at: DateTime<Utc>,
    ) -> Result<(), ReconcileError> {
        if let Some(mut previous) = self.open.remove(&issue_id) {
            previous.end_at = Some(at);
            scope.persist(&Record::Field(previous))?;
        }

        let interval = FieldInterval {
            field: self.field,
            issue_id: issue_id.clone(),
            value,
            start_at: at,
            end_at: Some(scope.ctx.now),
        };
        scope.persist(&Record::Field(interval.clone()))?;
        self.open.insert(issue_id, interval);
        Ok(())
    }

    pub(crate) fn forget(&mut self, issue_id: &DomainId) {
        self.open.remove(issue_id);
    }
}

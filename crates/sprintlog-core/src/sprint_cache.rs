//! Read-through sprint metadata cache.
//!
//! Each unique sprint id costs one store query per pass. Both outcomes of a
//! successful query are memoized: the metadata, and the fact that the
//! sprint is not tracked. Store failures are never memoized, so a later
//! event for the same sprint queries again.

use std::collections::HashMap;

use crate::error::DependencyError;
use crate::model::{DomainId, SprintMetadata};

/// Read path for sprint reference data.
pub trait SprintStore {
    /// Look up one sprint by domain id.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError`] when the store cannot answer. A sprint
    /// that simply is not tracked is `Ok(None)`.
    fn find_sprint(&self, sprint_id: &DomainId) -> Result<Option<SprintMetadata>, DependencyError>;
}

/// Memoizing wrapper over a [`SprintStore`], owned by one pass.
pub struct SprintCache<'s> {
    store: &'s dyn SprintStore,
    entries: HashMap<DomainId, Option<SprintMetadata>>,
    queries: usize,
}

impl<'s> SprintCache<'s> {
    #[must_use]
    pub fn new(store: &'s dyn SprintStore) -> Self {
        Self {
            store,
            entries: HashMap::new(),
            queries: 0,
        }
    }

    /// Resolve a sprint, querying the store at most once per id.
    ///
    /// # Errors
    ///
    /// Propagates the store's [`DependencyError`].
    pub fn resolve(
        &mut self,
        sprint_id: &DomainId,
    ) -> Result<Option<&SprintMetadata>, DependencyError> {
        if !self.entries.contains_key(sprint_id) {
            self.queries += 1;
            let found = self.store.find_sprint(sprint_id)?;
            if found.is_none() {
                tracing::debug!(sprint_id = %sprint_id, "sprint not tracked");
            }
            self.entries.insert(sprint_id.clone(), found);
        }
        Ok(self.entries.get(sprint_id).and_then(Option::as_ref))
    }

    /// Number of store queries issued so far.
    #[must_use]
    pub const fn queries(&self) -> usize {
        self.queries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingStore {
        calls: Cell<usize>,
        fail: Cell<bool>,
    }

    impl SprintStore for CountingStore {
        fn find_sprint(
            &self,
            sprint_id: &DomainId,
        ) -> Result<Option<SprintMetadata>, DependencyError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.get() {
                return Err(DependencyError::Unavailable("connection reset".into()));
            }
            if sprint_id.as_str().ends_with(":7") {
                Ok(Some(SprintMetadata {
                    sprint_id: sprint_id.clone(),
                    name: None,
                    started_at: None,
                    completed_at: None,
                }))
            } else {
                Ok(None)
            }
        }
    }

    fn store() -> CountingStore {
        CountingStore {
            calls: Cell::new(0),
            fail: Cell::new(false),
        }
    }

    #[test]
    fn hits_are_memoized() {
        let store = store();
        let mut cache = SprintCache::new(&store);
        let id = DomainId::new("jira:Sprint:1:7");
        assert!(cache.resolve(&id).expect("resolve").is_some());
        assert!(cache.resolve(&id).expect("resolve").is_some());
        assert_eq!(store.calls.get(), 1);
        assert_eq!(cache.queries(), 1);
    }

    #[test]
    fn not_found_is_memoized() {
        let store = store();
        let mut cache = SprintCache::new(&store);
        let id = DomainId::new("jira:Sprint:1:99");
        assert!(cache.resolve(&id).expect("resolve").is_none());
        assert!(cache.resolve(&id).expect("resolve").is_none());
        assert_eq!(store.calls.get(), 1);
    }

    #[test]
    fn failures_are_not_memoized() {
        let store = store();
        store.fail.set(true);
        let mut cache = SprintCache::new(&store);
        let id = DomainId::new("jira:Sprint:1:7");
        assert!(cache.resolve(&id).is_err());

        store.fail.set(false);
        assert!(cache.resolve(&id).expect("resolve").is_some());
        assert_eq!(store.calls.get(), 2);
    }
}

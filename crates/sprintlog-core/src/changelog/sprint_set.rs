//! Sprint list values and their symmetric difference.
//!
//! The tracker records a sprint change as two comma-separated lists of
//! sprint ids: the sprints before and after the edit. An id present on both
//! sides is a rename/reorder artifact, not a membership change.

use std::collections::BTreeSet;

/// A sprint list item that is not a non-negative integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid sprint id '{item}' in list '{list}'")]
pub struct SprintListError {
    pub list: String,
    pub item: String,
}

/// Parse `"1, 2,3"` into `{1, 2, 3}`. Items are trimmed; empty items are
/// skipped, so `""` is the empty set.
///
/// # Errors
///
/// Returns [`SprintListError`] for the first item that is not a `u64`.
pub fn parse_sprint_list(raw: &str) -> Result<BTreeSet<u64>, SprintListError> {
    let mut ids = BTreeSet::new();
    for item in raw.split(',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let id = item.parse::<u64>().map_err(|_| SprintListError {
            list: raw.to_string(),
            item: item.to_string(),
        })?;
        ids.insert(id);
    }
    Ok(ids)
}

/// Net sprint membership change carried by one changelog item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SprintDelta {
    /// Sprints the issue left, ascending.
    pub removed: BTreeSet<u64>,
    /// Sprints the issue joined, ascending.
    pub added: BTreeSet<u64>,
}

impl SprintDelta {
    /// Compute the delta between a `from` and a `to` list.
    ///
    /// # Errors
    ///
    /// Returns [`SprintListError`] if either side fails to parse. Nothing is
    /// applied for a half-parsed item.
    pub fn between(from: &str, to: &str) -> Result<Self, SprintListError> {
        let from = parse_sprint_list(from)?;
        let to = parse_sprint_list(to)?;
        Ok(Self {
            removed: from.difference(&to).copied().collect(),
            added: to.difference(&from).copied().collect(),
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u64]) -> BTreeSet<u64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn shared_ids_cancel() {
        let delta = SprintDelta::between("1,2", "2,3").expect("parse");
        assert_eq!(delta.removed, set(&[1]));
        assert_eq!(delta.added, set(&[3]));
    }

    #[test]
    fn reorder_is_a_no_op() {
        let delta = SprintDelta::between("4, 5", "5,4").expect("parse");
        assert!(delta.is_empty());
    }

    #[test]
    fn whitespace_and_empty_items_are_tolerated() {
        assert_eq!(parse_sprint_list(" 1 , ,2,").expect("parse"), set(&[1, 2]));
        assert!(parse_sprint_list("").expect("parse").is_empty());
    }

    #[test]
    fn first_addition_has_empty_from() {
        let delta = SprintDelta::between("", "7").expect("parse");
        assert!(delta.removed.is_empty());
        assert_eq!(delta.added, set(&[7]));
    }

    #[test]
    fn bad_item_reports_list_and_item() {
        let err = SprintDelta::between("1", "2,x").unwrap_err();
        assert_eq!(err.item, "x");
        assert_eq!(err.list, "2,x");
    }

    #[test]
    fn negative_ids_are_rejected() {
        assert!(parse_sprint_list("-3").is_err());
    }
}

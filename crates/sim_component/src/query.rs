//! Query descriptors for system data subscriptions.
//!
//! A [`QueryDescriptor`] declares which component types an entity must carry
//! to match. The database keeps a membership set per standing query and
//! updates it incrementally at every commit.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;

/// A unique identifier for a standing query installed in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct QueryId(pub u64);

impl QueryId {
    /// The null / invalid query sentinel.
    pub const INVALID: QueryId = QueryId(0);

    /// Returns `true` if this is a valid (non-sentinel) query ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Describes the component types an entity must have to match a query.
///
/// Two descriptors are structurally equal when their required sets are
/// equal; the database dedups standing queries on that equality.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Sorted set of required component types.
    required: BTreeSet<ComponentTypeId>,
}

impl QueryDescriptor {
    /// Create a new empty query descriptor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required component type.
    #[must_use]
    pub fn require(mut self, type_id: ComponentTypeId) -> Self {
        self.required.insert(type_id);
        self
    }

    /// Build a descriptor from a list of required types.
    #[must_use]
    pub fn from_types(types: &[ComponentTypeId]) -> Self {
        Self {
            required: types.iter().copied().collect(),
        }
    }

    /// The required component type set.
    #[must_use]
    pub fn required(&self) -> &BTreeSet<ComponentTypeId> {
        &self.required
    }

    /// Returns `true` if the query requires the given type.
    #[must_use]
    pub fn requires(&self, type_id: ComponentTypeId) -> bool {
        self.required.contains(&type_id)
    }

    /// Returns `true` if every required type appears in `available`.
    #[must_use]
    pub fn matches(&self, available: &BTreeSet<ComponentTypeId>) -> bool {
        self.required.iter().all(|ty| available.contains(ty))
    }

    /// Returns the number of required types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.required.len()
    }

    /// Returns `true` if no types are required.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality_ignores_insertion_order() {
        let q1 = QueryDescriptor::new()
            .require(ComponentTypeId(1))
            .require(ComponentTypeId(2));
        let q2 = QueryDescriptor::new()
            .require(ComponentTypeId(2))
            .require(ComponentTypeId(1));
        assert_eq!(q1, q2);
    }

    #[test]
    fn test_matches_requires_all_types() {
        let q = QueryDescriptor::from_types(&[ComponentTypeId(1), ComponentTypeId(2)]);

        let mut both = BTreeSet::new();
        both.insert(ComponentTypeId(1));
        both.insert(ComponentTypeId(2));
        both.insert(ComponentTypeId(3));
        assert!(q.matches(&both));

        let mut one = BTreeSet::new();
        one.insert(ComponentTypeId(1));
        assert!(!q.matches(&one));
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let q = QueryDescriptor::new();
        assert!(q.matches(&BTreeSet::new()));
    }

    #[test]
    fn test_duplicate_require_is_noop() {
        let q = QueryDescriptor::new()
            .require(ComponentTypeId(7))
            .require(ComponentTypeId(7));
        assert_eq!(q.len(), 1);
    }
}

//! Standing query engine.
//!
//! Holds (required component-type set, membership set) pairs. The database
//! is the sole writer of memberships; this engine is a passive container
//! with dedup-on-insert and the one-tick post-removal hysteresis.

use std::collections::{BTreeSet, HashSet};

use sim_component::{ComponentTypeId, Entity, QueryDescriptor, QueryId};
use tracing::debug;

/// One standing query: its required set, its cached membership, and the
/// entities scheduled to leave at the next commit.
#[derive(Debug)]
struct QueryState {
    desc: QueryDescriptor,
    members: HashSet<Entity>,
    /// Entities whose required component was removed at the most recent
    /// commit. They stay visible for the current tick so systems can observe
    /// the `Deleted` flag, and are dropped at the next commit.
    departing: HashSet<Entity>,
}

/// Container for all standing queries.
#[derive(Debug, Default)]
pub struct QueryEngine {
    next_id: u64,
    queries: Vec<(QueryId, QueryState)>,
}

impl QueryEngine {
    /// Create a new empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a standing query, seeding membership from `live` — the
    /// committed (entity, type-set) pairs at the time of installation.
    ///
    /// Duplicate descriptors (same required set) return the existing ID with
    /// `is_new = false` and leave membership untouched.
    pub fn add<I>(&mut self, desc: QueryDescriptor, live: I) -> (QueryId, bool)
    where
        I: IntoIterator<Item = (Entity, BTreeSet<ComponentTypeId>)>,
    {
        // Linear scan for a structural duplicate.
        for (id, state) in &self.queries {
            if state.desc == desc {
                return (*id, false);
            }
        }

        let members: HashSet<Entity> = live
            .into_iter()
            .filter(|(_, types)| desc.matches(types))
            .map(|(e, _)| e)
            .collect();

        self.next_id += 1;
        let id = QueryId(self.next_id);
        debug!(query_id = id.0, required = desc.len(), seeded = members.len(), "standing query installed");
        self.queries.push((
            id,
            QueryState {
                desc,
                members,
                departing: HashSet::new(),
            },
        ));
        (id, true)
    }

    /// Remove a standing query. Returns `true` if it existed.
    pub fn remove(&mut self, id: QueryId) -> bool {
        let before = self.queries.len();
        self.queries.retain(|(qid, _)| *qid != id);
        self.queries.len() != before
    }

    /// The required component types of a query.
    #[must_use]
    pub fn component_types(&self, id: QueryId) -> Option<Vec<ComponentTypeId>> {
        self.state(id)
            .map(|s| s.desc.required().iter().copied().collect())
    }

    /// The current membership of a query, in ascending entity order.
    #[must_use]
    pub fn entity_ids(&self, id: QueryId) -> Option<Vec<Entity>> {
        self.state(id).map(|s| {
            let mut ids: Vec<Entity> = s.members.iter().copied().collect();
            ids.sort_unstable();
            ids
        })
    }

    /// Returns `true` if the query exists.
    #[must_use]
    pub fn contains(&self, id: QueryId) -> bool {
        self.state(id).is_some()
    }

    /// Returns the number of standing queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Returns `true` if no queries are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Commit step: drop the entities that have been departing since the
    /// previous commit. Call before noting this commit's removals.
    pub fn drop_departing(&mut self) {
        for (_, state) in &mut self.queries {
            for e in state.departing.drain() {
                state.members.remove(&e);
            }
        }
    }

    /// Commit step: a required component of `entity` was removed. Members
    /// affected by the removal linger for one tick.
    pub fn note_removal(&mut self, entity: Entity, type_id: ComponentTypeId) {
        for (_, state) in &mut self.queries {
            if state.desc.requires(type_id) && state.members.contains(&entity) {
                state.departing.insert(entity);
            }
        }
    }

    /// Commit step: `entity` now owns exactly `types` (committed). Queries
    /// whose required set became satisfied gain the entity.
    pub fn note_entity_updated(&mut self, entity: Entity, types: &BTreeSet<ComponentTypeId>) {
        for (_, state) in &mut self.queries {
            if state.desc.matches(types) {
                state.members.insert(entity);
            }
        }
    }

    fn state(&self, id: QueryId) -> Option<&QueryState> {
        self.queries
            .iter()
            .find(|(qid, _)| *qid == id)
            .map(|(_, s)| s)
    }
}

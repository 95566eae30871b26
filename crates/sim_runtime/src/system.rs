//! System contract and registration.
//!
//! A system is a behaviour module that declares, at load time, which
//! component combinations it cares about. Each tick the manager hands every
//! registered callback a [`QueryView`] over the matching entities. Callbacks
//! of one system run sequentially in registration order; distinct systems
//! fan out in parallel.

use sim_component::{Component, ComponentTypeId, Diff, Entity, QueryDescriptor, QueryId};
use tracing::{debug, warn};

use crate::database::{ComponentDatabase, ComponentMut, ComponentRef};
use crate::manager::Manager;

/// A tick callback: receives the view over its query's entities and the
/// manager for entity creation, time reads, and pause state.
///
/// Callbacks must not retain component guards or entity views past return;
/// everything handed in is valid for the current tick only.
pub type SystemCallback = Box<dyn FnMut(&QueryView<'_>, &Manager) + Send>;

/// A behaviour module loaded into the manager.
///
/// `init` is called exactly once, at load time, and is the only place a
/// system may register (query, callback) pairs.
pub trait System: Send {
    /// Display name used in logs and timing reports.
    fn name(&self) -> &str;

    /// Register this system's (query, callback) pairs.
    fn init(&mut self, registrar: &mut Registrar<'_>);
}

/// Collects (query, callback) registrations during [`System::init`].
///
/// Registration validates the query's component types against the registry:
/// a query naming an unknown type is dropped with a diagnostic, and the
/// remaining registrations still take effect.
pub struct Registrar<'a> {
    db: &'a ComponentDatabase,
    system_name: &'a str,
    slots: Vec<(QueryId, SystemCallback)>,
}

impl<'a> Registrar<'a> {
    pub(crate) fn new(db: &'a ComponentDatabase, system_name: &'a str) -> Self {
        Self {
            db,
            system_name,
            slots: Vec::new(),
        }
    }

    /// Register a callback for the entities matching `desc`. Returns the
    /// standing query ID, or `None` if the query names an unregistered
    /// component type.
    pub fn register<F>(&mut self, desc: QueryDescriptor, callback: F) -> Option<QueryId>
    where
        F: FnMut(&QueryView<'_>, &Manager) + Send + 'static,
    {
        for ty in desc.required() {
            if !self.db.registry().contains(*ty) {
                warn!(
                    system = self.system_name,
                    type_id = ty.0,
                    "query names an unregistered component type, registration dropped"
                );
                return None;
            }
        }
        let (id, is_new) = self.db.add_query(desc);
        debug!(
            system = self.system_name,
            query_id = id.0,
            shared = !is_new,
            "system callback registered"
        );
        self.slots.push((id, Box::new(callback)));
        Some(id)
    }

    pub(crate) fn into_slots(self) -> Vec<(QueryId, SystemCallback)> {
        self.slots
    }
}

/// A system instance plus its registered callbacks, as held by the manager.
pub(crate) struct LoadedSystem {
    pub(crate) name: String,
    /// Kept alive for the manager's lifetime; systems may own state their
    /// callbacks capture by reference counting.
    #[allow(dead_code)]
    pub(crate) system: Box<dyn System>,
    pub(crate) slots: Vec<(QueryId, SystemCallback)>,
}

/// Per-tick window onto one standing query.
///
/// The entity list is the membership sampled right after this tick's
/// commit, ascending by ID. Component access goes through the database, so
/// reads see the committed snapshot and writes land in shadow copies.
pub struct QueryView<'a> {
    db: &'a ComponentDatabase,
    id: QueryId,
    entities: Vec<Entity>,
}

impl<'a> QueryView<'a> {
    pub(crate) fn new(db: &'a ComponentDatabase, id: QueryId, entities: Vec<Entity>) -> Self {
        Self { db, id, entities }
    }

    /// The standing query this view was built from.
    #[must_use]
    pub fn query_id(&self) -> QueryId {
        self.id
    }

    /// Matching entities, ascending by ID.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Returns the number of matching entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entities match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Committed read access to one matching entity's component.
    #[must_use]
    pub fn get<T: Component>(&self, entity: Entity) -> Option<ComponentRef<'a, T>> {
        self.db.entity_component::<T>(entity)
    }

    /// Shadow-copy write access. The write becomes visible at the next
    /// commit; at most one system should write each component type.
    #[must_use]
    pub fn get_mut<T: Component>(&self, entity: Entity) -> Option<ComponentMut<'a, T>> {
        self.db.entity_component_mut::<T>(entity)
    }

    /// The difference flag assigned to the pair at this tick's commit.
    #[must_use]
    pub fn diff(&self, entity: Entity, type_id: ComponentTypeId) -> Diff {
        self.db.is_different(entity, type_id)
    }
}

/// Convenience for closure-based systems, mirroring the usual pattern of a
/// module with one query and one callback.
pub struct FnSystem<F> {
    name: String,
    desc: QueryDescriptor,
    callback: Option<F>,
}

impl<F> FnSystem<F>
where
    F: FnMut(&QueryView<'_>, &Manager) + Send + 'static,
{
    /// Wrap a single (query, callback) pair as a system.
    pub fn new(name: impl Into<String>, desc: QueryDescriptor, callback: F) -> Self {
        Self {
            name: name.into(),
            desc,
            callback: Some(callback),
        }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&QueryView<'_>, &Manager) + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, registrar: &mut Registrar<'_>) {
        if let Some(callback) = self.callback.take() {
            let _ = registrar.register(self.desc.clone(), callback);
        }
    }
}

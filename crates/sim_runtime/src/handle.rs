//! Scoped read/write lease over the database.
//!
//! Tools that need multi-step consistency (world loaders, inspectors)
//! acquire a handle; while any handle is alive the database refuses to
//! commit, so every read and write inside the scope sees one frozen
//! snapshot. Systems never need one — they already run between commits.

use sim_component::Entity;

use crate::facade::EntityRef;
use crate::manager::Manager;

/// Commit-blocking lease. Acquired via [`Manager::data_handle`]; the
/// freeze lasts until drop.
///
/// Acquisition blocks while a commit is mid-flight. Holding a handle
/// across a call to `update_once` on the same thread deadlocks the commit
/// step, so keep scopes tight.
#[must_use = "dropping the handle immediately unfreezes the database"]
pub struct DataHandle<'a> {
    manager: &'a Manager,
}

impl<'a> DataHandle<'a> {
    pub(crate) fn new(manager: &'a Manager) -> Self {
        manager.database().block_commit(true);
        Self { manager }
    }

    /// Allocate a live entity. Visible to queries after the commit that
    /// follows release of this handle.
    pub fn create_entity(&self) -> Entity {
        self.manager.create_entity()
    }

    /// Schedule an entity for deletion at the next commit.
    pub fn delete_entity(&self, entity: Entity) -> bool {
        self.manager.delete_entity(entity)
    }

    /// Typed façade over one entity, scoped to the freeze.
    #[must_use]
    pub fn entity(&self, entity: Entity) -> EntityRef<'a> {
        EntityRef::new(self.manager.database(), entity)
    }

    /// The committed simulation time, in seconds.
    #[must_use]
    pub fn simulation_time(&self) -> f64 {
        self.manager.simulation_time()
    }

    /// Stage a new simulation time. Same refusal rules as
    /// [`Manager::set_simulation_time`].
    pub fn set_simulation_time(&self, time: f64) -> bool {
        self.manager.set_simulation_time(time)
    }

    /// The manager this handle was acquired from.
    #[must_use]
    pub fn manager(&self) -> &'a Manager {
        self.manager
    }
}

impl Drop for DataHandle<'_> {
    fn drop(&mut self) {
        self.manager.database().block_commit(false);
    }
}

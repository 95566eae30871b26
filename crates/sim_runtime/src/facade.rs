//! Typed per-entity façade.

use sim_component::{Component, ComponentTypeId, Diff, Entity};

use crate::database::{ComponentDatabase, ComponentMut, ComponentRef};

/// Borrowed view of one entity with typed component helpers.
///
/// Obtained from [`crate::Manager::entity`] or a [`crate::DataHandle`].
/// The usual deferred-commit rules apply: reads see the committed
/// snapshot, adds and writes land at the next commit.
#[derive(Clone, Copy)]
pub struct EntityRef<'a> {
    db: &'a ComponentDatabase,
    entity: Entity,
}

impl<'a> EntityRef<'a> {
    pub(crate) fn new(db: &'a ComponentDatabase, entity: Entity) -> Self {
        Self { db, entity }
    }

    /// The entity this view refers to.
    #[must_use]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Returns `true` if the entity is live.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.db.entity_exists(self.entity)
    }

    /// Returns `true` if a committed component of type `T` is attached.
    #[must_use]
    pub fn has<T: Component>(&self) -> bool {
        self.db.has_component(self.entity, ComponentTypeId::of::<T>())
    }

    /// Committed read access.
    #[must_use]
    pub fn get<T: Component>(&self) -> Option<ComponentRef<'a, T>> {
        self.db.entity_component::<T>(self.entity)
    }

    /// Shadow-copy write access.
    #[must_use]
    pub fn get_mut<T: Component>(&self) -> Option<ComponentMut<'a, T>> {
        self.db.entity_component_mut::<T>(self.entity)
    }

    /// Attach a default-constructed `T`, staged for the next commit. The
    /// guard writes the staged storage directly.
    pub fn add<T: Component>(&self) -> Option<ComponentMut<'a, T>> {
        self.db.add_component::<T>(self.entity)
    }

    /// Schedule removal of the committed `T`.
    pub fn remove<T: Component>(&self) -> bool {
        self.db.remove_component(self.entity, ComponentTypeId::of::<T>())
    }

    /// The difference flag for `T` assigned at the last commit.
    #[must_use]
    pub fn diff<T: Component>(&self) -> Diff {
        self.db.is_different(self.entity, ComponentTypeId::of::<T>())
    }
}

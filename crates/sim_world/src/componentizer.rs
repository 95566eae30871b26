//! Componentizer contract.
//!
//! A componentizer converts world-description elements into component
//! attaches. The loader calls `init` once, then `componentize` for every
//! element of every loaded document, passing the entity that element maps
//! to and the name map for cross-references.

use std::collections::HashMap;

use sim_component::{ComponentRegistry, Entity};
use sim_runtime::DataHandle;

use crate::element::Element;

/// Name → entity index built during a load, resolving references like
/// `attached_to="arm"`. An element contributes its `name` attribute mapped
/// to the entity it belongs to; on collision the first occurrence wins.
#[derive(Debug, Default)]
pub struct ElementEntityMap {
    by_name: HashMap<String, Entity>,
}

impl ElementEntityMap {
    pub(crate) fn insert(&mut self, name: &str, entity: Entity) {
        self.by_name.entry(name.to_owned()).or_insert(entity);
    }

    /// The entity owning the element with the given `name` attribute.
    #[must_use]
    pub fn entity_for(&self, name: &str) -> Option<Entity> {
        self.by_name.get(name).copied()
    }

    /// Returns the number of named elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if no element carried a `name` attribute.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Converts world-description elements into entity/component state.
pub trait Componentizer: Send {
    /// Display name used in logs.
    fn name(&self) -> &str;

    /// Called once at load time; registers the component types this
    /// componentizer produces.
    fn init(&mut self, registry: &ComponentRegistry);

    /// Called per element, in document order. `entity` is the entity the
    /// element maps to (its nearest top-level ancestor). Attaches go
    /// through `handle`, so the whole load commits as one wave.
    fn componentize(
        &mut self,
        handle: &DataHandle<'_>,
        element: &Element,
        entity: Entity,
        entities: &ElementEntityMap,
    );
}

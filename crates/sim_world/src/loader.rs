//! The world loader.
//!
//! Turns a parsed document into entity and component creations. One entity
//! is created per top-level element under the document root; nested
//! elements map to their nearest top-level ancestor. The whole load runs
//! under one data handle, so readers never observe a half-built world and
//! everything becomes visible at the commit after the handle is released.

use std::path::Path;

use sim_runtime::{DataHandle, Manager};
use tracing::{debug, info};

use sim_component::Entity;

use crate::componentizer::{Componentizer, ElementEntityMap};
use crate::element::Element;
use crate::error::WorldError;
use crate::parser;

/// Loads world descriptions through a set of componentizers.
#[derive(Default)]
pub struct WorldLoader {
    componentizers: Vec<Box<dyn Componentizer>>,
}

impl WorldLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a componentizer online: run its `init` phase against the
    /// manager's registry and keep it for subsequent loads.
    pub fn load_componentizer(&mut self, manager: &Manager, mut componentizer: impl Componentizer + 'static) {
        componentizer.init(manager.database().registry());
        info!(componentizer = componentizer.name(), "componentizer loaded");
        self.componentizers.push(Box::new(componentizer));
    }

    /// Load a world from an XML string. Returns the entities created for
    /// the top-level elements, in document order; they become visible to
    /// queries at the next tick.
    pub fn load_world_from_string(
        &mut self,
        manager: &Manager,
        xml: &str,
    ) -> Result<Vec<Entity>, WorldError> {
        let root = parser::parse(xml)?;
        let handle = manager.data_handle();

        // Pass 1: allocate entities and build the name map.
        let mut entities = ElementEntityMap::default();
        let mut top_level = Vec::with_capacity(root.children.len());
        for element in &root.children {
            let entity = handle.create_entity();
            top_level.push(entity);
            index_names(element, entity, &mut entities);
        }
        if let Some(name) = root.attr("name") {
            debug!(world = name, entities = top_level.len(), "world parsed");
        }

        // Pass 2: every componentizer sees every element.
        for (element, entity) in root.children.iter().zip(&top_level) {
            self.componentize_subtree(&handle, element, *entity, &entities);
        }

        info!(
            entities = top_level.len(),
            componentizers = self.componentizers.len(),
            "world loaded"
        );
        Ok(top_level)
    }

    /// Load a world from a file path.
    pub fn load_world_from_file(
        &mut self,
        manager: &Manager,
        path: impl AsRef<Path>,
    ) -> Result<Vec<Entity>, WorldError> {
        let xml = std::fs::read_to_string(path)?;
        self.load_world_from_string(manager, &xml)
    }

    fn componentize_subtree(
        &mut self,
        handle: &DataHandle<'_>,
        element: &Element,
        entity: Entity,
        entities: &ElementEntityMap,
    ) {
        for componentizer in &mut self.componentizers {
            componentizer.componentize(handle, element, entity, entities);
        }
        for child in &element.children {
            self.componentize_subtree(handle, child, entity, entities);
        }
    }
}

/// Record the `name` attribute of `element` and its whole subtree as
/// belonging to `entity`.
fn index_names(element: &Element, entity: Entity, entities: &mut ElementEntityMap) {
    if let Some(name) = element.attr("name") {
        entities.insert(name, entity);
    }
    for child in &element.children {
        index_names(child, entity, entities);
    }
}

//! Entity type and allocation utilities.
//!
//! An [`Entity`] is a lightweight `u64` identifier with no inherent data.
//! IDs are allocated by the [`EntityAllocator`] owned by the component
//! database; freed IDs sit in quarantine for one commit before reuse so no
//! standing query can still name them when they come back.

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Entities are pure identifiers — they carry no data of their own.
/// Components are attached to entities to give them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl Entity {
    /// The null / invalid entity sentinel.
    pub const INVALID: Entity = Entity(0);

    /// Create an entity from a raw `u64` identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) entity.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Allocates entity IDs: monotonically increasing, with a recycling free
/// list fed through a one-commit quarantine.
///
/// Lifecycle of a freed ID: [`EntityAllocator::release`] puts it in
/// quarantine; the next [`EntityAllocator::recycle`] (called by the database
/// at the start of every commit) promotes quarantined IDs to the free list,
/// after which [`EntityAllocator::allocate`] may hand them out again.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: u64,
    /// IDs released since the last recycle. Not yet reusable.
    quarantined: Vec<Entity>,
    /// IDs eligible for reuse.
    free: Vec<Entity>,
}

impl EntityAllocator {
    /// Creates a new allocator. IDs start at 1 (0 is reserved for [`Entity::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            quarantined: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Allocates an entity ID, reusing a recycled one when available.
    pub fn allocate(&mut self) -> Entity {
        if let Some(e) = self.free.pop() {
            return e;
        }
        let id = self.next_id;
        self.next_id += 1;
        Entity(id)
    }

    /// Puts a freed ID into quarantine. It stays unavailable until the next
    /// call to [`EntityAllocator::recycle`].
    pub fn release(&mut self, entity: Entity) {
        self.quarantined.push(entity);
    }

    /// Promotes all quarantined IDs to the free list.
    pub fn recycle(&mut self) {
        self.free.append(&mut self.quarantined);
    }

    /// Returns `true` if the ID is currently quarantined.
    #[must_use]
    pub fn is_quarantined(&self, entity: Entity) -> bool {
        self.quarantined.contains(&entity)
    }

    /// Returns the number of IDs handed out so far (including recycled ones
    /// only once).
    #[must_use]
    pub fn count(&self) -> u64 {
        self.next_id - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

//! The component database — single source of truth for all simulation state.
//!
//! Components are opaque heap blocks manipulated only through the thunks in
//! their registered [`ComponentInfo`]. All structural mutation is deferred:
//! adds, shadow writes, removals, and entity deletions are buffered during a
//! tick and applied by [`ComponentDatabase::commit`] at the tick boundary,
//! so concurrent system callbacks always observe the snapshot of the last
//! commit.
//!
//! ## Pointer discipline
//!
//! Every block lives in its own heap allocation, so a pointer handed out
//! during a tick stays valid until the commit that destroys its component —
//! index mutations never move storage. Commits only run between ticks (the
//! scheduler waits for the fan-out pool) or with all data handles released,
//! which is what makes the borrow-free guards below sound in practice.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use sim_component::{
    Component, ComponentInfo, ComponentRegistry, ComponentTypeId, Diff, Entity, EntityAllocator,
    QueryDescriptor, QueryId,
};

use crate::gate::CommitGate;
use crate::queries::QueryEngine;

/// One component instance: an owned heap allocation plus the vtable used to
/// construct, copy, and destroy it.
struct ComponentBlock {
    ptr: NonNull<u8>,
    info: ComponentInfo,
    /// Whether the block currently owns a constructed value. Cleared when
    /// the bytes are shallow-copied into another block.
    initialized: bool,
}

impl ComponentBlock {
    fn alloc(info: &ComponentInfo) -> NonNull<u8> {
        if info.layout.size() == 0 {
            // Zero-sized components get a dangling, well-aligned pointer.
            // SAFETY: `layout.align()` is non-zero and a valid address for a
            // zero-sized access.
            unsafe { NonNull::new_unchecked(info.layout.align() as *mut u8) }
        } else {
            // SAFETY: The layout has non-zero size.
            let raw = unsafe { std::alloc::alloc(info.layout) };
            NonNull::new(raw).unwrap_or_else(|| std::alloc::handle_alloc_error(info.layout))
        }
    }

    /// Allocate and default-construct a new instance.
    fn new_default(info: ComponentInfo) -> Self {
        let ptr = Self::alloc(&info);
        // SAFETY: `ptr` is fresh, aligned storage for the type.
        unsafe { (info.default_fn)(ptr.as_ptr()) };
        Self {
            ptr,
            info,
            initialized: true,
        }
    }

    /// Allocate a deep copy of the value at `src`.
    ///
    /// # Safety
    ///
    /// `src` must point to a valid instance of the block's type.
    unsafe fn new_clone_of(info: ComponentInfo, src: *const u8) -> Self {
        let ptr = Self::alloc(&info);
        // SAFETY: `src` is valid per contract; `ptr` is uninitialised
        // storage of the right layout.
        unsafe { (info.clone_fn)(src, ptr.as_ptr()) };
        Self {
            ptr,
            info,
            initialized: true,
        }
    }

    fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Commit this block's value over `dst`: destruct the current value of
    /// `dst` in place, shallow-copy our bytes over it, and leave this block
    /// as a bare allocation. Ownership of the value moves to `dst`.
    fn move_into(mut self, dst: &mut ComponentBlock) {
        // SAFETY: Both blocks hold the same registered type; `dst` holds a
        // valid value to drop, and the shallow copy transfers ownership of
        // our bytes into `dst`'s allocation.
        unsafe {
            if let Some(drop_fn) = dst.info.drop_fn {
                drop_fn(dst.ptr.as_ptr());
            }
            (self.info.copy_fn)(self.ptr.as_ptr(), dst.ptr.as_ptr());
        }
        self.initialized = false;
    }
}

impl Drop for ComponentBlock {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated with `info.layout`; the value is only
        // dropped when still owned by this block.
        unsafe {
            if self.initialized
                && let Some(drop_fn) = self.info.drop_fn
            {
                drop_fn(self.ptr.as_ptr());
            }
            if self.info.layout.size() != 0 {
                std::alloc::dealloc(self.ptr.as_ptr(), self.info.layout);
            }
        }
    }
}

// SAFETY: The block uniquely owns its allocation, and every storable type is
// `Send + Sync` by the `Component` trait bound.
unsafe impl Send for ComponentBlock {}
unsafe impl Sync for ComponentBlock {}

/// Read guard over a committed component.
///
/// Valid until the next commit; callbacks must not retain it past return,
/// and embedder code outside a tick should hold a data handle instead.
pub struct ComponentRef<'a, T: Component> {
    ptr: NonNull<T>,
    _marker: PhantomData<&'a T>,
}

impl<T: Component> Deref for ComponentRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The pointer targets a live block; see the struct docs for
        // the validity window.
        unsafe { self.ptr.as_ref() }
    }
}

/// Write guard over a staged component (a pending add or a shadow copy).
///
/// Writes land in the staged storage and become globally visible at the
/// next commit. Same validity window as [`ComponentRef`].
pub struct ComponentMut<'a, T: Component> {
    ptr: NonNull<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<T: Component> Deref for ComponentMut<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: See `ComponentRef::deref`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: Component> DerefMut for ComponentMut<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: Staged storage is written through exactly one guard per
        // (entity, type) pair under the one-writer-per-type policy.
        unsafe { self.ptr.as_mut() }
    }
}

/// Everything behind the database-wide lock.
#[derive(Default)]
struct DbInner {
    allocator: EntityAllocator,
    /// Live entity IDs, including those created since the last commit.
    entities: HashSet<Entity>,
    /// Entities created since the last commit; invisible to queries.
    created: HashSet<Entity>,
    /// Committed component storage.
    components: HashMap<Entity, HashMap<ComponentTypeId, ComponentBlock>>,
    /// Staged attaches, applied in order at commit.
    pending_adds: Vec<(Entity, ComponentTypeId, ComponentBlock)>,
    /// Dedup index over `pending_adds`.
    staged_pairs: HashSet<(Entity, ComponentTypeId)>,
    /// Shadow copies written through `entity_component_mut`.
    pending_mods: HashMap<(Entity, ComponentTypeId), ComponentBlock>,
    /// Staged detaches.
    pending_removes: HashSet<(Entity, ComponentTypeId)>,
    /// Staged entity deletions.
    pending_deletes: HashSet<Entity>,
    /// Difference flags assigned at the last commit.
    diffs: HashMap<(Entity, ComponentTypeId), Diff>,
    queries: QueryEngine,
}

impl DbInner {
    /// Apply all staged mutations. See the module docs for the ordering
    /// contract; the numbered steps mirror the tick barrier:
    /// quarantine promotion, entity deletions, flag reset, modifies,
    /// removals (with query hysteresis), adds (with query joins).
    fn commit(&mut self) {
        // 1. IDs quarantined at the previous commit become reusable.
        self.allocator.recycle();

        // 2. Expand entity deletions into per-component removals and hide
        //    the IDs from future creates.
        let deletes: Vec<Entity> = self.pending_deletes.drain().collect();
        for e in &deletes {
            self.entities.remove(e);
            self.created.remove(e);
            if let Some(map) = self.components.get(e) {
                for ty in map.keys() {
                    self.pending_removes.insert((*e, *ty));
                }
            }
            self.allocator.release(*e);
        }
        if !deletes.is_empty() {
            // Staged work for deleted entities is discarded.
            let entities = &self.entities;
            self.pending_adds.retain(|(e, _, _)| entities.contains(e));
            self.staged_pairs.retain(|(e, _)| entities.contains(e));
            self.pending_mods.retain(|(e, _), _| entities.contains(e));
        }

        // 3. Difference flags describe one commit only.
        self.diffs.clear();

        // Entities that lost a required component one commit ago leave
        // their query memberships now.
        self.queries.drop_departing();

        // 4. Commit shadow copies back over the live storage.
        let mods: Vec<((Entity, ComponentTypeId), ComponentBlock)> =
            self.pending_mods.drain().collect();
        let mod_count = mods.len();
        for ((e, ty), shadow) in mods {
            if self.pending_removes.contains(&(e, ty)) {
                // Removal wins over a stale shadow.
                continue;
            }
            if let Some(block) = self.components.get_mut(&e).and_then(|m| m.get_mut(&ty)) {
                shadow.move_into(block);
                self.diffs.insert((e, ty), Diff::Modified);
            }
        }

        // 5. Destroy removed components and mark the one-tick query exit.
        let removes: Vec<(Entity, ComponentTypeId)> = self.pending_removes.drain().collect();
        let remove_count = removes.len();
        for (e, ty) in removes {
            let mut removed = false;
            if let Some(map) = self.components.get_mut(&e) {
                removed = map.remove(&ty).is_some();
            }
            if removed {
                if self.components.get(&e).is_some_and(HashMap::is_empty) {
                    self.components.remove(&e);
                }
                self.diffs.insert((e, ty), Diff::Deleted);
                self.queries.note_removal(e, ty);
            }
        }

        // 6. Splice staged adds and refresh query memberships.
        let adds: Vec<(Entity, ComponentTypeId, ComponentBlock)> =
            self.pending_adds.drain(..).collect();
        let add_count = adds.len();
        let mut touched: HashSet<Entity> = HashSet::new();
        for (e, ty, block) in adds {
            if !self.entities.contains(&e) {
                continue;
            }
            self.components.entry(e).or_default().insert(ty, block);
            self.diffs.insert((e, ty), Diff::Created);
            touched.insert(e);
        }
        for e in touched {
            let types: BTreeSet<ComponentTypeId> = self
                .components
                .get(&e)
                .map(|m| m.keys().copied().collect())
                .unwrap_or_default();
            self.queries.note_entity_updated(e, &types);
        }

        // 7. Reset the per-tick buffers.
        self.staged_pairs.clear();
        self.created.clear();

        if add_count + mod_count + remove_count + deletes.len() > 0 {
            debug!(
                adds = add_count,
                modifies = mod_count,
                removes = remove_count,
                entity_deletes = deletes.len(),
                "commit applied"
            );
        }
    }
}

/// The component database.
///
/// All methods take `&self`; a database-wide mutex is held for the duration
/// of each call, and [`ComponentDatabase::commit`] is serialised against
/// live [`crate::DataHandle`]s by the commit gate.
pub struct ComponentDatabase {
    registry: Arc<ComponentRegistry>,
    inner: Mutex<DbInner>,
    gate: CommitGate,
}

impl Default for ComponentDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentDatabase {
    /// Create an empty database with its own component type registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ComponentRegistry::new()),
            inner: Mutex::new(DbInner::default()),
            gate: CommitGate::new(),
        }
    }

    /// The component type registry backing this database.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    // -- Entity lifecycle --

    /// Allocate a live entity ID. The ID appears in query memberships only
    /// after the commit that makes its components visible.
    pub fn create_entity(&self) -> Entity {
        let mut inner = self.inner.lock();
        let e = inner.allocator.allocate();
        inner.entities.insert(e);
        inner.created.insert(e);
        e
    }

    /// Schedule an entity and all its components for removal at the next
    /// commit. Returns `true` if the ID was live at call time; scheduling is
    /// idempotent within a tick.
    pub fn delete_entity(&self, entity: Entity) -> bool {
        let mut inner = self.inner.lock();
        if !inner.entities.contains(&entity) {
            return false;
        }
        inner.pending_deletes.insert(entity);
        true
    }

    /// Returns `true` if the ID is live (committed or created this tick).
    #[must_use]
    pub fn entity_exists(&self, entity: Entity) -> bool {
        self.inner.lock().entities.contains(&entity)
    }

    // -- Component attach / detach --

    /// Attach a default-constructed component of the registered type and
    /// return a pointer to its staged storage. The pointer is writable
    /// immediately; the component becomes visible to readers and queries at
    /// the next commit.
    ///
    /// Returns `None` if the type is unregistered, the entity is not live,
    /// or the pair already exists (live or staged).
    pub fn add_component_raw(
        &self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Option<NonNull<u8>> {
        let Some(info) = self.registry.info(type_id) else {
            warn!(entity = entity.id(), type_id = type_id.0, "add_component on unregistered type");
            return None;
        };
        let mut inner = self.inner.lock();
        if !inner.entities.contains(&entity) || inner.pending_deletes.contains(&entity) {
            return None;
        }
        let key = (entity, type_id);
        let committed = inner
            .components
            .get(&entity)
            .is_some_and(|m| m.contains_key(&type_id));
        if committed || inner.staged_pairs.contains(&key) {
            return None;
        }
        let block = ComponentBlock::new_default(info);
        let ptr = block.as_ptr();
        inner.pending_adds.push((entity, type_id, block));
        inner.staged_pairs.insert(key);
        Some(ptr)
    }

    /// Typed [`ComponentDatabase::add_component_raw`].
    pub fn add_component<T: Component>(&self, entity: Entity) -> Option<ComponentMut<'_, T>> {
        let ptr = self.add_component_raw(entity, ComponentTypeId::of::<T>())?;
        Some(ComponentMut {
            ptr: ptr.cast::<T>(),
            _marker: PhantomData,
        })
    }

    /// Schedule removal of a component. Returns `true` iff the pair is
    /// committed-live; staging is idempotent. A pair that only exists as a
    /// pending add is not live and returns `false` (the staged add still
    /// commits).
    pub fn remove_component(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        let mut inner = self.inner.lock();
        let live = inner
            .components
            .get(&entity)
            .is_some_and(|m| m.contains_key(&type_id));
        if !live || !inner.entities.contains(&entity) {
            return false;
        }
        inner.pending_removes.insert((entity, type_id));
        true
    }

    /// Returns `true` if the pair is committed-live.
    #[must_use]
    pub fn has_component(&self, entity: Entity, type_id: ComponentTypeId) -> bool {
        self.inner
            .lock()
            .components
            .get(&entity)
            .is_some_and(|m| m.contains_key(&type_id))
    }

    // -- Component access --

    /// Pointer to the committed storage of a pair, or `None` if the pair is
    /// not live. Staged adds are not visible here: the read-only view is
    /// always the last-committed snapshot.
    #[must_use]
    pub fn entity_component_raw(
        &self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Option<NonNull<u8>> {
        let inner = self.inner.lock();
        inner
            .components
            .get(&entity)
            .and_then(|m| m.get(&type_id))
            .map(ComponentBlock::as_ptr)
    }

    /// Typed read access to the committed snapshot.
    #[must_use]
    pub fn entity_component<T: Component>(&self, entity: Entity) -> Option<ComponentRef<'_, T>> {
        let type_id = ComponentTypeId::of::<T>();
        if !self.registry.contains(type_id) {
            return None;
        }
        let ptr = self.entity_component_raw(entity, type_id)?;
        Some(ComponentRef {
            ptr: ptr.cast::<T>(),
            _marker: PhantomData,
        })
    }

    /// Pointer to the shadow copy of a committed pair. The first call in a
    /// tick deep-copies the committed value; later calls return the same
    /// shadow. Writes become visible (and flag `Modified`) at the next
    /// commit.
    ///
    /// Returns `None` for pairs that are not committed-live, pairs staged
    /// for removal, or entities staged for deletion.
    pub fn entity_component_mut_raw(
        &self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Option<NonNull<u8>> {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        if inner.pending_deletes.contains(&entity)
            || inner.pending_removes.contains(&(entity, type_id))
        {
            return None;
        }
        let block = inner.components.get(&entity)?.get(&type_id)?;
        let key = (entity, type_id);
        if let Some(shadow) = inner.pending_mods.get(&key) {
            return Some(shadow.as_ptr());
        }
        // SAFETY: `block` holds a valid committed instance of the type.
        let shadow = unsafe { ComponentBlock::new_clone_of(block.info.clone(), block.as_ptr().as_ptr()) };
        let ptr = shadow.as_ptr();
        inner.pending_mods.insert(key, shadow);
        Some(ptr)
    }

    /// Typed shadow-copy access.
    pub fn entity_component_mut<T: Component>(
        &self,
        entity: Entity,
    ) -> Option<ComponentMut<'_, T>> {
        let type_id = ComponentTypeId::of::<T>();
        if !self.registry.contains(type_id) {
            return None;
        }
        let ptr = self.entity_component_mut_raw(entity, type_id)?;
        Some(ComponentMut {
            ptr: ptr.cast::<T>(),
            _marker: PhantomData,
        })
    }

    /// The difference flag assigned to the pair at the last commit.
    #[must_use]
    pub fn is_different(&self, entity: Entity, type_id: ComponentTypeId) -> Diff {
        self.inner
            .lock()
            .diffs
            .get(&(entity, type_id))
            .copied()
            .unwrap_or(Diff::None)
    }

    // -- Standing queries --

    /// Install a standing query (dedup on required set). Membership is
    /// seeded from committed state; entities from the current uncommitted
    /// create wave are excluded.
    pub fn add_query(&self, desc: QueryDescriptor) -> (QueryId, bool) {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let seed: Vec<(Entity, BTreeSet<ComponentTypeId>)> = inner
            .components
            .iter()
            .filter(|(e, _)| !inner.created.contains(e))
            .map(|(e, m)| (*e, m.keys().copied().collect()))
            .collect();
        inner.queries.add(desc, seed)
    }

    /// Remove a standing query. Returns `true` if it existed.
    pub fn remove_query(&self, id: QueryId) -> bool {
        self.inner.lock().queries.remove(id)
    }

    /// The membership of a standing query, ascending by entity ID.
    #[must_use]
    pub fn query_entity_ids(&self, id: QueryId) -> Option<Vec<Entity>> {
        self.inner.lock().queries.entity_ids(id)
    }

    /// The required component types of a standing query.
    #[must_use]
    pub fn query_component_types(&self, id: QueryId) -> Option<Vec<ComponentTypeId>> {
        self.inner.lock().queries.component_types(id)
    }

    /// One-shot snapshot of the entities whose committed components satisfy
    /// `required`, without installing a standing query.
    #[must_use]
    pub fn snapshot_matching(&self, required: &[ComponentTypeId]) -> Vec<Entity> {
        let inner = self.inner.lock();
        let mut out: Vec<Entity> = inner
            .components
            .iter()
            .filter(|(e, m)| {
                !inner.created.contains(e) && required.iter().all(|ty| m.contains_key(ty))
            })
            .map(|(e, _)| *e)
            .collect();
        out.sort_unstable();
        out
    }

    // -- Commit barrier --

    /// Block or unblock the commit barrier. Used by data handles; prefer
    /// the RAII [`crate::DataHandle`] over calling this directly.
    pub fn block_commit(&self, blocked: bool) {
        if blocked {
            self.gate.block();
        } else {
            self.gate.unblock();
        }
    }

    /// Apply all staged mutations, recompute difference flags, and refresh
    /// query memberships. Waits until every data handle is released.
    pub fn commit(&self) {
        self.gate.begin_commit();
        self.inner.lock().commit();
        self.gate.end_commit();
    }
}

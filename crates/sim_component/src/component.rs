//! Core [`Component`] trait, type metadata, and the component type registry.
//!
//! Component instances are opaque byte blocks to the database. Everything
//! type-specific — construction, destruction, copying — goes through the
//! thunks in [`ComponentInfo`], so new component schemas ship without the
//! core knowing their layout.
//!
//! ## Type Identity
//!
//! [`ComponentTypeId`] is derived from the component's **string name** using
//! the FNV-1a 64-bit hash algorithm. This is deterministic across processes,
//! so schema-driven loaders and plugins agree on IDs without coordination.

use serde::{Deserialize, Serialize};

/// A unique identifier for a component type, derived from its string name
/// using the FNV-1a 64-bit hash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ComponentTypeId(pub u64);

impl ComponentTypeId {
    /// The null / unknown component type sentinel.
    pub const INVALID: ComponentTypeId = ComponentTypeId(0);

    /// FNV-1a 64-bit offset basis.
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

    /// FNV-1a 64-bit prime.
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    /// Compute the [`ComponentTypeId`] from a component's string name.
    ///
    /// # Algorithm (FNV-1a 64-bit)
    ///
    /// ```text
    /// hash = 0xcbf29ce484222325          (offset basis)
    /// for each byte in name.as_bytes():
    ///     hash = hash XOR byte
    ///     hash = hash * 0x00000100000001b3  (prime)
    /// return hash
    /// ```
    #[must_use]
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash = Self::FNV_OFFSET_BASIS;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u64;
            hash = hash.wrapping_mul(Self::FNV_PRIME);
            i += 1;
        }
        Self(hash)
    }

    /// Compute the [`ComponentTypeId`] for a Rust component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self::from_name(T::type_name())
    }

    /// Returns `true` if this is a valid (non-sentinel) type ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Metadata about a component type, used for type-erased storage.
///
/// The database constructs, destroys, and copies instances exclusively
/// through these thunks.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// The unique type identifier.
    pub type_id: ComponentTypeId,
    /// The human-readable name of the component (e.g. `"Pose"`).
    pub name: &'static str,
    /// Memory layout of one component instance.
    pub layout: std::alloc::Layout,
    /// Default-construct a component in place at `dst`.
    pub default_fn: unsafe fn(dst: *mut u8),
    /// Drop a component in place, if the type needs dropping.
    pub drop_fn: Option<unsafe fn(ptr: *mut u8)>,
    /// Shallow-copy (bitwise) a component from `src` to `dst`. After the
    /// copy, `dst` owns any resources; `src` must not be dropped.
    pub copy_fn: unsafe fn(src: *const u8, dst: *mut u8),
    /// Deep-copy a component from `src` into uninitialised `dst`.
    pub clone_fn: unsafe fn(src: *const u8, dst: *mut u8),
}

impl ComponentInfo {
    /// Size of one component instance in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

/// The core component trait.
///
/// All data attached to entities must implement this trait. Components must
/// be `Send + Sync` for parallel system fan-out, `Default` so the database
/// can construct staged instances, and `Clone` so mutable access can shadow
/// the committed copy.
///
/// # Examples
///
/// ```rust
/// use sim_component::Component;
///
/// #[derive(Debug, Clone, Default)]
/// struct Battery {
///     charge: f32,
/// }
///
/// impl Component for Battery {
///     fn type_name() -> &'static str { "Battery" }
/// }
/// ```
pub trait Component: Send + Sync + Default + Clone + 'static {
    /// A human-readable name for this component type.
    fn type_name() -> &'static str;

    /// Returns the [`ComponentTypeId`] for this component.
    fn component_type_id() -> ComponentTypeId {
        ComponentTypeId::from_name(Self::type_name())
    }

    /// Returns the [`ComponentInfo`] descriptor for this component type.
    fn info() -> ComponentInfo {
        ComponentInfo {
            type_id: Self::component_type_id(),
            name: Self::type_name(),
            layout: std::alloc::Layout::new::<Self>(),
            default_fn: |dst: *mut u8| {
                // SAFETY: Caller guarantees `dst` is valid, aligned, and
                // uninitialised storage for `Self`.
                unsafe { std::ptr::write(dst as *mut Self, Self::default()) };
            },
            drop_fn: if std::mem::needs_drop::<Self>() {
                Some(|ptr: *mut u8| {
                    // SAFETY: Caller guarantees `ptr` points to a valid `Self`.
                    unsafe { std::ptr::drop_in_place(ptr as *mut Self) };
                })
            } else {
                None
            },
            copy_fn: |src: *const u8, dst: *mut u8| {
                // SAFETY: Caller guarantees both pointers are valid for
                // `size_of::<Self>()` bytes and do not overlap. Ownership of
                // the bytes moves to `dst`.
                unsafe { std::ptr::copy_nonoverlapping(src, dst, std::mem::size_of::<Self>()) };
            },
            clone_fn: |src: *const u8, dst: *mut u8| {
                // SAFETY: Caller guarantees `src` points to a valid `Self`
                // and `dst` to uninitialised storage for one.
                unsafe {
                    let value = (*(src as *const Self)).clone();
                    std::ptr::write(dst as *mut Self, value);
                }
            },
        }
    }
}

/// Errors from component type registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The same display name was registered twice with different layouts.
    #[error("component type '{name}' re-registered with a different layout")]
    LayoutMismatch {
        /// The conflicting display name.
        name: &'static str,
    },
}

/// Process-shareable mapping from [`ComponentTypeId`] to [`ComponentInfo`].
///
/// The registry is a member of the database rather than a process-wide
/// global, so independent managers can coexist in tests. Reads are
/// lock-free; systems resolve type names during fan-out without contending
/// with each other.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    infos: dashmap::DashMap<ComponentTypeId, ComponentInfo>,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Rust component type.
    ///
    /// Idempotent on the display name: registering the same type (or another
    /// type with the same name and layout) again returns the existing ID.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LayoutMismatch`] if the name was previously
    /// registered with a different layout.
    pub fn register<T: Component>(&self) -> Result<ComponentTypeId, RegistryError> {
        self.register_info(T::info())
    }

    /// Register a component type from an explicit metadata record.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::LayoutMismatch`] if the name was previously
    /// registered with a different layout.
    pub fn register_info(&self, info: ComponentInfo) -> Result<ComponentTypeId, RegistryError> {
        let id = info.type_id;
        if let Some(existing) = self.infos.get(&id) {
            if existing.layout != info.layout {
                return Err(RegistryError::LayoutMismatch { name: info.name });
            }
            return Ok(id);
        }
        tracing::debug!(name = info.name, type_id = id.0, size = info.size(), "registered component type");
        self.infos.insert(id, info);
        Ok(id)
    }

    /// Read-only metadata lookup.
    #[must_use]
    pub fn info(&self, id: ComponentTypeId) -> Option<ComponentInfo> {
        self.infos.get(&id).map(|r| r.clone())
    }

    /// Name → ID resolution. Returns [`ComponentTypeId::INVALID`] if the
    /// name has not been registered.
    #[must_use]
    pub fn type_id(&self, name: &str) -> ComponentTypeId {
        let id = ComponentTypeId::from_name(name);
        if self.infos.contains_key(&id) {
            id
        } else {
            ComponentTypeId::INVALID
        }
    }

    /// Returns `true` if the given type ID is registered.
    #[must_use]
    pub fn contains(&self, id: ComponentTypeId) -> bool {
        self.infos.contains_key(&id)
    }

    /// Enumerate all registered type IDs. Used by entity-wide teardown.
    #[must_use]
    pub fn types(&self) -> Vec<ComponentTypeId> {
        self.infos.iter().map(|r| *r.key()).collect()
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns `true` if no types have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Battery {
        charge: f32,
    }

    impl Component for Battery {
        fn type_name() -> &'static str {
            "Battery"
        }
    }

    #[test]
    fn test_component_type_id_is_stable() {
        let id1 = Battery::component_type_id();
        let id2 = Battery::component_type_id();
        assert_eq!(id1, id2);
    }

    #[test]
    fn test_component_type_id_matches_from_name() {
        assert_eq!(
            Battery::component_type_id(),
            ComponentTypeId::from_name("Battery")
        );
    }

    #[test]
    fn test_fnv1a_known_vector() {
        // FNV-1a 64-bit of the empty string is the offset basis itself.
        assert_eq!(
            ComponentTypeId::from_name(""),
            ComponentTypeId(0xcbf2_9ce4_8422_2325)
        );
    }

    #[test]
    fn test_component_type_id_differs_between_types() {
        #[derive(Debug, Clone, Default)]
        struct Radar {
            _range: f32,
        }
        impl Component for Radar {
            fn type_name() -> &'static str {
                "Radar"
            }
        }

        assert_ne!(Battery::component_type_id(), Radar::component_type_id());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ComponentRegistry::new();
        let id1 = registry.register::<Battery>().unwrap();
        let id2 = registry.register::<Battery>().unwrap();
        assert_eq!(id1, id2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_layout_conflict() {
        #[derive(Debug, Clone, Default)]
        struct Fake {
            _a: f64,
            _b: f64,
        }
        impl Component for Fake {
            fn type_name() -> &'static str {
                "Battery" // deliberately collides
            }
        }

        let registry = ComponentRegistry::new();
        registry.register::<Battery>().unwrap();
        assert!(matches!(
            registry.register::<Fake>(),
            Err(RegistryError::LayoutMismatch { name: "Battery" })
        ));
    }

    #[test]
    fn test_name_resolution() {
        let registry = ComponentRegistry::new();
        let id = registry.register::<Battery>().unwrap();
        assert_eq!(registry.type_id("Battery"), id);
        assert_eq!(registry.type_id("NoSuchThing"), ComponentTypeId::INVALID);
    }

    #[test]
    fn test_types_enumeration() {
        let registry = ComponentRegistry::new();
        let id = registry.register::<Battery>().unwrap();
        assert_eq!(registry.types(), vec![id]);
    }

    #[test]
    fn test_default_thunk_constructs_value() {
        let info = Battery::info();
        let mut storage = std::mem::MaybeUninit::<Battery>::uninit();
        // SAFETY: Storage is correctly sized and aligned for Battery.
        unsafe { (info.default_fn)(storage.as_mut_ptr() as *mut u8) };
        // SAFETY: The thunk initialised the value above.
        let value = unsafe { storage.assume_init() };
        assert_eq!(value, Battery::default());
    }

    #[test]
    fn test_clone_thunk_deep_copies() {
        let info = Battery::info();
        let src = Battery { charge: 0.75 };
        let mut dst = std::mem::MaybeUninit::<Battery>::uninit();
        // SAFETY: `src` is valid, `dst` is uninitialised storage for Battery.
        unsafe {
            (info.clone_fn)(
                &src as *const Battery as *const u8,
                dst.as_mut_ptr() as *mut u8,
            )
        };
        // SAFETY: The thunk initialised the value above.
        let value = unsafe { dst.assume_init() };
        assert_eq!(value, src);
    }
}

//! # sim_component
//!
//! ECS primitives for the robotics simulator core.
//!
//! This crate provides:
//!
//! - [`Entity`] — lightweight `u64` entity identifiers.
//! - [`EntityAllocator`] — ID allocator with a one-commit reuse quarantine.
//! - [`Component`] trait — the contract all simulation data must satisfy.
//! - [`ComponentInfo`] — the per-type vtable of construction/copy thunks.
//! - [`ComponentRegistry`] — shareable type-id → metadata table.
//! - [`Diff`] — per-(entity, type) lifecycle flags set at commit.
//! - [`QueryDescriptor`] — declarative required-component-set subscriptions.

pub mod component;
pub mod diff;
pub mod entity;
pub mod query;

pub use component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId, RegistryError};
pub use diff::Diff;
pub use entity::{Entity, EntityAllocator};
pub use query::{QueryDescriptor, QueryId};

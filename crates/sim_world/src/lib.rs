//! # sim_world
//!
//! World-description loading for the simulator: a parser for the SDF-like
//! XML subset world files use, the [`Componentizer`] contract that turns
//! elements into components, and the [`WorldLoader`] that drives a load
//! through a commit-blocking data handle.

pub mod componentizer;
pub mod element;
pub mod error;
pub mod loader;
pub mod parser;

pub use componentizer::{Componentizer, ElementEntityMap};
pub use element::Element;
pub use error::WorldError;
pub use loader::WorldLoader;
pub use parser::{ParseError, parse};

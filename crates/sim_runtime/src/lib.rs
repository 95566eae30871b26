//! # sim_runtime
//!
//! The simulator core runtime: the component database with deferred
//! commits and shadow copies, the standing query engine, the tick
//! scheduler with parallel system fan-out, and the commit-blocking data
//! handle.
//!
//! ## Tick model
//!
//! Each tick has a serial commit phase and a parallel fan-out phase. The
//! commit applies all mutations staged during the previous tick, derives
//! the per-(entity, type) difference flags, and refreshes query
//! memberships; fan-out then dispatches every loaded system's callbacks
//! against a consistent snapshot. Simulation time advances only at the
//! end of a tick, and only to a value staged while unpaused.

pub mod database;
pub mod diagnostics;
pub mod error;
pub mod facade;
mod gate;
pub mod handle;
pub mod manager;
pub mod queries;
pub mod system;

pub use database::{ComponentDatabase, ComponentMut, ComponentRef};
pub use diagnostics::{Diagnostics, NullDiagnostics, TickReport, TimerEntry, TimingDiagnostics};
pub use error::ManagerError;
pub use facade::EntityRef;
pub use handle::DataHandle;
pub use manager::{Manager, ManagerConfig};
pub use system::{FnSystem, QueryView, Registrar, System, SystemCallback};

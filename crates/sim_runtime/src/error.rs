//! Runtime error types.

use thiserror::Error;

/// Errors from manager construction.
///
/// The running surface itself never errors: structural mutators return
/// explicit status values and callback failures are isolated per system.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The fan-out worker pool could not be built.
    #[error("failed to build the fan-out worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

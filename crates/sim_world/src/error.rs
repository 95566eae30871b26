//! World-loading error types.

use thiserror::Error;

use crate::parser::ParseError;

/// Errors from loading a world description.
#[derive(Debug, Error)]
pub enum WorldError {
    /// The document is not valid world XML.
    #[error("malformed world description: {0}")]
    Parse(#[from] ParseError),

    /// The world file could not be read.
    #[error("failed to read world file: {0}")]
    Io(#[from] std::io::Error),
}

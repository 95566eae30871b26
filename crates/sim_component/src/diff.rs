//! Per-(entity, type) difference flags.

use serde::{Deserialize, Serialize};

/// The lifecycle delta of one (entity, component-type) pair across the most
/// recent commit.
///
/// Flags are recomputed at every tick boundary and stay queryable for the
/// whole subsequent tick. At most one of the non-`None` variants is set per
/// pair per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Diff {
    /// Nothing happened to the pair at the last commit.
    #[default]
    None,
    /// The component was attached at the last commit.
    Created,
    /// A shadow write was committed back at the last commit.
    Modified,
    /// The component was detached (or its entity deleted) at the last commit.
    Deleted,
}

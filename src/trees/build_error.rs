use thiserror::Error;

/// Errors reported by `BinningBvhBuilder`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    /// The cancel callback returned true while the build was running.
    #[error("build cancelled")]
    Cancelled,

    /// Some range could not be placed in a leaf without exceeding `max_num_objects_per_leaf` before `max_depth` was
    /// reached.
    #[error(
        "build failed: objects could not be split into leaves of at most {max_num_objects_per_leaf} objects within depth {max_depth}"
    )]
    BuildFailed {
        max_depth: usize,
        max_num_objects_per_leaf: usize,
    },

    #[error("invalid builder settings: {0}")]
    InvalidSettings(String),

    /// More objects than node links can address.
    #[error("too many objects: {0}")]
    TooManyObjects(usize),

    /// Internal consistency check failed. Indicates a bug, or a dispatcher that returned from
    /// `wait_for_all_to_complete` before all of its tasks ran.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(&'static str),
}

//! Parallel binned-SAH bounding volume hierarchy construction.
//!
//! Fill a [`BinningBvhBuilder`] with one axis-aligned box per object, call `build` with a thread dispatcher, and read
//! back a flat array of [`ResultNode`]s plus the object permutation the leaves index into.

pub mod trees;
pub mod utilities;

pub use trees::{BinningBuilderSettings, BinningBvhBuilder, BuildError, ResultNode};
pub use utilities::task_scheduling::{InlineDispatcher, TaskStack};

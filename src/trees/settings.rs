use super::build_error::BuildError;
use super::result_node::ResultNode;

/// Depth is stored in a byte on every result node.
pub const MAX_SUPPORTED_DEPTH: usize = u8::MAX as usize;

/// Nodes that fit in a 64 KiB chunk, minus one.
pub const DEFAULT_RESULT_CHUNK_CAPACITY: usize = (1 << 16) / std::mem::size_of::<ResultNode>() - 1;

/// Cost of visiting an interior node, relative to `intersection_cost`.
pub const TRAVERSAL_COST: f32 = 1.0;

/// Tuning knobs for `BinningBvhBuilder`.
#[derive(Clone, Debug, PartialEq)]
pub struct BinningBuilderSettings {
    /// Ranges with at most this many objects become leaves without a split search.
    pub leaf_num_object_threshold: usize,
    /// Hard upper bound on the number of objects in any leaf.
    pub max_num_objects_per_leaf: usize,
    /// Nodes at this depth are always leaves. The root has depth 0.
    pub max_depth: usize,
    /// Cost of testing one object, relative to visiting one interior node.
    pub intersection_cost: f32,
    /// Both sides of a split need at least this many objects for the right side to become its own task.
    pub new_task_num_ob_threshold: usize,
    /// Ranges at least this large are binned by several threads at once.
    pub axis_parallel_num_ob_threshold: usize,
    /// Number of nodes per result chunk.
    pub result_chunk_capacity: usize,
    /// The cancel callback is polled at nodes no deeper than this.
    pub cancel_check_max_depth: usize,
    /// Print build statistics to the print output after each successful build.
    pub verbose: bool,
}

impl Default for BinningBuilderSettings {
    fn default() -> Self {
        Self {
            leaf_num_object_threshold: 2,
            max_num_objects_per_leaf: 16,
            max_depth: 60,
            intersection_cost: 1.0,
            new_task_num_ob_threshold: 1 << 9,
            axis_parallel_num_ob_threshold: 1 << 20,
            result_chunk_capacity: DEFAULT_RESULT_CHUNK_CAPACITY,
            cancel_check_max_depth: 5,
            verbose: false,
        }
    }
}

impl BinningBuilderSettings {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.leaf_num_object_threshold < 1 {
            return Err(BuildError::InvalidSettings(
                "leaf_num_object_threshold must be at least 1".into(),
            ));
        }
        if self.max_num_objects_per_leaf < self.leaf_num_object_threshold {
            return Err(BuildError::InvalidSettings(format!(
                "max_num_objects_per_leaf ({}) must be at least leaf_num_object_threshold ({})",
                self.max_num_objects_per_leaf, self.leaf_num_object_threshold
            )));
        }
        if self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(BuildError::InvalidSettings(format!(
                "max_depth ({}) must not exceed {MAX_SUPPORTED_DEPTH}",
                self.max_depth
            )));
        }
        if !(self.intersection_cost.is_finite() && self.intersection_cost > 0.0) {
            return Err(BuildError::InvalidSettings(format!(
                "intersection_cost ({}) must be finite and positive",
                self.intersection_cost
            )));
        }
        if self.result_chunk_capacity < 1 {
            return Err(BuildError::InvalidSettings(
                "result_chunk_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Largest number of objects a subtree rooted at each depth can hold:
    /// `max_num_objects_per_leaf * 2^(max_depth - depth)`, saturating.
    pub fn max_objects_at_depth(&self) -> Vec<usize> {
        let mut max_obs = vec![0; self.max_depth + 1];
        let mut count = self.max_num_objects_per_leaf;
        for depth in (0..=self.max_depth).rev() {
            max_obs[depth] = count;
            count = count.saturating_mul(2);
        }
        max_obs
    }
}

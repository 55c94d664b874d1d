use std::fmt;

/// Counters gathered while building. Each worker keeps its own copy; they are merged with `accum_stats` at the end.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BinningBuildStats {
    pub num_maxdepth_leaves: usize,
    pub num_under_thresh_leaves: usize,
    pub num_cheaper_nosplit_leaves: usize,
    pub num_could_not_split_leaves: usize,
    /// Interior nodes split in the middle because no usable bucket split existed.
    pub num_arbitrary_splits: usize,
    pub num_leaves: usize,
    pub num_objects_in_leaves: usize,
    pub max_num_objects_per_leaf: usize,
    pub leaf_depth_sum: usize,
    pub max_leaf_depth: usize,
    pub num_interior_nodes: usize,
    pub num_spawned_tasks: usize,
}

/// Why a range became a leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LeafReason {
    MaxDepth,
    UnderThreshold,
    CheaperNoSplit,
    CouldNotSplit,
}

impl BinningBuildStats {
    pub fn accum_stats(&mut self, other: &Self) {
        self.num_maxdepth_leaves += other.num_maxdepth_leaves;
        self.num_under_thresh_leaves += other.num_under_thresh_leaves;
        self.num_cheaper_nosplit_leaves += other.num_cheaper_nosplit_leaves;
        self.num_could_not_split_leaves += other.num_could_not_split_leaves;
        self.num_arbitrary_splits += other.num_arbitrary_splits;
        self.num_leaves += other.num_leaves;
        self.num_objects_in_leaves += other.num_objects_in_leaves;
        self.max_num_objects_per_leaf = self.max_num_objects_per_leaf.max(other.max_num_objects_per_leaf);
        self.leaf_depth_sum += other.leaf_depth_sum;
        self.max_leaf_depth = self.max_leaf_depth.max(other.max_leaf_depth);
        self.num_interior_nodes += other.num_interior_nodes;
        self.num_spawned_tasks += other.num_spawned_tasks;
    }

    pub(crate) fn record_leaf(&mut self, reason: LeafReason, num_objects: usize, depth: usize) {
        match reason {
            LeafReason::MaxDepth => self.num_maxdepth_leaves += 1,
            LeafReason::UnderThreshold => self.num_under_thresh_leaves += 1,
            LeafReason::CheaperNoSplit => self.num_cheaper_nosplit_leaves += 1,
            LeafReason::CouldNotSplit => self.num_could_not_split_leaves += 1,
        }
        self.num_leaves += 1;
        self.num_objects_in_leaves += num_objects;
        self.max_num_objects_per_leaf = self.max_num_objects_per_leaf.max(num_objects);
        self.leaf_depth_sum += depth;
        self.max_leaf_depth = self.max_leaf_depth.max(depth);
    }

    pub fn average_objects_per_leaf(&self) -> f32 {
        if self.num_leaves == 0 {
            0.0
        } else {
            self.num_objects_in_leaves as f32 / self.num_leaves as f32
        }
    }

    pub fn average_leaf_depth(&self) -> f32 {
        if self.num_leaves == 0 {
            0.0
        } else {
            self.leaf_depth_sum as f32 / self.num_leaves as f32
        }
    }
}

impl fmt::Display for BinningBuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "num interior nodes:         {}", self.num_interior_nodes)?;
        writeln!(f, "num leaves:                 {}", self.num_leaves)?;
        writeln!(f, "num maxdepth leaves:        {}", self.num_maxdepth_leaves)?;
        writeln!(f, "num under_thresh leaves:    {}", self.num_under_thresh_leaves)?;
        writeln!(f, "num cheaper nosplit leaves: {}", self.num_cheaper_nosplit_leaves)?;
        writeln!(f, "num could not split leaves: {}", self.num_could_not_split_leaves)?;
        writeln!(f, "num arbitrary splits:       {}", self.num_arbitrary_splits)?;
        writeln!(f, "num spawned tasks:          {}", self.num_spawned_tasks)?;
        writeln!(f, "av num objects per leaf:    {}", self.average_objects_per_leaf())?;
        writeln!(f, "max num objects per leaf:   {}", self.max_num_objects_per_leaf)?;
        writeln!(f, "av leaf depth:              {}", self.average_leaf_depth())?;
        write!(f, "max leaf depth:             {}", self.max_leaf_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_sums_counts_and_maxes_extremes() {
        let mut a = BinningBuildStats::default();
        a.record_leaf(LeafReason::UnderThreshold, 2, 3);
        a.record_leaf(LeafReason::MaxDepth, 5, 4);
        a.num_interior_nodes = 1;
        a.num_arbitrary_splits = 1;

        let mut b = BinningBuildStats::default();
        b.record_leaf(LeafReason::CheaperNoSplit, 7, 1);
        b.record_leaf(LeafReason::CouldNotSplit, 1, 9);
        b.num_interior_nodes = 2;
        b.num_arbitrary_splits = 2;

        a.accum_stats(&b);
        assert_eq!(a.num_leaves, 4);
        assert_eq!(a.num_under_thresh_leaves, 1);
        assert_eq!(a.num_maxdepth_leaves, 1);
        assert_eq!(a.num_cheaper_nosplit_leaves, 1);
        assert_eq!(a.num_could_not_split_leaves, 1);
        assert_eq!(a.num_objects_in_leaves, 15);
        assert_eq!(a.max_num_objects_per_leaf, 7);
        assert_eq!(a.leaf_depth_sum, 17);
        assert_eq!(a.max_leaf_depth, 9);
        assert_eq!(a.num_interior_nodes, 3);
        assert_eq!(a.num_arbitrary_splits, 3);
        assert!(a.to_string().contains("num arbitrary splits:       3"));
    }

    #[test]
    fn averages_handle_no_leaves() {
        let stats = BinningBuildStats::default();
        assert_eq!(stats.average_objects_per_leaf(), 0.0);
        assert_eq!(stats.average_leaf_depth(), 0.0);
        assert!(stats.to_string().contains("num leaves:"));
    }
}

use super::binning::{compute_bounds, BinningOb};
use super::build_error::BuildError;
use super::build_stats::{BinningBuildStats, LeafReason};
use super::diagnostics;
use super::result_chunk::{merge_chunks, NodeRef};
use super::result_node::ResultNode;
use super::settings::BinningBuilderSettings;
use super::subtree_task::{BuildContext, BuildRange, ObjectsView, SubtreeTask};
use crate::utilities::bounding_box::BoundingBox4;
use crate::utilities::print_output::IPrintOutput;
use crate::utilities::should_cancel::IShouldCancelCallback;
use crate::utilities::thread_dispatcher::IThreadDispatcher;

use std::sync::Arc;
use std::time::Instant;

/// Builds a binary bounding volume hierarchy over a fixed set of boxes with a binned surface area heuristic.
///
/// Set every object's bounds with `set_object_aabb`, then call `build`. The returned nodes have the root at index 0;
/// leaf ranges index into `result_object_indices`. The builder can be refilled and rebuilt any number of times.
pub struct BinningBvhBuilder {
    settings: BinningBuilderSettings,
    max_obs_at_depth: Vec<usize>,
    /// In object index order between builds; permuted into leaf order during a build.
    objects: Vec<BinningOb>,
    result_indices: Vec<u32>,
    root_aabb: BoundingBox4,
    stats: BinningBuildStats,
}

impl BinningBvhBuilder {
    pub fn new(settings: BinningBuilderSettings, num_objects: usize) -> Result<Self, BuildError> {
        settings.validate()?;
        if num_objects > u32::MAX as usize {
            return Err(BuildError::TooManyObjects(num_objects));
        }
        let objects = (0..num_objects)
            .map(|index| BinningOb {
                aabb: BoundingBox4::empty(),
                index: index as u32,
            })
            .collect();
        Ok(Self {
            max_obs_at_depth: settings.max_objects_at_depth(),
            settings,
            objects,
            result_indices: vec![0; num_objects],
            root_aabb: BoundingBox4::empty(),
            stats: BinningBuildStats::default(),
        })
    }

    #[inline(always)]
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn settings(&self) -> &BinningBuilderSettings {
        &self.settings
    }

    /// Sets the bounds of object `object_index`. Every object must be given non-empty bounds before `build`.
    #[inline(always)]
    pub fn set_object_aabb(&mut self, object_index: usize, aabb: BoundingBox4) {
        debug_assert_eq!(self.objects[object_index].index as usize, object_index);
        self.objects[object_index].aabb = aabb;
    }

    #[inline(always)]
    pub fn object_aabb(&self, object_index: usize) -> BoundingBox4 {
        self.objects[object_index].aabb
    }

    /// Object indices in leaf order. Leaf `[begin, end)` ranges index into this.
    pub fn result_object_indices(&self) -> &[u32] {
        &self.result_indices
    }

    /// Bounds of all objects, as of the last build.
    pub fn root_aabb(&self) -> BoundingBox4 {
        self.root_aabb
    }

    /// Statistics of the last successful build.
    pub fn stats(&self) -> &BinningBuildStats {
        &self.stats
    }

    pub fn max_leaf_depth(&self) -> usize {
        self.stats.max_leaf_depth
    }

    /// Builds the tree.
    ///
    /// The root subtree is submitted to `dispatcher` and this call blocks until every subtree task has finished.
    /// `should_cancel` is polled near the top of the tree; once it returns true the build stops and reports
    /// `BuildError::Cancelled`. When verbose output is enabled the build statistics are written to `print_output`.
    pub fn build(
        &mut self,
        dispatcher: &dyn IThreadDispatcher,
        should_cancel: Arc<dyn IShouldCancelCallback>,
        print_output: &dyn IPrintOutput,
    ) -> Result<Vec<ResultNode>, BuildError> {
        let start = Instant::now();
        let result = self.build_tree(dispatcher, should_cancel);
        let elapsed = start.elapsed();
        // Restore index order so set_object_aabb keeps addressing objects by index.
        self.objects.sort_unstable_by_key(|ob| ob.index);

        match &result {
            Ok(nodes) => {
                log::debug!(
                    "built {} nodes over {} objects in {:.3} ms",
                    nodes.len(),
                    self.objects.len(),
                    elapsed.as_secs_f64() * 1000.0
                );
                if cfg!(debug_assertions) {
                    let aabbs = self.objects.iter().map(|ob| ob.aabb).collect::<Vec<_>>();
                    diagnostics::validate_build_results(nodes, &self.result_indices, &aabbs, &self.settings);
                }
                if self.settings.verbose {
                    print_output.print(&format!("Num objects:                {}", self.objects.len()));
                    for line in self.stats.to_string().lines() {
                        print_output.print(line);
                    }
                    print_output.print(&format!(
                        "SAH cost:                   {}",
                        diagnostics::sah_cost(nodes, self.settings.intersection_cost)
                    ));
                    print_output.print(&format!("Build took {:.6} s", elapsed.as_secs_f64()));
                }
            }
            Err(e @ BuildError::BuildFailed { .. }) => log::warn!("{e}"),
            Err(e) => log::debug!("build did not complete: {e}"),
        }
        result
    }

    fn build_tree(
        &mut self,
        dispatcher: &dyn IThreadDispatcher,
        should_cancel: Arc<dyn IShouldCancelCallback>,
    ) -> Result<Vec<ResultNode>, BuildError> {
        self.stats = BinningBuildStats::default();
        debug_assert!(
            self.objects.iter().all(|ob| !ob.aabb.is_empty()),
            "Every object needs bounds before building."
        );
        let (root_aabb, root_centroid_aabb) = compute_bounds(&self.objects);
        self.root_aabb = root_aabb;

        let num_objects = self.objects.len();
        if num_objects == 0 {
            self.stats.record_leaf(LeafReason::UnderThreshold, 0, 0);
            return Ok(vec![ResultNode::new_leaf(BoundingBox4::empty(), 0, 0, 0)]);
        }

        let build = Arc::new(BuildContext::new(
            self.settings.clone(),
            self.max_obs_at_depth.clone(),
            ObjectsView::new(&mut self.objects),
            dispatcher.thread_count(),
            should_cancel,
        ));

        let root_task = Arc::new(SubtreeTask::new(
            BuildRange {
                aabb: root_aabb,
                centroid_aabb: root_centroid_aabb,
                begin: 0,
                end: num_objects,
                depth: 0,
            },
            None,
        ));
        let root_task_index = build.register_task(root_task.clone());
        build.submit_task(root_task_index, root_task.clone(), dispatcher);
        dispatcher.wait_for_all_to_complete();

        let outcome = build.take_outcome();
        if build.was_cancelled() {
            return Err(BuildError::Cancelled);
        }
        if let Some(error) = outcome.error {
            return Err(error);
        }
        if build.has_failed() {
            return Err(BuildError::BuildFailed {
                max_depth: self.settings.max_depth,
                max_num_objects_per_leaf: self.settings.max_num_objects_per_leaf,
            });
        }
        if root_task.root() != Some(NodeRef { chunk: 0, local: 0 }) {
            return Err(BuildError::InvariantViolation("root node is not the first node allocated"));
        }

        let nodes = merge_chunks(outcome.chunks, &outcome.tasks)?;
        for (result_index, ob) in self.result_indices.iter_mut().zip(&self.objects) {
            *result_index = ob.index;
        }
        self.stats = outcome.stats;
        Ok(nodes)
    }
}

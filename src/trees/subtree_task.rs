//! Recursive subtree construction shared by every worker of a build.
//!
//! A build is a tree of `SubtreeTask`s. Each task owns a disjoint range of the object array and writes its nodes into
//! chunks held by the worker running it. Large right halves are handed to the dispatcher as new tasks; the worker that
//! spawned them also tries to run them itself once it is done, and whichever side claims a task first runs it.

use super::binning::{self, BinningOb};
use super::build_error::BuildError;
use super::build_stats::{BinningBuildStats, LeafReason};
use super::partition::{self, PartitionResult};
use super::result_chunk::{ChildRef, ChunkNode, ChunkNodeKind, ChunkPool, NodeRef, ResultChunk};
use super::settings::{BinningBuilderSettings, TRAVERSAL_COST};
use crate::utilities::bounding_box::BoundingBox4;
use crate::utilities::should_cancel::IShouldCancelCallback;
use crate::utilities::task_scheduling::Task;
use crate::utilities::thread_dispatcher::IThreadDispatcher;

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Objects `[begin, end)` together with their bounds and the depth of the node that will hold them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BuildRange {
    pub aabb: BoundingBox4,
    pub centroid_aabb: BoundingBox4,
    pub begin: usize,
    pub end: usize,
    pub depth: usize,
}

impl BuildRange {
    #[inline(always)]
    pub fn num_objects(&self) -> usize {
        self.end - self.begin
    }
}

/// Subtree waiting to be built by whichever worker claims it first.
#[derive(Debug)]
pub(crate) struct SubtreeTask {
    pub range: BuildRange,
    /// Interior node whose right link points at this subtree. `None` for the root.
    pub parent: Option<NodeRef>,
    claimed: AtomicBool,
    root: OnceLock<NodeRef>,
}

impl SubtreeTask {
    pub fn new(range: BuildRange, parent: Option<NodeRef>) -> Self {
        Self {
            range,
            parent,
            claimed: AtomicBool::new(false),
            root: OnceLock::new(),
        }
    }

    /// Returns true for exactly one caller.
    #[inline(always)]
    pub fn try_claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Root node of the subtree, once the task has started.
    #[inline(always)]
    pub fn root(&self) -> Option<NodeRef> {
        self.root.get().copied()
    }
}

/// Shared mutable view of the object array.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ObjectsView {
    ptr: *mut BinningOb,
    len: usize,
}

// Safety: tasks only ever touch disjoint ranges, see `range_mut`.
unsafe impl Send for ObjectsView {}
unsafe impl Sync for ObjectsView {}

impl ObjectsView {
    pub fn new(objects: &mut [BinningOb]) -> Self {
        Self {
            ptr: objects.as_mut_ptr(),
            len: objects.len(),
        }
    }

    /// # Safety
    /// The slice this view was created from must still be alive, and no other live reference may overlap
    /// `[begin, end)`.
    #[inline(always)]
    pub unsafe fn range_mut<'a>(&self, begin: usize, end: usize) -> &'a mut [BinningOb] {
        debug_assert!(begin <= end && end <= self.len);
        std::slice::from_raw_parts_mut(self.ptr.add(begin), end - begin)
    }
}

/// Everything one worker accumulates during a build.
#[derive(Debug, Default)]
pub(crate) struct WorkerContext {
    /// Chunks allocated by this worker, in increasing id order. The last one receives new nodes.
    chunks: Vec<ResultChunk>,
    pub stats: BinningBuildStats,
    pub error: Option<BuildError>,
    /// Subtrees spawned by this worker that may not have been claimed yet.
    spawned: Vec<Arc<SubtreeTask>>,
}

impl WorkerContext {
    fn alloc_node(&mut self, pool: &ChunkPool, chunk_capacity: usize) -> NodeRef {
        debug_assert!(chunk_capacity > 0);
        loop {
            if let Some(node) = self.chunks.last_mut().and_then(ResultChunk::alloc_node) {
                return node;
            }
            self.chunks.push(pool.alloc_chunk(chunk_capacity));
        }
    }

    fn write_node(&mut self, node: NodeRef, value: ChunkNode) -> Result<(), BuildError> {
        let position = self
            .chunks
            .binary_search_by_key(&node.chunk, |chunk| chunk.id)
            .map_err(|_| BuildError::InvariantViolation("node written by a worker that does not own its chunk"))?;
        self.chunks[position].write(node.local, value);
        Ok(())
    }

    fn make_leaf(&mut self, node: NodeRef, range: &BuildRange, reason: LeafReason) -> Result<(), BuildError> {
        self.write_node(
            node,
            ChunkNode {
                aabb: range.aabb,
                kind: ChunkNodeKind::Leaf {
                    begin: range.begin as u32,
                    end: range.end as u32,
                },
                depth: range.depth as u8,
            },
        )?;
        self.stats.record_leaf(reason, range.num_objects(), range.depth);
        Ok(())
    }
}

/// What is left of a build once every task has finished.
#[derive(Debug, Default)]
pub(crate) struct BuildOutcome {
    pub chunks: Vec<ResultChunk>,
    pub stats: BinningBuildStats,
    pub error: Option<BuildError>,
    pub tasks: Vec<Arc<SubtreeTask>>,
}

/// State shared by all tasks of one build.
pub(crate) struct BuildContext {
    settings: BinningBuilderSettings,
    max_obs_at_depth: Vec<usize>,
    objects: ObjectsView,
    chunk_pool: ChunkPool,
    workers: Vec<CachePadded<Mutex<WorkerContext>>>,
    tasks: Mutex<Vec<Arc<SubtreeTask>>>,
    should_cancel: Arc<dyn IShouldCancelCallback>,
    cancelled: AtomicBool,
    /// Set by the first range that cannot fit in a leaf within `max_depth`.
    failed: AtomicBool,
    /// Held by the one range currently binned on extra threads.
    parallel_binning: Mutex<()>,
}

impl BuildContext {
    pub fn new(
        settings: BinningBuilderSettings,
        max_obs_at_depth: Vec<usize>,
        objects: ObjectsView,
        thread_count: usize,
        should_cancel: Arc<dyn IShouldCancelCallback>,
    ) -> Self {
        debug_assert_eq!(max_obs_at_depth.len(), settings.max_depth + 1);
        let workers = (0..thread_count.max(1))
            .map(|_| CachePadded::new(Mutex::new(WorkerContext::default())))
            .collect();
        Self {
            settings,
            max_obs_at_depth,
            objects,
            chunk_pool: ChunkPool::new(),
            workers,
            tasks: Mutex::new(Vec::new()),
            should_cancel,
            cancelled: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            parallel_binning: Mutex::new(()),
        }
    }

    #[inline(always)]
    fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn fail(&self) -> BuildError {
        self.failed.store(true, Ordering::Release);
        self.build_failed_error()
    }

    fn build_failed_error(&self) -> BuildError {
        BuildError::BuildFailed {
            max_depth: self.settings.max_depth,
            max_num_objects_per_leaf: self.settings.max_num_objects_per_leaf,
        }
    }

    /// Decides how many threads bin a range of `num_objects`. Only one range at a time gets extra threads; the
    /// returned guard keeps that reservation and must live until binning is done.
    fn reserve_binning_threads(&self, num_objects: usize) -> (Option<MutexGuard<'_, ()>>, usize) {
        if num_objects < self.settings.axis_parallel_num_ob_threshold || self.thread_count() <= 1 {
            return (None, 1);
        }
        match self.parallel_binning.try_lock() {
            Ok(guard) => (Some(guard), self.thread_count()),
            Err(_) => (None, 1),
        }
    }

    /// Checks the shared flag, then the callback. A positive answer from the callback is latched into the flag.
    fn poll_cancel(&self) -> bool {
        if self.was_cancelled() {
            return true;
        }
        if self.should_cancel.should_cancel() {
            log::debug!("build cancellation requested");
            self.cancelled.store(true, Ordering::Release);
            return true;
        }
        false
    }

    fn lock_worker(&self, worker_index: usize) -> MutexGuard<'_, WorkerContext> {
        debug_assert!(worker_index < self.workers.len(), "worker index {worker_index} out of range");
        self.workers[worker_index % self.workers.len()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a task to the registry and returns its index.
    pub fn register_task(&self, task: Arc<SubtreeTask>) -> u32 {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tasks.push(task);
        (tasks.len() - 1) as u32
    }

    /// Hands a registered task to the dispatcher.
    pub fn submit_task(self: &Arc<Self>, task_index: u32, task: Arc<SubtreeTask>, dispatcher: &dyn IThreadDispatcher) {
        let build = Arc::clone(self);
        dispatcher.submit(Task::new(task_index as u64, move |_, worker_index, dispatcher| {
            build.run_task(&task, worker_index, dispatcher);
        }));
    }

    /// Runs `task` if nobody has claimed it yet, then any subtrees this worker spawned that are still unclaimed.
    pub fn run_task(self: &Arc<Self>, task: &Arc<SubtreeTask>, worker_index: usize, dispatcher: &dyn IThreadDispatcher) {
        if !task.try_claim() {
            return;
        }
        let mut ctx = self.lock_worker(worker_index);
        self.execute(&mut ctx, task, dispatcher);
        while let Some(spawned) = ctx.spawned.pop() {
            if spawned.try_claim() {
                self.execute(&mut ctx, &spawned, dispatcher);
            }
        }
    }

    fn execute(
        self: &Arc<Self>,
        ctx: &mut WorkerContext,
        task: &SubtreeTask,
        dispatcher: &dyn IThreadDispatcher,
    ) {
        if self.was_cancelled() || self.has_failed() {
            return;
        }
        let root = ctx.alloc_node(&self.chunk_pool, self.settings.result_chunk_capacity);
        if task.root.set(root).is_err() {
            ctx.error = Some(BuildError::InvariantViolation("subtree task ran twice"));
            return;
        }
        match self.do_build(ctx, dispatcher, root, task.range) {
            Ok(()) => {}
            Err(BuildError::Cancelled) => self.cancelled.store(true, Ordering::Release),
            // Already latched in `failed` by `fail`.
            Err(BuildError::BuildFailed { .. }) => {}
            Err(e) => {
                log::error!("subtree [{}, {}) failed: {e}", task.range.begin, task.range.end);
                if ctx.error.is_none() {
                    ctx.error = Some(e);
                }
            }
        }
    }

    /// Builds the subtree for `range` into the already allocated slot `node`.
    fn do_build(
        self: &Arc<Self>,
        ctx: &mut WorkerContext,
        dispatcher: &dyn IThreadDispatcher,
        node: NodeRef,
        range: BuildRange,
    ) -> Result<(), BuildError> {
        debug_assert!(range.num_objects() > 0);
        if self.has_failed() {
            return Err(self.build_failed_error());
        }
        if range.depth <= self.settings.cancel_check_max_depth && self.poll_cancel() {
            return Err(BuildError::Cancelled);
        }

        let Some(partition) = self.choose_partition(ctx, node, &range)? else {
            return Ok(());
        };

        let split = range.begin + partition.num_left;
        let left_range = BuildRange {
            aabb: partition.left_aabb,
            centroid_aabb: partition.left_centroid_aabb,
            begin: range.begin,
            end: split,
            depth: range.depth + 1,
        };
        let right_range = BuildRange {
            aabb: partition.right_aabb,
            centroid_aabb: partition.right_centroid_aabb,
            begin: split,
            end: range.end,
            depth: range.depth + 1,
        };

        let chunk_capacity = self.settings.result_chunk_capacity;
        let left = ctx.alloc_node(&self.chunk_pool, chunk_capacity);

        let task_threshold = self.settings.new_task_num_ob_threshold;
        let spawn_right = left_range.num_objects() >= task_threshold && right_range.num_objects() >= task_threshold;
        let (right, spawned) = if spawn_right {
            let task = Arc::new(SubtreeTask::new(right_range, Some(node)));
            let task_index = self.register_task(task.clone());
            (ChildRef::Spawned(task_index), Some((task_index, task)))
        } else {
            let right = ctx.alloc_node(&self.chunk_pool, chunk_capacity);
            (ChildRef::Node(right), None)
        };

        ctx.write_node(
            node,
            ChunkNode {
                aabb: range.aabb,
                kind: ChunkNodeKind::Interior { left, right },
                depth: range.depth as u8,
            },
        )?;
        ctx.stats.num_interior_nodes += 1;

        if let Some((task_index, task)) = spawned {
            log::trace!(
                "spawning subtree task {task_index} for objects [{}, {}) at depth {}",
                right_range.begin,
                right_range.end,
                right_range.depth
            );
            ctx.stats.num_spawned_tasks += 1;
            ctx.spawned.push(task.clone());
            self.submit_task(task_index, task, dispatcher);
        }

        self.do_build(ctx, dispatcher, left, left_range)?;
        if let ChildRef::Node(right) = right {
            self.do_build(ctx, dispatcher, right, right_range)?;
        }
        Ok(())
    }

    /// Either turns `node` into a leaf and returns `None`, or partitions the range and returns how.
    fn choose_partition(
        &self,
        ctx: &mut WorkerContext,
        node: NodeRef,
        range: &BuildRange,
    ) -> Result<Option<PartitionResult>, BuildError> {
        let settings = &self.settings;
        let num_objects = range.num_objects();

        if num_objects <= settings.leaf_num_object_threshold || range.depth >= settings.max_depth {
            if num_objects > settings.max_num_objects_per_leaf {
                log::debug!(
                    "{num_objects} objects at depth {} do not fit in a leaf of {}",
                    range.depth,
                    settings.max_num_objects_per_leaf
                );
                return Err(self.fail());
            }
            let reason = if num_objects <= settings.leaf_num_object_threshold {
                LeafReason::UnderThreshold
            } else {
                LeafReason::MaxDepth
            };
            ctx.make_leaf(node, range, reason)?;
            return Ok(None);
        }

        // Safety: this task has exclusive use of its range until its right half is handed to a spawned task, which
        // happens only after this borrow ends.
        let objects = unsafe { self.objects.range_mut(range.begin, range.end) };

        let balanced = num_objects.saturating_mul(2) >= self.max_obs_at_depth[range.depth];
        let (binning_guard, num_threads) = self.reserve_binning_threads(num_objects);
        let (mapping, choice) = binning::search_for_best_split(objects, &range.centroid_aabb, balanced, num_threads);
        drop(binning_guard);

        let max_obs_next = self.max_obs_at_depth[(range.depth + 1).min(settings.max_depth)];
        let choice = choice.filter(|c| c.num_left <= max_obs_next && c.num_right <= max_obs_next);

        let partition = match choice {
            None => {
                if num_objects <= settings.max_num_objects_per_leaf {
                    ctx.make_leaf(node, range, LeafReason::CouldNotSplit)?;
                    return Ok(None);
                }
                ctx.stats.num_arbitrary_splits += 1;
                partition::arbitrary_partition(objects)
            }
            Some(choice) => {
                let split_cost =
                    settings.intersection_cost * choice.cost_factor / range.aabb.half_surface_area() + TRAVERSAL_COST;
                if split_cost >= num_objects as f32 * settings.intersection_cost
                    && num_objects <= settings.max_num_objects_per_leaf
                {
                    ctx.make_leaf(node, range, LeafReason::CheaperNoSplit)?;
                    return Ok(None);
                }
                let partition = partition::bucket_partition(objects, &mapping, choice.axis, choice.bucket);
                debug_assert_eq!(partition.num_left, choice.num_left);
                partition
            }
        };
        debug_assert!(partition.num_left > 0 && partition.num_left < num_objects);
        Ok(Some(partition))
    }

    /// Collects per-worker results. Call only after the dispatcher has finished every task.
    pub fn take_outcome(&self) -> BuildOutcome {
        let mut outcome = BuildOutcome::default();
        for worker in &self.workers {
            let mut ctx = worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let ctx = std::mem::take(&mut *ctx);
            outcome.chunks.extend(ctx.chunks);
            outcome.stats.accum_stats(&ctx.stats);
            if outcome.error.is_none() {
                outcome.error = ctx.error;
            }
        }
        outcome.tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        debug_assert_eq!(outcome.chunks.len(), self.chunk_pool.num_chunks());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(begin: usize, end: usize) -> BuildRange {
        BuildRange {
            aabb: BoundingBox4::empty(),
            centroid_aabb: BoundingBox4::empty(),
            begin,
            end,
            depth: 1,
        }
    }

    #[test]
    fn only_one_claim_succeeds() {
        let task = Arc::new(SubtreeTask::new(range(0, 4), None));
        let claims = (0..8)
            .map(|_| {
                let task = task.clone();
                std::thread::spawn(move || task.try_claim())
            })
            .map(|handle| handle.join().unwrap())
            .filter(|&claimed| claimed)
            .count();
        assert_eq!(claims, 1);
        assert!(!task.try_claim());
    }

    #[test]
    fn worker_context_spills_into_new_chunks() {
        let pool = ChunkPool::new();
        let mut ctx = WorkerContext::default();
        let nodes = (0..5).map(|_| ctx.alloc_node(&pool, 2)).collect::<Vec<_>>();
        assert_eq!(pool.num_chunks(), 3);
        assert_eq!(nodes[0], NodeRef { chunk: 0, local: 0 });
        assert_eq!(nodes[2], NodeRef { chunk: 1, local: 0 });
        assert_eq!(nodes[4], NodeRef { chunk: 2, local: 0 });

        // Nodes in chunks that are no longer current can still be written.
        let r = range(0, 1);
        ctx.make_leaf(nodes[1], &r, LeafReason::UnderThreshold).unwrap();
        assert_eq!(ctx.stats.num_leaves, 1);
        assert_eq!(
            ctx.write_node(NodeRef { chunk: 9, local: 0 }, ChunkNode {
                aabb: BoundingBox4::empty(),
                kind: ChunkNodeKind::Leaf { begin: 0, end: 0 },
                depth: 0
            }),
            Err(BuildError::InvariantViolation("node written by a worker that does not own its chunk"))
        );
        assert_eq!(ctx.chunks[0].get(1).kind, ChunkNodeKind::Leaf { begin: 0, end: 1 });
    }

    #[test]
    fn only_one_range_bins_on_extra_threads_at_a_time() {
        let mut objects = Vec::<BinningOb>::new();
        let settings = BinningBuilderSettings {
            axis_parallel_num_ob_threshold: 100,
            ..Default::default()
        };
        let build = BuildContext::new(
            settings.clone(),
            settings.max_objects_at_depth(),
            ObjectsView::new(&mut objects),
            4,
            Arc::new(crate::utilities::should_cancel::NeverCancel),
        );

        assert_eq!(build.reserve_binning_threads(99).1, 1);
        let (guard, num_threads) = build.reserve_binning_threads(100);
        assert!(guard.is_some());
        assert_eq!(num_threads, 4);

        let (second, num_threads) = build.reserve_binning_threads(1000);
        assert!(second.is_none());
        assert_eq!(num_threads, 1);

        drop(guard);
        assert_eq!(build.reserve_binning_threads(1000).1, 4);
    }

    #[test]
    fn objects_view_hands_out_subranges() {
        let mut objects = (0..6)
            .map(|i| BinningOb {
                aabb: BoundingBox4::empty(),
                index: i,
            })
            .collect::<Vec<_>>();
        let view = ObjectsView::new(&mut objects);
        let (left, right) = unsafe { (view.range_mut(0, 2), view.range_mut(2, 6)) };
        assert_eq!(left.len(), 2);
        assert_eq!(right[0].index, 2);
        right.swap(0, 3);
        assert_eq!(objects[2].index, 5);
    }
}

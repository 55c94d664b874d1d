use super::build_error::BuildError;
use super::result_node::ResultNode;
use super::subtree_task::SubtreeTask;
use crate::utilities::bounding_box::BoundingBox4;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Handle to a node slot: which chunk, and where in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NodeRef {
    pub chunk: u32,
    pub local: u32,
}

/// Right child link of an interior node. A spawned subtree publishes its root once it starts running, so the link is
/// resolved through the task registry at merge time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChildRef {
    Node(NodeRef),
    Spawned(u32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ChunkNodeKind {
    /// Allocated but not written yet.
    Pending,
    Interior { left: NodeRef, right: ChildRef },
    Leaf { begin: u32, end: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ChunkNode {
    pub aabb: BoundingBox4,
    pub kind: ChunkNodeKind,
    pub depth: u8,
}

impl ChunkNode {
    const PENDING: Self = Self {
        aabb: BoundingBox4::new(glam::Vec4::ZERO, glam::Vec4::ZERO),
        kind: ChunkNodeKind::Pending,
        depth: 0,
    };
}

/// Fixed-capacity arena of nodes written by a single worker.
#[derive(Debug)]
pub(crate) struct ResultChunk {
    pub id: u32,
    /// Index of the first node of this chunk in the merged array. Assigned by `merge_chunks`.
    pub chunk_offset: usize,
    nodes: Vec<ChunkNode>,
    capacity: usize,
}

impl ResultChunk {
    pub fn new(id: u32, capacity: usize) -> Self {
        Self {
            id,
            chunk_offset: 0,
            nodes: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.nodes.len() >= self.capacity
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Reserves a slot, or returns `None` when the chunk is full.
    pub fn alloc_node(&mut self) -> Option<NodeRef> {
        if self.is_full() {
            return None;
        }
        let local = self.nodes.len() as u32;
        self.nodes.push(ChunkNode::PENDING);
        Some(NodeRef { chunk: self.id, local })
    }

    pub fn write(&mut self, local: u32, node: ChunkNode) {
        let slot = &mut self.nodes[local as usize];
        debug_assert!(
            slot.kind == ChunkNodeKind::Pending,
            "Node {local} of chunk {} written twice",
            self.id
        );
        *slot = node;
    }

    #[cfg(test)]
    pub fn get(&self, local: u32) -> &ChunkNode {
        &self.nodes[local as usize]
    }
}

/// Hands out chunk ids in allocation order.
#[derive(Debug, Default)]
pub(crate) struct ChunkPool {
    next_id: AtomicU32,
}

impl ChunkPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_chunk(&self, capacity: usize) -> ResultChunk {
        ResultChunk::new(self.next_id.fetch_add(1, Ordering::Relaxed), capacity)
    }

    pub fn num_chunks(&self) -> usize {
        self.next_id.load(Ordering::Relaxed) as usize
    }
}

/// Concatenates chunks in id order and rewrites every link to an index into the merged array.
///
/// `chunks` must hold every chunk handed out by the pool exactly once, in any order. Links to spawned subtrees are
/// resolved through `tasks`.
pub(crate) fn merge_chunks(
    mut chunks: Vec<ResultChunk>,
    tasks: &[Arc<SubtreeTask>],
) -> Result<Vec<ResultNode>, BuildError> {
    chunks.sort_unstable_by_key(|chunk| chunk.id);
    if chunks.iter().enumerate().any(|(i, chunk)| chunk.id as usize != i) {
        return Err(BuildError::InvariantViolation("result chunk ids are not contiguous"));
    }

    let mut total_num_nodes = 0;
    for chunk in chunks.iter_mut() {
        chunk.chunk_offset = total_num_nodes;
        total_num_nodes += chunk.len();
    }
    if total_num_nodes > u32::MAX as usize {
        return Err(BuildError::InvariantViolation("too many nodes for 32-bit links"));
    }

    let global = |node: NodeRef| chunks[node.chunk as usize].chunk_offset + node.local as usize;
    let mut merged = Vec::with_capacity(total_num_nodes);
    for chunk in &chunks {
        for (local, node) in chunk.nodes.iter().enumerate() {
            let result = match node.kind {
                ChunkNodeKind::Pending => {
                    return Err(BuildError::InvariantViolation("node allocated but never written"));
                }
                ChunkNodeKind::Leaf { begin, end } => ResultNode::new_leaf(node.aabb, begin, end, node.depth),
                ChunkNodeKind::Interior { left, right } => {
                    let right = match right {
                        ChildRef::Node(right) => right,
                        ChildRef::Spawned(task_index) => {
                            let task = tasks
                                .get(task_index as usize)
                                .ok_or(BuildError::InvariantViolation("unknown spawned subtree"))?;
                            debug_assert_eq!(
                                task.parent,
                                Some(NodeRef {
                                    chunk: chunk.id,
                                    local: local as u32
                                })
                            );
                            task.root()
                                .ok_or(BuildError::InvariantViolation("spawned subtree never ran"))?
                        }
                    };
                    ResultNode::new_interior(node.aabb, global(left) as u32, global(right) as u32, node.depth)
                }
            };
            debug_assert!(!result.interior || (result.left as usize) < total_num_nodes);
            debug_assert!(!result.interior || (result.right as usize) < total_num_nodes);
            merged.push(result);
        }
    }
    Ok(merged)
}

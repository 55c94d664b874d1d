use super::result_node::ResultNode;
use super::settings::{BinningBuilderSettings, TRAVERSAL_COST};
use crate::utilities::bounding_box::BoundingBox4;

/// Measures the SAH cost of a finished tree, normalised by the root's surface area. Lower is better.
pub fn sah_cost(nodes: &[ResultNode], intersection_cost: f32) -> f32 {
    let Some(root) = nodes.first() else {
        return 0.0;
    };
    let root_metric = root.aabb.half_surface_area();
    if root_metric <= 0.0 {
        return 0.0;
    }

    let mut total_cost = 0.0f32;
    for node in nodes {
        let relative_metric = node.aabb.half_surface_area() / root_metric;
        total_cost += if node.interior {
            TRAVERSAL_COST * relative_metric
        } else {
            intersection_cost * node.num_objects() as f32 * relative_metric
        };
    }
    total_cost
}

/// Checks everything a consumer of a build relies on and panics with a message naming the first violation:
/// every node is reachable from the root exactly once, depths increase by one per level and stay within
/// `max_depth`, children lie inside their parent's bounds, leaves tile `[0, N)` and respect the leaf size limit,
/// `result_indices` is a permutation of `0..N`, and each object lies inside the leaf that holds it.
///
/// `object_aabbs` is indexed by object index.
pub fn validate_build_results(
    nodes: &[ResultNode],
    result_indices: &[u32],
    object_aabbs: &[BoundingBox4],
    settings: &BinningBuilderSettings,
) {
    let num_objects = object_aabbs.len();
    assert_eq!(result_indices.len(), num_objects, "Result indices do not cover every object.");
    assert!(!nodes.is_empty(), "A build always produces a root node.");

    let mut seen = vec![false; num_objects];
    for &index in result_indices {
        let index = index as usize;
        assert!(index < num_objects, "Result index {index} is out of range.");
        assert!(!seen[index], "Object {index} appears more than once in the result indices.");
        seen[index] = true;
    }

    if num_objects == 0 {
        assert_eq!(nodes.len(), 1, "An empty build produces exactly one node.");
        assert!(nodes[0].is_leaf() && nodes[0].object_range().is_empty(), "An empty build produces an empty leaf.");
        return;
    }

    assert_eq!(nodes[0].depth, 0, "Root must have depth 0.");
    let mut visited = vec![false; nodes.len()];
    let mut covered = vec![false; num_objects];
    let mut stack = vec![0usize];
    while let Some(node_index) = stack.pop() {
        assert!(node_index < nodes.len(), "Link to node {node_index} is out of range.");
        assert!(!visited[node_index], "Node {node_index} is reachable more than once.");
        visited[node_index] = true;

        let node = &nodes[node_index];
        assert!(
            node.depth as usize <= settings.max_depth,
            "Node {node_index} at depth {} exceeds max depth {}.",
            node.depth,
            settings.max_depth
        );

        if node.interior {
            for child_index in [node.left as usize, node.right as usize] {
                assert!(child_index < nodes.len(), "Node {node_index} links to missing child {child_index}.");
                let child = &nodes[child_index];
                assert_eq!(
                    child.depth,
                    node.depth + 1,
                    "Child {child_index} of node {node_index} has a bad depth."
                );
                assert!(
                    node.aabb.contains_box(&child.aabb),
                    "Child {child_index} bounds {} escape node {node_index} bounds {}.",
                    child.aabb,
                    node.aabb
                );
                stack.push(child_index);
            }
        } else {
            let range = node.object_range();
            assert!(!range.is_empty(), "Leaf {node_index} holds no objects.");
            assert!(range.end <= num_objects, "Leaf {node_index} range {range:?} is out of bounds.");
            assert!(
                range.len() <= settings.max_num_objects_per_leaf,
                "Leaf {node_index} holds {} objects, more than {}.",
                range.len(),
                settings.max_num_objects_per_leaf
            );
            for position in range {
                assert!(!covered[position], "Object position {position} is in more than one leaf.");
                covered[position] = true;
                let object_index = result_indices[position] as usize;
                assert!(
                    node.aabb.contains_box(&object_aabbs[object_index]),
                    "Object {object_index} escapes leaf {node_index}."
                );
            }
        }
    }

    if let Some(node_index) = visited.iter().position(|&v| !v) {
        panic!("Node {node_index} is not reachable from the root.");
    }
    if let Some(position) = covered.iter().position(|&c| !c) {
        panic!("Object position {position} is not in any leaf.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BinningBuilderSettings {
        BinningBuilderSettings {
            max_num_objects_per_leaf: 2,
            leaf_num_object_threshold: 1,
            ..Default::default()
        }
    }

    fn small_tree() -> (Vec<ResultNode>, Vec<u32>, Vec<BoundingBox4>) {
        let a = BoundingBox4::from_xyz([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
        let b = BoundingBox4::from_xyz([2.0, 0.0, 0.0], [3.0, 1.0, 1.0]);
        let root = BoundingBox4::create_merged(&a, &b);
        let nodes = vec![
            ResultNode::new_interior(root, 1, 2, 0),
            ResultNode::new_leaf(b, 0, 1, 1),
            ResultNode::new_leaf(a, 1, 2, 1),
        ];
        (nodes, vec![1, 0], vec![a, b])
    }

    #[test]
    fn accepts_valid_tree() {
        let (nodes, indices, aabbs) = small_tree();
        validate_build_results(&nodes, &indices, &aabbs, &settings());
    }

    #[test]
    fn accepts_empty_build() {
        let nodes = [ResultNode::new_leaf(BoundingBox4::empty(), 0, 0, 0)];
        validate_build_results(&nodes, &[], &[], &settings());
    }

    #[test]
    #[should_panic(expected = "appears more than once")]
    fn rejects_duplicate_indices() {
        let (nodes, _, aabbs) = small_tree();
        validate_build_results(&nodes, &[0, 0], &aabbs, &settings());
    }

    #[test]
    #[should_panic(expected = "escapes leaf")]
    fn rejects_object_outside_leaf() {
        let (nodes, _, aabbs) = small_tree();
        validate_build_results(&nodes, &[0, 1], &aabbs, &settings());
    }

    #[test]
    #[should_panic(expected = "is not in any leaf")]
    fn rejects_uncovered_objects() {
        let (nodes, indices, aabbs) = small_tree();
        let root_only = [ResultNode::new_leaf(nodes[0].aabb, 0, 1, 0)];
        validate_build_results(&root_only, &indices, &aabbs, &settings());
    }

    #[test]
    fn sah_cost_weights_by_relative_area() {
        let (nodes, _, _) = small_tree();
        // Root: 3x1x1 box, half area 7. Leaves: unit boxes, half area 3, one object each.
        let expected = 1.0 + 2.0 * (3.0 / 7.0);
        assert!((sah_cost(&nodes, 1.0) - expected).abs() < 1e-6);
        assert!((sah_cost(&nodes, 2.0) - (1.0 + 4.0 * (3.0 / 7.0))).abs() < 1e-6);
        assert_eq!(sah_cost(&[], 1.0), 0.0);
    }
}

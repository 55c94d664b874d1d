use crate::utilities::bounding_box::BoundingBox4;
use std::fmt;
use std::ops::Range;

/// Node of a finished binary tree. The root is at index 0 of the result array.
///
/// Interior nodes store the indices of their two children in `left` and `right`. Leaves store the half-open range
/// `[left, right)` of positions in the builder's result object indices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResultNode {
    pub aabb: BoundingBox4,
    /// Left child index, or first object position for a leaf.
    pub left: u32,
    /// Right child index, or one past the last object position for a leaf.
    pub right: u32,
    pub interior: bool,
    pub depth: u8,
}

impl ResultNode {
    #[inline(always)]
    pub fn new_interior(aabb: BoundingBox4, left: u32, right: u32, depth: u8) -> Self {
        Self {
            aabb,
            left,
            right,
            interior: true,
            depth,
        }
    }

    #[inline(always)]
    pub fn new_leaf(aabb: BoundingBox4, begin: u32, end: u32, depth: u8) -> Self {
        Self {
            aabb,
            left: begin,
            right: end,
            interior: false,
            depth,
        }
    }

    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        !self.interior
    }

    /// Positions in the result object indices covered by this leaf. Empty for interior nodes.
    #[inline(always)]
    pub fn object_range(&self) -> Range<usize> {
        if self.interior {
            0..0
        } else {
            self.left as usize..self.right as usize
        }
    }

    #[inline(always)]
    pub fn num_objects(&self) -> usize {
        self.object_range().len()
    }
}

impl fmt::Display for ResultNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.interior {
            write!(
                f,
                "interior depth {} aabb {} children ({}, {})",
                self.depth, self.aabb, self.left, self.right
            )
        } else {
            write!(
                f,
                "leaf depth {} aabb {} objects [{}, {})",
                self.depth, self.aabb, self.left, self.right
            )
        }
    }
}

/// Writes one line per node, indented by depth.
pub fn format_result_nodes(nodes: &[ResultNode]) -> String {
    let mut s = String::new();
    for (i, node) in nodes.iter().enumerate() {
        let indent = "  ".repeat(node.depth as usize);
        s.push_str(&format!("{indent}{i}: {node}\n"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_ranges() {
        let b = BoundingBox4::from_xyz([0.0; 3], [1.0; 3]);
        let leaf = ResultNode::new_leaf(b, 3, 7, 2);
        assert!(leaf.is_leaf());
        assert_eq!(leaf.object_range(), 3..7);
        assert_eq!(leaf.num_objects(), 4);

        let interior = ResultNode::new_interior(b, 1, 2, 0);
        assert!(!interior.is_leaf());
        assert_eq!(interior.num_objects(), 0);
    }

    #[test]
    fn formatting_lists_every_node() {
        let b = BoundingBox4::from_xyz([0.0; 3], [1.0; 3]);
        let nodes = [
            ResultNode::new_interior(b, 1, 2, 0),
            ResultNode::new_leaf(b, 0, 1, 1),
            ResultNode::new_leaf(b, 1, 2, 1),
        ];
        let text = format_result_nodes(&nodes);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().is_some_and(|l| l.starts_with("0: interior")));
        assert!(text.contains("  2: leaf depth 1"));
    }
}

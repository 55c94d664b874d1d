use super::binning::{compute_bounds, BinningOb, BucketMapping};
use crate::utilities::bounding_box::BoundingBox4;

/// Outcome of partitioning a range in place: the first `num_left` objects form the left side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PartitionResult {
    pub num_left: usize,
    pub left_aabb: BoundingBox4,
    pub left_centroid_aabb: BoundingBox4,
    pub right_aabb: BoundingBox4,
    pub right_centroid_aabb: BoundingBox4,
}

/// Moves every object whose bucket on `axis` is at most `split_bucket` to the front of `objects`, the rest to the
/// back, and accumulates the bounds of both sides along the way.
pub(crate) fn bucket_partition(
    objects: &mut [BinningOb],
    mapping: &BucketMapping,
    axis: usize,
    split_bucket: usize,
) -> PartitionResult {
    let mut left_aabb = BoundingBox4::empty();
    let mut left_centroid_aabb = BoundingBox4::empty();
    let mut right_aabb = BoundingBox4::empty();
    let mut right_centroid_aabb = BoundingBox4::empty();

    // [0, cur) is classified left, [end, len) is classified right.
    let mut cur = 0;
    let mut end = objects.len();
    while cur < end {
        let ob = objects[cur];
        let centroid = ob.centroid();
        if mapping.bucket_indices(centroid)[axis] as usize <= split_bucket {
            left_aabb.enlarge_to_hold_box(&ob.aabb);
            left_centroid_aabb.enlarge_to_hold_point(centroid);
            cur += 1;
        } else {
            right_aabb.enlarge_to_hold_box(&ob.aabb);
            right_centroid_aabb.enlarge_to_hold_point(centroid);
            end -= 1;
            objects.swap(cur, end);
        }
    }

    PartitionResult {
        num_left: cur,
        left_aabb,
        left_centroid_aabb,
        right_aabb,
        right_centroid_aabb,
    }
}

/// Splits `objects` in the middle without reordering. Used when no bucket split is usable.
pub(crate) fn arbitrary_partition(objects: &[BinningOb]) -> PartitionResult {
    let num_left = objects.len() / 2;
    let (left, right) = objects.split_at(num_left);
    let (left_aabb, left_centroid_aabb) = compute_bounds(left);
    let (right_aabb, right_centroid_aabb) = compute_bounds(right);
    PartitionResult {
        num_left,
        left_aabb,
        left_centroid_aabb,
        right_aabb,
        right_centroid_aabb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trees::binning::num_buckets_for;

    fn boxes_at(xs: &[f32]) -> Vec<BinningOb> {
        xs.iter()
            .enumerate()
            .map(|(i, &x)| BinningOb {
                aabb: BoundingBox4::from_xyz([x - 0.25, 0.0, 0.0], [x + 0.25, 1.0, 1.0]),
                index: i as u32,
            })
            .collect()
    }

    #[test]
    fn bucket_partition_separates_by_bucket() {
        let mut objects = boxes_at(&[7.0, 0.0, 6.0, 1.0, 5.0, 2.0, 4.0, 3.0]);
        let (_, centroid_aabb) = compute_bounds(&objects);
        let mapping = BucketMapping::new(&centroid_aabb, num_buckets_for(objects.len()));
        let result = bucket_partition(&mut objects, &mapping, 0, 1);

        assert_eq!(result.num_left, 4);
        let mut left = objects[..4].iter().map(|ob| ob.index).collect::<Vec<_>>();
        let mut right = objects[4..].iter().map(|ob| ob.index).collect::<Vec<_>>();
        left.sort_unstable();
        right.sort_unstable();
        assert_eq!(left, vec![1, 3, 5, 7]);
        assert_eq!(right, vec![0, 2, 4, 6]);

        for ob in &objects[..4] {
            assert!(result.left_aabb.contains_box(&ob.aabb));
            assert!(result.left_centroid_aabb.contains_point(ob.centroid()));
        }
        for ob in &objects[4..] {
            assert!(result.right_aabb.contains_box(&ob.aabb));
            assert!(result.right_centroid_aabb.contains_point(ob.centroid()));
        }
        assert_eq!(result.left_centroid_aabb.max.x, 3.0);
        assert_eq!(result.right_centroid_aabb.min.x, 4.0);
    }

    #[test]
    fn bucket_partition_everything_on_one_side() {
        let mut objects = boxes_at(&[0.0, 1.0, 2.0]);
        let (_, centroid_aabb) = compute_bounds(&objects);
        let mapping = BucketMapping::new(&centroid_aabb, 4);
        let result = bucket_partition(&mut objects, &mapping, 0, 3);
        assert_eq!(result.num_left, 3);
        assert!(result.right_aabb.is_empty());
    }

    #[test]
    fn arbitrary_partition_splits_in_the_middle() {
        let objects = boxes_at(&[3.0, 3.0, 3.0, 3.0, 3.0]);
        let result = arbitrary_partition(&objects);
        assert_eq!(result.num_left, 2);
        assert_eq!(result.left_aabb, objects[0].aabb);
        assert_eq!(result.right_aabb, objects[0].aabb);
    }
}

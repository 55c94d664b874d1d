use crate::utilities::bounding_box::BoundingBox4;
use glam::{IVec4, Vec4};
use std::panic;

/// Upper bound on buckets per axis.
pub const MAX_NUM_BUCKETS: usize = 32;

/// Object to be placed in the tree: its bounds and its caller-assigned index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinningOb {
    pub aabb: BoundingBox4,
    pub index: u32,
}

impl BinningOb {
    #[inline(always)]
    pub fn centroid(&self) -> Vec4 {
        self.aabb.centroid()
    }
}

/// Bucket count used for a range of `num_objects` objects.
#[inline(always)]
pub fn num_buckets_for(num_objects: usize) -> usize {
    ((4.0 + 0.05 * num_objects as f32) as usize).clamp(1, MAX_NUM_BUCKETS)
}

/// Bounds and centroid bounds of a set of objects.
pub fn compute_bounds(objects: &[BinningOb]) -> (BoundingBox4, BoundingBox4) {
    let mut aabb = BoundingBox4::empty();
    let mut centroid_aabb = BoundingBox4::empty();
    for ob in objects {
        aabb.enlarge_to_hold_box(&ob.aabb);
        centroid_aabb.enlarge_to_hold_point(ob.centroid());
    }
    (aabb, centroid_aabb)
}

// ── Bucket mapping ─────────────────────────────────────────────────────────

/// Maps centroids onto the buckets of each axis.
///
/// Axes with no centroid extent map everything to bucket 0. Split search and partitioning both go through
/// `bucket_indices` so they agree on every object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BucketMapping {
    centroid_min: Vec4,
    scale: Vec4,
    max_bucket: IVec4,
    num_buckets: usize,
}

impl BucketMapping {
    pub fn new(centroid_aabb: &BoundingBox4, num_buckets: usize) -> Self {
        debug_assert!((1..=MAX_NUM_BUCKETS).contains(&num_buckets));
        let span = centroid_aabb.span();
        let buckets = num_buckets as f32;
        let mut scale = Vec4::ZERO;
        for axis in 0..3 {
            if span[axis] > 0.0 {
                scale[axis] = buckets / span[axis];
            }
        }
        Self {
            centroid_min: centroid_aabb.min,
            scale,
            max_bucket: IVec4::splat(num_buckets as i32 - 1),
            num_buckets,
        }
    }

    #[inline(always)]
    pub fn num_buckets(&self) -> usize {
        self.num_buckets
    }

    /// Bucket of `centroid` on each of the X, Y and Z lanes.
    #[inline(always)]
    pub fn bucket_indices(&self, centroid: Vec4) -> IVec4 {
        ((centroid - self.centroid_min) * self.scale)
            .as_ivec4()
            .clamp(IVec4::ZERO, self.max_bucket)
    }
}

// ── Histogram ──────────────────────────────────────────────────────────────

/// Per-axis, per-bucket object bounds and counts.
#[derive(Clone, Debug)]
pub(crate) struct BinHistogram {
    num_buckets: usize,
    bucket_aabbs: [[BoundingBox4; MAX_NUM_BUCKETS]; 3],
    counts: [[usize; MAX_NUM_BUCKETS]; 3],
}

impl BinHistogram {
    pub fn new(num_buckets: usize) -> Self {
        Self {
            num_buckets,
            bucket_aabbs: [[BoundingBox4::empty(); MAX_NUM_BUCKETS]; 3],
            counts: [[0; MAX_NUM_BUCKETS]; 3],
        }
    }

    pub fn add_objects(&mut self, mapping: &BucketMapping, objects: &[BinningOb]) {
        debug_assert_eq!(mapping.num_buckets(), self.num_buckets);
        for ob in objects {
            let buckets = mapping.bucket_indices(ob.centroid());
            for axis in 0..3 {
                let bucket = buckets[axis] as usize;
                self.bucket_aabbs[axis][bucket].enlarge_to_hold_box(&ob.aabb);
                self.counts[axis][bucket] += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.num_buckets, other.num_buckets);
        for axis in 0..3 {
            for bucket in 0..self.num_buckets {
                self.bucket_aabbs[axis][bucket].enlarge_to_hold_box(&other.bucket_aabbs[axis][bucket]);
                self.counts[axis][bucket] += other.counts[axis][bucket];
            }
        }
    }

    #[cfg(test)]
    pub fn count(&self, axis: usize, bucket: usize) -> usize {
        self.counts[axis][bucket]
    }
}

/// Bins `objects`, splitting the work over `num_threads` threads when more than one is requested.
///
/// The calling thread bins the first slice and `num_threads - 1` scoped threads bin the rest. Those threads are
/// started per call on top of the dispatcher's workers, so callers reserve extra threads for one range at a time.
/// Bucket bounds and counts are merged with min/max and addition, so the result does not depend on the thread count.
pub(crate) fn bin_objects(objects: &[BinningOb], mapping: &BucketMapping, num_threads: usize) -> BinHistogram {
    let num_buckets = mapping.num_buckets();
    let mut histogram = BinHistogram::new(num_buckets);
    if num_threads <= 1 || objects.len() < 2 * num_threads {
        histogram.add_objects(mapping, objects);
        return histogram;
    }

    let chunk_len = objects.len().div_ceil(num_threads);
    let (first, rest) = objects.split_at(chunk_len);
    let scoped = crossbeam_utils::thread::scope(|scope| {
        let handles = rest
            .chunks(chunk_len)
            .map(|chunk| {
                scope.spawn(move |_| {
                    let mut partial = BinHistogram::new(num_buckets);
                    partial.add_objects(mapping, chunk);
                    partial
                })
            })
            .collect::<Vec<_>>();

        histogram.add_objects(mapping, first);
        for handle in handles {
            match handle.join() {
                Ok(partial) => histogram.merge(&partial),
                Err(payload) => panic::resume_unwind(payload),
            }
        }
    });
    if let Err(payload) = scoped {
        panic::resume_unwind(payload);
    }
    histogram
}

// ── Split search ───────────────────────────────────────────────────────────

/// Best split found by `find_best_split`. Objects whose bucket on `axis` is at most `bucket` go left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SplitChoice {
    pub axis: usize,
    pub bucket: usize,
    pub num_left: usize,
    pub num_right: usize,
    /// `num_left * half_area(left) + num_right * half_area(right)`. Zero in balanced mode.
    pub cost_factor: f32,
}

/// Sweeps every bucket boundary on every axis.
///
/// In SAH mode the candidate with the lowest cost factor wins; in balanced mode the one with the largest smaller
/// side does. Candidates leaving a side empty are skipped. Buckets are scanned low to high and axes X, Y, Z within a
/// bucket; only a strict improvement replaces the current best, so the earliest candidate wins ties.
pub(crate) fn find_best_split(histogram: &BinHistogram, balanced: bool) -> Option<SplitChoice> {
    let num_buckets = histogram.num_buckets;

    // Right side of boundary `b` holds buckets (b, num_buckets).
    let mut right_half_areas = [[0.0f32; MAX_NUM_BUCKETS]; 3];
    let mut right_counts = [[0usize; MAX_NUM_BUCKETS]; 3];
    for axis in 0..3 {
        let mut aabb = BoundingBox4::empty();
        let mut count = 0;
        for bucket in (0..num_buckets).rev() {
            right_half_areas[axis][bucket] = aabb.half_surface_area();
            right_counts[axis][bucket] = count;
            aabb.enlarge_to_hold_box(&histogram.bucket_aabbs[axis][bucket]);
            count += histogram.counts[axis][bucket];
        }
    }

    let mut left_aabbs = [BoundingBox4::empty(); 3];
    let mut left_counts = [0usize; 3];
    let mut best: Option<SplitChoice> = None;
    let mut smallest_cost = f32::INFINITY;
    let mut largest_smaller_side = 0;
    for bucket in 0..num_buckets {
        for axis in 0..3 {
            left_aabbs[axis].enlarge_to_hold_box(&histogram.bucket_aabbs[axis][bucket]);
            left_counts[axis] += histogram.counts[axis][bucket];

            let num_left = left_counts[axis];
            let num_right = right_counts[axis][bucket];
            if num_left == 0 || num_right == 0 {
                continue;
            }

            if balanced {
                let smaller_side = num_left.min(num_right);
                if smaller_side > largest_smaller_side {
                    largest_smaller_side = smaller_side;
                    best = Some(SplitChoice {
                        axis,
                        bucket,
                        num_left,
                        num_right,
                        cost_factor: 0.0,
                    });
                }
            } else {
                let cost = num_left as f32 * left_aabbs[axis].half_surface_area()
                    + num_right as f32 * right_half_areas[axis][bucket];
                if cost < smallest_cost {
                    smallest_cost = cost;
                    best = Some(SplitChoice {
                        axis,
                        bucket,
                        num_left,
                        num_right,
                        cost_factor: cost,
                    });
                }
            }
        }
    }
    best
}

/// Chooses buckets for `objects`, bins them and searches for the best split.
pub(crate) fn search_for_best_split(
    objects: &[BinningOb],
    centroid_aabb: &BoundingBox4,
    balanced: bool,
    num_threads: usize,
) -> (BucketMapping, Option<SplitChoice>) {
    let mapping = BucketMapping::new(centroid_aabb, num_buckets_for(objects.len()));
    let histogram = bin_objects(objects, &mapping, num_threads);
    (mapping, find_best_split(&histogram, balanced))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit_box_at_x(index: u32, x: f32) -> BinningOb {
        BinningOb {
            aabb: BoundingBox4::from_xyz([x - 0.5, -0.5, -0.5], [x + 0.5, 0.5, 0.5]),
            index,
        }
    }

    fn random_objects(count: usize, seed: u64) -> Vec<BinningOb> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|i| {
                let min = [rng.random::<f32>(), rng.random::<f32>(), rng.random::<f32>()];
                let max = [
                    min[0] + rng.random::<f32>() * 0.05,
                    min[1] + rng.random::<f32>() * 0.05,
                    min[2] + rng.random::<f32>() * 0.05,
                ];
                BinningOb {
                    aabb: BoundingBox4::from_xyz(min, max),
                    index: i as u32,
                }
            })
            .collect()
    }

    #[test]
    fn bucket_count_grows_with_object_count() {
        assert_eq!(num_buckets_for(0), 4);
        assert_eq!(num_buckets_for(5), 4);
        assert_eq!(num_buckets_for(20), 5);
        assert_eq!(num_buckets_for(100), 9);
        assert_eq!(num_buckets_for(560), 32);
        assert_eq!(num_buckets_for(1 << 20), MAX_NUM_BUCKETS);
    }

    #[test]
    fn bucket_indices_clamp_to_range() {
        let centroid_aabb = BoundingBox4::from_xyz([0.0, 0.0, 5.0], [4.0, 2.0, 5.0]);
        let mapping = BucketMapping::new(&centroid_aabb, 4);
        assert_eq!(mapping.bucket_indices(Vec4::new(0.0, 0.0, 5.0, 0.0)).truncate().to_array(), [0, 0, 0]);
        assert_eq!(mapping.bucket_indices(Vec4::new(4.0, 2.0, 5.0, 0.0)).truncate().to_array(), [3, 3, 0]);
        assert_eq!(mapping.bucket_indices(Vec4::new(2.5, 0.9, 5.0, 0.0)).truncate().to_array(), [2, 1, 0]);
        // Out-of-range centroids clamp rather than index past the buckets.
        assert_eq!(mapping.bucket_indices(Vec4::new(-3.0, 9.0, 7.0, 0.0)).truncate().to_array(), [0, 3, 0]);
    }

    #[test]
    fn histogram_counts_every_object_on_every_axis() {
        let objects = random_objects(200, 1);
        let (_, centroid_aabb) = compute_bounds(&objects);
        let mapping = BucketMapping::new(&centroid_aabb, num_buckets_for(objects.len()));
        let histogram = bin_objects(&objects, &mapping, 1);
        for axis in 0..3 {
            let total: usize = (0..mapping.num_buckets()).map(|b| histogram.count(axis, b)).sum();
            assert_eq!(total, objects.len());
        }
    }

    #[test]
    fn parallel_binning_matches_serial() {
        let objects = random_objects(1000, 2);
        let (_, centroid_aabb) = compute_bounds(&objects);
        for balanced in [false, true] {
            let serial = search_for_best_split(&objects, &centroid_aabb, balanced, 1);
            for threads in [2, 3, 8] {
                let parallel = search_for_best_split(&objects, &centroid_aabb, balanced, threads);
                assert_eq!(serial, parallel, "threads = {threads}, balanced = {balanced}");
            }
        }
    }

    #[test]
    fn picks_lowest_cost_boundary() {
        // Two tight clusters far apart along y.
        let mut objects = Vec::new();
        for i in 0..4 {
            let y = if i < 2 { 0.0 } else { 10.0 };
            objects.push(BinningOb {
                aabb: BoundingBox4::from_xyz([i as f32 * 0.1, y, 0.0], [i as f32 * 0.1 + 1.0, y + 1.0, 1.0]),
                index: i,
            });
        }
        let (_, centroid_aabb) = compute_bounds(&objects);
        let (_, choice) = search_for_best_split(&objects, &centroid_aabb, false, 1);
        let choice = choice.expect("split should exist");
        assert_eq!(choice.axis, 1);
        assert_eq!((choice.num_left, choice.num_right), (2, 2));
        assert!(choice.cost_factor > 0.0);
    }

    #[test]
    fn unit_boxes_split_before_largest_gap() {
        let objects = [0.2, 1.0, 1.6, 3.0, 3.6]
            .iter()
            .enumerate()
            .map(|(i, &x)| unit_box_at_x(i as u32, x))
            .collect::<Vec<_>>();
        let (_, centroid_aabb) = compute_bounds(&objects);
        let (_, choice) = search_for_best_split(&objects, &centroid_aabb, false, 1);
        let choice = choice.expect("split should exist");
        assert_eq!(choice.axis, 0);
        assert_eq!(choice.bucket, 1);
        assert_eq!((choice.num_left, choice.num_right), (3, 2));
    }

    #[test]
    fn identical_centroids_have_no_split() {
        let objects = (0..10).map(|i| unit_box_at_x(i, 1.0)).collect::<Vec<_>>();
        let (_, centroid_aabb) = compute_bounds(&objects);
        for balanced in [false, true] {
            let (_, choice) = search_for_best_split(&objects, &centroid_aabb, balanced, 1);
            assert_eq!(choice, None);
        }
    }

    #[test]
    fn balanced_mode_maximises_smaller_side() {
        // Heavily skewed: SAH prefers peeling off the far object, balanced mode prefers an even split.
        let mut objects = (0..7).map(|i| unit_box_at_x(i, i as f32 * 0.01)).collect::<Vec<_>>();
        objects.push(unit_box_at_x(7, 100.0));
        let (_, centroid_aabb) = compute_bounds(&objects);

        let (_, sah) = search_for_best_split(&objects, &centroid_aabb, false, 1);
        let sah = sah.expect("split should exist");
        assert_eq!((sah.num_left, sah.num_right), (7, 1));

        let (_, balanced) = search_for_best_split(&objects, &centroid_aabb, true, 1);
        let balanced = balanced.expect("split should exist");
        assert_eq!(balanced.cost_factor, 0.0);
        // All seven near-origin centroids share bucket 0 on x, so 7/1 is still the only x split.
        assert_eq!(balanced.num_left.min(balanced.num_right), 1);
    }

    #[test]
    fn balanced_mode_prefers_even_split_when_available() {
        let objects = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 100.0]
            .iter()
            .enumerate()
            .map(|(i, &x)| unit_box_at_x(i as u32, x))
            .collect::<Vec<_>>();
        let (_, centroid_aabb) = compute_bounds(&objects);
        let (mapping, balanced) = search_for_best_split(&objects, &centroid_aabb, true, 1);
        assert_eq!(mapping.num_buckets(), 4);
        // Buckets on x: {0..6} in 0, {100} in 3. Only a 7/1 split exists.
        let balanced = balanced.expect("split should exist");
        assert_eq!((balanced.num_left, balanced.num_right), (7, 1));

        let even = (0..8).map(|i| unit_box_at_x(i, i as f32)).collect::<Vec<_>>();
        let (_, centroid_aabb) = compute_bounds(&even);
        let (_, choice) = search_for_best_split(&even, &centroid_aabb, true, 1);
        let choice = choice.expect("split should exist");
        assert_eq!((choice.num_left, choice.num_right), (4, 4));
    }
}

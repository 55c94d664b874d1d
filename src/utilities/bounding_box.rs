use glam::Vec4;
use std::fmt;

/// Represents a bounding box as two `Vec4` values to avoid complexity associated with a `Vec3`'s empty SIMD lane.
///
/// Only the X, Y and Z lanes take part in any query. The empty box has `min = +inf` and `max = -inf`, so enlarging it
/// by anything yields exactly that thing.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox4 {
    /// Location with the lowest X, Y, and Z coordinates in the axis-aligned bounding box. W lane is undefined.
    pub min: Vec4,
    /// Location with the highest X, Y, and Z coordinates in the axis-aligned bounding box. W lane is undefined.
    pub max: Vec4,
}

const XYZ_MASK: u32 = 0b0111;

impl Default for BoundingBox4 {
    #[inline(always)]
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox4 {
    /// Constructs a bounding box from the specified minimum and maximum.
    #[inline(always)]
    pub const fn new(min: Vec4, max: Vec4) -> Self {
        Self { min, max }
    }

    /// Box which contains nothing. Identity element for `enlarge_to_hold_box`.
    #[inline(always)]
    pub fn empty() -> Self {
        Self {
            min: Vec4::splat(f32::INFINITY),
            max: Vec4::splat(f32::NEG_INFINITY),
        }
    }

    /// Constructs a bounding box from XYZ corners. The W lane is set to zero.
    #[inline(always)]
    pub fn from_xyz(min: [f32; 3], max: [f32; 3]) -> Self {
        Self {
            min: Vec4::new(min[0], min[1], min[2], 0.0),
            max: Vec4::new(max[0], max[1], max[2], 0.0),
        }
    }

    /// True if min exceeds max on any of the X, Y or Z axes.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).bitmask() & XYZ_MASK != 0
    }

    /// Tests whether a point lies inside the box, boundaries included.
    #[inline(always)]
    pub fn contains_point(&self, point: Vec4) -> bool {
        let inside = self.min.cmple(point) & point.cmple(self.max);
        inside.bitmask() & XYZ_MASK == XYZ_MASK
    }

    /// Tests whether `other` lies entirely inside this box. An empty box is contained by everything.
    #[inline(always)]
    pub fn contains_box(&self, other: &Self) -> bool {
        if other.is_empty() {
            return true;
        }
        let inside = self.min.cmple(other.min) & other.max.cmple(self.max);
        inside.bitmask() & XYZ_MASK == XYZ_MASK
    }

    #[inline(always)]
    pub fn enlarge_to_hold_point(&mut self, point: Vec4) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    #[inline(always)]
    pub fn enlarge_to_hold_box(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Computes a bounding box which contains two other bounding boxes.
    #[inline(always)]
    pub fn create_merged(a: &Self, b: &Self) -> Self {
        Self {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// Midpoint of the box. Undefined for the empty box.
    #[inline(always)]
    pub fn centroid(&self) -> Vec4 {
        (self.min + self.max) * 0.5
    }

    #[inline(always)]
    pub fn span(&self) -> Vec4 {
        self.max - self.min
    }

    /// Half of the surface area: `xy + yz + zx` of the extents. Zero for the empty box.
    #[inline(always)]
    pub fn half_surface_area(&self) -> f32 {
        // Inverted extents of the empty box clamp to zero.
        let d = self.span().max(Vec4::ZERO);
        d.x * d.y + d.y * d.z + d.z * d.x
    }

    #[inline(always)]
    pub fn surface_area(&self) -> f32 {
        2.0 * self.half_surface_area()
    }
}

impl fmt::Display for BoundingBox4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.min.truncate(), self.max.truncate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BoundingBox4 {
        BoundingBox4::from_xyz([0.0, 0.0, 0.0], [1.0, 1.0, 1.0])
    }

    #[test]
    fn empty_box_is_identity_for_enlarge() {
        let mut b = BoundingBox4::empty();
        assert!(b.is_empty());
        b.enlarge_to_hold_box(&unit_box());
        assert_eq!(b, unit_box());
        assert!(!b.is_empty());
    }

    #[test]
    fn empty_box_has_zero_area() {
        assert_eq!(BoundingBox4::empty().half_surface_area(), 0.0);
        assert_eq!(BoundingBox4::default().surface_area(), 0.0);
    }

    #[test]
    fn half_surface_area_of_boxes() {
        assert_eq!(unit_box().half_surface_area(), 3.0);
        let b = BoundingBox4::from_xyz([0.0, 0.0, 0.0], [1.0, 2.0, 3.0]);
        assert_eq!(b.half_surface_area(), 2.0 + 6.0 + 3.0);
        assert_eq!(b.surface_area(), 22.0);
        let flat = BoundingBox4::from_xyz([0.0, 0.0, 0.0], [1.0, 1.0, 0.0]);
        assert_eq!(flat.half_surface_area(), 1.0);
        let point = BoundingBox4::from_xyz([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        assert_eq!(point.half_surface_area(), 0.0);
    }

    #[test]
    fn contains_point_includes_boundary() {
        let b = unit_box();
        assert!(b.contains_point(Vec4::new(0.5, 0.5, 0.5, 0.0)));
        assert!(b.contains_point(Vec4::new(1.0, 0.0, 1.0, 0.0)));
        assert!(!b.contains_point(Vec4::new(1.01, 0.5, 0.5, 0.0)));
        // W lane is ignored.
        assert!(b.contains_point(Vec4::new(0.5, 0.5, 0.5, 100.0)));
    }

    #[test]
    fn enlarge_to_hold_point_then_contains() {
        let mut b = BoundingBox4::empty();
        b.enlarge_to_hold_point(Vec4::new(-1.0, 2.0, 3.0, 0.0));
        b.enlarge_to_hold_point(Vec4::new(1.0, -2.0, 0.0, 0.0));
        assert!(b.contains_point(Vec4::new(0.0, 0.0, 1.0, 0.0)));
        assert_eq!(b.centroid(), Vec4::new(0.0, 0.0, 1.5, 0.0));
    }

    #[test]
    fn contains_box() {
        let outer = BoundingBox4::from_xyz([-1.0, -1.0, -1.0], [2.0, 2.0, 2.0]);
        assert!(outer.contains_box(&unit_box()));
        assert!(!unit_box().contains_box(&outer));
        assert!(unit_box().contains_box(&BoundingBox4::empty()));
    }

    #[test]
    fn merged_box_holds_both() {
        let a = unit_box();
        let b = BoundingBox4::from_xyz([2.0, 2.0, 2.0], [3.0, 3.0, 3.0]);
        let merged = BoundingBox4::create_merged(&a, &b);
        assert!(merged.contains_box(&a) && merged.contains_box(&b));
        assert_eq!(merged.span(), Vec4::new(3.0, 3.0, 3.0, 0.0));
    }
}

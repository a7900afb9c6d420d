use nalgebra::Point3;

use crate::aabb::BoundingBox;
use crate::quadrature::gauss_points_1d;
use crate::trimmed::TrimmedDomain;


/// Octree over a trimmed domain's bounding box, used to seed candidate
/// interior quadrature points. A node is discarded when its center falls
/// outside the trimmed domain, kept as a leaf at the target depth, and
/// split otherwise.
pub struct Octree<'a> {
    domain: &'a TrimmedDomain,
    root: BoundingBox,
    level: usize,
}

impl<'a> Octree<'a> {
    pub fn new(domain: &'a TrimmedDomain) -> Self {
        Self {
            domain,
            root: domain.bounding_box(),
            level: 0,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Set the target leaf depth.
    pub fn refine(&mut self, level: usize) {
        self.level = level;
    }

    fn collect_leaves(&self, node: &BoundingBox, depth: usize, leaves: &mut Vec<BoundingBox>) {
        if depth > 0 && !self.domain.is_inside(&node.center()) {
            return;
        }
        if depth == self.level {
            leaves.push(node.clone());
            return;
        }

        let mid = node.center();
        for octant in 0..8 {
            let mut lower = node.lower;
            let mut upper = mid;
            for d in 0..3 {
                if octant & (1 << d) != 0 {
                    lower[d] = mid[d];
                    upper[d] = node.upper[d];
                }
            }
            self.collect_leaves(&BoundingBox::new(lower, upper), depth + 1, leaves);
        }
    }

    /// Tensor-product Gauss seeds of all kept leaves, filtered through the
    /// trimmed-domain oracle. Positions are physical.
    pub fn integration_points(&self, points_per_axis: [usize; 3]) -> Vec<Point3<f64>> {
        let mut leaves = Vec::new();
        self.collect_leaves(&self.root, 0, &mut leaves);

        let rules = [
            gauss_points_1d(points_per_axis[0]),
            gauss_points_1d(points_per_axis[1]),
            gauss_points_1d(points_per_axis[2]),
        ];

        let mut points = Vec::new();
        for leaf in &leaves {
            let extents = leaf.extents();
            for &(x, _) in rules[0] {
                for &(y, _) in rules[1] {
                    for &(z, _) in rules[2] {
                        let p = Point3::new(
                            leaf.lower.x + extents.x * x,
                            leaf.lower.y + extents.y * y,
                            leaf.lower.z + extents.z * z,
                        );
                        if self.domain.is_inside(&p) {
                            points.push(p);
                        }
                    }
                }
            }
        }
        points
    }
}

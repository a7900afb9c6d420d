use nalgebra::{Point3, Vector3};

use crate::settings::{EPS_BARY, EPS_PARALLEL};


/// Axis-aligned bounding box. `lower <= upper` componentwise.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub lower: Point3<f64>,
    pub upper: Point3<f64>,
}

impl BoundingBox {
    pub fn new(lower: Point3<f64>, upper: Point3<f64>) -> Self {
        Self { lower, upper }
    }

    /// Empty box, ready to be grown with `extend`.
    pub fn empty() -> Self {
        Self {
            lower: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            upper: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Grow to contain `point`.
    pub fn extend(&mut self, point: &Point3<f64>) {
        for d in 0..3 {
            if point[d] < self.lower[d] {
                self.lower[d] = point[d];
            }
            if point[d] > self.upper[d] {
                self.upper[d] = point[d];
            }
        }
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.lower, &self.upper)
    }

    pub fn extents(&self) -> Vector3<f64> {
        self.upper - self.lower
    }

    pub fn volume(&self) -> f64 {
        let e = self.extents();
        e.x * e.y * e.z
    }

    pub fn diagonal(&self) -> f64 {
        self.extents().norm()
    }

    /// Index of the longest axis (0, 1 or 2).
    pub fn longest_axis(&self) -> usize {
        let e = self.extents();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            lower: Point3::new(
                self.lower.x.min(other.lower.x),
                self.lower.y.min(other.lower.y),
                self.lower.z.min(other.lower.z),
            ),
            upper: Point3::new(
                self.upper.x.max(other.upper.x),
                self.upper.y.max(other.upper.y),
                self.upper.z.max(other.upper.z),
            ),
        }
    }

    /// Shrink by `tol` on every side. May invert a degenerate box; callers
    /// pass tolerances far below the cell extents.
    pub fn shrink(&self, tol: f64) -> BoundingBox {
        BoundingBox {
            lower: Point3::new(self.lower.x + tol, self.lower.y + tol, self.lower.z + tol),
            upper: Point3::new(self.upper.x - tol, self.upper.y - tol, self.upper.z - tol),
        }
    }

    pub fn contains(&self, point: &Point3<f64>) -> bool {
        point.x >= self.lower.x
            && point.x <= self.upper.x
            && point.y >= self.lower.y
            && point.y <= self.upper.y
            && point.z >= self.lower.z
            && point.z <= self.upper.z
    }

    pub fn intersects_box(&self, other: &BoundingBox) -> bool {
        self.lower.x <= other.upper.x
            && self.upper.x >= other.lower.x
            && self.lower.y <= other.upper.y
            && self.upper.y >= other.lower.y
            && self.lower.z <= other.upper.z
            && self.upper.z >= other.lower.z
    }

    /// Exact triangle-box overlap by the separating-axis theorem:
    /// 3 box axes, the triangle plane, and the 9 edge cross products.
    pub fn intersects_triangle(
        &self,
        p1: &Point3<f64>,
        p2: &Point3<f64>,
        p3: &Point3<f64>,
    ) -> bool {
        let c = self.center();
        let h = 0.5 * self.extents();

        let v0 = p1 - c;
        let v1 = p2 - c;
        let v2 = p3 - c;

        let e0 = v1 - v0;
        let e1 = v2 - v1;
        let e2 = v0 - v2;

        // Box face normals.
        for d in 0..3 {
            let min = v0[d].min(v1[d]).min(v2[d]);
            let max = v0[d].max(v1[d]).max(v2[d]);
            if min > h[d] || max < -h[d] {
                return false;
            }
        }

        // Triangle plane.
        let n = e0.cross(&e1);
        let r = h.x * n.x.abs() + h.y * n.y.abs() + h.z * n.z.abs();
        let s = n.dot(&v0);
        if s.abs() > r {
            return false;
        }

        // Cross products of the box axes with the triangle edges.
        let edges = [e0, e1, e2];
        let verts = [v0, v1, v2];
        for edge in &edges {
            for d in 0..3 {
                let mut axis = Vector3::zeros();
                axis[d] = 1.0;
                let a = axis.cross(edge);
                let r = h.x * a.x.abs() + h.y * a.y.abs() + h.z * a.z.abs();
                let mut min = f64::MAX;
                let mut max = f64::MIN;
                for v in &verts {
                    let p = a.dot(v);
                    min = min.min(p);
                    max = max.max(p);
                }
                if min > r || max < -r {
                    return false;
                }
            }
        }

        true
    }
}

/// Outcome of a ray-triangle intersection test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// Ray parameter at the intersection (`origin + t * direction`).
    pub t: f64,
    pub u: f64,
    pub v: f64,
    /// `direction . normal > 0`: the ray leaves through this triangle.
    pub back_facing: bool,
    pub parallel: bool,
    /// One of the barycentrics grazes 0 or 1 within tolerance.
    pub on_boundary: bool,
}

/// A ray with precomputed inverse direction components for slab tests.
/// The direction need not be unit length.
#[derive(Debug, Clone)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
    inv_direction: Vector3<f64>,
}

impl Ray {
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>) -> Self {
        // Zero components map to +inf; IEEE semantics keep the slab test valid.
        let inv_direction = Vector3::new(
            if direction.x != 0.0 { 1.0 / direction.x } else { f64::INFINITY },
            if direction.y != 0.0 { 1.0 / direction.y } else { f64::INFINITY },
            if direction.z != 0.0 { 1.0 / direction.z } else { f64::INFINITY },
        );
        Self {
            origin,
            direction,
            inv_direction,
        }
    }

    /// Slab test against `bbox` for the positive half of the ray.
    pub fn intersects_box(&self, bbox: &BoundingBox) -> bool {
        let mut t_min = 0.0_f64;
        let mut t_max = f64::MAX;

        for d in 0..3 {
            if self.inv_direction[d].is_infinite() && self.direction[d] == 0.0 {
                // Parallel to this slab: origin must lie between the planes.
                if self.origin[d] < bbox.lower[d] || self.origin[d] > bbox.upper[d] {
                    return false;
                }
                continue;
            }
            let t1 = (bbox.lower[d] - self.origin[d]) * self.inv_direction[d];
            let t2 = (bbox.upper[d] - self.origin[d]) * self.inv_direction[d];
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
            if t_min > t_max {
                return false;
            }
        }

        true
    }

    /// True when the ray direction lies in the triangle plane within tolerance.
    pub fn is_parallel(&self, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> bool {
        let n = (p2 - p1).cross(&(p3 - p1));
        let n_norm = n.norm();
        let d_norm = self.direction.norm();
        if n_norm == 0.0 || d_norm == 0.0 {
            return true;
        }
        (self.direction.dot(&n) / (n_norm * d_norm)).abs() < EPS_PARALLEL
    }

    /// Moller-Trumbore intersection with `t >= 0`. Returns `None` for misses
    /// and for parallel configurations; boundary grazes are flagged, not
    /// rejected, so callers can retry with a different target.
    pub fn intersect_triangle(
        &self,
        p1: &Point3<f64>,
        p2: &Point3<f64>,
        p3: &Point3<f64>,
    ) -> Option<RayHit> {
        let edge1 = p2 - p1;
        let edge2 = p3 - p1;
        let normal = edge1.cross(&edge2);

        let pvec = self.direction.cross(&edge2);
        let det = edge1.dot(&pvec);

        let n_norm = normal.norm();
        let d_norm = self.direction.norm();
        if n_norm == 0.0 || d_norm == 0.0 {
            return None;
        }
        let parallel = (self.direction.dot(&normal) / (n_norm * d_norm)).abs() < EPS_PARALLEL;
        if parallel {
            return None;
        }

        let inv_det = 1.0 / det;
        let tvec = self.origin - p1;
        let u = tvec.dot(&pvec) * inv_det;
        if u < -EPS_BARY || u > 1.0 + EPS_BARY {
            return None;
        }

        let qvec = tvec.cross(&edge1);
        let v = self.direction.dot(&qvec) * inv_det;
        if v < -EPS_BARY || u + v > 1.0 + EPS_BARY {
            return None;
        }

        let t = edge2.dot(&qvec) * inv_det;
        if t < -EPS_BARY {
            return None;
        }

        let back_facing = self.direction.dot(&normal) > 0.0;
        let on_boundary = u < EPS_BARY || v < EPS_BARY || u + v > 1.0 - EPS_BARY;

        Some(RayHit {
            t,
            u,
            v,
            back_facing,
            parallel,
            on_boundary,
        })
    }
}

use anyhow::Result;
use nalgebra::Point3;

use crate::aabb::{BoundingBox, Ray};
use crate::clipper::clip_triangle_mesh;
use crate::mesh::TriangleMesh;
use crate::settings::EPS_ORIGIN;
use crate::tree::AabbTree;
use crate::trimmed::{ClipError, TrimmedDomain};


/// Classification of a grid cell against the solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectionStatus {
    Inside,
    Outside,
    Trimmed,
}

/// Geometrical operations on a B-Rep solid given as a closed triangle mesh,
/// accelerated by an AABB tree.
pub struct BRepOperator<'a> {
    mesh: &'a TriangleMesh,
    tree: AabbTree,
}

impl<'a> BRepOperator<'a> {
    pub fn new(mesh: &'a TriangleMesh) -> Self {
        Self {
            mesh,
            tree: AabbTree::new(mesh),
        }
    }

    /// True if `point` lies strictly inside the solid.
    pub fn is_inside(&self, point: &Point3<f64>) -> bool {
        if self.mesh.num_triangles() == 0 {
            return false;
        }
        ray_cast_is_inside(self.mesh, &self.tree, point)
    }

    /// Classify a cell box. `tolerance` shrinks the box so touch-only
    /// contact does not count as an intersection.
    pub fn classify_cell(&self, bbox: &BoundingBox, tolerance: f64) -> IntersectionStatus {
        let shrunk = bbox.shrink(tolerance);
        for t in self.tree.query_box(&shrunk) {
            if shrunk.intersects_triangle(self.mesh.p1(t), self.mesh.p2(t), self.mesh.p3(t)) {
                return IntersectionStatus::Trimmed;
            }
        }

        if self.is_inside(&bbox.center()) {
            IntersectionStatus::Inside
        } else {
            IntersectionStatus::Outside
        }
    }

    /// Ids of triangles that actually intersect `select`.
    pub fn intersected_triangle_ids(&self, select: &BoundingBox) -> Vec<usize> {
        self.tree
            .query_box(select)
            .into_iter()
            .filter(|&t| {
                select.intersects_triangle(self.mesh.p1(t), self.mesh.p2(t), self.mesh.p3(t))
            })
            .collect()
    }

    fn clip_tolerance(bbox: &BoundingBox) -> f64 {
        crate::settings::CLASSIFY_TOL_REL * bbox.extents().min()
    }

    /// Surface restricted to `bbox`, with cap edges tagged.
    ///
    /// Candidates are selected with the slightly shrunk box: surface patches
    /// coplanar with a cell face only touch the cell and are rebuilt as
    /// caps instead, so the local mesh stays single-covered.
    pub fn clip_mesh(&self, bbox: &BoundingBox) -> TriangleMesh {
        let ids = self.intersected_triangle_ids(&bbox.shrink(Self::clip_tolerance(bbox)));
        clip_triangle_mesh(self.mesh, &ids, bbox, true)
    }

    /// Surface restricted to `bbox` without tags, for conforming BC meshes.
    ///
    /// `upper_exclusive` marks the axes on which triangles lying exactly on
    /// the upper cell face belong to the neighboring cell; this assigns
    /// interface-coincident triangles to exactly one cell of the grid.
    pub fn clip_mesh_untagged(
        &self,
        bbox: &BoundingBox,
        upper_exclusive: [bool; 3],
    ) -> TriangleMesh {
        let tol = Self::clip_tolerance(bbox);
        let mut select = bbox.clone();
        for d in 0..3 {
            if upper_exclusive[d] {
                select.upper[d] -= tol;
            }
        }
        let ids = self.intersected_triangle_ids(&select);
        clip_triangle_mesh(self.mesh, &ids, bbox, false)
    }

    /// Build the closed trimmed domain of a cell.
    ///
    /// Returns `Ok(None)` when the cell holds no material worth keeping:
    /// the clipped surface is empty, the interior volume ratio falls below
    /// `min_volume_ratio`, or cap closure fails under the permissive policy.
    /// Cap-closure failure under the strict policy is an error.
    pub fn build_trimmed_domain(
        &self,
        bbox: &BoundingBox,
        min_volume_ratio: f64,
        min_boundary_triangles: usize,
        neglect_if_flawed: bool,
    ) -> Result<Option<TrimmedDomain>> {
        let clipped = self.clip_mesh(bbox);
        if clipped.num_triangles() == 0 {
            return Ok(None);
        }

        let oracle = |p: &Point3<f64>| self.is_inside(p);
        let domain = match TrimmedDomain::new(clipped, bbox.clone(), &oracle, min_boundary_triangles)
        {
            Ok(domain) => domain,
            Err(err @ (ClipError::OpenCap { .. } | ClipError::Triangulation { .. })) => {
                if neglect_if_flawed {
                    return Ok(None);
                }
                return Err(err.into());
            }
        };

        if domain.volume() < min_volume_ratio * bbox.volume() {
            return Ok(None);
        }

        Ok(Some(domain))
    }
}

/// Robust ray-cast inside test shared by the global and the trimmed-domain
/// oracles. Casts towards successive triangle centers until a cast is free
/// of parallel and boundary-grazing intersections; the closest valid hit's
/// orientation decides. Exhausting every target classifies the point as
/// outside (conservative).
pub(crate) fn ray_cast_is_inside(
    mesh: &TriangleMesh,
    tree: &AabbTree,
    point: &Point3<f64>,
) -> bool {
    let num_triangles = mesh.num_triangles();

    'target: for target in 0..num_triangles {
        let center = mesh.center(target);
        let mut direction = center - point;
        let norm = direction.norm();
        if norm < EPS_ORIGIN {
            // Query point coincides with a triangle center.
            return false;
        }
        direction /= norm;

        let ray = Ray::new(*point, direction);
        if ray.is_parallel(mesh.p1(target), mesh.p2(target), mesh.p3(target)) {
            continue;
        }

        let candidates = tree.query_ray(&ray);
        if candidates.is_empty() {
            // Tree and mesh disagree; treat as a degenerate cast and retry
            // with the next target.
            continue;
        }

        let mut min_distance = f64::MAX;
        let mut is_inside = false;
        let mut any_hit = false;
        for t in candidates {
            let Some(hit) = ray.intersect_triangle(mesh.p1(t), mesh.p2(t), mesh.p3(t)) else {
                continue;
            };
            if hit.t < EPS_ORIGIN {
                // Ray origin lies on the surface: not strictly inside.
                return false;
            }
            if hit.on_boundary {
                // Grazing a triangle boundary: the parity argument breaks
                // down, cast towards a different target.
                continue 'target;
            }
            any_hit = true;
            if hit.t < min_distance {
                min_distance = hit.t;
                is_inside = hit.back_facing;
            }
        }

        if any_hit {
            return is_inside;
        }
    }

    false
}

use nalgebra::Point3;
use thiserror::Error;

use crate::aabb::BoundingBox;
use crate::clipper::face_normal;
use crate::element::BoundaryIntegrationPoint;
use crate::mesh::{TriangleMesh, TriangleRule, VertexMap};
use crate::settings::{FACE_NUDGE_REL, SNAP_TOL_REL};
use crate::tree::AabbTree;

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Clipped mesh of the half-space `x <= 0.5` inside the unit cell: a
    /// unit square at x = 0.5 with tagged edges on the four side faces.
    fn half_space_clip() -> TriangleMesh {
        let mut big = TriangleMesh::new();
        big.add_vertex(Point3::new(0.5, -1.0, -1.0));
        big.add_vertex(Point3::new(0.5, 2.0, -1.0));
        big.add_vertex(Point3::new(0.5, 2.0, 2.0));
        big.add_vertex(Point3::new(0.5, -1.0, 2.0));
        // Outward normal +x for the solid x <= 0.5.
        big.push_triangle([0, 1, 2], Some(Vector3::x()));
        big.push_triangle([0, 2, 3], Some(Vector3::x()));

        let bbox = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        crate::clipper::clip_triangle_mesh(&big, &[0, 1], &bbox, true)
    }

    #[test]
    fn half_space_domain_is_closed() {
        let clipped = half_space_clip();
        let bbox = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let domain =
            TrimmedDomain::new(clipped, bbox, &|p: &Point3<f64>| p.x <= 0.5, 1).unwrap();

        assert_relative_eq!(domain.volume(), 0.5, epsilon = 1e-10);

        assert!(domain.is_inside(&Point3::new(0.25, 0.5, 0.5)));
        assert!(!domain.is_inside(&Point3::new(0.75, 0.5, 0.5)));
        assert!(!domain.is_inside(&Point3::new(0.25, 0.5, 1.4)));
    }

    #[test]
    fn half_space_boundary_area() {
        let clipped = half_space_clip();
        let bbox = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let domain =
            TrimmedDomain::new(clipped, bbox, &|p: &Point3<f64>| p.x <= 0.5, 1).unwrap();

        // Closed box 0.5 x 1 x 1: total surface 2*(0.5 + 0.5 + 1) = 4.
        let mut area = 0.0;
        for ip in domain.boundary_ips(TriangleRule::SixPoint) {
            assert!(ip.weight > 0.0);
            assert_relative_eq!(ip.normal.norm(), 1.0, epsilon = 1e-12);
            area += ip.weight;
        }
        assert_relative_eq!(area, 4.0, epsilon = 1e-10);
    }

    #[test]
    fn refinement_respects_floor() {
        let clipped = half_space_clip();
        let bbox = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let domain =
            TrimmedDomain::new(clipped, bbox, &|p: &Point3<f64>| p.x <= 0.5, 300).unwrap();
        assert!(domain.mesh().num_triangles() >= 300);
        assert_relative_eq!(domain.volume(), 0.5, epsilon = 1e-10);
    }

    fn triangle_signed_area(points: &[[f64; 2]], t: &[usize; 3]) -> f64 {
        let (a, b, c) = (points[t[0]], points[t[1]], points[t[2]]);
        0.5 * cross2(sub2(b, a), sub2(c, a))
    }

    #[test]
    fn triangulate_square_with_hole() {
        let outer = vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]];
        // Clockwise: a hole.
        let hole = vec![[1.0, 1.0], [1.0, 3.0], [3.0, 3.0], [3.0, 1.0]];

        let triangles = triangulate_with_holes(&outer, &[hole.clone()]).unwrap();
        let mut points = outer.clone();
        points.extend_from_slice(&hole);

        let area: f64 = triangles
            .iter()
            .map(|t| triangle_signed_area(&points, t).abs())
            .sum();
        assert_relative_eq!(area, 16.0 - 4.0, epsilon = 1e-10);
        // All triangles keep counter-clockwise winding.
        for t in &triangles {
            assert!(triangle_signed_area(&points, t) > 0.0);
        }
    }

    #[test]
    fn triangulate_convex_and_reflex() {
        let square = vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]];
        let triangles = triangulate_with_holes(&square, &[]).unwrap();
        assert_eq!(triangles.len(), 2);

        // L-shape with a reflex corner.
        let ell = vec![
            [0.0, 0.0],
            [2.0, 0.0],
            [2.0, 1.0],
            [1.0, 1.0],
            [1.0, 2.0],
            [0.0, 2.0],
        ];
        let triangles = triangulate_with_holes(&ell, &[]).unwrap();
        let area: f64 = triangles
            .iter()
            .map(|t| triangle_signed_area(&ell, t).abs())
            .sum();
        assert_relative_eq!(area, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn oracle_decides_untouched_faces() {
        // Same clipped surface, but an oracle that claims everything is
        // outside: only faces carrying tagged edges get caps, the -x face
        // stays open and the volume integral drops accordingly.
        let clipped = half_space_clip();
        let bbox = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let domain = TrimmedDomain::new(clipped, bbox, &|_: &Point3<f64>| false, 1).unwrap();
        // Missing -x face (x=0, normal -x) contributes 0 to the volume
        // integral either way; the closed value is still recovered.
        assert_relative_eq!(domain.volume(), 0.5, epsilon = 1e-10);
    }
}

/// Geometry failures during trimmed-domain construction. The driver maps
/// these to cell rejection or a fatal error depending on the
/// `neglect_elements_if_mesh_is_flawed` policy.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("open cap chain on cell face {plane}: endpoint off the face boundary")]
    OpenCap { plane: usize },
    #[error("cap triangulation failed on cell face {plane}")]
    Triangulation { plane: usize },
}

/// The solid restricted to one grid cell: a watertight local surface mesh
/// (clipped surface plus face caps) with its own AABB tree.
#[derive(Debug)]
pub struct TrimmedDomain {
    mesh: TriangleMesh,
    tree: AabbTree,
    bounds: BoundingBox,
}

impl TrimmedDomain {
    /// Close `clipped` (the surface restricted to `bounds`, with tagged cap
    /// edges) by synthesizing caps on the six cell faces, refine the result
    /// to at least `min_triangles`, and index it.
    ///
    /// `oracle` is the global inside test; it decides faces the surface does
    /// not touch.
    pub fn new(
        mut clipped: TriangleMesh,
        bounds: BoundingBox,
        oracle: &dyn Fn(&Point3<f64>) -> bool,
        min_triangles: usize,
    ) -> Result<Self, ClipError> {
        for plane in 0..6 {
            build_cap(&mut clipped, plane, &bounds, oracle)?;
        }

        clipped.refine(min_triangles);
        let tree = AabbTree::new(&clipped);

        Ok(Self {
            mesh: clipped,
            tree,
            bounds,
        })
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// Vertex-wise bounding box of the local mesh. Can be strictly smaller
    /// than the owning cell.
    pub fn bounding_box(&self) -> BoundingBox {
        self.mesh.bounding_box()
    }

    /// Interior volume of the local closed mesh.
    pub fn volume(&self) -> f64 {
        self.mesh.volume()
    }

    /// Ray-cast inside test against the local closed mesh, with the same
    /// robust retry scheme as the global oracle. Assumes `point` lies
    /// within the owning cell.
    pub fn is_inside(&self, point: &Point3<f64>) -> bool {
        if self.mesh.num_triangles() == 0 {
            return true;
        }
        crate::brep::ray_cast_is_inside(&self.mesh, &self.tree, point)
    }

    /// Boundary integration points over the whole local surface.
    pub fn boundary_ips(&self, rule: TriangleRule) -> Vec<BoundaryIntegrationPoint> {
        let mut ips = Vec::with_capacity(self.mesh.num_triangles() * 6);
        for t in 0..self.mesh.num_triangles() {
            ips.extend(self.mesh.boundary_ips(t, rule));
        }
        ips
    }
}

fn sub2(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

fn cross2(a: [f64; 2], b: [f64; 2]) -> f64 {
    a[0] * b[1] - a[1] * b[0]
}

/// In-plane axes (u, v) of a cell face such that (e_u, e_v, m) is
/// right-handed, m being the outward face normal.
fn face_axes(plane: usize) -> (usize, usize) {
    let axis = plane / 2;
    if plane % 2 == 1 {
        ((axis + 1) % 3, (axis + 2) % 3)
    } else {
        ((axis + 2) % 3, (axis + 1) % 3)
    }
}

/// Synthesize the cap polygons of one cell face from its tagged edges and
/// append their triangulation to `mesh` with the face's outward normal.
fn build_cap(
    mesh: &mut TriangleMesh,
    plane: usize,
    bounds: &BoundingBox,
    oracle: &dyn Fn(&Point3<f64>) -> bool,
) -> Result<(), ClipError> {
    let m = face_normal(plane);
    let axis = plane / 2;
    let (u_axis, v_axis) = face_axes(plane);
    let face_coord = if plane % 2 == 0 {
        bounds.lower[axis]
    } else {
        bounds.upper[axis]
    };
    let lo = [bounds.lower[u_axis], bounds.lower[v_axis]];
    let hi = [bounds.upper[u_axis], bounds.upper[v_axis]];
    let tol = (bounds.diagonal() * SNAP_TOL_REL).max(f64::MIN_POSITIVE) * 10.0;

    // Oriented 2D edges: material to the left, direction m x n.
    let mut edges: Vec<([usize; 2], [[f64; 2]; 2])> = Vec::new();
    for tagged in mesh.edges_on_plane(plane).to_vec() {
        let n = *mesh.normal(tagged.triangle);
        let w = m.cross(&n);
        let a3 = mesh.vertices()[tagged.v1];
        let b3 = mesh.vertices()[tagged.v2];
        let s = (b3 - a3).dot(&w);
        let scale = (b3 - a3).norm() * w.norm();
        if scale <= 0.0 || s.abs() < 1e-8 * scale {
            // Triangle normal parallel to the face normal: degenerate tag.
            continue;
        }
        let (i1, i2) = if s > 0.0 {
            (tagged.v1, tagged.v2)
        } else {
            (tagged.v2, tagged.v1)
        };
        let p1 = mesh.vertices()[i1];
        let p2 = mesh.vertices()[i2];
        edges.push((
            [i1, i2],
            [[p1[u_axis], p1[v_axis]], [p2[u_axis], p2[v_axis]]],
        ));
    }

    let loops = if edges.is_empty() {
        // Untouched face: entirely material or entirely void.
        let mut center = Point3::origin();
        center[axis] = face_coord - m[axis] * FACE_NUDGE_REL * bounds.extents()[axis];
        center[u_axis] = 0.5 * (lo[0] + hi[0]);
        center[v_axis] = 0.5 * (lo[1] + hi[1]);
        if !oracle(&center) {
            return Ok(());
        }
        vec![rectangle_loop(mesh, plane, face_coord, lo, hi, axis, u_axis, v_axis)]
    } else {
        assemble_loops(mesh, plane, edges, lo, hi, tol, face_coord, axis, u_axis, v_axis)?
    };

    // Split into material loops (counter-clockwise) and holes (clockwise),
    // then triangulate each material loop with the holes it contains.
    let mut outers: Vec<Vec<(usize, [f64; 2])>> = Vec::new();
    let mut holes: Vec<Vec<(usize, [f64; 2])>> = Vec::new();
    for lp in loops {
        if lp.len() < 3 {
            continue;
        }
        if signed_area(&lp) > 0.0 {
            outers.push(lp);
        } else {
            holes.push(lp);
        }
    }

    if !holes.is_empty() {
        // A hole with no containing material loop implies the rest of the
        // face is material: add the whole rectangle as outer.
        let orphan = holes.iter().any(|h| {
            !outers
                .iter()
                .any(|o| point_in_loop(h[0].1, o))
        });
        if orphan {
            outers.push(rectangle_loop(mesh, plane, face_coord, lo, hi, axis, u_axis, v_axis));
        }
    }

    for outer in &outers {
        let contained: Vec<&Vec<(usize, [f64; 2])>> = holes
            .iter()
            .filter(|h| point_in_loop(h[0].1, outer))
            .collect();

        let outer_pts: Vec<[f64; 2]> = outer.iter().map(|&(_, p)| p).collect();
        let hole_pts: Vec<Vec<[f64; 2]>> = contained
            .iter()
            .map(|h| h.iter().map(|&(_, p)| p).collect())
            .collect();

        let triangles = triangulate_with_holes(&outer_pts, &hole_pts)
            .map_err(|_| ClipError::Triangulation { plane })?;

        // Map local triangulation ids back to mesh vertex ids.
        let mut all_ids: Vec<usize> = outer.iter().map(|&(id, _)| id).collect();
        for h in &contained {
            all_ids.extend(h.iter().map(|&(id, _)| id));
        }

        for t in &triangles {
            let ids = [all_ids[t[0]], all_ids[t[1]], all_ids[t[2]]];
            if ids[0] == ids[1] || ids[1] == ids[2] || ids[2] == ids[0] {
                continue;
            }
            mesh.push_triangle(ids, Some(m));
        }
    }

    Ok(())
}

/// The whole face rectangle as a counter-clockwise loop, creating the four
/// corner vertices in the mesh.
#[allow(clippy::too_many_arguments)]
fn rectangle_loop(
    mesh: &mut TriangleMesh,
    _plane: usize,
    face_coord: f64,
    lo: [f64; 2],
    hi: [f64; 2],
    axis: usize,
    u_axis: usize,
    v_axis: usize,
) -> Vec<(usize, [f64; 2])> {
    let tol = ((hi[0] - lo[0]).hypot(hi[1] - lo[1]) * SNAP_TOL_REL).max(f64::MIN_POSITIVE);
    let mut map = VertexMap::new(tol);
    for (i, v) in mesh.vertices().to_vec().iter().enumerate() {
        map.register(*v, i);
    }
    [[lo[0], lo[1]], [hi[0], lo[1]], [hi[0], hi[1]], [lo[0], hi[1]]]
        .iter()
        .map(|&p| {
            let mut v = Point3::origin();
            v[axis] = face_coord;
            v[u_axis] = p[0];
            v[v_axis] = p[1];
            (map.insert(mesh, v), p)
        })
        .collect()
}

/// Position of a boundary point along the counter-clockwise perimeter of
/// the rectangle [lo, hi], or `None` if it is not on the boundary.
fn perimeter_param(p: [f64; 2], lo: [f64; 2], hi: [f64; 2], tol: f64) -> Option<f64> {
    let w = hi[0] - lo[0];
    let h = hi[1] - lo[1];
    if (p[1] - lo[1]).abs() <= tol {
        return Some((p[0] - lo[0]).clamp(0.0, w));
    }
    if (p[0] - hi[0]).abs() <= tol {
        return Some(w + (p[1] - lo[1]).clamp(0.0, h));
    }
    if (p[1] - hi[1]).abs() <= tol {
        return Some(w + h + (hi[0] - p[0]).clamp(0.0, w));
    }
    if (p[0] - lo[0]).abs() <= tol {
        return Some(2.0 * w + h + (hi[1] - p[1]).clamp(0.0, h));
    }
    None
}

/// Chain the oriented face edges into closed loops. Open chains end on the
/// face boundary and are closed by walking the rectangle counter-clockwise
/// through the corners.
#[allow(clippy::too_many_arguments)]
fn assemble_loops(
    mesh: &mut TriangleMesh,
    plane: usize,
    edges: Vec<([usize; 2], [[f64; 2]; 2])>,
    lo: [f64; 2],
    hi: [f64; 2],
    tol: f64,
    face_coord: f64,
    axis: usize,
    u_axis: usize,
    v_axis: usize,
) -> Result<Vec<Vec<(usize, [f64; 2])>>, ClipError> {
    use std::collections::HashMap;

    // Start-vertex index over the edges.
    let mut by_start: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut has_incoming: HashMap<usize, usize> = HashMap::new();
    for (i, (ids, _)) in edges.iter().enumerate() {
        by_start.entry(ids[0]).or_default().push(i);
        *has_incoming.entry(ids[1]).or_default() += 1;
    }

    let mut used = vec![false; edges.len()];
    let walk_from = |start_edge: usize, used: &mut Vec<bool>| -> Vec<(usize, [f64; 2])> {
        let mut chain = Vec::new();
        let mut edge = start_edge;
        loop {
            used[edge] = true;
            let (ids, pts) = &edges[edge];
            if chain.is_empty() {
                chain.push((ids[0], pts[0]));
            }
            chain.push((ids[1], pts[1]));
            let next = by_start
                .get(&ids[1])
                .and_then(|list| list.iter().find(|&&e| !used[e]))
                .copied();
            match next {
                Some(e) => edge = e,
                None => break,
            }
        }
        chain
    };

    // Chains beginning at vertices without an incoming edge are open.
    let mut open_chains: Vec<Vec<(usize, [f64; 2])>> = Vec::new();
    for i in 0..edges.len() {
        if used[i] || has_incoming.contains_key(&edges[i].0[0]) {
            continue;
        }
        open_chains.push(walk_from(i, &mut used));
    }
    // Everything left chains into closed loops.
    let mut loops: Vec<Vec<(usize, [f64; 2])>> = Vec::new();
    for i in 0..edges.len() {
        if used[i] {
            continue;
        }
        let mut chain = walk_from(i, &mut used);
        if chain.len() >= 2 && chain.first().unwrap().0 == chain.last().unwrap().0 {
            chain.pop();
        }
        loops.push(chain);
    }

    if open_chains.is_empty() {
        return Ok(loops);
    }

    // Validate chain endpoints against the rectangle boundary.
    struct OpenChain {
        points: Vec<(usize, [f64; 2])>,
        start_t: f64,
        end_t: f64,
    }
    let perimeter = 2.0 * (hi[0] - lo[0]) + 2.0 * (hi[1] - lo[1]);
    let mut chains: Vec<OpenChain> = Vec::new();
    for chain in open_chains {
        let start = chain.first().unwrap().1;
        let end = chain.last().unwrap().1;
        let start_t =
            perimeter_param(start, lo, hi, tol).ok_or(ClipError::OpenCap { plane })?;
        let end_t = perimeter_param(end, lo, hi, tol).ok_or(ClipError::OpenCap { plane })?;
        chains.push(OpenChain {
            points: chain,
            start_t,
            end_t,
        });
    }

    // Corner bookkeeping for boundary walks.
    let corner_params = [
        0.0,
        hi[0] - lo[0],
        hi[0] - lo[0] + hi[1] - lo[1],
        2.0 * (hi[0] - lo[0]) + hi[1] - lo[1],
    ];
    let corner_points = [
        [lo[0], lo[1]],
        [hi[0], lo[1]],
        [hi[0], hi[1]],
        [lo[0], hi[1]],
    ];

    let mut consumed = vec![false; chains.len()];
    for first in 0..chains.len() {
        if consumed[first] {
            continue;
        }
        let mut lp = chains[first].points.clone();
        consumed[first] = true;
        let mut cursor_t = chains[first].end_t;
        let close_t = chains[first].start_t;

        loop {
            // Next chain start strictly ahead of the cursor along the
            // counter-clockwise boundary (cyclic), the closing start included.
            let ahead = |t: f64, cursor: f64| {
                let d = (t - cursor).rem_euclid(perimeter);
                if d <= tol {
                    perimeter
                } else {
                    d
                }
            };
            let mut best: Option<(f64, usize)> = None;
            for (j, chain) in chains.iter().enumerate() {
                if consumed[j] {
                    continue;
                }
                let d = ahead(chain.start_t, cursor_t);
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, j));
                }
            }
            let d_close = ahead(close_t, cursor_t);
            let next = match best {
                Some((d, j)) if d < d_close => Some(j),
                _ => None,
            };
            let target_t = match next {
                Some(j) => chains[j].start_t,
                None => close_t,
            };

            // Insert the corners passed along the way. A target coinciding
            // with the cursor means a full boundary revolution.
            let span = ahead(target_t, cursor_t);
            let mut passed: Vec<(f64, usize)> = (0..4)
                .filter_map(|c| {
                    let d = (corner_params[c] - cursor_t).rem_euclid(perimeter);
                    (d > tol && d < span - tol).then_some((d, c))
                })
                .collect();
            passed.sort_by(|a, b| a.0.total_cmp(&b.0));
            for (_, c) in passed {
                let p = corner_points[c];
                let mut v = Point3::origin();
                v[axis] = face_coord;
                v[u_axis] = p[0];
                v[v_axis] = p[1];
                let snap = (bounds_diag(lo, hi) * SNAP_TOL_REL).max(f64::MIN_POSITIVE);
                let mut map = VertexMap::new(snap);
                for (i, vert) in mesh.vertices().to_vec().iter().enumerate() {
                    map.register(*vert, i);
                }
                let id = map.insert(mesh, v);
                lp.push((id, p));
            }

            match next {
                Some(j) => {
                    consumed[j] = true;
                    cursor_t = chains[j].end_t;
                    lp.extend(chains[j].points.iter().copied());
                }
                None => break,
            }
        }

        if lp.len() >= 2 && lp.first().unwrap().0 == lp.last().unwrap().0 {
            lp.pop();
        }
        loops.push(lp);
    }

    Ok(loops)
}

fn bounds_diag(lo: [f64; 2], hi: [f64; 2]) -> f64 {
    (hi[0] - lo[0]).hypot(hi[1] - lo[1])
}

fn signed_area(lp: &[(usize, [f64; 2])]) -> f64 {
    let mut area = 0.0;
    for i in 0..lp.len() {
        let a = lp[i].1;
        let b = lp[(i + 1) % lp.len()].1;
        area += a[0] * b[1] - b[0] * a[1];
    }
    0.5 * area
}

/// Even-odd point-in-polygon test.
fn point_in_loop(p: [f64; 2], lp: &[(usize, [f64; 2])]) -> bool {
    let mut inside = false;
    for i in 0..lp.len() {
        let a = lp[i].1;
        let b = lp[(i + 1) % lp.len()].1;
        if (a[1] > p[1]) != (b[1] > p[1]) {
            let x = a[0] + (p[1] - a[1]) / (b[1] - a[1]) * (b[0] - a[0]);
            if x > p[0] {
                inside = !inside;
            }
        }
    }
    inside
}

/// Ear-clip a counter-clockwise polygon with clockwise holes. Returned
/// triangle ids index the concatenation of `outer` and the holes in order.
fn triangulate_with_holes(
    outer: &[[f64; 2]],
    holes: &[Vec<[f64; 2]>],
) -> Result<Vec<[usize; 3]>, ()> {
    let mut points: Vec<[f64; 2]> = outer.to_vec();
    let mut polygon: Vec<usize> = (0..outer.len()).collect();

    // Bridge holes one by one, right-most hole vertex first.
    let mut hole_ranges = Vec::new();
    for hole in holes {
        let offset = points.len();
        points.extend_from_slice(hole);
        hole_ranges.push((offset, hole.len()));
    }
    let mut remaining: Vec<usize> = (0..holes.len()).collect();
    remaining.sort_by(|&a, &b| {
        let max_u = |h: usize| {
            holes[h]
                .iter()
                .map(|p| p[0])
                .fold(f64::MIN, f64::max)
        };
        max_u(b).total_cmp(&max_u(a))
    });

    for h in remaining {
        let (offset, len) = hole_ranges[h];
        bridge_hole(&points, &mut polygon, offset, len)?;
    }

    let triangles = ear_clip(&points, polygon)?;
    Ok(triangles)
}

/// Connect a hole into the outer polygon with a two-way bridge edge.
fn bridge_hole(
    points: &[[f64; 2]],
    polygon: &mut Vec<usize>,
    offset: usize,
    len: usize,
) -> Result<(), ()> {
    // Hole vertex with maximum u.
    let mut local_m = 0;
    for i in 0..len {
        if points[offset + i][0] > points[offset + local_m][0] {
            local_m = i;
        }
    }
    let m = points[offset + local_m];

    // Closest intersection of the +u ray from m with the outer edges.
    let mut best: Option<(f64, usize)> = None; // (u of intersection, polygon position)
    for i in 0..polygon.len() {
        let a = points[polygon[i]];
        let b = points[polygon[(i + 1) % polygon.len()]];
        if (a[1] > m[1]) == (b[1] > m[1]) {
            continue;
        }
        let u = a[0] + (m[1] - a[1]) / (b[1] - a[1]) * (b[0] - a[0]);
        if u >= m[0] && best.map_or(true, |(bu, _)| u < bu) {
            best = Some((u, i));
        }
    }
    let Some((u_int, edge_pos)) = best else {
        return Err(());
    };

    // Candidate bridge target: the intersected edge's endpoint with the
    // larger u; reflex vertices inside the (m, I, P) triangle take priority
    // (closest angular to the +u direction).
    let a_pos = edge_pos;
    let b_pos = (edge_pos + 1) % polygon.len();
    let mut target = if points[polygon[a_pos]][0] > points[polygon[b_pos]][0] {
        a_pos
    } else {
        b_pos
    };

    let i_pt = [u_int, m[1]];
    let mut best_metric = f64::MAX;
    for pos in 0..polygon.len() {
        let p = points[polygon[pos]];
        let prev = points[polygon[(pos + polygon.len() - 1) % polygon.len()]];
        let next = points[polygon[(pos + 1) % polygon.len()]];
        let reflex = cross2(sub2(p, prev), sub2(next, p)) < 0.0;
        if !reflex {
            continue;
        }
        if in_triangle(m, i_pt, points[polygon[target]], p) {
            let dx = p[0] - m[0];
            let dy = (p[1] - m[1]).abs();
            let metric = if dx > 0.0 { dy / dx } else { f64::MAX };
            if metric < best_metric {
                best_metric = metric;
                target = pos;
            }
        }
    }

    // Splice: ... target, m, hole walk, m, target ...
    let mut insertion = Vec::with_capacity(len + 2);
    insertion.push(offset + local_m);
    for k in 1..=len {
        insertion.push(offset + (local_m + k) % len);
    }
    insertion.push(polygon[target]);
    let at = target + 1;
    polygon.splice(at..at, insertion);

    Ok(())
}

fn in_triangle(a: [f64; 2], b: [f64; 2], c: [f64; 2], p: [f64; 2]) -> bool {
    let d1 = cross2(sub2(b, a), sub2(p, a));
    let d2 = cross2(sub2(c, b), sub2(p, b));
    let d3 = cross2(sub2(a, c), sub2(p, c));
    (d1 >= 0.0 && d2 >= 0.0 && d3 >= 0.0) || (d1 <= 0.0 && d2 <= 0.0 && d3 <= 0.0)
}

/// O(n^2) ear clipping of a counter-clockwise simple polygon (bridged holes
/// included). Fails when no ear can be found, which signals a flawed cap.
fn ear_clip(points: &[[f64; 2]], mut polygon: Vec<usize>) -> Result<Vec<[usize; 3]>, ()> {
    let mut triangles = Vec::with_capacity(polygon.len().saturating_sub(2));

    let mut stall = 0;
    while polygon.len() > 3 {
        let n = polygon.len();
        let mut clipped = false;
        for i in 0..n {
            let prev = polygon[(i + n - 1) % n];
            let cur = polygon[i];
            let next = polygon[(i + 1) % n];
            let a = points[prev];
            let b = points[cur];
            let c = points[next];

            let area2 = cross2(sub2(b, a), sub2(c, a));
            if area2 <= 0.0 {
                continue; // reflex or degenerate corner
            }

            let mut is_ear = true;
            for &other in &polygon {
                if other == prev || other == cur || other == next {
                    continue;
                }
                let p = points[other];
                if strictly_in_triangle(a, b, c, p) {
                    is_ear = false;
                    break;
                }
            }
            if !is_ear {
                continue;
            }

            triangles.push([prev, cur, next]);
            polygon.remove(i);
            clipped = true;
            break;
        }

        if !clipped {
            // Drop one degenerate (zero-area) corner before giving up.
            let mut dropped = false;
            for i in 0..polygon.len() {
                let n = polygon.len();
                let a = points[polygon[(i + n - 1) % n]];
                let b = points[polygon[i]];
                let c = points[polygon[(i + 1) % n]];
                if cross2(sub2(b, a), sub2(c, a)).abs() < 1e-14 {
                    polygon.remove(i);
                    dropped = true;
                    break;
                }
            }
            if !dropped {
                return Err(());
            }
            stall += 1;
            if stall > points.len() * 2 {
                return Err(());
            }
        }
    }

    if polygon.len() == 3 {
        let a = points[polygon[0]];
        let b = points[polygon[1]];
        let c = points[polygon[2]];
        if cross2(sub2(b, a), sub2(c, a)) > 0.0 {
            triangles.push([polygon[0], polygon[1], polygon[2]]);
        }
    }

    Ok(triangles)
}

fn strictly_in_triangle(a: [f64; 2], b: [f64; 2], c: [f64; 2], p: [f64; 2]) -> bool {
    let d1 = cross2(sub2(b, a), sub2(p, a));
    let d2 = cross2(sub2(c, b), sub2(p, b));
    let d3 = cross2(sub2(a, c), sub2(p, c));
    d1 > 0.0 && d2 > 0.0 && d3 > 0.0
}

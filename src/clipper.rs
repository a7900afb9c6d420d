use nalgebra::{Point3, Vector3};

use crate::aabb::BoundingBox;
use crate::mesh::{TaggedEdge, TriangleMesh, VertexMap};
use crate::settings::SNAP_TOL_REL;


/// Outward unit normal of cell face `plane` in the order [-x,+x,-y,+y,-z,+z].
pub fn face_normal(plane: usize) -> Vector3<f64> {
    match plane {
        0 => Vector3::new(-1.0, 0.0, 0.0),
        1 => Vector3::new(1.0, 0.0, 0.0),
        2 => Vector3::new(0.0, -1.0, 0.0),
        3 => Vector3::new(0.0, 1.0, 0.0),
        4 => Vector3::new(0.0, 0.0, -1.0),
        5 => Vector3::new(0.0, 0.0, 1.0),
        _ => unreachable!("plane index out of range"),
    }
}

/// Signed distance of `p` to face `plane` of `bbox`, positive inside.
fn plane_distance(p: &Point3<f64>, plane: usize, bbox: &BoundingBox) -> f64 {
    let axis = plane / 2;
    if plane % 2 == 0 {
        p[axis] - bbox.lower[axis]
    } else {
        bbox.upper[axis] - p[axis]
    }
}

/// A polygon vertex during clipping; `planes` is a bitmask of the cell
/// faces the vertex lies on.
#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    position: Point3<f64>,
    planes: u8,
}

/// Clip the listed triangles of `mesh` against `bbox` (Sutherland-Hodgman
/// against the six half-spaces, fan-triangulating the remainders).
///
/// With `tag_planes`, every polygon edge that lies on a cell face is
/// recorded on that face for later cap synthesis.
pub fn clip_triangle_mesh(
    mesh: &TriangleMesh,
    triangle_ids: &[usize],
    bbox: &BoundingBox,
    tag_planes: bool,
) -> TriangleMesh {
    let tol = (bbox.diagonal() * SNAP_TOL_REL).max(f64::MIN_POSITIVE);
    let area_tol = f64::EPSILON * bbox.diagonal() * bbox.diagonal();

    let mut clipped = TriangleMesh::new();
    let mut map = VertexMap::new(tol);

    for &t in triangle_ids {
        let polygon = clip_triangle(mesh.p1(t), mesh.p2(t), mesh.p3(t), bbox, tol);
        if polygon.len() < 3 {
            continue;
        }

        let normal = *mesh.normal(t);
        let ids: Vec<usize> = polygon
            .iter()
            .map(|v| map.insert(&mut clipped, v.position))
            .collect();

        // Fan triangulation; snapped duplicates produce degenerate fans.
        let mut first_triangle = None;
        for k in 1..polygon.len() - 1 {
            let tri = [ids[0], ids[k], ids[k + 1]];
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
                continue;
            }
            let a = &clipped.vertices()[tri[0]];
            let b = &clipped.vertices()[tri[1]];
            let c = &clipped.vertices()[tri[2]];
            if 0.5 * (b - a).cross(&(c - a)).norm() < area_tol {
                continue;
            }
            clipped.push_triangle(tri, Some(normal));
            first_triangle.get_or_insert(clipped.num_triangles() - 1);
        }

        let Some(owner) = first_triangle else {
            continue;
        };

        if !tag_planes {
            continue;
        }

        for plane in 0..6u8 {
            let bit = 1 << plane;
            // A polygon entirely in a face plane is surface on the face
            // itself, not a cap boundary.
            if polygon.iter().all(|v| v.planes & bit != 0) {
                continue;
            }
            for i in 0..polygon.len() {
                let j = (i + 1) % polygon.len();
                if polygon[i].planes & bit != 0 && polygon[j].planes & bit != 0 && ids[i] != ids[j]
                {
                    clipped.add_edge_on_plane(
                        plane as usize,
                        TaggedEdge {
                            v1: ids[i],
                            v2: ids[j],
                            triangle: owner,
                        },
                    );
                }
            }
        }
    }

    clipped
}

fn clip_triangle(
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
    bbox: &BoundingBox,
    tol: f64,
) -> Vec<ClipVertex> {
    let mut polygon: Vec<ClipVertex> = [p1, p2, p3]
        .iter()
        .map(|&p| {
            let mut planes = 0u8;
            for plane in 0..6 {
                if plane_distance(p, plane, bbox).abs() <= tol {
                    planes |= 1 << plane;
                }
            }
            ClipVertex {
                position: *p,
                planes,
            }
        })
        .collect();

    for plane in 0..6 {
        if polygon.is_empty() {
            break;
        }
        polygon = clip_against_plane(&polygon, plane, bbox, tol);
    }

    polygon
}

fn clip_against_plane(
    polygon: &[ClipVertex],
    plane: usize,
    bbox: &BoundingBox,
    tol: f64,
) -> Vec<ClipVertex> {
    let mut output = Vec::with_capacity(polygon.len() + 2);

    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[(i + 1) % polygon.len()];
        let da = plane_distance(&a.position, plane, bbox);
        let db = plane_distance(&b.position, plane, bbox);
        // On-plane vertices count as inside and are tagged.
        let a_in = da >= -tol;
        let b_in = db >= -tol;

        if a_in && b_in {
            output.push(tag_if_on(b, plane, db, tol));
        } else if a_in && !b_in {
            output.push(split_edge(&a, &b, da, db, plane));
        } else if !a_in && b_in {
            output.push(split_edge(&a, &b, da, db, plane));
            output.push(tag_if_on(b, plane, db, tol));
        }
    }

    output
}

fn tag_if_on(mut v: ClipVertex, plane: usize, distance: f64, tol: f64) -> ClipVertex {
    if distance.abs() <= tol {
        v.planes |= 1 << plane;
    }
    v
}

fn split_edge(a: &ClipVertex, b: &ClipVertex, da: f64, db: f64, plane: usize) -> ClipVertex {
    let s = da / (da - db);
    let position = Point3::from(a.position.coords + s * (b.position.coords - a.position.coords));
    // The intersection inherits tags shared by both endpoints (the edge lies
    // in those planes) plus the cutting plane.
    ClipVertex {
        position,
        planes: (a.planes & b.planes) | (1 << plane),
    }
}

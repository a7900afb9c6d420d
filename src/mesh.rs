use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

use crate::aabb::BoundingBox;
use crate::element::BoundaryIntegrationPoint;

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    fn unit_cube() -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        let corners = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        for c in &corners {
            mesh.add_vertex(Point3::new(c[0], c[1], c[2]));
        }
        // Two triangles per face, outward winding.
        let faces = [
            [0, 3, 2, 1], // -z
            [4, 5, 6, 7], // +z
            [0, 1, 5, 4], // -y
            [2, 3, 7, 6], // +y
            [0, 4, 7, 3], // -x
            [1, 2, 6, 5], // +x
        ];
        for f in &faces {
            mesh.push_triangle([f[0], f[1], f[2]], None);
            mesh.push_triangle([f[0], f[2], f[3]], None);
        }
        mesh
    }

    #[test]
    fn cube_mesh_is_consistent() {
        let mesh = unit_cube();
        assert_eq!(mesh.num_triangles(), 12);
        assert_eq!(mesh.num_vertices(), 8);
        assert!(mesh.check());

        let bbox = mesh.bounding_box();
        assert_eq!(bbox.lower, Point3::origin());
        assert_eq!(bbox.upper, Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn cube_volume_and_area() {
        let mesh = unit_cube();
        assert_relative_eq!(mesh.volume(), 1.0, epsilon = 1e-12);

        let total_area: f64 = (0..mesh.num_triangles()).map(|t| mesh.area(t)).sum();
        assert_relative_eq!(total_area, 6.0, epsilon = 1e-12);
    }

    #[test]
    fn outward_normals() {
        let mesh = unit_cube();
        for t in 0..mesh.num_triangles() {
            let n = mesh.normal(t);
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
            // Outward: the normal points away from the cube center.
            let c = mesh.center(t) - Point3::new(0.5, 0.5, 0.5);
            assert!(n.dot(&c) > 0.0);
        }
    }

    #[test]
    fn boundary_ips_reproduce_area() {
        let mesh = unit_cube();
        for method in [TriangleRule::ThreePoint, TriangleRule::SixPoint] {
            let mut area = 0.0;
            for t in 0..mesh.num_triangles() {
                for ip in mesh.boundary_ips(t, method) {
                    assert!(ip.weight > 0.0);
                    area += ip.weight;
                }
            }
            assert_relative_eq!(area, 6.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn refine_reaches_target_and_keeps_volume() {
        let mut mesh = unit_cube();
        mesh.refine(500);
        assert!(mesh.num_triangles() >= 500);
        assert_relative_eq!(mesh.volume(), 1.0, epsilon = 1e-12);
        assert!(mesh.check());
    }

    #[test]
    fn degenerate_normal_recomputed() {
        let p1 = Point3::new(0.0, 0.0, 0.0);
        let p2 = Point3::new(1.0, 0.0, 0.0);
        let p3 = Point3::new(0.0, 1.0, 0.0);
        let n = facet_normal(&p1, &p2, &p3, Some(Vector3::zeros()));
        assert_relative_eq!(n.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn vertex_map_merges_duplicates() {
        let mut mesh = TriangleMesh::new();
        let mut map = VertexMap::new(1e-9);
        let a = map.insert(&mut mesh, Point3::new(0.5, 0.5, 0.5));
        let b = map.insert(&mut mesh, Point3::new(0.5, 0.5, 0.5 + 1e-12));
        assert_eq!(a, b);
        assert_eq!(mesh.num_vertices(), 1);
    }
}

/// Gauss rules on the reference triangle, used for boundary integrals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangleRule {
    ThreePoint,
    SixPoint,
}

/// (x, y, weight) on the reference triangle {x,y >= 0, x+y <= 1}.
/// Weights sum to the reference area 1/2.
const TRI_GAUSS_3: [[f64; 3]; 3] = [
    [1.0 / 6.0, 1.0 / 6.0, 1.0 / 6.0],
    [2.0 / 3.0, 1.0 / 6.0, 1.0 / 6.0],
    [1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0],
];

const TRI_GAUSS_6: [[f64; 3]; 6] = [
    [0.445948490915965, 0.445948490915965, 0.111690794839005 / 2.0],
    [0.108103018168070, 0.445948490915965, 0.111690794839005 / 2.0],
    [0.445948490915965, 0.108103018168070, 0.111690794839005 / 2.0],
    [0.091576213509771, 0.091576213509771, 0.054975871827661 / 2.0],
    [0.816847572980459, 0.091576213509771, 0.054975871827661 / 2.0],
    [0.091576213509771, 0.816847572980459, 0.054975871827661 / 2.0],
];

/// Which of the six cell faces an edge lies on: [-x, +x, -y, +y, -z, +z].
pub type PlaneIndex = usize;

/// An edge of a clipped triangle that lies exactly on a cell face,
/// together with the id of the triangle it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedEdge {
    pub v1: usize,
    pub v2: usize,
    pub triangle: usize,
}

/// Indexed triangular surface mesh with per-triangle unit normals.
///
/// Clipped meshes additionally carry, per cell face, the edges that were
/// created on that face; cap synthesis consumes them.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    vertices: Vec<Point3<f64>>,
    triangles: Vec<[usize; 3]>,
    normals: Vec<Vector3<f64>>,
    edges_on_planes: [Vec<TaggedEdge>; 6],
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(size: usize) -> Self {
        let mut mesh = Self::new();
        mesh.vertices.reserve(size);
        mesh.triangles.reserve(size);
        mesh.normals.reserve(size);
        mesh
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn vertex_ids(&self, triangle: usize) -> [usize; 3] {
        self.triangles[triangle]
    }

    pub fn p1(&self, triangle: usize) -> &Point3<f64> {
        &self.vertices[self.triangles[triangle][0]]
    }

    pub fn p2(&self, triangle: usize) -> &Point3<f64> {
        &self.vertices[self.triangles[triangle][1]]
    }

    pub fn p3(&self, triangle: usize) -> &Point3<f64> {
        &self.vertices[self.triangles[triangle][2]]
    }

    pub fn normal(&self, triangle: usize) -> &Vector3<f64> {
        &self.normals[triangle]
    }

    pub fn add_vertex(&mut self, vertex: Point3<f64>) -> usize {
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }

    /// Append a triangle. When `normal` is `None` (or degenerate) it is
    /// recomputed from the vertex winding.
    pub fn push_triangle(&mut self, indices: [usize; 3], normal: Option<Vector3<f64>>) {
        let n = facet_normal(
            &self.vertices[indices[0]],
            &self.vertices[indices[1]],
            &self.vertices[indices[2]],
            normal,
        );
        self.triangles.push(indices);
        self.normals.push(n);
    }

    pub fn add_edge_on_plane(&mut self, plane: PlaneIndex, edge: TaggedEdge) {
        self.edges_on_planes[plane].push(edge);
    }

    pub fn edges_on_plane(&self, plane: PlaneIndex) -> &[TaggedEdge] {
        &self.edges_on_planes[plane]
    }

    pub fn area(&self, triangle: usize) -> f64 {
        let p1 = self.p1(triangle);
        let p2 = self.p2(triangle);
        let p3 = self.p3(triangle);
        0.5 * (p2 - p1).cross(&(p3 - p1)).norm()
    }

    pub fn center(&self, triangle: usize) -> Point3<f64> {
        let p1 = self.p1(triangle);
        let p2 = self.p2(triangle);
        let p3 = self.p3(triangle);
        Point3::from((p1.coords + p2.coords + p3.coords) / 3.0)
    }

    /// Vertex-wise bounding box.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for v in &self.vertices {
            bbox.extend(v);
        }
        bbox
    }

    /// Enclosed volume of a closed, outward-oriented mesh by the divergence
    /// theorem. The centroid rule is exact for planar facets.
    pub fn volume(&self) -> f64 {
        let mut volume = 0.0;
        for t in 0..self.num_triangles() {
            let c = self.center(t);
            volume += c.coords.dot(self.normal(t)) * self.area(t);
        }
        volume / 3.0
    }

    /// Boundary integration points of one triangle in global coordinates.
    /// Weights are scaled so that they sum to the triangle area.
    pub fn boundary_ips(&self, triangle: usize, rule: TriangleRule) -> Vec<BoundaryIntegrationPoint> {
        let table: &[[f64; 3]] = match rule {
            TriangleRule::ThreePoint => &TRI_GAUSS_3,
            TriangleRule::SixPoint => &TRI_GAUSS_6,
        };

        let p1 = self.p1(triangle);
        let p2 = self.p2(triangle);
        let p3 = self.p3(triangle);
        let normal = *self.normal(triangle);
        let area = self.area(triangle);

        table
            .iter()
            .map(|&[x, y, w]| {
                let position = Point3::from(
                    (1.0 - x - y) * p1.coords + x * p2.coords + y * p3.coords,
                );
                // Reference weights sum to 1/2; scale to the facet area.
                BoundaryIntegrationPoint {
                    position,
                    weight: 2.0 * w * area,
                    normal,
                }
            })
            .collect()
    }

    /// Append all triangles of `other`, deduplicating vertices through the
    /// given snapping map. Edge tags are not carried over.
    pub fn append(&mut self, other: &TriangleMesh, map: &mut VertexMap) {
        for t in 0..other.num_triangles() {
            let ids = other.vertex_ids(t);
            let new_ids = [
                map.insert(self, other.vertices[ids[0]]),
                map.insert(self, other.vertices[ids[1]]),
                map.insert(self, other.vertices[ids[2]]),
            ];
            self.push_triangle(new_ids, Some(*other.normal(t)));
        }
    }

    /// Uniformly 4-split every triangle until the mesh holds at least
    /// `min_triangles`. Edge midpoints are shared between neighbours, so a
    /// watertight mesh stays watertight.
    pub fn refine(&mut self, min_triangles: usize) {
        while self.num_triangles() < min_triangles && self.num_triangles() > 0 {
            let tol = self.bounding_box().diagonal() * crate::settings::SNAP_TOL_REL;
            let mut map = VertexMap::new(tol.max(f64::MIN_POSITIVE));
            for (i, v) in self.vertices.iter().enumerate() {
                map.register(*v, i);
            }

            let old_triangles = std::mem::take(&mut self.triangles);
            let old_normals = std::mem::take(&mut self.normals);

            for (tri, normal) in old_triangles.iter().zip(old_normals.iter()) {
                let [a, b, c] = *tri;
                let pa = self.vertices[a];
                let pb = self.vertices[b];
                let pc = self.vertices[c];
                let ab = map.insert_raw(&mut self.vertices, nalgebra::center(&pa, &pb));
                let bc = map.insert_raw(&mut self.vertices, nalgebra::center(&pb, &pc));
                let ca = map.insert_raw(&mut self.vertices, nalgebra::center(&pc, &pa));

                for t in [[a, ab, ca], [ab, b, bc], [ca, bc, c], [ab, bc, ca]] {
                    self.triangles.push(t);
                    self.normals.push(*normal);
                }
            }
        }
    }

    /// Basic consistency check: matching triangle/normal counts and
    /// in-range vertex indices.
    pub fn check(&self) -> bool {
        if self.triangles.len() != self.normals.len() {
            return false;
        }
        self.triangles
            .iter()
            .all(|t| t.iter().all(|&v| v < self.vertices.len()))
    }
}

/// Unit facet normal. A supplied normal wins unless it is degenerate, in
/// which case the normal is recomputed from the two longest edges.
pub fn facet_normal(
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
    supplied: Option<Vector3<f64>>,
) -> Vector3<f64> {
    if let Some(n) = supplied {
        let norm = n.norm();
        if norm > 1e-8 {
            return n / norm;
        }
    }

    let n = (p2 - p1).cross(&(p3 - p1));
    let norm = n.norm();
    if norm > 0.0 {
        return n / norm;
    }

    // Sliver: cross the two longest edges explicitly.
    let edges = [p2 - p1, p3 - p2, p1 - p3];
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| edges[b].norm().total_cmp(&edges[a].norm()));
    let n = edges[order[0]].cross(&edges[order[1]]);
    let norm = n.norm();
    if norm > 0.0 {
        n / norm
    } else {
        Vector3::zeros()
    }
}

/// Snapping map canonicalizing vertices that coincide within a tolerance.
#[derive(Debug)]
pub struct VertexMap {
    map: HashMap<(i64, i64, i64), usize>,
    tol: f64,
}

impl VertexMap {
    pub fn new(tol: f64) -> Self {
        assert!(tol > 0.0, "snap tolerance must be positive");
        Self {
            map: HashMap::new(),
            tol,
        }
    }

    fn key(&self, p: &Point3<f64>) -> (i64, i64, i64) {
        (
            (p.x / self.tol).round() as i64,
            (p.y / self.tol).round() as i64,
            (p.z / self.tol).round() as i64,
        )
    }

    /// Register an existing vertex without inserting.
    pub fn register(&mut self, p: Point3<f64>, id: usize) {
        let key = self.key(&p);
        self.map.entry(key).or_insert(id);
    }

    /// Canonical index of `p` in `mesh`, appending it when unseen.
    pub fn insert(&mut self, mesh: &mut TriangleMesh, p: Point3<f64>) -> usize {
        let key = self.key(&p);
        if let Some(&id) = self.map.get(&key) {
            return id;
        }
        let id = mesh.add_vertex(p);
        self.map.insert(key, id);
        id
    }

    fn insert_raw(&mut self, vertices: &mut Vec<Point3<f64>>, p: Point3<f64>) -> usize {
        let key = self.key(&p);
        if let Some(&id) = self.map.get(&key) {
            return id;
        }
        let id = vertices.len();
        vertices.push(p);
        self.map.insert(key, id);
        id
    }
}

use nalgebra::Point3;

use crate::aabb::{BoundingBox, Ray};
use crate::mesh::TriangleMesh;

#[cfg(test)]
mod tests {

    use super::*;
    use nalgebra::Vector3;

    /// A small z=0 fan of triangles for brute-force comparison.
    fn patch() -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        let n = 5;
        for j in 0..=n {
            for i in 0..=n {
                mesh.add_vertex(Point3::new(i as f64, j as f64, 0.0));
            }
        }
        let at = |i: usize, j: usize| j * (n + 1) + i;
        for j in 0..n {
            for i in 0..n {
                mesh.push_triangle([at(i, j), at(i + 1, j), at(i + 1, j + 1)], None);
                mesh.push_triangle([at(i, j), at(i + 1, j + 1), at(i, j + 1)], None);
            }
        }
        mesh
    }

    #[test]
    fn box_query_matches_brute_force() {
        let mesh = patch();
        let tree = AabbTree::new(&mesh);

        for i in 0..8 {
            let x = 0.3 + 0.55 * i as f64;
            let query = BoundingBox::new(
                Point3::new(x, 0.4, -0.5),
                Point3::new(x + 0.9, 2.7, 0.5),
            );
            let mut hits = tree.query_box(&query);
            hits.sort_unstable();

            let mut expected: Vec<usize> = (0..mesh.num_triangles())
                .filter(|&t| {
                    let b = triangle_bbox(&mesh, t);
                    query.intersects_box(&b)
                })
                .collect();
            expected.sort_unstable();
            assert_eq!(hits, expected);
        }
    }

    #[test]
    fn ray_query_contains_true_hit() {
        let mesh = patch();
        let tree = AabbTree::new(&mesh);

        let ray = Ray::new(Point3::new(2.2, 2.7, -4.0), Vector3::new(0.0, 0.0, 1.0));
        let hits = tree.query_ray(&ray);
        let actual_hit = hits.iter().any(|&t| {
            ray.intersect_triangle(mesh.p1(t), mesh.p2(t), mesh.p3(t))
                .is_some()
        });
        assert!(actual_hit);
    }

    #[test]
    fn single_triangle_tree() {
        let mut mesh = TriangleMesh::new();
        mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Point3::new(1.0, 0.0, 0.0));
        mesh.add_vertex(Point3::new(0.0, 1.0, 0.0));
        mesh.push_triangle([0, 1, 2], None);

        let tree = AabbTree::new(&mesh);
        let whole = BoundingBox::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(2.0, 2.0, 2.0));
        assert_eq!(tree.query_box(&whole), vec![0]);
    }
}

fn triangle_bbox(mesh: &TriangleMesh, triangle: usize) -> BoundingBox {
    let mut bbox = BoundingBox::empty();
    bbox.extend(mesh.p1(triangle));
    bbox.extend(mesh.p2(triangle));
    bbox.extend(mesh.p3(triangle));
    bbox
}

#[derive(Debug)]
enum NodeKind {
    Leaf(usize),
    Internal { left: usize, right: usize },
}

#[derive(Debug)]
struct Node {
    bbox: BoundingBox,
    kind: NodeKind,
}

/// Static AABB tree over the triangles of a mesh. Built once by median
/// splits along the longest axis; read-only afterwards.
#[derive(Debug)]
pub struct AabbTree {
    nodes: Vec<Node>,
    root: Option<usize>,
}

impl AabbTree {
    pub fn new(mesh: &TriangleMesh) -> Self {
        let mut items: Vec<(usize, BoundingBox, Point3<f64>)> = (0..mesh.num_triangles())
            .map(|t| {
                let bbox = triangle_bbox(mesh, t);
                let centroid = bbox.center();
                (t, bbox, centroid)
            })
            .collect();

        let mut tree = Self {
            nodes: Vec::with_capacity(items.len().saturating_mul(2)),
            root: None,
        };
        if !items.is_empty() {
            let root = tree.build(&mut items);
            tree.root = Some(root);
        }
        tree
    }

    fn build(&mut self, items: &mut [(usize, BoundingBox, Point3<f64>)]) -> usize {
        debug_assert!(!items.is_empty(), "tree node without triangles");

        let mut bbox = BoundingBox::empty();
        for (_, b, _) in items.iter() {
            bbox = bbox.union(b);
        }

        if items.len() == 1 {
            self.nodes.push(Node {
                bbox,
                kind: NodeKind::Leaf(items[0].0),
            });
            return self.nodes.len() - 1;
        }

        let axis = bbox.longest_axis();
        let mid = items.len() / 2;
        items.select_nth_unstable_by(mid, |a, b| a.2[axis].total_cmp(&b.2[axis]));

        let (left_items, right_items) = items.split_at_mut(mid);
        let left = self.build(left_items);
        let right = self.build(right_items);

        self.nodes.push(Node {
            bbox,
            kind: NodeKind::Internal { left, right },
        });
        self.nodes.len() - 1
    }

    /// Ids of triangles whose boxes overlap `query`.
    pub fn query_box(&self, query: &BoundingBox) -> Vec<usize> {
        let mut hits = Vec::new();
        let Some(root) = self.root else {
            return hits;
        };
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !query.intersects_box(&node.bbox) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf(triangle) => hits.push(triangle),
                NodeKind::Internal { left, right } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        hits
    }

    /// Ids of triangles whose boxes the ray enters.
    pub fn query_ray(&self, ray: &Ray) -> Vec<usize> {
        let mut hits = Vec::new();
        let Some(root) = self.root else {
            return hits;
        };
        let mut stack = vec![root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !ray.intersects_box(&node.bbox) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf(triangle) => hits.push(triangle),
                NodeKind::Internal { left, right } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        hits
    }
}

//! Procedural closed meshes shared by the integration tests.
#![allow(dead_code)]

use cutcell::mesh::TriangleMesh;
use nalgebra::Point3;
use std::f64::consts::PI;

/// Closed cylinder of the given radius along the z axis from `z = 0` to
/// `z = height`, centered on the axis, with outward-oriented facets.
pub fn cylinder(radius: f64, height: f64, segments: usize) -> TriangleMesh {
    let mut mesh = TriangleMesh::new();

    let bottom_ring: Vec<usize> = (0..segments)
        .map(|k| {
            let theta = 2.0 * PI * k as f64 / segments as f64;
            mesh.add_vertex(Point3::new(radius * theta.cos(), radius * theta.sin(), 0.0))
        })
        .collect();
    let top_ring: Vec<usize> = (0..segments)
        .map(|k| {
            let theta = 2.0 * PI * k as f64 / segments as f64;
            mesh.add_vertex(Point3::new(
                radius * theta.cos(),
                radius * theta.sin(),
                height,
            ))
        })
        .collect();
    let bottom_center = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
    let top_center = mesh.add_vertex(Point3::new(0.0, 0.0, height));

    for k in 0..segments {
        let next = (k + 1) % segments;
        // Lateral wall, outward radial normals.
        mesh.push_triangle([bottom_ring[k], bottom_ring[next], top_ring[next]], None);
        mesh.push_triangle([bottom_ring[k], top_ring[next], top_ring[k]], None);
        // Caps.
        mesh.push_triangle([top_center, top_ring[k], top_ring[next]], None);
        mesh.push_triangle([bottom_center, bottom_ring[next], bottom_ring[k]], None);
    }

    mesh
}

/// Closed axis-aligned cuboid with outward-oriented facets.
pub fn cuboid(lo: [f64; 3], hi: [f64; 3]) -> TriangleMesh {
    let mut mesh = TriangleMesh::new();
    for k in 0..2 {
        for j in 0..2 {
            for i in 0..2 {
                let x = if i == 0 { lo[0] } else { hi[0] };
                let y = if j == 0 { lo[1] } else { hi[1] };
                let z = if k == 0 { lo[2] } else { hi[2] };
                mesh.add_vertex(Point3::new(x, y, z));
            }
        }
    }
    let faces = [
        [0, 2, 3, 1], // z = lo
        [4, 5, 7, 6], // z = hi
        [0, 1, 5, 4], // y = lo
        [2, 6, 7, 3], // y = hi
        [0, 4, 6, 2], // x = lo
        [1, 3, 7, 5], // x = hi
    ];
    for f in &faces {
        mesh.push_triangle([f[0], f[1], f[2]], None);
        mesh.push_triangle([f[0], f[2], f[3]], None);
    }
    mesh
}

/// UV sphere about the origin appended to `mesh`. `inward` flips the
/// winding so the facets become the boundary of a cavity.
pub fn append_sphere(mesh: &mut TriangleMesh, radius: f64, segments: usize, rings: usize, inward: bool) {
    let mut grid = vec![vec![0usize; segments]; rings + 1];
    for (i, row) in grid.iter_mut().enumerate() {
        let phi = PI * i as f64 / rings as f64;
        for (j, id) in row.iter_mut().enumerate() {
            let theta = 2.0 * PI * j as f64 / segments as f64;
            *id = mesh.add_vertex(Point3::new(
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            ));
        }
    }

    for i in 0..rings {
        for j in 0..segments {
            let jn = (j + 1) % segments;
            let mut t1 = [grid[i][j], grid[i + 1][j], grid[i + 1][jn]];
            let mut t2 = [grid[i][j], grid[i + 1][jn], grid[i][jn]];
            if inward {
                t1.reverse();
                t2.reverse();
            }
            // Pole triangles collapse to zero area and are dropped.
            push_if_valid(mesh, t1);
            push_if_valid(mesh, t2);
        }
    }
}

fn push_if_valid(mesh: &mut TriangleMesh, ids: [usize; 3]) {
    if ids[0] == ids[1] || ids[1] == ids[2] || ids[2] == ids[0] {
        return;
    }
    let a = mesh.vertices()[ids[0]];
    let b = mesh.vertices()[ids[1]];
    let c = mesh.vertices()[ids[2]];
    if (b - a).cross(&(c - a)).norm() < 1e-15 {
        return;
    }
    mesh.push_triangle(ids, None);
}

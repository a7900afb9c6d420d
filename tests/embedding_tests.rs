mod common;

use cutcell::aabb::BoundingBox;
use cutcell::brep::{BRepOperator, IntersectionStatus};
use cutcell::pipeline::Pipeline;
use cutcell::settings::{IntegrationMethod, Settings};
use nalgebra::Point3;
use std::f64::consts::PI;

/// Cylinder of radius 1 and height 10 embedded in a [-1.5, 1.5]^2 x [-1, 12]
/// sampling lattice: the oracle must match the analytic membership test at
/// every lattice point.
#[test]
fn cylinder_point_oracle() {
    let mesh = common::cylinder(1.0, 10.0, 128);
    let brep = BRepOperator::new(&mesh);

    let mut checked = 0usize;
    for i in -16i32..=16 {
        for j in -16i32..=16 {
            let x = 0.09 * i as f64;
            let y = 0.09 * j as f64;
            for k in 0..=144 {
                let z = 0.09 * k as f64 - 1.0;
                let p = Point3::new(x, y, z);
                let expected = x * x + y * y < 1.0 && z > 0.0 && z < 10.0;
                assert_eq!(
                    brep.is_inside(&p),
                    expected,
                    "mismatch at ({x}, {y}, {z})"
                );
                checked += 1;
            }
        }
    }
    assert!(checked > 150_000);
}

/// Cube [-1.5, 1.5]^3 with a unit spherical cavity: sampled points are in
/// the material iff they are strictly in the cube and outside the sphere.
#[test]
fn cube_with_spherical_cavity_oracle() {
    let mut mesh = common::cuboid([-1.5, -1.5, -1.5], [1.5, 1.5, 1.5]);
    common::append_sphere(&mut mesh, 1.0, 96, 48, true);
    let brep = BRepOperator::new(&mesh);

    for i in -9i32..=9 {
        for j in -9i32..=9 {
            for k in -9i32..=9 {
                let p = Point3::new(0.15 * i as f64, 0.15 * j as f64, 0.15 * k as f64);
                let expected = p.coords.norm_squared() > 1.0;
                assert_eq!(
                    brep.is_inside(&p),
                    expected,
                    "mismatch at ({}, {}, {})",
                    p.x,
                    p.y,
                    p.z
                );
            }
        }
    }
}

/// Scenario: a single cell holding a quarter of a cylinder, p = 2, with a
/// dense boundary sampling floor. The moment-fitted rule must stay small
/// and reproduce the trimmed volume; the local surface area approaches
/// pi + 2 from below.
#[test]
fn single_cylinder_cell_moment_fit() {
    let mesh = common::cylinder(1.0, 1.0, 128);
    let settings = Settings {
        input_filename: String::new(),
        lower_bound_xyz: [0.0, 0.0, 0.0],
        upper_bound_xyz: [2.0, 2.0, 1.0],
        lower_bound_uvw: Some([0.0, 0.0, 0.0]),
        upper_bound_uvw: Some([4.0, 5.0, 3.0]),
        number_of_elements: [1, 1, 1],
        polynomial_order: [2, 2, 2],
        integration_method: IntegrationMethod::Gauss,
        embedding_flag: true,
        min_element_volume_ratio: 1e-3,
        min_num_boundary_triangles: 5000,
        moment_fitting_residual: 1e-8,
        init_point_distribution_factor: 3,
        neglect_elements_if_mesh_is_flawed: true,
        b_spline_mesh: true,
        echo_level: 0,
        output_directory_name: "cutcell_output".to_string(),
        conditions: vec![],
    };

    let mut pipeline = Pipeline::from_mesh(settings, mesh);
    let container = pipeline.run().unwrap();

    assert_eq!(container.len(), 1);
    let element = container.iter().next().unwrap();
    assert!(element.is_trimmed());

    let points = element.integration_points();
    assert!(!points.is_empty());
    assert!(points.len() < 28);
    for p in points {
        assert!(p.weight > 0.0);
    }

    let domain = element.trimmed_domain();
    let local_mesh = domain.mesh();
    assert!(local_mesh.num_triangles() > 5000);

    // Interior lateral facets stay on the cylinder barrel.
    let mut area = 0.0;
    for t in 0..local_mesh.num_triangles() {
        let c = local_mesh.center(t);
        assert!(c.z > -1e-6 && c.z < 1.0 + 1e-6);
        assert!(c.x > -1e-6 && c.y > -1e-6);
        if c.x > 1e-6 && c.y > 1e-6 && c.z > 1e-6 && c.z < 1.0 - 1e-6 {
            let radius = (c.x * c.x + c.y * c.y).sqrt();
            assert!(radius > 0.998, "off-barrel facet center at radius {radius}");
        }
        area += local_mesh.area(t);
    }
    assert!(area < 5.141592654, "area {area}");
    assert!(area > 5.135, "area {area}");

    // The fitted rule reproduces the faceted volume within the residual
    // target, and the faceted volume approximates pi / 4.
    let det_j = element.det_j();
    let fitted: f64 = points.iter().map(|p| p.weight * det_j).sum();
    let volume = domain.volume();
    assert!((fitted - volume).abs() / volume < 1e-6);
    assert!((volume - PI / 4.0).abs() < 5e-3);
}

/// Fully interior cells carry tensor Gauss rules whose weighted sum equals
/// the cell volume to machine precision.
#[test]
fn inside_cells_gauss_volume_is_exact() {
    let container = run_fully_inside_grid(IntegrationMethod::Gauss);

    assert_eq!(container.len(), 4);
    for element in container.iter() {
        assert!(!element.is_trimmed());
        assert_eq!(element.integration_points().len(), 27);
        let det_j = element.det_j();
        let volume: f64 = element
            .integration_points()
            .iter()
            .map(|p| p.weight * det_j)
            .sum();
        assert!((volume - 1.0).abs() < 1e-13, "cell volume {volume}");
    }
    assert!((container.volume_of_all_ips() - 4.0).abs() < 1e-12);
}

/// Reduced multi-cell rules thin the interior of untrimmed strips while
/// keeping the integrated volume exact.
#[test]
fn reduced_strip_rule_volume_is_exact() {
    let container = run_fully_inside_grid(IntegrationMethod::GgqReduced2);

    assert_eq!(container.len(), 4);
    let total_points: usize = container
        .iter()
        .map(|e| e.integration_points().len())
        .sum();
    // x strip of length 4: ends keep 3 points, the interior drops to 1.
    assert_eq!(total_points, 27 + 9 + 9 + 27);

    for element in container.iter() {
        for p in element.integration_points() {
            assert!(p.weight > 0.0);
        }
    }
    assert!((container.volume_of_all_ips() - 4.0).abs() < 1e-12);
}

/// The trimmed-domain oracle agrees with the global oracle for points
/// strictly inside the owning cell.
#[test]
fn trimmed_and_global_oracles_agree() {
    let mesh = common::cylinder(1.0, 1.0, 64);
    let brep = BRepOperator::new(&mesh);
    let cell = BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 1.0));

    assert_eq!(brep.classify_cell(&cell, 1e-8), IntersectionStatus::Trimmed);
    let domain = brep
        .build_trimmed_domain(&cell, 0.0, 500, false)
        .unwrap()
        .expect("quarter-cylinder cell is trimmed");

    for i in 1..20 {
        for j in 1..20 {
            for k in 1..10 {
                let p = Point3::new(0.1 * i as f64, 0.1 * j as f64, 0.1 * k as f64);
                assert_eq!(
                    brep.is_inside(&p),
                    domain.is_inside(&p),
                    "oracles disagree at ({}, {}, {})",
                    p.x,
                    p.y,
                    p.z
                );
            }
        }
    }
}

fn run_fully_inside_grid(method: IntegrationMethod) -> cutcell::container::ElementContainer {
    // Solid cuboid generously covering the whole grid.
    let mesh = common::cuboid([-0.5, -0.5, -0.5], [4.5, 1.5, 1.5]);
    let settings = Settings {
        input_filename: String::new(),
        lower_bound_xyz: [0.0, 0.0, 0.0],
        upper_bound_xyz: [4.0, 1.0, 1.0],
        lower_bound_uvw: Some([0.0, 0.0, 0.0]),
        upper_bound_uvw: Some([1.0, 1.0, 1.0]),
        number_of_elements: [4, 1, 1],
        polynomial_order: [2, 2, 2],
        integration_method: method,
        embedding_flag: true,
        min_element_volume_ratio: 1e-3,
        min_num_boundary_triangles: 100,
        moment_fitting_residual: 1e-8,
        init_point_distribution_factor: 2,
        neglect_elements_if_mesh_is_flawed: true,
        b_spline_mesh: true,
        echo_level: 0,
        output_directory_name: "cutcell_output".to_string(),
        conditions: vec![],
    };

    let mut pipeline = Pipeline::from_mesh(settings, mesh);
    pipeline.run().unwrap()
}

use ndarray::{Array1, Array2};

use crate::element::{BoundaryIntegrationPoint, Element, IntegrationPoint};
use crate::mesh::TriangleRule;
use crate::nnls::nnls;
use crate::octree::Octree;
use crate::polynomial::{f_x, f_x_int};
use crate::settings::{
    EPS_ABS_WEIGHT, EPS_REL_WEIGHT, MAX_ELIMINATION_ITERATIONS, MAX_OCTREE_LEVEL,
    MAX_SEEDING_RETRIES, MIN_NUM_POINTS, RESIDUAL_HARD_CUTOFF,
};


/// Grow the octree until it yields at least `min_num_points` candidates,
/// then return them in physical coordinates.
fn distribute_integration_points(
    octree: &mut Octree<'_>,
    min_num_points: usize,
    points_per_axis: [usize; 3],
) -> Vec<nalgebra::Point3<f64>> {
    let mut level = octree.level().max(1);
    let mut points = octree.integration_points(points_per_axis);
    while points.len() < min_num_points && level <= MAX_OCTREE_LEVEL {
        octree.refine(level);
        points = octree.integration_points(points_per_axis);
        level += 1;
    }
    points
}

/// Moment vector of the element: every shifted-Legendre basis function
/// integrated over the trimmed interior, evaluated as a surface integral
/// over the boundary points by the divergence theorem.
pub fn compute_constant_terms(
    element: &Element,
    boundary_ips: &[BoundaryIntegrationPoint],
    order: [usize; 3],
) -> Array1<f64> {
    let a = element.bounds_uvw().lower;
    let b = element.bounds_uvw().upper;
    let d_xyz = element.bounds_xyz().extents();
    let d_uvw = element.bounds_uvw().extents();
    let jacobian = [d_xyz.x / d_uvw.x, d_xyz.y / d_uvw.y, d_xyz.z / d_uvw.z];

    let number_of_functions = (order[0] + 1) * (order[1] + 1) * (order[2] + 1);
    let mut constant_terms = Array1::<f64>::zeros(number_of_functions);

    // Per-point value tables; polynomial evaluation dominates, so values
    // are computed once per point and axis.
    let mut f_u = vec![0.0; order[0] + 1];
    let mut f_int_u = vec![0.0; order[0] + 1];
    let mut f_v = vec![0.0; order[1] + 1];
    let mut f_int_v = vec![0.0; order[1] + 1];
    let mut f_w = vec![0.0; order[2] + 1];
    let mut f_int_w = vec![0.0; order[2] + 1];

    for ip in boundary_ips {
        let local = element.point_global_to_param(&ip.position);
        for i in 0..=order[0] {
            f_u[i] = f_x(local.x, i, a.x, b.x);
            f_int_u[i] = f_x_int(local.x, i, a.x, b.x);
        }
        for i in 0..=order[1] {
            f_v[i] = f_x(local.y, i, a.y, b.y);
            f_int_v[i] = f_x_int(local.y, i, a.y, b.y);
        }
        for i in 0..=order[2] {
            f_w[i] = f_x(local.z, i, a.z, b.z);
            f_int_w[i] = f_x_int(local.z, i, a.z, b.z);
        }

        let normal = ip.normal;
        let weight = ip.weight / 3.0;
        let mut row = 0;
        for iu in 0..=order[0] {
            for iv in 0..=order[1] {
                for iw in 0..=order[2] {
                    let integrand = normal.x * f_int_u[iu] * f_v[iv] * f_w[iw] * jacobian[0]
                        + normal.y * f_u[iu] * f_int_v[iv] * f_w[iw] * jacobian[1]
                        + normal.z * f_u[iu] * f_v[iv] * f_int_w[iw] * jacobian[2];
                    constant_terms[row] += integrand * weight;
                    row += 1;
                }
            }
        }
    }

    constant_terms
}

/// One NNLS fit: assemble the fitting matrix at the candidate points
/// (parametric positions), solve for nonnegative weights, write them onto
/// the candidates and return `||A w - m|| / N`.
fn solve_fitting(
    constant_terms: &Array1<f64>,
    candidates: &mut [IntegrationPoint],
    element: &Element,
    order: [usize; 3],
) -> f64 {
    let a = element.bounds_uvw().lower;
    let b = element.bounds_uvw().upper;
    let number_of_functions = (order[0] + 1) * (order[1] + 1) * (order[2] + 1);

    let mut fitting_matrix = Array2::<f64>::zeros((number_of_functions, candidates.len()));
    let mut row = 0;
    for iu in 0..=order[0] {
        for iv in 0..=order[1] {
            for iw in 0..=order[2] {
                for (col, point) in candidates.iter().enumerate() {
                    let value = f_x(point.position.x, iu, a.x, b.x)
                        * f_x(point.position.y, iv, a.y, b.y)
                        * f_x(point.position.z, iw, a.z, b.z);
                    fitting_matrix[[row, col]] = value;
                }
                row += 1;
            }
        }
    }

    let (weights, rnorm) = nnls(&fitting_matrix, constant_terms);
    for (point, &w) in candidates.iter_mut().zip(weights.iter()) {
        point.weight = w;
    }

    rnorm / number_of_functions as f64
}

/// Iterative point elimination. Returns the accepted residual and the
/// surviving points (weights not yet divided by det J).
fn point_elimination(
    constant_terms: &Array1<f64>,
    mut candidates: Vec<IntegrationPoint>,
    element: &Element,
    order: [usize; 3],
    allowed_residual: f64,
) -> (f64, Vec<IntegrationPoint>) {
    let number_of_functions = (order[0] + 1) * (order[1] + 1) * (order[2] + 1);

    let mut global_residual = f64::MIN_POSITIVE;
    let mut prev_residual = 0.0;
    let mut prev_solution: Vec<IntegrationPoint> = Vec::new();
    let mut iterations = 0usize;
    let mut point_removed = false;

    while point_removed
        || (global_residual < allowed_residual && iterations < MAX_ELIMINATION_ITERATIONS)
    {
        if candidates.is_empty() {
            break;
        }
        point_removed = false;
        global_residual = solve_fitting(constant_terms, &mut candidates, element, order);

        if iterations == 0 {
            // Keep only the N heaviest points of the first fit.
            candidates.sort_by(|p, q| q.weight.total_cmp(&p.weight));
            candidates.truncate(number_of_functions);
            point_removed = true;
        } else if global_residual < allowed_residual {
            prev_solution = candidates.clone();
            prev_residual = global_residual;

            let max_weight = candidates
                .iter()
                .fold(f64::MIN, |acc, p| acc.max(p.weight));
            let threshold = EPS_REL_WEIGHT * max_weight;

            let mut removed = 0;
            let mut i = 0;
            while i < candidates.len() {
                if candidates[i].weight < threshold && candidates.len() > MIN_NUM_POINTS {
                    candidates.remove(i);
                    point_removed = true;
                    removed += 1;
                } else {
                    i += 1;
                }
            }
            if removed == 0 && candidates.len() > MIN_NUM_POINTS {
                let (argmin, _) = candidates
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.weight.total_cmp(&b.1.weight))
                    .expect("nonempty candidate set");
                candidates.remove(argmin);
                point_removed = true;
            }
            if candidates.len() <= MIN_NUM_POINTS && !point_removed {
                iterations = MAX_ELIMINATION_ITERATIONS + 10;
            }
        }
        iterations += 1;
    }

    // Restore the last solution that met the target if the final one failed.
    if global_residual >= allowed_residual
        && !prev_solution.is_empty()
        && iterations < MAX_ELIMINATION_ITERATIONS
    {
        (prev_residual, prev_solution)
    } else {
        (global_residual, candidates)
    }
}

/// Moment-fitted cubature for a trimmed element. Seeds candidates through
/// the octree, runs NNLS with point elimination, retries with doubled
/// seeding density while the residual misses the target, and stores the
/// surviving positive-weight points (weights divided by det J) on the
/// element. Returns the final residual.
pub fn create_integration_points_trimmed(
    element: &mut Element,
    order: [usize; 3],
    residual_target: f64,
    init_distribution_factor: usize,
    echo_level: usize,
) -> f64 {
    let boundary_ips = element.trimmed_domain().boundary_ips(TriangleRule::SixPoint);
    let constant_terms = compute_constant_terms(element, &boundary_ips, order);

    let points_per_axis = [order[0] + 1, order[1] + 1, order[2] + 1];
    let base_points = (order[0] + 1) * (order[1] + 1) * (order[2] + 1);

    let mut residual = f64::MAX;
    let mut distribution_factor = init_distribution_factor;
    let mut survivors: Vec<IntegrationPoint> = Vec::new();

    let mut iteration = 0;
    while residual > residual_target && iteration < MAX_SEEDING_RETRIES {
        let seeded = {
            let domain = element.trimmed_domain();
            let mut octree = Octree::new(domain);
            let min_num_points = base_points * distribution_factor;
            distribute_integration_points(&mut octree, min_num_points, points_per_axis)
        };

        // Fresh seeds plus the survivors of the previous round.
        let mut candidates: Vec<IntegrationPoint> = seeded
            .iter()
            .map(|p| IntegrationPoint::new(element.point_global_to_param(p), 0.0))
            .collect();
        candidates.append(&mut survivors);

        let (new_residual, points) =
            point_elimination(&constant_terms, candidates, element, order, residual_target);
        residual = new_residual;
        survivors = points
            .into_iter()
            .filter(|p| p.weight >= EPS_ABS_WEIGHT)
            .collect();

        // Hopeless fits drop all points; the cell will be neglected.
        if residual > RESIDUAL_HARD_CUTOFF {
            survivors.clear();
        }

        distribution_factor *= 2;
        iteration += 1;
    }

    if residual > residual_target && echo_level > 1 {
        println!("Moment Fitting :: Targeted residual cannot be achieved: {residual:.3e}");
    }

    let det_j = element.det_j();
    let points = element.integration_points_mut();
    points.clear();
    points.extend(survivors.into_iter().map(|p| IntegrationPoint {
        position: p.position,
        // Downstream assembly multiplies by det J.
        weight: p.weight / det_j,
    }));

    residual
}

use crate::container::ElementContainer;
use crate::element::{Element, IntegrationPoint};
use crate::settings::IntegrationMethod;
use nalgebra::Point3;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::aabb::BoundingBox;
    use approx::assert_relative_eq;

    #[test]
    fn gauss_tables_integrate_monomials() {
        for n in 1..=6usize {
            let rule = gauss_points_1d(n);
            assert_eq!(rule.len(), n);
            let weight_sum: f64 = rule.iter().map(|&(_, w)| w).sum();
            assert_relative_eq!(weight_sum, 1.0, epsilon = 1e-14);

            // n points are exact up to degree 2n-1 on [0, 1].
            for degree in 0..2 * n {
                let integral: f64 = rule
                    .iter()
                    .map(|&(x, w)| w * x.powi(degree as i32))
                    .sum();
                assert_relative_eq!(
                    integral,
                    1.0 / (degree as f64 + 1.0),
                    epsilon = 1e-12,
                    max_relative = 1e-12
                );
            }
        }
    }

    #[test]
    fn tensor_rule_fills_parametric_box() {
        let mut element = Element::new(
            1,
            BoundingBox::new(Point3::origin(), Point3::new(2.0, 2.0, 2.0)),
            BoundingBox::new(Point3::origin(), Point3::new(0.5, 1.0, 0.25)),
        );
        assemble_single_element(&mut element, [2, 1, 3]);

        let points = element.integration_points();
        assert_eq!(points.len(), 3 * 2 * 4);

        // Weights sum to the parametric volume.
        let total: f64 = points.iter().map(|p| p.weight).sum();
        assert_relative_eq!(total, 0.5 * 1.0 * 0.25, epsilon = 1e-12);

        for p in points {
            assert!(p.weight > 0.0);
            assert!(p.position.x > 0.0 && p.position.x < 0.5);
            assert!(p.position.y > 0.0 && p.position.y < 1.0);
            assert!(p.position.z > 0.0 && p.position.z < 0.25);
        }
    }

    #[test]
    fn reduced_point_counts() {
        assert_eq!(points_for(IntegrationMethod::Gauss, 2, false), 3);
        assert_eq!(points_for(IntegrationMethod::GgqOptimal, 2, true), 2);
        assert_eq!(points_for(IntegrationMethod::GgqReduced1, 2, true), 2);
        assert_eq!(points_for(IntegrationMethod::GgqReduced2, 2, true), 1);
        // Strip ends always keep the full rule.
        assert_eq!(points_for(IntegrationMethod::GgqReduced2, 2, false), 3);
    }
}

/// Gauss-Legendre points on [0, 1]: `(position, weight)`, weights summing
/// to one. Orders up to 4 need at most five points; six are provided.
pub fn gauss_points_1d(num_points: usize) -> &'static [(f64, f64)] {
    match num_points {
        1 => &GAUSS_1,
        2 => &GAUSS_2,
        3 => &GAUSS_3,
        4 => &GAUSS_4,
        5 => &GAUSS_5,
        6 => &GAUSS_6,
        _ => unreachable!("no Gauss table for {num_points} points"),
    }
}

const GAUSS_1: [(f64, f64); 1] = [(0.5, 1.0)];

const GAUSS_2: [(f64, f64); 2] = [
    (0.211324865405187, 0.5),
    (0.788675134594813, 0.5),
];

const GAUSS_3: [(f64, f64); 3] = [
    (0.112701665379258, 0.277777777777778),
    (0.5, 0.444444444444444),
    (0.887298334620742, 0.277777777777778),
];

const GAUSS_4: [(f64, f64); 4] = [
    (0.069431844202974, 0.173927422568727),
    (0.330009478207572, 0.326072577431273),
    (0.669990521792428, 0.326072577431273),
    (0.930568155797026, 0.173927422568727),
];

const GAUSS_5: [(f64, f64); 5] = [
    (0.046910077030668, 0.118463442528095),
    (0.230765344947158, 0.239314335249683),
    (0.5, 0.284444444444444),
    (0.769234655052842, 0.239314335249683),
    (0.953089922969332, 0.118463442528095),
];

const GAUSS_6: [(f64, f64); 6] = [
    (0.033765242898424, 0.085662246189585),
    (0.169395306766868, 0.180380786524069),
    (0.380690406958402, 0.233956967286346),
    (0.619309593041598, 0.233956967286346),
    (0.830604693233132, 0.180380786524069),
    (0.966234757101576, 0.085662246189585),
];

/// Tensor-product Gauss rule of order `order` on the element's parametric
/// box. Replaces any previously assembled points.
pub fn assemble_single_element(element: &mut Element, order: [usize; 3]) {
    let lower = element.bounds_uvw().lower;
    let lengths = element.bounds_uvw().extents();

    let rule_u = gauss_points_1d(order[0] + 1);
    let rule_v = gauss_points_1d(order[1] + 1);
    let rule_w = gauss_points_1d(order[2] + 1);

    let points = element.integration_points_mut();
    points.clear();
    points.reserve(rule_u.len() * rule_v.len() * rule_w.len());

    for &(u, wu) in rule_u {
        for &(v, wv) in rule_v {
            for &(w, ww) in rule_w {
                points.push(IntegrationPoint::new(
                    Point3::new(
                        lower.x + lengths.x * u,
                        lower.y + lengths.y * v,
                        lower.z + lengths.z * w,
                    ),
                    wu * lengths.x * wv * lengths.y * ww * lengths.z,
                ));
            }
        }
    }
}

/// 1D point count for one element of a strip. Interior elements of a strip
/// take the reduced count; strip ends keep the full `p + 1` rule.
fn points_for(method: IntegrationMethod, order: usize, interior: bool) -> usize {
    if !interior {
        return order + 1;
    }
    match method {
        IntegrationMethod::Gauss => order + 1,
        IntegrationMethod::GgqOptimal => (order + 2) / 2,
        IntegrationMethod::GgqReduced1 => order.max(1),
        IntegrationMethod::GgqReduced2 => order.saturating_sub(1).max(1),
    }
}

/// Assemble reduced multi-cell rules for all untrimmed elements.
///
/// For every axis, contiguous strips of untrimmed active elements are
/// walked through the container's neighbor iteration; each element gets a
/// directional 1D rule whose point count depends on its position in the
/// strip, and the three directional rules are tensorized per element.
/// Trimmed elements keep their moment-fitted points.
pub fn assemble_multi_element_rules(
    container: &mut ElementContainer,
    order: [usize; 3],
    method: IntegrationMethod,
) {
    for dir in 0..3 {
        let strips = collect_strips(container, dir);
        for strip in strips {
            let len = strip.len();
            for (pos, &id) in strip.iter().enumerate() {
                let interior = len > 1 && pos > 0 && pos + 1 < len;
                let n = points_for(method, order[dir], interior);
                let rule = gauss_points_1d(n);

                let element = container.get_mut(id).expect("strip element vanished");
                let a = element.bounds_uvw().lower[dir];
                let length = element.bounds_uvw().extents()[dir];
                let points_1d = element.integration_points_1d_mut(dir);
                points_1d.clear();
                points_1d.extend(rule.iter().map(|&(x, w)| (a + length * x, w * length)));
            }
        }
    }

    // Tensorize the directional rules.
    let ids: Vec<usize> = container
        .iter()
        .filter(|e| !e.is_trimmed())
        .map(|e| e.id())
        .collect();
    for id in ids {
        let element = container.get_mut(id).expect("element vanished");
        let rule_u = element.integration_points_1d(0).to_vec();
        let rule_v = element.integration_points_1d(1).to_vec();
        let rule_w = element.integration_points_1d(2).to_vec();
        let points = element.integration_points_mut();
        points.clear();
        for &(u, wu) in &rule_u {
            for &(v, wv) in &rule_v {
                for &(w, ww) in &rule_w {
                    points.push(IntegrationPoint::new(Point3::new(u, v, w), wu * wv * ww));
                }
            }
        }
    }
}

/// Maximal runs of untrimmed active elements along `dir` (0 = x, 1 = y,
/// 2 = z), each in walk order.
fn collect_strips(container: &ElementContainer, dir: usize) -> Vec<Vec<usize>> {
    let mut strips = Vec::new();
    let mut visited = std::collections::BTreeSet::new();

    let usable = |container: &ElementContainer, id: usize| {
        container.get(id).map_or(false, |e| !e.is_trimmed())
    };

    for element in container.iter() {
        let id = element.id();
        if element.is_trimmed() || visited.contains(&id) {
            continue;
        }

        // Only start strips at their first element: skip when a usable
        // direct predecessor on this axis exists.
        let prev = container.prev_in(dir, id);
        if prev.found && container.adjacent_in(dir, prev.id, id) && usable(container, prev.id) {
            continue;
        }

        let mut strip = vec![id];
        visited.insert(id);
        let mut cursor = id;
        loop {
            let next = container.next_in(dir, cursor);
            if !next.found
                || !container.adjacent_in(dir, cursor, next.id)
                || !usable(container, next.id)
            {
                break;
            }
            strip.push(next.id);
            visited.insert(next.id);
            cursor = next.id;
        }
        strips.push(strip);
    }

    strips
}

use std::collections::BTreeMap;

use crate::element::Element;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::aabb::BoundingBox;
    use nalgebra::Point3;

    /// 3 x 4 x 2 grid with element 10 missing, as in the classic container
    /// walk scenario.
    fn test_container() -> ElementContainer {
        let mut container = ElementContainer::new([3, 4, 2]);
        for id in 1..=24 {
            if id == 10 {
                continue;
            }
            let bounds = BoundingBox::new(Point3::origin(), Point3::new(0.1, 0.1, 0.1));
            let param = BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
            container.insert(Element::new(id, bounds, param));
        }
        container
    }

    #[test]
    fn walk_x_visits_all_elements_in_order() {
        let container = test_container();
        assert_eq!(container.len(), 23);

        let mut current = 1;
        let mut active = 1;
        for i in 1..=23usize {
            let step = container.next_in(0, current);
            assert_eq!(step.id, i + 1);
            if step.id == 10 {
                assert!(!step.found);
                assert!(step.local_end);
            } else {
                assert!(step.found);
                assert_eq!(step.local_end, step.id % 3 == 0);
                // Reverse walk is the exact inverse.
                let back = container.prev_in(0, step.id);
                assert_eq!(back.id, current);
                active += 1;
            }
            current = step.id;
        }
        assert_eq!(active, 23);
    }

    #[test]
    fn walk_y_wraps_column_major() {
        let container = test_container();
        let expected_ids = [
            1, 4, 7, 10, 2, 5, 8, 11, 3, 6, 9, 12, 13, 16, 19, 22, 14, 17, 20, 23, 15, 18, 21, 24,
        ];
        let local_ends = [10, 11, 12, 22, 23, 24];

        let mut current = 1;
        for i in 1..24usize {
            let step = container.next_in(1, current);
            assert_eq!(step.id, expected_ids[i]);
            if step.id == 10 {
                assert!(!step.found);
                assert!(step.local_end);
            } else {
                assert!(step.found);
                assert_eq!(step.local_end, local_ends.contains(&step.id));
                let back = container.prev_in(1, step.id);
                assert_eq!(back.id, current);
            }
            current = step.id;
        }
    }

    #[test]
    fn walk_z_crosses_planes() {
        let container = test_container();
        // First Z step from 1 goes one plane up.
        let step = container.next_in(2, 1);
        assert_eq!(step.id, 13);
        assert!(step.found);
        assert!(step.local_end); // nz = 2: the neighbor is already the last plane

        let back = container.prev_in(2, 13);
        assert_eq!(back.id, 1);
    }

    #[test]
    fn walk_past_grid_end() {
        let container = test_container();
        let step = container.next_in(0, 24);
        assert!(!step.found);
        assert!(step.local_end);
    }

    #[test]
    fn iteration_is_id_ordered() {
        let container = test_container();
        let ids: Vec<usize> = container.iter().map(|e| e.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}

/// One step of a directional neighbor walk. `found` reports whether the
/// neighbor is an active element; `local_end` is set when the walk reached
/// the end of a grid strip on that axis (or could not proceed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkStep {
    pub id: usize,
    pub found: bool,
    pub local_end: bool,
}

/// Sparse container of active elements keyed by 1-based grid ids
/// (`id = linear index + 1`). Absent ids are Outside cells. Iteration is
/// in id order, independent of insertion order.
#[derive(Debug)]
pub struct ElementContainer {
    elements: BTreeMap<usize, Element>,
    num_elements: [usize; 3],
}

impl ElementContainer {
    pub fn new(num_elements: [usize; 3]) -> Self {
        Self {
            elements: BTreeMap::new(),
            num_elements,
        }
    }

    pub fn num_elements(&self) -> [usize; 3] {
        self.num_elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Move an element into the container.
    pub fn insert(&mut self, element: Element) {
        let previous = self.elements.insert(element.id(), element);
        assert!(previous.is_none(), "duplicate element id published");
    }

    pub fn get(&self, id: usize) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Element> {
        self.elements.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.elements.values_mut()
    }

    /// Grid coordinates of a 1-based element id.
    pub fn ijk(&self, id: usize) -> [usize; 3] {
        let [nx, ny, _] = self.num_elements;
        let index = id - 1;
        let in_plane = index % (nx * ny);
        [in_plane % nx, in_plane / nx, index / (nx * ny)]
    }

    fn id_of(&self, ijk: [usize; 3]) -> usize {
        let [nx, ny, _] = self.num_elements;
        ijk[2] * nx * ny + ijk[1] * nx + ijk[0] + 1
    }

    /// Next element along axis `dir` (0 = x, 1 = y, 2 = z). At the end of a
    /// strip the walk wraps to the start of the next strip in lexicographic
    /// order of the remaining axes; past the last strip the walk stops with
    /// `found == false`.
    pub fn next_in(&self, dir: usize, id: usize) -> WalkStep {
        let [nx, ny, nz] = self.num_elements;
        let n = [nx, ny, nz];
        let mut ijk = self.ijk(id);

        // Advance one step along dir, wrapping strip-by-strip. The wrap
        // order matches the original container: x strips advance (j, k),
        // y strips advance (i, k), z strips advance (i, j).
        let (wrap1, wrap2) = match dir {
            0 => (1, 2),
            1 => (0, 2),
            2 => (0, 1),
            _ => unreachable!("invalid walk direction"),
        };

        ijk[dir] += 1;
        if ijk[dir] == n[dir] {
            ijk[dir] = 0;
            ijk[wrap1] += 1;
            if ijk[wrap1] == n[wrap1] {
                ijk[wrap1] = 0;
                ijk[wrap2] += 1;
                if ijk[wrap2] == n[wrap2] {
                    return WalkStep {
                        id,
                        found: false,
                        local_end: true,
                    };
                }
            }
        }

        let next_id = self.id_of(ijk);
        let found = self.elements.contains_key(&next_id);
        // End of strip: the neighbor is the last element on this axis, or
        // the walk hit an inactive cell.
        let local_end = !found || ijk[dir] == n[dir] - 1;
        WalkStep {
            id: next_id,
            found,
            local_end,
        }
    }

    /// Exact inverse of `next_in`.
    pub fn prev_in(&self, dir: usize, id: usize) -> WalkStep {
        let [nx, ny, nz] = self.num_elements;
        let n = [nx, ny, nz];
        let mut ijk = self.ijk(id);

        let (wrap1, wrap2) = match dir {
            0 => (1, 2),
            1 => (0, 2),
            2 => (0, 1),
            _ => unreachable!("invalid walk direction"),
        };

        if ijk[dir] == 0 {
            ijk[dir] = n[dir] - 1;
            if ijk[wrap1] == 0 {
                ijk[wrap1] = n[wrap1] - 1;
                if ijk[wrap2] == 0 {
                    return WalkStep {
                        id,
                        found: false,
                        local_end: true,
                    };
                }
                ijk[wrap2] -= 1;
            } else {
                ijk[wrap1] -= 1;
            }
        } else {
            ijk[dir] -= 1;
        }

        let prev_id = self.id_of(ijk);
        let found = self.elements.contains_key(&prev_id);
        let local_end = !found || ijk[dir] == 0;
        WalkStep {
            id: prev_id,
            found,
            local_end,
        }
    }

    /// Whether `a` and `b` are adjacent along `dir` with all other grid
    /// coordinates equal (no strip wrap between them).
    pub fn adjacent_in(&self, dir: usize, a: usize, b: usize) -> bool {
        let pa = self.ijk(a);
        let pb = self.ijk(b);
        (0..3).all(|d| {
            if d == dir {
                pb[d] == pa[d] + 1
            } else {
                pb[d] == pa[d]
            }
        })
    }

    /// Total weighted volume of all interior integration points, det J
    /// applied per element.
    pub fn volume_of_all_ips(&self) -> f64 {
        self.iter()
            .map(|e| {
                let det_j = e.det_j();
                e.integration_points()
                    .iter()
                    .map(|p| p.weight * det_j)
                    .sum::<f64>()
            })
            .sum()
    }
}

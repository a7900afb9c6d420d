use nalgebra::Point3;

use crate::aabb::BoundingBox;
use crate::settings::Settings;

#[cfg(test)]
mod tests {

    use super::*;

    fn indexer() -> GridIndexer {
        GridIndexer::new(
            BoundingBox::new(Point3::origin(), Point3::new(3.0, 4.0, 2.0)),
            BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)),
            [3, 4, 2],
            true,
        )
    }

    #[test]
    fn linearization_is_row_major_x_fastest() {
        let grid = indexer();
        assert_eq!(grid.index_from_ijk([0, 0, 0]), 0);
        assert_eq!(grid.index_from_ijk([1, 0, 0]), 1);
        assert_eq!(grid.index_from_ijk([0, 1, 0]), 3);
        assert_eq!(grid.index_from_ijk([0, 0, 1]), 12);
        assert_eq!(grid.index_from_ijk([2, 3, 1]), 23);

        for index in 0..grid.num_total() {
            assert_eq!(grid.index_from_ijk(grid.ijk_from_index(index)), index);
        }
    }

    #[test]
    fn physical_boxes_tile_the_grid() {
        let grid = indexer();
        let bbox = grid.bbox_xyz_from_index(0);
        assert_eq!(bbox.lower, Point3::origin());
        assert_eq!(bbox.upper, Point3::new(1.0, 1.0, 1.0));

        let last = grid.bbox_xyz_from_index(grid.num_total() - 1);
        assert_eq!(last.upper, Point3::new(3.0, 4.0, 2.0));

        let total: f64 = (0..grid.num_total())
            .map(|i| grid.bbox_xyz_from_index(i).volume())
            .sum();
        assert!((total - 24.0).abs() < 1e-12);
    }

    #[test]
    fn parametric_boxes_follow_b_spline_flag() {
        let grid = indexer();
        let uvw = grid.bbox_uvw_from_index(4);
        let ijk = grid.ijk_from_index(4);
        assert!((uvw.lower.x - ijk[0] as f64 / 3.0).abs() < 1e-12);

        let flat = GridIndexer::new(
            BoundingBox::new(Point3::origin(), Point3::new(3.0, 4.0, 2.0)),
            BoundingBox::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)),
            [3, 4, 2],
            false,
        );
        // Without a B-spline mesh every element sees the whole UVW box.
        let uvw = flat.bbox_uvw_from_index(4);
        assert_eq!(uvw.lower, Point3::origin());
        assert_eq!(uvw.upper, Point3::new(1.0, 1.0, 1.0));
    }
}

/// Maps between linear cell indices, grid coordinates `(i, j, k)` and cell
/// boxes. Linearization is row-major over `(x, y, z)` with `x` fastest:
/// `index = k * nx * ny + j * nx + i`.
#[derive(Debug, Clone)]
pub struct GridIndexer {
    bounds_xyz: BoundingBox,
    bounds_uvw: BoundingBox,
    num_elements: [usize; 3],
    b_spline_mesh: bool,
}

impl GridIndexer {
    pub fn new(
        bounds_xyz: BoundingBox,
        bounds_uvw: BoundingBox,
        num_elements: [usize; 3],
        b_spline_mesh: bool,
    ) -> Self {
        Self {
            bounds_xyz,
            bounds_uvw,
            num_elements,
            b_spline_mesh,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let (lo_uvw, hi_uvw) = settings.bounds_uvw();
        Self::new(
            BoundingBox::new(
                Point3::from(settings.lower_bound_xyz),
                Point3::from(settings.upper_bound_xyz),
            ),
            BoundingBox::new(Point3::from(lo_uvw), Point3::from(hi_uvw)),
            settings.number_of_elements,
            settings.b_spline_mesh,
        )
    }

    pub fn num_elements(&self) -> [usize; 3] {
        self.num_elements
    }

    pub fn num_total(&self) -> usize {
        self.num_elements[0] * self.num_elements[1] * self.num_elements[2]
    }

    pub fn ijk_from_index(&self, index: usize) -> [usize; 3] {
        let [nx, ny, _] = self.num_elements;
        let in_plane = index % (nx * ny);
        [in_plane % nx, in_plane / nx, index / (nx * ny)]
    }

    pub fn index_from_ijk(&self, ijk: [usize; 3]) -> usize {
        let [nx, ny, _] = self.num_elements;
        ijk[2] * nx * ny + ijk[1] * nx + ijk[0]
    }

    fn sub_box(&self, bounds: &BoundingBox, ijk: [usize; 3]) -> BoundingBox {
        let extents = bounds.extents();
        let delta = [
            extents.x / self.num_elements[0] as f64,
            extents.y / self.num_elements[1] as f64,
            extents.z / self.num_elements[2] as f64,
        ];
        let lower = Point3::new(
            bounds.lower.x + delta[0] * ijk[0] as f64,
            bounds.lower.y + delta[1] * ijk[1] as f64,
            bounds.lower.z + delta[2] * ijk[2] as f64,
        );
        let upper = Point3::new(
            bounds.lower.x + delta[0] * (ijk[0] + 1) as f64,
            bounds.lower.y + delta[1] * (ijk[1] + 1) as f64,
            bounds.lower.z + delta[2] * (ijk[2] + 1) as f64,
        );
        BoundingBox::new(lower, upper)
    }

    /// Physical box of a cell.
    pub fn bbox_xyz_from_index(&self, index: usize) -> BoundingBox {
        self.sub_box(&self.bounds_xyz, self.ijk_from_index(index))
    }

    /// Parametric box of a cell. Without a B-spline mesh the whole
    /// parametric box is returned for every cell.
    pub fn bbox_uvw_from_index(&self, index: usize) -> BoundingBox {
        if self.b_spline_mesh {
            self.sub_box(&self.bounds_uvw, self.ijk_from_index(index))
        } else {
            self.bounds_uvw.clone()
        }
    }

    pub fn bounds_xyz(&self) -> &BoundingBox {
        &self.bounds_xyz
    }
}

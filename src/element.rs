use nalgebra::{Point3, Vector3};

use crate::aabb::BoundingBox;
use crate::trimmed::TrimmedDomain;

/// Interior quadrature point. Position is parametric; the weight is already
/// divided by det J, so downstream assembly multiplies by det J.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationPoint {
    pub position: Point3<f64>,
    pub weight: f64,
}

impl IntegrationPoint {
    pub fn new(position: Point3<f64>, weight: f64) -> Self {
        Self { position, weight }
    }
}

/// Quadrature point on the trimmed boundary, in physical coordinates,
/// carrying the outward unit normal of its facet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryIntegrationPoint {
    pub position: Point3<f64>,
    pub weight: f64,
    pub normal: Vector3<f64>,
}

/// One active grid cell: physical and parametric boxes, its interior
/// quadrature rule and, when trimmed, the owned trimmed domain.
#[derive(Debug)]
pub struct Element {
    id: usize,
    bounds_xyz: BoundingBox,
    bounds_uvw: BoundingBox,
    is_trimmed: bool,
    integration_points: Vec<IntegrationPoint>,
    /// Per-direction 1D rules `(position, weight)`, used by the multi-cell
    /// strip assembly.
    integration_points_1d: [Vec<(f64, f64)>; 3],
    trimmed_domain: Option<TrimmedDomain>,
}

impl Element {
    pub fn new(id: usize, bounds_xyz: BoundingBox, bounds_uvw: BoundingBox) -> Self {
        Self {
            id,
            bounds_xyz,
            bounds_uvw,
            is_trimmed: false,
            integration_points: Vec::new(),
            integration_points_1d: Default::default(),
            trimmed_domain: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn bounds_xyz(&self) -> &BoundingBox {
        &self.bounds_xyz
    }

    pub fn bounds_uvw(&self) -> &BoundingBox {
        &self.bounds_uvw
    }

    pub fn is_trimmed(&self) -> bool {
        self.is_trimmed
    }

    pub fn set_trimmed(&mut self, value: bool) {
        self.is_trimmed = value;
    }

    pub fn integration_points(&self) -> &[IntegrationPoint] {
        &self.integration_points
    }

    pub fn integration_points_mut(&mut self) -> &mut Vec<IntegrationPoint> {
        &mut self.integration_points
    }

    pub fn integration_points_1d(&self, dir: usize) -> &[(f64, f64)] {
        &self.integration_points_1d[dir]
    }

    pub fn integration_points_1d_mut(&mut self, dir: usize) -> &mut Vec<(f64, f64)> {
        &mut self.integration_points_1d[dir]
    }

    /// Determinant of the parametric-to-physical Jacobian.
    pub fn det_j(&self) -> f64 {
        let d_xyz = self.bounds_xyz.extents();
        let d_uvw = self.bounds_uvw.extents();
        (d_xyz.x * d_xyz.y * d_xyz.z) / (d_uvw.x * d_uvw.y * d_uvw.z)
    }

    /// Map a physical point into this element's parametric box.
    pub fn point_global_to_param(&self, global: &Point3<f64>) -> Point3<f64> {
        let lo_xyz = &self.bounds_xyz.lower;
        let d_xyz = self.bounds_xyz.extents();
        let lo_uvw = &self.bounds_uvw.lower;
        let d_uvw = self.bounds_uvw.extents();
        Point3::new(
            lo_uvw.x + (global.x - lo_xyz.x) / d_xyz.x * d_uvw.x,
            lo_uvw.y + (global.y - lo_xyz.y) / d_xyz.y * d_uvw.y,
            lo_uvw.z + (global.z - lo_xyz.z) / d_xyz.z * d_uvw.z,
        )
    }

    /// Map a parametric point of this element into physical space.
    pub fn point_param_to_global(&self, param: &Point3<f64>) -> Point3<f64> {
        let lo_xyz = &self.bounds_xyz.lower;
        let d_xyz = self.bounds_xyz.extents();
        let lo_uvw = &self.bounds_uvw.lower;
        let d_uvw = self.bounds_uvw.extents();
        Point3::new(
            lo_xyz.x + (param.x - lo_uvw.x) / d_uvw.x * d_xyz.x,
            lo_xyz.y + (param.y - lo_uvw.y) / d_uvw.y * d_xyz.y,
            lo_xyz.z + (param.z - lo_uvw.z) / d_uvw.z * d_xyz.z,
        )
    }

    /// Hand the trimmed domain to this element. The element owns it.
    pub fn set_trimmed_domain(&mut self, domain: TrimmedDomain) {
        self.trimmed_domain = Some(domain);
    }

    /// Trimmed domain of a trimmed element.
    ///
    /// Panics when called on an untrimmed element or before the domain was
    /// set; both are invariant violations in the pipeline.
    pub fn trimmed_domain(&self) -> &TrimmedDomain {
        assert!(self.is_trimmed, "element {} is not trimmed", self.id);
        self.trimmed_domain
            .as_ref()
            .expect("trimmed element without trimmed domain")
    }

    pub fn has_trimmed_domain(&self) -> bool {
        self.trimmed_domain.is_some()
    }
}

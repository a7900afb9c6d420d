use anyhow::Result;
use std::path::Path;

use crate::mesh::{TriangleMesh, VertexMap};
use crate::settings::{ConditionKind, ConditionSettings, SNAP_TOL_REL};
use crate::stl;

/// A boundary-condition surface (Neumann or Dirichlet) with the conforming
/// mesh accumulated from per-cell clippings.
#[derive(Debug)]
pub struct Condition {
    kind: ConditionKind,
    name: String,
    mesh: TriangleMesh,
    conforming: TriangleMesh,
    map: VertexMap,
}

impl Condition {
    pub fn from_settings(settings: &ConditionSettings) -> Result<Self> {
        let mesh = stl::read_stl(Path::new(&settings.input_filename))?;
        Ok(Self::new(settings.kind, settings.input_filename.clone(), mesh))
    }

    pub fn new(kind: ConditionKind, name: String, mesh: TriangleMesh) -> Self {
        let tol = (mesh.bounding_box().diagonal() * SNAP_TOL_REL).max(f64::MIN_POSITIVE);
        Self {
            kind,
            name,
            mesh,
            conforming: TriangleMesh::new(),
            map: VertexMap::new(tol),
        }
    }

    pub fn kind(&self) -> ConditionKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw input surface.
    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// The accumulated per-cell conforming mesh.
    pub fn conforming_mesh(&self) -> &TriangleMesh {
        &self.conforming
    }

    /// Fold one cell's clipped piece into the conforming mesh.
    pub fn add_to_conforming(&mut self, piece: &TriangleMesh) {
        self.conforming.append(piece, &mut self.map);
    }
}

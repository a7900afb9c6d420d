//! cutcell generates positive-weight cubature rules for solids embedded in
//! regular hexahedral background grids.
//!
//! A closed triangular surface mesh (STL) is classified against every grid
//! cell; untrimmed interior cells receive tensor-product Gauss rules, while
//! trimmed cells get a minimal moment-fitted rule over the cell's
//! intersection with the solid, built from a watertight local clipping of
//! the surface and a non-negative least-squares fit with iterative point
//! elimination. The output is a container of active cells carrying interior
//! and boundary integration points for embedded finite-element analysis.

pub mod aabb;
pub mod brep;
pub mod clipper;
pub mod condition;
pub mod container;
pub mod element;
pub mod grid;
pub mod mesh;
pub mod moment_fit;
pub mod nnls;
pub mod octree;
pub mod pipeline;
pub mod polynomial;
pub mod quadrature;
pub mod settings;
pub mod stl;
pub mod tree;
pub mod trimmed;
pub mod vtk;

//! Legacy-format VTK writers for debug output: the surface mesh, the
//! active hexahedral cells and the integration-point clouds.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::container::ElementContainer;
use crate::mesh::TriangleMesh;


fn header<W: Write>(writer: &mut W, title: &str) -> Result<()> {
    writeln!(writer, "# vtk DataFile Version 3.0")?;
    writeln!(writer, "{title}")?;
    writeln!(writer, "ASCII")?;
    writeln!(writer, "DATASET UNSTRUCTURED_GRID")?;
    Ok(())
}

/// Triangle surface mesh as an unstructured grid of VTK_TRIANGLE cells.
pub fn write_mesh<W: Write>(mesh: &TriangleMesh, writer: &mut W) -> Result<()> {
    header(writer, "cutcell surface mesh")?;
    writeln!(writer, "POINTS {} double", mesh.num_vertices())?;
    for v in mesh.vertices() {
        writeln!(writer, "{} {} {}", v.x, v.y, v.z)?;
    }
    let n = mesh.num_triangles();
    writeln!(writer, "CELLS {} {}", n, 4 * n)?;
    for t in 0..n {
        let ids = mesh.vertex_ids(t);
        writeln!(writer, "3 {} {} {}", ids[0], ids[1], ids[2])?;
    }
    writeln!(writer, "CELL_TYPES {n}")?;
    for _ in 0..n {
        writeln!(writer, "5")?;
    }
    Ok(())
}

/// Active cells as VTK_HEXAHEDRON cells, with the trimmed flag attached.
pub fn write_elements<W: Write>(container: &ElementContainer, writer: &mut W) -> Result<()> {
    header(writer, "cutcell active elements")?;
    let n = container.len();
    writeln!(writer, "POINTS {} double", 8 * n)?;
    for element in container.iter() {
        let b = element.bounds_xyz();
        let (lo, hi) = (&b.lower, &b.upper);
        // VTK hexahedron ordering: bottom quad, then top quad.
        for &(x, y, z) in &[
            (lo.x, lo.y, lo.z),
            (hi.x, lo.y, lo.z),
            (hi.x, hi.y, lo.z),
            (lo.x, hi.y, lo.z),
            (lo.x, lo.y, hi.z),
            (hi.x, lo.y, hi.z),
            (hi.x, hi.y, hi.z),
            (lo.x, hi.y, hi.z),
        ] {
            writeln!(writer, "{x} {y} {z}")?;
        }
    }
    writeln!(writer, "CELLS {} {}", n, 9 * n)?;
    for (i, _) in container.iter().enumerate() {
        let base = 8 * i;
        write!(writer, "8")?;
        for k in 0..8 {
            write!(writer, " {}", base + k)?;
        }
        writeln!(writer)?;
    }
    writeln!(writer, "CELL_TYPES {n}")?;
    for _ in 0..n {
        writeln!(writer, "12")?;
    }
    writeln!(writer, "CELL_DATA {n}")?;
    writeln!(writer, "SCALARS is_trimmed int 1")?;
    writeln!(writer, "LOOKUP_TABLE default")?;
    for element in container.iter() {
        writeln!(writer, "{}", element.is_trimmed() as i32)?;
    }
    Ok(())
}

/// All interior integration points as VTK_VERTEX cells with a weight
/// scalar. Positions are mapped back to physical space.
pub fn write_integration_points<W: Write>(
    container: &ElementContainer,
    writer: &mut W,
) -> Result<()> {
    header(writer, "cutcell integration points")?;
    let total: usize = container
        .iter()
        .map(|e| e.integration_points().len())
        .sum();

    writeln!(writer, "POINTS {total} double")?;
    for element in container.iter() {
        for ip in element.integration_points() {
            let p = element.point_param_to_global(&ip.position);
            writeln!(writer, "{} {} {}", p.x, p.y, p.z)?;
        }
    }
    writeln!(writer, "CELLS {} {}", total, 2 * total)?;
    for i in 0..total {
        writeln!(writer, "1 {i}")?;
    }
    writeln!(writer, "CELL_TYPES {total}")?;
    for _ in 0..total {
        writeln!(writer, "1")?;
    }
    writeln!(writer, "POINT_DATA {total}")?;
    writeln!(writer, "SCALARS weight double 1")?;
    writeln!(writer, "LOOKUP_TABLE default")?;
    for element in container.iter() {
        for ip in element.integration_points() {
            writeln!(writer, "{}", ip.weight)?;
        }
    }
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

pub fn write_mesh_file(mesh: &TriangleMesh, path: &Path) -> Result<()> {
    write_mesh(mesh, &mut create(path)?)
}

pub fn write_elements_file(container: &ElementContainer, path: &Path) -> Result<()> {
    write_elements(container, &mut create(path)?)
}

pub fn write_integration_points_file(container: &ElementContainer, path: &Path) -> Result<()> {
    write_integration_points(container, &mut create(path)?)
}

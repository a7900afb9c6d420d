use anyhow::{bail, Context, Result};
use nalgebra::{Point3, Vector3};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::mesh::{TriangleMesh, VertexMap};
use crate::settings::SNAP_TOL_REL;

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_relative_eq;

    const TETRA_ASCII: &str = "solid tetra
facet normal 0 0 -1
  outer loop
    vertex 0 0 0
    vertex 0 1 0
    vertex 1 0 0
  endloop
endfacet
facet normal 0 -1 0
  outer loop
    vertex 0 0 0
    vertex 1 0 0
    vertex 0 0 1
  endloop
endfacet
facet normal -1 0 0
  outer loop
    vertex 0 0 0
    vertex 0 0 1
    vertex 0 1 0
  endloop
endfacet
facet normal 0.57735 0.57735 0.57735
  outer loop
    vertex 1 0 0
    vertex 0 1 0
    vertex 0 0 1
  endloop
endfacet
endsolid tetra
";

    #[test]
    fn parse_ascii_tetrahedron() {
        let mesh = read_stl_bytes(TETRA_ASCII.as_bytes()).unwrap();
        assert_eq!(mesh.num_triangles(), 4);
        // Shared corners are merged through the snapping map.
        assert_eq!(mesh.num_vertices(), 4);
        assert_relative_eq!(mesh.volume(), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn binary_roundtrip_is_bit_stable() {
        let mesh = read_stl_bytes(TETRA_ASCII.as_bytes()).unwrap();

        let mut first = Vec::new();
        write_stl_binary(&mesh, &mut first).unwrap();
        let reread = read_stl_bytes(&first).unwrap();
        let mut second = Vec::new();
        write_stl_binary(&reread, &mut second).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(read_stl_bytes(b"").is_err());
        assert!(read_stl_bytes(b"solid nothing\nendsolid nothing\n").is_err());
    }

    #[test]
    fn truncated_binary_is_rejected() {
        let mesh = read_stl_bytes(TETRA_ASCII.as_bytes()).unwrap();
        let mut buf = Vec::new();
        write_stl_binary(&mesh, &mut buf).unwrap();
        buf.truncate(buf.len() - 10);
        assert!(read_stl_bytes(&buf).is_err());
    }
}

/// Read an STL file, ASCII or binary, merging duplicate vertices.
pub fn read_stl(path: &Path) -> Result<TriangleMesh> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read STL file {}", path.display()))?;
    read_stl_bytes(&bytes).with_context(|| format!("malformed STL file {}", path.display()))
}

/// Format autodetection: an STL is ASCII when its first 80 bytes contain
/// `solid`, `facet`, `normal` and a newline; everything else is binary.
fn is_ascii_stl(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(80)];
    let Ok(head) = std::str::from_utf8(head) else {
        return false;
    };
    head.contains("solid") && head.contains("facet") && head.contains("normal") && head.contains('\n')
}

pub fn read_stl_bytes(bytes: &[u8]) -> Result<TriangleMesh> {
    if bytes.is_empty() {
        bail!("empty STL input");
    }

    let facets = if is_ascii_stl(bytes) {
        parse_ascii(bytes)?
    } else {
        parse_binary(bytes)?
    };

    if facets.is_empty() {
        bail!("STL input contains no facets");
    }

    // Snap tolerance relative to the model extent.
    let mut diag: f64 = 0.0;
    let mut lo = [f64::MAX; 3];
    let mut hi = [f64::MIN; 3];
    for facet in &facets {
        for v in &facet.vertices {
            for d in 0..3 {
                lo[d] = lo[d].min(v[d]);
                hi[d] = hi[d].max(v[d]);
            }
        }
    }
    for d in 0..3 {
        diag += (hi[d] - lo[d]).powi(2);
    }
    let tol = (diag.sqrt() * SNAP_TOL_REL).max(f64::MIN_POSITIVE);

    let mut mesh = TriangleMesh::with_capacity(facets.len());
    let mut map = VertexMap::new(tol);
    for facet in &facets {
        let ids = [
            map.insert(&mut mesh, facet.vertices[0]),
            map.insert(&mut mesh, facet.vertices[1]),
            map.insert(&mut mesh, facet.vertices[2]),
        ];
        // Degenerate triangles collapse under snapping; drop them.
        if ids[0] == ids[1] || ids[1] == ids[2] || ids[2] == ids[0] {
            continue;
        }
        mesh.push_triangle(ids, Some(facet.normal));
    }

    if mesh.num_triangles() == 0 {
        bail!("STL input contains only degenerate facets");
    }

    Ok(mesh)
}

struct Facet {
    normal: Vector3<f64>,
    vertices: [Point3<f64>; 3],
}

fn next_number<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<f64> {
    let tok = tokens.next().context("unexpected end of ASCII STL")?;
    tok.parse::<f64>()
        .with_context(|| format!("expected a number, found '{}'", tok))
}

fn parse_ascii(bytes: &[u8]) -> Result<Vec<Facet>> {
    let text = std::str::from_utf8(bytes).context("ASCII STL is not valid UTF-8")?;
    let mut tokens = text.split_whitespace().peekable();

    match tokens.next() {
        Some("solid") => {}
        _ => bail!("ASCII STL must start with 'solid'"),
    }
    // Skip the optional solid name.
    while let Some(&tok) = tokens.peek() {
        if tok == "facet" || tok == "endsolid" {
            break;
        }
        tokens.next();
    }

    let mut facets = Vec::new();

    while let Some(tok) = tokens.next() {
        match tok {
            "facet" => {
                match tokens.next() {
                    Some("normal") => {}
                    other => bail!("expected 'normal' after 'facet', found {:?}", other),
                }
                let normal = Vector3::new(
                    next_number(&mut tokens)?,
                    next_number(&mut tokens)?,
                    next_number(&mut tokens)?,
                );
                match (tokens.next(), tokens.next()) {
                    (Some("outer"), Some("loop")) => {}
                    other => bail!("expected 'outer loop', found {:?}", other),
                }
                let mut vertices = [Point3::origin(); 3];
                for vertex in &mut vertices {
                    match tokens.next() {
                        Some("vertex") => {}
                        other => bail!("expected 'vertex', found {:?}", other),
                    }
                    *vertex = Point3::new(
                        next_number(&mut tokens)?,
                        next_number(&mut tokens)?,
                        next_number(&mut tokens)?,
                    );
                }
                match (tokens.next(), tokens.next()) {
                    (Some("endloop"), Some("endfacet")) => {}
                    other => bail!("expected 'endloop endfacet', found {:?}", other),
                }
                facets.push(Facet { normal, vertices });
            }
            "endsolid" => break,
            other => bail!("unexpected token '{}' in ASCII STL", other),
        }
    }

    Ok(facets)
}

fn parse_binary(bytes: &[u8]) -> Result<Vec<Facet>> {
    if bytes.len() < 84 {
        bail!("binary STL shorter than header + count");
    }
    let count = u32::from_le_bytes(bytes[80..84].try_into().unwrap()) as usize;
    let expected = 84 + count * 50;
    if bytes.len() < expected {
        bail!(
            "binary STL truncated: {} facets need {} bytes, found {}",
            count,
            expected,
            bytes.len()
        );
    }

    let read_f32 = |offset: usize| -> f64 {
        f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as f64
    };

    let mut facets = Vec::with_capacity(count);
    for i in 0..count {
        let base = 84 + i * 50;
        let normal = Vector3::new(read_f32(base), read_f32(base + 4), read_f32(base + 8));
        let mut vertices = [Point3::origin(); 3];
        for (v, vertex) in vertices.iter_mut().enumerate() {
            let o = base + 12 + v * 12;
            *vertex = Point3::new(read_f32(o), read_f32(o + 4), read_f32(o + 8));
        }
        facets.push(Facet { normal, vertices });
    }

    Ok(facets)
}

/// Write a mesh as binary STL: 80-byte header, facet count, then per facet
/// a normal, three vertices (little-endian f32) and a zero attribute word.
pub fn write_stl_binary<W: Write>(mesh: &TriangleMesh, writer: &mut W) -> Result<()> {
    let mut header = [0u8; 80];
    let tag = b"cutcell binary STL";
    header[..tag.len()].copy_from_slice(tag);
    writer.write_all(&header)?;
    writer.write_all(&(mesh.num_triangles() as u32).to_le_bytes())?;

    for t in 0..mesh.num_triangles() {
        let n = mesh.normal(t);
        for c in [n.x, n.y, n.z] {
            writer.write_all(&(c as f32).to_le_bytes())?;
        }
        for p in [mesh.p1(t), mesh.p2(t), mesh.p3(t)] {
            for c in [p.x, p.y, p.z] {
                writer.write_all(&(c as f32).to_le_bytes())?;
            }
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }

    Ok(())
}

/// Write a mesh as binary STL to a file path.
pub fn write_stl_file(mesh: &TriangleMesh, path: &Path) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create STL file {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    write_stl_binary(mesh, &mut writer)?;
    Ok(())
}

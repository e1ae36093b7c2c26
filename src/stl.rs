/// STL import — binary and ASCII.
///
/// STL is already Z-up, so triangles go through the extractor with no
/// orientation fix. Facet normals are skipped; slicing only needs the
/// vertices.
use tracing::debug;

use crate::error::{Result, SliceError};
use crate::extract::{extract_mesh, OrientationFix};
use crate::geometry::{Mesh, Triangle, Vec3};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// Detect the format and parse an STL file into a mesh.
pub fn parse_stl(data: &[u8]) -> Result<Mesh> {
    let triangles = parse_triangles(data)?;
    extract_mesh(triangles, OrientationFix::None)
}

/// Detect the format and return the raw facets.
pub fn parse_triangles(data: &[u8]) -> Result<Vec<Triangle>> {
    // Some binary exporters also start the header with "solid", so only
    // trust the prefix when the declared facet count does not fit the size.
    let binary = match declared_count(data) {
        Some(n) => !data.starts_with(b"solid") || binary_len(n) == Some(data.len()),
        None => false,
    };
    if binary {
        parse_binary(data)
    } else {
        parse_ascii(data)
    }
}

fn declared_count(data: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = data.get(HEADER_LEN..HEADER_LEN + 4)?.try_into().ok()?;
    usize::try_from(u32::from_le_bytes(bytes)).ok()
}

fn binary_len(count: usize) -> Option<usize> {
    count.checked_mul(FACET_LEN)?.checked_add(HEADER_LEN + 4)
}

fn read_vec3(chunk: &[u8]) -> Vec3 {
    let f = |i: usize| {
        let b = [chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]];
        f64::from(f32::from_le_bytes(b))
    };
    Vec3::new(f(0), f(4), f(8))
}

fn parse_binary(data: &[u8]) -> Result<Vec<Triangle>> {
    let count = declared_count(data).ok_or_else(|| SliceError::Stl("binary STL too short".into()))?;
    let expected = binary_len(count)
        .filter(|&n| n <= data.len())
        .ok_or_else(|| {
            SliceError::Stl(format!(
                "binary STL truncated: {count} facets declared, {} bytes present",
                data.len()
            ))
        })?;
    let triangles: Vec<Triangle> = data[HEADER_LEN + 4..expected]
        .chunks_exact(FACET_LEN)
        .map(|facet| {
            Triangle::new(
                read_vec3(&facet[12..24]),
                read_vec3(&facet[24..36]),
                read_vec3(&facet[36..48]),
            )
        })
        .collect();
    debug!(triangles = triangles.len(), "Read binary STL");
    Ok(triangles)
}

fn parse_ascii(data: &[u8]) -> Result<Vec<Triangle>> {
    let text = std::str::from_utf8(data).map_err(|e| SliceError::Stl(format!("invalid UTF-8: {e}")))?;
    let mut triangles = Vec::new();
    let mut corners: Vec<Vec3> = Vec::with_capacity(3);

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.starts_with("outer loop") {
            corners.clear();
        } else if let Some(rest) = line.strip_prefix("vertex") {
            corners.push(parse_vertex(rest).ok_or_else(|| {
                SliceError::Stl(format!("line {}: malformed vertex '{line}'", n + 1))
            })?);
        } else if line.starts_with("endloop") {
            match corners[..] {
                [a, b, c] => triangles.push(Triangle::new(a, b, c)),
                _ => {
                    return Err(SliceError::Stl(format!(
                        "line {}: facet with {} vertices",
                        n + 1,
                        corners.len()
                    )))
                }
            }
        }
    }
    debug!(triangles = triangles.len(), "Read ASCII STL");
    Ok(triangles)
}

fn parse_vertex(rest: &str) -> Option<Vec3> {
    let mut nums = rest.split_whitespace().map(|s| s.parse::<f64>().ok());
    let v = Vec3::new(nums.next()??, nums.next()??, nums.next()??);
    nums.next().is_none().then_some(v)
}

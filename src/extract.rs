/// Geometry extraction — turns an already-triangulated solid into a [`Mesh`].
///
/// Models are authored Y-up while the printer stacks layers along +Z, so
/// the extractor applies a fixed axis correction before anything is sliced.
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SliceError};
use crate::geometry::{BoundingBox, Mesh, Triangle, Vec3};

/// Axis correction applied to every vertex during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrientationFix {
    /// Rotate the frame -90° about X: model +Y becomes printer +Z and
    /// model +Z (towards the viewer) becomes printer -Y (bed front).
    #[default]
    YUpToZUp,
    /// Vertices are already Z-up (e.g. STL).
    None,
}

impl OrientationFix {
    pub fn apply(self, v: Vec3) -> Vec3 {
        match self {
            OrientationFix::YUpToZUp => Vec3::new(v.x, -v.z, v.y),
            OrientationFix::None => v,
        }
    }
}

/// Build a mesh from triangles, applying `fix` to each vertex.
///
/// Triangles with non-finite coordinates are dropped. Fails with
/// [`SliceError::EmptyGeometry`] when nothing is left.
pub fn extract_mesh<I>(triangles: I, fix: OrientationFix) -> Result<Mesh>
where
    I: IntoIterator<Item = Triangle>,
{
    let mut dropped = 0usize;
    let triangles: Vec<Triangle> = triangles
        .into_iter()
        .filter_map(|t| {
            let [a, b, c] = t.vertices().map(|v| fix.apply(v));
            if a.is_finite() && b.is_finite() && c.is_finite() {
                Some(Triangle::new(a, b, c))
            } else {
                dropped += 1;
                None
            }
        })
        .collect();

    if dropped > 0 {
        warn!(dropped, "Skipped triangles with non-finite vertices");
    }

    let bounds = BoundingBox::from_triangles(&triangles).ok_or(SliceError::EmptyGeometry)?;
    debug!(
        triangles = triangles.len(),
        min = ?bounds.min,
        max = ?bounds.max,
        "Extracted mesh"
    );
    Ok(Mesh::from_parts(triangles, bounds))
}

/// Split a flat `[x0, y0, z0, x1, …]` position buffer (three vertices per
/// triangle, as handed over by a renderer) into triangles.
pub fn triangles_from_positions(positions: &[f32]) -> Result<Vec<Triangle>> {
    if positions.len() % 9 != 0 {
        return Err(SliceError::MalformedBuffer(positions.len()));
    }
    let vertex = |c: &[f32]| Vec3::new(f64::from(c[0]), f64::from(c[1]), f64::from(c[2]));
    Ok(positions
        .chunks_exact(9)
        .map(|c| Triangle::new(vertex(&c[0..3]), vertex(&c[3..6]), vertex(&c[6..9])))
        .collect())
}

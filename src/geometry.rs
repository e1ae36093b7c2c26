/// Core geometry types for the slicing pipeline.
///
/// Everything here is in millimetres. 3-D types carry the mesh and the
/// final toolpath points; 2-D types carry the per-layer cross sections.
use serde::{Deserialize, Serialize};

// ── 3-D ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
    pub fn lerp(a: Self, b: Self, t: f64) -> Self {
        Self {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            z: a.z + (b.z - a.z) * t,
        }
    }
    pub fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Three vertices in the mesh's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

impl Triangle {
    pub fn new(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self { v0, v1, v2 }
    }
    pub fn vertices(&self) -> [Vec3; 3] {
        [self.v0, self.v1, self.v2]
    }
    pub fn min_z(&self) -> f64 {
        self.v0.z.min(self.v1.z).min(self.v2.z)
    }
    pub fn max_z(&self) -> f64 {
        self.v0.z.max(self.v1.z).max(self.v2.z)
    }
    pub fn area(&self) -> f64 {
        self.v1.sub(self.v0).cross(self.v2.sub(self.v0)).length() * 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn from_triangles(tris: &[Triangle]) -> Option<Self> {
        if tris.is_empty() {
            return None;
        }
        let mut min = Vec3::new(f64::MAX, f64::MAX, f64::MAX);
        let mut max = Vec3::new(f64::MIN, f64::MIN, f64::MIN);
        for t in tris {
            for v in t.vertices() {
                min.x = min.x.min(v.x);
                min.y = min.y.min(v.y);
                min.z = min.z.min(v.z);
                max.x = max.x.max(v.x);
                max.y = max.y.max(v.y);
                max.z = max.z.max(v.z);
            }
        }
        Some(Self { min, max })
    }

    pub fn height(&self) -> f64 {
        self.max.z - self.min.z
    }

    pub fn center_xy(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }
}

/// Triangles plus their bounding box. Only built through
/// [`crate::extract::extract_mesh`], which rejects empty input, so a mesh
/// always has at least one triangle.
#[derive(Debug, Clone, Serialize)]
pub struct Mesh {
    triangles: Vec<Triangle>,
    bounds: BoundingBox,
}

impl Mesh {
    pub(crate) fn from_parts(triangles: Vec<Triangle>, bounds: BoundingBox) -> Self {
        Self { triangles, bounds }
    }
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }
}

// ── 2-D ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
    pub fn dist(a: Self, b: Self) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }
    /// Rotate counter-clockwise about the origin.
    pub fn rotate(self, cos: f64, sin: f64) -> Self {
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2 {
    pub min: Vec2,
    pub max: Vec2,
}

impl BoundingBox2 {
    pub fn from_points<'a>(pts: impl IntoIterator<Item = &'a Vec2>) -> Option<Self> {
        let mut pts = pts.into_iter().peekable();
        pts.peek()?;
        let mut min = Vec2::new(f64::MAX, f64::MAX);
        let mut max = Vec2::new(f64::MIN, f64::MIN);
        for p in pts {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Some(Self { min, max })
    }

    /// Shrink every side by `d`; `None` once the box collapses.
    pub fn inset(&self, d: f64) -> Option<Self> {
        let min = Vec2::new(self.min.x + d, self.min.y + d);
        let max = Vec2::new(self.max.x - d, self.max.y - d);
        (min.x < max.x && min.y < max.y).then_some(Self { min, max })
    }

    /// The box as a closed counter-clockwise polyline.
    pub fn to_polyline(&self) -> Polyline {
        Polyline::new(
            vec![
                self.min,
                Vec2::new(self.max.x, self.min.y),
                self.max,
                Vec2::new(self.min.x, self.max.y),
            ],
            true,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    pub points: Vec<Vec2>,
    pub closed: bool,
}

impl Polyline {
    pub fn new(points: Vec<Vec2>, closed: bool) -> Self {
        Self { points, closed }
    }

    pub fn bounds(&self) -> Option<BoundingBox2> {
        BoundingBox2::from_points(&self.points)
    }
}

// ── Segment (used by the layer planer) ───────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment2 {
    pub a: Vec2,
    pub b: Vec2,
}

impl Segment2 {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self { a, b }
    }
    pub fn length(&self) -> f64 {
        Vec2::dist(self.a, self.b)
    }
}

// ── Toolpaths (intermediate representation) ──────────────────────────

/// What a path prints. The G-code reader only recovers `Travel` and `Wall`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Wall,
    Infill,
    Support,
    Travel,
    Skin,
}

/// An ordered run of nozzle positions tagged with extrusion intent.
///
/// Extruding paths always hold at least two points; the constructors
/// refuse anything shorter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub kind: PathKind,
    pub points: Vec<Vec3>,
    pub extruding: bool,
}

impl Path {
    pub fn extrusion(kind: PathKind, points: Vec<Vec3>) -> Option<Self> {
        (points.len() >= 2).then_some(Self {
            kind,
            points,
            extruding: true,
        })
    }

    pub fn travel(points: Vec<Vec3>) -> Option<Self> {
        (!points.is_empty()).then_some(Self {
            kind: PathKind::Travel,
            points,
            extruding: false,
        })
    }

    /// Polyline length in 3-D.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[1].sub(w[0]).length())
            .sum()
    }
}

/// One printed layer: the nozzle height and its paths in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub index: usize,
    pub z: f64,
    pub paths: Vec<Path>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_triangle_has_zero_area() {
        let t = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(2.0, 2.0, 2.0),
        );
        assert!(t.area() < 1e-12);
    }

    #[test]
    fn test_right_triangle_area() {
        let t = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 3.0, 0.0),
        );
        assert!((t.area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_inset_collapses() {
        let b = BoundingBox2 {
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(2.0, 10.0),
        };
        assert!(b.inset(0.5).is_some());
        assert!(b.inset(1.0).is_none());
    }

    #[test]
    fn test_extrusion_needs_two_points() {
        assert!(Path::extrusion(PathKind::Wall, vec![Vec3::new(0.0, 0.0, 0.0)]).is_none());
        let p = Path::extrusion(
            PathKind::Infill,
            vec![Vec3::new(0.0, 0.0, 0.2), Vec3::new(3.0, 4.0, 0.2)],
        )
        .unwrap();
        assert!(p.extruding);
        assert!((p.length() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_from_points() {
        let pts = [Vec2::new(1.0, -2.0), Vec2::new(-3.0, 4.0)];
        let b = BoundingBox2::from_points(&pts).unwrap();
        assert_eq!(b.min, Vec2::new(-3.0, -2.0));
        assert_eq!(b.max, Vec2::new(1.0, 4.0));
        assert!(BoundingBox2::from_points(&Vec::<Vec2>::new()).is_none());
    }
}

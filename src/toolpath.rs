/// Toolpath generation — walls, sparse infill and top/bottom skin.
///
/// Extension point: implement `PathStrategy` to add new wall or fill
/// styles. [`build_layer_paths`] runs the built-in strategies in emission
/// order: walls, then infill, then skin.
use tracing::trace;

use crate::config::{ContourMode, InfillPattern, SlicerSettings};
use crate::geometry::{BoundingBox2, Path, PathKind, Polyline, Segment2, Vec2, Vec3};
use crate::slicer::{stitch_contours, SlicePlane};

/// Filament diameter assumed for all extrusion math, in mm.
pub const FILAMENT_DIAMETER: f64 = 1.75;
/// Segments shorter than this (mm) are not offset into walls.
pub const MIN_SEGMENT_LENGTH: f64 = 0.1;

/// Cross-sectional area of the filament, mm².
pub fn filament_area() -> f64 {
    std::f64::consts::PI * (FILAMENT_DIAMETER / 2.0).powi(2)
}

/// Extruder advance for laying a bead `length` long, `width` wide and
/// `layer_height` tall.
pub fn extrusion_for(length: f64, width: f64, layer_height: f64) -> f64 {
    length * width * layer_height / filament_area()
}

// ── Strategy trait ───────────────────────────────────────────────────

pub trait PathStrategy {
    fn generate(&self, section: &LayerSection, ctx: &LayerContext) -> Vec<Path>;
}

/// Where a layer sits in the print and how it should be filled.
#[derive(Debug, Clone)]
pub struct LayerContext<'a> {
    pub settings: &'a SlicerSettings,
    pub index: usize,
    /// Index of the lowest plane that cuts the mesh.
    pub first_index: usize,
    /// Index of the highest plane that cuts the mesh. Planned planes above
    /// it are empty and never printed.
    pub last_index: usize,
    /// Nozzle height for this layer.
    pub z: f64,
    pub nozzle_diameter: f64,
}

impl LayerContext<'_> {
    pub fn is_first(&self) -> bool {
        self.index == self.first_index
    }
    pub fn is_last(&self) -> bool {
        self.index >= self.last_index
    }
    /// Distance from the outline to the innermost wall.
    fn wall_inset(&self) -> f64 {
        f64::from(self.settings.wall_count) * self.nozzle_diameter
    }
}

/// One layer's cross section: the raw segments, their XY extent, and the
/// stitched polylines when stitching is enabled.
#[derive(Debug, Clone)]
pub struct LayerSection {
    pub segments: Vec<Segment2>,
    pub contours: Vec<Polyline>,
    pub bounds: BoundingBox2,
}

impl LayerSection {
    pub fn new(segments: Vec<Segment2>, mode: ContourMode) -> Option<Self> {
        let bounds = BoundingBox2::from_points(segments.iter().flat_map(|s| [&s.a, &s.b]))?;
        let contours = match mode {
            ContourMode::Segments => Vec::new(),
            ContourMode::Stitched => stitch_contours(&segments),
        };
        Some(Self {
            segments,
            contours,
            bounds,
        })
    }
}

/// All paths for one planned layer.
pub fn build_layer_paths(plane: &SlicePlane, ctx: &LayerContext) -> Vec<Path> {
    let Some(section) = LayerSection::new(plane.segments.clone(), ctx.settings.contour_mode)
    else {
        return Vec::new();
    };
    let strategies: [&dyn PathStrategy; 3] = [&WallStrategy, &InfillStrategy, &SkinStrategy];
    let paths: Vec<Path> = strategies
        .iter()
        .flat_map(|s| s.generate(&section, ctx))
        .collect();
    trace!(layer = ctx.index, paths = paths.len(), "Built layer paths");
    paths
}

// ── Walls ────────────────────────────────────────────────────────────

/// One wall per configured wall count, wall `w` offset by
/// `w * nozzle_diameter`.
pub struct WallStrategy;

impl PathStrategy for WallStrategy {
    fn generate(&self, section: &LayerSection, ctx: &LayerContext) -> Vec<Path> {
        let mut paths = Vec::new();
        for w in 0..ctx.settings.wall_count {
            let dist = f64::from(w) * ctx.nozzle_diameter;
            match ctx.settings.contour_mode {
                ContourMode::Segments => {
                    paths.extend(
                        section
                            .segments
                            .iter()
                            .filter_map(|s| offset_segment(s, dist))
                            .filter_map(|s| {
                                Path::extrusion(PathKind::Wall, vec![lift(s.a, ctx.z), lift(s.b, ctx.z)])
                            }),
                    );
                }
                ContourMode::Stitched => {
                    for contour in &section.contours {
                        let mut pts: Vec<Vec3> = offset_polyline(contour, dist)
                            .into_iter()
                            .map(|p| lift(p, ctx.z))
                            .collect();
                        if contour.closed {
                            if let Some(&first) = pts.first() {
                                pts.push(first);
                            }
                        }
                        paths.extend(Path::extrusion(PathKind::Wall, pts));
                    }
                }
            }
        }
        paths
    }
}

/// Shift a segment along its left normal `(-dy, dx)`.
fn offset_segment(seg: &Segment2, dist: f64) -> Option<Segment2> {
    let len = seg.length();
    if len < MIN_SEGMENT_LENGTH {
        return None;
    }
    let nx = -(seg.b.y - seg.a.y) / len * dist;
    let ny = (seg.b.x - seg.a.x) / len * dist;
    Some(Segment2::new(
        Vec2::new(seg.a.x + nx, seg.a.y + ny),
        Vec2::new(seg.b.x + nx, seg.b.y + ny),
    ))
}

/// Offset each vertex along the averaged normal of its adjacent edges.
/// Closed polylines are offset towards their interior.
fn offset_polyline(poly: &Polyline, dist: f64) -> Vec<Vec2> {
    let pts = &poly.points;
    let n = pts.len();
    if n < 2 || dist == 0.0 {
        return pts.clone();
    }
    let dist = if poly.closed && signed_area(pts) < 0.0 {
        -dist
    } else {
        dist
    };

    (0..n)
        .map(|i| {
            let prev = match i {
                0 if poly.closed => pts[n - 1],
                0 => pts[0],
                _ => pts[i - 1],
            };
            let next = match i {
                _ if i + 1 < n => pts[i + 1],
                _ if poly.closed => pts[0],
                _ => pts[n - 1],
            };
            let dx = (pts[i].x - prev.x) + (next.x - pts[i].x);
            let dy = (pts[i].y - prev.y) + (next.y - pts[i].y);
            let len = (dx * dx + dy * dy).sqrt();
            if len < 1e-10 {
                pts[i]
            } else {
                Vec2::new(pts[i].x - dist * dy / len, pts[i].y + dist * dx / len)
            }
        })
        .collect()
}

/// Shoelace area; positive for counter-clockwise loops.
fn signed_area(pts: &[Vec2]) -> f64 {
    let n = pts.len();
    (0..n)
        .map(|i| {
            let (a, b) = (pts[i], pts[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        * 0.5
}

// ── Sparse infill ────────────────────────────────────────────────────

/// Scan-line infill for every layer strictly between the first and last.
///
/// Every pattern is built from straight scan lines. `Hexagons` only rotates
/// a single direction through 0°/60°/120° from layer to layer; it does not
/// trace hexagonal cells.
pub struct InfillStrategy;

impl PathStrategy for InfillStrategy {
    fn generate(&self, section: &LayerSection, ctx: &LayerContext) -> Vec<Path> {
        let density = ctx.settings.infill_density;
        if ctx.is_first() || ctx.is_last() || density <= 0.0 {
            return Vec::new();
        }
        let spacing = ctx.nozzle_diameter / (density / 100.0);
        let (angles, spacing): (Vec<f64>, f64) = match ctx.settings.infill_pattern {
            InfillPattern::Grid => (vec![if ctx.index % 2 == 0 { 0.0 } else { 90.0 }], spacing),
            InfillPattern::Triangles => (vec![0.0, 60.0, 120.0], spacing * 3.0),
            InfillPattern::Hexagons => (vec![[0.0, 60.0, 120.0][ctx.index % 3]], spacing),
        };
        angles
            .into_iter()
            .flat_map(|a| fill_region(section, ctx, a, spacing, PathKind::Infill))
            .collect()
    }
}

// ── Skin ─────────────────────────────────────────────────────────────

/// Solid fill for the first and last layer, which never get sparse infill.
pub struct SkinStrategy;

impl PathStrategy for SkinStrategy {
    fn generate(&self, section: &LayerSection, ctx: &LayerContext) -> Vec<Path> {
        if !(ctx.is_first() || ctx.is_last()) || ctx.settings.infill_density <= 0.0 {
            return Vec::new();
        }
        let angle = if ctx.index % 2 == 0 { 0.0 } else { 90.0 };
        fill_region(section, ctx, angle, ctx.nozzle_diameter, PathKind::Skin)
    }
}

/// Parallel scan lines at `angle_deg` clipped to the layer's fill region.
///
/// With stitched contours the region is the set of closed loops, and both
/// the spans and the outermost scan lines are pulled in by the wall inset.
/// Otherwise it is the layer's XY extent inset by the walls.
fn fill_region(
    section: &LayerSection,
    ctx: &LayerContext,
    angle_deg: f64,
    spacing: f64,
    kind: PathKind,
) -> Vec<Path> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Vec::new();
    }
    let inset = ctx.wall_inset();
    let closed: Vec<&Polyline> = section.contours.iter().filter(|c| c.closed).collect();
    let (regions, span_inset) = if closed.is_empty() {
        match section.bounds.inset(inset) {
            Some(b) => (vec![b.to_polyline()], 0.0),
            None => return Vec::new(),
        }
    } else {
        (closed.into_iter().cloned().collect(), inset)
    };

    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let rotated: Vec<Polyline> = regions
        .iter()
        .map(|r| {
            Polyline::new(
                r.points.iter().map(|p| p.rotate(cos, -sin)).collect(),
                true,
            )
        })
        .collect();
    let Some(bounds) = BoundingBox2::from_points(rotated.iter().flat_map(|r| &r.points)) else {
        return Vec::new();
    };

    let (y_start, y_end) = (bounds.min.y + span_inset, bounds.max.y - span_inset);
    if y_end < y_start {
        return Vec::new();
    }

    let mut paths = Vec::new();
    let mut forward = true;
    let steps = ((y_end - y_start) / spacing).floor() as usize;
    for k in 0..=steps {
        let y = y_start + k as f64 * spacing;
        let mut xs: Vec<f64> = rotated
            .iter()
            .flat_map(|r| scanline_intersect(r, y))
            .collect();
        xs.sort_by(f64::total_cmp);

        for pair in xs.chunks_exact(2) {
            let x0 = pair[0] + span_inset;
            let x1 = pair[1] - span_inset;
            if x1 - x0 < MIN_SEGMENT_LENGTH {
                continue;
            }
            let (from, to) = if forward { (x0, x1) } else { (x1, x0) };
            let back = |x: f64| lift(Vec2::new(x, y).rotate(cos, sin), ctx.z);
            paths.extend(Path::extrusion(kind, vec![back(from), back(to)]));
        }
        forward = !forward;
    }
    paths
}

/// X coordinates where the horizontal line at `y` crosses the polyline's edges.
fn scanline_intersect(poly: &Polyline, y: f64) -> Vec<f64> {
    let pts = &poly.points;
    let n = pts.len();
    if n < 2 {
        return Vec::new();
    }
    let mut xs = Vec::new();
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        if (a.y <= y && b.y > y) || (b.y <= y && a.y > y) {
            let t = (y - a.y) / (b.y - a.y);
            xs.push(a.x + t * (b.x - a.x));
        }
    }
    xs
}

fn lift(p: Vec2, z: f64) -> Vec3 {
    Vec3::new(p.x, p.y, z)
}

/// Layer planer — intersects a triangle mesh with horizontal planes.
///
/// Each layer is sampled at its mid-height. A triangle contributes one
/// segment to a plane only when exactly two of its edges cross it; the
/// segments are left unconnected unless a caller asks for
/// [`stitch_contours`].
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use crate::geometry::{Mesh, Polyline, Segment2, Triangle, Vec2, Vec3};

/// Edges whose endpoints differ in Z by less than this are treated as flat.
pub const Z_EPSILON: f64 = 1e-9;
/// Triangles smaller than this (mm²) contribute nothing.
const AREA_EPSILON: f64 = 1e-12;
/// Segment endpoints closer than this (mm) are the same point.
const POINT_EPSILON: f64 = 1e-9;
/// Endpoint tolerance when chaining segments into polylines.
const STITCH_EPSILON: f64 = 1e-4;

/// Raw intersection of one slicing plane with the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SlicePlane {
    pub index: usize,
    /// Height of the sampling plane in mesh coordinates.
    pub z: f64,
    pub segments: Vec<Segment2>,
}

/// `ceil(height / layer_height)`, snapping exact multiples that floating
/// point division pushes just above an integer.
pub fn layer_count(height: f64, layer_height: f64) -> usize {
    if !(height > 0.0 && layer_height > 0.0 && height.is_finite()) {
        return 0;
    }
    let n = height / layer_height;
    let nearest = n.round();
    let n = if (n - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest
    } else {
        n.ceil()
    };
    n as usize
}

/// Sampling plane for layer `index`: the middle of the layer.
pub fn plane_z(min_z: f64, index: usize, layer_height: f64) -> f64 {
    min_z + index as f64 * layer_height + layer_height / 2.0
}

/// Slice the mesh at every layer plane. Planes that cut nothing are dropped;
/// the rest come back in increasing Z order.
pub fn plan_layers(mesh: &Mesh, layer_height: f64) -> Vec<SlicePlane> {
    let count = layer_count(mesh.bounds().height(), layer_height);
    let min_z = mesh.bounds().min.z;
    let slice = |index: usize| {
        let z = plane_z(min_z, index, layer_height);
        SlicePlane {
            index,
            z,
            segments: slice_at_z(mesh, z),
        }
    };

    #[cfg(feature = "parallel")]
    let planes: Vec<SlicePlane> = (0..count).into_par_iter().map(slice).collect();
    #[cfg(not(feature = "parallel"))]
    let planes: Vec<SlicePlane> = (0..count).map(slice).collect();

    let planes: Vec<SlicePlane> = planes
        .into_iter()
        .filter(|p| {
            if p.segments.is_empty() {
                debug!(layer = p.index, z = p.z, "Skipping empty layer");
            }
            !p.segments.is_empty()
        })
        .collect();
    debug!(
        planned = count,
        non_empty = planes.len(),
        "Planned layers"
    );
    planes
}

/// Unordered intersection segments of the mesh with the plane at `z`.
pub fn slice_at_z(mesh: &Mesh, z: f64) -> Vec<Segment2> {
    mesh.triangles()
        .iter()
        .filter(|t| t.min_z() <= z && t.max_z() >= z)
        .filter_map(|t| intersect_triangle(t, z))
        .collect()
}

/// Segment where `tri` crosses the plane at `z`, if exactly two of its
/// non-flat edges straddle the plane.
pub fn intersect_triangle(tri: &Triangle, z: f64) -> Option<Segment2> {
    if tri.area() < AREA_EPSILON {
        return None;
    }
    let [v0, v1, v2] = tri.vertices();
    let mut pts: Vec<Vec2> = Vec::with_capacity(3);

    for (a, b) in [(v0, v1), (v1, v2), (v2, v0)] {
        let straddles = (a.z <= z && b.z >= z) || (a.z >= z && b.z <= z);
        if straddles && (b.z - a.z).abs() > Z_EPSILON {
            let t = (z - a.z) / (b.z - a.z);
            let ip = Vec3::lerp(a, b, t);
            pts.push(Vec2::new(ip.x, ip.y));
        }
    }

    match pts[..] {
        [a, b] if Vec2::dist(a, b) > POINT_EPSILON => Some(Segment2::new(a, b)),
        _ => None,
    }
}

/// Chain loose segments into polylines by matching endpoints.
pub fn stitch_contours(segments: &[Segment2]) -> Vec<Polyline> {
    let mut used = vec![false; segments.len()];
    let mut polylines = Vec::new();

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut chain = vec![segments[start].a, segments[start].b];
        let mut tail = segments[start].b;

        loop {
            let next = segments.iter().enumerate().find_map(|(j, s)| {
                if used[j] {
                    None
                } else if Vec2::dist(s.a, tail) < STITCH_EPSILON {
                    Some((j, s.b))
                } else if Vec2::dist(s.b, tail) < STITCH_EPSILON {
                    Some((j, s.a))
                } else {
                    None
                }
            });
            match next {
                Some((j, p)) => {
                    used[j] = true;
                    chain.push(p);
                    tail = p;
                }
                None => break,
            }
        }

        let closed = chain.len() > 3 && Vec2::dist(chain[0], tail) < STITCH_EPSILON;
        if closed {
            chain.pop();
        }
        polylines.push(Polyline::new(chain, closed));
    }
    polylines
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::extract::{extract_mesh, OrientationFix};

    /// Axis-aligned box from the origin, already Z-up, 12 triangles.
    pub(crate) fn box_mesh(w: f64, d: f64, h: f64) -> Mesh {
        let p = |x: f64, y: f64, z: f64| Vec3::new(x * w, y * d, z * h);
        let quads = [
            [p(0., 0., 0.), p(1., 0., 0.), p(1., 1., 0.), p(0., 1., 0.)],
            [p(0., 0., 1.), p(0., 1., 1.), p(1., 1., 1.), p(1., 0., 1.)],
            [p(0., 0., 0.), p(0., 0., 1.), p(1., 0., 1.), p(1., 0., 0.)],
            [p(1., 0., 0.), p(1., 0., 1.), p(1., 1., 1.), p(1., 1., 0.)],
            [p(1., 1., 0.), p(1., 1., 1.), p(0., 1., 1.), p(0., 1., 0.)],
            [p(0., 1., 0.), p(0., 1., 1.), p(0., 0., 1.), p(0., 0., 0.)],
        ];
        let tris = quads
            .iter()
            .flat_map(|q| [Triangle::new(q[0], q[1], q[2]), Triangle::new(q[0], q[2], q[3])]);
        extract_mesh(tris, OrientationFix::None).unwrap()
    }

    #[test]
    fn test_layer_count_is_ceiling() {
        assert_eq!(layer_count(20.0, 0.2), 100);
        assert_eq!(layer_count(1.0, 0.3), 4);
        assert_eq!(layer_count(0.05, 0.2), 1);
        assert_eq!(layer_count(0.0, 0.2), 0);
        assert_eq!(layer_count(10.0, 0.0), 0);
    }

    #[test]
    fn test_plane_is_mid_layer() {
        assert!((plane_z(0.0, 0, 0.2) - 0.1).abs() < 1e-12);
        assert!((plane_z(1.0, 3, 0.2) - 1.7).abs() < 1e-12);
    }

    #[test]
    fn test_box_planes() {
        let mesh = box_mesh(20.0, 20.0, 20.0);
        let planes = plan_layers(&mesh, 0.2);
        assert_eq!(planes.len(), 100);
        assert!(planes.windows(2).all(|w| w[0].z < w[1].z));
        // Two triangles per side face, top and bottom never reached.
        assert!(planes.iter().all(|p| p.segments.len() == 8));
    }

    #[test]
    fn test_segment_lies_on_plane_outline() {
        let mesh = box_mesh(10.0, 10.0, 10.0);
        let segs = slice_at_z(&mesh, 5.0);
        for s in &segs {
            for p in [s.a, s.b] {
                let on_edge = p.x.abs() < 1e-9
                    || (p.x - 10.0).abs() < 1e-9
                    || p.y.abs() < 1e-9
                    || (p.y - 10.0).abs() < 1e-9;
                assert!(on_edge, "{p:?} is not on the outline");
            }
        }
    }

    #[test]
    fn test_flat_triangle_skipped() {
        let t = Triangle::new(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        );
        assert!(intersect_triangle(&t, 1.0).is_none());
    }

    #[test]
    fn test_degenerate_triangle_contributes_nothing() {
        // Collinear vertices: zero area, yet its edges straddle the plane.
        let t = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, 2.0),
        );
        let mesh = extract_mesh([t], OrientationFix::None).unwrap();
        assert!(plan_layers(&mesh, 0.2).is_empty());
    }

    #[test]
    fn test_vertex_on_plane_yields_three_points() {
        // v2 sits on the plane, v0 and v1 on opposite sides: three hits.
        let t = Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(0.0, 2.0, 1.0),
        );
        assert!(intersect_triangle(&t, 1.0).is_none());
        assert!(intersect_triangle(&t, 0.5).is_some());
    }

    #[test]
    fn test_stitch_box_section_is_one_loop() {
        let mesh = box_mesh(10.0, 10.0, 10.0);
        let loops = stitch_contours(&slice_at_z(&mesh, 5.0));
        assert_eq!(loops.len(), 1);
        assert!(loops[0].closed);
        let b = loops[0].bounds().unwrap();
        assert!((b.max.x - b.min.x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_stitch_open_chain() {
        let segs = [
            Segment2::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0)),
            Segment2::new(Vec2::new(2.0, 0.0), Vec2::new(1.0, 0.0)),
        ];
        let lines = stitch_contours(&segs);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].closed);
        assert_eq!(lines[0].points.len(), 3);
    }
}

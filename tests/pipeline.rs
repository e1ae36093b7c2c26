//! End-to-end checks: mesh in, G-code out, G-code read back.

use approx::assert_relative_eq;
use fdmslice::config::{ContourMode, InfillPattern};
use fdmslice::extract::{extract_mesh, OrientationFix};
use fdmslice::geometry::{Layer, Mesh, PathKind, Triangle, Vec3};
use fdmslice::metrics::MetricsSource;
use fdmslice::slicer::{layer_count, plan_layers};
use fdmslice::{
    build_layers, estimate_metrics, parse_gcode, slice, CancelToken, Cancellable, SliceError,
    SlicerSettings,
};

/// Axis-aligned box authored Y-up: `h` is the height along model Y.
fn box_triangles_y_up(w: f64, h: f64, d: f64) -> Vec<Triangle> {
    let p = |x: f64, y: f64, z: f64| Vec3::new(x * w, y * h, z * d);
    let quads = [
        [p(0., 0., 0.), p(1., 0., 0.), p(1., 0., 1.), p(0., 0., 1.)],
        [p(0., 1., 0.), p(0., 1., 1.), p(1., 1., 1.), p(1., 1., 0.)],
        [p(0., 0., 0.), p(0., 1., 0.), p(1., 1., 0.), p(1., 0., 0.)],
        [p(0., 0., 1.), p(1., 0., 1.), p(1., 1., 1.), p(0., 1., 1.)],
        [p(0., 0., 0.), p(0., 0., 1.), p(0., 1., 1.), p(0., 1., 0.)],
        [p(1., 0., 0.), p(1., 1., 0.), p(1., 1., 1.), p(1., 0., 1.)],
    ];
    quads
        .iter()
        .flat_map(|q| [Triangle::new(q[0], q[1], q[2]), Triangle::new(q[0], q[2], q[3])])
        .collect()
}

fn cube(size: f64) -> Mesh {
    extract_mesh(box_triangles_y_up(size, size, size), OrientationFix::YUpToZUp).unwrap()
}

fn layers_for(mesh: &Mesh, settings: &SlicerSettings) -> Vec<Layer> {
    build_layers(mesh, settings, &mut |_: f64| {}).unwrap()
}

fn count_kind(layer: &Layer, kind: PathKind) -> usize {
    layer.paths.iter().filter(|p| p.kind == kind).count()
}

#[test]
fn test_cube_has_100_layers_without_top_and_bottom_infill() {
    let layers = layers_for(&cube(20.0), &SlicerSettings::default());
    assert_eq!(layers.len(), 100);
    assert_eq!(layers[0].index, 0);
    assert_eq!(layers[99].index, 99);
    assert_eq!(count_kind(&layers[0], PathKind::Infill), 0);
    assert_eq!(count_kind(&layers[99], PathKind::Infill), 0);
    assert!(layers[1..99].iter().all(|l| count_kind(l, PathKind::Infill) > 0));
}

#[test]
fn test_layer_count_is_ceiling_of_height() {
    assert_eq!(layer_count(20.0, 0.2), 100);
    assert_eq!(layer_count(10.0, 0.3), 34);
    assert_eq!(layer_count(0.7, 0.2), 4);

    // Sampling mid-layer, every planned plane cuts the box when the last
    // partial layer is at least half a layer tall.
    for (height, lh, expected) in [(5.0, 0.25, 20), (2.0, 0.3, 7), (0.5, 0.3, 2)] {
        let mesh = extract_mesh(box_triangles_y_up(10.0, height, 10.0), OrientationFix::YUpToZUp).unwrap();
        let settings = SlicerSettings {
            layer_height: lh,
            ..SlicerSettings::default()
        };
        assert_eq!(layer_count(height, lh), expected);
        assert_eq!(layers_for(&mesh, &settings).len(), expected, "height {height} / {lh}");
    }
}

#[test]
fn test_zero_density_has_no_infill() {
    let settings = SlicerSettings {
        infill_density: 0.0,
        ..SlicerSettings::default()
    };
    let layers = layers_for(&cube(20.0), &settings);
    assert!(layers.iter().all(|l| count_kind(l, PathKind::Infill) == 0));
    assert!(layers.iter().all(|l| count_kind(l, PathKind::Skin) == 0));
    assert!(layers.iter().all(|l| count_kind(l, PathKind::Wall) > 0));
}

#[test]
fn test_extruding_paths_have_two_points() {
    for pattern in [InfillPattern::Grid, InfillPattern::Triangles, InfillPattern::Hexagons] {
        for contour_mode in [ContourMode::Segments, ContourMode::Stitched] {
            let settings = SlicerSettings {
                infill_pattern: pattern,
                contour_mode,
                ..SlicerSettings::default()
            };
            for layer in layers_for(&cube(12.0), &settings) {
                assert!(layer
                    .paths
                    .iter()
                    .filter(|p| p.extruding)
                    .all(|p| p.points.len() >= 2));
            }
        }
    }
}

#[test]
fn test_round_trip_layers_and_heights() {
    let program = slice(&cube(10.0), &SlicerSettings::default(), &mut |_: f64| {}).unwrap();
    let layers = layers_for(&cube(10.0), &SlicerSettings::default());
    let parsed = parse_gcode(&program.to_string());
    assert_eq!(parsed.len(), layers.len());
    for (a, b) in layers.iter().zip(&parsed) {
        assert!((a.z - b.z).abs() < 1e-3, "{} vs {}", a.z, b.z);
    }
}

#[test]
fn test_slicing_is_idempotent() {
    let settings = SlicerSettings {
        infill_pattern: InfillPattern::Triangles,
        ..SlicerSettings::default()
    };
    let a = slice(&cube(15.0), &settings, &mut |_: f64| {}).unwrap().to_string();
    let b = slice(&cube(15.0), &settings, &mut |_: f64| {}).unwrap().to_string();
    assert_eq!(a, b);
}

#[test]
fn test_no_retraction_means_no_extruder_decrease() {
    let settings = SlicerSettings {
        retraction_enabled: false,
        ..SlicerSettings::default()
    };
    let program = slice(&cube(10.0), &settings, &mut |_: f64| {}).unwrap();
    let mut last_e = 0.0f64;
    for line in program.lines().iter().take_while(|l| !l.starts_with("G91")) {
        let e = line
            .split_whitespace()
            .find_map(|w| w.strip_prefix('E'))
            .and_then(|v| v.parse::<f64>().ok());
        if let Some(e) = e {
            assert!(!line.starts_with("G0"), "travel with E: {line}");
            assert!(e >= last_e, "E decreased at {line}");
            last_e = e;
        }
    }
    assert!(last_e > 0.0);
}

#[test]
fn test_retraction_pairs_retract_and_prime() {
    let program = slice(&cube(10.0), &SlicerSettings::default(), &mut |_: f64| {}).unwrap();
    let lines = program.lines();
    let retracts: Vec<usize> = lines
        .iter()
        .enumerate()
        .take_while(|(_, l)| !l.starts_with("G91"))
        .filter(|(_, l)| l.starts_with("G1 E"))
        .map(|(i, _)| i)
        .collect();
    // Every retract is followed by a travel and then a prime.
    assert!(!retracts.is_empty());
    assert_eq!(retracts.len() % 2, 0);
    for pair in retracts.chunks(2) {
        assert_eq!(pair[1], pair[0] + 2);
        assert!(lines[pair[0] + 1].starts_with("G0 X"));
    }
}

#[test]
fn test_degenerate_triangle_contributes_nothing() {
    let clean = cube(10.0);
    let mut tris = box_triangles_y_up(10.0, 10.0, 10.0);
    // Collinear along model Y, inside the box.
    tris.push(Triangle::new(
        Vec3::new(5.0, 1.0, 5.0),
        Vec3::new(5.0, 4.0, 5.0),
        Vec3::new(5.0, 9.0, 5.0),
    ));
    let dirty = extract_mesh(tris, OrientationFix::YUpToZUp).unwrap();

    let a = plan_layers(&clean, 0.2);
    let b = plan_layers(&dirty, 0.2);
    assert_eq!(a.len(), b.len());
    for (pa, pb) in a.iter().zip(&b) {
        assert_eq!(pa.segments.len(), pb.segments.len());
    }
    assert!(slice(&dirty, &SlicerSettings::default(), &mut |_: f64| {}).is_ok());
}

#[test]
fn test_empty_geometry_fails_and_can_retry() {
    let err = extract_mesh(Vec::new(), OrientationFix::YUpToZUp).unwrap_err();
    assert!(matches!(err, SliceError::EmptyGeometry));
    assert_eq!(err.to_string(), "No valid mesh to slice");
    assert!(extract_mesh(box_triangles_y_up(1.0, 1.0, 1.0), OrientationFix::YUpToZUp).is_ok());
}

#[test]
fn test_metrics_from_summary_comment() {
    let m = estimate_metrics("; filament used: 1.25m\n");
    assert_relative_eq!(m.filament.meters, 1.25);
    // 1250mm of 1.75mm filament is 3.007 cm³; at 1.24 g/cm³ that is 3.728 g.
    assert_relative_eq!(m.filament.grams, 3.728, epsilon = 1e-3);
}

#[test]
fn test_metrics_of_own_output() {
    let program = slice(&cube(10.0), &SlicerSettings::default(), &mut |_: f64| {}).unwrap();
    let m = program.metrics();
    assert_eq!(m.time_source, MetricsSource::Summary);
    assert!(m.filament.meters > 0.0);
    assert!(m.filament.grams > 0.0);
}

#[test]
fn test_parser_two_layers() {
    let code = "; header\nG28\nG90\nG1 Z0.2 F3000\nG1 X10 Y10 E1\nG1 X20 Y10 E2\nG1 Z0.4\nG1 X10 Y10 E3\n";
    let layers = parse_gcode(code);
    assert_eq!(layers.len(), 2);
    assert_relative_eq!(layers[0].z, 0.2);
    assert_relative_eq!(layers[1].z, 0.4);
}

#[test]
fn test_stitched_walls_are_closed_loops() {
    let settings = SlicerSettings {
        contour_mode: ContourMode::Stitched,
        ..SlicerSettings::default()
    };
    let layers = layers_for(&cube(10.0), &settings);
    for layer in &layers {
        let walls: Vec<_> = layer.paths.iter().filter(|p| p.kind == PathKind::Wall).collect();
        assert_eq!(walls.len(), 2);
        for w in walls {
            assert_eq!(w.points.first(), w.points.last());
        }
    }
}

#[test]
fn test_cancel_from_another_thread() {
    let token = CancelToken::new();
    token.cancel();
    let handle = std::thread::spawn(move || {
        let mut observer = Cancellable::new(|_: f64| {}, token);
        build_layers(&cube(10.0), &SlicerSettings::default(), &mut observer)
    });
    let result = handle.join().unwrap();
    assert!(matches!(result, Err(SliceError::Cancelled)));
}

/// Forward pipeline — mesh → layers → G-code, with progress and cancellation.
///
/// Planning fans out across threads (see [`plan_layers`]); toolpaths are
/// then built layer by layer in Z order so the observer sees progress in
/// order and can stop the run between layers.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::SlicerSettings;
use crate::error::{Result, SliceError};
use crate::gcode::{emit_gcode, GCodeProgram};
use crate::geometry::{Layer, Mesh};
use crate::slicer::{layer_count, plan_layers};
use crate::toolpath::{build_layer_paths, LayerContext};

/// Receives progress notifications from a running slice.
pub trait ProgressObserver {
    /// Called after each layer with the percentage done, in `[0, 100]`.
    fn on_progress(&mut self, percent: f64);

    /// Polled between layers; returning `true` aborts the slice with
    /// [`SliceError::Cancelled`].
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F: FnMut(f64)> ProgressObserver for F {
    fn on_progress(&mut self, percent: f64) {
        self(percent)
    }
}

/// Shared flag a caller flips to stop a slice from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag so the token can guard another run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A progress callback paired with a [`CancelToken`].
pub struct Cancellable<F> {
    on_progress: F,
    token: CancelToken,
}

impl<F: FnMut(f64)> Cancellable<F> {
    pub fn new(on_progress: F, token: CancelToken) -> Self {
        Self { on_progress, token }
    }
}

impl<F: FnMut(f64)> ProgressObserver for Cancellable<F> {
    fn on_progress(&mut self, percent: f64) {
        (self.on_progress)(percent)
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Plan the mesh and build every layer's paths.
///
/// Layers that end up without paths are omitted. `Layer::z` is the nozzle
/// height above the bed, `(index + 1) * layer_height`.
pub fn build_layers<O>(mesh: &Mesh, settings: &SlicerSettings, observer: &mut O) -> Result<Vec<Layer>>
where
    O: ProgressObserver + ?Sized,
{
    settings.validate()?;
    if observer.is_cancelled() {
        return Err(SliceError::Cancelled);
    }

    let h = settings.layer_height;
    let total = layer_count(mesh.bounds().height(), h);
    let planes = plan_layers(mesh, h);
    let nozzle_diameter = settings.nozzle_diameter();
    let first_index = planes.first().map_or(0, |p| p.index);
    let last_index = planes.last().map_or(0, |p| p.index);

    let mut layers = Vec::with_capacity(planes.len());
    for (done, plane) in planes.iter().enumerate() {
        if observer.is_cancelled() {
            debug!(layer = plane.index, "Slice cancelled");
            return Err(SliceError::Cancelled);
        }
        let ctx = LayerContext {
            settings,
            index: plane.index,
            first_index,
            last_index,
            z: (plane.index + 1) as f64 * h,
            nozzle_diameter,
        };
        let paths = build_layer_paths(plane, &ctx);
        if paths.is_empty() {
            debug!(layer = plane.index, "Layer produced no paths");
        } else {
            layers.push(Layer {
                index: plane.index,
                z: ctx.z,
                paths,
            });
        }
        observer.on_progress((done + 1) as f64 / planes.len() as f64 * 100.0);
    }
    if planes.is_empty() {
        observer.on_progress(100.0);
    }

    info!(
        planned = total,
        layers = layers.len(),
        paths = layers.iter().map(|l| l.paths.len()).sum::<usize>(),
        "Built layers"
    );
    Ok(layers)
}

/// Slice `mesh` into a complete G-code program.
pub fn slice<O>(mesh: &Mesh, settings: &SlicerSettings, observer: &mut O) -> Result<GCodeProgram>
where
    O: ProgressObserver + ?Sized,
{
    let layers = build_layers(mesh, settings, observer)?;
    Ok(emit_gcode(&layers, settings, mesh.bounds()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PathKind;
    use crate::slicer::tests::box_mesh;

    fn has_kind(layer: &Layer, kind: PathKind) -> bool {
        layer.paths.iter().any(|p| p.kind == kind)
    }

    #[test]
    fn test_cube_layer_heights() {
        let mesh = box_mesh(20.0, 20.0, 20.0);
        let layers = build_layers(&mesh, &SlicerSettings::default(), &mut |_: f64| {}).unwrap();
        assert_eq!(layers.len(), 100);
        assert!((layers[0].z - 0.2).abs() < 1e-9);
        assert!((layers[99].z - 20.0).abs() < 1e-9);
        assert!(layers.windows(2).all(|w| w[0].z < w[1].z));
    }

    #[test]
    fn test_first_and_last_layers_have_no_infill() {
        let mesh = box_mesh(20.0, 20.0, 20.0);
        let layers = build_layers(&mesh, &SlicerSettings::default(), &mut |_: f64| {}).unwrap();
        assert!(!has_kind(&layers[0], PathKind::Infill));
        assert!(!has_kind(&layers[99], PathKind::Infill));
        assert!(has_kind(&layers[0], PathKind::Skin));
        assert!(has_kind(&layers[50], PathKind::Infill));
        assert!(layers.iter().all(|l| has_kind(l, PathKind::Wall)));
    }

    #[test]
    fn test_top_printed_layer_is_solid_when_last_plane_is_empty() {
        // 10 / 0.3 plans 34 planes; the 34th samples above the top.
        let mesh = box_mesh(10.0, 10.0, 10.0);
        let settings = SlicerSettings {
            layer_height: 0.3,
            ..SlicerSettings::default()
        };
        let layers = build_layers(&mesh, &settings, &mut |_: f64| {}).unwrap();
        assert_eq!(layers.len(), 33);
        let top = &layers[32];
        assert_eq!(top.index, 32);
        assert!(!has_kind(top, PathKind::Infill));
        assert!(has_kind(top, PathKind::Skin));
        assert!(has_kind(&layers[31], PathKind::Infill));
    }

    #[test]
    fn test_progress_reaches_100() {
        let mesh = box_mesh(10.0, 10.0, 2.0);
        let mut seen = Vec::new();
        build_layers(&mesh, &SlicerSettings::default(), &mut |p: f64| seen.push(p)).unwrap();
        assert_eq!(seen.len(), 10);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!((seen[9] - 100.0).abs() < 1e-9);
        assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
    }

    #[test]
    fn test_cancel_between_layers() {
        let mesh = box_mesh(10.0, 10.0, 10.0);
        let token = CancelToken::new();
        let trigger = token.clone();
        let mut calls = 0;
        let mut observer = Cancellable::new(
            |_: f64| {
                calls += 1;
                trigger.cancel();
            },
            token,
        );
        let err = build_layers(&mesh, &SlicerSettings::default(), &mut observer).unwrap_err();
        assert!(matches!(err, SliceError::Cancelled));
        drop(observer);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_invalid_settings_rejected_before_slicing() {
        let mesh = box_mesh(10.0, 10.0, 10.0);
        let settings = SlicerSettings {
            layer_height: -1.0,
            ..SlicerSettings::default()
        };
        let mut called = false;
        let err = slice(&mesh, &settings, &mut |_: f64| called = true).unwrap_err();
        assert!(matches!(err, SliceError::InvalidSettings(_)));
        assert!(!called);
    }

    #[test]
    fn test_slice_emits_every_layer() {
        let mesh = box_mesh(10.0, 10.0, 1.0);
        let program = slice(&mesh, &SlicerSettings::default(), &mut |_: f64| {}).unwrap();
        let markers = program
            .lines()
            .iter()
            .filter(|l| l.starts_with(";LAYER:"))
            .count();
        assert_eq!(markers, 5);
    }
}

/// G-code reader — rebuilds layers and paths from program text for preview.
///
/// Works on any RepRap/Marlin program, ours or a third-party slicer's.
/// Layers are inferred from Z changes and paths from switches between
/// extruding (`G1` with `E`) and travel moves. The original path roles
/// (infill, skin, …) are not recoverable: extruding paths come back as
/// [`PathKind::Wall`], everything else as [`PathKind::Travel`].
use parser::{parse_line, Line};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::geometry::{PathKind, Vec3};

/// Z changes smaller than this (mm) stay on the current layer.
const Z_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GCodePath {
    pub kind: PathKind,
    pub points: Vec<Vec3>,
}

impl GCodePath {
    pub fn is_extruding(&self) -> bool {
        self.kind != PathKind::Travel
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GCodeLayer {
    pub z: f64,
    pub paths: Vec<GCodePath>,
}

/// Parse G-code text into layers. Unreadable lines are skipped.
pub fn parse_gcode(text: &str) -> Vec<GCodeLayer> {
    let mut reader = Reader::default();
    let mut skipped = 0usize;
    for (n, raw) in text.lines().enumerate() {
        match parse_line(raw) {
            Ok(line) => reader.feed(&line),
            Err(e) => {
                skipped += 1;
                trace!(line = n + 1, error = %e, "Skipping malformed G-code line");
            }
        }
    }
    let layers = reader.finish();
    debug!(layers = layers.len(), skipped, "Parsed G-code");
    layers
}

#[derive(Debug, Default)]
struct Reader {
    pos: Vec3,
    relative: bool,
    layers: Vec<GCodeLayer>,
    layer: Option<GCodeLayer>,
    path: Option<GCodePath>,
}

impl Reader {
    fn feed(&mut self, line: &Line) {
        if line.is_command('G', 90) {
            self.relative = false;
        } else if line.is_command('G', 91) {
            self.relative = true;
        } else if line.is_command('G', 92) {
            self.pos = self.target(line, false);
        } else if line.is_command('G', 28) {
            let all = ['X', 'Y', 'Z'].iter().all(|&a| line.param(a).is_none());
            let home = |axis: char, v: f64| if all || line.param(axis).is_some() { 0.0 } else { v };
            self.pos = Vec3::new(
                home('X', self.pos.x),
                home('Y', self.pos.y),
                home('Z', self.pos.z),
            );
        } else if line.is_command('G', 0) || line.is_command('G', 1) {
            self.motion(line);
        }
    }

    /// Position after applying the line's X/Y/Z words.
    fn target(&self, line: &Line, relative: bool) -> Vec3 {
        let axis = |letter: char, current: f64| match line.param(letter) {
            Some(v) if relative => current + v,
            Some(v) => v,
            None => current,
        };
        Vec3::new(
            axis('X', self.pos.x),
            axis('Y', self.pos.y),
            axis('Z', self.pos.z),
        )
    }

    fn motion(&mut self, line: &Line) {
        let moves_axis = ['X', 'Y', 'Z'].iter().any(|&a| line.param(a).is_some());
        if !moves_axis {
            return;
        }
        let next = self.target(line, self.relative);
        let extruding = line.is_command('G', 1) && line.param('E').is_some();

        if line.param('Z').is_some() && (next.z - self.pos.z).abs() > Z_TOLERANCE {
            self.close_layer();
            self.layer = Some(GCodeLayer {
                z: next.z,
                paths: Vec::new(),
            });
        }
        if self.layer.is_none() {
            self.layer = Some(GCodeLayer {
                z: next.z,
                paths: Vec::new(),
            });
        }

        let kind = if extruding {
            PathKind::Wall
        } else {
            PathKind::Travel
        };
        if self.path.as_ref().map(|p| p.kind) != Some(kind) {
            self.close_path();
            self.path = Some(GCodePath {
                kind,
                points: vec![Vec3::new(self.pos.x, self.pos.y, next.z)],
            });
        }
        if let Some(path) = self.path.as_mut() {
            if path.points.last() != Some(&next) {
                path.points.push(next);
            }
        }
        self.pos = next;
    }

    fn close_path(&mut self) {
        if let Some(path) = self.path.take() {
            if path.points.len() >= 2 {
                if let Some(layer) = self.layer.as_mut() {
                    layer.paths.push(path);
                }
            }
        }
    }

    fn close_layer(&mut self) {
        self.close_path();
        if let Some(layer) = self.layer.take() {
            if !layer.paths.is_empty() {
                self.layers.push(layer);
            }
        }
    }

    fn finish(mut self) -> Vec<GCodeLayer> {
        self.close_layer();
        self.layers
    }
}

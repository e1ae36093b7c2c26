//! fdmslice — FDM slicing engine for the browser, in WebAssembly.
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Extract      │ ──▶ │  Plan         │ ──▶ │  Toolpaths    │ ──▶ │  Emit         │
//! │  (positions / │     │  (mid-layer   │     │  (walls,      │     │  (G-code)     │
//! │   STL → Mesh) │     │   planes)     │     │   infill,     │     │               │
//! └──────────────┘     └──────────────┘     │   skin)       │     └──────┬───────┘
//!                                            └──────────────┘            │
//!                            ┌──────────────┐     ┌──────────────┐       │
//!                            │  Metrics      │ ◀── │  Reader       │ ◀─────┘
//!                            │  (time, mass) │     │  (preview)    │
//!                            └──────────────┘     └──────────────┘
//! ```
//!
//! The forward stages are plain functions chained by [`pipeline::slice`].
//! The reader and metrics stages take any RepRap/Marlin program, ours or
//! another slicer's. [`session::SliceSession`] runs the same pipeline on a
//! worker thread behind channels on native targets.

pub mod config;
pub mod error;
pub mod extract;
pub mod gcode;
pub mod geometry;
pub mod metrics;
pub mod pipeline;
pub mod reader;
#[cfg(not(target_arch = "wasm32"))]
pub mod session;
pub mod slicer;
pub mod stl;
pub mod toolpath;

pub use config::SlicerSettings;
pub use error::{Result, SliceError};
pub use gcode::GCodeProgram;
pub use metrics::{estimate_metrics, PrintMetrics};
pub use pipeline::{build_layers, slice, CancelToken, Cancellable, ProgressObserver};
pub use reader::{parse_gcode, GCodeLayer, GCodePath};

use extract::{extract_mesh, triangles_from_positions, OrientationFix};
use wasm_bindgen::prelude::*;

// ── Native entry points behind the WASM wrappers ─────────────────────

/// Slice a flat Y-up position buffer (nine floats per triangle).
pub fn slice_position_buffer<O>(positions: &[f32], config_json: &str, observer: &mut O) -> Result<String>
where
    O: ProgressObserver + ?Sized,
{
    let settings = SlicerSettings::from_json(config_json)?;
    let mesh = extract_mesh(triangles_from_positions(positions)?, OrientationFix::YUpToZUp)?;
    Ok(slice(&mesh, &settings, observer)?.to_string())
}

/// Slice an STL file (binary or ASCII).
pub fn slice_stl_bytes(data: &[u8], config_json: &str) -> Result<String> {
    let settings = SlicerSettings::from_json(config_json)?;
    let mesh = stl::parse_stl(data)?;
    Ok(slice(&mesh, &settings, &mut |_: f64| {})?.to_string())
}

/// Preview layers for G-code text, as JSON.
pub fn preview_json(text: &str) -> Result<String> {
    Ok(serde_json::to_string(&parse_gcode(text))?)
}

/// Print metrics for G-code text, as JSON.
pub fn metrics_json(text: &str) -> Result<String> {
    Ok(serde_json::to_string(&estimate_metrics(text))?)
}

// ── WASM entry points ────────────────────────────────────────────────

/// Slice a renderer's position buffer and return G-code. `on_progress`, if
/// given, is called with the percentage done after every layer.
#[wasm_bindgen]
pub fn slice_positions(
    positions: &[f32],
    config_json: &str,
    on_progress: Option<js_sys::Function>,
) -> std::result::Result<String, JsValue> {
    let mut report = |percent: f64| {
        if let Some(f) = &on_progress {
            // A throwing callback must not abort the slice.
            let _ = f.call1(&JsValue::NULL, &JsValue::from_f64(percent));
        }
    };
    slice_position_buffer(positions, config_json, &mut report).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Slice an STL file and return G-code.
#[wasm_bindgen]
pub fn slice_stl(data: &[u8], config_json: &str) -> std::result::Result<String, JsValue> {
    slice_stl_bytes(data, config_json).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Layers and paths of a G-code program as JSON, for the 3-D preview.
#[wasm_bindgen]
pub fn preview_gcode(text: &str) -> std::result::Result<String, JsValue> {
    preview_json(text).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// `{time: {hours, minutes}, filament: {meters, grams}, …}` as JSON.
#[wasm_bindgen]
pub fn print_metrics(text: &str) -> std::result::Result<String, JsValue> {
    metrics_json(text).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// G-code emitter (RepRap/Marlin flavour).
///
/// Walks the layers in order and writes a single linear program:
/// home → heat → print every layer → cool down. Extruder bookkeeping lives
/// in an [`EmitterState`] threaded through the per-layer and per-path
/// calls; nothing survives past one [`emit_gcode`] call.
use std::fmt;

use tracing::info;

use crate::config::{FilamentPreset, PrinterPreset, SlicerSettings};
use crate::geometry::{BoundingBox, Layer, Path, Vec2, Vec3};
use crate::metrics::{estimate_metrics, PrintMetrics};
use crate::toolpath::extrusion_for;

/// Height the nozzle is parked at before the first layer, mm.
const START_LIFT_Z: f64 = 5.0;
/// Relative lift and retract used when the print ends, mm.
const END_LIFT_Z: f64 = 10.0;
const END_RETRACT: f64 = 2.0;

/// The finished program, one entry per line without line terminators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GCodeProgram {
    lines: Vec<String>,
}

impl GCodeProgram {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Time and filament figures, read back from the footer.
    pub fn metrics(&self) -> PrintMetrics {
        estimate_metrics(&self.to_string())
    }

    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn comment(&mut self, text: impl fmt::Display) {
        self.lines.push(format!("; {text}"));
    }
}

impl fmt::Display for GCodeProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Extruder and motion bookkeeping for one emission pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmitterState {
    /// Absolute `E` position last written.
    pub cumulative_e: f64,
    pub is_retracted: bool,
    /// Filament actually laid down, excluding retract/prime pairs.
    pub extruded: f64,
    /// Rough motion time so far, seconds.
    pub seconds: f64,
    position: Option<Vec2>,
}

impl EmitterState {
    fn travel_to(&mut self, p: Vec2, speed: f64) {
        if let Some(from) = self.position {
            self.seconds += Vec2::dist(from, p) / speed;
        }
        self.position = Some(p);
    }
}

/// Everything the per-layer and per-path writers read but never change.
struct EmitContext<'a> {
    settings: &'a SlicerSettings,
    printer: PrinterPreset,
    filament: FilamentPreset,
    /// XY translation that centres the model on the bed.
    offset: Vec2,
}

impl EmitContext<'_> {
    fn place(&self, p: Vec3) -> Vec2 {
        Vec2::new(p.x + self.offset.x, p.y + self.offset.y)
    }
    fn travel_feed(&self) -> f64 {
        self.settings.travel_speed * 60.0
    }
    fn print_feed(&self) -> f64 {
        self.settings.print_speed * 60.0
    }
    fn retract_feed(&self) -> f64 {
        self.settings.retraction_speed * 60.0
    }
}

/// Translation that moves the centre of `bounds` to the centre of the bed.
pub fn bed_offset(bounds: &BoundingBox, printer: &PrinterPreset) -> Vec2 {
    let center = bounds.center_xy();
    Vec2::new(
        printer.bed_width / 2.0 - center.x,
        printer.bed_depth / 2.0 - center.y,
    )
}

/// Emit the full program for `layers` (already in increasing Z order).
///
/// `bounds` is the sliced mesh's bounding box, used only to centre the
/// model on the bed. An empty layer list yields a start/end-only program.
pub fn emit_gcode(layers: &[Layer], settings: &SlicerSettings, bounds: &BoundingBox) -> GCodeProgram {
    let printer = settings.printer.preset();
    let ctx = EmitContext {
        settings,
        offset: bed_offset(bounds, &printer),
        printer,
        filament: settings.filament.preset(),
    };
    let mut out = GCodeProgram::default();
    let mut state = EmitterState::default();

    emit_header(&mut out, &ctx, layers.len());
    emit_startup(&mut out, &ctx);
    for layer in layers {
        emit_layer(&mut out, &mut state, layer, &ctx);
    }
    emit_shutdown(&mut out, &ctx);

    out.comment(format_args!("filament used: {:.3}m", state.extruded / 1000.0));
    out.comment(format_args!(
        "estimated printing time (seconds): {:.0}",
        state.seconds
    ));

    info!(
        lines = out.lines.len(),
        layers = layers.len(),
        filament_mm = format!("{:.1}", state.extruded),
        seconds = format!("{:.0}", state.seconds),
        "Emitted G-code"
    );
    out
}

fn emit_header(out: &mut GCodeProgram, ctx: &EmitContext, layer_count: usize) {
    let s = ctx.settings;
    out.comment("Generated by fdmslice");
    out.comment(format_args!("Printer: {}", ctx.printer.name));
    out.comment(format_args!("Filament: {}", ctx.filament.name));
    out.comment(format_args!("Layer height: {:.3}mm", s.layer_height));
    out.comment(format_args!("Infill: {:.0}%", s.infill_density));
    out.comment(format_args!("Walls: {}", s.wall_count));
    out.comment(format_args!(
        "Top/bottom layers: {}/{}",
        s.top_layers, s.bottom_layers
    ));
    out.comment(format_args!(
        "Support: {}",
        if s.support_enabled { "on" } else { "off" }
    ));
    out.comment(format_args!("Adhesion: {:?}", s.bed_adhesion));
    out.comment(format_args!("Layer count: {layer_count}"));
}

fn emit_startup(out: &mut GCodeProgram, ctx: &EmitContext) {
    let f = &ctx.filament;
    out.push("G28 ; home all axes");
    out.push("G90 ; absolute positioning");
    out.push("M82 ; absolute extrusion");
    out.push(format!("M140 S{:.0}", f.bed_temp));
    out.push(format!("M104 S{:.0}", f.nozzle_temp));
    out.push(format!("M190 S{:.0}", f.bed_temp));
    out.push(format!("M109 S{:.0}", f.nozzle_temp));
    out.push("G92 E0");
    out.push(format!("G0 Z{:.3} F{:.0}", START_LIFT_Z, ctx.travel_feed()));
}

fn emit_layer(out: &mut GCodeProgram, state: &mut EmitterState, layer: &Layer, ctx: &EmitContext) {
    out.push(format!(";LAYER:{}", layer.index));
    out.push(format!("G0 Z{:.3} F{:.0}", layer.z, ctx.travel_feed()));
    for path in &layer.paths {
        emit_path(out, state, path, ctx);
    }
}

fn emit_path(out: &mut GCodeProgram, state: &mut EmitterState, path: &Path, ctx: &EmitContext) {
    let s = ctx.settings;
    if !path.extruding {
        for &p in &path.points {
            let p = ctx.place(p);
            out.push(format!("G0 X{:.3} Y{:.3} F{:.0}", p.x, p.y, ctx.travel_feed()));
            state.travel_to(p, s.travel_speed);
        }
        return;
    }
    let [first, rest @ ..] = path.points.as_slice() else {
        return;
    };
    if rest.is_empty() {
        return;
    }

    let retract = s.retraction_enabled && s.retraction_distance > 0.0;
    if retract && state.cumulative_e > 0.0 && !state.is_retracted {
        state.cumulative_e -= s.retraction_distance;
        state.is_retracted = true;
        state.seconds += s.retraction_distance / s.retraction_speed;
        out.push(format!("G1 E{:.4} F{:.0}", state.cumulative_e, ctx.retract_feed()));
    }

    let start = ctx.place(*first);
    out.push(format!(
        "G0 X{:.3} Y{:.3} F{:.0}",
        start.x,
        start.y,
        ctx.travel_feed()
    ));
    state.travel_to(start, s.travel_speed);

    if state.is_retracted {
        state.cumulative_e += s.retraction_distance;
        state.is_retracted = false;
        state.seconds += s.retraction_distance / s.retraction_speed;
        out.push(format!("G1 E{:.4} F{:.0}", state.cumulative_e, ctx.retract_feed()));
    }

    let width = ctx.printer.nozzle_diameter;
    for (i, &p) in rest.iter().enumerate() {
        let p = ctx.place(p);
        let from = state.position.unwrap_or(start);
        let e = extrusion_for(Vec2::dist(from, p), width, s.layer_height);
        state.cumulative_e += e;
        state.extruded += e;
        state.travel_to(p, s.print_speed);
        if i == 0 {
            out.push(format!(
                "G1 X{:.3} Y{:.3} E{:.4} F{:.0}",
                p.x,
                p.y,
                state.cumulative_e,
                ctx.print_feed()
            ));
        } else {
            out.push(format!(
                "G1 X{:.3} Y{:.3} E{:.4}",
                p.x, p.y, state.cumulative_e
            ));
        }
    }
}

fn emit_shutdown(out: &mut GCodeProgram, ctx: &EmitContext) {
    out.push("G91 ; relative positioning");
    out.push(format!("G1 E-{END_RETRACT:.1} F2700"));
    out.push(format!("G1 Z{END_LIFT_Z:.1} F3000"));
    out.push("G90");
    out.push(format!("G28 X0 Y0 ; park, bed {:.0}mm", ctx.printer.bed_width));
    out.push("M104 S0 ; nozzle off");
    out.push("M140 S0 ; bed off");
    out.push("M84 ; steppers off");
}

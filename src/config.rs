/// Slicer settings and printer/filament presets.
///
/// Settings arrive as JSON from the host; every field has a default so a
/// partial object (or `{}`) is accepted. Validation happens once, in
/// [`SlicerSettings::from_json`] / [`SlicerSettings::validate`], not at use.
use serde::{Deserialize, Serialize};

use crate::error::{Result, SliceError};

// ── Presets ──────────────────────────────────────────────────────────

/// Build volume and nozzle of a printer, in mm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterPreset {
    pub name: String,
    pub bed_width: f64,
    pub bed_depth: f64,
    pub bed_height: f64,
    pub nozzle_diameter: f64,
}

/// Temperatures for a filament, in °C.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentPreset {
    pub name: String,
    pub nozzle_temp: f64,
    pub bed_temp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Printer {
    #[default]
    Ender3,
    Ender3V2,
    PrusaMk3s,
    PrusaMini,
    BambuA1Mini,
    Custom(PrinterPreset),
}

impl Printer {
    pub fn preset(&self) -> PrinterPreset {
        let (name, w, d, h) = match self {
            Printer::Ender3 => ("Creality Ender-3", 220.0, 220.0, 250.0),
            Printer::Ender3V2 => ("Creality Ender-3 V2", 220.0, 220.0, 250.0),
            Printer::PrusaMk3s => ("Prusa i3 MK3S", 250.0, 210.0, 210.0),
            Printer::PrusaMini => ("Prusa MINI", 180.0, 180.0, 180.0),
            Printer::BambuA1Mini => ("Bambu Lab A1 mini", 180.0, 180.0, 180.0),
            Printer::Custom(preset) => return preset.clone(),
        };
        PrinterPreset {
            name: name.into(),
            bed_width: w,
            bed_depth: d,
            bed_height: h,
            nozzle_diameter: 0.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Filament {
    #[default]
    Pla,
    Petg,
    Abs,
    Tpu,
    Custom(FilamentPreset),
}

impl Filament {
    pub fn preset(&self) -> FilamentPreset {
        let (name, nozzle, bed) = match self {
            Filament::Pla => ("PLA", 210.0, 60.0),
            Filament::Petg => ("PETG", 235.0, 80.0),
            Filament::Abs => ("ABS", 240.0, 100.0),
            Filament::Tpu => ("TPU", 220.0, 50.0),
            Filament::Custom(preset) => return preset.clone(),
        };
        FilamentPreset {
            name: name.into(),
            nozzle_temp: nozzle,
            bed_temp: bed,
        }
    }
}

// ── Enumerated options ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InfillPattern {
    /// 0° and 90° scan lines on alternate layers.
    #[default]
    Grid,
    /// 0°, 60° and 120° scan lines together on every layer.
    Triangles,
    /// One of 0°, 60° or 120° per layer, rotating through the three. Each
    /// layer is plain parallel lines; no hexagonal cells are traced.
    Hexagons,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BedAdhesion {
    #[default]
    None,
    Skirt,
    Brim,
    Raft,
}

/// How raw plane/triangle segments become wall geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContourMode {
    /// Offset each intersection segment on its own.
    #[default]
    Segments,
    /// Chain segments into polylines first, then offset the polylines.
    Stitched,
}

// ── Settings ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicerSettings {
    #[serde(default)]
    pub printer: Printer,
    #[serde(default)]
    pub filament: Filament,
    #[serde(default = "default_layer_height")]
    pub layer_height: f64,
    /// Percent, 0–100.
    #[serde(default = "default_infill_density")]
    pub infill_density: f64,
    #[serde(default)]
    pub infill_pattern: InfillPattern,
    #[serde(default = "default_wall_count")]
    pub wall_count: u32,
    #[serde(default = "default_shell_layers")]
    pub top_layers: u32,
    #[serde(default = "default_shell_layers")]
    pub bottom_layers: u32,
    /// mm/s
    #[serde(default = "default_print_speed")]
    pub print_speed: f64,
    /// mm/s
    #[serde(default = "default_travel_speed")]
    pub travel_speed: f64,
    #[serde(default)]
    pub support_enabled: bool,
    #[serde(default)]
    pub bed_adhesion: BedAdhesion,
    #[serde(default = "default_retraction_enabled")]
    pub retraction_enabled: bool,
    /// mm
    #[serde(default = "default_retraction_distance")]
    pub retraction_distance: f64,
    /// mm/s
    #[serde(default = "default_retraction_speed")]
    pub retraction_speed: f64,
    #[serde(default)]
    pub contour_mode: ContourMode,
}

fn default_layer_height() -> f64 {
    0.2
}
fn default_infill_density() -> f64 {
    20.0
}
fn default_wall_count() -> u32 {
    2
}
fn default_shell_layers() -> u32 {
    4
}
fn default_print_speed() -> f64 {
    50.0
}
fn default_travel_speed() -> f64 {
    150.0
}
fn default_retraction_enabled() -> bool {
    true
}
fn default_retraction_distance() -> f64 {
    5.0
}
fn default_retraction_speed() -> f64 {
    45.0
}

impl Default for SlicerSettings {
    fn default() -> Self {
        Self {
            printer: Printer::default(),
            filament: Filament::default(),
            layer_height: default_layer_height(),
            infill_density: default_infill_density(),
            infill_pattern: InfillPattern::default(),
            wall_count: default_wall_count(),
            top_layers: default_shell_layers(),
            bottom_layers: default_shell_layers(),
            print_speed: default_print_speed(),
            travel_speed: default_travel_speed(),
            support_enabled: false,
            bed_adhesion: BedAdhesion::default(),
            retraction_enabled: default_retraction_enabled(),
            retraction_distance: default_retraction_distance(),
            retraction_speed: default_retraction_speed(),
            contour_mode: ContourMode::default(),
        }
    }
}

impl SlicerSettings {
    /// Decode settings JSON and validate the result.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, v: f64) -> Result<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(SliceError::InvalidSettings(format!(
                    "{name} must be > 0, got {v}"
                )))
            }
        }

        positive("layer_height", self.layer_height)?;
        positive("print_speed", self.print_speed)?;
        positive("travel_speed", self.travel_speed)?;
        if self.wall_count < 1 {
            return Err(SliceError::InvalidSettings(
                "wall_count must be at least 1".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.infill_density) {
            return Err(SliceError::InvalidSettings(format!(
                "infill_density must be within 0..=100, got {}",
                self.infill_density
            )));
        }
        if !(self.retraction_distance.is_finite() && self.retraction_distance >= 0.0) {
            return Err(SliceError::InvalidSettings(format!(
                "retraction_distance must be >= 0, got {}",
                self.retraction_distance
            )));
        }
        if self.retraction_enabled {
            positive("retraction_speed", self.retraction_speed)?;
        }

        let printer = self.printer.preset();
        positive("nozzle_diameter", printer.nozzle_diameter)?;
        positive("bed_width", printer.bed_width)?;
        positive("bed_depth", printer.bed_depth)?;
        positive("bed_height", printer.bed_height)?;
        Ok(())
    }

    pub fn nozzle_diameter(&self) -> f64 {
        self.printer.preset().nozzle_diameter
    }
}

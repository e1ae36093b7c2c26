/// Print metrics — time and filament figures read back from G-code text.
///
/// Slicers leave a summary in comments (ours in the footer, Cura as
/// `;TIME:` / `;Filament used:`, PrusaSlicer as `; estimated printing time
/// (normal mode) = 1h 2m 3s` / `; filament used [mm] = …`). Each figure is
/// taken from the first comment that yields it; whatever is still missing
/// is estimated from the motion commands.
use std::sync::OnceLock;

use parser::parse_line;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::toolpath::filament_area;

/// Seconds charged per `G0`/`G1` line when no time summary is present.
pub const SECONDS_PER_MOVE: f64 = 0.1;
/// PLA density, g/cm³.
pub const PLA_DENSITY: f64 = 1.24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintTime {
    pub hours: u64,
    pub minutes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilamentUsage {
    pub meters: f64,
    pub grams: f64,
}

/// Where a figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSource {
    Summary,
    Motion,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrintMetrics {
    pub time: PrintTime,
    pub filament: FilamentUsage,
    pub time_source: MetricsSource,
    pub filament_source: MetricsSource,
}

impl PrintMetrics {
    /// Build metrics from raw totals. Negative or non-finite inputs count as zero.
    pub fn new(seconds: f64, meters: f64) -> Self {
        let seconds = sanitize(seconds);
        let meters = sanitize(meters);
        let whole = seconds.floor() as u64;
        Self {
            time: PrintTime {
                hours: whole / 3600,
                minutes: (whole % 3600) / 60,
            },
            filament: FilamentUsage {
                meters,
                grams: grams_for(meters),
            },
            time_source: MetricsSource::Motion,
            filament_source: MetricsSource::Motion,
        }
    }
}

fn sanitize(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// Mass of `meters` of 1.75 mm PLA.
pub fn grams_for(meters: f64) -> f64 {
    let cm3 = meters * 1000.0 * filament_area() / 1000.0;
    cm3 * PLA_DENSITY
}

/// Estimate print time and filament use for a G-code program.
///
/// Never fails: empty or unreadable input yields zeros.
pub fn estimate_metrics(text: &str) -> PrintMetrics {
    let summary = read_summary(text);
    let motion = if summary.seconds.is_none() || summary.meters.is_none() {
        scan_motion(text)
    } else {
        MotionTotals::default()
    };

    let seconds = summary.seconds.unwrap_or(motion.seconds);
    let meters = summary.meters.unwrap_or(motion.extruded_mm / 1000.0);
    let mut metrics = PrintMetrics::new(seconds, meters);
    if summary.seconds.is_some() {
        metrics.time_source = MetricsSource::Summary;
    }
    if summary.meters.is_some() {
        metrics.filament_source = MetricsSource::Summary;
    }

    debug!(
        time_source = ?metrics.time_source,
        filament_source = ?metrics.filament_source,
        seconds = format!("{seconds:.0}"),
        meters = format!("{:.3}", metrics.filament.meters),
        "Estimated print metrics"
    );
    metrics
}

// ── Summary comments ─────────────────────────────────────────────────

/// Summary labels that carry the print time, lower-cased. Slicer config
/// keys (`slowdown_below_layer_time`, `TIME_ELAPSED`) are not summaries.
const TIME_LABELS: &[&str] = &[
    "estimated printing time (seconds)",
    "time",
    "estimated printing time (normal mode)",
    "estimated printing time",
    "total estimated time",
];

/// Summary labels that carry the filament length, lower-cased.
const FILAMENT_LABELS: &[&str] = &[
    "filament used",
    "filament used [mm]",
    "filament used [m]",
    "total filament length [mm]",
];

struct Patterns {
    /// `<label> : <value>` or `<label> = <value>`, one entry of a comment.
    entry: Regex,
    seconds: Regex,
    duration: Regex,
    length: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        entry: Regex::new(r"^\s*(?P<label>[^:=]*?)\s*[:=]\s*(?P<value>.*?)\s*$").expect("invalid entry regex"),
        seconds: Regex::new(r"^(?P<s>\d+(?:\.\d+)?)$").expect("invalid seconds regex"),
        duration: Regex::new(r"^(?:(?P<d>\d+)d)?\s*(?:(?P<h>\d+)h)?\s*(?:(?P<m>\d+)m)?\s*(?:(?P<s>\d+)s)?$")
            .expect("invalid duration regex"),
        length: Regex::new(r"^(?P<n>\d+(?:\.\d+)?)\s*(?P<unit>mm|m)?$").expect("invalid length regex"),
    })
}

#[derive(Debug, Default)]
struct Summary {
    seconds: Option<f64>,
    meters: Option<f64>,
}

/// Scan comment lines for summary entries. A comment may hold several
/// entries separated by `;`, as in Orca/Bambu headers
/// (`; model printing time: 38m 50s; total estimated time: 45m 3s`).
fn read_summary(text: &str) -> Summary {
    let p = patterns();
    let mut summary = Summary::default();
    let comments = text.lines().filter_map(|l| l.trim_start().strip_prefix(';'));
    for entry in comments.flat_map(|c| c.split(';')) {
        if summary.seconds.is_some() && summary.meters.is_some() {
            break;
        }
        let Some(caps) = p.entry.captures(entry) else {
            continue;
        };
        let label = caps["label"].to_ascii_lowercase();
        let value = &caps["value"];
        if summary.seconds.is_none() && TIME_LABELS.contains(&label.as_str()) {
            summary.seconds = parse_seconds(p, value);
        } else if summary.meters.is_none() && FILAMENT_LABELS.contains(&label.as_str()) {
            summary.meters = parse_meters(p, &label, value);
        }
    }
    summary
}

/// Plain seconds (`1234`, `1234.5`) or a `1d 2h 3m 4s` duration.
fn parse_seconds(p: &Patterns, value: &str) -> Option<f64> {
    if let Some(caps) = p.seconds.captures(value) {
        return caps["s"].parse().ok();
    }
    let caps = p.duration.captures(value)?;
    let mut total = 0.0;
    let mut any = false;
    for (name, scale) in [("d", 86400.0), ("h", 3600.0), ("m", 60.0), ("s", 1.0)] {
        if let Some(m) = caps.name(name) {
            total += m.as_str().parse::<f64>().ok()? * scale;
            any = true;
        }
    }
    any.then_some(total)
}

/// A length in meters or millimetres. The unit comes from a suffix on the
/// value or a `[m]`/`[mm]` tag in the label; anything else (grams, cm³,
/// material names) is not a length.
fn parse_meters(p: &Patterns, label: &str, value: &str) -> Option<f64> {
    let caps = p.length.captures(value)?;
    let n: f64 = caps["n"].parse().ok()?;
    let unit = match caps.name("unit") {
        Some(u) => u.as_str(),
        None if label.contains("[mm]") => "mm",
        None if label.contains("[m]") => "m",
        None => return None,
    };
    Some(if unit == "mm" { n / 1000.0 } else { n })
}

// ── Motion fallback ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MotionTotals {
    seconds: f64,
    extruded_mm: f64,
}

/// Count moves and follow the extruder axis.
///
/// In absolute mode the figure is the highest `E` reached, carried over
/// `G92` resets. In relative mode (`M83`, or `G91` until `G90`/`M82`)
/// positive `E` words are summed.
fn scan_motion(text: &str) -> MotionTotals {
    let mut moves = 0usize;
    let mut relative_e = false;
    let mut banked = 0.0f64;
    let mut max_e = 0.0f64;
    let mut relative_total = 0.0f64;

    for line in text.lines().filter_map(|l| parse_line(l).ok()) {
        if line.is_command('M', 82) || line.is_command('G', 90) {
            relative_e = false;
        } else if line.is_command('M', 83) || line.is_command('G', 91) {
            relative_e = true;
        } else if line.is_command('G', 92) {
            if let Some(e) = line.param('E') {
                banked += max_e;
                max_e = e.max(0.0);
            }
        } else if line.is_command('G', 0) || line.is_command('G', 1) {
            moves += 1;
            match line.param('E') {
                Some(e) if relative_e && e > 0.0 => relative_total += e,
                Some(e) if !relative_e => max_e = max_e.max(e),
                _ => {}
            }
        }
    }

    MotionTotals {
        seconds: moves as f64 * SECONDS_PER_MOVE,
        extruded_mm: banked + max_e + relative_total,
    }
}

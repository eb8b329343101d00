//! Device and process configuration.
//!
//! Settings are plain serde structs. Every group defaults field by field so
//! a job file only needs to name what it changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SlicerError};
use crate::infill::FillType;

/// Top-level settings for one slicing or print job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Machine description.
    pub device: DeviceSettings,
    /// Process parameters.
    pub process: ProcessSettings,
    /// Per-widget assignments, keyed by widget id.
    pub widgets: BTreeMap<u32, WidgetSettings>,
}

/// Machine description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Declared extruders, indexed by tool id.
    pub extruders: Vec<Extruder>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            extruders: vec![Extruder::default()],
        }
    }
}

/// One extruder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Extruder {
    /// Nozzle diameter (mm).
    pub nozzle: f64,
}

impl Default for Extruder {
    fn default() -> Self {
        Self { nozzle: 0.4 }
    }
}

/// Per-widget assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSettings {
    /// Extruder printing this widget.
    pub extruder: usize,
}

/// Process parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    /// Slice height (mm).
    pub layer_height: f64,
    /// First layer height (mm). 0 means same as `layer_height`.
    pub first_layer_height: f64,
    /// Minimum adaptive slice height (mm), 0 to disable.
    pub min_layer_height: f64,
    /// Number of wall shells.
    pub shell_count: usize,
    /// Detect gaps too narrow for a wall and fill them instead.
    pub detect_thin_walls: bool,
    /// Sparse fill.
    pub fill: FillSettings,
    /// Solid caps.
    pub solid: SolidSettings,
    /// Support synthesis.
    pub support: SupportSettings,
    /// Brim.
    pub brim: BrimSettings,
    /// Raft.
    pub raft: RaftSettings,
    /// Feed rates.
    pub speed: SpeedSettings,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            layer_height: 0.25,
            first_layer_height: 0.25,
            min_layer_height: 0.0,
            shell_count: 3,
            detect_thin_walls: false,
            fill: FillSettings::default(),
            solid: SolidSettings::default(),
            support: SupportSettings::default(),
            brim: BrimSettings::default(),
            raft: RaftSettings::default(),
            speed: SpeedSettings::default(),
        }
    }
}

/// Sparse fill parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FillSettings {
    /// Sparse density (0.0 to 1.0). Above 0.95 every layer is solid.
    pub density: f64,
    /// Base solid fill angle (degrees).
    pub angle: f64,
    /// Overlap of fill into the innermost shell (clamped to 0..0.8).
    pub overlap: f64,
    /// Sparse fill strategy name.
    pub pattern: String,
}

impl Default for FillSettings {
    fn default() -> Self {
        Self {
            density: 0.25,
            angle: 45.0,
            overlap: 0.3,
            pattern: FillType::Hex.name().to_string(),
        }
    }
}

/// Solid cap parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolidSettings {
    /// Layers a bridge or flat is projected through (0 disables caps).
    pub layers: usize,
    /// Minimum solid area kept (mm^2).
    pub min_area: f64,
    /// Solid layers at the bottom of the widget.
    pub bottom_layers: usize,
    /// Solid layers at the top of the widget.
    pub top_layers: usize,
}

impl Default for SolidSettings {
    fn default() -> Self {
        Self {
            layers: 3,
            min_area: 1.0,
            bottom_layers: 3,
            top_layers: 3,
        }
    }
}

/// Support synthesis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportSettings {
    /// Generate support.
    pub enabled: bool,
    /// Support fill density (0.0 to 1.0).
    pub density: f64,
    /// Distance from a supporting trace still counted as supported, also
    /// the clearance kept between support and model (mm).
    pub offset: f64,
    /// Longest unsupported span before intermediate points are checked (mm).
    pub span: f64,
    /// Expansion of the layer outline support is trimmed to (mm).
    pub extra: f64,
    /// Minimum support area kept during propagation (mm^2).
    pub min_area: f64,
    /// Pillar side length (mm).
    pub pillar_size: f64,
    /// Layers directly below an overhang left unsupported.
    pub gap: usize,
    /// Extruder printing support.
    pub extruder: usize,
    /// Maximum propagation depth in layers, 0 for unbounded.
    pub max_depth: usize,
}

impl Default for SupportSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            density: 0.25,
            offset: 1.0,
            span: 5.0,
            extra: 0.0,
            min_area: 0.1,
            pillar_size: 2.0,
            gap: 1,
            extruder: 0,
            max_depth: 0,
        }
    }
}

/// Brim parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrimSettings {
    /// Number of brim loops.
    pub count: usize,
    /// Gap between model and first loop (mm).
    pub offset: f64,
}

/// Raft parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftSettings {
    /// Print a raft below the model.
    pub enabled: bool,
    /// Clearance between raft top and first model layer (mm).
    pub spacing: f64,
}

impl Default for RaftSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            spacing: 0.2,
        }
    }
}

/// Feed rates (mm/s).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedSettings {
    /// First layer print speed.
    pub first_layer: f64,
    /// Print speed.
    pub print: f64,
    /// Travel speed.
    pub travel: f64,
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            first_layer: 20.0,
            print: 50.0,
            travel: 120.0,
        }
    }
}

impl Settings {
    /// Parse settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SlicerError::InvalidSettings(e.to_string()))
    }

    /// Nozzle diameter of an extruder.
    pub fn nozzle(&self, extruder: usize) -> Option<f64> {
        self.device.extruders.get(extruder).map(|e| e.nozzle)
    }

    /// Extruder assigned to a widget (0 when unassigned).
    pub fn widget_extruder(&self, widget: u32) -> usize {
        self.widgets.get(&widget).map_or(0, |w| w.extruder)
    }

    /// Validate the parameters a widget on `extruder` depends on.
    pub fn validate(&self, extruder: usize) -> Result<()> {
        let height = self.process.layer_height;
        if !(height > 0.0 && height < 100.0) {
            return Err(SlicerError::InvalidSettings("invalid slice height".into()));
        }
        match self.nozzle(extruder) {
            Some(n) if (0.01..100.0).contains(&n) => {}
            _ => return Err(SlicerError::InvalidSettings("invalid nozzle size".into())),
        }
        if !(0.0..=1.0).contains(&self.process.fill.density) {
            return Err(SlicerError::InvalidSettings(
                "fill density must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }

    /// Point widgets assigned to an undeclared extruder at extruder 0.
    pub fn fix_extruders(&mut self) {
        let count = self.device.extruders.len();
        for (id, widget) in self.widgets.iter_mut() {
            if widget.extruder >= count {
                warn!(widget = id, extruder = widget.extruder, "missing extruder, using 0");
                widget.extruder = 0;
            }
        }
    }

    /// Apply every settings fixup.
    pub fn fixed(mut self) -> Self {
        self.fix_extruders();
        self.process.fix_first_layer_height();
        self
    }
}

impl ProcessSettings {
    /// Revert a missing or too thin first layer to the slice height.
    pub fn fix_first_layer_height(&mut self) {
        if self.first_layer_height == 0.0 {
            self.first_layer_height = self.layer_height;
        }
        if self.first_layer_height < self.layer_height {
            warn!(
                first = self.first_layer_height,
                height = self.layer_height,
                "first layer height below slice height, reverting"
            );
            self.first_layer_height = self.layer_height;
        }
    }

    /// Minimum slice height passed to the raw slicer.
    pub fn effective_min_height(&self) -> f64 {
        if self.layer_height > self.min_layer_height {
            self.min_layer_height
        } else {
            0.0
        }
    }
}

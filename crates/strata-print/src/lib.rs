#![warn(missing_docs)]

//! Print assembly for the strata slicer.
//!
//! Takes widgets that have been through every slicing stage and produces
//! one ordered motion stream per output layer, plus a colored render of
//! that stream:
//!
//! - [`assembler`]: raft, brim, support, purge blocks and the cross-widget
//!   merge
//! - [`path`]: nearest-first ordering of loops and lines
//! - [`render`]: polylines, speed colors and marker groups
//!
//! # Example
//!
//! ```ignore
//! use strata_print::{print_widgets, ColorRamp};
//!
//! let print = print_widgets(&widgets, &settings, ColorRamp::Default, false, &mut NoProgress)?;
//! for layer in &print.layers {
//!     println!("{} motions at {}mm", layer.motions.len(), layer.height);
//! }
//! ```

pub mod assembler;
pub mod error;
pub mod motion;
pub mod path;
pub mod render;

pub use assembler::{prepare, purge_blocks, Assembly, PurgeBlock, EXTRUDER_PENALTY};
pub use error::{PrintError, Result};
pub use motion::{Motion, PrintLayer};
pub use render::{prepare_render, ColorRamp, RenderOptions, RenderOutput};

use serde::{Deserialize, Serialize};
use strata_slicer::{Monotonic, Progress, ProgressSink, RenderLayers, Settings, Widget};

/// An assembled and rendered print.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Print {
    /// Motion stream per output layer.
    pub layers: Vec<PrintLayer>,
    /// Render groups per non-empty layer.
    pub render: Vec<RenderLayers>,
    /// Highest feed rate in the stream.
    pub max_speed: f64,
    /// Purge traversals printed.
    pub purges: usize,
}

/// Assemble and render finished widgets. Progress covers `prepare` from
/// 0 to 0.5 and `render` from 0.5 to 1, with each rendered layer attached.
/// `thin` draws prints as hairlines instead of nozzle-wide paths.
pub fn print_widgets(
    widgets: &[Widget],
    settings: &Settings,
    ramp: ColorRamp,
    thin: bool,
    progress: &mut dyn ProgressSink,
) -> Result<Print> {
    let mut progress = Monotonic::new(progress);
    let assembly = prepare(widgets, settings, &mut progress)?;

    let options = RenderOptions {
        ramp,
        nozzles: settings.device.extruders.iter().map(|e| e.nozzle).collect(),
        thin,
    };
    let rendered = prepare_render(&assembly.layers, &options, |fraction, layer| {
        progress.update(Progress {
            fraction: 0.5 + fraction * 0.5,
            stage: "render",
            layer: Some(layer),
        })
    });
    progress.update(Progress {
        fraction: 1.0,
        stage: "render",
        layer: None,
    });

    Ok(Print {
        layers: assembly.layers,
        render: rendered.layers,
        max_speed: rendered.max_speed,
        purges: assembly.purges,
    })
}

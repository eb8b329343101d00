#![warn(missing_docs)]

//! Per-layer derivation for FDM printing.
//!
//! A widget's raw cross-sections are turned into printable layers in a
//! fixed sequence of stages:
//!
//! 1. **Shells**: wall insets and fill boundaries per island
//! 2. **Diff**: bridges and flats against the neighbouring layers
//! 3. **Project**: caps pushed through a number of layers as solids
//! 4. **Fill**: solid fill of caps, sparse fill of the rest
//! 5. **Support**: overhang detection, propagation and support fill
//! 6. **Render**: a named, styled preview of each layer
//!
//! The stages that read neighbouring layers run only after the previous
//! stage has finished for the whole stack. Each [`Slice`] records the last
//! stage it completed.
//!
//! # Example
//!
//! ```ignore
//! use strata_slicer::{slice_widget, CancelToken, MeshRef, NoProgress, PrecomputedSlicer, Settings, Widget};
//!
//! let mut raw = PrecomputedSlicer::new();
//! raw.insert(MeshRef("cube".into()), layers);
//! let mut widget = Widget::new(1, MeshRef("cube".into()));
//! slice_widget(&mut widget, &Settings::default(), &raw, &mut NoProgress, &CancelToken::new())?;
//! ```

pub mod error;
pub mod infill;
pub mod pipeline;
pub mod preview;
pub mod request;
pub mod settings;
pub mod shell;
pub mod slice;
pub mod solid;
pub mod support;

pub use error::{Result, SlicerError};
pub use infill::{FillStrategy, FillTarget, FillType};
pub use pipeline::{
    slice_widget, slice_widgets, CancelToken, Monotonic, NoProgress, PrecomputedSlicer, Progress,
    ProgressSink, RawLayer, RawSliceParams, RawSlicer, SliceContext,
};
pub use preview::{RenderGroup, RenderLayers, RenderPath, Style};
pub use request::{SliceJobs, Waiter};
pub use settings::Settings;
pub use slice::{MeshRef, Slice, Stage, SupportArea, Top, Widget};

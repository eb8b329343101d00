//! The slicing driver.
//!
//! Runs every stage over a widget's slices in order, advancing each
//! slice's [`Stage`] as it goes. Within a stage slices are visited bottom
//! to top; stages that read neighbours only start once the previous stage
//! has finished for the whole stack.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strata_geom::Polygon;
use tracing::debug;

use crate::error::{Result, SlicerError};
use crate::infill::{sparse_fill, SparseParams, VASE_PATTERN};
use crate::preview::{render_slice, RenderLayers};
use crate::settings::Settings;
use crate::shell::{shell_slice, ShellParams};
use crate::slice::{MeshRef, Slice, Stage, Widget};
use crate::solid::{diff_slice, fill_solids, project_slice, solid_layer_fill};
use crate::support::{detect_support, fill_support, support_offsets, SupportParams};

/// Stacks taller than this always render thin.
pub const THIN_RENDER_LAYERS: usize = 150;

/// Cooperative cancellation flag shared between a request and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SlicerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A progress report.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    /// Completed fraction (0.0 to 1.0).
    pub fraction: f64,
    /// Stage label.
    pub stage: &'a str,
    /// Preview of the slice just rendered, during the render stage.
    pub layer: Option<&'a RenderLayers>,
}

/// Receiver of progress reports.
pub trait ProgressSink {
    /// Handle one report.
    fn update(&mut self, progress: Progress<'_>);
}

impl<F> ProgressSink for F
where
    F: FnMut(Progress<'_>),
{
    fn update(&mut self, progress: Progress<'_>) {
        self(progress)
    }
}

/// Sink that drops every report.
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&mut self, _progress: Progress<'_>) {}
}

/// Wraps a sink so the fraction never decreases and stays in `[0, 1]`.
pub struct Monotonic<'a> {
    inner: &'a mut dyn ProgressSink,
    last: f64,
}

impl<'a> Monotonic<'a> {
    /// Wrap `inner`.
    pub fn new(inner: &'a mut dyn ProgressSink) -> Self {
        Self { inner, last: 0.0 }
    }
}

impl ProgressSink for Monotonic<'_> {
    fn update(&mut self, progress: Progress<'_>) {
        let fraction = progress.fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        self.inner.update(Progress { fraction, ..progress });
    }
}

/// Heights requested from the raw slicer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSliceParams {
    /// Slice height.
    pub height: f64,
    /// Minimum adaptive height, 0 to disable.
    pub min_height: f64,
    /// First layer height.
    pub first_height: f64,
}

/// One raw cross-section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLayer {
    /// Z of the layer top.
    pub z: f64,
    /// Layer thickness.
    pub height: f64,
    /// Outline rings, nested or loose.
    #[serde(default)]
    pub polygons: Vec<Polygon>,
}

/// Cross-sections a mesh into raw layers.
pub trait RawSlicer {
    /// Slice `mesh`, reporting progress in `[0, 1]`.
    fn slice(
        &self,
        mesh: &MeshRef,
        params: &RawSliceParams,
        progress: &mut dyn FnMut(f64),
    ) -> Result<Vec<RawLayer>>;
}

/// Raw slicer serving layers computed elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrecomputedSlicer {
    /// Layers per mesh.
    pub meshes: BTreeMap<MeshRef, Vec<RawLayer>>,
}

impl PrecomputedSlicer {
    /// Empty slicer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the layers of a mesh.
    pub fn insert(&mut self, mesh: MeshRef, layers: Vec<RawLayer>) {
        self.meshes.insert(mesh, layers);
    }
}

impl RawSlicer for PrecomputedSlicer {
    fn slice(
        &self,
        mesh: &MeshRef,
        _params: &RawSliceParams,
        progress: &mut dyn FnMut(f64),
    ) -> Result<Vec<RawLayer>> {
        let layers = self
            .meshes
            .get(mesh)
            .cloned()
            .ok_or_else(|| SlicerError::RawSlice(format!("unknown mesh {}", mesh.0)))?;
        progress(1.0);
        Ok(layers)
    }
}

/// Per-request parameters derived from settings.
#[derive(Debug, Clone)]
pub struct SliceContext {
    /// Nozzle diameter of the widget's extruder.
    pub nozzle: f64,
    /// First shell inset.
    pub first_offset: f64,
    /// Subsequent shell insets.
    pub shell_offset: f64,
    /// Fill boundary inset.
    pub fill_offset: f64,
    /// Solid fill line spacing.
    pub fill_spacing: f64,
    /// Render previews as hairlines.
    pub thin_render: bool,
    /// Preview path width.
    pub render_offset: f64,
    /// Cancellation flag.
    pub cancel: CancelToken,
}

impl SliceContext {
    /// Context for a widget on `extruder`. Settings must be validated.
    pub fn new(settings: &Settings, extruder: usize, cancel: CancelToken) -> Result<Self> {
        let nozzle = settings
            .nozzle(extruder)
            .ok_or_else(|| SlicerError::InvalidSettings("invalid nozzle size".into()))?;
        let overlap = settings.process.fill.overlap.clamp(0.0, 0.8);
        Ok(Self {
            nozzle,
            first_offset: nozzle / 2.0,
            shell_offset: nozzle,
            fill_offset: nozzle * (1.0 - overlap),
            fill_spacing: nozzle,
            thin_render: false,
            render_offset: nozzle / 2.0,
            cancel,
        })
    }
}

/// Convert raw layers into linked slices, dropping empty layers above the
/// model. Empty layers below it stay.
pub fn build_slices(raw: Vec<RawLayer>, extruder: usize) -> Vec<Slice> {
    let mut slices: Vec<Slice> = raw
        .into_iter()
        .enumerate()
        .map(|(i, layer)| {
            let mut s = Slice::new(i, layer.z, layer.height, layer.polygons);
            s.extruder = extruder;
            s
        })
        .collect();
    while slices.last().is_some_and(|s| s.tops.is_empty()) {
        slices.pop();
    }
    let n = slices.len();
    for (i, s) in slices.iter_mut().enumerate() {
        s.index = i;
        s.down = i.checked_sub(1);
        s.up = (i + 1 < n).then_some(i + 1);
    }
    slices
}

struct Driver<'a, 'p> {
    slices: &'a mut [Slice],
    cancel: &'a CancelToken,
    progress: &'a mut Monotonic<'p>,
}

impl Driver<'_, '_> {
    fn report(&mut self, index: usize, from: f64, to: f64, label: &str, layer: Option<&RenderLayers>) {
        let n = self.slices.len().max(1) as f64;
        let fraction = 0.5 + (from + (index as f64 / n) * (to - from)) * 0.5;
        self.progress.update(Progress {
            fraction,
            stage: label,
            layer,
        });
    }

    /// Run `op` on every slice, bottom to top.
    fn pass(
        &mut self,
        from: f64,
        to: f64,
        label: &str,
        mut op: impl FnMut(&mut [Slice], usize),
    ) -> Result<()> {
        self.cancel.check()?;
        for i in 0..self.slices.len() {
            op(&mut *self.slices, i);
            self.report(i, from, to, label, None);
        }
        Ok(())
    }

    fn advance(&mut self, stage: Stage) -> Result<()> {
        debug!(?stage, slices = self.slices.len(), "stage complete");
        for slice in self.slices.iter_mut() {
            slice.advance(stage)?;
        }
        Ok(())
    }
}

/// Slice one widget. On error the widget is left without slices.
pub fn slice_widget(
    widget: &mut Widget,
    settings: &Settings,
    slicer: &dyn RawSlicer,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<()> {
    let result = run(widget, settings, slicer, progress, cancel);
    if result.is_err() {
        widget.slices.clear();
    }
    result
}

fn run(
    widget: &mut Widget,
    settings: &Settings,
    slicer: &dyn RawSlicer,
    progress: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<()> {
    let settings = settings.clone().fixed();
    let extruder = settings.widget_extruder(widget.id);
    settings.validate(extruder)?;
    cancel.check()?;

    let mut ctx = SliceContext::new(&settings, extruder, cancel.clone())?;
    let spro = &settings.process;
    let mut progress = Monotonic::new(progress);

    let params = RawSliceParams {
        height: spro.layer_height,
        min_height: spro.effective_min_height(),
        first_height: spro.first_layer_height,
    };
    let raw = slicer.slice(&widget.mesh, &params, &mut |f| {
        progress.update(Progress {
            fraction: f * 0.5,
            stage: "slice",
            layer: None,
        })
    })?;
    cancel.check()?;

    widget.extruder = extruder;
    widget.set_slices(build_slices(raw, extruder));
    if widget.slices.is_empty() {
        return Err(SlicerError::EmptyWidget);
    }
    let count = widget.slices.len();
    if count > THIN_RENDER_LAYERS {
        ctx.thin_render = true;
    }

    let bounds = widget.bounds();
    let vase = spro.fill.pattern == VASE_PATTERN;
    let solid_layers = if vase { 0 } else { spro.solid.layers };
    let sparse = if vase { 0.0 } else { spro.fill.density };
    let support_enabled = spro.support.enabled && spro.support.density > 0.0;
    let shells = ShellParams {
        count: spro.shell_count,
        first_offset: ctx.first_offset,
        shell_offset: ctx.shell_offset,
        fill_offset: ctx.fill_offset,
        thin: spro.detect_thin_walls,
        vase,
    };
    let mut angle = spro.fill.angle;

    let mut driver = Driver {
        slices: &mut widget.slices,
        cancel,
        progress: &mut progress,
    };

    driver.pass(0.0, 0.2, "offsets", |slices, i| {
        let slice = &mut slices[i];
        let solid = !vase
            && (i < spro.solid.bottom_layers
                || i + spro.solid.top_layers >= count
                || sparse > 0.95);
        shell_slice(slice, &shells);
        if solid {
            solid_layer_fill(slice, ctx.fill_spacing, angle);
        }
        angle += 90.0;
    })?;
    driver.advance(Stage::Shelled)?;

    if solid_layers > 0 {
        driver.pass(0.2, 0.34, "diff", |slices, i| {
            diff_slice(slices, i, spro.solid.min_area)
        })?;
    }
    driver.advance(Stage::Diffed)?;

    if solid_layers > 0 {
        driver.pass(0.34, 0.35, "solids", |slices, i| {
            project_slice(slices, i, solid_layers)
        })?;
    }
    driver.advance(Stage::Projected)?;

    if solid_layers > 0 {
        driver.pass(0.35, 0.5, "solids", |slices, i| {
            fill_solids(&mut slices[i], ctx.fill_spacing, angle, spro.solid.min_area);
            angle += 90.0;
        })?;
    }
    if sparse > 0.0 {
        let sparse_params = SparseParams {
            pattern: spro.fill.pattern.clone(),
            density: sparse,
            spacing: ctx.fill_offset,
            line_width: ctx.nozzle,
            bounds,
            height: spro.layer_height,
            angle: spro.fill.angle,
        };
        driver.pass(0.5, 0.7, "infill", |slices, i| {
            sparse_fill(slices, i, &sparse_params)
        })?;
    }
    driver.advance(Stage::Filled)?;

    if support_enabled {
        let sup = &spro.support;
        let support_params = SupportParams {
            min_offset: sup.offset,
            max_bridge: sup.span,
            expand: sup.extra,
            min_area: sup.min_area,
            pillar_size: sup.pillar_size,
            offset: sup.offset,
            gap: sup.gap,
            max_depth: sup.max_depth,
        };
        driver.pass(0.7, 0.8, "support", |slices, i| {
            support_offsets(&mut slices[i], sup.offset);
            detect_support(slices, i, &support_params);
        })?;
        let nozzle = ctx.nozzle;
        driver.pass(0.8, 0.9, "support", |slices, i| {
            fill_support(slices, i, nozzle, sup.density, sup.min_area)
        })?;
    }
    driver.advance(Stage::Supported)?;

    driver.cancel.check()?;
    for i in 0..driver.slices.len() {
        let preview = render_slice(&driver.slices[i], ctx.thin_render, ctx.render_offset);
        driver.report(i, 0.9, 1.0, "render", Some(&preview));
        driver.slices[i].preview = Some(preview);
    }
    driver.advance(Stage::Rendered)?;
    Ok(())
}

/// Slice independent widgets in parallel. Each widget's stages still run
/// in order; results are returned in widget order.
pub fn slice_widgets<S, P>(
    widgets: &mut [Widget],
    settings: &Settings,
    slicer: &S,
    cancel: &CancelToken,
    progress: P,
) -> Vec<Result<()>>
where
    S: RawSlicer + Sync,
    P: Fn(u32, Progress<'_>) + Sync,
{
    widgets
        .par_iter_mut()
        .map(|widget| {
            let id = widget.id;
            let mut sink = |p: Progress<'_>| progress(id, p);
            slice_widget(widget, settings, slicer, &mut sink, cancel)
        })
        .collect()
}

//! Merging finished widgets into one motion stream.
//!
//! Layers are assembled bottom-up across every widget. Within a layer the
//! closest remaining slice is printed next, with distances to slices on a
//! different extruder than the last one scaled by [`EXTRUDER_PENALTY`].
//! Adhesion (raft or brim) and support from every widget are folded in
//! before the model; purge blocks re-prime a nozzle whenever it engages.

use std::collections::{BTreeMap, BTreeSet};

use strata_geom::{clip, dist_2d, fill_area, Bounds, Point3, Polygon, Vec3};
use strata_slicer::{MeshRef, Progress, ProgressSink, Settings, Slice, SlicerError, SupportArea, Widget};
use tracing::{debug, warn};

use crate::error::{PrintError, Result};
use crate::motion::PrintLayer;
use crate::path::{print_lines, print_poly, print_polys, print_slice, slice_distance, PathStyle};

/// Distance multiplier for a slice on a different extruder.
pub const EXTRUDER_PENALTY: f64 = 10_000.0;

/// Brim loops further apart than this retract between them.
pub const BRIM_RETRACT_GAP: f64 = 2.0;

/// Brim offset used under a raft when none is configured.
const RAFT_BRIM_OFFSET: f64 = 4.0;

/// Spacing between purge blocks along the print edge.
const PURGE_PITCH: f64 = 10.0;
const PURGE_CLEARANCE: f64 = 5.0;
const PURGE_TURNS: usize = 3;

/// Id of the synthesized support widget.
pub const SUPPORT_WIDGET_ID: u32 = u32::MAX;

/// A per-extruder purge location.
#[derive(Debug, Clone, PartialEq)]
pub struct PurgeBlock {
    /// Extruder primed here.
    pub extruder: usize,
    /// Open spiral traced when purging.
    pub poly: Polygon,
}

/// Output of [`prepare`].
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    /// Printed layers, raft first.
    pub layers: Vec<PrintLayer>,
    /// Bed footprint of the model and its adhesion.
    pub bounds: Bounds,
    /// Purge locations, one per engaged extruder.
    pub purge_blocks: Vec<PurgeBlock>,
    /// Number of purge traversals printed.
    pub purges: usize,
}

/// Purge blocks for the given `(extruder, nozzle)` pairs, placed in a row
/// beside `bounds` along its shorter side.
pub fn purge_blocks(bounds: &Bounds, extruders: &[(usize, f64)]) -> Vec<PurgeBlock> {
    let count = extruders.len() as f64;
    let (mut pos, walk, size) = if bounds.min_x < bounds.min_y {
        let dx = (bounds.width() - count * PURGE_PITCH) / 2.0 + PURGE_CLEARANCE;
        (
            (bounds.min_x + dx, bounds.max_y + PURGE_CLEARANCE),
            (PURGE_PITCH, 0.0),
            (9.0, 4.0),
        )
    } else {
        let dy = (bounds.height() - count * PURGE_PITCH) / 2.0 + PURGE_CLEARANCE;
        (
            (bounds.max_x + PURGE_CLEARANCE, bounds.min_y + dy),
            (0.0, PURGE_PITCH),
            (4.0, 9.0),
        )
    };
    extruders
        .iter()
        .map(|&(extruder, nozzle)| {
            let center = Point3::new(pos.0, pos.1, 0.0);
            pos = (pos.0 + walk.0, pos.1 + walk.1);
            PurgeBlock {
                extruder,
                poly: Polygon::spiral(center, size.0, size.1, nozzle * 2.0, PURGE_TURNS),
            }
        })
        .collect()
}

/// Purge blocks still unprinted on the current layer.
struct PurgeTrack {
    enabled: bool,
    blocks: BTreeMap<usize, Option<Polygon>>,
    purges: usize,
}

impl PurgeTrack {
    fn new(blocks: &[PurgeBlock]) -> Self {
        Self {
            enabled: blocks.len() >= 2,
            blocks: blocks
                .iter()
                .map(|b| (b.extruder, Some(b.poly.clone())))
                .collect(),
            purges: 0,
        }
    }

    fn refresh(&mut self, blocks: &[PurgeBlock]) {
        for b in blocks {
            self.blocks.insert(b.extruder, Some(b.poly.clone()));
        }
    }

    fn pending(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .filter(|(_, b)| b.is_some())
            .map(|(e, _)| *e)
            .collect()
    }

    /// Trace the block of `extruder` with `style`, retracting around it.
    fn purge(
        &mut self,
        extruder: usize,
        layer: &mut PrintLayer,
        start: Point3,
        z: f64,
        style: PathStyle,
    ) -> Point3 {
        if !self.enabled {
            return start;
        }
        let Some(block) = self.blocks.get_mut(&extruder).and_then(Option::take) else {
            warn!(extruder, layer = layer.index, "purge block already used on this layer");
            return start;
        };
        layer.retract_last();
        let end = print_poly(&block.with_z(z), start, &Vec3::zeros(), &mut layer.motions, &style);
        layer.retract_last();
        self.purges += 1;
        end
    }
}

/// Footprint of a widget on the bed.
fn placed_bounds(widget: &Widget) -> Bounds {
    let b = widget.bounds();
    if b.is_empty() {
        return b;
    }
    let p = widget.position;
    Bounds::new(b.min_x + p.x, b.min_y + p.y, b.max_x + p.x, b.max_y + p.y)
}

/// First-layer outlines and supports of every widget, grown by `offset`,
/// placed on the bed and merged.
fn brim_base(widgets: &[&Widget], offset: f64, nozzle: f64, extra: f64, z: f64) -> Vec<Polygon> {
    let mut brims = Vec::new();
    for widget in widgets {
        let Some(first) = widget.slices.first() else {
            continue;
        };
        let mut outlines = first.top_polys();
        outlines.extend(first.support_polys());
        for poly in clip::nest(outlines) {
            for mut brim in clip::offset(&[poly], offset + nozzle / 2.0, z, 0.0) {
                brim.translate(&Vec3::new(widget.position.x, widget.position.y, 0.0));
                brims.push(brim);
            }
        }
    }
    let mut brims = clip::union(&brims, 0.0);
    if offset > 0.0 && !brims.is_empty() {
        let grow = extra + 2.0;
        brims = clip::offset(&brims, grow, z, 0.0);
        brims = clip::offset(&brims, -grow, z, 0.0);
    }
    brims
}

/// Gather every widget's supports, placed on the bed, into one widget.
fn support_widget(widgets: &[&Widget], extruder: usize) -> Option<Widget> {
    let mut slices: Vec<Slice> = Vec::new();
    let mut any = false;
    for widget in widgets {
        while slices.len() < widget.slices.len() {
            let src = &widget.slices[slices.len()];
            let mut s = Slice::new(slices.len(), src.z, src.height, Vec::new());
            s.extruder = extruder;
            slices.push(s);
        }
        let shift = Vec3::new(widget.position.x, widget.position.y, 0.0);
        for (i, slice) in widget.slices.iter().enumerate() {
            for area in &slice.supports {
                let mut poly = area.poly.clone();
                poly.translate(&shift);
                let fill = area
                    .fill
                    .iter()
                    .map(|l| strata_geom::Line::new(l.a + shift, l.b + shift))
                    .collect();
                slices[i].supports.push(SupportArea {
                    poly,
                    fill,
                    origin: area.origin,
                    depth: area.depth,
                });
                any = true;
            }
        }
    }
    if !any {
        return None;
    }
    let mut widget = Widget::new(SUPPORT_WIDGET_ID, MeshRef("support".into()));
    widget.support = true;
    widget.extruder = extruder;
    widget.set_slices(slices);
    Some(widget)
}

/// Raft passes as `(height, angle offset, spacing, speed)`.
fn raft_passes(nozzle: f64, first: f64, feed: f64) -> [(f64, f64, f64, f64); 5] {
    [
        (nozzle, 0.0, nozzle * 6.0, first / 3.0),
        (nozzle, 0.0, nozzle * 6.0, first / 2.0),
        (nozzle / 2.0, 90.0, nozzle * 3.0, feed),
        (nozzle / 2.0, 0.0, nozzle, feed),
        (nozzle / 2.0, 0.0, nozzle, feed),
    ]
}

/// Assemble finished widgets into per-layer motions.
///
/// Progress runs from 0 to 0.5 under the label `prepare`.
pub fn prepare(widgets: &[Widget], settings: &Settings, progress: &mut dyn ProgressSink) -> Result<Assembly> {
    let settings = settings.clone().fixed();
    let process = &settings.process;
    let nozzle = settings
        .nozzle(0)
        .ok_or_else(|| SlicerError::InvalidSettings("invalid nozzle size".into()))?;
    let travel = process.speed.travel;

    let mut models: Vec<&Widget> = widgets.iter().filter(|w| !w.slices.is_empty()).collect();
    if models.is_empty() {
        return Err(PrintError::NoWidgets);
    }

    let mut bounds = Bounds::EMPTY;
    for w in &models {
        bounds.merge(&placed_bounds(w));
    }

    let mut output: Vec<PrintLayer> = Vec::new();
    let mut layer = PrintLayer::new(0);
    let mut point = Point3::origin();
    let mut zoff = 0.0;

    if process.brim.count > 0 || process.raft.enabled {
        let offset = if process.brim.offset > 0.0 {
            process.brim.offset
        } else if process.raft.enabled {
            RAFT_BRIM_OFFSET
        } else {
            0.0
        };
        let brim_z = process.first_layer_height;
        let brims = brim_base(&models, offset, nozzle, process.support.extra, brim_z);

        if process.raft.enabled {
            let base = PathStyle {
                tool: 0,
                speed: process.speed.first_layer,
                travel,
            };
            let mut started = false;
            for (height, angle, spacing, speed) in
                raft_passes(nozzle, process.speed.first_layer, process.speed.print)
            {
                let z = zoff + height;
                let style = PathStyle { speed, ..base };
                let mut raft = PrintLayer::new(output.len());
                raft.height = height;
                for brim in &brims {
                    let brim = brim.with_z(z);
                    if !started {
                        point = brim.first().copied().unwrap_or(point);
                        started = true;
                    }
                    point = print_poly(&brim, point, &Vec3::zeros(), &mut raft.motions, &style);
                    let inner = clip::offset(std::slice::from_ref(&brim), -nozzle / 2.0, z, 0.0);
                    let lines = fill_area(&inner, process.fill.angle + angle, spacing);
                    point = print_lines(&lines, point, &Vec3::zeros(), &mut raft.motions, &style);
                }
                output.push(raft);
                zoff += height;
            }
            zoff += process.raft.spacing;
            if let Some(last) = output.last_mut() {
                last.retract_last();
            }
            debug!(layers = output.len(), "raft complete");
        } else {
            let loops: Vec<Polygon> = brims
                .iter()
                .flat_map(|brim| {
                    (1..=process.brim.count).flat_map(move |i| {
                        clip::offset(std::slice::from_ref(brim), nozzle * i as f64, brim_z, 0.0)
                    })
                })
                .collect();
            let style = PathStyle {
                tool: 0,
                speed: process.speed.first_layer,
                travel,
            };
            point = print_polys(&loops, point, &Vec3::zeros(), &mut layer.motions, &style, |out, entry, current| {
                if !out.is_empty() && dist_2d(entry, current) > BRIM_RETRACT_GAP {
                    if let Some(m) = out.last_mut() {
                        m.retract = true;
                    }
                }
            });
            layer.retract_last();
            for l in &loops {
                bounds.merge(&l.bounds());
            }
        }
        for b in &brims {
            bounds.merge(&b.bounds());
        }
    }

    let support = support_widget(&models, process.support.extruder);
    if let Some(sw) = &support {
        models.push(sw);
    }

    // the support extruder keeps its purge block even when no support prints
    let mut engaged: BTreeSet<usize> = models.iter().map(|w| w.extruder).collect();
    if settings.nozzle(process.support.extruder).is_some() {
        engaged.insert(process.support.extruder);
    }
    let tools: Vec<(usize, f64)> = engaged
        .iter()
        .map(|&e| (e, settings.nozzle(e).unwrap_or(nozzle)))
        .collect();
    let blocks = purge_blocks(&bounds, &tools);
    let mut track = PurgeTrack::new(&blocks);

    let max_layers = models.iter().map(|w| w.slices.len()).max().unwrap_or(0);
    for index in 0..max_layers {
        let mut candidates: Vec<Option<usize>> = models
            .iter()
            .enumerate()
            .map(|(i, w)| (index < w.slices.len()).then_some(i))
            .collect();
        track.refresh(&blocks);
        let mut last: Option<(usize, usize, f64)> = None; // (widget, extruder, z)
        let mut height: Option<f64> = None;

        loop {
            let current_ext = last.map(|l| l.1);
            let best = candidates
                .iter()
                .enumerate()
                .filter_map(|(pos, c)| c.map(|w| (pos, w)))
                .filter_map(|(pos, w)| {
                    let widget = models[w];
                    let slice = &widget.slices[index];
                    let offset = Vec3::new(widget.position.x, widget.position.y, zoff);
                    let d = slice_distance(slice, &point, &offset, widget.support)?;
                    let penalty = match current_ext {
                        Some(e) if e != slice.extruder => EXTRUDER_PENALTY,
                        _ => 1.0,
                    };
                    Some((pos, w, d.abs() * penalty))
                })
                .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
            let Some((pos, w, _)) = best else {
                break;
            };
            candidates[pos] = None;

            let widget = models[w];
            let slice = &widget.slices[index];
            if !layer.is_empty() && last.map(|l| l.0) != Some(w) {
                layer.retract_last();
            }
            if slice.height > 0.0 {
                height = Some(height.map_or(slice.height, |h: f64| h.min(slice.height)));
            }
            let speed = if slice.index == 0 {
                process.speed.first_layer
            } else {
                process.speed.print
            };
            let style = PathStyle {
                tool: slice.extruder,
                speed,
                travel,
            };
            if current_ext != Some(slice.extruder) {
                point = track.purge(slice.extruder, &mut layer, point, slice.z + zoff, style);
            }
            let offset = Vec3::new(widget.position.x, widget.position.y, zoff);
            point = print_slice(slice, point, &offset, &mut layer.motions, &style, widget.support);
            last = Some((w, slice.extruder, slice.z + zoff));
        }

        // unused blocks are primed by the last tool so later layers have a base
        if let Some((_, tool, z)) = last {
            let style = PathStyle {
                tool,
                speed: process.speed.print,
                travel,
            };
            for extruder in track.pending() {
                point = track.purge(extruder, &mut layer, point, z, style);
            }
        }

        if !layer.is_empty() {
            layer.height = height.unwrap_or(process.layer_height);
            layer.retract_last();
            layer.index = output.len();
            output.push(std::mem::replace(&mut layer, PrintLayer::new(0)));
        }
        progress.update(Progress {
            fraction: (index + 1) as f64 / max_layers as f64 * 0.5,
            stage: "prepare",
            layer: None,
        });
    }

    Ok(Assembly {
        layers: output,
        bounds,
        purge_blocks: blocks,
        purges: track.purges,
    })
}

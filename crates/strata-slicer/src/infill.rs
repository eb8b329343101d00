//! Sparse infill.
//!
//! A [`FillStrategy`] draws raw lines across the widget bounds through a
//! [`FillTarget`]; the engine clips them to each top's fill boundary with
//! its solids removed. Strategies whose output does not depend on z are
//! marked fixed, which lets an unchanged layer clone the fill below.

use serde::{Deserialize, Serialize};
use strata_geom::{clip, fill_area, Bounds, Fingerprint, Line, Point3, Polygon};
use tracing::{debug, warn};

use crate::slice::Slice;

/// Fill pattern name that switches a widget to vase mode: a single outer
/// wall with no solid or sparse fill.
pub const VASE_PATTERN: &str = "vase";

/// Named fill strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillType {
    /// Zigzag rows forming a honeycomb.
    #[default]
    Hex,
    /// Crossing lines at 0° and 90°.
    Grid,
    /// Crossing lines at 0°, 60° and 120°.
    Triangle,
    /// Single direction alternating 45°/135° per layer.
    Linear,
    /// Sinusoidal rows whose phase follows z.
    Gyroid,
}

impl FillType {
    /// Every registered strategy.
    pub const ALL: [FillType; 5] = [
        FillType::Hex,
        FillType::Grid,
        FillType::Triangle,
        FillType::Linear,
        FillType::Gyroid,
    ];

    /// Look up a strategy by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Registry name.
    pub fn name(self) -> &'static str {
        match self {
            FillType::Hex => "hex",
            FillType::Grid => "grid",
            FillType::Triangle => "triangle",
            FillType::Linear => "linear",
            FillType::Gyroid => "gyroid",
        }
    }

    /// Strategy implementation.
    pub fn strategy(self) -> &'static dyn FillStrategy {
        match self {
            FillType::Hex => &HexFill,
            FillType::Grid => &GridFill,
            FillType::Triangle => &TriangleFill,
            FillType::Linear => &LinearFill,
            FillType::Gyroid => &GyroidFill,
        }
    }
}

/// Capability handed to a fill strategy.
#[derive(Debug, Clone)]
pub struct FillTarget {
    index: usize,
    z: f64,
    height: f64,
    density: f64,
    offset: f64,
    line_width: f64,
    bounds: Bounds,
    lines: Vec<Vec<Point3>>,
    line: Vec<Point3>,
    solids: Vec<Polygon>,
}

impl FillTarget {
    /// Target for one layer.
    pub fn new(slice: &Slice, params: &SparseParams) -> Self {
        Self {
            index: slice.index,
            z: slice.z,
            height: params.height,
            density: params.density,
            offset: params.spacing,
            line_width: params.line_width,
            bounds: params.bounds,
            lines: Vec::new(),
            line: Vec::new(),
            solids: Vec::new(),
        }
    }

    /// Layer index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Layer z.
    pub fn z(&self) -> f64 {
        self.z
    }

    /// Nominal slice height.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Fill density (0.0 to 1.0).
    pub fn density(&self) -> f64 {
        self.density
    }

    /// Fill offset spacing.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Extrusion width.
    pub fn line_width(&self) -> f64 {
        self.line_width
    }

    /// Widget bounds.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Distance between fill lines at this density.
    pub fn line_spacing(&self) -> f64 {
        self.line_width / self.density.max(1e-3)
    }

    /// Append a point to the current line.
    pub fn emit(&mut self, x: f64, y: f64) {
        self.line.push(Point3::new(x, y, self.z));
    }

    /// Finish the current line.
    pub fn new_line(&mut self) {
        if !self.line.is_empty() {
            self.lines.push(std::mem::take(&mut self.line));
        }
    }

    /// Request a solid region.
    pub fn emit_solid(&mut self, poly: Polygon) {
        self.solids.push(poly.with_z(self.z));
    }

    /// Emit a straight line.
    pub fn emit_line(&mut self, a: (f64, f64), b: (f64, f64)) {
        self.new_line();
        self.emit(a.0, a.1);
        self.emit(b.0, b.1);
        self.new_line();
    }

    fn finish(mut self) -> (Vec<Vec<Point3>>, Vec<Polygon>) {
        self.new_line();
        (self.lines, self.solids)
    }
}

/// A sparse fill pattern.
pub trait FillStrategy: Send + Sync {
    /// Draw raw lines into the target.
    fn fill(&self, target: &mut FillTarget);

    /// Output depends only on bounds and spacing, never on z.
    fn fixed(&self) -> bool {
        false
    }
}

/// Parallel lines at `angle` covering `bounds` with spacing `step`.
fn parallel_lines(target: &mut FillTarget, angle: f64, step: f64) {
    let b = target.bounds();
    if b.is_empty() || step <= 0.0 {
        return;
    }
    let rect = Polygon::rectangle(b.center(0.0), b.width() + step * 2.0, b.height() + step * 2.0);
    for line in fill_area(&[rect], angle, step) {
        target.emit_line((line.a.x, line.a.y), (line.b.x, line.b.y));
    }
}

/// Honeycomb from mirrored zigzag rows.
pub struct HexFill;

impl FillStrategy for HexFill {
    fn fill(&self, target: &mut FillTarget) {
        let b = target.bounds();
        let cell = target.line_spacing() * 2.0;
        if b.is_empty() || cell <= 0.0 {
            return;
        }
        let half = cell / 2.0;
        let rise = cell * 3f64.sqrt() / 4.0;
        let (x0, x1) = (b.min_x - cell, b.max_x + cell);
        let mut y = b.min_y - cell;
        let mut row = 0usize;
        while y <= b.max_y + cell {
            // odd rows mirror even rows so the zigzags meet in hexagons
            let flip = row % 2 == 1;
            let mut x = x0;
            let mut up = false;
            target.new_line();
            while x <= x1 {
                let dy = if up != flip { rise } else { 0.0 };
                target.emit(x, y + dy);
                x += half;
                up = !up;
            }
            target.new_line();
            y += rise * 2.0;
            row += 1;
        }
    }

    fn fixed(&self) -> bool {
        true
    }
}

/// Two perpendicular line sets on every layer.
pub struct GridFill;

impl FillStrategy for GridFill {
    fn fill(&self, target: &mut FillTarget) {
        let step = target.line_spacing() * 2.0;
        parallel_lines(target, 0.0, step);
        parallel_lines(target, 90.0, step);
    }

    fn fixed(&self) -> bool {
        true
    }
}

/// Three line sets at 60° on every layer.
pub struct TriangleFill;

impl FillStrategy for TriangleFill {
    fn fill(&self, target: &mut FillTarget) {
        let step = target.line_spacing() * 3.0;
        for angle in [0.0, 60.0, 120.0] {
            parallel_lines(target, angle, step);
        }
    }

    fn fixed(&self) -> bool {
        true
    }
}

/// One line set per layer, turning 90° between layers.
pub struct LinearFill;

impl FillStrategy for LinearFill {
    fn fill(&self, target: &mut FillTarget) {
        let angle = if target.index() % 2 == 0 { 45.0 } else { 135.0 };
        let step = target.line_spacing();
        parallel_lines(target, angle, step);
    }
}

/// Gyroid cross-section approximated by phase-shifted sine rows.
pub struct GyroidFill;

impl FillStrategy for GyroidFill {
    fn fill(&self, target: &mut FillTarget) {
        let b = target.bounds();
        let period = target.line_spacing() * 2.0;
        if b.is_empty() || period <= 0.0 {
            return;
        }
        let k = std::f64::consts::TAU / period;
        let phase = target.z() * k;
        let amplitude = period / 4.0;
        let step = period / 8.0;
        let vertical = target.index() % 2 == 1;

        let (lo, hi, across_lo, across_hi) = if vertical {
            (b.min_x, b.max_x, b.min_y, b.max_y)
        } else {
            (b.min_y, b.max_y, b.min_x, b.max_x)
        };
        let mut row = lo - period;
        while row <= hi + period {
            target.new_line();
            let mut t = across_lo - period;
            while t <= across_hi + period {
                let d = row + amplitude * (t * k + phase).sin();
                if vertical {
                    target.emit(d, t);
                } else {
                    target.emit(t, d);
                }
                t += step;
            }
            target.new_line();
            row += period / 2.0;
        }
    }
}

/// Per-layer sparse fill parameters.
#[derive(Debug, Clone)]
pub struct SparseParams {
    /// Strategy name.
    pub pattern: String,
    /// Fill density.
    pub density: f64,
    /// Fill offset spacing.
    pub spacing: f64,
    /// Extrusion width.
    pub line_width: f64,
    /// Widget bounds.
    pub bounds: Bounds,
    /// Nominal slice height.
    pub height: f64,
    /// Base fill angle for hinted solids.
    pub angle: f64,
}

/// Generate sparse fill for slice `index`, reusing the slice below when it
/// is structurally identical.
pub fn sparse_fill(slices: &mut [Slice], index: usize, params: &SparseParams) {
    if index >= slices.len() {
        return;
    }
    let (below, rest) = slices.split_at_mut(index);
    let slice = &mut rest[0];
    let down = slice.down.and_then(|d| below.get(d));

    if slice.tops.is_empty() || params.density == 0.0 || slice.is_solid_layer {
        return;
    }
    let Some(kind) = FillType::from_name(&params.pattern) else {
        warn!(pattern = %params.pattern, index, "unknown fill strategy, layer left empty");
        return;
    };
    let strategy = kind.strategy();

    let mut clip_polys = Vec::new();
    let mut solid_polys = Vec::new();
    for top in &slice.tops {
        clip_polys.extend(top.fill_off.iter().cloned());
        solid_polys.extend(top.solids.iter().cloned());
    }
    let mut fingerprint_polys = clip_polys.clone();
    fingerprint_polys.extend(solid_polys.iter().cloned());
    let fingerprint = Fingerprint::of(&fingerprint_polys);
    slice.fill_fingerprint = Some(fingerprint);

    if strategy.fixed() {
        if let Some(down) = down {
            if clone_from_below(slice, down, &fingerprint) {
                debug!(index, "sparse fill cloned from layer below");
                return;
            }
        }
    }

    let mut target = FillTarget::new(slice, params);
    strategy.fill(&mut target);
    let (lines, solids) = target.finish();

    for top in &mut slice.tops {
        top.fill_sparse = Some(Vec::new());
    }

    if !solids.is_empty() {
        fill_hinted_solids(slice, &solids, params);
    }
    if lines.is_empty() {
        return;
    }

    // even-odd: solids nested in the fill boundary cut holes in it
    let region = clip::xor(&clip_polys, &solid_polys, 0.0);
    let clipped = clip::clip_lines(&lines, &region, slice.z);
    for poly in clipped {
        if let Some(top) = slice.tops.iter_mut().find(|t| poly.is_inside(&t.poly)) {
            top.fill_sparse.get_or_insert_with(Vec::new).push(poly);
        }
    }
}

fn clone_from_below(slice: &mut Slice, down: &Slice, fingerprint: &Fingerprint) -> bool {
    if slice.fingerprint != down.fingerprint || down.fill_fingerprint.as_ref() != Some(fingerprint) {
        return false;
    }
    if down.tops.len() != slice.tops.len() {
        return false;
    }
    let mut cloned = Vec::with_capacity(slice.tops.len());
    for top in &down.tops {
        match &top.fill_sparse {
            Some(fill) => cloned.push(fill.iter().map(|p| p.with_z(slice.z)).collect()),
            None => return false,
        }
    }
    for (top, fill) in slice.tops.iter_mut().zip(cloned) {
        top.fill_sparse = Some(fill);
    }
    true
}

fn fill_hinted_solids(slice: &mut Slice, solids: &[Polygon], params: &SparseParams) {
    let z = slice.z;
    let angle = params.angle * ((slice.index % 2) + 1) as f64;
    for top in &mut slice.tops {
        if top.fill_off.is_empty() {
            continue;
        }
        let masks = if top.solids.is_empty() {
            top.fill_off.clone()
        } else {
            clip::subtract(&top.fill_off, &top.solids, 0.0)
        };
        for solid in solids {
            let inter = clip::intersect(std::slice::from_ref(solid), &masks, 0.0);
            if inter.is_empty() {
                continue;
            }
            for ring in Polygon::flatten(&inter) {
                top.fill_lines
                    .extend(ring.segments().map(|(a, b)| Line::new(*a, *b)));
            }
            let fillable = clip::offset(&inter, -params.line_width / 2.0, z, 0.0);
            top.fill_lines
                .extend(fill_area(&fillable, angle, params.line_width));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{shell_slice, ShellParams};

    const SHELLS: ShellParams = ShellParams {
        count: 2,
        first_offset: 0.2,
        shell_offset: 0.4,
        fill_offset: 0.28,
        thin: false,
        vase: false,
    };

    fn params(pattern: &str) -> SparseParams {
        SparseParams {
            pattern: pattern.into(),
            density: 0.2,
            spacing: 0.28,
            line_width: 0.4,
            bounds: Bounds::new(-10.0, -10.0, 10.0, 10.0),
            height: 0.2,
            angle: 45.0,
        }
    }

    fn layers(count: usize) -> Vec<Slice> {
        (0..count)
            .map(|i| {
                let z = 0.2 * (i + 1) as f64;
                let outline = Polygon::rectangle(Point3::new(0.0, 0.0, z), 20.0, 20.0);
                let mut s = Slice::new(i, z, 0.2, vec![outline]);
                s.down = i.checked_sub(1);
                shell_slice(&mut s, &SHELLS);
                s
            })
            .collect()
    }

    fn assert_contained(slice: &Slice) {
        let fill_off = slice.top_fill_off();
        for top in &slice.tops {
            for poly in top.fill_sparse.iter().flatten() {
                for p in &poly.points {
                    let inside = fill_off.iter().any(|f| f.bounds().expanded(1e-3).contains(p));
                    assert!(inside, "fill point {p:?} outside the fill boundary");
                }
            }
        }
    }

    #[test]
    fn test_registry_names() {
        for t in FillType::ALL {
            assert_eq!(FillType::from_name(t.name()), Some(t));
        }
        assert_eq!(FillType::from_name("nonesuch"), None);
        assert_eq!(FillType::from_name(VASE_PATTERN), None);
        assert!(FillType::Hex.strategy().fixed());
        assert!(!FillType::Gyroid.strategy().fixed());
    }

    #[test]
    fn test_every_strategy_fills_inside() {
        for t in FillType::ALL {
            let mut slices = layers(1);
            sparse_fill(&mut slices, 0, &params(t.name()));
            let fill = slices[0].tops[0].fill_sparse.as_ref().unwrap();
            assert!(!fill.is_empty(), "{} produced no fill", t.name());
            assert_contained(&slices[0]);
        }
    }

    #[test]
    fn test_unknown_strategy_leaves_layer_empty() {
        let mut slices = layers(1);
        sparse_fill(&mut slices, 0, &params("nonesuch"));
        assert!(slices[0].tops[0].fill_sparse.is_none());
    }

    #[test]
    fn test_fill_avoids_solids() {
        let mut slices = layers(1);
        let solid = Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 6.0, 6.0);
        slices[0].tops[0].solids.push(solid.clone());
        sparse_fill(&mut slices, 0, &params("grid"));
        for poly in slices[0].tops[0].fill_sparse.as_ref().unwrap() {
            for w in poly.points.windows(2) {
                let mid = Point3::new((w[0].x + w[1].x) / 2.0, (w[0].y + w[1].y) / 2.0, 0.0);
                assert!(!solid.bounds().expanded(-1e-3).contains(&mid));
            }
        }
    }

    #[test]
    fn test_fixed_strategy_clones_below() {
        let mut slices = layers(2);
        let p = params("hex");
        sparse_fill(&mut slices, 0, &p);
        sparse_fill(&mut slices, 1, &p);
        let below = slices[0].tops[0].fill_sparse.clone().unwrap();
        let above = slices[1].tops[0].fill_sparse.clone().unwrap();
        assert_eq!(below.len(), above.len());
        assert!((above[0].z() - slices[1].z).abs() < 1e-12);

        // recomputing gives the same geometry
        let mut fresh = layers(2);
        fresh[1].down = None;
        sparse_fill(&mut fresh, 1, &p);
        let recomputed = fresh[1].tops[0].fill_sparse.clone().unwrap();
        assert_eq!(recomputed.len(), above.len());
        for (cloned, fresh) in above.iter().zip(&recomputed) {
            assert_eq!(cloned.points.len(), fresh.points.len());
            for (a, b) in cloned.points.iter().zip(&fresh.points) {
                assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9, "{a:?} != {b:?}");
                assert!((a.z - slices[1].z).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_missing_fill_below_recomputes() {
        let mut slices = layers(2);
        let p = params("hex");
        // lower layer was solid and never got sparse fill
        slices[0].fill_fingerprint = Some(Fingerprint::of(&slices[0].top_fill_off()));
        sparse_fill(&mut slices, 1, &p);
        assert!(!slices[1].tops[0].fill_sparse.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_strategy_solid_hint_is_filled() {
        struct SolidHint;
        impl FillStrategy for SolidHint {
            fn fill(&self, target: &mut FillTarget) {
                target.emit_solid(Polygon::rectangle(Point3::new(0.0, 0.0, 0.0), 4.0, 4.0));
            }
        }
        let mut slices = layers(1);
        let mut target = FillTarget::new(&slices[0], &params("hex"));
        SolidHint.fill(&mut target);
        let (_, solids) = target.finish();
        fill_hinted_solids(&mut slices[0], &solids, &params("hex"));
        assert!(!slices[0].tops[0].fill_lines.is_empty());
    }
}

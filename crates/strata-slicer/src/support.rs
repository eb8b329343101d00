//! Support synthesis.
//!
//! Works bottom-up. Every wall and fill point of a layer is tested against
//! the layer below; unsupported points become pillars, pillars are merged,
//! smoothed with convex hulls and trimmed to the layer outline, then pushed
//! down until the model is in the way or nothing is left.

use strata_geom::{clip, dist_2d, dist_to_segment, fill_area, Point3, Polygon};

use crate::slice::{Slice, SupportArea};

/// Support remainders smaller than this are dropped during propagation (mm^2).
const MIN_PROPAGATED_AREA: f64 = 0.1;

/// Support synthesis parameters.
#[derive(Debug, Clone, Copy)]
pub struct SupportParams {
    /// Distance from a lower trace still counted as supported.
    pub min_offset: f64,
    /// Longest span tested only at its endpoints.
    pub max_bridge: f64,
    /// Outward growth of the outline support is trimmed to.
    pub expand: f64,
    /// Minimum area kept when subtracting lower layers.
    pub min_area: f64,
    /// Pillar side length.
    pub pillar_size: f64,
    /// Clearance between support and model.
    pub offset: f64,
    /// Layers below an overhang left without support.
    pub gap: usize,
    /// Maximum propagation depth, 0 for unbounded.
    pub max_depth: usize,
}

/// Model outline grown by the support clearance.
pub fn support_offsets(slice: &mut Slice, offset: f64) {
    slice.offsets = clip::offset(&slice.top_polys(), offset, slice.z, 0.0);
}

struct PointCheck<'a> {
    down_tops: &'a [Polygon],
    down_traces: &'a [Polygon],
    min_offset: f64,
    merge: f64,
    points: Vec<Point3>,
}

impl PointCheck<'_> {
    fn point(&mut self, point: Point3) {
        if self.points.iter().any(|p| dist_2d(p, &point) < self.merge) {
            return;
        }
        let supported = self.down_tops.iter().any(|t| t.contains_point_outer(&point))
            || self
                .down_traces
                .iter()
                .any(|t| t.segments().any(|(a, b)| dist_to_segment(&point, a, b) <= self.min_offset));
        if !supported {
            self.points.push(point);
        }
    }

    fn line(&mut self, a: &Point3, b: &Point3, max_bridge: f64, include_end: bool) {
        let dist = dist_2d(a, b);
        if max_bridge > 0.0 && dist >= max_bridge {
            let segs = (dist / max_bridge).floor() as usize + 1;
            for i in 1..segs {
                let t = i as f64 / segs as f64;
                self.point(Point3::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t, a.z));
            }
        }
        if include_end {
            self.point(*b);
        }
    }
}

/// Detect unsupported geometry on slice `index` and propagate support
/// down through the slices below it.
pub fn detect_support(slices: &mut [Slice], index: usize, params: &SupportParams) {
    if index == 0 || index >= slices.len() {
        return;
    }
    let Some(down_index) = slices[index].down else {
        return;
    };

    let slice = &slices[index];
    let tops = slice.top_polys();
    let trim_to = if params.expand > 0.0 {
        clip::offset(&tops, params.expand, slice.z, 0.0)
    } else {
        tops
    };

    let traces = Polygon::flatten(&slice.top_shells());
    let fill = slice.top_fill_lines();
    let down = &slices[down_index];
    let down_tops = down.top_polys();
    let down_traces = Polygon::flatten(&down.top_shells());

    let size = if params.pillar_size > 0.0 { params.pillar_size } else { 1.0 };
    let mut check = PointCheck {
        down_tops: &down_tops,
        down_traces: &down_traces,
        min_offset: params.min_offset,
        merge: size / 4.0,
        points: Vec::new(),
    };
    for trace in &traces {
        for (a, b) in trace.segments() {
            check.line(a, b, params.max_bridge, true);
        }
    }
    for line in &fill {
        check.line(&line.a, &line.b, params.max_bridge, false);
    }
    if check.points.is_empty() {
        return;
    }

    let z = slice.z;
    let pillars: Vec<Polygon> = check
        .points
        .iter()
        .map(|p| Polygon::rectangle(Point3::new(p.x, p.y, z), size, size))
        .collect();
    let hulls: Vec<Polygon> = clip::union(&pillars, 0.0)
        .iter()
        .filter_map(|cluster| Polygon::convex_hull(&cluster.points))
        .collect();
    let merged = clip::union(&hulls, 0.0);
    let mut supports = clip::trim_to(&merged, &trim_to);

    let min_area = if params.min_area > 0.0 { params.min_area } else { 0.01 };
    let mut depth = 0usize;
    let mut at = Some(down_index);
    while let Some(d) = at {
        if supports.is_empty() || (params.max_depth > 0 && depth >= params.max_depth) {
            break;
        }
        let lower = &mut slices[d];
        let culled: Vec<Polygon> = clip::subtract(&supports, &lower.top_polys(), min_area)
            .into_iter()
            .filter(|p| p.area() >= MIN_PROPAGATED_AREA)
            .map(|p| p.with_z(lower.z))
            .collect();
        if culled.is_empty() {
            break;
        }
        if depth >= params.gap {
            lower.supports.extend(culled.iter().map(|poly| SupportArea {
                poly: poly.clone(),
                fill: Vec::new(),
                origin: index,
                depth,
            }));
        }
        supports = culled;
        at = lower.down;
        depth += 1;
    }
}

/// Merge, clear and fill the supports of slice `index`.
pub fn fill_support(slices: &mut [Slice], index: usize, nozzle: f64, density: f64, min_area: f64) {
    if index >= slices.len() || slices[index].supports.is_empty() {
        return;
    }
    let min_area = if min_area > 0.0 { min_area } else { 0.1 };
    let down_offsets = slices[index]
        .down
        .map(|d| slices[d].offsets.clone())
        .unwrap_or_default();

    let slice = &mut slices[index];
    let z = slice.z;
    let sources = std::mem::take(&mut slice.supports);
    let polys: Vec<Polygon> = sources.iter().map(|s| s.poly.clone()).collect();

    let mut merged = clip::union(&polys, 0.0);
    if !slice.offsets.is_empty() {
        merged = clip::subtract(&merged, &slice.offsets, min_area);
    }
    if !down_offsets.is_empty() {
        merged = clip::subtract(&merged, &down_offsets, min_area);
    }

    let spacing = nozzle / density.max(1e-3);
    slice.supports = merged
        .into_iter()
        .map(|poly| {
            let b = poly.bounds();
            let angle = if b.height() > 0.0 && b.width() / b.height() > 1.0 { 90.0 } else { 0.0 };
            let inset = clip::offset(std::slice::from_ref(&poly), -nozzle / 3.0, z, 0.0);
            let fill = fill_area(&inset, angle, spacing);
            let source = sources
                .iter()
                .find(|s| s.poly.bounds().overlaps(&b));
            SupportArea {
                origin: source.map_or(index, |s| s.origin),
                depth: source.map_or(0, |s| s.depth),
                poly,
                fill,
            }
        })
        .collect();
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

    const PARAMS: SupportParams = SupportParams {
        min_offset: 1.0,
        max_bridge: 5.0,
        expand: 0.0,
        min_area: 0.1,
        pillar_size: 2.0,
        offset: 0.4,
        gap: 0,
        max_depth: 0,
    };

    /// A pillar `post` wide for `below` layers, then a `cap` wide plate
    /// centered on it.
    fn mushroom(below: usize, above: usize, post: f64, cap: f64) -> Vec<Slice> {
        let n = below + above;
        (0..n)
            .map(|i| {
                let z = 0.2 * (i + 1) as f64;
                let size = if i < below { post } else { cap };
                let outline = Polygon::rectangle(Point3::new(0.0, 0.0, z), size, size);
                let mut s = Slice::new(i, z, 0.2, vec![outline]);
                s.down = i.checked_sub(1);
                s.up = (i + 1 < n).then_some(i + 1);
                shell_slice(&mut s, &SHELLS);
                s
            })
            .collect()
    }

    #[test]
    fn test_supported_stack_needs_nothing() {
        let mut slices = mushroom(3, 2, 10.0, 10.0);
        for i in 1..slices.len() {
            detect_support(&mut slices, i, &PARAMS);
        }
        assert!(slices.iter().all(|s| s.supports.is_empty()));
    }

    #[test]
    fn test_overhang_propagates_to_bottom() {
        let mut slices = mushroom(4, 1, 4.0, 20.0);
        detect_support(&mut slices, 4, &PARAMS);
        for s in &slices[..4] {
            assert!(!s.supports.is_empty(), "layer {} has no support", s.index);
            for area in &s.supports {
                assert_eq!(area.origin, 4);
                assert!((area.poly.z() - s.z).abs() < 1e-12);
                // the post itself is never covered
                assert!(!area.poly.contains_point(&Point3::new(0.0, 0.0, s.z)));
            }
        }
        assert!(slices[4].supports.is_empty());
    }

    #[test]
    fn test_gap_and_depth_limits() {
        let mut slices = mushroom(4, 1, 4.0, 20.0);
        let params = SupportParams {
            gap: 1,
            max_depth: 3,
            ..PARAMS
        };
        detect_support(&mut slices, 4, &params);
        // depth 0 (layer 3) skipped by the gap, depth 3 (layer 0) past the limit
        assert!(slices[3].supports.is_empty());
        assert!(!slices[2].supports.is_empty());
        assert!(!slices[1].supports.is_empty());
        assert!(slices[0].supports.is_empty());
    }

    #[test]
    fn test_first_layer_never_detects() {
        let mut slices = mushroom(0, 1, 4.0, 20.0);
        detect_support(&mut slices, 0, &PARAMS);
        assert!(slices[0].supports.is_empty());
    }

    #[test]
    fn test_fill_support_clears_model() {
        let mut slices = mushroom(4, 1, 4.0, 20.0);
        detect_support(&mut slices, 4, &PARAMS);
        for i in 0..slices.len() {
            support_offsets(&mut slices[i], PARAMS.offset);
        }
        fill_support(&mut slices, 2, 0.4, 0.25, 0.1);
        let s = &slices[2];
        assert!(!s.supports.is_empty());
        for area in &s.supports {
            assert!(!area.fill.is_empty());
            assert!(clip::intersect(std::slice::from_ref(&area.poly), &s.offsets, 0.01).is_empty());
        }
    }
}

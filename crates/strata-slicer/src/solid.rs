//! Solid caps: diffing, projection and solid fill.
//!
//! A region present on layer `n` but not on `n - 1` is a bridge and needs
//! solid fill above it; the reverse is a flat and needs solid fill below.
//! Both are pushed through a fixed number of neighbouring layers and, once
//! every layer has received its projections, unioned, trimmed and filled.

use strata_geom::{clip, fill_area, Polygon};
use tracing::debug;

use crate::slice::Slice;

/// Default minimum solid area when none is configured (mm^2).
const DEFAULT_MIN_AREA: f64 = 1.0;

/// Fill a whole layer solid at `angle`.
pub fn solid_layer_fill(slice: &mut Slice, spacing: f64, angle: f64) {
    if slice.tops.is_empty() {
        slice.is_solid_layer = false;
        return;
    }
    for top in &mut slice.tops {
        let lines = fill_area(&top.fill_off, angle, spacing);
        top.fill_lines.extend(lines);
    }
    slice.is_solid_layer = true;
}

/// Diff slice `index` against the slice below: bridges go to `index`,
/// flats to `index - 1`.
pub fn diff_slice(slices: &mut [Slice], index: usize, min_area: f64) {
    if index == 0 || index >= slices.len() {
        return;
    }
    let (below, above) = slices.split_at_mut(index);
    let lower = &mut below[index - 1];
    let upper = &mut above[0];

    if upper.fingerprint == lower.fingerprint {
        debug!(index, "identical layers, skipping diff");
        upper.bridges.clear();
        lower.flats.clear();
        return;
    }
    let (bridges, flats) = clip::diff(&upper.top_inners(), &lower.top_inners(), min_area);
    upper.bridges = bridges;
    lower.flats = flats.into_iter().map(|p| p.with_z(lower.z)).collect();
}

/// Project a slice's flats down and bridges up.
pub fn project_slice(slices: &mut [Slice], index: usize, count: usize) {
    let Some(slice) = slices.get(index) else {
        return;
    };
    if slice.is_solid_layer {
        return;
    }
    if slice.down.is_some() && !slice.flats.is_empty() {
        let flats = slice.flats.clone();
        project_solid(slices, index, &flats, count, false);
    }
    let slice = &slices[index];
    if slice.up.is_some() && !slice.bridges.is_empty() {
        let bridges = slice.bridges.clone();
        project_solid(slices, index, &bridges, count, true);
    }
}

/// Copy `regions` into the solids of `count` slices starting at `origin`
/// (inclusive), walking up or down and stopping at solid layers.
fn project_solid(slices: &mut [Slice], origin: usize, regions: &[Polygon], count: usize, up: bool) {
    let hinted: Vec<Polygon> = regions
        .iter()
        .map(|p| {
            let mut p = p.clone();
            if p.fill_angle.is_none() {
                p.fill_angle = Some(p.longest_edge_angle());
            }
            p
        })
        .collect();

    let mut at = Some(origin);
    let mut remaining = count;
    while let Some(i) = at {
        let slice = &mut slices[i];
        if remaining == 0 || slice.is_solid_layer {
            break;
        }
        let z = slice.z;
        slice.solids.extend(hinted.iter().map(|p| p.with_z(z)));
        remaining -= 1;
        at = if up { slice.up } else { slice.down };
    }
}

/// Union, trim, parent and fill a slice's projected solids.
///
/// Returns false when there was nothing to fill.
pub fn fill_solids(slice: &mut Slice, spacing: f64, angle: f64, min_area: f64) -> bool {
    if slice.solids.is_empty() {
        return false;
    }
    let min_area = if min_area > 0.0 { min_area } else { DEFAULT_MIN_AREA };
    let sources = std::mem::take(&mut slice.solids);
    let unioned = clip::union(&sources, 0.0);
    if unioned.is_empty() {
        return false;
    }

    let inner = slice.top_fill_off();
    let mut trims = clip::intersect(&unioned, &inner, 0.0);
    // a merged region keeps the hint of a hinted source it overlaps
    for trim in &mut trims {
        let bounds = trim.bounds();
        trim.fill_angle = sources
            .iter()
            .find(|s| s.fill_angle.is_some() && s.bounds().overlaps(&bounds))
            .and_then(|s| s.fill_angle);
    }

    for top in &mut slice.tops {
        top.solids.clear();
    }

    // parent each region to the smallest top it overlaps
    for solid in &trims {
        if solid.area_deep() < min_area {
            continue;
        }
        let parent = slice
            .tops
            .iter()
            .enumerate()
            .filter(|(_, t)| t.poly.overlaps(solid))
            .min_by(|a, b| {
                a.1.poly
                    .area()
                    .partial_cmp(&b.1.poly.area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i);
        if let Some(i) = parent {
            slice.tops[i].solids.push(solid.clone());
        }
    }

    for top in &mut slice.tops {
        let (hinted, plain): (Vec<Polygon>, Vec<Polygon>) =
            top.solids.iter().cloned().partition(|s| s.fill_angle.is_some());
        if !plain.is_empty() {
            top.fill_lines.extend(fill_area(&plain, angle, spacing));
        }
        for solid in &hinted {
            let hint = solid.fill_angle.unwrap_or(angle);
            top.fill_lines
                .extend(fill_area(std::slice::from_ref(solid), hint + 45.0, spacing));
        }
    }

    slice.solids = trims;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{shell_slice, ShellParams};
    use strata_geom::Point3;

    const PARAMS: ShellParams = ShellParams {
        count: 2,
        first_offset: 0.2,
        shell_offset: 0.4,
        fill_offset: 0.28,
        thin: false,
        vase: false,
    };

    fn stack(sizes: &[f64]) -> Vec<Slice> {
        let mut slices: Vec<Slice> = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let z = 0.2 * (i + 1) as f64;
                let outline = Polygon::rectangle(Point3::new(0.0, 0.0, z), size, size);
                let mut s = Slice::new(i, z, 0.2, vec![outline]);
                shell_slice(&mut s, &PARAMS);
                s
            })
            .collect();
        let n = slices.len();
        for (i, s) in slices.iter_mut().enumerate() {
            s.down = i.checked_sub(1);
            s.up = (i + 1 < n).then_some(i + 1);
        }
        slices
    }

    #[test]
    fn test_identical_layers_have_no_diff() {
        let mut slices = stack(&[10.0, 10.0]);
        diff_slice(&mut slices, 1, 0.1);
        assert!(slices[1].bridges.is_empty());
        assert!(slices[0].flats.is_empty());
    }

    #[test]
    fn test_overhang_becomes_bridge() {
        let mut slices = stack(&[10.0, 20.0]);
        diff_slice(&mut slices, 1, 0.1);
        assert_eq!(slices[1].bridges.len(), 1);
        assert!(slices[1].bridges[0].holes.len() == 1);
        assert!(slices[0].flats.is_empty());
    }

    #[test]
    fn test_step_in_becomes_flat() {
        let mut slices = stack(&[20.0, 10.0]);
        diff_slice(&mut slices, 1, 0.1);
        assert!(slices[1].bridges.is_empty());
        assert_eq!(slices[0].flats.len(), 1);
        assert!((slices[0].flats[0].z() - slices[0].z).abs() < 1e-12);
    }

    #[test]
    fn test_projection_depth_and_hint() {
        let mut slices = stack(&[10.0, 20.0, 20.0, 20.0, 20.0, 20.0]);
        for i in 1..slices.len() {
            diff_slice(&mut slices, i, 0.1);
        }
        for i in 0..slices.len() {
            project_slice(&mut slices, i, 3);
        }
        // bridge at layer 1 reaches layers 1, 2 and 3
        assert!(slices[0].solids.is_empty());
        assert!(!slices[1].solids.is_empty());
        assert!(!slices[3].solids.is_empty());
        assert!(slices[4].solids.is_empty());
        assert!(slices[1].solids.iter().all(|s| s.fill_angle.is_some()));
        assert_eq!(slices[1].solids[0].fill_angle, slices[3].solids[0].fill_angle);
    }

    #[test]
    fn test_projection_stops_at_solid_layer() {
        let mut slices = stack(&[10.0, 20.0, 20.0, 20.0]);
        slices[2].is_solid_layer = true;
        diff_slice(&mut slices, 1, 0.1);
        project_slice(&mut slices, 1, 3);
        assert!(!slices[1].solids.is_empty());
        assert!(slices[2].solids.is_empty());
        assert!(slices[3].solids.is_empty());
    }

    #[test]
    fn test_top_slice_bridges_stay_put() {
        let mut slices = stack(&[10.0, 20.0]);
        diff_slice(&mut slices, 1, 0.1);
        assert!(!slices[1].bridges.is_empty());
        project_slice(&mut slices, 1, 2);
        assert!(slices[1].solids.is_empty());
        assert!(!fill_solids(&mut slices[1], 0.4, 0.0, 1.0));
    }

    #[test]
    fn test_fill_solids_parents_and_fills() {
        let mut slices = stack(&[10.0, 20.0, 20.0]);
        diff_slice(&mut slices, 1, 0.1);
        project_slice(&mut slices, 1, 2);
        let filled = fill_solids(&mut slices[1], 0.4, 0.0, 1.0);
        assert!(filled);
        assert_eq!(slices[1].tops[0].solids.len(), 1);
        assert!(!slices[1].tops[0].fill_lines.is_empty());
        let fill_off = &slices[1].tops[0].fill_off;
        for line in &slices[1].tops[0].fill_lines {
            let mid = Point3::new((line.a.x + line.b.x) / 2.0, (line.a.y + line.b.y) / 2.0, 0.0);
            assert!(fill_off.iter().any(|f| f.contains_point(&mid)));
        }
    }

    #[test]
    fn test_fill_solids_drops_small_regions() {
        let mut slices = stack(&[10.0, 20.0, 20.0]);
        diff_slice(&mut slices, 1, 0.1);
        project_slice(&mut slices, 1, 2);
        fill_solids(&mut slices[1], 0.4, 0.0, 1000.0);
        assert!(slices[1].tops[0].solids.is_empty());
        assert!(slices[1].tops[0].fill_lines.is_empty());
    }

    #[test]
    fn test_solid_layer_fill() {
        let mut slices = stack(&[10.0]);
        solid_layer_fill(&mut slices[0], 0.4, 45.0);
        assert!(slices[0].is_solid_layer);
        assert!(!slices[0].tops[0].fill_lines.is_empty());

        let mut empty = Slice::new(0, 0.2, 0.2, vec![]);
        solid_layer_fill(&mut empty, 0.4, 45.0);
        assert!(!empty.is_solid_layer);
    }
}

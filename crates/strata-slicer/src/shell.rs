//! Wall shell generation.
//!
//! The first inset is half a nozzle so the outer wall's edge lands on the
//! outline; every further inset is a full nozzle width. The innermost
//! shell, pulled in by the fill offset, becomes the boundary fill is
//! clipped to.

use strata_geom::{clip, cull_intersections, fill_area, Polygon};

use crate::slice::{Slice, Top};

/// Minimum area of an inset in thin-wall mode (mm^2).
const THIN_MIN_AREA: f64 = 0.05;

/// Gap regions are shrunk by this fraction of the offset before filling.
const GAP_SHRINK: f64 = 0.8;

/// Shell parameters for one layer.
#[derive(Debug, Clone, Copy)]
pub struct ShellParams {
    /// Requested shell count.
    pub count: usize,
    /// First inset distance.
    pub first_offset: f64,
    /// Subsequent inset distance.
    pub shell_offset: f64,
    /// Inset from innermost shell to fill boundary.
    pub fill_offset: f64,
    /// Thin-wall gap detection.
    pub thin: bool,
    /// Vase mode: holes are dropped so only the outer wall is printed.
    pub vase: bool,
}

/// Generate shells for every top of a slice.
pub fn shell_slice(slice: &mut Slice, params: &ShellParams) {
    let z = slice.z;
    for top in &mut slice.tops {
        shell_top(top, z, params);
    }
}

fn tag_depth(polys: &mut [Polygon], depth: i32) {
    for p in polys {
        p.depth = depth;
        for h in &mut p.holes {
            h.depth = -depth;
        }
    }
}

/// Generate shells, fill boundary and thin fill for one top.
pub fn shell_top(top: &mut Top, z: f64, params: &ShellParams) {
    top.shells.clear();
    top.fill_off.clear();
    top.fill_lines.clear();
    top.thin_fill.clear();
    if params.vase {
        top.poly.holes.clear();
    }

    let outline = vec![top.poly.clone()];
    let mut gaps: Vec<Polygon> = Vec::new();

    let last = if params.count == 0 {
        outline
    } else if params.first_offset == 0.0 && params.count == 1 {
        let mut shells = outline;
        tag_depth(&mut shells, 0);
        top.shells = shells.clone();
        shells
    } else if params.thin {
        let mut current = outline;
        let mut last = Vec::new();
        for i in 0..params.count {
            let off = if i == 0 { params.first_offset } else { params.shell_offset };
            let mut inset = clip::offset(&current, -off, z, THIN_MIN_AREA);
            if inset.is_empty() {
                break;
            }
            // whatever the inset cannot grow back into is too narrow for a wall
            let back = clip::offset(&inset, off, z, 0.0);
            let gap = clip::subtract(&current, &back, THIN_MIN_AREA);
            if !gap.is_empty() {
                let shrunk = clip::offset(&gap, -off * GAP_SHRINK, z, 0.0);
                top.thin_fill.extend(cull_intersections(
                    fill_area(&shrunk, 45.0, off / 2.0),
                    fill_area(&shrunk, 135.0, off / 2.0),
                ));
                gaps = shrunk;
            }
            tag_depth(&mut inset, i as i32);
            top.shells.extend(inset.iter().cloned());
            last = inset.clone();
            current = inset;
        }
        last
    } else {
        let mut current = outline;
        let mut last = Vec::new();
        for i in 0..params.count {
            let off = if i == 0 { params.first_offset } else { params.shell_offset };
            let mut inset = clip::offset(&current, -off, z, 0.0);
            if inset.is_empty() {
                break;
            }
            tag_depth(&mut inset, i as i32);
            top.shells.extend(inset.iter().cloned());
            last = inset.clone();
            current = inset;
        }
        last
    };

    if !last.is_empty() {
        let source = if gaps.is_empty() {
            last.clone()
        } else {
            clip::subtract(&last, &gaps, 0.0)
        };
        top.fill_off = if params.fill_offset > 0.0 {
            clip::offset(&source, -params.fill_offset, z, 0.0)
        } else {
            source
        };
    }
    top.last = last;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strata_geom::Point3;

    fn params(count: usize) -> ShellParams {
        ShellParams {
            count,
            first_offset: 0.2,
            shell_offset: 0.4,
            fill_offset: 0.28,
            thin: false,
            vase: false,
        }
    }

    fn square_top(size: f64) -> Top {
        Top::new(Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), size, size))
    }

    #[test]
    fn test_shells_shrink_monotonically() {
        let mut top = square_top(10.0);
        shell_top(&mut top, 0.2, &params(3));
        assert_eq!(top.shells.len(), 3);

        let mut previous = top.poly.area();
        for (i, shell) in top.shells.iter().enumerate() {
            assert_eq!(shell.depth, i as i32);
            assert!(shell.area() <= previous);
            previous = shell.area();
        }
        // 10 - 2 * (0.2 + 0.4 + 0.4)
        assert_relative_eq!(top.shells[2].area(), 64.0, epsilon = 0.01);
        assert_relative_eq!(top.fill_off[0].area(), (8.0f64 - 0.56).powi(2), epsilon = 0.01);
        assert_eq!(top.last.len(), 1);
    }

    #[test]
    fn test_fewer_shells_when_material_runs_out() {
        let mut top = square_top(1.5);
        shell_top(&mut top, 0.2, &params(5));
        // 1.5 -> 1.1 -> 0.3 -> gone
        assert_eq!(top.shells.len(), 2);
    }

    #[test]
    fn test_zero_shells_fill_outline() {
        let mut top = square_top(10.0);
        shell_top(&mut top, 0.2, &params(0));
        assert!(top.shells.is_empty());
        assert_relative_eq!(top.last[0].area(), 100.0, epsilon = 1e-9);
        assert_relative_eq!(top.fill_off[0].area(), (10.0f64 - 0.56).powi(2), epsilon = 0.01);
    }

    #[test]
    fn test_zero_offset_single_shell_is_outline() {
        let mut top = square_top(10.0);
        let p = ShellParams {
            count: 1,
            first_offset: 0.0,
            ..params(1)
        };
        shell_top(&mut top, 0.2, &p);
        assert_eq!(top.shells.len(), 1);
        assert_relative_eq!(top.shells[0].area(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_hole_shells_negative_depth() {
        let mut hole = Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 4.0, 4.0);
        hole.ensure_cw();
        let outline = Polygon::with_holes(
            Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 20.0, 20.0).points,
            vec![hole],
        );
        let mut top = Top::new(outline);
        shell_top(&mut top, 0.2, &params(2));
        assert_eq!(top.shells.len(), 2);
        assert_eq!(top.shells[1].holes.len(), 1);
        assert_eq!(top.shells[1].holes[0].depth, -1);
    }

    #[test]
    fn test_thin_mode_matches_standard_without_gaps() {
        let mut standard = square_top(10.0);
        shell_top(&mut standard, 0.2, &params(3));
        let mut thin = square_top(10.0);
        shell_top(&mut thin, 0.2, &ShellParams { thin: true, ..params(3) });
        assert_eq!(thin.shells.len(), standard.shells.len());
        assert!(thin.thin_fill.is_empty());
    }

    #[test]
    fn test_vase_mode_drops_holes() {
        let mut hole = Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 4.0, 4.0);
        hole.ensure_cw();
        let outline = Polygon::with_holes(
            Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 20.0, 20.0).points,
            vec![hole],
        );
        let mut top = Top::new(outline);
        shell_top(&mut top, 0.2, &ShellParams { vase: true, ..params(2) });
        assert!(top.poly.holes.is_empty());
        assert_eq!(top.shells.len(), 2);
        assert!(top.shells.iter().all(|s| s.holes.is_empty()));
    }
}

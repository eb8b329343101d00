//! Turning slice geometry into motions.
//!
//! Paths are visited nearest-first from the current head position. Closed
//! loops are entered at their closest vertex, open paths and lines from
//! whichever end is closer. Geometry is in widget coordinates; `offset`
//! moves it onto the bed.

use strata_geom::{dist_2d, Line, Point3, Polygon, Vec3};
use strata_slicer::Slice;

use crate::motion::Motion;

/// Tool and feed rates for a run of paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStyle {
    /// Extruder.
    pub tool: usize,
    /// Print feed rate.
    pub speed: f64,
    /// Travel feed rate.
    pub travel: f64,
}

/// Entry vertex of a path and its distance from `from`.
fn entry(poly: &Polygon, from: &Point3) -> Option<(usize, f64)> {
    if poly.is_closed() {
        return poly.closest_vertex(from);
    }
    let first = dist_2d(poly.first()?, from);
    let last = dist_2d(poly.last()?, from);
    if last < first {
        Some((poly.len() - 1, last))
    } else {
        Some((0, first))
    }
}

/// Print one polygon starting near `start`, then its holes nearest-first.
/// Returns the end point.
pub fn print_poly(
    poly: &Polygon,
    start: Point3,
    offset: &Vec3,
    out: &mut Vec<Motion>,
    style: &PathStyle,
) -> Point3 {
    let local = start - offset;
    let Some((k, _)) = entry(poly, &local) else {
        return start;
    };
    let n = poly.len();
    let order: Vec<usize> = if poly.is_closed() {
        (0..=n).map(|i| (k + i) % n).collect()
    } else if k == 0 {
        (0..n).collect()
    } else {
        (0..n).rev().collect()
    };

    let mut end = start;
    for (i, &idx) in order.iter().enumerate() {
        let point = poly.points[idx] + offset;
        let motion = if i == 0 {
            Motion::travel(point, style.tool, style.travel)
        } else {
            Motion::print(point, style.tool, style.speed)
        };
        out.push(motion);
        end = point;
    }
    if !poly.holes.is_empty() {
        end = print_polys(&poly.holes, end, offset, out, style, |_, _, _| {});
    }
    end
}

/// Print polygons nearest-first. `on_entry` sees the motions so far, the
/// entry point of the next path and the current head position before the
/// travel to it.
pub fn print_polys<F>(
    polys: &[Polygon],
    start: Point3,
    offset: &Vec3,
    out: &mut Vec<Motion>,
    style: &PathStyle,
    mut on_entry: F,
) -> Point3
where
    F: FnMut(&mut Vec<Motion>, &Point3, &Point3),
{
    let mut current = start;
    let mut remaining: Vec<usize> = (0..polys.len()).collect();

    while !remaining.is_empty() {
        let local = current - offset;
        let best = remaining
            .iter()
            .enumerate()
            .filter_map(|(pos, &i)| entry(&polys[i], &local).map(|(v, d)| (pos, i, v, d)))
            .min_by(|a, b| a.3.partial_cmp(&b.3).unwrap_or(std::cmp::Ordering::Equal));
        let Some((pos, i, v, _)) = best else {
            break;
        };
        remaining.remove(pos);
        let entry_point = polys[i].points[v] + offset;
        on_entry(out, &entry_point, &current);
        current = print_poly(&polys[i], current, offset, out, style);
    }
    current
}

/// Print line segments nearest-first, each from its closer end.
pub fn print_lines(
    lines: &[Line],
    start: Point3,
    offset: &Vec3,
    out: &mut Vec<Motion>,
    style: &PathStyle,
) -> Point3 {
    let mut current = start;
    let mut remaining: Vec<Line> = lines.to_vec();

    while !remaining.is_empty() {
        let local = current - offset;
        let best = remaining
            .iter()
            .enumerate()
            .map(|(i, l)| {
                let da = dist_2d(&l.a, &local);
                let db = dist_2d(&l.b, &local);
                (i, db < da, da.min(db))
            })
            .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        let Some((i, flip, _)) = best else {
            break;
        };
        let line = remaining.swap_remove(i);
        let line = if flip { line.reversed() } else { line };
        out.push(Motion::travel(line.a + offset, style.tool, style.travel));
        out.push(Motion::print(line.b + offset, style.tool, style.speed));
        current = line.b + offset;
    }
    current
}

/// Distance from `point` (bed coordinates) to the nearest printable vertex
/// of a slice, `None` when the slice has nothing to print.
pub fn slice_distance(slice: &Slice, point: &Point3, offset: &Vec3, support: bool) -> Option<f64> {
    let local = point - offset;
    let polys: Vec<Polygon> = if support {
        slice.support_polys()
    } else {
        slice.top_polys()
    };
    polys
        .iter()
        .filter_map(|p| p.closest_vertex(&local).map(|(_, d)| d))
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

/// Print a finished slice: per island its shells, solid and thin fill,
/// then sparse fill. A support slice prints its support outlines and
/// support fill instead.
pub fn print_slice(
    slice: &Slice,
    start: Point3,
    offset: &Vec3,
    out: &mut Vec<Motion>,
    style: &PathStyle,
    support: bool,
) -> Point3 {
    let mut current = start;

    if support {
        let mut areas: Vec<usize> = (0..slice.supports.len()).collect();
        while !areas.is_empty() {
            let local = current - offset;
            let best = areas
                .iter()
                .enumerate()
                .filter_map(|(pos, &i)| {
                    slice.supports[i]
                        .poly
                        .closest_vertex(&local)
                        .map(|(_, d)| (pos, i, d))
                })
                .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
            let Some((pos, i, _)) = best else {
                break;
            };
            areas.remove(pos);
            let area = &slice.supports[i];
            let rings = Polygon::flatten(std::slice::from_ref(&area.poly));
            current = print_polys(&rings, current, offset, out, style, |_, _, _| {});
            current = print_lines(&area.fill, current, offset, out, style);
        }
        return current;
    }

    let outlines = slice.top_polys();
    let mut tops: Vec<usize> = (0..slice.tops.len()).collect();
    while !tops.is_empty() {
        let local = current - offset;
        let best = tops
            .iter()
            .enumerate()
            .filter_map(|(pos, &i)| outlines[i].closest_vertex(&local).map(|(_, d)| (pos, i, d)))
            .min_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        let Some((pos, i, _)) = best else {
            break;
        };
        tops.remove(pos);
        let top = &slice.tops[i];

        let shells = Polygon::flatten(&top.shells);
        current = print_polys(&shells, current, offset, out, style, |_, _, _| {});
        let mut lines = top.thin_fill.clone();
        lines.extend(top.fill_lines.iter().copied());
        current = print_lines(&lines, current, offset, out, style);
        if let Some(sparse) = &top.fill_sparse {
            current = print_polys(sparse, current, offset, out, style, |_, _, _| {});
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLE: PathStyle = PathStyle {
        tool: 0,
        speed: 50.0,
        travel: 120.0,
    };

    #[test]
    fn test_closed_poly_enters_at_nearest_vertex() {
        let square = Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 2.0, 2.0);
        let mut out = Vec::new();
        let end = print_poly(&square, Point3::new(5.0, 5.0, 0.0), &Vec3::zeros(), &mut out, &STYLE);
        assert_eq!(out.len(), 5);
        assert!(!out[0].emit);
        assert!(out[1..].iter().all(|m| m.emit));
        assert!((out[0].point.x - 1.0).abs() < 1e-12 && (out[0].point.y - 1.0).abs() < 1e-12);
        assert_eq!(end, out[0].point);
    }

    #[test]
    fn test_poly_holes_are_traced() {
        let mut hole = Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 2.0, 2.0);
        hole.ensure_cw();
        let ring = Polygon::with_holes(
            Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 10.0, 10.0).points,
            vec![hole],
        );
        let mut out = Vec::new();
        let end = print_poly(&ring, Point3::new(8.0, 8.0, 0.0), &Vec3::zeros(), &mut out, &STYLE);
        assert_eq!(out.len(), 10);
        assert!((out[0].point.x - 5.0).abs() < 1e-12 && (out[0].point.y - 5.0).abs() < 1e-12);
        // travel onto the hole, then around it
        assert!(!out[5].emit);
        assert!(out[5..].iter().all(|m| m.point.x.abs() <= 1.0 + 1e-12));
        assert!(out[6..].iter().all(|m| m.emit));
        assert_eq!(end, out[5].point);
    }

    #[test]
    fn test_open_poly_runs_from_nearer_end() {
        let path = Polygon::open(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ]);
        let mut out = Vec::new();
        let end = print_poly(&path, Point3::new(3.0, 0.0, 0.0), &Vec3::zeros(), &mut out, &STYLE);
        assert_eq!(out.len(), 3);
        assert!((out[0].point.x - 2.0).abs() < 1e-12);
        assert!(end.x.abs() < 1e-12);
    }

    #[test]
    fn test_offset_applied() {
        let square = Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 2.0, 2.0);
        let offset = Vec3::new(10.0, 0.0, 1.0);
        let mut out = Vec::new();
        print_poly(&square, Point3::new(20.0, 0.0, 0.0), &offset, &mut out, &STYLE);
        assert!(out.iter().all(|m| m.point.x >= 9.0 - 1e-12));
        assert!(out.iter().all(|m| (m.point.z - 1.2).abs() < 1e-12));
    }

    #[test]
    fn test_lines_nearest_first_and_flipped() {
        let lines = vec![
            Line::new(Point3::new(0.0, 5.0, 0.0), Point3::new(10.0, 5.0, 0.0)),
            Line::new(Point3::new(10.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0)),
        ];
        let mut out = Vec::new();
        let end = print_lines(&lines, Point3::origin(), &Vec3::zeros(), &mut out, &STYLE);
        assert_eq!(out.len(), 4);
        // second line first, reversed to start at the origin
        assert!(out[0].point.x.abs() < 1e-12 && out[0].point.y.abs() < 1e-12);
        assert!((out[1].point.x - 10.0).abs() < 1e-12);
        assert!((out[2].point.x - 10.0).abs() < 1e-12 && (out[2].point.y - 5.0).abs() < 1e-12);
        assert!(end.x.abs() < 1e-12);
    }

    #[test]
    fn test_print_polys_reports_entries() {
        let polys = vec![
            Polygon::rectangle(Point3::new(20.0, 0.0, 0.0), 2.0, 2.0),
            Polygon::rectangle(Point3::new(2.0, 0.0, 0.0), 2.0, 2.0),
        ];
        let mut entries = Vec::new();
        let mut out = Vec::new();
        print_polys(&polys, Point3::origin(), &Vec3::zeros(), &mut out, &STYLE, |_, p, _| {
            entries.push(p.x)
        });
        assert_eq!(entries.len(), 2);
        assert!(entries[0] < 5.0 && entries[1] > 15.0);
    }
}

//! Directional line fill.
//!
//! Scanline fill of a polygon set along an arbitrary angle. Lines are
//! placed on multiples of `spacing` in the rotated frame so adjacent
//! layers filled at the same angle line up exactly.

use serde::{Deserialize, Serialize};

use crate::polygon::Polygon;
use crate::{dist_2d, Point3};

/// A single fill segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Start point.
    pub a: Point3,
    /// End point.
    pub b: Point3,
}

impl Line {
    /// Create a line.
    pub fn new(a: Point3, b: Point3) -> Self {
        Self { a, b }
    }

    /// Length in the layer plane.
    pub fn length(&self) -> f64 {
        dist_2d(&self.a, &self.b)
    }

    /// Same segment, opposite direction.
    pub fn reversed(&self) -> Self {
        Self::new(self.b, self.a)
    }

    /// Whether two segments cross at a single interior point.
    pub fn crosses(&self, other: &Line) -> bool {
        let d1 = orient(&other.a, &other.b, &self.a);
        let d2 = orient(&other.a, &other.b, &self.b);
        let d3 = orient(&self.a, &self.b, &other.a);
        let d4 = orient(&self.a, &self.b, &other.b);
        d1 * d2 < 0.0 && d3 * d4 < 0.0
    }

    /// As an open two-point polyline.
    pub fn to_polygon(&self) -> Polygon {
        Polygon::open(vec![self.a, self.b])
    }
}

fn orient(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn rotate(x: f64, y: f64, sin: f64, cos: f64) -> (f64, f64) {
    (x * cos - y * sin, x * sin + y * cos)
}

/// Fill closed polygons (holes respected, even-odd) with parallel lines
/// running at `angle_deg`, `spacing` apart. Consecutive lines alternate
/// direction.
pub fn fill_area(polys: &[Polygon], angle_deg: f64, spacing: f64) -> Vec<Line> {
    if spacing <= 0.0 || polys.is_empty() {
        return Vec::new();
    }
    let rad = angle_deg.to_radians();
    let (sin, cos) = rad.sin_cos();

    // rotate by -angle so fill lines become horizontal
    let rings: Vec<(Vec<(f64, f64)>, f64)> = Polygon::flatten(polys)
        .iter()
        .filter(|p| p.is_closed() && p.len() >= 3)
        .map(|p| {
            let pts = p.points.iter().map(|q| rotate(q.x, q.y, -sin, cos)).collect();
            (pts, p.z())
        })
        .collect();
    if rings.is_empty() {
        return Vec::new();
    }

    let (mut min_y, mut max_y) = (f64::MAX, f64::MIN);
    for (pts, _) in &rings {
        for &(_, y) in pts {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    let z = rings[0].1;
    let first = (min_y / spacing).ceil() as i64;
    let last = (max_y / spacing).floor() as i64;

    let mut lines = Vec::new();
    let mut row = 0usize;
    for k in first..=last {
        let y = k as f64 * spacing;
        let mut xs: Vec<f64> = Vec::new();
        for (pts, _) in &rings {
            let n = pts.len();
            for i in 0..n {
                let (x1, y1) = pts[i];
                let (x2, y2) = pts[(i + 1) % n];
                if (y1 > y) != (y2 > y) {
                    xs.push(x1 + (y - y1) * (x2 - x1) / (y2 - y1));
                }
            }
        }
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut spans: Vec<(f64, f64)> = xs
            .chunks_exact(2)
            .filter(|c| c[1] - c[0] > 1e-9)
            .map(|c| (c[0], c[1]))
            .collect();
        if spans.is_empty() {
            continue;
        }
        if row % 2 == 1 {
            spans.reverse();
            for s in &mut spans {
                *s = (s.1, s.0);
            }
        }
        row += 1;
        for (x0, x1) in spans {
            let (ax, ay) = rotate(x0, y, sin, cos);
            let (bx, by) = rotate(x1, y, sin, cos);
            lines.push(Line::new(Point3::new(ax, ay, z), Point3::new(bx, by, z)));
        }
    }
    lines
}

/// Resolve crossings between two line sets: for every crossing pair the
/// longer line is dropped. Returns the survivors of both sets, or nothing
/// when fewer than two remain.
pub fn cull_intersections(a: Vec<Line>, b: Vec<Line>) -> Vec<Line> {
    let mut a_del = vec![false; a.len()];
    let mut b_del = vec![false; b.len()];
    for (i, la) in a.iter().enumerate() {
        for (j, lb) in b.iter().enumerate() {
            if a_del[i] {
                break;
            }
            if b_del[j] || !la.crosses(lb) {
                continue;
            }
            if la.length() < lb.length() {
                b_del[j] = true;
            } else {
                a_del[i] = true;
            }
        }
    }
    let kept: Vec<Line> = a
        .into_iter()
        .zip(a_del)
        .chain(b.into_iter().zip(b_del))
        .filter(|(_, del)| !del)
        .map(|(l, _)| l)
        .collect();
    if kept.len() < 2 {
        Vec::new()
    } else {
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Polygon {
        Polygon::rectangle(Point3::new(size / 2.0, size / 2.0, 0.3), size, size)
    }

    #[test]
    fn test_fill_horizontal() {
        let lines = fill_area(&[square(10.0)], 0.0, 1.0);
        // rows at y = 0..=9, the top edge is excluded
        assert_eq!(lines.len(), 10);
        for l in &lines {
            assert!((l.length() - 10.0).abs() < 1e-9);
            assert!((l.a.z - 0.3).abs() < 1e-12);
        }
        // alternating direction
        assert!(lines[0].a.x < lines[0].b.x);
        assert!(lines[1].a.x > lines[1].b.x);
    }

    #[test]
    fn test_fill_respects_holes() {
        let mut hole = Polygon::rectangle(Point3::new(5.0, 5.0, 0.3), 4.0, 4.0);
        hole.ensure_cw();
        let poly = Polygon::with_holes(square(10.0).points, vec![hole]);
        let lines = fill_area(&[poly], 0.0, 1.0);
        // rows 3 to 6 are split by the hole
        assert_eq!(lines.len(), 14);
        let total: f64 = lines.iter().map(Line::length).sum();
        assert!((total - (10.0 * 10.0 - 4.0 * 4.0)).abs() < 1e-9);
    }

    #[test]
    fn test_fill_vertical_stays_inside() {
        let sq = Polygon::rectangle(Point3::new(5.5, 5.5, 0.3), 10.0, 10.0);
        let lines = fill_area(&[sq.clone()], 90.0, 2.0);
        assert!(!lines.is_empty());
        for l in &lines {
            let mid = Point3::new((l.a.x + l.b.x) / 2.0, (l.a.y + l.b.y) / 2.0, 0.0);
            assert!(sq.contains_point(&mid));
            assert!((l.a.x - l.b.x).abs() < 1e-9);
        }
    }

    #[test]
    fn test_cull_drops_longer_line() {
        let long = Line::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 0.0));
        let short = Line::new(Point3::new(4.0, 6.0, 0.0), Point3::new(6.0, 4.0, 0.0));
        let lone = Line::new(Point3::new(20.0, 0.0, 0.0), Point3::new(21.0, 0.0, 0.0));
        let kept = cull_intersections(vec![long, lone], vec![short]);
        assert_eq!(kept.len(), 2);
        assert!(kept.contains(&short));
        assert!(!kept.contains(&long));
    }

    #[test]
    fn test_cull_single_survivor_is_empty() {
        let long = Line::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 0.0));
        let short = Line::new(Point3::new(4.0, 6.0, 0.0), Point3::new(6.0, 4.0, 0.0));
        assert!(cull_intersections(vec![long], vec![short]).is_empty());
    }
}

//! The polygon type shared by every pipeline stage.

use geo::{ConvexHull, MultiPoint};
use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;
use crate::{dist_2d, Point3, Vec3};

/// A planar polygon at a fixed z, open or closed, with optional holes.
///
/// Closed outer boundaries are kept counter-clockwise and holes clockwise
/// once passed through [`Polygon::normalize`] (every clipper result is).
/// The closing vertex is never stored twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Vertices in order.
    pub points: Vec<Point3>,
    /// Open polylines are not implicitly closed.
    #[serde(default)]
    pub open: bool,
    /// Holes inside this (outer) polygon.
    #[serde(default)]
    pub holes: Vec<Polygon>,
    /// Offset index: 0 for the outermost wall, negative for hole walls.
    #[serde(default)]
    pub depth: i32,
    /// Solid fill direction hint in degrees, set when a cap is projected.
    #[serde(default)]
    pub fill_angle: Option<f64>,
}

impl Polygon {
    /// Create a closed polygon from points.
    pub fn new(points: Vec<Point3>) -> Self {
        Self {
            points,
            open: false,
            holes: Vec::new(),
            depth: 0,
            fill_angle: None,
        }
    }

    /// Create an open polyline from points.
    pub fn open(points: Vec<Point3>) -> Self {
        Self {
            open: true,
            ..Self::new(points)
        }
    }

    /// Create a closed polygon with holes.
    pub fn with_holes(points: Vec<Point3>, holes: Vec<Polygon>) -> Self {
        Self {
            holes,
            ..Self::new(points)
        }
    }

    /// Axis-aligned rectangle centered on `center` with full `width` x `height`.
    pub fn rectangle(center: Point3, width: f64, height: f64) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        Self::new(vec![
            Point3::new(center.x - hw, center.y - hh, center.z),
            Point3::new(center.x + hw, center.y - hh, center.z),
            Point3::new(center.x + hw, center.y + hh, center.z),
            Point3::new(center.x - hw, center.y + hh, center.z),
        ])
    }

    /// Regular polygon approximating a circle.
    pub fn circle(center: Point3, radius: f64, segments: usize) -> Self {
        let n = segments.max(3);
        let points = (0..n)
            .map(|i| {
                let a = std::f64::consts::TAU * i as f64 / n as f64;
                Point3::new(center.x + radius * a.cos(), center.y + radius * a.sin(), center.z)
            })
            .collect();
        Self::new(points)
    }

    /// Open rectangular spiral winding inward from a `width` x `height`
    /// rectangle around `center`, shrinking by `step` per turn.
    pub fn spiral(center: Point3, width: f64, height: f64, step: f64, turns: usize) -> Self {
        let mut points = Vec::new();
        let z = center.z;
        for turn in 0..turns {
            let inset = turn as f64 * step;
            let hw = width / 2.0 - inset;
            let hh = height / 2.0 - inset;
            if hw <= 0.0 || hh <= 0.0 {
                break;
            }
            let (x0, y0) = (center.x - hw, center.y - hh);
            let (x1, y1) = (center.x + hw, center.y + hh);
            points.push(Point3::new(x0, y0, z));
            points.push(Point3::new(x1, y0, z));
            points.push(Point3::new(x1, y1, z));
            points.push(Point3::new(x0, y1, z));
            // drop into the next turn
            points.push(Point3::new(x0, (y0 + step).min(y1), z));
        }
        Self::open(points)
    }

    /// Convex hull of a point cloud, at the z of the first point.
    pub fn convex_hull(points: &[Point3]) -> Option<Self> {
        let z = points.first()?.z;
        let cloud: MultiPoint<f64> = points.iter().map(|p| (p.x, p.y)).collect::<Vec<_>>().into();
        let hull = cloud.convex_hull();
        let mut pts: Vec<Point3> = hull
            .exterior()
            .coords()
            .map(|c| Point3::new(c.x, c.y, z))
            .collect();
        if pts.len() > 1 && pts.first() == pts.last() {
            pts.pop();
        }
        if pts.len() < 3 {
            return None;
        }
        let mut poly = Self::new(pts);
        poly.normalize();
        Some(poly)
    }

    /// Check if the polygon has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Is this a closed polygon?
    pub fn is_closed(&self) -> bool {
        !self.open
    }

    /// Z of the first vertex (0 when empty).
    pub fn z(&self) -> f64 {
        self.points.first().map_or(0.0, |p| p.z)
    }

    /// Set z for every vertex, holes included.
    pub fn set_z(&mut self, z: f64) -> &mut Self {
        for p in &mut self.points {
            p.z = z;
        }
        for h in &mut self.holes {
            h.set_z(z);
        }
        self
    }

    /// Copy placed at `z`.
    pub fn with_z(&self, z: f64) -> Self {
        let mut p = self.clone();
        p.set_z(z);
        p
    }

    /// Translate every vertex, holes included.
    pub fn translate(&mut self, v: &Vec3) -> &mut Self {
        for p in &mut self.points {
            *p += v;
        }
        for h in &mut self.holes {
            h.translate(v);
        }
        self
    }

    /// First vertex.
    pub fn first(&self) -> Option<&Point3> {
        self.points.first()
    }

    /// Last vertex.
    pub fn last(&self) -> Option<&Point3> {
        self.points.last()
    }

    /// Signed area of the outer ring.
    /// Positive for counter-clockwise, negative for clockwise.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area / 2.0
    }

    /// Unsigned area of the outer ring.
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Area of the outer ring minus its holes.
    pub fn area_deep(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(Polygon::area).sum();
        (self.area() - holes).max(0.0)
    }

    /// Is the outer ring counter-clockwise?
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverse the winding order.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Ensure counter-clockwise winding.
    pub fn ensure_ccw(&mut self) {
        if !self.is_ccw() {
            self.reverse();
        }
    }

    /// Ensure clockwise winding.
    pub fn ensure_cw(&mut self) {
        if self.is_ccw() {
            self.reverse();
        }
    }

    /// Outer counter-clockwise, holes clockwise.
    pub fn normalize(&mut self) {
        if self.open {
            return;
        }
        self.ensure_ccw();
        for h in &mut self.holes {
            h.ensure_cw();
        }
    }

    /// Length of the outline, including the closing edge when closed.
    pub fn perimeter(&self) -> f64 {
        self.segments().map(|(a, b)| dist_2d(a, b)).sum()
    }

    /// Compute centroid of the vertices.
    pub fn centroid(&self) -> Point3 {
        if self.points.is_empty() {
            return Point3::origin();
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |acc, p| (acc.0 + p.x, acc.1 + p.y));
        Point3::new(sx / n, sy / n, self.z())
    }

    /// Bounds of the outer ring.
    pub fn bounds(&self) -> Bounds {
        Bounds::of_points(&self.points)
    }

    /// Edges as point pairs; closed polygons include the closing edge.
    pub fn segments(&self) -> impl Iterator<Item = (&Point3, &Point3)> + '_ {
        let n = self.points.len();
        let count = if self.open || n < 2 { n.saturating_sub(1) } else { n };
        (0..count).map(move |i| (&self.points[i], &self.points[(i + 1) % n]))
    }

    /// Even-odd test against the outer ring only.
    pub fn contains_point_outer(&self, point: &Point3) -> bool {
        point_in_ring(point, &self.points)
    }

    /// Inside the outer ring and outside every hole.
    pub fn contains_point(&self, point: &Point3) -> bool {
        self.contains_point_outer(point) && !self.holes.iter().any(|h| h.contains_point_outer(point))
    }

    /// True if this polygon lies inside `other`, judged by a representative
    /// point (midpoint of the first edge, robust to endpoints on the edge).
    pub fn is_inside(&self, other: &Polygon) -> bool {
        let probe = match (self.points.first(), self.points.get(1)) {
            (Some(a), Some(b)) => Point3::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0, a.z),
            (Some(a), None) => *a,
            _ => return false,
        };
        other.contains_point(&probe)
    }

    /// Whether the two closed regions share any area.
    pub fn overlaps(&self, other: &Polygon) -> bool {
        if !self.bounds().overlaps(&other.bounds()) {
            return false;
        }
        !crate::clip::intersect(std::slice::from_ref(self), std::slice::from_ref(other), 0.0).is_empty()
    }

    /// Index of and distance to the vertex nearest `point`.
    pub fn closest_vertex(&self, point: &Point3) -> Option<(usize, f64)> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, dist_2d(p, point)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Direction of the longest edge in degrees, in `[0, 180)`.
    pub fn longest_edge_angle(&self) -> f64 {
        let best = self
            .segments()
            .max_by(|a, b| {
                dist_2d(a.0, a.1)
                    .partial_cmp(&dist_2d(b.0, b.1))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        match best {
            Some((a, b)) => (b.y - a.y).atan2(b.x - a.x).to_degrees().rem_euclid(180.0),
            None => 0.0,
        }
    }

    /// Outer ring and each hole as standalone polygons.
    pub fn flatten(polys: &[Polygon]) -> Vec<Polygon> {
        let mut out = Vec::new();
        for p in polys {
            let mut outer = p.clone();
            let holes = std::mem::take(&mut outer.holes);
            out.push(outer);
            out.extend(Polygon::flatten(&holes));
        }
        out
    }
}

/// Check if a point is inside a ring (2D, even-odd).
pub fn point_in_ring(point: &Point3, ring: &[Point3]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let pi = &ring[i];
        let pj = &ring[j];

        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(size: f64) -> Polygon {
        Polygon::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(size, 0.0, 0.0),
            Point3::new(size, size, 0.0),
            Point3::new(0.0, size, 0.0),
        ])
    }

    #[test]
    fn test_polygon_area() {
        let sq = square(1.0);
        assert_relative_eq!(sq.signed_area(), 1.0, epsilon = 1e-10);
        assert!(sq.is_ccw());
    }

    #[test]
    fn test_area_deep_with_hole() {
        let mut hole = Polygon::rectangle(Point3::new(5.0, 5.0, 0.0), 2.0, 2.0);
        hole.ensure_cw();
        let poly = Polygon::with_holes(square(10.0).points, vec![hole]);
        assert_relative_eq!(poly.area_deep(), 96.0, epsilon = 1e-10);
        assert!(!poly.contains_point(&Point3::new(5.0, 5.0, 0.0)));
        assert!(poly.contains_point(&Point3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn test_segments_open_vs_closed() {
        let mut sq = square(2.0);
        assert_eq!(sq.segments().count(), 4);
        assert_relative_eq!(sq.perimeter(), 8.0);
        sq.open = true;
        assert_eq!(sq.segments().count(), 3);
    }

    #[test]
    fn test_convex_hull_drops_interior_points() {
        let pts = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(4.0, 0.0, 1.0),
            Point3::new(2.0, 1.0, 1.0),
            Point3::new(4.0, 4.0, 1.0),
            Point3::new(0.0, 4.0, 1.0),
        ];
        let hull = Polygon::convex_hull(&pts).unwrap();
        assert_eq!(hull.len(), 4);
        assert!(hull.is_ccw());
        assert_relative_eq!(hull.z(), 1.0);
    }

    #[test]
    fn test_spiral_is_open_and_shrinks() {
        let s = Polygon::spiral(Point3::new(0.0, 0.0, 0.0), 9.0, 4.0, 0.8, 3);
        assert!(s.open);
        assert_eq!(s.len(), 15);
        assert!(s.bounds().width() <= 9.0 + 1e-9);
    }

    #[test]
    fn test_longest_edge_angle() {
        let r = Polygon::rectangle(Point3::origin(), 2.0, 10.0);
        assert_relative_eq!(r.longest_edge_angle(), 90.0, epsilon = 1e-9);
    }
}

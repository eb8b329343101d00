//! Polygon boolean and offset operations.
//!
//! Thin layer over geo-clipper. Every result is normalized (outer CCW,
//! holes CW), placed at the z of the subject, and filtered by a minimum
//! area so degenerate slivers never reach the pipeline.

use geo::{Coord, LineString, MultiLineString, MultiPolygon, Polygon as GeoPolygon};
use geo_clipper::{Clipper, ClipperOpen, EndType, JoinType};

use crate::polygon::Polygon;
use crate::Point3;

/// Fixed-point scale handed to Clipper (1 unit = 1 micron).
pub const SCALE: f64 = 1000.0;

/// Anything smaller than this is numerical noise.
const DEGENERATE_AREA: f64 = 1e-6;

const MITER_LIMIT: f64 = 2.0;

fn ring(points: &[Point3]) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    if let (Some(first), Some(last)) = (coords.first(), coords.last()) {
        if first != last {
            coords.push(*first);
        }
    }
    LineString::new(coords)
}

fn to_geo(poly: &Polygon) -> GeoPolygon<f64> {
    GeoPolygon::new(ring(&poly.points), poly.holes.iter().map(|h| ring(&h.points)).collect())
}

fn to_multi(polys: &[Polygon]) -> MultiPolygon<f64> {
    MultiPolygon::new(polys.iter().filter(|p| p.is_closed() && p.len() >= 3).map(to_geo).collect())
}

fn unring(ls: &LineString<f64>, z: f64) -> Vec<Point3> {
    let mut pts: Vec<Point3> = ls.coords().map(|c| Point3::new(c.x, c.y, z)).collect();
    if pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    pts
}

fn from_multi(multi: &MultiPolygon<f64>, z: f64, min_area: f64) -> Vec<Polygon> {
    multi
        .0
        .iter()
        .filter_map(|g| {
            let holes = g
                .interiors()
                .iter()
                .map(|h| Polygon::new(unring(h, z)))
                .filter(|h| h.area() > DEGENERATE_AREA)
                .collect();
            let mut poly = Polygon::with_holes(unring(g.exterior(), z), holes);
            poly.normalize();
            let area = poly.area_deep();
            (poly.len() >= 3 && area > DEGENERATE_AREA && area >= min_area).then_some(poly)
        })
        .collect()
}

fn z_of(polys: &[Polygon]) -> f64 {
    polys.first().map_or(0.0, Polygon::z)
}

/// Union of a set of possibly overlapping polygons.
pub fn union(polys: &[Polygon], min_area: f64) -> Vec<Polygon> {
    if polys.is_empty() {
        return Vec::new();
    }
    let z = z_of(polys);
    // fold pairwise so overlapping subjects merge regardless of fill rule
    let merged = polys
        .iter()
        .filter(|p| p.is_closed() && p.len() >= 3)
        .fold(MultiPolygon::new(Vec::new()), |acc, p| {
            Clipper::union(&acc, &to_geo(p), SCALE)
        });
    from_multi(&merged, z, min_area)
}

/// `subject - clip`.
pub fn subtract(subject: &[Polygon], clip: &[Polygon], min_area: f64) -> Vec<Polygon> {
    if subject.is_empty() {
        return Vec::new();
    }
    let z = z_of(subject);
    if clip.is_empty() {
        return from_multi(&to_multi(subject), z, min_area);
    }
    let result = Clipper::difference(&to_multi(subject), &to_multi(clip), SCALE);
    from_multi(&result, z, min_area)
}

/// Both one-sided differences: `(a - b, b - a)`.
pub fn diff(a: &[Polygon], b: &[Polygon], min_area: f64) -> (Vec<Polygon>, Vec<Polygon>) {
    (subtract(a, b, min_area), subtract(b, a, min_area))
}

/// Intersection of two polygon sets.
pub fn intersect(subject: &[Polygon], clip: &[Polygon], min_area: f64) -> Vec<Polygon> {
    if subject.is_empty() || clip.is_empty() {
        return Vec::new();
    }
    let z = z_of(subject);
    let result = Clipper::intersection(&to_multi(subject), &to_multi(clip), SCALE);
    from_multi(&result, z, min_area)
}

/// Symmetric difference of two polygon sets.
pub fn xor(subject: &[Polygon], clip: &[Polygon], min_area: f64) -> Vec<Polygon> {
    let z = if subject.is_empty() { z_of(clip) } else { z_of(subject) };
    if clip.is_empty() {
        return from_multi(&to_multi(subject), z, min_area);
    }
    let result = Clipper::xor(&to_multi(subject), &to_multi(clip), SCALE);
    from_multi(&result, z, min_area)
}

/// Keep only the parts of `polys` inside `bounds`.
pub fn trim_to(polys: &[Polygon], bounds: &[Polygon]) -> Vec<Polygon> {
    intersect(polys, bounds, 0.0)
}

/// Offset closed polygons. Positive `delta` grows, negative shrinks.
/// Results are placed at `z`.
pub fn offset(polys: &[Polygon], delta: f64, z: f64, min_area: f64) -> Vec<Polygon> {
    let multi = to_multi(polys);
    if multi.0.is_empty() {
        return Vec::new();
    }
    if delta == 0.0 {
        return from_multi(&multi, z, min_area);
    }
    let result = Clipper::offset(
        &multi,
        delta,
        JoinType::Miter(MITER_LIMIT),
        EndType::ClosedPolygon,
        SCALE,
    );
    from_multi(&result, z, min_area)
}

/// Clip open polylines to the inside of closed polygons.
pub fn clip_lines(lines: &[Vec<Point3>], clip: &[Polygon], z: f64) -> Vec<Polygon> {
    let clip = to_multi(clip);
    if lines.is_empty() || clip.0.is_empty() {
        return Vec::new();
    }
    let subject = MultiLineString::new(
        lines
            .iter()
            .filter(|l| l.len() >= 2)
            .map(|l| LineString::new(l.iter().map(|p| Coord { x: p.x, y: p.y }).collect()))
            .collect(),
    );
    let result = ClipperOpen::intersection(&subject, &clip, SCALE);
    result
        .0
        .iter()
        .map(|ls| Polygon::open(ls.coords().map(|c| Point3::new(c.x, c.y, z)).collect()))
        .filter(|p| p.len() >= 2)
        .collect()
}

/// Arrange loose closed rings into outer polygons with holes.
///
/// A ring nested inside an even number of other rings is an outer
/// boundary; odd nesting makes it a hole of its smallest container.
/// Existing holes on the inputs are dropped and rebuilt from nesting.
pub fn nest(polys: Vec<Polygon>) -> Vec<Polygon> {
    let mut rings: Vec<Polygon> = polys
        .into_iter()
        .filter(|p| p.is_closed() && p.len() >= 3)
        .flat_map(|p| Polygon::flatten(std::slice::from_ref(&p)))
        .collect();
    rings.sort_by(|a, b| b.area().partial_cmp(&a.area()).unwrap_or(std::cmp::Ordering::Equal));

    // containers of ring i are always at lower indices (larger area)
    let mut level = vec![0usize; rings.len()];
    let mut parent: Vec<Option<usize>> = vec![None; rings.len()];
    for i in 0..rings.len() {
        let probe = rings[i].points[0];
        for j in (0..i).rev() {
            if rings[j].contains_point_outer(&probe) {
                level[i] = level[j] + 1;
                parent[i] = Some(j);
                break;
            }
        }
    }

    let mut outers: Vec<(usize, Polygon)> = Vec::new();
    for (i, ring) in rings.iter().enumerate() {
        if level[i] % 2 == 0 {
            let mut outer = ring.clone();
            outer.holes.clear();
            outer.ensure_ccw();
            outers.push((i, outer));
        }
    }
    for (i, ring) in rings.iter().enumerate() {
        if level[i] % 2 == 1 {
            if let Some(p) = parent[i] {
                if let Some((_, outer)) = outers.iter_mut().find(|(idx, _)| *idx == p) {
                    let mut hole = ring.clone();
                    hole.holes.clear();
                    hole.ensure_cw();
                    outer.holes.push(hole);
                }
            }
        }
    }
    outers.into_iter().map(|(_, p)| p).collect()
}

/// Total area of a polygon set, holes removed.
pub fn total_area(polys: &[Polygon]) -> f64 {
    polys.iter().map(Polygon::area_deep).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x: f64, y: f64, size: f64) -> Polygon {
        Polygon::rectangle(Point3::new(x + size / 2.0, y + size / 2.0, 0.5), size, size)
    }

    #[test]
    fn test_offset_shrink_and_grow() {
        let sq = square(0.0, 0.0, 10.0);
        let inner = offset(&[sq.clone()], -1.0, 0.5, 0.0);
        assert_eq!(inner.len(), 1);
        assert_relative_eq!(inner[0].area(), 64.0, epsilon = 0.01);
        assert_relative_eq!(inner[0].z(), 0.5);

        let outer = offset(&[sq], 1.0, 0.5, 0.0);
        assert_relative_eq!(outer[0].area(), 144.0, epsilon = 0.01);
    }

    #[test]
    fn test_offset_shrink_to_nothing() {
        let sq = square(0.0, 0.0, 1.0);
        assert!(offset(&[sq], -0.6, 0.0, 0.0).is_empty());
    }

    #[test]
    fn test_union_merges_overlaps() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 0.0, 10.0);
        let c = square(50.0, 0.0, 1.0);
        let u = union(&[a, b, c], 0.0);
        assert_eq!(u.len(), 2);
        assert_relative_eq!(total_area(&u), 151.0, epsilon = 0.01);
    }

    #[test]
    fn test_diff_both_sides() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(5.0, 0.0, 10.0);
        let (ab, ba) = diff(&[a], &[b], 0.0);
        assert_relative_eq!(total_area(&ab), 50.0, epsilon = 0.01);
        assert_relative_eq!(total_area(&ba), 50.0, epsilon = 0.01);
    }

    #[test]
    fn test_min_area_filter() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(0.1, 0.0, 10.0);
        // leaves a 0.1 x 10 sliver on each side
        let (ab, _) = diff(&[a], &[b], 2.0);
        assert!(ab.is_empty());
    }

    #[test]
    fn test_subtract_creates_hole() {
        let outer = square(0.0, 0.0, 10.0);
        let inner = square(3.0, 3.0, 4.0);
        let ring = subtract(&[outer], &[inner], 0.0);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring[0].holes.len(), 1);
        assert!(ring[0].is_ccw());
        assert!(!ring[0].holes[0].is_ccw());
        assert_relative_eq!(ring[0].area_deep(), 84.0, epsilon = 0.01);
    }

    #[test]
    fn test_clip_lines() {
        let sq = square(0.0, 0.0, 10.0);
        let line = vec![Point3::new(-5.0, 5.0, 0.0), Point3::new(15.0, 5.0, 0.0)];
        let clipped = clip_lines(&[line], &[sq], 0.5);
        assert_eq!(clipped.len(), 1);
        assert!(clipped[0].open);
        assert_relative_eq!(clipped[0].perimeter(), 10.0, epsilon = 0.01);
    }

    #[test]
    fn test_nest_assigns_holes() {
        let outer = square(0.0, 0.0, 10.0);
        let hole = square(3.0, 3.0, 4.0);
        let island = square(4.0, 4.0, 2.0);
        let nested = nest(vec![hole, island, outer]);
        assert_eq!(nested.len(), 2);
        let big = nested.iter().find(|p| p.area() > 50.0).unwrap();
        assert_eq!(big.holes.len(), 1);
    }
}

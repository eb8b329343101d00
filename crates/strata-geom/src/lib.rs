#![warn(missing_docs)]

//! Planar geometry for the strata slicer.
//!
//! Layers are stacks of planar polygons carrying a z height. This crate
//! provides the polygon type used throughout the pipeline, boolean and
//! offset operations backed by Clipper, directional line fill, and the
//! structural fingerprints used to detect unchanged layers.
//!
//! # Example
//!
//! ```ignore
//! use strata_geom::{clip, fill, Polygon, Point3};
//!
//! let square = Polygon::rectangle(Point3::new(5.0, 5.0, 0.2), 5.0, 5.0);
//! let insets = clip::offset(&[square], -0.4, 0.2, 0.0);
//! let lines = fill::fill_area(&insets, 45.0, 0.4);
//! ```

pub mod bounds;
pub mod clip;
pub mod fill;
pub mod fingerprint;
pub mod polygon;

pub use bounds::Bounds;
pub use fill::{cull_intersections, fill_area, Line};
pub use fingerprint::Fingerprint;
pub use polygon::Polygon;

/// A point in 3D space (x, y in the layer plane, z the layer height).
pub type Point3 = nalgebra::Point3<f64>;

/// A point in the layer plane.
pub type Point2 = nalgebra::Point2<f64>;

/// A 3D translation vector.
pub type Vec3 = nalgebra::Vector3<f64>;

/// Distance between two points ignoring z.
pub fn dist_2d(a: &Point3, b: &Point3) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Distance from `p` to the segment `a`-`b`, ignoring z.
pub fn dist_to_segment(p: &Point3, a: &Point3, b: &Point3) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-18 {
        return dist_2d(p, a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    let proj = Point3::new(a.x + t * dx, a.y + t * dy, a.z);
    dist_2d(p, &proj)
}

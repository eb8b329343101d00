//! Structural fingerprints of polygon sets.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::polygon::Polygon;

const QUANTUM: f64 = 1000.0;

/// Summary of a polygon set's planar geometry, ignoring z.
///
/// Two sets with equal fingerprints have the same rings with the same
/// vertices to within a micron, in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Number of rings, holes included.
    pub rings: usize,
    /// Total vertex count.
    pub points: usize,
    /// Hash of the quantized vertices.
    pub hash: u64,
}

impl Fingerprint {
    /// Fingerprint a polygon set.
    pub fn of(polys: &[Polygon]) -> Self {
        let mut hasher = DefaultHasher::new();
        let mut rings = 0;
        let mut points = 0;
        for ring in Polygon::flatten(polys) {
            rings += 1;
            points += ring.len();
            ring.open.hash(&mut hasher);
            ring.len().hash(&mut hasher);
            for p in &ring.points {
                ((p.x * QUANTUM).round() as i64).hash(&mut hasher);
                ((p.y * QUANTUM).round() as i64).hash(&mut hasher);
            }
        }
        Self {
            rings,
            points,
            hash: hasher.finish(),
        }
    }

    /// True for the fingerprint of an empty set.
    pub fn is_empty(&self) -> bool {
        self.rings == 0
    }
}

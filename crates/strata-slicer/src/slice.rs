//! Layer data: tops, slices and widgets.

use serde::{Deserialize, Serialize};
use strata_geom::{clip, Bounds, Fingerprint, Line, Polygon, Vec3};

use crate::error::{Result, SlicerError};
use crate::preview::RenderLayers;

/// Pipeline stage a slice has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Cross-section only.
    Raw,
    /// Shells and fill boundaries generated.
    Shelled,
    /// Bridges and flats computed against neighbours.
    Diffed,
    /// Caps projected into neighbouring solids.
    Projected,
    /// Solid and sparse fill generated.
    Filled,
    /// Support synthesized and filled.
    Supported,
    /// Preview render produced.
    Rendered,
}

impl Stage {
    /// The stage that must precede this one.
    pub fn previous(self) -> Option<Stage> {
        match self {
            Stage::Raw => None,
            Stage::Shelled => Some(Stage::Raw),
            Stage::Diffed => Some(Stage::Shelled),
            Stage::Projected => Some(Stage::Diffed),
            Stage::Filled => Some(Stage::Projected),
            Stage::Supported => Some(Stage::Filled),
            Stage::Rendered => Some(Stage::Supported),
        }
    }
}

/// Opaque reference to the mesh a widget was sliced from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshRef(pub String);

/// One contiguous island on a layer.
#[derive(Debug, Clone, Default)]
pub struct Top {
    /// Outline with holes.
    pub poly: Polygon,
    /// Wall offsets, depth tagged (0 outermost, holes negative).
    pub shells: Vec<Polygon>,
    /// Innermost shell set, used for diffing.
    pub last: Vec<Polygon>,
    /// Fill clip boundary.
    pub fill_off: Vec<Polygon>,
    /// Solid fill segments.
    pub fill_lines: Vec<Line>,
    /// Sparse fill polylines, `None` until computed.
    pub fill_sparse: Option<Vec<Polygon>>,
    /// Solid regions owned by this top.
    pub solids: Vec<Polygon>,
    /// Crossing fill for gaps too narrow for a wall.
    pub thin_fill: Vec<Line>,
}

impl Top {
    /// Top from an outline.
    pub fn new(poly: Polygon) -> Self {
        Self {
            poly,
            ..Default::default()
        }
    }
}

/// A support region attached to a layer.
#[derive(Debug, Clone)]
pub struct SupportArea {
    /// Support outline.
    pub poly: Polygon,
    /// Fill segments, empty until support fill runs.
    pub fill: Vec<Line>,
    /// Index of the layer whose overhang produced this region.
    pub origin: usize,
    /// Layers between the origin and this layer, minus one.
    pub depth: usize,
}

/// One z cross-section of a widget.
#[derive(Debug, Clone)]
pub struct Slice {
    /// Position in the widget's slice array.
    pub index: usize,
    /// Z of the layer top.
    pub z: f64,
    /// Layer thickness.
    pub height: f64,
    /// Islands on this layer.
    pub tops: Vec<Top>,
    /// Support regions.
    pub supports: Vec<SupportArea>,
    /// Model outline grown by the support clearance.
    pub offsets: Vec<Polygon>,
    /// Regions with nothing below.
    pub bridges: Vec<Polygon>,
    /// Regions with nothing above.
    pub flats: Vec<Polygon>,
    /// Projected solid regions (before parenting to tops).
    pub solids: Vec<Polygon>,
    /// Fingerprint of the top outlines.
    pub fingerprint: Fingerprint,
    /// Fingerprint of the sparse fill clip, set when sparse fill runs.
    pub fill_fingerprint: Option<Fingerprint>,
    /// Index of the slice above.
    pub up: Option<usize>,
    /// Index of the slice below.
    pub down: Option<usize>,
    /// Extruder printing this slice.
    pub extruder: usize,
    /// Filled solid at the layer angle.
    pub is_solid_layer: bool,
    /// Preview render, set in the last stage.
    pub preview: Option<RenderLayers>,
    stage: Stage,
}

impl Slice {
    /// New raw slice. Loose rings are nested into tops.
    pub fn new(index: usize, z: f64, height: f64, outlines: Vec<Polygon>) -> Self {
        let tops: Vec<Top> = clip::nest(outlines)
            .into_iter()
            .map(|mut p| {
                p.set_z(z);
                Top::new(p)
            })
            .collect();
        let outlines: Vec<Polygon> = tops.iter().map(|t| t.poly.clone()).collect();
        Self {
            index,
            z,
            height,
            fingerprint: Fingerprint::of(&outlines),
            tops,
            supports: Vec::new(),
            offsets: Vec::new(),
            bridges: Vec::new(),
            flats: Vec::new(),
            solids: Vec::new(),
            fill_fingerprint: None,
            up: None,
            down: None,
            extruder: 0,
            is_solid_layer: false,
            preview: None,
            stage: Stage::Raw,
        }
    }

    /// Completed stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to the next stage. Skipping or repeating a stage is an error.
    pub fn advance(&mut self, to: Stage) -> Result<()> {
        match to.previous() {
            Some(expected) if expected == self.stage => {
                self.stage = to;
                Ok(())
            }
            Some(expected) => Err(SlicerError::StageOrder {
                expected,
                found: self.stage,
            }),
            None => Err(SlicerError::StageOrder {
                expected: self.stage,
                found: to,
            }),
        }
    }

    /// Top outlines.
    pub fn top_polys(&self) -> Vec<Polygon> {
        self.tops.iter().map(|t| t.poly.clone()).collect()
    }

    /// Every shell of every top.
    pub fn top_shells(&self) -> Vec<Polygon> {
        self.tops.iter().flat_map(|t| t.shells.iter().cloned()).collect()
    }

    /// Innermost shells of every top.
    pub fn top_inners(&self) -> Vec<Polygon> {
        self.tops.iter().flat_map(|t| t.last.iter().cloned()).collect()
    }

    /// Fill clip boundaries of every top.
    pub fn top_fill_off(&self) -> Vec<Polygon> {
        self.tops.iter().flat_map(|t| t.fill_off.iter().cloned()).collect()
    }

    /// Solid fill segments of every top.
    pub fn top_fill_lines(&self) -> Vec<Line> {
        self.tops.iter().flat_map(|t| t.fill_lines.iter().copied()).collect()
    }

    /// Support outlines.
    pub fn support_polys(&self) -> Vec<Polygon> {
        self.supports.iter().map(|s| s.poly.clone()).collect()
    }
}

/// A printable object: one mesh and its slices.
#[derive(Debug, Clone)]
pub struct Widget {
    /// Widget id.
    pub id: u32,
    /// Source mesh.
    pub mesh: MeshRef,
    /// Slices bottom to top.
    pub slices: Vec<Slice>,
    /// Placement on the bed.
    pub position: Vec3,
    /// Assigned extruder.
    pub extruder: usize,
    /// Synthetic widget holding only support.
    pub support: bool,
}

impl Widget {
    /// Unsliced widget.
    pub fn new(id: u32, mesh: MeshRef) -> Self {
        Self {
            id,
            mesh,
            slices: Vec::new(),
            position: Vec3::zeros(),
            extruder: 0,
            support: false,
        }
    }

    /// Placed at `position`.
    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Bounds of every top outline, in widget coordinates.
    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::EMPTY;
        for slice in &self.slices {
            for top in &slice.tops {
                b.merge(&top.poly.bounds());
            }
        }
        b
    }

    /// Replace the slices, linking neighbours by index.
    pub fn set_slices(&mut self, mut slices: Vec<Slice>) {
        let n = slices.len();
        for (i, slice) in slices.iter_mut().enumerate() {
            slice.index = i;
            slice.down = i.checked_sub(1);
            slice.up = (i + 1 < n).then_some(i + 1);
        }
        self.slices = slices;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_geom::Point3;

    #[test]
    fn test_stage_order() {
        let mut s = Slice::new(0, 0.2, 0.2, vec![]);
        assert!(s.advance(Stage::Shelled).is_ok());
        assert_eq!(
            s.advance(Stage::Projected),
            Err(SlicerError::StageOrder {
                expected: Stage::Diffed,
                found: Stage::Shelled
            })
        );
        assert!(s.advance(Stage::Shelled).is_err());
        assert!(s.advance(Stage::Raw).is_err());
        assert_eq!(s.stage(), Stage::Shelled);
    }

    #[test]
    fn test_slice_nests_outlines() {
        let outer = Polygon::rectangle(Point3::new(5.0, 5.0, 0.0), 10.0, 10.0);
        let hole = Polygon::rectangle(Point3::new(5.0, 5.0, 0.0), 4.0, 4.0);
        let s = Slice::new(0, 0.4, 0.2, vec![outer, hole]);
        assert_eq!(s.tops.len(), 1);
        assert_eq!(s.tops[0].poly.holes.len(), 1);
        assert!((s.tops[0].poly.z() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_set_slices_links() {
        let mut w = Widget::new(1, MeshRef("m".into()));
        w.set_slices(vec![
            Slice::new(9, 0.2, 0.2, vec![]),
            Slice::new(9, 0.4, 0.2, vec![]),
        ]);
        assert_eq!(w.slices[0].index, 0);
        assert_eq!(w.slices[0].down, None);
        assert_eq!(w.slices[0].up, Some(1));
        assert_eq!(w.slices[1].down, Some(0));
        assert_eq!(w.slices[1].up, None);
    }
}

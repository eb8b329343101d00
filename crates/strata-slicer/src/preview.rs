//! Named, styled polygon groups for visualization.

use serde::{Deserialize, Serialize};
use strata_geom::{Line, Point3, Polygon};

use crate::slice::Slice;

/// Face and line color of a group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Fill color (0xRRGGBB).
    pub face: u32,
    /// Line color (0xRRGGBB).
    pub line: u32,
    /// Opacity (0.0 to 1.0).
    pub opacity: f64,
}

impl Style {
    /// Opaque style with the same face and line color.
    pub const fn solid(color: u32) -> Self {
        Self {
            face: color,
            line: color,
            opacity: 1.0,
        }
    }
}

/// Shell color.
pub const SHELL: Style = Style::solid(0x003399);
/// Solid fill color.
pub const FILL: Style = Style::solid(0x003399);
/// Sparse fill color.
pub const INFILL: Style = Style::solid(0x003399);
/// Support color.
pub const SUPPORT: Style = Style {
    face: 0x993399,
    line: 0x006699,
    opacity: 1.0,
};
/// Raw outline color (thin rendering only).
pub const OUTLINE: Style = Style {
    face: 0,
    line: 0x000066,
    opacity: 1.0,
};

/// One drawable path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPath {
    /// Vertices.
    pub points: Vec<Point3>,
    /// Closed loop.
    pub closed: bool,
    /// Color override (0xRRGGBB).
    pub color: Option<u32>,
    /// Drawn width; `None` draws a hairline.
    pub width: Option<f64>,
}

/// A named group of paths sharing a style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderGroup {
    /// Group name.
    pub name: String,
    /// Default style.
    pub style: Style,
    /// Paths.
    pub paths: Vec<RenderPath>,
}

impl RenderGroup {
    /// Add polygons (holes included) as closed or open paths.
    pub fn add_polys(&mut self, polys: &[Polygon], width: Option<f64>) -> &mut Self {
        for p in Polygon::flatten(polys) {
            self.paths.push(RenderPath {
                closed: p.is_closed(),
                points: p.points,
                color: None,
                width,
            });
        }
        self
    }

    /// Add line segments.
    pub fn add_lines(&mut self, lines: &[Line], width: Option<f64>) -> &mut Self {
        for l in lines {
            self.paths.push(RenderPath {
                points: vec![l.a, l.b],
                closed: false,
                color: None,
                width,
            });
        }
        self
    }

    /// Add a single path.
    pub fn add_path(&mut self, path: RenderPath) -> &mut Self {
        self.paths.push(path);
        self
    }
}

/// Ordered named groups for one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderLayers {
    /// Groups in creation order.
    pub groups: Vec<RenderGroup>,
}

impl RenderLayers {
    /// Empty layers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Group `name`, created with `style` if missing.
    pub fn layer(&mut self, name: &str, style: Style) -> &mut RenderGroup {
        let pos = match self.groups.iter().position(|g| g.name == name) {
            Some(pos) => pos,
            None => {
                self.groups.push(RenderGroup {
                    name: name.to_string(),
                    style,
                    paths: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[pos]
    }

    /// Group `name`, if present.
    pub fn get(&self, name: &str) -> Option<&RenderGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Group names in order.
    pub fn names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }
}

/// Preview of one finished slice. `thin` draws hairlines plus the raw
/// outline; otherwise paths are drawn `offset` wide.
pub fn render_slice(slice: &Slice, thin: bool, offset: f64) -> RenderLayers {
    let width = if thin { None } else { Some(offset) };
    let mut out = RenderLayers::new();

    for top in &slice.tops {
        if thin {
            out.layer("slice", OUTLINE)
                .add_polys(std::slice::from_ref(&top.poly), None);
        }
        out.layer("shells", SHELL).add_polys(&top.shells, width);
        if !top.fill_lines.is_empty() || !top.thin_fill.is_empty() {
            out.layer("fill", FILL)
                .add_lines(&top.fill_lines, width)
                .add_lines(&top.thin_fill, width);
        }
        if let Some(sparse) = &top.fill_sparse {
            out.layer("infill", INFILL).add_polys(sparse, width);
        }
    }

    if !slice.supports.is_empty() {
        let group = out.layer("support", SUPPORT);
        for area in &slice.supports {
            group
                .add_polys(std::slice::from_ref(&area.poly), width)
                .add_lines(&area.fill, width);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice() -> Slice {
        let outline = Polygon::rectangle(Point3::new(0.0, 0.0, 0.2), 10.0, 10.0);
        let mut s = Slice::new(0, 0.2, 0.2, vec![outline.clone()]);
        s.tops[0].shells.push(outline);
        s.tops[0].fill_sparse = Some(Vec::new());
        s
    }

    #[test]
    fn test_groups_reuse_by_name() {
        let mut layers = RenderLayers::new();
        layers.layer("a", SHELL);
        layers.layer("b", FILL);
        layers.layer("a", SUPPORT).add_path(RenderPath {
            points: vec![],
            closed: false,
            color: None,
            width: None,
        });
        assert_eq!(layers.names(), vec!["a", "b"]);
        assert_eq!(layers.get("a").map(|g| g.style), Some(SHELL));
        assert_eq!(layers.get("a").map(|g| g.paths.len()), Some(1));
    }

    #[test]
    fn test_thin_render_adds_outline() {
        let s = slice();
        let thin = render_slice(&s, true, 0.2);
        assert_eq!(thin.names(), vec!["slice", "shells", "infill"]);
        assert!(thin.get("shells").unwrap().paths[0].width.is_none());

        let wide = render_slice(&s, false, 0.2);
        assert_eq!(wide.names(), vec!["shells", "infill"]);
        assert_eq!(wide.get("shells").unwrap().paths[0].width, Some(0.2));
    }
}

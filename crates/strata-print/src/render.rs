//! Motion stream to colored render groups.
//!
//! Consecutive motions are joined into polylines. A new polyline starts
//! whenever the emit state or the feed rate changes. Printed polylines are
//! colored by feed rate on a segmented HSV ramp. Retracts, re-engages and
//! emit switches get their own marker groups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_geom::{Point3, Polygon};
use strata_slicer::{RenderLayers, RenderPath, Style};

use crate::motion::{Motion, PrintLayer};

const MOVE_COLOR: u32 = 0xaaaaaa;
const PRINT_COLOR: u32 = 0x777700;
const RETRACT: Style = Style {
    face: 0xff0000,
    line: 0x550000,
    opacity: 0.5,
};
const ENGAGE: Style = Style {
    face: 0x00ff00,
    line: 0x005500,
    opacity: 0.5,
};
const ARROWS: Style = Style {
    face: MOVE_COLOR,
    line: 0x555555,
    opacity: 0.5,
};
const MOVES: Style = Style::solid(MOVE_COLOR);
const PRINTS: Style = Style::solid(PRINT_COLOR);

const MARKER_RADIUS: f64 = 0.2;
const MARKER_SEGMENTS: usize = 16;
const MARKER_LIFT: f64 = 0.01;
const ARROW_ANGLE: f64 = 20.0;
const ARROW_LENGTH: f64 = 0.4;

/// Feed rate color ramp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorRamp {
    /// Five segments, red through blue to dark magenta.
    #[default]
    Default,
    /// Three segments through darker hues.
    Dark,
}

impl ColorRamp {
    /// Parse a ramp name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::Default),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    /// Color of hue `h` in `[0, 1)` as 0xRRGGBB. Saturation is unused.
    pub fn hsv(self, h: f64, _s: f64, v: f64) -> u32 {
        let segments = match self {
            Self::Default => 5.0,
            Self::Dark => 3.0,
        };
        let span = 1.0 / segments;
        let seg = (h / span).floor();
        let inc = (h - seg * span) / span;
        let dec = 1.0 - inc;
        let (r, g, b) = match (self, seg as i64) {
            (Self::Default, 0) => (1.0, inc, 0.0),
            (Self::Default, 1) => (dec, 1.0, 0.0),
            (Self::Default, 2) => (0.0, dec, inc),
            (Self::Default, 3) => (inc, 0.0, 1.0),
            (Self::Default, 4) => (dec, 0.0, dec),
            (Self::Dark, 0) => (dec, inc, 0.0),
            (Self::Dark, 1) => (0.0, dec, inc),
            (Self::Dark, 2) => (inc / 2.0, 0.0, dec / 2.0 + 0.5),
            _ => (0.0, 0.0, 0.0),
        };
        let channel = |c: f64| ((c * 255.0 * v) as i64 & 0xff) as u32;
        (channel(r) << 16) | (channel(g) << 8) | channel(b)
    }

    /// Color for a feed rate against the normalizing maximum.
    pub fn speed_color(self, speed: f64, max: f64) -> u32 {
        self.hsv(speed / max, 1.0, 0.85)
    }
}

/// Render mapper options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    /// Ramp for print colors.
    pub ramp: ColorRamp,
    /// Nozzle diameter per tool.
    pub nozzles: Vec<f64>,
    /// Draw prints as hairlines.
    pub thin: bool,
}

/// Render groups per printed layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    /// One entry per non-empty input layer.
    pub layers: Vec<RenderLayers>,
    /// Highest feed rate seen.
    pub max_speed: f64,
}

fn marker(point: &Point3) -> Vec<Point3> {
    let mut circle = Polygon::circle(*point, MARKER_RADIUS, MARKER_SEGMENTS);
    circle.set_z(point.z + MARKER_LIFT);
    circle.points
}

/// Arrowhead at `to` pointing away from `from`.
fn arrow(from: &Point3, to: &Point3) -> Vec<Point3> {
    let back = (from.y - to.y).atan2(from.x - to.x).to_degrees();
    let z = to.z + MARKER_LIFT;
    let tip = |deg: f64| {
        let a = deg.to_radians();
        Point3::new(to.x + a.cos() * ARROW_LENGTH, to.y + a.sin() * ARROW_LENGTH, z)
    };
    vec![
        Point3::new(to.x, to.y, z),
        tip(back + ARROW_ANGLE),
        tip(back - ARROW_ANGLE),
    ]
}

fn closed(points: Vec<Point3>) -> RenderPath {
    RenderPath {
        points,
        closed: true,
        color: None,
        width: None,
    }
}

fn open(point: Point3) -> RenderPath {
    RenderPath {
        points: vec![point],
        closed: false,
        color: None,
        width: None,
    }
}

#[derive(Clone, Copy)]
enum Current {
    Print(usize, usize),
    Move(usize),
}

/// Map layers of motions into render groups. `progress` receives the
/// fraction done and each finished layer.
pub fn prepare_render(
    layers: &[PrintLayer],
    options: &RenderOptions,
    mut progress: impl FnMut(f64, &RenderLayers),
) -> RenderOutput {
    let levels: Vec<&PrintLayer> = layers.iter().filter(|l| !l.is_empty()).collect();
    if levels.is_empty() {
        return RenderOutput::default();
    }
    let max_speed = levels.iter().map(|l| l.max_speed()).fold(0.0, f64::max);
    let norm = max_speed + 1.0;

    let mut out = Vec::with_capacity(levels.len());
    let mut last: Option<Motion> = None;
    let mut retracted = false;

    for (index, level) in levels.iter().enumerate() {
        let mut prints: BTreeMap<usize, Vec<RenderPath>> = BTreeMap::new();
        let mut moves: Vec<RenderPath> = Vec::new();
        let mut heads: Vec<(Point3, Point3)> = Vec::new();
        let mut retracts: Vec<Point3> = Vec::new();
        let mut engages: Vec<Point3> = Vec::new();
        let mut current: Option<Current> = None;

        for m in &level.motions {
            if retracted && m.emit {
                retracted = false;
                if let Some(l) = &last {
                    engages.push(l.point);
                }
            }
            if m.retract {
                retracts.push(m.point);
                retracted = true;
            }

            match &last {
                Some(l) => {
                    if l.emit != m.emit {
                        heads.push((l.point, m.point));
                    }
                    if m.emit {
                        let restart = !l.emit || m.speed != l.speed || current.is_none();
                        let cur = match current {
                            Some(Current::Print(tool, i)) if !restart => Current::Print(tool, i),
                            _ => {
                                let paths = prints.entry(m.tool).or_default();
                                let mut path = open(l.point);
                                path.color = Some(options.ramp.speed_color(m.speed, norm));
                                paths.push(path);
                                Current::Print(m.tool, paths.len() - 1)
                            }
                        };
                        if let Current::Print(tool, i) = cur {
                            if let Some(p) = prints.get_mut(&tool).and_then(|v| v.get_mut(i)) {
                                p.points.push(m.point);
                            }
                        }
                        current = Some(cur);
                    } else {
                        let cur = match current {
                            Some(Current::Move(i)) if !l.emit => Current::Move(i),
                            _ => {
                                moves.push(open(l.point));
                                Current::Move(moves.len() - 1)
                            }
                        };
                        if let Current::Move(i) = cur {
                            moves[i].points.push(m.point);
                        }
                        current = Some(cur);
                    }
                }
                None => {
                    if m.emit {
                        let paths = prints.entry(m.tool).or_default();
                        let mut path = open(m.point);
                        path.color = Some(options.ramp.speed_color(m.speed, norm));
                        paths.push(path);
                        current = Some(Current::Print(m.tool, paths.len() - 1));
                    } else {
                        moves.push(open(m.point));
                        current = Some(Current::Move(moves.len() - 1));
                    }
                }
            }
            last = Some(*m);
        }

        let mut render = RenderLayers::new();
        if !retracts.is_empty() {
            let group = render.layer("retract", RETRACT);
            for p in &retracts {
                group.add_path(closed(marker(p)));
            }
        }
        if !engages.is_empty() {
            let group = render.layer("engage", ENGAGE);
            for p in &engages {
                group.add_path(closed(marker(p)));
            }
        }
        if !heads.is_empty() {
            let group = render.layer("arrows", ARROWS);
            for (from, to) in &heads {
                group.add_path(closed(arrow(from, to)));
            }
        }
        if !moves.is_empty() {
            let group = render.layer("move", MOVES);
            for path in moves {
                group.add_path(path);
            }
        }
        for (tool, paths) in prints {
            let width = if options.thin {
                None
            } else {
                Some(options.nozzles.get(tool).copied().unwrap_or(1.0) / 2.0)
            };
            let group = render.layer("print", PRINTS);
            for mut path in paths {
                path.width = width;
                group.add_path(path);
            }
        }

        progress(index as f64 / levels.len() as f64, &render);
        out.push(render);
    }

    RenderOutput {
        layers: out,
        max_speed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point3 {
        Point3::new(x, y, 0.2)
    }

    #[test]
    fn test_default_ramp_endpoints() {
        let ramp = ColorRamp::Default;
        // hue 0 is pure red scaled by v
        assert_eq!(ramp.hsv(0.0, 1.0, 1.0), 0xff0000);
        assert_eq!(ramp.hsv(0.2, 1.0, 1.0), 0xffff00);
        assert_eq!(ramp.hsv(0.0, 1.0, 0.85), ((255.0 * 0.85) as u32) << 16);
        // out of range is black
        assert_eq!(ramp.hsv(1.0, 1.0, 1.0), 0);
    }

    #[test]
    fn test_dark_ramp() {
        let ramp = ColorRamp::Dark;
        assert_eq!(ramp.hsv(0.0, 1.0, 1.0), 0xff0000);
        // start of the last segment: half blue
        let c = ramp.hsv(2.0 / 3.0 + 1e-9, 1.0, 1.0);
        assert_eq!(c >> 16, 0);
        assert!((c & 0xff) >= 0x7f);
        assert_eq!(ColorRamp::from_name("dark"), Some(ColorRamp::Dark));
        assert_eq!(ColorRamp::from_name("neon"), None);
    }

    #[test]
    fn test_polylines_split_on_emit_and_speed() {
        let layer = PrintLayer {
            index: 0,
            height: 0.2,
            motions: vec![
                Motion::travel(p(0.0, 0.0), 0, 120.0),
                Motion::print(p(1.0, 0.0), 0, 50.0),
                Motion::print(p(2.0, 0.0), 0, 50.0),
                Motion::print(p(3.0, 0.0), 0, 20.0),
                Motion::travel(p(5.0, 0.0), 0, 120.0),
            ],
        };
        let options = RenderOptions {
            nozzles: vec![0.4],
            ..Default::default()
        };
        let mut seen = 0;
        let out = prepare_render(&[layer], &options, |_, _| seen += 1);
        assert_eq!(seen, 1);
        assert!((out.max_speed - 120.0).abs() < 1e-12);
        let render = &out.layers[0];
        let prints = render.get("print").unwrap();
        assert_eq!(prints.paths.len(), 2);
        assert_eq!(prints.paths[0].points.len(), 3);
        assert_eq!(prints.paths[1].points.len(), 2);
        assert_eq!(prints.paths[0].width, Some(0.2));
        assert_ne!(prints.paths[0].color, prints.paths[1].color);
        let moves = render.get("move").unwrap();
        assert_eq!(moves.paths.len(), 2);
        // travel->print and print->travel
        assert_eq!(render.get("arrows").unwrap().paths.len(), 2);
    }

    #[test]
    fn test_retract_and_engage_markers() {
        let mut retract = Motion::print(p(1.0, 0.0), 0, 50.0);
        retract.retract = true;
        let layer = PrintLayer {
            index: 0,
            height: 0.2,
            motions: vec![
                Motion::travel(p(0.0, 0.0), 0, 120.0),
                retract,
                Motion::travel(p(4.0, 0.0), 0, 120.0),
                Motion::print(p(5.0, 0.0), 0, 50.0),
            ],
        };
        let out = prepare_render(&[layer], &RenderOptions::default(), |_, _| {});
        let render = &out.layers[0];
        let r = render.get("retract").unwrap();
        assert_eq!(r.paths.len(), 1);
        assert_eq!(r.paths[0].points.len(), MARKER_SEGMENTS);
        assert!((r.paths[0].points[0].z - 0.21).abs() < 1e-12);
        let e = render.get("engage").unwrap();
        assert_eq!(e.paths.len(), 1);
        assert!((e.paths[0].points[0].x - 4.2).abs() < 1e-9);
    }

    #[test]
    fn test_print_only_layer_has_no_move_group() {
        let layer = PrintLayer {
            index: 0,
            height: 0.2,
            motions: vec![
                Motion::print(p(0.0, 0.0), 0, 50.0),
                Motion::print(p(1.0, 0.0), 0, 50.0),
                Motion::print(p(1.0, 1.0), 0, 50.0),
            ],
        };
        let out = prepare_render(&[layer], &RenderOptions::default(), |_, _| {});
        let render = &out.layers[0];
        assert!(render.get("move").is_none());
        assert_eq!(render.get("print").unwrap().paths.len(), 1);
    }

    #[test]
    fn test_arrow_geometry() {
        let head = arrow(&p(0.0, 0.0), &p(1.0, 0.0));
        assert_eq!(head.len(), 3);
        for tip in &head[1..] {
            let d = ((tip.x - 1.0).powi(2) + tip.y.powi(2)).sqrt();
            assert!((d - ARROW_LENGTH).abs() < 1e-9);
            assert!(tip.x < 1.0);
        }
    }

    #[test]
    fn test_empty_layers_skipped() {
        let out = prepare_render(&[PrintLayer::new(0)], &RenderOptions::default(), |_, _| {});
        assert!(out.layers.is_empty());
        assert_eq!(out.max_speed, 0.0);
    }
}

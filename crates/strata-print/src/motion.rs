//! The motion stream handed to machine-code emitters.

use serde::{Deserialize, Serialize};
use strata_geom::Point3;

/// One move of the tool head to `point`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    /// Destination.
    pub point: Point3,
    /// Extruder performing the move.
    pub tool: usize,
    /// Feed rate (mm/s).
    pub speed: f64,
    /// Extrude while moving.
    pub emit: bool,
    /// Retract after arriving.
    pub retract: bool,
}

impl Motion {
    /// Extruding move.
    pub fn print(point: Point3, tool: usize, speed: f64) -> Self {
        Self {
            point,
            tool,
            speed,
            emit: true,
            retract: false,
        }
    }

    /// Travel move.
    pub fn travel(point: Point3, tool: usize, speed: f64) -> Self {
        Self {
            emit: false,
            ..Self::print(point, tool, speed)
        }
    }
}

/// Motions of one output layer, in print order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrintLayer {
    /// Output layer number, raft layers included.
    pub index: usize,
    /// Layer thickness.
    pub height: f64,
    /// Motions.
    pub motions: Vec<Motion>,
}

impl PrintLayer {
    /// Empty layer.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// No motions.
    pub fn is_empty(&self) -> bool {
        self.motions.is_empty()
    }

    /// Flag the last motion as retracting. No-op on an empty layer.
    pub fn retract_last(&mut self) {
        if let Some(m) = self.motions.last_mut() {
            m.retract = true;
        }
    }

    /// Highest feed rate in the layer.
    pub fn max_speed(&self) -> f64 {
        self.motions.iter().map(|m| m.speed).fold(0.0, f64::max)
    }

    /// Count of extruding moves.
    pub fn emit_count(&self) -> usize {
        self.motions.iter().filter(|m| m.emit).count()
    }
}

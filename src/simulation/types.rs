//! Core types for the traffic simulation
//!
//! Plain data records and identifiers shared by every agent.

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimId(pub usize);

/// A wrapper type for road graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub NodeIndex);

/// A wrapper type for vehicle IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub SimId);

impl VehicleId {
    /// Parse the wire form produced by `Display` (`car-<n>`)
    pub fn from_wire(text: &str) -> Option<Self> {
        text.strip_prefix("car-")
            .and_then(|n| n.parse().ok())
            .map(|n| VehicleId(SimId(n)))
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "car-{}", self.0 .0)
    }
}

/// A wrapper type for pedestrian IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PedestrianId(pub SimId);

/// Index of a zebra crossing in the world's crossing list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrossingId(pub usize);

/// Index of a traffic light in the controller's light list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightId(pub usize);

/// Intersection identifier as it appears in map data and on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntersectionId(pub String);

impl fmt::Display for IntersectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type of vehicle in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleKind {
    Normal,
    Ambulance,
}

/// Which boundary a vehicle starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelDirection {
    LeftToRight,
    RightToLeft,
}

impl TravelDirection {
    pub fn opposite(self) -> Self {
        match self {
            TravelDirection::LeftToRight => TravelDirection::RightToLeft,
            TravelDirection::RightToLeft => TravelDirection::LeftToRight,
        }
    }
}

/// Which side of the road a pedestrian walks on, relative to its walking direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidewalkSide {
    Left,
    Right,
}

impl SidewalkSide {
    pub fn sign(self) -> f64 {
        match self {
            SidewalkSide::Left => 1.0,
            SidewalkSide::Right => -1.0,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            SidewalkSide::Left => SidewalkSide::Right,
            SidewalkSide::Right => SidewalkSide::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingState {
    Walking,
    Crossing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightState {
    Green,
    Yellow,
    Red,
}

/// A 2D position in map coordinates (x = longitude, y = latitude)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }

    /// Angle from this position to another, counter-clockwise from +x
    pub fn angle_to(&self, other: &Position) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// Perpendicular offset to the right of the direction from `self` to `other`
    pub fn right_offset(&self, other: &Position, offset: f64) -> (f64, f64) {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let len = (dx * dx + dy * dy).sqrt();
        if len > 0.0 {
            (dy / len * offset, -dx / len * offset)
        } else {
            (0.0, 0.0)
        }
    }

    /// Move towards `target` by at most `step`, landing exactly on it when close
    pub fn step_towards(&self, target: &Position, step: f64) -> Position {
        let dist = self.distance(target);
        if dist <= step || dist == 0.0 {
            *target
        } else {
            self.lerp(target, step / dist)
        }
    }
}

/// Forward and lateral distance of `point` as seen from `origin` facing `heading`
///
/// Forward is the projection onto the heading vector, lateral the absolute
/// perpendicular distance.
pub fn project(origin: &Position, heading: f64, point: &Position) -> (f64, f64) {
    let (hx, hy) = (heading.cos(), heading.sin());
    let dx = point.x - origin.x;
    let dy = point.y - origin.y;
    let forward = hx * dx + hy * dy;
    let lateral = (hx * dy - hy * dx).abs();
    (forward, lateral)
}

/// Wrap an angle into (-PI, PI]
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Interpolate between two angles along the shortest arc
pub fn lerp_angle(from: f64, to: f64, t: f64) -> f64 {
    normalize_angle(from + normalize_angle(to - from) * t)
}

/// Absolute shortest-arc difference between two angles
pub fn angle_between(a: f64, b: f64) -> f64 {
    normalize_angle(a - b).abs()
}

//! Per-vehicle speed resolution
//!
//! Competing speed constraints are checked in a fixed priority order and only
//! the first one that applies decides the effective speed:
//! ambulance, ambulance zone, pedestrian ahead, occupied crossing ahead,
//! light requiring a stop, external command, car-following.

use ordered_float::OrderedFloat;
use std::collections::HashMap;

use super::pedestrian::ZebraCrossing;
use super::traffic_light::TrafficLight;
use super::types::{angle_between, project, LightState, Position, VehicleId, VehicleKind};
use super::vehicle::{CommandAction, VehicleView};
use crate::config::HazardConfig;

/// Which rule produced the effective speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedReason {
    Nominal,
    Ambulance,
    AmbulanceZone,
    Pedestrian,
    ZebraCrossing,
    TrafficLight,
    Command,
    Following,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedDecision {
    pub speed: f64,
    pub reason: SpeedReason,
}

impl SpeedDecision {
    fn new(speed: f64, reason: SpeedReason) -> Self {
        Self {
            speed: speed.max(0.0),
            reason,
        }
    }
}

/// Rectangle from an ambulance to its next waypoint
#[derive(Debug, Clone, Copy)]
pub struct AmbulanceZone {
    pub ambulance: VehicleId,
    pub origin: Position,
    pub heading: f64,
    pub length: f64,
    pub half_width: f64,
}

impl AmbulanceZone {
    /// Zone of an ambulance, or `None` for other vehicles
    pub fn from_view(view: &VehicleView, half_width: f64) -> Option<Self> {
        if view.kind != VehicleKind::Ambulance {
            return None;
        }
        Some(Self {
            ambulance: view.id,
            origin: view.position,
            heading: view.position.angle_to(&view.next_waypoint),
            length: view.position.distance(&view.next_waypoint),
            half_width,
        })
    }

    /// Strictly between the ambulance and its waypoint, within the half-width
    pub fn contains(&self, point: &Position) -> bool {
        let (forward, lateral) = project(&self.origin, self.heading, point);
        forward > 0.0 && forward < self.length && lateral <= self.half_width
    }
}

/// Everything a vehicle can react to during one tick
pub struct HazardScene<'a> {
    pub vehicles: &'a [VehicleView],
    pub pedestrians: &'a [Position],
    pub crossings: &'a [ZebraCrossing],
    pub lights: &'a [TrafficLight],
    pub zones: &'a [AmbulanceZone],
    /// Effective speeds from the previous tick, used as lead-vehicle speeds
    pub previous_speeds: &'a HashMap<VehicleId, f64>,
    pub now: f64,
    pub config: &'a HazardConfig,
}

/// Linear ramp from 0 at `stop` to 1 at `slow`
fn ramp(distance: f64, stop: f64, slow: f64) -> f64 {
    if slow <= stop {
        return if distance > stop { 1.0 } else { 0.0 };
    }
    ((distance - stop) / (slow - stop)).clamp(0.0, 1.0)
}

/// Closest forward distance among points inside the detection rectangle
fn nearest_ahead<'p>(
    vehicle: &VehicleView,
    points: impl Iterator<Item = &'p Position>,
    range: f64,
    half_width: f64,
) -> Option<f64> {
    points
        .map(|p| project(&vehicle.position, vehicle.heading, p))
        .filter(|&(forward, lateral)| forward > 0.0 && forward <= range && lateral <= half_width)
        .map(|(forward, _)| OrderedFloat(forward))
        .min()
        .map(OrderedFloat::into_inner)
}

pub fn resolve_speed(vehicle: &VehicleView, scene: &HazardScene) -> SpeedDecision {
    let config = scene.config;
    let base = vehicle.base_speed;

    if vehicle.kind == VehicleKind::Ambulance {
        return SpeedDecision::new(base, SpeedReason::Ambulance);
    }

    if scene
        .zones
        .iter()
        .any(|zone| zone.ambulance != vehicle.id && zone.contains(&vehicle.position))
    {
        return SpeedDecision::new(0.0, SpeedReason::AmbulanceZone);
    }

    if let Some(distance) = nearest_ahead(
        vehicle,
        scene.pedestrians.iter(),
        config.pedestrian_slow_distance,
        config.pedestrian_half_width,
    ) {
        let factor = ramp(
            distance,
            config.pedestrian_stop_distance,
            config.pedestrian_slow_distance,
        );
        return SpeedDecision::new(base * factor, SpeedReason::Pedestrian);
    }

    if let Some(distance) = nearest_ahead(
        vehicle,
        scene
            .crossings
            .iter()
            .filter(|c| c.occupied_by.is_some())
            .map(|c| &c.position),
        config.crossing_slow_distance,
        config.crossing_half_width,
    ) {
        let factor = ramp(
            distance,
            config.crossing_stop_distance,
            config.crossing_slow_distance,
        );
        return SpeedDecision::new(base * factor * factor, SpeedReason::ZebraCrossing);
    }

    if let Some(distance) = light_stop_distance(vehicle, scene) {
        let factor = ramp(distance, config.light_stop_distance, config.light_slow_distance);
        return SpeedDecision::new(base * factor, SpeedReason::TrafficLight);
    }

    if let Some(command) = vehicle.command.filter(|c| c.is_active(scene.now)) {
        let speed = match command.action {
            CommandAction::Stop => 0.0,
            CommandAction::Slow | CommandAction::Accelerate => command.target_speed,
        };
        return SpeedDecision::new(speed, SpeedReason::Command);
    }

    if let Some(decision) = follow_lead(vehicle, scene) {
        return decision;
    }

    SpeedDecision::new(base, SpeedReason::Nominal)
}

/// Distance to the nearest facing light that requires stopping
///
/// RED always requires a stop; YELLOW only while the vehicle is still beyond
/// the stop distance.
fn light_stop_distance(vehicle: &VehicleView, scene: &HazardScene) -> Option<f64> {
    let config = scene.config;
    scene
        .lights
        .iter()
        .filter(|light| angle_between(vehicle.heading, light.heading) <= config.light_alignment)
        .filter_map(|light| {
            let (forward, lateral) = project(&vehicle.position, vehicle.heading, &light.position);
            let ahead = forward > 0.0
                && forward <= config.light_slow_distance
                && lateral <= config.light_half_width;
            if !ahead {
                return None;
            }
            let must_stop = match light.state {
                LightState::Red => true,
                LightState::Yellow => forward > config.light_stop_distance,
                LightState::Green => false,
            };
            must_stop.then_some(OrderedFloat(forward))
        })
        .min()
        .map(OrderedFloat::into_inner)
}

/// Car-following against the nearest same-direction vehicle in the same lane
///
/// Below `min_gap` the follower stops; otherwise its speed is blended from
/// the lead's speed (close) to its own nominal speed (at `following_distance`)
/// and clamped so it never exceeds the lead's speed or its own nominal speed.
fn follow_lead(vehicle: &VehicleView, scene: &HazardScene) -> Option<SpeedDecision> {
    let config = scene.config;

    let (gap, lead) = scene
        .vehicles
        .iter()
        .filter(|other| other.id != vehicle.id && other.direction == vehicle.direction)
        .filter(|other| {
            angle_between(other.heading, vehicle.heading) < std::f64::consts::FRAC_PI_2
        })
        .filter_map(|other| {
            let (forward, lateral) = project(&vehicle.position, vehicle.heading, &other.position);
            (forward > 0.0
                && forward <= config.following_distance
                && lateral <= config.following_half_width)
                .then_some((forward, other))
        })
        .min_by_key(|(forward, _)| OrderedFloat(*forward))?;

    if gap < config.min_gap {
        return Some(SpeedDecision::new(0.0, SpeedReason::Following));
    }

    let lead_speed = scene
        .previous_speeds
        .get(&lead.id)
        .copied()
        .unwrap_or(lead.base_speed);
    let t = ramp(gap, config.min_gap, config.following_distance);
    let blended = lead_speed + (vehicle.base_speed - lead_speed) * t;

    Some(SpeedDecision::new(
        blended.min(lead_speed.min(vehicle.base_speed)),
        SpeedReason::Following,
    ))
}

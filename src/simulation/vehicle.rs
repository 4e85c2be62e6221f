//! Vehicle movement logic for the traffic simulation
//!
//! A vehicle follows its node path with a lane offset to the right of each
//! segment. Its effective speed is never stored here; the hazard resolver
//! computes it fresh every tick and passes it to [`Vehicle::advance`].

use anyhow::{bail, Result};

use super::road_network::RoadGraph;
use super::types::{
    lerp_angle, NodeId, Position, TravelDirection, VehicleId, VehicleKind,
};
use crate::config::VehicleConfig;

/// Result of a vehicle update indicating what action should be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleUpdateResult {
    Continue,
    /// The final waypoint was reached; the vehicle leaves the active set
    Arrived,
}

/// What an external command asks the vehicle to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    Stop,
    Slow,
    Accelerate,
}

/// A time-boxed speed directive from the external decision service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveCommand {
    pub action: CommandAction,
    /// Target speed in degrees per second
    pub target_speed: f64,
    pub expires_at: f64,
}

impl ActiveCommand {
    pub fn is_active(&self, now: f64) -> bool {
        now < self.expires_at
    }
}

/// A vehicle in the traffic simulation
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub position: Position,
    pub heading: f64,
    pub target_heading: f64,
    pub path: Vec<NodeId>,
    /// Index of the node the current segment starts from
    pub path_index: usize,
    pub base_speed: f64,
    pub kind: VehicleKind,
    pub direction: TravelDirection,
    /// Next waypoint including the lane offset
    pub target: Position,
    pub active_command: Option<ActiveCommand>,
}

/// Read-only view used by hazard detection and congestion analysis
#[derive(Debug, Clone)]
pub struct VehicleView {
    pub id: VehicleId,
    pub kind: VehicleKind,
    pub direction: TravelDirection,
    pub position: Position,
    pub heading: f64,
    pub target_heading: f64,
    pub base_speed: f64,
    pub next_waypoint: Position,
    pub command: Option<ActiveCommand>,
}

impl Vehicle {
    /// Place a new vehicle at the start of `path`
    ///
    /// Fails when the path has fewer than two nodes or references unknown nodes.
    pub fn spawn(
        id: VehicleId,
        path: Vec<NodeId>,
        base_speed: f64,
        kind: VehicleKind,
        direction: TravelDirection,
        graph: &RoadGraph,
        config: &VehicleConfig,
    ) -> Result<Self> {
        if path.len() < 2 {
            bail!("Path for {} has fewer than two nodes", id);
        }

        let start = graph.position_of(path[0])?;
        let next = graph.position_of(path[1])?;
        let (ox, oy) = start.right_offset(&next, config.lane_offset);
        let heading = start.angle_to(&next);

        Ok(Self {
            id,
            position: start.offset(ox, oy),
            heading,
            target_heading: heading,
            path,
            path_index: 0,
            base_speed,
            kind,
            direction,
            target: next.offset(ox, oy),
            active_command: None,
        })
    }

    pub fn is_ambulance(&self) -> bool {
        self.kind == VehicleKind::Ambulance
    }

    pub fn view(&self) -> VehicleView {
        VehicleView {
            id: self.id,
            kind: self.kind,
            direction: self.direction,
            position: self.position,
            heading: self.heading,
            target_heading: self.target_heading,
            base_speed: self.base_speed,
            next_waypoint: self.target,
            command: self.active_command,
        }
    }

    /// Drop the command once its time box has passed
    pub fn expire_command(&mut self, now: f64) {
        if let Some(command) = self.active_command {
            if !command.is_active(now) {
                self.active_command = None;
            }
        }
    }

    /// Update vehicle movement for one tick at the resolved `speed`
    pub fn advance(
        &mut self,
        speed: f64,
        delta_secs: f64,
        graph: &RoadGraph,
        config: &VehicleConfig,
    ) -> VehicleUpdateResult {
        self.heading = lerp_angle(self.heading, self.target_heading, config.heading_blend);

        // A held vehicle stays on its waypoint until it is released
        if speed > 0.0 && self.position.distance(&self.target) < config.waypoint_epsilon {
            self.path_index += 1;

            if self.path_index >= self.path.len().saturating_sub(1) {
                return VehicleUpdateResult::Arrived;
            }

            let current = graph.position(self.path[self.path_index]);
            let next = graph.position(self.path[self.path_index + 1]);
            if let (Some(current), Some(next)) = (current, next) {
                let (ox, oy) = current.right_offset(&next, config.lane_offset);
                self.position = current.offset(ox, oy);
                self.target = next.offset(ox, oy);
                self.target_heading = current.angle_to(&next);
            }
            return VehicleUpdateResult::Continue;
        }

        let step = speed.max(0.0) * delta_secs;
        self.position = self.position.step_towards(&self.target, step);

        VehicleUpdateResult::Continue
    }
}

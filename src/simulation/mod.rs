//! Standalone traffic micro-simulation
//!
//! Road graph, agents, traffic lights and the per-tick orchestrator. Nothing
//! here performs I/O; remote decision services are reached through
//! [`crate::control`] and only ever feed results back at tick boundaries.

mod hazard;
mod map;
mod pedestrian;
mod road_network;
mod scheduler;
mod stats;
mod traffic_light;
mod types;
mod vehicle;
mod world;

// Re-export public types for external use
pub use hazard::{resolve_speed, AmbulanceZone, HazardScene, SpeedDecision, SpeedReason};
pub use map::{CentralAntenna, MapArc, MapData, MapIntersection, MapNode};
pub use pedestrian::{
    crossing_probability, generate_crossings, Pedestrian, PedestrianUpdateResult, ZebraCrossing,
};
pub use road_network::{RoadGraph, RoadNode};
pub use scheduler::{Scheduler, TaskKind};
pub use stats::SimulationStats;
pub use traffic_light::{PhaseOverride, SignalizedIntersection, TrafficLight, TrafficLightController};
pub use types::{
    angle_between, lerp_angle, normalize_angle, project, CrossingId, CrossingState,
    IntersectionId, LightId, LightState, NodeId, PedestrianId, Position, SidewalkSide, SimId,
    TravelDirection, VehicleId, VehicleKind,
};
pub use vehicle::{ActiveCommand, CommandAction, Vehicle, VehicleUpdateResult, VehicleView};
pub use world::{
    CrossingSnapshot, LightSnapshot, PedestrianSnapshot, SimWorld, VehicleSnapshot, WorldSnapshot,
};

//! Simulation configuration
//!
//! Distances are in map degrees, speeds in degrees per second and durations
//! in seconds of simulation time. Every field has a default so a partial JSON
//! file is enough to override a handful of values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Approximate metres per degree, used for km/h conversions on the wire.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Convert a speed in degrees per second into km/h.
pub fn degrees_per_sec_to_kmh(speed: f64) -> f64 {
    speed * METERS_PER_DEGREE * 3.6
}

/// Convert a speed in km/h into degrees per second.
pub fn kmh_to_degrees_per_sec(kmh: f64) -> f64 {
    kmh / 3.6 / METERS_PER_DEGREE
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub spawn: SpawnConfig,
    pub planner: PlannerConfig,
    pub vehicle: VehicleConfig,
    pub hazard: HazardConfig,
    pub pedestrian: PedestrianConfig,
    pub lights: LightConfig,
    pub control: ControlConfig,
}

impl SimConfig {
    /// Load a configuration file, falling back to defaults for missing keys
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// Spawn timers and population caps
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub vehicle_period: f64,
    pub ambulance_period: f64,
    pub ambulance_first_at: f64,
    pub pedestrian_period: f64,
    pub max_vehicles: usize,
    pub max_ambulances: usize,
    pub max_pedestrians: usize,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            vehicle_period: 2.0,
            ambulance_period: 30.0,
            ambulance_first_at: 15.0,
            pedestrian_period: 3.0,
            max_vehicles: 40,
            max_ambulances: 1,
            max_pedestrians: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Fraction of the longitude range treated as a boundary zone
    pub boundary_fraction: f64,
    /// Longitude slack within which a neighbor still counts as "forward"
    pub forward_tolerance: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            boundary_fraction: 0.25,
            forward_tolerance: 0.001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub base_speed: f64,
    pub speed_jitter: f64,
    pub ambulance_speed: f64,
    /// Per-tick exponential smoothing factor applied to the heading
    pub heading_blend: f64,
    /// Distance under which a waypoint counts as reached
    pub waypoint_epsilon: f64,
    /// Perpendicular displacement to the right of the travel direction
    pub lane_offset: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            base_speed: 0.000_15,
            speed_jitter: 0.000_04,
            ambulance_speed: 0.000_24,
            heading_blend: 0.12,
            waypoint_epsilon: 0.000_03,
            lane_offset: 0.000_03,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    pub ambulance_zone_half_width: f64,
    pub pedestrian_half_width: f64,
    pub pedestrian_slow_distance: f64,
    pub pedestrian_stop_distance: f64,
    pub crossing_half_width: f64,
    pub crossing_slow_distance: f64,
    pub crossing_stop_distance: f64,
    pub light_half_width: f64,
    pub light_slow_distance: f64,
    pub light_stop_distance: f64,
    /// Maximum heading difference (radians) for a light to apply to a vehicle
    pub light_alignment: f64,
    pub following_distance: f64,
    pub following_half_width: f64,
    pub min_gap: f64,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            ambulance_zone_half_width: 0.000_08,
            pedestrian_half_width: 0.000_02,
            pedestrian_slow_distance: 0.000_15,
            pedestrian_stop_distance: 0.000_05,
            crossing_half_width: 0.000_06,
            crossing_slow_distance: 0.000_20,
            crossing_stop_distance: 0.000_07,
            light_half_width: 0.000_07,
            light_slow_distance: 0.000_25,
            light_stop_distance: 0.000_05,
            light_alignment: std::f64::consts::FRAC_PI_4,
            following_distance: 0.000_15,
            following_half_width: 0.000_02,
            min_gap: 0.000_045,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PedestrianConfig {
    pub walk_speed: f64,
    pub sidewalk_offset: f64,
    pub arrival_epsilon: f64,
    /// Must exceed `sidewalk_offset`, crossings sit on the centre line
    pub crossing_search_radius: f64,
    /// Crossing initiations per second while next to a free crossing
    pub crossing_rate: f64,
    pub crossing_cooldown: f64,
    /// Arcs shorter than this do not host a zebra crossing
    pub min_arc_length: f64,
    pub min_crossing_spacing: f64,
}

impl Default for PedestrianConfig {
    fn default() -> Self {
        Self {
            walk_speed: 0.000_015,
            sidewalk_offset: 0.000_06,
            arrival_epsilon: 0.000_005,
            crossing_search_radius: 0.000_1,
            crossing_rate: 0.6,
            crossing_cooldown: 8.0,
            min_arc_length: 0.000_5,
            min_crossing_spacing: 0.000_3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub green_duration: f64,
    pub yellow_duration: f64,
    /// Distance from the intersection centre at which a light is placed
    pub setback: f64,
    pub selection_ratio: f64,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            green_duration: 8.0,
            yellow_duration: 2.0,
            setback: 0.000_08,
            selection_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub antenna_url: String,
    pub ai_url: String,
    pub model: String,
    pub collision_poll_period: f64,
    pub optimization_period: f64,
    pub collision_timeout_secs: u64,
    pub optimization_timeout_secs: u64,
    pub command_duration: f64,
    pub ai_override_duration: f64,
    pub local_override_duration: f64,
    pub analysis_radius: f64,
    pub analysis_min_distance: f64,
    /// Maximum angle between a vehicle's heading and the bearing to the intersection
    pub approach_angle: f64,
    pub imbalance_threshold: usize,
    pub busy_threshold: usize,
    pub congestion_per_vehicle: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            antenna_url: "http://localhost:6767/api/antenna".to_string(),
            ai_url: "http://localhost:6767/api/ai".to_string(),
            model: "qwen2.5:7b".to_string(),
            collision_poll_period: 0.5,
            optimization_period: 5.0,
            collision_timeout_secs: 30,
            optimization_timeout_secs: 20,
            command_duration: 5.0,
            ai_override_duration: 10.0,
            local_override_duration: 8.0,
            analysis_radius: 0.000_4,
            analysis_min_distance: 0.000_05,
            approach_angle: std::f64::consts::FRAC_PI_3,
            imbalance_threshold: 2,
            busy_threshold: 4,
            congestion_per_vehicle: 15,
        }
    }
}

impl ControlConfig {
    /// Point both remote integrations at a single backend base url
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.antenna_url = format!("{base}/api/antenna");
        self.ai_url = format!("{base}/api/ai");
        self
    }
}

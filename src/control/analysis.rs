//! Local congestion metrics per signalized intersection
//!
//! The same numbers feed the remote optimization prompt and the local
//! fallback heuristic, so both produce the same override shape.

use ordered_float::OrderedFloat;
use std::fmt::Write;

use super::protocol::{PhaseAction, PhaseDecision};
use crate::config::ControlConfig;
use crate::simulation::{
    angle_between, IntersectionId, TrafficLightController, VehicleKind, VehicleView,
};

#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionCongestion {
    pub intersection_id: IntersectionId,
    pub total_vehicles: usize,
    pub phase0_count: usize,
    pub phase1_count: usize,
    /// 0-100
    pub congestion_score: u32,
    pub dominant_phase: u8,
    pub needs_optimization: bool,
}

impl IntersectionCongestion {
    pub fn from_counts(
        intersection_id: IntersectionId,
        phase0_count: usize,
        phase1_count: usize,
        config: &ControlConfig,
    ) -> Self {
        let total_vehicles = phase0_count + phase1_count;
        let imbalance = phase0_count.abs_diff(phase1_count);
        Self {
            intersection_id,
            total_vehicles,
            phase0_count,
            phase1_count,
            congestion_score: (total_vehicles as u32)
                .saturating_mul(config.congestion_per_vehicle)
                .min(100),
            dominant_phase: if phase0_count >= phase1_count { 0 } else { 1 },
            needs_optimization: imbalance >= config.imbalance_threshold
                || total_vehicles >= config.busy_threshold,
        }
    }

    pub fn imbalance(&self) -> usize {
        self.phase0_count.abs_diff(self.phase1_count)
    }

    pub fn count_for(&self, phase: u8) -> usize {
        if phase == 0 {
            self.phase0_count
        } else {
            self.phase1_count
        }
    }
}

/// Count approaching vehicles per phase at every signalized intersection
///
/// A vehicle counts when it is within the detection radius, heading towards
/// the intersection, and is attributed to the light whose approach direction
/// best matches its heading. Ambulances are ignored.
pub fn analyze_congestion(
    vehicles: &[VehicleView],
    lights: &TrafficLightController,
    config: &ControlConfig,
) -> Vec<IntersectionCongestion> {
    lights
        .intersections()
        .iter()
        .map(|intersection| {
            let mut counts = [0usize; 2];

            for vehicle in vehicles.iter().filter(|v| v.kind != VehicleKind::Ambulance) {
                let distance = vehicle.position.distance(&intersection.position);
                if distance > config.analysis_radius || distance < config.analysis_min_distance {
                    continue;
                }
                let bearing = vehicle.position.angle_to(&intersection.position);
                if angle_between(vehicle.heading, bearing) >= config.approach_angle {
                    continue;
                }

                let facing = lights
                    .lights_at(&intersection.id)
                    .min_by_key(|light| OrderedFloat(angle_between(light.heading, vehicle.heading)));
                if let Some(light) = facing {
                    counts[(light.phase as usize).min(1)] += 1;
                }
            }

            IntersectionCongestion::from_counts(intersection.id.clone(), counts[0], counts[1], config)
        })
        .collect()
}

/// Heuristic decisions used when the remote service is unavailable
///
/// Prioritizes the dominant phase wherever the imbalance crosses the
/// threshold, skipping intersections that already have an active override.
pub fn local_decisions(
    analysis: &[IntersectionCongestion],
    lights: &TrafficLightController,
    now: f64,
    config: &ControlConfig,
) -> Vec<PhaseDecision> {
    analysis
        .iter()
        .filter(|a| lights.active_override(&a.intersection_id, now).is_none())
        .filter(|a| a.needs_optimization && a.imbalance() >= config.imbalance_threshold)
        .map(|a| PhaseDecision {
            intersection_id: a.intersection_id.clone(),
            action: PhaseAction::prioritize(a.dominant_phase),
            reason: format!(
                "{} vehicles waiting in phase {}",
                a.count_for(a.dominant_phase),
                a.dominant_phase
            ),
        })
        .collect()
}

/// Describe the traffic situation for the remote model
pub fn build_prompt(analysis: &[IntersectionCongestion]) -> Option<String> {
    if analysis.is_empty() {
        return None;
    }

    let mut prompt = String::from(
        "You control traffic lights. Each intersection has two phases; \
         give green to the phase with more waiting vehicles.\n\nTRAFFIC DATA:\n",
    );
    for a in analysis {
        let _ = write!(
            prompt,
            "\nIntersection {}:\n- Phase 0: {} vehicles waiting\n- Phase 1: {} vehicles waiting\n- Congestion: {}%\n- Requires action: {}\n",
            a.intersection_id,
            a.phase0_count,
            a.phase1_count,
            a.congestion_score,
            if a.needs_optimization { "YES" } else { "NO" }
        );
    }
    prompt.push_str(
        "\nRespond ONLY with JSON of the form:\n\
         {\"decisions\": [{\"intersectionId\": \"id\", \
         \"action\": \"PRIORITIZE_PHASE_0\" | \"PRIORITIZE_PHASE_1\" | \"KEEP_CURRENT\", \
         \"reason\": \"...\"}], \"thinking\": \"...\"}\n",
    );
    Some(prompt)
}

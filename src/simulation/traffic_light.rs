//! Traffic light logic for the traffic simulation
//!
//! Each signalized intersection runs a two-phase cycle
//! (phase 0 green, phase 0 yellow, phase 1 green, phase 1 yellow) shifted by
//! its own offset. A [`PhaseOverride`] replaces the cycle until it expires.

use log::{debug, info};
use ordered_float::OrderedFloat;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

use super::road_network::RoadGraph;
use super::types::{normalize_angle, IntersectionId, LightId, LightState, NodeId, Position};
use crate::config::LightConfig;

/// One light per incoming road at a signalized intersection
#[derive(Debug, Clone)]
pub struct TrafficLight {
    pub id: LightId,
    pub intersection_id: IntersectionId,
    pub position: Position,
    /// Travel direction of the traffic this light faces
    pub heading: f64,
    pub phase: u8,
    pub state: LightState,
}

/// A time-boxed forced phase for one intersection
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOverride {
    pub intersection_id: IntersectionId,
    pub priority_phase: u8,
    pub expires_at: f64,
}

#[derive(Debug, Clone)]
pub struct SignalizedIntersection {
    pub id: IntersectionId,
    pub node: NodeId,
    pub position: Position,
    /// Shift applied to the clock so intersections do not switch in lockstep
    pub cycle_offset: f64,
    pub lights: Vec<LightId>,
}

/// Owns every light and the active overrides
#[derive(Debug, Clone)]
pub struct TrafficLightController {
    pub lights: Vec<TrafficLight>,
    intersections: Vec<SignalizedIntersection>,
    index: HashMap<IntersectionId, usize>,
    overrides: HashMap<IntersectionId, PhaseOverride>,
    green_duration: f64,
    yellow_duration: f64,
    setback: f64,
}

impl TrafficLightController {
    pub fn new(config: &LightConfig) -> Self {
        Self {
            lights: Vec::new(),
            intersections: Vec::new(),
            index: HashMap::new(),
            overrides: HashMap::new(),
            green_duration: config.green_duration,
            yellow_duration: config.yellow_duration,
            setback: config.setback,
        }
    }

    /// Signalize a random subset of `candidates`, never the antenna's intersection
    pub fn generate<R: Rng + ?Sized>(
        candidates: &[(IntersectionId, NodeId)],
        antenna: Option<&IntersectionId>,
        graph: &RoadGraph,
        config: &LightConfig,
        rng: &mut R,
    ) -> Self {
        let mut controller = Self::new(config);

        let mut pool: Vec<&(IntersectionId, NodeId)> = candidates
            .iter()
            .filter(|(id, _)| Some(id) != antenna)
            .collect();
        pool.shuffle(rng);
        let wanted = (pool.len() as f64 * config.selection_ratio).ceil() as usize;

        for (id, node) in pool.into_iter().take(wanted) {
            let offset = rng.random_range(0.0..controller.cycle_length().max(f64::EPSILON));
            controller.signalize(id.clone(), *node, graph, offset);
        }

        info!(
            "Signalized {} intersections with {} lights",
            controller.intersections.len(),
            controller.lights.len()
        );
        controller
    }

    /// Add one light per incident road; returns how many lights were created
    ///
    /// Roads are sorted by compass heading and phases alternate along that
    /// order. With three or more roads this only approximates opposite-pair
    /// grouping.
    pub fn signalize(
        &mut self,
        id: IntersectionId,
        node: NodeId,
        graph: &RoadGraph,
        cycle_offset: f64,
    ) -> usize {
        if self.index.contains_key(&id) {
            return 0;
        }
        let Some(center) = graph.position(node) else {
            return 0;
        };

        let mut outgoing: Vec<f64> = graph
            .neighbors(node)
            .into_iter()
            .filter_map(|n| graph.position(n))
            .filter(|p| p.distance(&center) > 0.0)
            .map(|p| center.angle_to(&p))
            .collect();
        if outgoing.len() < 2 {
            debug!("Intersection {} has fewer than two roads, not signalized", id);
            return 0;
        }
        outgoing.sort_by_key(|&angle| OrderedFloat(angle));
        outgoing.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        let mut light_ids = Vec::with_capacity(outgoing.len());
        for (i, angle) in outgoing.iter().enumerate() {
            let light_id = LightId(self.lights.len());
            let position = center.offset(angle.cos() * self.setback, angle.sin() * self.setback);
            self.lights.push(TrafficLight {
                id: light_id,
                intersection_id: id.clone(),
                position,
                heading: normalize_angle(angle + std::f64::consts::PI),
                phase: (i % 2) as u8,
                state: LightState::Red,
            });
            light_ids.push(light_id);
        }

        let count = light_ids.len();
        self.index.insert(id.clone(), self.intersections.len());
        self.intersections.push(SignalizedIntersection {
            id,
            node,
            position: center,
            cycle_offset,
            lights: light_ids,
        });
        count
    }

    pub fn cycle_length(&self) -> f64 {
        2.0 * (self.green_duration + self.yellow_duration)
    }

    pub fn intersections(&self) -> &[SignalizedIntersection] {
        &self.intersections
    }

    pub fn intersection(&self, id: &IntersectionId) -> Option<&SignalizedIntersection> {
        self.index.get(id).map(|&i| &self.intersections[i])
    }

    pub fn lights_at<'a>(&'a self, id: &'a IntersectionId) -> impl Iterator<Item = &'a TrafficLight> + 'a {
        self.lights.iter().filter(move |l| &l.intersection_id == id)
    }

    /// State of `phase` under the unoverridden timed cycle
    pub fn cycle_state(&self, phase: u8, cycle_offset: f64, now: f64) -> LightState {
        let cycle = self.cycle_length();
        if cycle <= 0.0 {
            return LightState::Red;
        }
        let t = (now + cycle_offset).rem_euclid(cycle);
        let half = self.green_duration + self.yellow_duration;
        let (active, local) = if t < half { (0, t) } else { (1, t - half) };

        if phase != active {
            LightState::Red
        } else if local < self.green_duration {
            LightState::Green
        } else {
            LightState::Yellow
        }
    }

    /// State a light should show at `now`, overrides included
    pub fn state_at(&self, light: &TrafficLight, now: f64) -> LightState {
        if let Some(active) = self.active_override(&light.intersection_id, now) {
            return if light.phase != active.priority_phase {
                LightState::Red
            } else if active.expires_at - now <= self.yellow_duration {
                LightState::Yellow
            } else {
                LightState::Green
            };
        }

        let offset = self
            .intersection(&light.intersection_id)
            .map(|i| i.cycle_offset)
            .unwrap_or(0.0);
        self.cycle_state(light.phase, offset, now)
    }

    /// Recompute every light and drop expired overrides
    pub fn advance(&mut self, now: f64) {
        self.overrides.retain(|id, o| {
            let keep = now < o.expires_at;
            if !keep {
                debug!("Override for {} expired, resuming cycle", id);
            }
            keep
        });

        let states: Vec<LightState> = self.lights.iter().map(|l| self.state_at(l, now)).collect();
        for (light, state) in self.lights.iter_mut().zip(states) {
            light.state = state;
        }
    }

    /// Install an override; the last write for an intersection wins
    ///
    /// Returns false for intersections without lights or invalid phases.
    pub fn apply_override(&mut self, phase_override: PhaseOverride) -> bool {
        if phase_override.priority_phase > 1 || !self.index.contains_key(&phase_override.intersection_id) {
            debug!(
                "Dropping override for unknown intersection {}",
                phase_override.intersection_id
            );
            return false;
        }
        self.overrides
            .insert(phase_override.intersection_id.clone(), phase_override);
        true
    }

    pub fn active_override(&self, id: &IntersectionId, now: f64) -> Option<&PhaseOverride> {
        self.overrides.get(id).filter(|o| now < o.expires_at)
    }

    pub fn active_override_count(&self, now: f64) -> usize {
        self.overrides.values().filter(|o| now < o.expires_at).count()
    }
}

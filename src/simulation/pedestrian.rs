//! Pedestrians and zebra crossings
//!
//! Pedestrians wander the sidewalks without a destination and occasionally
//! cross the road at a free zebra crossing. A crossing holds at most one
//! pedestrian at a time.

use log::debug;
use ordered_float::OrderedFloat;
use rand::seq::IndexedRandom;
use rand::Rng;

use super::road_network::RoadGraph;
use super::types::{
    CrossingId, CrossingState, NodeId, PedestrianId, Position, SidewalkSide,
};
use crate::config::PedestrianConfig;

/// A fixed point on an arc where pedestrians may cross
#[derive(Debug, Clone)]
pub struct ZebraCrossing {
    pub id: CrossingId,
    pub position: Position,
    /// Direction of the road at the crossing
    pub heading: f64,
    pub occupied_by: Option<PedestrianId>,
}

impl ZebraCrossing {
    /// Claim the crossing; fails when another pedestrian holds it
    pub fn try_occupy(&mut self, pedestrian: PedestrianId) -> bool {
        match self.occupied_by {
            None => {
                self.occupied_by = Some(pedestrian);
                true
            }
            Some(current) => current == pedestrian,
        }
    }

    pub fn release(&mut self, pedestrian: PedestrianId) {
        if self.occupied_by == Some(pedestrian) {
            self.occupied_by = None;
        }
    }
}

/// Place one crossing at the midpoint of every sufficiently long arc
pub fn generate_crossings(graph: &RoadGraph, config: &PedestrianConfig) -> Vec<ZebraCrossing> {
    let mut crossings: Vec<ZebraCrossing> = Vec::new();

    for (from, to) in graph.arcs() {
        let (Some(a), Some(b)) = (graph.position(from), graph.position(to)) else {
            continue;
        };
        if a.distance(&b) < config.min_arc_length {
            continue;
        }

        let midpoint = a.lerp(&b, 0.5);
        if crossings
            .iter()
            .any(|c| c.position.distance(&midpoint) < config.min_crossing_spacing)
        {
            continue;
        }

        crossings.push(ZebraCrossing {
            id: CrossingId(crossings.len()),
            position: midpoint,
            heading: a.angle_to(&b),
            occupied_by: None,
        });
    }

    crossings
}

/// Chance of starting a crossing during one tick of length `delta_secs`
///
/// Derived from a per-second rate so crossing frequency does not depend on
/// the frame rate.
pub fn crossing_probability(rate: f64, delta_secs: f64) -> f64 {
    1.0 - (-rate.max(0.0) * delta_secs.max(0.0)).exp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PedestrianUpdateResult {
    Continue,
    /// The road walked on is no longer in the graph
    Despawn,
}

/// A pedestrian in the simulation
#[derive(Debug, Clone)]
pub struct Pedestrian {
    pub id: PedestrianId,
    pub position: Position,
    /// Node the current sidewalk segment starts from
    pub from: NodeId,
    /// Node the current sidewalk segment leads to
    pub to: NodeId,
    /// Node the walk continues to after `to`, chosen on demand
    pub next: Option<NodeId>,
    /// Point currently walked towards
    pub target: Position,
    pub sidewalk_side: SidewalkSide,
    pub crossing_state: CrossingState,
    pub crossing_cooldown: f64,
    /// The crossing held while in `CrossingState::Crossing`
    pub crossing: Option<CrossingId>,
}

impl Pedestrian {
    /// Start a pedestrian on the sidewalk of the `from -> to` segment
    pub fn new(
        id: PedestrianId,
        from: NodeId,
        to: NodeId,
        side: SidewalkSide,
        graph: &RoadGraph,
        config: &PedestrianConfig,
    ) -> Option<Self> {
        let start = graph.position(from)?;
        let target = sidewalk_point(graph, from, to, side, config.sidewalk_offset)?;
        let (ox, oy) = start.right_offset(&graph.position(to)?, -side.sign() * config.sidewalk_offset);

        Some(Self {
            id,
            position: start.offset(ox, oy),
            from,
            to,
            next: None,
            target,
            sidewalk_side: side,
            crossing_state: CrossingState::Walking,
            crossing_cooldown: 0.0,
            crossing: None,
        })
    }

    pub fn is_crossing(&self) -> bool {
        self.crossing_state == CrossingState::Crossing
    }

    /// Update pedestrian movement for one tick
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        delta_secs: f64,
        graph: &RoadGraph,
        crossings: &mut [ZebraCrossing],
        config: &PedestrianConfig,
        rng: &mut R,
    ) -> PedestrianUpdateResult {
        self.crossing_cooldown = (self.crossing_cooldown - delta_secs).max(0.0);

        match self.crossing_state {
            CrossingState::Crossing => {
                self.walk_crossing(delta_secs, graph, crossings, config);
                PedestrianUpdateResult::Continue
            }
            CrossingState::Walking => {
                if self.try_start_crossing(delta_secs, crossings, config, rng) {
                    return PedestrianUpdateResult::Continue;
                }
                self.walk_sidewalk(delta_secs, graph, config, rng)
            }
        }
    }

    fn try_start_crossing<R: Rng + ?Sized>(
        &mut self,
        delta_secs: f64,
        crossings: &mut [ZebraCrossing],
        config: &PedestrianConfig,
        rng: &mut R,
    ) -> bool {
        if self.crossing_cooldown > 0.0 {
            return false;
        }

        let nearest = crossings
            .iter_mut()
            .filter(|c| c.occupied_by.is_none())
            .filter(|c| c.position.distance(&self.position) <= config.crossing_search_radius)
            .min_by_key(|c| OrderedFloat(c.position.distance(&self.position)));

        let Some(crossing) = nearest else {
            return false;
        };

        if !rng.random_bool(crossing_probability(config.crossing_rate, delta_secs)) {
            return false;
        }

        if !crossing.try_occupy(self.id) {
            return false;
        }

        // Which side of the crossing's road we stand on; the target is the other one
        let (hx, hy) = (crossing.heading.cos(), crossing.heading.sin());
        let dx = self.position.x - crossing.position.x;
        let dy = self.position.y - crossing.position.y;
        let cross = hx * dy - hy * dx;
        let current_side = if cross.abs() > f64::EPSILON {
            cross.signum()
        } else {
            self.sidewalk_side.sign()
        };
        let (nx, ny) = (-hy, hx);
        let reach = -current_side * config.sidewalk_offset;

        self.target = crossing.position.offset(nx * reach, ny * reach);
        self.crossing_state = CrossingState::Crossing;
        self.crossing = Some(crossing.id);
        debug!("Pedestrian {:?} started crossing at {:?}", self.id, crossing.id);
        true
    }

    fn walk_crossing(
        &mut self,
        delta_secs: f64,
        graph: &RoadGraph,
        crossings: &mut [ZebraCrossing],
        config: &PedestrianConfig,
    ) {
        self.position = self
            .position
            .step_towards(&self.target, config.walk_speed * delta_secs);

        if self.position.distance(&self.target) > config.arrival_epsilon {
            return;
        }

        if let Some(crossing) = self.crossing.take() {
            if let Some(c) = crossings.get_mut(crossing.0) {
                c.release(self.id);
            }
        }
        self.sidewalk_side = self.sidewalk_side.flipped();
        self.crossing_state = CrossingState::Walking;
        self.crossing_cooldown = config.crossing_cooldown;
        // The corner ahead is on the other side now
        self.next = None;
        if let Some(target) =
            sidewalk_point(graph, self.from, self.to, self.sidewalk_side, config.sidewalk_offset)
        {
            self.target = target;
        }
    }

    fn walk_sidewalk<R: Rng + ?Sized>(
        &mut self,
        delta_secs: f64,
        graph: &RoadGraph,
        config: &PedestrianConfig,
        rng: &mut R,
    ) -> PedestrianUpdateResult {
        if self.next.is_none() && !self.plan_corner(graph, config, rng) {
            return PedestrianUpdateResult::Despawn;
        }

        self.position = self
            .position
            .step_towards(&self.target, config.walk_speed * delta_secs);

        if self.position.distance(&self.target) > config.arrival_epsilon {
            return PedestrianUpdateResult::Continue;
        }

        let Some(next) = self.next.take() else {
            return PedestrianUpdateResult::Despawn;
        };
        self.position = self.target;
        // Turning back keeps the same kerb, which is the other side of the new direction
        if next == self.from {
            self.sidewalk_side = self.sidewalk_side.flipped();
        }
        self.from = self.to;
        self.to = next;

        if self.plan_corner(graph, config, rng) {
            PedestrianUpdateResult::Continue
        } else {
            PedestrianUpdateResult::Despawn
        }
    }

    /// Pick the road taken at `to` and aim for the sidewalk corner joining the two
    ///
    /// Only roads reachable without stepping off the kerb are candidates: the
    /// road walked so far, and the next road around the corner on this side.
    fn plan_corner<R: Rng + ?Sized>(
        &mut self,
        graph: &RoadGraph,
        config: &PedestrianConfig,
        rng: &mut R,
    ) -> bool {
        let (Some(from), Some(to)) = (graph.position(self.from), graph.position(self.to)) else {
            return false;
        };

        let back = to.angle_to(&from);
        let around = graph
            .neighbors(self.to)
            .into_iter()
            .filter(|&n| n != self.from)
            .filter_map(|n| {
                let angle = to.angle_to(&graph.position(n)?);
                // Left sidewalks sweep clockwise from the road behind, right ones counter-clockwise
                let sweep = match self.sidewalk_side {
                    SidewalkSide::Left => back - angle,
                    SidewalkSide::Right => angle - back,
                };
                Some((OrderedFloat(sweep.rem_euclid(std::f64::consts::TAU)), n))
            })
            .filter(|(sweep, _)| sweep.0 > f64::EPSILON)
            .min()
            .map(|(_, n)| n);

        let candidates: Vec<NodeId> = std::iter::once(self.from).chain(around).collect();
        let Some(&next) = candidates.choose(rng) else {
            return false;
        };

        // Turning back happens at the same kerb corner a turn would use
        let (pivot, pivot_side) = match around {
            Some(n) => (n, self.sidewalk_side),
            None => (self.from, self.sidewalk_side.flipped()),
        };
        let Some(pivot_pos) = graph.position(pivot) else {
            return false;
        };
        self.target = corner_point(
            &from,
            &to,
            &pivot_pos,
            self.sidewalk_side,
            pivot_side,
            config.sidewalk_offset,
        );
        self.next = Some(next);
        true
    }

    /// Give up any crossing held, used when the pedestrian leaves the world
    pub fn release_crossing(&mut self, crossings: &mut [ZebraCrossing]) {
        if let Some(crossing) = self.crossing.take() {
            if let Some(c) = crossings.get_mut(crossing.0) {
                c.release(self.id);
            }
        }
    }
}

/// Where the sidewalk of `a -> b` meets the sidewalk of `b -> c` at `b`
///
/// Both sidewalks keep `offset` from their centre lines; the corner is the
/// mitre of the two, capped for very sharp turns.
fn corner_point(
    a: &Position,
    b: &Position,
    c: &Position,
    side_in: SidewalkSide,
    side_out: SidewalkSide,
    offset: f64,
) -> Position {
    let (ix, iy) = a.right_offset(b, -side_in.sign());
    let (ox, oy) = b.right_offset(c, -side_out.sign());
    let dot = ix * ox + iy * oy;
    let scale = offset / (1.0 + dot).max(0.25);
    b.offset((ix + ox) * scale, (iy + oy) * scale)
}

/// End point of the sidewalk along `from -> to` on the given side
fn sidewalk_point(
    graph: &RoadGraph,
    from: NodeId,
    to: NodeId,
    side: SidewalkSide,
    offset: f64,
) -> Option<Position> {
    let a = graph.position(from)?;
    let b = graph.position(to)?;
    // `right_offset` points right; left sidewalks use the negated offset
    let (ox, oy) = a.right_offset(&b, -side.sign() * offset);
    Some(b.offset(ox, oy))
}

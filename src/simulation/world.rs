//! Main simulation world that ties everything together
//!
//! [`SimWorld::tick`] is the only place agent state changes. Results from the
//! remote decision services arrive through an optional [`ControlLink`] and are
//! applied at the start of the next tick, never awaited.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::hazard::{resolve_speed, AmbulanceZone, HazardScene, SpeedDecision, SpeedReason};
use super::map::MapData;
use super::pedestrian::{generate_crossings, Pedestrian, PedestrianUpdateResult, ZebraCrossing};
use super::road_network::RoadGraph;
use super::scheduler::{Scheduler, TaskKind};
use super::stats::SimulationStats;
use super::traffic_light::{PhaseOverride, TrafficLightController};
use super::types::{
    CrossingId, CrossingState, IntersectionId, LightId, LightState, NodeId, PedestrianId,
    Position, SidewalkSide, SimId, TravelDirection, VehicleId, VehicleKind,
};
use super::vehicle::{ActiveCommand, CommandAction, Vehicle, VehicleUpdateResult, VehicleView};
use crate::config::{degrees_per_sec_to_kmh, kmh_to_degrees_per_sec, SimConfig};
use crate::control::{
    analyze_congestion, build_prompt, local_decisions, parse_ai_decision, CollisionTickResponse,
    ControlError, ControlLink, ControlReply, ControlRequest, DirectiveAction, IntersectionCongestion,
    OptimizationResponse, PhaseDecision, VehicleDirective, VehiclePositionReport,
};

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub kind: VehicleKind,
    pub direction: TravelDirection,
    pub position: Position,
    pub heading: f64,
    /// Effective speed applied during the tick, degrees per second
    pub speed: f64,
    pub reason: SpeedReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PedestrianSnapshot {
    pub id: PedestrianId,
    pub position: Position,
    pub crossing_state: CrossingState,
    pub sidewalk_side: SidewalkSide,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightSnapshot {
    pub id: LightId,
    pub intersection_id: IntersectionId,
    pub position: Position,
    pub heading: f64,
    pub phase: u8,
    pub state: LightState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossingSnapshot {
    pub id: CrossingId,
    pub position: Position,
    pub heading: f64,
    pub occupied_by: Option<PedestrianId>,
}

/// Read-only copy of the world taken once per tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    pub time: f64,
    pub vehicles: Vec<VehicleSnapshot>,
    pub pedestrians: Vec<PedestrianSnapshot>,
    pub lights: Vec<LightSnapshot>,
    pub crossings: Vec<CrossingSnapshot>,
    pub active_overrides: usize,
}

/// The main simulation world
pub struct SimWorld {
    /// Road graph, read-only after construction
    pub graph: RoadGraph,

    pub config: SimConfig,

    /// Active vehicles, ordered by id so every tick visits them in the same order
    pub vehicles: BTreeMap<VehicleId, Vehicle>,

    /// Active pedestrians
    pub pedestrians: BTreeMap<PedestrianId, Pedestrian>,

    /// Zebra crossings, indexed by `CrossingId`
    pub crossings: Vec<ZebraCrossing>,

    pub lights: TrafficLightController,

    /// Spawn timers and remote polling cadence
    pub scheduler: Scheduler,

    /// Simulation time in seconds
    pub time: f64,

    pub stats: SimulationStats,

    /// Next ID to assign
    next_id: usize,

    rng: StdRng,

    /// Round-robin positions in the west and east entry lists
    west_cursor: usize,
    east_cursor: usize,

    /// Effective speeds of the last tick, read as lead-vehicle speeds
    previous_speeds: HashMap<VehicleId, f64>,

    snapshot: WorldSnapshot,

    control: Option<ControlLink>,
}

impl SimWorld {
    pub fn new(map: &MapData, config: SimConfig) -> Result<Self> {
        Self::new_with_seed(map, config, rand::random())
    }

    /// Create a world with a seeded RNG for reproducible simulations
    pub fn new_with_seed(map: &MapData, config: SimConfig, seed: u64) -> Result<Self> {
        let graph =
            RoadGraph::from_map(map, &config.planner).context("Failed to build road graph")?;
        if graph.node_count() == 0 {
            bail!("Map contains no nodes");
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let candidates = intersection_candidates(map, &graph);
        let antenna = antenna_intersection(map, &graph, &candidates);
        if let Some(antenna) = &antenna {
            debug!("Intersection {} hosts the antenna and stays unsignalized", antenna);
        }
        let lights = TrafficLightController::generate(
            &candidates,
            antenna.as_ref(),
            &graph,
            &config.lights,
            &mut rng,
        );
        let crossings = generate_crossings(&graph, &config.pedestrian);

        info!(
            "World ready: {} nodes, {} roads, {} intersections, {} crossings",
            graph.node_count(),
            graph.arc_count(),
            candidates.len(),
            crossings.len()
        );

        let mut world = Self {
            graph,
            config,
            vehicles: BTreeMap::new(),
            pedestrians: BTreeMap::new(),
            crossings,
            lights,
            scheduler: Scheduler::new(),
            time: 0.0,
            stats: SimulationStats::default(),
            next_id: 0,
            rng,
            west_cursor: 0,
            east_cursor: 0,
            previous_speeds: HashMap::new(),
            snapshot: WorldSnapshot::default(),
            control: None,
        };
        world.schedule_tasks();
        world.lights.advance(0.0);
        world.refresh_snapshot(&HashMap::new());
        Ok(world)
    }

    fn schedule_tasks(&mut self) {
        let spawn = &self.config.spawn;
        self.scheduler
            .every(TaskKind::SpawnEastbound, spawn.vehicle_period, 0.0);
        self.scheduler.every(
            TaskKind::SpawnWestbound,
            spawn.vehicle_period,
            spawn.vehicle_period / 2.0,
        );
        self.scheduler.every(
            TaskKind::SpawnAmbulance,
            spawn.ambulance_period,
            spawn.ambulance_first_at,
        );
        self.scheduler
            .every(TaskKind::SpawnPedestrian, spawn.pedestrian_period, 0.0);

        let period = self.config.control.optimization_period;
        self.scheduler
            .every(TaskKind::TrafficOptimization, period, period);
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Connect the remote decision services and start collision polling
    pub fn attach_control(&mut self, link: ControlLink) {
        let period = self.config.control.collision_poll_period;
        self.scheduler
            .every(TaskKind::CollisionPoll, period, self.time + period);
        self.control = Some(link);
    }

    /// Disconnect the remote services; optimization falls back to the local heuristic
    pub fn detach_control(&mut self) -> Option<ControlLink> {
        self.scheduler.cancel(TaskKind::CollisionPoll);
        self.control.take()
    }

    pub fn control(&self) -> Option<&ControlLink> {
        self.control.as_ref()
    }

    /// Main simulation tick
    pub fn tick(&mut self, delta_secs: f64) {
        let delta_secs = if delta_secs.is_finite() {
            delta_secs.max(0.0)
        } else {
            0.0
        };
        self.time += delta_secs;

        self.drain_control_replies();

        for task in self.scheduler.due(self.time) {
            self.run_task(task);
        }

        for vehicle in self.vehicles.values_mut() {
            vehicle.expire_command(self.time);
        }
        self.lights.advance(self.time);

        let views = self.vehicle_views();
        let zones = self.ambulance_zones(&views);
        let decisions = self.update_vehicles(&views, &zones, delta_secs);
        self.update_pedestrians(&zones, delta_secs);

        self.refresh_snapshot(&decisions);
        self.previous_speeds = decisions
            .iter()
            .map(|(id, decision)| (*id, decision.speed))
            .collect();
    }

    fn run_task(&mut self, task: TaskKind) {
        match task {
            TaskKind::SpawnEastbound => self.spawn_scheduled_vehicle(TravelDirection::LeftToRight),
            TaskKind::SpawnWestbound => self.spawn_scheduled_vehicle(TravelDirection::RightToLeft),
            TaskKind::SpawnAmbulance => self.spawn_scheduled_ambulance(),
            TaskKind::SpawnPedestrian => self.spawn_scheduled_pedestrian(),
            TaskKind::CollisionPoll => self.poll_collisions(),
            TaskKind::TrafficOptimization => self.optimize_traffic(),
        }
    }

    fn spawn_scheduled_vehicle(&mut self, direction: TravelDirection) {
        let normal = self.vehicles.values().filter(|v| !v.is_ambulance()).count();
        if normal >= self.config.spawn.max_vehicles {
            return;
        }
        if let Err(err) = self.spawn_vehicle(direction, VehicleKind::Normal) {
            debug!("Skipped {:?} spawn: {:#}", direction, err);
        }
    }

    fn spawn_scheduled_ambulance(&mut self) {
        let active = self.vehicles.values().filter(|v| v.is_ambulance()).count();
        if active >= self.config.spawn.max_ambulances {
            return;
        }
        let direction = if self.rng.random_bool(0.5) {
            TravelDirection::LeftToRight
        } else {
            TravelDirection::RightToLeft
        };
        match self.spawn_vehicle(direction, VehicleKind::Ambulance) {
            Ok(id) => info!("Ambulance {} dispatched ({:?})", id, direction),
            Err(err) => debug!("Skipped ambulance spawn: {:#}", err),
        }
    }

    fn spawn_scheduled_pedestrian(&mut self) {
        if self.pedestrians.len() >= self.config.spawn.max_pedestrians {
            return;
        }
        let walkable: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|&n| self.graph.degree(n) > 0)
            .collect();
        let Some(&from) = walkable.choose(&mut self.rng) else {
            return;
        };
        let Some(&to) = self.graph.neighbors(from).choose(&mut self.rng) else {
            return;
        };
        let side = if self.rng.random_bool(0.5) {
            SidewalkSide::Left
        } else {
            SidewalkSide::Right
        };
        self.add_pedestrian(from, to, side);
    }

    /// Next spawn node for `direction`, cycling north to south
    fn next_spawn_node(&mut self, direction: TravelDirection) -> Option<NodeId> {
        let entries = self.graph.entries(direction);
        if entries.is_empty() {
            return None;
        }
        let cursor = match direction {
            TravelDirection::LeftToRight => &mut self.west_cursor,
            TravelDirection::RightToLeft => &mut self.east_cursor,
        };
        let node = entries[*cursor % entries.len()];
        *cursor += 1;
        Some(node)
    }

    /// Spawn a vehicle at the next entry node and route it to the opposite boundary
    pub fn spawn_vehicle(
        &mut self,
        direction: TravelDirection,
        kind: VehicleKind,
    ) -> Result<VehicleId> {
        let start = self
            .next_spawn_node(direction)
            .with_context(|| format!("No entry nodes for {:?} traffic", direction))?;

        let path = self.graph.find_route(
            start,
            direction,
            self.config.planner.forward_tolerance,
            &mut self.rng,
        );
        if path.len() < 2 {
            bail!(
                "No route from {} towards the {:?} exit",
                self.graph.key(start).unwrap_or("?"),
                direction
            );
        }

        let base_speed = match kind {
            VehicleKind::Normal => {
                let vehicle = &self.config.vehicle;
                if vehicle.speed_jitter > 0.0 {
                    vehicle.base_speed
                        + self
                            .rng
                            .random_range(-vehicle.speed_jitter..=vehicle.speed_jitter)
                } else {
                    vehicle.base_speed
                }
            }
            VehicleKind::Ambulance => self.config.vehicle.ambulance_speed,
        };

        self.spawn_vehicle_on_path(path, base_speed, kind, direction)
    }

    /// Spawn a vehicle on an explicit node path
    pub fn spawn_vehicle_on_path(
        &mut self,
        path: Vec<NodeId>,
        base_speed: f64,
        kind: VehicleKind,
        direction: TravelDirection,
    ) -> Result<VehicleId> {
        let id = VehicleId(self.next_sim_id());
        let vehicle = Vehicle::spawn(
            id,
            path,
            base_speed,
            kind,
            direction,
            &self.graph,
            &self.config.vehicle,
        )?;
        debug!(
            "Spawned {} ({:?}, {:?}) with {} waypoints",
            id,
            kind,
            direction,
            vehicle.path.len()
        );

        self.vehicles.insert(id, vehicle);
        self.stats.vehicles_spawned += 1;
        if kind == VehicleKind::Ambulance {
            self.stats.ambulances_spawned += 1;
        }
        Ok(id)
    }

    /// Place a pedestrian on the sidewalk of `from -> to`
    pub fn add_pedestrian(
        &mut self,
        from: NodeId,
        to: NodeId,
        side: SidewalkSide,
    ) -> Option<PedestrianId> {
        let id = PedestrianId(self.next_sim_id());
        let pedestrian =
            Pedestrian::new(id, from, to, side, &self.graph, &self.config.pedestrian)?;
        self.pedestrians.insert(id, pedestrian);
        self.stats.pedestrians_spawned += 1;
        debug!("Spawned pedestrian {:?}", id);
        Some(id)
    }

    pub fn vehicle_views(&self) -> Vec<VehicleView> {
        self.vehicles.values().map(Vehicle::view).collect()
    }

    fn ambulance_zones(&self, views: &[VehicleView]) -> Vec<AmbulanceZone> {
        let half_width = self.config.hazard.ambulance_zone_half_width;
        views
            .iter()
            .filter_map(|view| AmbulanceZone::from_view(view, half_width))
            .collect()
    }

    fn pedestrian_positions(&self) -> Vec<Position> {
        self.pedestrians.values().map(|p| p.position).collect()
    }

    /// Speed the hazard rules would give `id` right now
    pub fn effective_speed(&self, id: VehicleId) -> Option<SpeedDecision> {
        let views = self.vehicle_views();
        let view = views.iter().find(|v| v.id == id)?;
        let zones = self.ambulance_zones(&views);
        let pedestrians = self.pedestrian_positions();
        let scene = HazardScene {
            vehicles: &views,
            pedestrians: &pedestrians,
            crossings: &self.crossings,
            lights: &self.lights.lights,
            zones: &zones,
            previous_speeds: &self.previous_speeds,
            now: self.time,
            config: &self.config.hazard,
        };
        Some(resolve_speed(view, &scene))
    }

    /// Resolve every vehicle's speed against the same scene, then move them all
    fn update_vehicles(
        &mut self,
        views: &[VehicleView],
        zones: &[AmbulanceZone],
        delta_secs: f64,
    ) -> HashMap<VehicleId, SpeedDecision> {
        let pedestrians = self.pedestrian_positions();
        let decisions: HashMap<VehicleId, SpeedDecision> = {
            let scene = HazardScene {
                vehicles: views,
                pedestrians: &pedestrians,
                crossings: &self.crossings,
                lights: &self.lights.lights,
                zones,
                previous_speeds: &self.previous_speeds,
                now: self.time,
                config: &self.config.hazard,
            };
            views
                .iter()
                .map(|view| (view.id, resolve_speed(view, &scene)))
                .collect()
        };

        let mut arrived = Vec::new();
        for (id, vehicle) in self.vehicles.iter_mut() {
            let speed = decisions.get(id).map(|d| d.speed).unwrap_or(0.0);
            let result = vehicle.advance(speed, delta_secs, &self.graph, &self.config.vehicle);
            if result == VehicleUpdateResult::Arrived {
                arrived.push(*id);
            }
        }

        for id in arrived {
            if let Some(vehicle) = self.vehicles.remove(&id) {
                self.stats.vehicles_completed += 1;
                debug!("{} reached its exit after {} waypoints", id, vehicle.path.len());
            }
        }

        decisions
    }

    fn update_pedestrians(&mut self, zones: &[AmbulanceZone], delta_secs: f64) {
        let mut despawned = Vec::new();

        for (id, pedestrian) in self.pedestrians.iter_mut() {
            // Frozen while inside an ambulance zone, whatever the sub-state
            if zones.iter().any(|zone| zone.contains(&pedestrian.position)) {
                continue;
            }

            let was_crossing = pedestrian.is_crossing();
            let result = pedestrian.update(
                delta_secs,
                &self.graph,
                &mut self.crossings,
                &self.config.pedestrian,
                &mut self.rng,
            );
            if !was_crossing && pedestrian.is_crossing() {
                self.stats.crossings_started += 1;
            }
            if result == PedestrianUpdateResult::Despawn {
                pedestrian.release_crossing(&mut self.crossings);
                despawned.push(*id);
            }
        }

        for id in despawned {
            self.pedestrians.remove(&id);
            self.stats.pedestrians_despawned += 1;
            debug!("Pedestrian {:?} ran out of road", id);
        }
    }

    fn refresh_snapshot(&mut self, decisions: &HashMap<VehicleId, SpeedDecision>) {
        self.snapshot = WorldSnapshot {
            time: self.time,
            vehicles: self
                .vehicles
                .values()
                .map(|v| {
                    let decision = decisions.get(&v.id);
                    VehicleSnapshot {
                        id: v.id,
                        kind: v.kind,
                        direction: v.direction,
                        position: v.position,
                        heading: v.heading,
                        speed: decision.map(|d| d.speed).unwrap_or(0.0),
                        reason: decision.map(|d| d.reason).unwrap_or(SpeedReason::Nominal),
                    }
                })
                .collect(),
            pedestrians: self
                .pedestrians
                .values()
                .map(|p| PedestrianSnapshot {
                    id: p.id,
                    position: p.position,
                    crossing_state: p.crossing_state,
                    sidewalk_side: p.sidewalk_side,
                })
                .collect(),
            lights: self
                .lights
                .lights
                .iter()
                .map(|l| LightSnapshot {
                    id: l.id,
                    intersection_id: l.intersection_id.clone(),
                    position: l.position,
                    heading: l.heading,
                    phase: l.phase,
                    state: l.state,
                })
                .collect(),
            crossings: self
                .crossings
                .iter()
                .map(|c| CrossingSnapshot {
                    id: c.id,
                    position: c.position,
                    heading: c.heading,
                    occupied_by: c.occupied_by,
                })
                .collect(),
            active_overrides: self.lights.active_override_count(self.time),
        };
    }

    /// The read snapshot published at the end of the last tick
    pub fn snapshot(&self) -> &WorldSnapshot {
        &self.snapshot
    }

    /// Vehicle positions in the shape the collision predictor expects
    pub fn position_reports(&self) -> Vec<VehiclePositionReport> {
        self.snapshot
            .vehicles
            .iter()
            .map(|v| VehiclePositionReport {
                id: v.id.to_string(),
                x: v.position.x,
                y: v.position.y,
                speed_kmh: degrees_per_sec_to_kmh(v.speed),
                heading: v.heading,
            })
            .collect()
    }

    fn poll_collisions(&mut self) {
        if self.control.is_none() {
            return;
        }
        let vehicles = self.position_reports();
        if vehicles.is_empty() {
            return;
        }
        let Some(link) = self.control.as_mut() else {
            return;
        };
        match link.submit(ControlRequest::CollisionPoll { vehicles }) {
            Ok(true) => {}
            Ok(false) => debug!("Collision poll still in flight, skipping"),
            Err(err) => self.record_remote_failure("Collision prediction", &err),
        }
    }

    pub fn analyze_congestion(&self) -> Vec<IntersectionCongestion> {
        analyze_congestion(&self.vehicle_views(), &self.lights, &self.config.control)
    }

    fn optimize_traffic(&mut self) {
        let analysis = self.analyze_congestion();
        if !analysis.iter().any(|a| a.needs_optimization) {
            return;
        }
        if self.control.is_none() {
            self.apply_local_decisions(&analysis);
            return;
        }

        let Some(prompt) = build_prompt(&analysis) else {
            return;
        };
        let Some(link) = self.control.as_mut() else {
            return;
        };
        match link.submit(ControlRequest::Optimization { prompt }) {
            Ok(true) => debug!("Requested phase decisions for {} intersections", analysis.len()),
            Ok(false) => debug!("Traffic optimization still in flight, skipping"),
            Err(err) => {
                self.record_remote_failure("Traffic optimization", &err);
                self.apply_local_decisions(&analysis);
            }
        }
    }

    fn drain_control_replies(&mut self) {
        let replies = match self.control.as_mut() {
            Some(link) => link.drain(),
            None => return,
        };
        for reply in replies {
            self.apply_control_reply(reply);
        }
    }

    /// Apply one remote result; failures degrade to local behavior
    pub fn apply_control_reply(&mut self, reply: ControlReply) {
        match reply {
            ControlReply::Collision(Ok(response)) => self.apply_collision_response(response),
            ControlReply::Collision(Err(err)) => {
                self.record_remote_failure("Collision prediction", &err);
                debug!("Skipping collision cycle");
            }
            ControlReply::Optimization(Ok(response)) => self.apply_optimization_response(response),
            ControlReply::Optimization(Err(err)) => {
                self.record_remote_failure("Traffic optimization", &err);
                info!("Using local heuristic for traffic optimization");
                self.apply_local_fallback();
            }
        }
    }

    fn record_remote_failure(&mut self, service: &str, err: &ControlError) {
        self.stats.remote_failures += 1;
        if err.is_transport() {
            self.stats.unreachable_calls += 1;
            warn!("{} service unreachable: {}", service, err);
        } else {
            warn!("{} service sent an unusable reply: {}", service, err);
        }
    }

    fn apply_collision_response(&mut self, response: CollisionTickResponse) {
        if let Some(status) = &response.status {
            debug!("Collision tick status: {}", status);
        }
        if !response.collision_predicted {
            return;
        }

        match response.ai_decision.as_deref().map(parse_ai_decision) {
            Some(Ok(directives)) => {
                for directive in &directives {
                    self.apply_directive(directive);
                }
            }
            Some(Err(err)) => {
                self.stats.remote_failures += 1;
                warn!("Unusable collision decision ({}), stopping the vehicles involved", err);
                self.stop_colliding_vehicles(&response);
            }
            None => {
                warn!("Collision predicted without a decision, stopping the vehicles involved");
                self.stop_colliding_vehicles(&response);
            }
        }
    }

    fn stop_colliding_vehicles(&mut self, response: &CollisionTickResponse) {
        let Some(info) = &response.collision_info else {
            return;
        };
        for vehicle_id in [&info.vehicle1_id, &info.vehicle2_id] {
            self.apply_directive(&VehicleDirective {
                vehicle_id: vehicle_id.clone(),
                action: DirectiveAction::Stop,
                target_speed_kmh: None,
                reason: Some("collision predicted".to_string()),
            });
        }
    }

    /// Install a time-boxed command; unknown vehicles are dropped
    pub fn apply_directive(&mut self, directive: &VehicleDirective) -> bool {
        let expires_at = self.time + self.config.control.command_duration;
        let Some(vehicle) = VehicleId::from_wire(&directive.vehicle_id)
            .and_then(|id| self.vehicles.get_mut(&id))
        else {
            debug!("Dropping command for unknown vehicle {}", directive.vehicle_id);
            return false;
        };

        let target = directive
            .target_speed_kmh
            .filter(|kmh| kmh.is_finite() && *kmh >= 0.0)
            .map(kmh_to_degrees_per_sec);
        let (action, target_speed) = match directive.action {
            DirectiveAction::Stop => (CommandAction::Stop, 0.0),
            DirectiveAction::Slow => (
                CommandAction::Slow,
                target.unwrap_or(vehicle.base_speed * 0.5),
            ),
            DirectiveAction::Accelerate => (
                CommandAction::Accelerate,
                target.unwrap_or(vehicle.base_speed * 1.3),
            ),
        };

        vehicle.active_command = Some(ActiveCommand {
            action,
            target_speed,
            expires_at,
        });
        debug!(
            "{} commanded {:?} until t={:.1}s ({})",
            vehicle.id,
            action,
            expires_at,
            directive.reason.as_deref().unwrap_or("no reason given")
        );
        self.stats.commands_applied += 1;
        true
    }

    fn apply_optimization_response(&mut self, response: OptimizationResponse) {
        if let Some(thinking) = response.thinking.as_deref() {
            debug!("Optimization reasoning: {}", thinking);
        }
        if response.decisions.is_empty() {
            warn!("Traffic optimization returned no decisions, using local heuristic");
            self.apply_local_fallback();
            return;
        }

        let duration = self.config.control.ai_override_duration;
        for decision in &response.decisions {
            if self.apply_phase_decision(decision, duration) {
                self.stats.ai_overrides += 1;
                info!(
                    "AI override at {}: {:?} ({})",
                    decision.intersection_id, decision.action, decision.reason
                );
            }
        }
    }

    fn apply_local_fallback(&mut self) -> usize {
        let analysis = self.analyze_congestion();
        self.apply_local_decisions(&analysis)
    }

    fn apply_local_decisions(&mut self, analysis: &[IntersectionCongestion]) -> usize {
        let decisions = local_decisions(analysis, &self.lights, self.time, &self.config.control);
        let duration = self.config.control.local_override_duration;

        let mut applied = 0;
        for decision in &decisions {
            if self.apply_phase_decision(decision, duration) {
                applied += 1;
                info!(
                    "Local override at {}: {:?} ({})",
                    decision.intersection_id, decision.action, decision.reason
                );
            }
        }
        self.stats.local_overrides += applied as u32;
        applied
    }

    /// Turn a decision into an override lasting `duration`; KEEP_CURRENT does nothing
    fn apply_phase_decision(&mut self, decision: &PhaseDecision, duration: f64) -> bool {
        let Some(priority_phase) = decision.action.priority_phase() else {
            return false;
        };
        let applied = self.lights.apply_override(PhaseOverride {
            intersection_id: decision.intersection_id.clone(),
            priority_phase,
            expires_at: self.time + duration,
        });
        if applied {
            self.lights.advance(self.time);
        }
        applied
    }

    pub fn log_summary(&self) {
        let ambulances = self.vehicles.values().filter(|v| v.is_ambulance()).count();
        let stopped = self
            .snapshot
            .vehicles
            .iter()
            .filter(|v| v.speed <= 0.0)
            .count();
        let crossing = self.pedestrians.values().filter(|p| p.is_crossing()).count();
        info!(
            "t={:.1}s vehicles={} (ambulances={}, stopped={}) pedestrians={} (crossing={}) overrides={}",
            self.time,
            self.vehicles.len(),
            ambulances,
            stopped,
            self.pedestrians.len(),
            crossing,
            self.lights.active_override_count(self.time)
        );
    }

    pub fn log_final_stats(&self) {
        let stats = &self.stats;
        info!("=== SIMULATION COMPLETE ===");
        info!("Elapsed time: {:.2}s", self.time);
        info!("Total vehicles spawned: {}", stats.vehicles_spawned);
        info!("Total vehicles completed: {}", stats.vehicles_completed);
        info!("Active vehicles: {}", self.vehicles.len());
        info!("Ambulances dispatched: {}", stats.ambulances_spawned);
        info!("Pedestrians spawned: {}", stats.pedestrians_spawned);
        info!("Crossings started: {}", stats.crossings_started);
        info!("Signalized intersections: {}", self.lights.intersections().len());
        info!("Total roads: {}", self.graph.arc_count());
        info!(
            "Overrides applied: {} AI, {} local",
            stats.ai_overrides, stats.local_overrides
        );
        info!("Vehicle commands applied: {}", stats.commands_applied);
        info!(
            "Remote failures: {} ({} unreachable)",
            stats.remote_failures, stats.unreachable_calls
        );
        info!("Success rate: {:.1}%", stats.completion_rate());
    }
}

/// Intersections from map data, or detected from node degree when none are listed
fn intersection_candidates(map: &MapData, graph: &RoadGraph) -> Vec<(IntersectionId, NodeId)> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for intersection in &map.intersections {
        let node = graph.node_by_key(&intersection.id).or_else(|| {
            graph.find_closest_node(&Position::new(intersection.lon, intersection.lat))
        });
        if let Some(node) = node {
            if seen.insert(node) {
                candidates.push((IntersectionId(intersection.id.clone()), node));
            }
        }
    }

    if candidates.is_empty() {
        candidates = graph
            .detect_intersections()
            .into_iter()
            .filter_map(|node| {
                graph
                    .key(node)
                    .map(|key| (IntersectionId(key.to_string()), node))
            })
            .collect();
    }

    candidates
}

/// The candidate intersection the antenna sits on, if any
fn antenna_intersection(
    map: &MapData,
    graph: &RoadGraph,
    candidates: &[(IntersectionId, NodeId)],
) -> Option<IntersectionId> {
    let antenna = map.central_antenna.as_ref()?;
    let node = antenna
        .node_id
        .as_deref()
        .and_then(|key| graph.node_by_key(key))
        .or_else(|| graph.find_closest_node(&Position::new(antenna.lon, antenna.lat)))?;
    candidates
        .iter()
        .find(|(_, n)| *n == node)
        .map(|(id, _)| id.clone())
}

//! Road graph and direction-biased route planning
//!
//! Built once per map load from the node/arc records and read-only afterwards.

use anyhow::{Context, Result};
use log::{debug, warn};
use ordered_float::OrderedFloat;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet, VecDeque};

use super::map::MapData;
use super::types::{NodeId, Position, TravelDirection};
use crate::config::PlannerConfig;

/// Node payload stored in the graph
#[derive(Debug, Clone)]
pub struct RoadNode {
    pub key: String,
    pub position: Position,
}

/// Undirected road graph with west/east spawn zones
#[derive(Debug, Default)]
pub struct RoadGraph {
    /// One edge per arc, labelled with the road type
    graph: UnGraph<RoadNode, String>,

    /// Maps map-data node ids to graph nodes
    key_to_node: HashMap<String, NodeIndex>,

    /// West-most quartile, north to south
    west_entries: Vec<NodeId>,

    /// East-most quartile, north to south
    east_entries: Vec<NodeId>,
}

impl RoadGraph {
    pub fn from_map(map: &MapData, config: &PlannerConfig) -> Result<Self> {
        let mut road_graph = RoadGraph::default();

        for node in &map.nodes {
            if road_graph.key_to_node.contains_key(&node.id) {
                warn!("Duplicate map node {} ignored", node.id);
                continue;
            }
            let index = road_graph.graph.add_node(RoadNode {
                key: node.id.clone(),
                position: Position::new(node.lon, node.lat),
            });
            road_graph.key_to_node.insert(node.id.clone(), index);
        }

        let mut skipped = 0usize;
        for arc in &map.arcs {
            match (
                road_graph.key_to_node.get(&arc.from),
                road_graph.key_to_node.get(&arc.to),
            ) {
                (Some(&from), Some(&to)) => {
                    road_graph.graph.add_edge(from, to, arc.road_type.clone());
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("{} arcs reference unknown nodes and were skipped", skipped);
        }

        road_graph.classify_boundaries(config.boundary_fraction);
        debug!(
            "Road graph: {} nodes, {} arcs, {} west entries, {} east entries",
            road_graph.node_count(),
            road_graph.arc_count(),
            road_graph.west_entries.len(),
            road_graph.east_entries.len()
        );

        Ok(road_graph)
    }

    /// Split nodes into west/east zones by longitude range (not by count)
    fn classify_boundaries(&mut self, fraction: f64) {
        let longitudes: Vec<f64> = self.graph.node_weights().map(|n| n.position.x).collect();
        let min_lon = longitudes.iter().copied().fold(f64::INFINITY, f64::min);
        let max_lon = longitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !min_lon.is_finite() {
            return;
        }

        let span = (max_lon - min_lon) * fraction;
        let west_limit = min_lon + span;
        let east_limit = max_lon - span;

        let north_to_south = |nodes: &mut Vec<NodeId>, graph: &UnGraph<RoadNode, String>| {
            nodes.sort_by_key(|id| {
                (
                    std::cmp::Reverse(OrderedFloat(graph[id.0].position.y)),
                    id.0,
                )
            });
        };

        let mut west: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|&i| self.graph[i].position.x <= west_limit)
            .map(NodeId)
            .collect();
        let mut east: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|&i| self.graph[i].position.x >= east_limit)
            .map(NodeId)
            .collect();
        north_to_south(&mut west, &self.graph);
        north_to_south(&mut east, &self.graph);

        self.west_entries = west;
        self.east_entries = east;
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn arc_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_by_key(&self, key: &str) -> Option<NodeId> {
        self.key_to_node.get(key).copied().map(NodeId)
    }

    pub fn key(&self, node: NodeId) -> Option<&str> {
        self.graph.node_weight(node.0).map(|n| n.key.as_str())
    }

    pub fn position(&self, node: NodeId) -> Option<Position> {
        self.graph.node_weight(node.0).map(|n| n.position)
    }

    /// Position lookup for callers that already hold a valid id
    pub fn position_of(&self, node: NodeId) -> Result<Position> {
        self.position(node)
            .with_context(|| format!("Node {:?} not in road graph", node))
    }

    /// Adjacency list of a node; every arc contributes one entry per endpoint
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        if self.graph.node_weight(node.0).is_none() {
            return Vec::new();
        }
        self.graph.neighbors(node.0).map(NodeId).collect()
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.neighbors(node).len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().map(NodeId)
    }

    /// All arcs as (from, to) pairs
    pub fn arcs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.graph
            .edge_references()
            .map(|edge| (NodeId(edge.source()), NodeId(edge.target())))
    }

    /// Spawn nodes for traffic travelling in `direction`
    pub fn entries(&self, direction: TravelDirection) -> &[NodeId] {
        match direction {
            TravelDirection::LeftToRight => &self.west_entries,
            TravelDirection::RightToLeft => &self.east_entries,
        }
    }

    /// Despawn nodes for traffic travelling in `direction`
    pub fn exits(&self, direction: TravelDirection) -> &[NodeId] {
        self.entries(direction.opposite())
    }

    /// Nodes touched by three or more arcs
    pub fn detect_intersections(&self) -> Vec<NodeId> {
        self.nodes().filter(|&n| self.degree(n) >= 3).collect()
    }

    pub fn find_closest_node(&self, position: &Position) -> Option<NodeId> {
        self.graph
            .node_indices()
            .min_by_key(|&i| OrderedFloat(self.graph[i].position.distance(position)))
            .map(NodeId)
    }

    /// Route from `start` to any exit node for `direction`
    ///
    /// A breadth-style search over partial paths. Neighbors are shuffled, then
    /// those that keep moving in the travel direction (within
    /// `forward_tolerance` degrees of longitude) go to the front of the queue
    /// and the rest to the back, so forward roads are explored first. The
    /// result is a reasonable route, not a shortest one. Returns `[start]`
    /// when no exit is reachable.
    pub fn find_route<R: Rng + ?Sized>(
        &self,
        start: NodeId,
        direction: TravelDirection,
        forward_tolerance: f64,
        rng: &mut R,
    ) -> Vec<NodeId> {
        let targets: HashSet<NodeId> = self.exits(direction).iter().copied().collect();
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<Vec<NodeId>> = VecDeque::new();
        queue.push_back(vec![start]);

        while let Some(path) = queue.pop_front() {
            let Some(&current) = path.last() else {
                continue;
            };

            if path.len() >= 2 && targets.contains(&current) {
                return path;
            }

            if !visited.insert(current) {
                continue;
            }

            let Some(current_pos) = self.position(current) else {
                continue;
            };

            let mut neighbors = self.neighbors(current);
            neighbors.shuffle(rng);

            for neighbor in neighbors {
                if visited.contains(&neighbor) {
                    continue;
                }
                let Some(neighbor_pos) = self.position(neighbor) else {
                    continue;
                };

                let forward = match direction {
                    TravelDirection::LeftToRight => {
                        neighbor_pos.x >= current_pos.x - forward_tolerance
                    }
                    TravelDirection::RightToLeft => {
                        neighbor_pos.x <= current_pos.x + forward_tolerance
                    }
                };

                let mut next = path.clone();
                next.push(neighbor);
                if forward {
                    queue.push_front(next);
                } else {
                    queue.push_back(next);
                }
            }
        }

        vec![start]
    }
}

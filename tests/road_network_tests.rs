//! Road graph and route planning tests

use rand::rngs::StdRng;
use rand::SeedableRng;
use urban_traffic::config::PlannerConfig;
use urban_traffic::simulation::{MapData, NodeId, RoadGraph, TravelDirection};

fn keys(graph: &RoadGraph, nodes: &[NodeId]) -> Vec<String> {
    nodes
        .iter()
        .map(|&n| graph.key(n).unwrap_or("?").to_string())
        .collect()
}

/// Three rows of west, middle and east nodes joined horizontally and vertically
fn create_ladder_map() -> MapData {
    let mut map = MapData::default();
    for (row, lat) in [0.002, 0.001, 0.0].iter().enumerate() {
        map.add_node(&format!("w{row}"), 0.0, *lat);
        map.add_node(&format!("m{row}"), 0.005, *lat);
        map.add_node(&format!("e{row}"), 0.01, *lat);
        map.add_arc(&format!("w{row}"), &format!("m{row}"));
        map.add_arc(&format!("m{row}"), &format!("e{row}"));
    }
    for column in ["w", "m", "e"] {
        map.add_arc(&format!("{column}0"), &format!("{column}1"));
        map.add_arc(&format!("{column}1"), &format!("{column}2"));
    }
    map
}

#[test]
fn test_boundary_zones_use_longitude_range() {
    // Four nodes bunched in the west and one far east: the quartile is taken
    // over the longitude range, so all four western nodes are entries
    let mut map = MapData::default();
    map.add_node("a", 0.0, 0.0);
    map.add_node("b", 1.0, 0.3);
    map.add_node("c", 2.0, 0.1);
    map.add_node("d", 2.4, 0.2);
    map.add_node("z", 10.0, 0.0);
    map.add_arc("a", "b");
    map.add_arc("b", "c");
    map.add_arc("c", "d");
    map.add_arc("d", "z");

    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();

    let west = keys(&graph, graph.entries(TravelDirection::LeftToRight));
    let east = keys(&graph, graph.entries(TravelDirection::RightToLeft));

    // North to south
    assert_eq!(west, vec!["b", "d", "c", "a"]);
    assert_eq!(east, vec!["z"]);
    assert_eq!(
        keys(&graph, graph.exits(TravelDirection::LeftToRight)),
        vec!["z"]
    );
}

#[test]
fn test_route_starts_at_start_and_ends_in_exit_set() {
    let map = create_ladder_map();
    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();

    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        for direction in [TravelDirection::LeftToRight, TravelDirection::RightToLeft] {
            for &start in graph.entries(direction) {
                let path = graph.find_route(start, direction, 0.001, &mut rng);

                assert!(path.len() >= 2, "Route from {:?} is too short", start);
                assert_eq!(path[0], start);
                let last = *path.last().unwrap();
                assert!(
                    graph.exits(direction).contains(&last),
                    "Route does not end in the exit set"
                );
                for pair in path.windows(2) {
                    assert!(
                        graph.neighbors(pair[0]).contains(&pair[1]),
                        "Route jumps between unconnected nodes"
                    );
                }
            }
        }
    }
}

#[test]
fn test_route_prefers_forward_roads() {
    // Both roads from `a` reach an exit, but the westward one is only tried
    // once the eastward one fails
    let mut map = MapData::default();
    map.add_node("a", 0.0, 0.0);
    map.add_node("ahead", 0.005, 0.0);
    map.add_node("exit", 0.01, 0.0);
    map.add_node("back", -0.003, 0.0);
    map.add_node("back_up", -0.003, 0.003);
    map.add_node("exit_up", 0.01, 0.003);
    map.add_arc("a", "ahead");
    map.add_arc("ahead", "exit");
    map.add_arc("a", "back");
    map.add_arc("back", "back_up");
    map.add_arc("back_up", "exit_up");

    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();
    let start = graph.node_by_key("a").unwrap();

    for seed in 0..10 {
        let mut rng = StdRng::seed_from_u64(seed);
        let path = graph.find_route(start, TravelDirection::LeftToRight, 0.0001, &mut rng);
        assert_eq!(keys(&graph, &path), vec!["a", "ahead", "exit"]);
    }
}

#[test]
fn test_route_detours_around_dead_end() {
    // The forward road from `a` is a dead end, so the route has to go back west
    let mut map = MapData::default();
    map.add_node("a", 0.0, 0.0);
    map.add_node("dead", 0.005, 0.0);
    map.add_node("up", -0.001, 0.002);
    map.add_node("over", 0.005, 0.002);
    map.add_node("exit", 0.01, 0.002);
    map.add_arc("a", "dead");
    map.add_arc("a", "up");
    map.add_arc("up", "over");
    map.add_arc("over", "exit");

    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let start = graph.node_by_key("a").unwrap();

    let path = graph.find_route(start, TravelDirection::LeftToRight, 0.0001, &mut rng);

    assert_eq!(keys(&graph, &path), vec!["a", "up", "over", "exit"]);
}

#[test]
fn test_isolated_node_routes_to_itself() {
    let mut map = create_ladder_map();
    map.add_node("lonely", 0.0, 0.005);

    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let lonely = graph.node_by_key("lonely").unwrap();

    let path = graph.find_route(lonely, TravelDirection::LeftToRight, 0.001, &mut rng);

    assert_eq!(path, vec![lonely]);
}

#[test]
fn test_arcs_with_unknown_nodes_are_skipped() {
    let mut map = create_ladder_map();
    map.add_arc("w0", "nowhere");

    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();

    assert_eq!(graph.node_count(), 9);
    assert_eq!(graph.arc_count(), 12);
}

#[test]
fn test_each_arc_gives_two_adjacency_entries() {
    let map = create_ladder_map();
    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();

    let total: usize = graph.nodes().map(|n| graph.degree(n)).sum();
    assert_eq!(total, 2 * graph.arc_count());

    let middle = graph.node_by_key("m1").unwrap();
    assert_eq!(graph.degree(middle), 4);
}

#[test]
fn test_intersections_detected_from_degree() {
    let map = MapData::demo_grid(3, 3, 26.0, 44.0, 0.001);
    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();

    let mut detected = keys(&graph, &graph.detect_intersections());
    detected.sort();

    assert_eq!(detected, vec!["n0_1", "n1_0", "n1_1", "n1_2", "n2_1"]);
}

#[test]
fn test_map_json_accepts_long_coordinate_names() {
    let json = r#"{
        "nodes": [
            {"id": "a", "lon": 26.1, "lat": 44.4},
            {"id": "b", "longitude": 26.2, "latitude": 44.5}
        ],
        "arcs": [{"from": "a", "to": "b", "type": "primary"}],
        "intersections": [],
        "centralAntenna": {"lon": 26.1, "lat": 44.4, "nodeId": "a"}
    }"#;

    let map = MapData::from_json_str(json).unwrap();

    assert_eq!(map.nodes.len(), 2);
    assert_eq!(map.nodes[1].lon, 26.2);
    assert_eq!(map.arcs[0].road_type, "primary");
    assert_eq!(
        map.central_antenna.and_then(|a| a.node_id).as_deref(),
        Some("a")
    );
}

#[test]
fn test_closest_node_lookup() {
    let map = create_ladder_map();
    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();

    let closest = graph
        .find_closest_node(&urban_traffic::simulation::Position::new(0.0049, 0.0011))
        .unwrap();

    assert_eq!(graph.key(closest), Some("m1"));
}

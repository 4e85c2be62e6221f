//! Pedestrian wandering and zebra crossing tests

use rand::rngs::StdRng;
use rand::SeedableRng;
use urban_traffic::config::{PedestrianConfig, PlannerConfig};
use urban_traffic::simulation::{
    crossing_probability, generate_crossings, CrossingState, MapData, Pedestrian, PedestrianId,
    Position, RoadGraph, SidewalkSide, SimId, ZebraCrossing,
};

/// One long east-west road with a single crossing at its midpoint
fn create_street() -> RoadGraph {
    let mut map = MapData::default();
    map.add_node("a", 0.0, 0.0);
    map.add_node("b", 0.01, 0.0);
    map.add_arc("a", "b");
    RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap()
}

/// A pedestrian standing exactly on the first crossing
fn pedestrian_at_crossing(
    id: usize,
    graph: &RoadGraph,
    crossing: &ZebraCrossing,
    config: &PedestrianConfig,
) -> Pedestrian {
    let a = graph.node_by_key("a").unwrap();
    let b = graph.node_by_key("b").unwrap();
    let mut pedestrian =
        Pedestrian::new(PedestrianId(SimId(id)), a, b, SidewalkSide::Right, graph, config).unwrap();
    pedestrian.position = crossing.position;
    pedestrian
}

#[test]
fn test_crossing_probability_is_rate_based() {
    assert_eq!(crossing_probability(0.0, 0.1), 0.0);
    assert_eq!(crossing_probability(0.6, 0.0), 0.0);

    let one_tick = crossing_probability(0.6, 0.1);
    assert!((one_tick - (1.0 - (-0.06f64).exp())).abs() < 1e-12);

    // Two half ticks give the same chance as one full tick
    let half = crossing_probability(0.6, 0.05);
    let combined = 1.0 - (1.0 - half) * (1.0 - half);
    assert!((combined - one_tick).abs() < 1e-12);
}

#[test]
fn test_crossings_generated_on_long_arcs_only() {
    let mut map = MapData::default();
    map.add_node("a", 0.0, 0.0);
    map.add_node("b", 0.01, 0.0);
    map.add_node("c", 0.0, 0.005);
    map.add_node("d", 0.0001, 0.005);
    // Parallel to a-b and close enough that its midpoint is too near
    map.add_node("e", 0.0, 0.0001);
    map.add_node("f", 0.01, 0.0001);
    map.add_arc("a", "b");
    map.add_arc("c", "d");
    map.add_arc("e", "f");

    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();
    let crossings = generate_crossings(&graph, &PedestrianConfig::default());

    assert_eq!(crossings.len(), 1);
    assert!((crossings[0].position.x - 0.005).abs() < 1e-12);
    assert!(crossings[0].occupied_by.is_none());
}

#[test]
fn test_mean_ticks_until_crossing_matches_probability() {
    let graph = create_street();
    let config = PedestrianConfig {
        walk_speed: 0.0,
        crossing_search_radius: 0.001,
        ..PedestrianConfig::default()
    };
    let delta = 0.1;
    let p = crossing_probability(config.crossing_rate, delta);
    let mut rng = StdRng::seed_from_u64(42);

    let trials = 2000;
    let mut total_ticks = 0u64;
    for trial in 0..trials {
        let mut crossings = generate_crossings(&graph, &config);
        let mut pedestrian = pedestrian_at_crossing(trial, &graph, &crossings[0], &config);

        let mut ticks = 0u64;
        while pedestrian.crossing_state == CrossingState::Walking {
            ticks += 1;
            pedestrian.update(delta, &graph, &mut crossings, &config, &mut rng);
            assert!(ticks < 10_000, "Pedestrian never started crossing");
        }
        total_ticks += ticks;
    }

    let mean = total_ticks as f64 / trials as f64;
    let expected = 1.0 / p;
    assert!(
        (mean - expected).abs() < expected * 0.1,
        "Mean {:.2} ticks, expected about {:.2}",
        mean,
        expected
    );
}

#[test]
fn test_crossing_holds_one_pedestrian() {
    let graph = create_street();
    let config = PedestrianConfig {
        walk_speed: 0.0,
        crossing_search_radius: 0.001,
        crossing_rate: 1.0e6,
        ..PedestrianConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(7);
    let mut crossings = generate_crossings(&graph, &config);
    let mut first = pedestrian_at_crossing(1, &graph, &crossings[0], &config);
    let mut second = pedestrian_at_crossing(2, &graph, &crossings[0], &config);

    for _ in 0..20 {
        first.update(0.1, &graph, &mut crossings, &config, &mut rng);
        second.update(0.1, &graph, &mut crossings, &config, &mut rng);

        let crossing_now = [&first, &second]
            .iter()
            .filter(|p| p.is_crossing())
            .count();
        assert!(crossing_now <= 1, "Two pedestrians share a crossing");
    }

    assert!(first.is_crossing());
    assert!(!second.is_crossing());
    assert_eq!(crossings[0].occupied_by, Some(first.id));
}

#[test]
fn test_occupy_and_release() {
    let graph = create_street();
    let mut crossings = generate_crossings(&graph, &PedestrianConfig::default());
    let crossing = &mut crossings[0];
    let a = PedestrianId(SimId(1));
    let b = PedestrianId(SimId(2));

    assert!(crossing.try_occupy(a));
    assert!(!crossing.try_occupy(b));

    // Only the holder can release
    crossing.release(b);
    assert_eq!(crossing.occupied_by, Some(a));
    crossing.release(a);
    assert!(crossing.try_occupy(b));
}

#[test]
fn test_finished_crossing_flips_side_and_cools_down() {
    let graph = create_street();
    let config = PedestrianConfig {
        walk_speed: 0.001,
        crossing_search_radius: 0.001,
        crossing_rate: 1.0e6,
        ..PedestrianConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(5);
    let mut crossings = generate_crossings(&graph, &config);
    let mut pedestrian = pedestrian_at_crossing(1, &graph, &crossings[0], &config);
    let start_side = pedestrian.sidewalk_side;

    // Tick 1 claims the crossing, tick 2 reaches the far sidewalk
    pedestrian.update(0.1, &graph, &mut crossings, &config, &mut rng);
    assert!(pedestrian.is_crossing());
    pedestrian.update(0.1, &graph, &mut crossings, &config, &mut rng);

    assert_eq!(pedestrian.crossing_state, CrossingState::Walking);
    assert_eq!(pedestrian.sidewalk_side, start_side.flipped());
    assert_eq!(pedestrian.crossing_cooldown, config.crossing_cooldown);
    assert!(crossings[0].occupied_by.is_none());

    // The far side of the road from where it started
    assert!(pedestrian.position.y > 0.0);

    // Still cooling down, so no new crossing despite the huge rate
    pedestrian.update(0.1, &graph, &mut crossings, &config, &mut rng);
    assert!(!pedestrian.is_crossing());
}

#[test]
fn test_pedestrian_wanders_to_neighbors() {
    let mut map = MapData::default();
    map.add_node("a", 0.0, 0.0);
    map.add_node("b", 0.0002, 0.0);
    map.add_node("c", 0.0002, 0.0002);
    map.add_arc("a", "b");
    map.add_arc("b", "c");
    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();
    let config = PedestrianConfig {
        walk_speed: 0.001,
        ..PedestrianConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(9);
    let mut crossings: Vec<ZebraCrossing> = Vec::new();

    let a = graph.node_by_key("a").unwrap();
    let b = graph.node_by_key("b").unwrap();
    let mut pedestrian =
        Pedestrian::new(PedestrianId(SimId(1)), a, b, SidewalkSide::Left, &graph, &config)
            .unwrap();

    let mut left_first_segment = false;
    for _ in 0..50 {
        pedestrian.update(0.1, &graph, &mut crossings, &config, &mut rng);
        assert!(graph.neighbors(pedestrian.from).contains(&pedestrian.to));
        left_first_segment |= pedestrian.from != a;
    }
    assert!(left_first_segment, "Pedestrian never left its first segment");
}

/// Shortest distance from `point` to any road centre line in `graph`
fn distance_to_roads(graph: &RoadGraph, point: &Position) -> f64 {
    graph
        .arcs()
        .filter_map(|(from, to)| Some((graph.position(from)?, graph.position(to)?)))
        .map(|(a, b)| {
            let (dx, dy) = (b.x - a.x, b.y - a.y);
            let t = (((point.x - a.x) * dx + (point.y - a.y) * dy) / (dx * dx + dy * dy))
                .clamp(0.0, 1.0);
            point.distance(&a.lerp(&b, t))
        })
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn test_walking_pedestrian_keeps_to_sidewalk_when_turning_back() {
    let mut map = MapData::default();
    map.add_node("a", 0.0, 0.0);
    map.add_node("b", 0.002, 0.0);
    map.add_arc("a", "b");
    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();
    let config = PedestrianConfig {
        walk_speed: 0.0002,
        crossing_rate: 0.0,
        ..PedestrianConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(3);
    let mut crossings = generate_crossings(&graph, &config);

    let a = graph.node_by_key("a").unwrap();
    let b = graph.node_by_key("b").unwrap();
    let mut pedestrian =
        Pedestrian::new(PedestrianId(SimId(1)), a, b, SidewalkSide::Right, &graph, &config)
            .unwrap();

    let mut turned_back = 0;
    for tick in 0..5000 {
        let from = pedestrian.from;
        pedestrian.update(0.1, &graph, &mut crossings, &config, &mut rng);
        turned_back += usize::from(pedestrian.from != from);

        assert_eq!(pedestrian.crossing_state, CrossingState::Walking);
        assert!(
            (pedestrian.position.y.abs() - config.sidewalk_offset).abs() < 1e-9,
            "Tick {}: pedestrian {:e} from the centre line, sidewalk is at {:e}",
            tick,
            pedestrian.position.y.abs(),
            config.sidewalk_offset
        );
    }

    // Stayed on the south kerb through every turn
    assert!(pedestrian.position.y < 0.0, "Pedestrian changed kerb without crossing");
    assert!(turned_back > 10, "Pedestrian only turned back {} times", turned_back);
}

#[test]
fn test_walking_pedestrian_rounds_corners_on_sidewalk() {
    let mut map = MapData::default();
    map.add_node("a", 0.0, 0.0);
    map.add_node("b", 0.002, 0.0);
    map.add_node("c", 0.002, 0.002);
    map.add_arc("a", "b");
    map.add_arc("b", "c");
    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();
    let config = PedestrianConfig {
        walk_speed: 0.0002,
        crossing_rate: 0.0,
        ..PedestrianConfig::default()
    };
    let a = graph.node_by_key("a").unwrap();
    let b = graph.node_by_key("b").unwrap();

    for (seed, side) in [(11, SidewalkSide::Left), (12, SidewalkSide::Right)] {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut crossings = generate_crossings(&graph, &config);
        let mut pedestrian =
            Pedestrian::new(PedestrianId(SimId(1)), a, b, side, &graph, &config).unwrap();

        let mut reached_c = false;
        for tick in 0..3000 {
            pedestrian.update(0.1, &graph, &mut crossings, &config, &mut rng);
            reached_c |= pedestrian.from == graph.node_by_key("c").unwrap();

            let clearance = distance_to_roads(&graph, &pedestrian.position);
            assert!(
                clearance > config.sidewalk_offset * 0.99,
                "{:?} side, tick {}: pedestrian {:e} from a road centre line",
                side,
                tick,
                clearance
            );
        }
        assert!(reached_c, "{:?} side pedestrian never walked round the corner", side);
    }
}

#[test]
fn test_sidewalk_walker_reaches_crossing_with_default_radius() {
    let graph = create_street();
    let config = PedestrianConfig {
        crossing_rate: 5.0,
        ..PedestrianConfig::default()
    };
    let defaults = PedestrianConfig::default();
    assert_eq!(config.crossing_search_radius, defaults.crossing_search_radius);
    assert_eq!(config.sidewalk_offset, defaults.sidewalk_offset);

    let mut rng = StdRng::seed_from_u64(21);
    let mut crossings = generate_crossings(&graph, &config);
    let a = graph.node_by_key("a").unwrap();
    let b = graph.node_by_key("b").unwrap();
    let mut pedestrian =
        Pedestrian::new(PedestrianId(SimId(1)), a, b, SidewalkSide::Right, &graph, &config)
            .unwrap();

    // Walking from a, the crossing at the midpoint is reached after about 3,300 ticks
    let mut started_from = None;
    for _ in 0..5000 {
        let before = pedestrian.position;
        pedestrian.update(0.1, &graph, &mut crossings, &config, &mut rng);
        if pedestrian.is_crossing() {
            started_from = Some(before);
            break;
        }
    }

    let start = started_from.expect("Pedestrian walked past the crossing without using it");
    assert!(
        (start.y.abs() - config.sidewalk_offset).abs() < 1e-9,
        "Crossing started {:e} from the centre line instead of from the sidewalk",
        start.y.abs()
    );
    assert_eq!(crossings[0].occupied_by, Some(pedestrian.id));
}

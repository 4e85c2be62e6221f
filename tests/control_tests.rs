//! External control adapter tests: payloads, congestion analysis, the
//! request/reply link and the background worker

use std::time::Duration;
use urban_traffic::config::{ControlConfig, LightConfig, PlannerConfig};
use urban_traffic::control::{
    analyze_congestion, build_prompt, extract_json_object, local_decisions, parse_ai_decision,
    spawn_control_worker, CollisionTickResponse, ControlClient, ControlError, ControlLink,
    ControlReply, ControlRequest, DirectiveAction, IntersectionCongestion, OptimizationResponse,
    PhaseAction, VehiclePositionReport,
};
use urban_traffic::simulation::{
    IntersectionId, MapData, PhaseOverride, Position, RoadGraph, SimId, TrafficLightController,
    TravelDirection, VehicleId, VehicleKind, VehicleView,
};

fn create_plus_controller() -> TrafficLightController {
    let mut map = MapData::default();
    map.add_node("c", 0.0, 0.0);
    map.add_node("n", 0.0, 0.001);
    map.add_node("s", 0.0, -0.001);
    map.add_node("e", 0.001, 0.0);
    map.add_node("w", -0.001, 0.0);
    for arm in ["n", "s", "e", "w"] {
        map.add_arc("c", arm);
    }
    let graph = RoadGraph::from_map(&map, &PlannerConfig::default()).unwrap();
    let mut controller = TrafficLightController::new(&LightConfig::default());
    let node = graph.node_by_key("c").unwrap();
    controller.signalize(IntersectionId("c".to_string()), node, &graph, 0.0);
    controller
}

fn approaching(id: usize, kind: VehicleKind, x: f64, y: f64, heading: f64) -> VehicleView {
    let position = Position::new(x, y);
    VehicleView {
        id: VehicleId(SimId(id)),
        kind,
        direction: TravelDirection::LeftToRight,
        position,
        heading,
        target_heading: heading,
        base_speed: 0.00015,
        next_waypoint: Position::new(0.0, 0.0),
        command: None,
    }
}

#[test]
fn test_parse_ai_decision() {
    let text = r#"[
        {"vehicleId": "car-3", "actiune": "OPRESTE", "vitezaTintaKmH": 0, "motiv": "imminent collision"},
        {"vehicleId": "car-4", "actiune": "INCETINESTE", "vitezaTintaKmH": 20},
        {"vehicleId": "car-5", "actiune": "ACCELEREAZA"}
    ]"#;

    let directives = parse_ai_decision(text).unwrap();

    assert_eq!(directives.len(), 3);
    assert_eq!(directives[0].action, DirectiveAction::Stop);
    assert_eq!(directives[0].reason.as_deref(), Some("imminent collision"));
    assert_eq!(directives[1].action, DirectiveAction::Slow);
    assert_eq!(directives[1].target_speed_kmh, Some(20.0));
    assert_eq!(directives[2].action, DirectiveAction::Accelerate);
    assert_eq!(directives[2].target_speed_kmh, None);
}

#[test]
fn test_unparsable_ai_decision_is_a_parse_error() {
    let err = parse_ai_decision("stop both cars now").unwrap_err();
    assert!(matches!(err, ControlError::Parse(_)));
    assert!(!err.is_transport());

    let err = parse_ai_decision(r#"[{"vehicleId": "car-1", "actiune": "ZBOARA"}]"#).unwrap_err();
    assert!(matches!(err, ControlError::Parse(_)));
}

#[test]
fn test_collision_tick_response_shape() {
    let json = r#"{
        "collisionPredicted": true,
        "collisionInfo": {"timeToCollision": 1.8, "vehicle1Id": "car-1", "vehicle2Id": "car-2"},
        "aiDecision": "[]",
        "status": "COLLISION_DETECTED"
    }"#;
    let response: CollisionTickResponse = serde_json::from_str(json).unwrap();

    assert!(response.collision_predicted);
    let info = response.collision_info.unwrap();
    assert_eq!(info.vehicle2_id, "car-2");
    assert_eq!(info.time_to_collision, 1.8);

    // A quiet tick carries only the flag
    let quiet: CollisionTickResponse =
        serde_json::from_str(r#"{"collisionPredicted": false}"#).unwrap();
    assert!(!quiet.collision_predicted);
    assert!(quiet.ai_decision.is_none());
}

#[test]
fn test_position_report_wire_names() {
    let report = VehiclePositionReport {
        id: "car-7".to_string(),
        x: 26.1,
        y: 44.4,
        speed_kmh: 42.5,
        heading: 1.5,
    };
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["id"], "car-7");
    assert_eq!(value["speedKmH"], 42.5);
    assert!(value.get("speed_kmh").is_none());
}

#[test]
fn test_optimization_response_from_model_text() {
    let text = "Sure! Here is my plan:\n{\"decisions\": [{\"intersectionId\": \"c\", \
                \"action\": \"PRIORITIZE_PHASE_1\", \"reason\": \"queue\"}], \
                \"thinking\": \"phase 1 is longer\"}\nHope this helps.";

    let response = OptimizationResponse::from_model_text(text).unwrap();

    assert_eq!(response.decisions.len(), 1);
    assert_eq!(response.decisions[0].intersection_id, IntersectionId("c".to_string()));
    assert_eq!(response.decisions[0].action, PhaseAction::PrioritizePhase1);
    assert_eq!(response.thinking.as_deref(), Some("phase 1 is longer"));

    assert!(OptimizationResponse::from_model_text("no json here").is_err());
    assert_eq!(extract_json_object("a {b} c"), Some("{b}"));
    assert_eq!(extract_json_object("} backwards {"), None);
}

#[test]
fn test_phase_actions() {
    assert_eq!(PhaseAction::prioritize(0), PhaseAction::PrioritizePhase0);
    assert_eq!(PhaseAction::prioritize(1), PhaseAction::PrioritizePhase1);
    assert_eq!(PhaseAction::PrioritizePhase1.priority_phase(), Some(1));
    assert_eq!(PhaseAction::KeepCurrent.priority_phase(), None);
}

#[test]
fn test_congestion_metrics() {
    let config = ControlConfig::default();
    let id = IntersectionId("c".to_string());

    let busy = IntersectionCongestion::from_counts(id.clone(), 6, 1, &config);
    assert_eq!(busy.total_vehicles, 7);
    assert_eq!(busy.congestion_score, 100);
    assert_eq!(busy.dominant_phase, 0);
    assert!(busy.needs_optimization);

    let quiet = IntersectionCongestion::from_counts(id.clone(), 1, 1, &config);
    assert_eq!(quiet.congestion_score, 30);
    assert!(!quiet.needs_optimization);

    let tied = IntersectionCongestion::from_counts(id, 2, 2, &config);
    assert_eq!(tied.dominant_phase, 0);
    assert!(tied.needs_optimization);
}

#[test]
fn test_analysis_counts_approaching_vehicles_per_phase() {
    let controller = create_plus_controller();
    let config = ControlConfig::default();

    let vehicles = vec![
        // Northbound from the south arm
        approaching(1, VehicleKind::Normal, 0.00003, -0.0002, std::f64::consts::FRAC_PI_2),
        approaching(2, VehicleKind::Normal, 0.00003, -0.0003, std::f64::consts::FRAC_PI_2),
        // Eastbound from the west arm
        approaching(3, VehicleKind::Normal, -0.0002, -0.00003, 0.0),
        // Ambulances are not counted
        approaching(4, VehicleKind::Ambulance, 0.00003, -0.00025, std::f64::consts::FRAC_PI_2),
        // Driving away from the intersection
        approaching(5, VehicleKind::Normal, 0.00003, 0.0002, std::f64::consts::FRAC_PI_2),
        // Outside the detection radius
        approaching(6, VehicleKind::Normal, 0.00003, -0.0009, std::f64::consts::FRAC_PI_2),
    ];

    let analysis = analyze_congestion(&vehicles, &controller, &config);

    assert_eq!(analysis.len(), 1);
    // South-north approaches are phase 0 on this junction
    assert_eq!(analysis[0].phase0_count, 2);
    assert_eq!(analysis[0].phase1_count, 1);
}

#[test]
fn test_local_heuristic_prioritizes_dominant_phase() {
    let controller = create_plus_controller();
    let config = ControlConfig::default();
    let id = IntersectionId("c".to_string());

    let analysis = vec![IntersectionCongestion::from_counts(id.clone(), 6, 1, &config)];
    let decisions = local_decisions(&analysis, &controller, 0.0, &config);

    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].intersection_id, id);
    assert_eq!(decisions[0].action, PhaseAction::PrioritizePhase0);

    let analysis = vec![IntersectionCongestion::from_counts(id.clone(), 1, 5, &config)];
    let decisions = local_decisions(&analysis, &controller, 0.0, &config);
    assert_eq!(decisions[0].action, PhaseAction::PrioritizePhase1);
}

#[test]
fn test_local_heuristic_skips_balanced_or_overridden() {
    let mut controller = create_plus_controller();
    let config = ControlConfig::default();
    let id = IntersectionId("c".to_string());

    // Busy but balanced
    let balanced = vec![IntersectionCongestion::from_counts(id.clone(), 3, 2, &config)];
    assert!(local_decisions(&balanced, &controller, 0.0, &config).is_empty());

    controller.apply_override(PhaseOverride {
        intersection_id: id.clone(),
        priority_phase: 1,
        expires_at: 10.0,
    });
    let skewed = vec![IntersectionCongestion::from_counts(id, 6, 1, &config)];
    assert!(local_decisions(&skewed, &controller, 5.0, &config).is_empty());
    assert_eq!(local_decisions(&skewed, &controller, 10.0, &config).len(), 1);
}

#[test]
fn test_prompt_describes_each_intersection() {
    let config = ControlConfig::default();
    let analysis = vec![
        IntersectionCongestion::from_counts(IntersectionId("north".to_string()), 6, 1, &config),
        IntersectionCongestion::from_counts(IntersectionId("south".to_string()), 0, 1, &config),
    ];

    let prompt = build_prompt(&analysis).unwrap();

    assert!(prompt.contains("Intersection north"));
    assert!(prompt.contains("Phase 0: 6 vehicles"));
    assert!(prompt.contains("Intersection south"));
    assert!(prompt.contains("PRIORITIZE_PHASE_0"));
    assert!(build_prompt(&[]).is_none());
}

#[test]
fn test_link_in_flight_guard() {
    let (mut link, mut endpoint) = ControlLink::pair();

    let request = || ControlRequest::Optimization {
        prompt: "traffic".to_string(),
    };
    assert!(link.submit(request()).unwrap());
    assert!(!link.submit(request()).unwrap(), "Second request should wait");
    assert!(link.optimization_in_flight());

    // The collision loop has its own guard
    assert!(link
        .submit(ControlRequest::CollisionPoll { vehicles: Vec::new() })
        .unwrap());

    assert!(matches!(
        endpoint.requests.try_recv(),
        Ok(ControlRequest::Optimization { .. })
    ));
    assert!(matches!(
        endpoint.requests.try_recv(),
        Ok(ControlRequest::CollisionPoll { .. })
    ));
    assert!(endpoint.requests.try_recv().is_err());

    endpoint
        .replies
        .send(ControlReply::Optimization(Err(ControlError::Status(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
        ))))
        .unwrap();

    let replies = link.drain();
    assert_eq!(replies.len(), 1);
    assert!(!link.optimization_in_flight());
    assert!(link.collision_in_flight());
    assert!(link.submit(request()).unwrap());
}

#[test]
fn test_link_reports_disconnected_worker() {
    let (mut link, endpoint) = ControlLink::pair();
    drop(endpoint);

    let err = link
        .submit(ControlRequest::Optimization {
            prompt: "traffic".to_string(),
        })
        .unwrap_err();

    assert!(matches!(err, ControlError::Disconnected));
    assert!(err.is_transport());
    assert!(!link.optimization_in_flight());
    assert!(link.drain().is_empty());
}

#[tokio::test]
async fn test_worker_shuts_down_promptly() {
    let client = ControlClient::new(&ControlConfig::default()).unwrap();
    let (_link, endpoint) = ControlLink::pair();
    let worker = spawn_control_worker(client, endpoint);

    tokio::time::timeout(Duration::from_secs(5), worker.shutdown())
        .await
        .expect("Worker did not stop after shutdown");
}

#[tokio::test]
async fn test_worker_reports_unreachable_service() {
    let config = ControlConfig {
        collision_timeout_secs: 2,
        ..ControlConfig::default().with_base_url("http://127.0.0.1:9")
    };
    let client = ControlClient::new(&config).unwrap();
    let (mut link, endpoint) = ControlLink::pair();
    let worker = spawn_control_worker(client, endpoint);

    link.submit(ControlRequest::CollisionPoll {
        vehicles: vec![VehiclePositionReport {
            id: "car-1".to_string(),
            x: 0.0,
            y: 0.0,
            speed_kmh: 30.0,
            heading: 0.0,
        }],
    })
    .unwrap();

    let mut reply = None;
    for _ in 0..100 {
        if let Some(r) = link.drain().into_iter().next() {
            reply = Some(r);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    match reply {
        Some(ControlReply::Collision(Err(err))) => assert!(err.is_transport(), "{}", err),
        other => panic!("Expected a failed collision reply, got {:?}", other),
    }
    assert!(!link.collision_in_flight());

    worker.shutdown().await;
}

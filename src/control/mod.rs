//! External control adapter: collision predictor and signal optimization

pub mod analysis;
pub mod client;
pub mod error;
pub mod link;
pub mod protocol;
pub mod worker;

pub use analysis::{analyze_congestion, build_prompt, local_decisions, IntersectionCongestion};
pub use client::ControlClient;
pub use error::ControlError;
pub use link::{ControlEndpoint, ControlLink, ControlReply, ControlRequest};
pub use protocol::{
    extract_json_object, parse_ai_decision, CollisionInfo, CollisionTickResponse,
    DirectiveAction, OptimizationResponse, PhaseAction, PhaseDecision, VehicleDirective,
    VehiclePositionReport,
};
pub use worker::{spawn_control_worker, ControlWorker};

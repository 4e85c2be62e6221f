//! JSON payloads exchanged with the remote services

use serde::{Deserialize, Serialize};

use super::error::ControlError;
use crate::simulation::IntersectionId;

/// One entry of the periodic vehicle-position push
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehiclePositionReport {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "speedKmH")]
    pub speed_kmh: f64,
    pub heading: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CollisionInfo {
    #[serde(rename = "timeToCollision", default)]
    pub time_to_collision: f64,
    #[serde(rename = "vehicle1Id")]
    pub vehicle1_id: String,
    #[serde(rename = "vehicle2Id")]
    pub vehicle2_id: String,
}

/// Reply of the collision-prediction tick
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionTickResponse {
    #[serde(default)]
    pub collision_predicted: bool,
    #[serde(default)]
    pub collision_info: Option<CollisionInfo>,
    /// JSON array of [`VehicleDirective`], encoded as a string
    #[serde(default)]
    pub ai_decision: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DirectiveAction {
    #[serde(rename = "OPRESTE")]
    Stop,
    #[serde(rename = "INCETINESTE")]
    Slow,
    #[serde(rename = "ACCELEREAZA")]
    Accelerate,
}

/// Per-vehicle recommendation inside `aiDecision`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VehicleDirective {
    #[serde(rename = "vehicleId")]
    pub vehicle_id: String,
    #[serde(rename = "actiune")]
    pub action: DirectiveAction,
    #[serde(rename = "vitezaTintaKmH", default)]
    pub target_speed_kmh: Option<f64>,
    #[serde(rename = "motiv", default)]
    pub reason: Option<String>,
}

/// Decode the string-encoded directive list
pub fn parse_ai_decision(text: &str) -> Result<Vec<VehicleDirective>, ControlError> {
    serde_json::from_str(text.trim()).map_err(ControlError::from)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseAction {
    #[serde(rename = "PRIORITIZE_PHASE_0")]
    PrioritizePhase0,
    #[serde(rename = "PRIORITIZE_PHASE_1")]
    PrioritizePhase1,
    #[serde(rename = "KEEP_CURRENT")]
    KeepCurrent,
}

impl PhaseAction {
    pub fn prioritize(phase: u8) -> Self {
        if phase == 0 {
            PhaseAction::PrioritizePhase0
        } else {
            PhaseAction::PrioritizePhase1
        }
    }

    /// Phase to force green, if any
    pub fn priority_phase(self) -> Option<u8> {
        match self {
            PhaseAction::PrioritizePhase0 => Some(0),
            PhaseAction::PrioritizePhase1 => Some(1),
            PhaseAction::KeepCurrent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDecision {
    pub intersection_id: IntersectionId,
    pub action: PhaseAction,
    #[serde(default)]
    pub reason: String,
}

/// Reply of the traffic-optimization service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OptimizationResponse {
    #[serde(default)]
    pub decisions: Vec<PhaseDecision>,
    #[serde(default)]
    pub thinking: Option<String>,
}

impl OptimizationResponse {
    /// Parse model output that embeds a JSON object in free text
    pub fn from_model_text(text: &str) -> Result<Self, ControlError> {
        let json = extract_json_object(text)
            .ok_or_else(|| ControlError::Parse("no JSON object in model output".to_string()))?;
        serde_json::from_str(json).map_err(ControlError::from)
    }
}

/// The span from the first `{` to the last `}`
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

/// Body sent to the AI proxy's generate endpoint
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
}

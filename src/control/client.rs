use log::debug;
use reqwest::{Client, Response};
use std::time::{Duration, Instant};

use super::error::ControlError;
use super::link::{ControlReply, ControlRequest};
use super::protocol::{
    CollisionTickResponse, GenerateOptions, GenerateRequest, GenerateResponse,
    OptimizationResponse, VehiclePositionReport,
};
use crate::config::ControlConfig;

const PUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Thin HTTP client for the collision predictor and the AI proxy.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: Client,
    antenna_url: String,
    ai_url: String,
    model: String,
    collision_timeout: Duration,
    optimization_timeout: Duration,
}

impl ControlClient {
    pub fn new(config: &ControlConfig) -> Result<Self, ControlError> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            antenna_url: config.antenna_url.trim_end_matches('/').to_string(),
            ai_url: config.ai_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            collision_timeout: Duration::from_secs(config.collision_timeout_secs),
            optimization_timeout: Duration::from_secs(config.optimization_timeout_secs),
        })
    }

    /// Run one request to completion and wrap the outcome as a reply
    pub async fn handle(&self, request: ControlRequest) -> ControlReply {
        match request {
            ControlRequest::CollisionPoll { vehicles } => {
                let result = match self.push_vehicles(&vehicles).await {
                    Ok(()) => self.collision_tick().await,
                    Err(err) => Err(err),
                };
                ControlReply::Collision(result)
            }
            ControlRequest::Optimization { prompt } => {
                ControlReply::Optimization(self.request_phase_decisions(&prompt).await)
            }
        }
    }

    /// Send the current vehicle positions to the predictor
    pub async fn push_vehicles(&self, vehicles: &[VehiclePositionReport]) -> Result<(), ControlError> {
        let response = self
            .http
            .post(format!("{}/update-vehicles", self.antenna_url))
            .timeout(PUSH_TIMEOUT)
            .json(vehicles)
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    /// Ask the predictor for a verdict; may block for seconds when it sees a collision
    pub async fn collision_tick(&self) -> Result<CollisionTickResponse, ControlError> {
        let started = Instant::now();
        let response = self
            .http
            .get(format!("{}/tick", self.antenna_url))
            .timeout(self.collision_timeout)
            .send()
            .await?;
        let parsed: CollisionTickResponse = check_status(response)?
            .json()
            .await
            .map_err(ControlError::Json)?;
        debug!("Collision tick answered in {:?}", started.elapsed());
        Ok(parsed)
    }

    /// Ask the AI proxy which phase to prioritize at each intersection
    pub async fn request_phase_decisions(&self, prompt: &str) -> Result<OptimizationResponse, ControlError> {
        let started = Instant::now();
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                num_predict: 500,
            },
        };
        let response = self
            .http
            .post(format!("{}/generate", self.ai_url))
            .timeout(self.optimization_timeout)
            .json(&body)
            .send()
            .await?;
        let generated: GenerateResponse = check_status(response)?
            .json()
            .await
            .map_err(ControlError::Json)?;
        debug!("Optimization answered in {:?}", started.elapsed());
        OptimizationResponse::from_model_text(&generated.response)
    }
}

fn check_status(response: Response) -> Result<Response, ControlError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ControlError::Status(status))
    }
}

//! Channel pair between the simulation and the control worker
//!
//! The simulation side never awaits: it sends a request when a poll is due
//! and drains replies at the start of the next tick. One in-flight flag per
//! integration keeps a slow endpoint from accumulating requests.

use log::warn;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use super::error::ControlError;
use super::protocol::{CollisionTickResponse, OptimizationResponse, VehiclePositionReport};

#[derive(Debug, Clone)]
pub enum ControlRequest {
    /// Push positions, then ask the collision predictor for a verdict
    CollisionPoll { vehicles: Vec<VehiclePositionReport> },
    /// Ask the optimization service for phase decisions
    Optimization { prompt: String },
}

#[derive(Debug)]
pub enum ControlReply {
    Collision(Result<CollisionTickResponse, ControlError>),
    Optimization(Result<OptimizationResponse, ControlError>),
}

/// The worker's half of the link
#[derive(Debug)]
pub struct ControlEndpoint {
    pub requests: UnboundedReceiver<ControlRequest>,
    pub replies: UnboundedSender<ControlReply>,
}

/// The simulation's half of the link
#[derive(Debug)]
pub struct ControlLink {
    requests: UnboundedSender<ControlRequest>,
    replies: UnboundedReceiver<ControlReply>,
    collision_in_flight: bool,
    optimization_in_flight: bool,
}

impl ControlLink {
    pub fn pair() -> (ControlLink, ControlEndpoint) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        (
            ControlLink {
                requests: request_tx,
                replies: reply_rx,
                collision_in_flight: false,
                optimization_in_flight: false,
            },
            ControlEndpoint {
                requests: request_rx,
                replies: reply_tx,
            },
        )
    }

    pub fn collision_in_flight(&self) -> bool {
        self.collision_in_flight
    }

    pub fn optimization_in_flight(&self) -> bool {
        self.optimization_in_flight
    }

    /// Queue a request unless the same integration is still waiting
    ///
    /// `Ok(false)` means the request was skipped by the in-flight guard.
    pub fn submit(&mut self, request: ControlRequest) -> Result<bool, ControlError> {
        let flag = match &request {
            ControlRequest::CollisionPoll { .. } => &mut self.collision_in_flight,
            ControlRequest::Optimization { .. } => &mut self.optimization_in_flight,
        };
        if *flag {
            return Ok(false);
        }
        self.requests
            .send(request)
            .map_err(|_| ControlError::Disconnected)?;
        *flag = true;
        Ok(true)
    }

    /// Collect every reply that arrived since the last call
    pub fn drain(&mut self) -> Vec<ControlReply> {
        let mut replies = Vec::new();
        loop {
            match self.replies.try_recv() {
                Ok(reply) => {
                    match &reply {
                        ControlReply::Collision(_) => self.collision_in_flight = false,
                        ControlReply::Optimization(_) => self.optimization_in_flight = false,
                    }
                    replies.push(reply);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.collision_in_flight || self.optimization_in_flight {
                        warn!("Control worker disconnected with requests in flight");
                    }
                    self.collision_in_flight = false;
                    self.optimization_in_flight = false;
                    break;
                }
            }
        }
        replies
    }
}

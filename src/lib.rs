//! Urban traffic micro-simulation
//!
//! Vehicles, ambulances and pedestrians on a road graph with timed traffic
//! lights, optionally steered by remote collision-prediction and
//! signal-optimization services.

pub mod config;
pub mod control;
pub mod simulation;

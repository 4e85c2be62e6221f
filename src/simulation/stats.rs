/// Running totals for one simulation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub vehicles_spawned: u32,
    pub vehicles_completed: u32,
    pub ambulances_spawned: u32,
    pub pedestrians_spawned: u32,
    pub pedestrians_despawned: u32,
    pub crossings_started: u32,
    /// Vehicle commands installed from collision-prediction replies
    pub commands_applied: u32,
    pub ai_overrides: u32,
    pub local_overrides: u32,
    /// Remote calls that failed or returned something unusable
    pub remote_failures: u32,
    /// The subset of `remote_failures` where the service was never reached
    pub unreachable_calls: u32,
}

impl SimulationStats {
    /// Share of spawned vehicles that reached their exit, in percent
    pub fn completion_rate(&self) -> f64 {
        if self.vehicles_spawned > 0 {
            self.vehicles_completed as f64 / self.vehicles_spawned as f64 * 100.0
        } else {
            0.0
        }
    }
}

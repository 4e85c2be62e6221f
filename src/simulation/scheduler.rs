//! Named periodic tasks on the simulation's logical clock
//!
//! The world owns one scheduler and asks it which tasks are due after each
//! clock advance, so spawn timers and polling cadence are stepped
//! deterministically with the simulation instead of wall-clock timers.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    SpawnEastbound,
    SpawnWestbound,
    SpawnAmbulance,
    SpawnPedestrian,
    CollisionPoll,
    TrafficOptimization,
}

#[derive(Debug, Clone)]
struct PeriodicTask {
    kind: TaskKind,
    period: f64,
    next_due: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    tasks: Vec<PeriodicTask>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a task first due at `first_due`
    ///
    /// Non-positive periods are ignored, which disables the task.
    pub fn every(&mut self, kind: TaskKind, period: f64, first_due: f64) {
        self.cancel(kind);
        if period > 0.0 {
            self.tasks.push(PeriodicTask {
                kind,
                period,
                next_due: first_due,
            });
        }
    }

    pub fn cancel(&mut self, kind: TaskKind) {
        self.tasks.retain(|t| t.kind != kind);
    }

    pub fn is_scheduled(&self, kind: TaskKind) -> bool {
        self.tasks.iter().any(|t| t.kind == kind)
    }

    /// Tasks due at `now`, in registration order
    ///
    /// A task fires at most once per call; periods missed during a long
    /// step are skipped rather than replayed.
    pub fn due(&mut self, now: f64) -> Vec<TaskKind> {
        let mut fired = Vec::new();
        for task in &mut self.tasks {
            if now >= task.next_due {
                fired.push(task.kind);
                let missed = ((now - task.next_due) / task.period).floor() + 1.0;
                task.next_due += missed * task.period;
            }
        }
        fired
    }
}

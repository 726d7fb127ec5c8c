//! Spawn pacing: the run state, the shrinking interval and the spawn loop.
//!
//! Each `start()` opens a new generation. The loop task carries the
//! generation it was started with and checks it, under the engine lock, at
//! every iteration; `stop()` closes the generation so a loop that wakes up
//! after it never spawns again.

use super::queue::{BlockQueue, QueueError};
use crate::models::level::FallingSpeed;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running { generation: u64 },
}

/// Why a spawn attempt did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnRefusal {
    NotRunning,
    AtCapacity,
    /// The newest block is still too close to the spawn origin.
    NotEnoughClearance,
    /// The queue refused the new block.
    Queue(QueueError),
}

#[derive(Debug, Clone)]
pub struct SpawnScheduler {
    state: SchedulerState,
    last_generation: u64,
    interval: Duration,
    decrement: Duration,
    floor: Duration,
    spawned: u64,
}

impl SpawnScheduler {
    pub fn new(speed: FallingSpeed, floor: Duration) -> Self {
        Self {
            state: SchedulerState::Idle,
            last_generation: 0,
            interval: speed.initial().max(floor),
            decrement: speed.decrement(),
            floor,
            spawned: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SchedulerState::Running { .. })
    }

    /// Opens a new generation. `None` when already running.
    pub fn start(&mut self) -> Option<u64> {
        if self.is_running() {
            return None;
        }
        self.last_generation += 1;
        self.state = SchedulerState::Running {
            generation: self.last_generation,
        };
        Some(self.last_generation)
    }

    /// Returns to idle. `false` when already idle.
    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state = SchedulerState::Idle;
        true
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.state == SchedulerState::Running { generation }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Checks the spawn guards against the current queue.
    pub fn check_guards(
        &self,
        queue: &BlockQueue,
        min_clearance: f32,
        now: Instant,
    ) -> Result<(), SpawnRefusal> {
        if !self.is_running() {
            return Err(SpawnRefusal::NotRunning);
        }
        if queue.is_full() {
            return Err(SpawnRefusal::AtCapacity);
        }
        match queue.newest_clearance(now) {
            Some(clearance) if clearance < min_clearance => Err(SpawnRefusal::NotEnoughClearance),
            _ => Ok(()),
        }
    }

    /// Accounts for a successful spawn and shrinks the interval.
    pub fn record_spawn(&mut self) -> Duration {
        self.spawned += 1;
        self.interval = self.interval.saturating_sub(self.decrement).max(self.floor);
        self.interval
    }
}

/// One iteration of the spawn loop, run under the engine lock.
pub trait SpawnCycle: Send + Sync + 'static {
    /// Attempts a spawn for `generation`.
    ///
    /// Returns the wait before the next attempt, or `None` once the
    /// generation is no longer current.
    fn spawn_cycle(&self, generation: u64) -> Option<Duration>;
}

pub async fn run_spawn_loop<T: SpawnCycle>(target: Arc<T>, generation: u64, initial_delay: Duration) {
    tokio::time::sleep(initial_delay).await;
    while let Some(wait) = target.spawn_cycle(generation) {
        tokio::time::sleep(wait).await;
    }
    log::debug!("SPAWN: Loop for generation {} finished", generation);
}

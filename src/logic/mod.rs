//! Engine logic and the headless session loop.
//!
//! `run_session` is what drives an engine when no game frontend is around:
//! it feeds queued input events to the engine at a fixed tick rate, ticks
//! holds and changing notes, and plays the scoring side by draining engine
//! events into a [`SessionSummary`].

pub mod engine;
pub mod factory;
pub mod progress;
pub mod queue;
pub mod removal;
pub mod scheduler;

use crate::system::bus::EngineEvent;
use engine::BlocksEngine;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Target ticks per second of the session loop.
const TPS: u64 = 60;

/// What happened during one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub spawned: u32,
    pub completed: u32,
    pub removed: u32,
    pub resets: u32,
    pub timeouts: u32,
    pub danger_warnings: u32,
}

impl SessionSummary {
    fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::BlockSpawned { .. } => self.spawned += 1,
            EngineEvent::BlockCompleted { .. } => self.completed += 1,
            EngineEvent::BlockRemoved { .. } => self.removed += 1,
            EngineEvent::ProgressReset { .. } => self.resets += 1,
            EngineEvent::ProcessingTimedOut => self.timeouts += 1,
            EngineEvent::DangerLimitReached => self.danger_warnings += 1,
            EngineEvent::BlockProgress { .. } => {}
        }
    }
}

/// Runs `engine` for `length`, then stops and clears it.
pub async fn run_session(engine: BlocksEngine, length: Duration) -> SessionSummary {
    let bus = engine.bus().clone();
    let mut summary = SessionSummary::default();
    let deadline = Instant::now() + length;

    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / TPS as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    engine.start();
    log::info!("SESSION: Started for {:?}", length);

    loop {
        let now = ticker.tick().await;
        if now >= deadline {
            break;
        }

        // 1. Input events
        while let Ok(event) = bus.input_rx.try_recv() {
            engine.handle_input(event);
        }

        // 2. Time-driven updates
        engine.tick(now);

        // 3. Scoring side
        for event in bus.event_rx.try_iter() {
            log::debug!("SESSION: {:?}", event);
            summary.record(&event);
        }
    }

    engine.stop();
    engine.clear();
    for event in bus.event_rx.try_iter() {
        summary.record(&event);
    }

    log::info!(
        "SESSION: Over: {} spawned, {} completed, {} danger warnings",
        summary.spawned,
        summary.completed,
        summary.danger_warnings
    );
    summary
}

//! The note blocks engine: queue, scheduler and progress behind one lock.
//!
//! Every mutation of the queue, the scheduler state or the processing flag
//! happens while holding `Shared::state`. Deferred work (the spawn loop,
//! removal races and the processing guard) runs as tokio tasks on the
//! runtime handed to [`BlocksEngine::new`] and only takes the lock for the
//! synchronous step it has to do; no lock is held across an `.await`.

use super::factory::BlockFactory;
use super::progress::{HitOutcome, ProcessingState, ProgressTracker};
use super::queue::{BlockQueue, QueueLayout};
use super::removal::{RemovalCoordinator, RemovalPath};
use super::scheduler::{SpawnCycle, SpawnRefusal, SpawnScheduler, run_spawn_loop};
use crate::input::events::InputEvent;
use crate::models::block::{BlockEntity, BlockId};
use crate::models::level::LevelConfigSource;
use crate::models::note::MusicalNote;
use crate::models::settings::EngineSettings;
use crate::shared::snapshot::{BlockView, QueueSnapshot};
use crate::system::bus::{EngineBus, EngineEvent};
use crate::system::visuals::BlockVisuals;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type RemovalCallback = Box<dyn FnOnce(RemovalPath) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemovalKind {
    /// The block met its requirements.
    Completed,
    /// Removed from outside, without completion.
    Forced,
}

struct EngineState {
    queue: BlockQueue,
    scheduler: SpawnScheduler,
    processing: ProcessingState,
    factory: BlockFactory,
    next_block_id: u64,
    /// Bumped by `clear()`. Removals started in an older session are ignored.
    session: u64,
    danger_reported: bool,
}

struct Shared {
    state: Mutex<EngineState>,
    level: Arc<dyn LevelConfigSource>,
    visuals: Arc<dyn BlockVisuals>,
    removal: RemovalCoordinator,
    tracker: ProgressTracker,
    settings: EngineSettings,
    bus: EngineBus,
    runtime: Handle,
    spawn_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running engine. Clones share the same queue.
#[derive(Clone)]
pub struct BlocksEngine {
    shared: Arc<Shared>,
}

/// What the spawn loop holds on to. A dropped engine ends the loop.
struct SpawnDriver(Weak<Shared>);

impl SpawnCycle for SpawnDriver {
    fn spawn_cycle(&self, generation: u64) -> Option<Duration> {
        let shared = self.0.upgrade()?;
        let mut guard = shared.lock();
        let state = &mut *guard;
        if !state.scheduler.is_current(generation) {
            return None;
        }

        if let Err(refusal) = shared.spawn_locked(state, Instant::now()) {
            log::trace!("SPAWN: Attempt skipped ({:?})", refusal);
        }
        Some(state.scheduler.interval())
    }
}

impl BlocksEngine {
    pub fn new(
        runtime: Handle,
        level: Arc<dyn LevelConfigSource>,
        visuals: Arc<dyn BlockVisuals>,
        settings: EngineSettings,
        bus: EngineBus,
    ) -> Self {
        let scheduler = SpawnScheduler::new(level.falling_speed(), settings.spawn_interval_floor());
        let state = EngineState {
            queue: BlockQueue::new(settings.capacity, QueueLayout::from_settings(&settings)),
            scheduler,
            processing: ProcessingState::default(),
            factory: BlockFactory::new(settings.rng_seed),
            next_block_id: 1,
            session: 0,
            danger_reported: false,
        };

        log::info!(
            "ENGINE: Created (capacity {}, first interval {:?})",
            settings.capacity,
            state.scheduler.interval()
        );

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                removal: RemovalCoordinator::new(visuals.clone(), settings.removal_timeout()),
                tracker: ProgressTracker::new(settings.min_hit_interval(), settings.processing_timeout()),
                level,
                visuals,
                settings,
                bus,
                runtime,
                spawn_task: Mutex::new(None),
            }),
        }
    }

    pub fn bus(&self) -> &EngineBus {
        &self.shared.bus
    }

    /// Starts the spawn loop. `false` when it was already running.
    pub fn start(&self) -> bool {
        let generation = match self.shared.lock().scheduler.start() {
            Some(generation) => generation,
            None => return false,
        };

        let driver = Arc::new(SpawnDriver(Arc::downgrade(&self.shared)));
        let delay = self.shared.settings.initial_spawn_delay();
        let task = self.shared.runtime.spawn(run_spawn_loop(driver, generation, delay));
        if let Some(previous) = self.shared.spawn_task().replace(task) {
            previous.abort();
        }

        log::info!("SPAWN: Started (generation {}, first spawn in {:?})", generation, delay);
        true
    }

    /// Stops the spawn loop. No spawn happens after this returns.
    pub fn stop(&self) -> bool {
        let stopped = self.shared.lock().scheduler.stop();
        self.shared.abort_spawn_task();
        if stopped {
            log::info!("SPAWN: Stopped");
        }
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().scheduler.is_running()
    }

    /// Runs one spawn attempt right now, outside the loop's cadence.
    pub fn attempt_spawn(&self) -> Result<BlockId, SpawnRefusal> {
        let mut guard = self.shared.lock();
        self.shared.spawn_locked(&mut guard, Instant::now())
    }

    /// Applies a "note matched" event. `true` iff this hit completed the
    /// frontmost block.
    pub fn register_hit(&self, at: Instant) -> bool {
        self.shared.apply_hit(at, None)
    }

    /// Routes one input event. `true` iff it completed a block.
    pub fn handle_input(&self, event: InputEvent) -> bool {
        match event {
            InputEvent::Matched { at } => self.shared.apply_hit(at, None),
            InputEvent::Sung { note, at } => self.shared.apply_hit(at, Some(note)),
            InputEvent::Lost => {
                self.reset_progress();
                false
            }
        }
    }

    /// Drops the frontmost block's progress and clears the processing flag.
    pub fn reset_progress(&self) {
        let mut guard = self.shared.lock();
        let state = &mut *guard;

        if let Some(block) = state
            .queue
            .frontmost()
            .filter(|b| b.current_hits > 0 || b.hold_start.is_some())
        {
            self.shared.bus.emit(EngineEvent::ProgressReset { id: block.id });
            log::debug!("PROGRESS: Reset on {:?}", block.id);
        }
        for block in state.queue.iter_mut() {
            block.hold_start = None;
        }

        let block = state.queue.frontmost_mut();
        let visual = block.as_ref().map(|b| (b.visual, b.required_hits));
        self.shared.tracker.reset(&mut state.processing, block);
        if let Some((visual, required)) = visual {
            self.shared.visuals.show_remaining(visual, required);
        }
    }

    /// Time-driven update: hold progress, changing notes and the danger
    /// notification. `true` iff a hold completed the frontmost block.
    pub fn tick(&self, now: Instant) -> bool {
        self.shared.tick(now)
    }

    /// Starts a forced removal of the frontmost block.
    ///
    /// `on_complete` runs once, after the block left the queue. Returns
    /// `false` (and drops `on_complete`) when there is nothing to remove.
    pub fn remove_front<F>(&self, on_complete: F) -> bool
    where
        F: FnOnce(RemovalPath) + Send + 'static,
    {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let Some(id) = state.queue.frontmost().map(|b| b.id) else {
            return false;
        };
        self.shared
            .begin_removal(state, id, RemovalKind::Forced, Some(Box::new(on_complete)))
    }

    /// Stops spawning and drops every block at once, without animations or
    /// completion events.
    pub fn clear(&self) {
        let removed = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            state.scheduler.stop();
            state.session += 1;
            state.processing.reset();
            state.danger_reported = false;
            state.queue.detach_all(self.shared.visuals.as_ref())
        };
        self.shared.abort_spawn_task();
        log::info!("QUEUE: Cleared {} blocks", removed);
    }

    pub fn frontmost(&self) -> Option<BlockId> {
        self.shared.lock().queue.frontmost().map(|b| b.id)
    }

    /// Note of the frontmost block. `None` when empty or for the placeholder.
    pub fn frontmost_note(&self) -> Option<MusicalNote> {
        self.shared.lock().queue.frontmost().and_then(|b| b.note)
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.lock().queue.capacity()
    }

    pub fn is_below_danger_limit(&self) -> bool {
        self.shared.lock().queue.is_below_danger_limit(Instant::now())
    }

    pub fn spawn_interval(&self) -> Duration {
        self.shared.lock().scheduler.interval()
    }

    pub fn processing_state(&self) -> ProcessingState {
        self.shared.lock().processing
    }

    pub fn target_positions(&self) -> Vec<f32> {
        self.shared.lock().queue.target_positions()
    }

    /// Re-issues the slot moves of every block.
    pub fn reflow(&self) {
        let mut guard = self.shared.lock();
        guard.queue.reflow(self.shared.visuals.as_ref(), Instant::now());
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let now = Instant::now();
        let guard = self.shared.lock();
        QueueSnapshot {
            blocks: guard
                .queue
                .iter()
                .map(|b| BlockView {
                    id: b.id,
                    note: b.note,
                    style: b.style.id.clone(),
                    y: b.position_at(now),
                    current_hits: b.current_hits,
                    required_hits: b.required_hits,
                    holding: b.hold_start.is_some(),
                    removing: b.removing,
                })
                .collect(),
            capacity: guard.queue.capacity(),
            spawn_interval: guard.scheduler.interval(),
            running: guard.scheduler.is_running(),
            is_processing: guard.processing.is_processing,
            in_danger: guard.queue.is_below_danger_limit(now),
        }
    }
}

impl Drop for BlocksEngine {
    fn drop(&mut self) {
        // Last handle gone: the loop would end on its own, this just does it now.
        if Arc::strong_count(&self.shared) == 1 {
            self.shared.abort_spawn_task();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.spawn_task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_spawn_task(&self) {
        if let Some(task) = self.spawn_task().take() {
            task.abort();
        }
    }

    /// Guards, draw, attach, insert. Must be called with the state locked.
    fn spawn_locked(&self, state: &mut EngineState, now: Instant) -> Result<BlockId, SpawnRefusal> {
        state
            .scheduler
            .check_guards(&state.queue, self.settings.min_spawn_clearance, now)?;

        let blueprint = state.factory.draw_or_placeholder(self.level.as_ref());
        let visual = self.visuals.attach(&blueprint.style, blueprint.note.as_ref());
        let id = BlockId(state.next_block_id);

        let mut entity = BlockEntity::new(id, blueprint.style.clone(), blueprint.note, visual, now);
        if entity.style.is_changing() {
            entity.next_note_change = Some(now + self.settings.note_change_interval());
        }
        self.visuals.show_remaining(visual, entity.remaining_hits());

        if let Err(e) = state.queue.insert(entity, self.visuals.as_ref(), now) {
            log::warn!("QUEUE: Insert of {:?} failed: {}", id, e);
            self.visuals.detach(visual);
            return Err(SpawnRefusal::Queue(e));
        }
        state.next_block_id += 1;

        let interval = state.scheduler.record_spawn();
        log::debug!(
            "SPAWN: {:?} ({} {}) in, {} queued, next interval {:?}",
            id,
            blueprint.style.id,
            blueprint.note.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
            state.queue.len(),
            interval
        );
        self.bus.emit(EngineEvent::BlockSpawned {
            id,
            note: blueprint.note,
            style: blueprint.style.id.clone(),
        });
        Ok(id)
    }

    fn apply_hit(self: &Arc<Self>, at: Instant, sung: Option<MusicalNote>) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;

        if let Some(sung) = sung {
            let expected = state.queue.frontmost().and_then(|b| b.note);
            if expected.is_some_and(|expected| expected != sung) {
                log::trace!("PROGRESS: Sung {} does not match {:?}", sung, expected);
                return false;
            }
        }

        let outcome = self
            .tracker
            .register_hit(&mut state.processing, state.queue.frontmost_mut(), at);
        let completed = self.apply_outcome(state, outcome);
        if outcome.is_accepted() {
            self.arm_processing_guard(state.processing);
        }
        completed
    }

    fn tick(self: &Arc<Self>, now: Instant) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;

        let outcome = self
            .tracker
            .tick(&mut state.processing, state.queue.frontmost_mut(), now);
        let completed = self.apply_outcome(state, outcome);
        if completed {
            self.arm_processing_guard(state.processing);
        }

        self.change_notes(state, now);
        self.check_danger(state, now);
        completed
    }

    /// Reports a tracker outcome and starts the removal of completed blocks.
    fn apply_outcome(self: &Arc<Self>, state: &mut EngineState, outcome: HitOutcome) -> bool {
        match outcome {
            HitOutcome::Rejected(reason) => {
                log::trace!("PROGRESS: Ignored ({:?})", reason);
                false
            }
            HitOutcome::Advanced { id, remaining } => {
                if let Some(block) = state.queue.get(id) {
                    self.visuals.show_remaining(block.visual, remaining);
                }
                self.bus.emit(EngineEvent::BlockProgress {
                    id,
                    remaining_hits: remaining,
                });
                log::debug!("PROGRESS: {:?} needs {} more", id, remaining);
                false
            }
            HitOutcome::HoldStarted { id } => {
                log::debug!("PROGRESS: Hold started on {:?}", id);
                false
            }
            HitOutcome::Holding { .. } | HitOutcome::Idle => false,
            HitOutcome::Completed { id } => {
                if let Some(block) = state.queue.get(id) {
                    self.visuals.show_remaining(block.visual, 0);
                }
                log::debug!("PROGRESS: {:?} completed", id);
                self.begin_removal(state, id, RemovalKind::Completed, None)
            }
        }
    }

    /// Force-clears processing once it has lasted the tracker timeout.
    fn arm_processing_guard(self: &Arc<Self>, processing: ProcessingState) {
        let Some(start) = processing.processing_start.filter(|_| processing.is_processing) else {
            return;
        };
        let timeout = self.tracker.timeout;
        let weak = Arc::downgrade(self);

        self.runtime.spawn(async move {
            tokio::time::sleep_until(start + timeout).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let expired = shared.lock().processing.expire(Instant::now(), timeout);
            if expired {
                log::warn!("PROGRESS: Processing stuck for {:?}, force-cleared", timeout);
                shared.bus.emit(EngineEvent::ProcessingTimedOut);
            }
        });
    }

    fn begin_removal(
        self: &Arc<Self>,
        state: &mut EngineState,
        id: BlockId,
        kind: RemovalKind,
        on_complete: Option<RemovalCallback>,
    ) -> bool {
        let Some(block) = state.queue.get_mut(id) else {
            return false;
        };
        if block.removing {
            return false;
        }
        block.removing = true;
        block.hold_start = None;

        let handle = block.visual;
        let session = state.session;
        let weak = Arc::downgrade(self);
        log::debug!("REMOVAL: {:?} started ({:?})", id, kind);

        self.removal.remove(&self.runtime, handle, move |path| {
            if let Some(shared) = weak.upgrade() {
                shared.finish_removal(id, session, kind, path);
            }
            if let Some(on_complete) = on_complete {
                on_complete(path);
            }
        });
        true
    }

    fn finish_removal(&self, id: BlockId, session: u64, kind: RemovalKind, path: RemovalPath) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.session != session {
            log::debug!("REMOVAL: {:?} finished after a clear, ignored", id);
            return;
        }
        let Some(block) = state.queue.take(id) else {
            log::debug!("REMOVAL: {:?} already left the queue", id);
            return;
        };
        state.queue.reflow(self.visuals.as_ref(), Instant::now());

        match kind {
            RemovalKind::Completed => {
                if !state.processing.finish_for(id) {
                    log::debug!("REMOVAL: Processing no longer held by {:?}, left as is", id);
                }
                self.bus.emit(EngineEvent::BlockCompleted {
                    id,
                    note: block.note,
                    style: block.style.id.clone(),
                });
            }
            RemovalKind::Forced => self.bus.emit(EngineEvent::BlockRemoved { id }),
        }
        log::debug!("REMOVAL: {:?} out ({:?}), {} left", id, path, state.queue.len());
    }

    fn change_notes(&self, state: &mut EngineState, now: Instant) {
        let interval = self.settings.note_change_interval();
        for block in state.queue.iter_mut() {
            if block.removing || !block.next_note_change.is_some_and(|due| due <= now) {
                continue;
            }
            block.next_note_change = Some(now + interval);
            match state.factory.draw_note(&block.style) {
                Ok(note) => {
                    block.note = Some(note);
                    self.visuals.show_note(block.visual, Some(&note));
                    log::trace!("SPAWN: {:?} now shows {}", block.id, note);
                }
                Err(e) => log::warn!("SPAWN: Note change of {:?} failed: {}", block.id, e),
            }
        }
    }

    fn check_danger(&self, state: &mut EngineState, now: Instant) {
        let in_danger = state.queue.is_below_danger_limit(now);
        if in_danger && !state.danger_reported {
            log::warn!("QUEUE: Danger limit reached with {} blocks", state.queue.len());
            self.bus.emit(EngineEvent::DangerLimitReached);
        }
        state.danger_reported = in_danger;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::level::LevelBook;
    use crate::models::note;
    use crate::system::visuals::HeadlessVisuals;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    const THREE_HITS: &str = r#"
[styles.triple]
note_pool = ["do4"]
required_hits = 3

[[levels]]
number = 1
allowed_styles = ["triple"]
"#;

    const ONE_HIT: &str = r#"
[styles.single]
note_pool = ["do4"]

[[levels]]
number = 1
allowed_styles = ["single"]
falling_speed = { initial_ms = 3000, decrement_ms = 500 }
"#;

    fn settings() -> EngineSettings {
        EngineSettings {
            min_spawn_clearance: 0.0,
            // Keep the loop out of the way unless a test waits for it.
            initial_spawn_delay_ms: 60_000,
            rng_seed: Some(1),
            ..EngineSettings::default()
        }
    }

    fn engine(toml: &str, settings: EngineSettings, visuals: Arc<HeadlessVisuals>) -> BlocksEngine {
        let level = LevelBook::from_toml_str(toml).unwrap().level(1).unwrap();
        BlocksEngine::new(Handle::current(), Arc::new(level), visuals, settings, EngineBus::new())
    }

    fn count<F: Fn(&EngineEvent) -> bool>(events: &[EngineEvent], f: F) -> usize {
        events.iter().filter(|e| f(*e)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_hits_complete_and_remove_block() {
        let visuals = Arc::new(HeadlessVisuals::new(Some(Duration::from_millis(300))));
        let engine = engine(THREE_HITS, settings(), visuals.clone());
        engine.start();
        let id = engine.attempt_spawn().unwrap();

        assert!(!engine.register_hit(Instant::now()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!engine.register_hit(Instant::now()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(engine.register_hit(Instant::now()));

        // Removal still running.
        assert_eq!(engine.len(), 1);
        assert!(engine.processing_state().is_processing);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(engine.len(), 0);
        assert!(!engine.processing_state().is_processing);
        assert_eq!(visuals.attached_count(), 0);

        let events = engine.bus().drain_events();
        assert!(events.contains(&EngineEvent::BlockCompleted {
            id,
            note: Some(note::parse("do4").unwrap()),
            style: "triple".into(),
        }));
        assert_eq!(count(&events, |e| matches!(e, EngineEvent::BlockProgress { .. })), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_processing_recovers_after_timeout() {
        let visuals = Arc::new(HeadlessVisuals::new(None));
        let engine = engine(
            ONE_HIT,
            EngineSettings {
                removal_timeout_ms: 10_000,
                ..settings()
            },
            visuals.clone(),
        );
        engine.start();
        let older = engine.attempt_spawn().unwrap();
        let newer = engine.attempt_spawn().unwrap();
        assert_eq!(engine.frontmost(), Some(newer));

        assert!(engine.register_hit(Instant::now()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!engine.register_hit(Instant::now()));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(!engine.processing_state().is_processing);
        let events = engine.bus().drain_events();
        assert_eq!(count(&events, |e| *e == EngineEvent::ProcessingTimedOut), 1);

        // The leaving block is skipped, the next one takes the hit.
        assert_eq!(engine.frontmost(), Some(older));
        assert!(engine.register_hit(Instant::now()));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert!(engine.is_empty());
        assert_eq!(visuals.attached_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_initial_delay_spawns_nothing() {
        let visuals = Arc::new(HeadlessVisuals::default());
        let engine = engine(
            ONE_HIT,
            EngineSettings {
                initial_spawn_delay_ms: 1000,
                ..settings()
            },
            visuals.clone(),
        );

        assert!(engine.start());
        assert!(!engine.start());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(engine.stop());
        assert!(!engine.stop());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(engine.is_empty());
        assert_eq!(visuals.node_count(), 0);
        assert_eq!(engine.attempt_spawn(), Err(SpawnRefusal::NotRunning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_shrinks_interval_and_respects_capacity() {
        let visuals = Arc::new(HeadlessVisuals::default());
        let engine = engine(
            ONE_HIT,
            EngineSettings {
                capacity: 3,
                initial_spawn_delay_ms: 1000,
                spawn_interval_floor_ms: 1500,
                ..settings()
            },
            visuals.clone(),
        );
        assert_eq!(engine.spawn_interval(), Duration::from_millis(3000));
        engine.start();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.spawn_interval(), Duration::from_millis(2500));

        // Next spawn at 3.5s.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(engine.len(), 2);
        assert_eq!(engine.spawn_interval(), Duration::from_millis(2000));

        let mut previous = engine.spawn_interval();
        for _ in 0..30 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert!(engine.len() <= 3);
            let interval = engine.spawn_interval();
            assert!(interval <= previous && interval >= Duration::from_millis(1500));
            previous = interval;
        }
        assert_eq!(engine.len(), 3);
        assert_eq!(engine.attempt_spawn(), Err(SpawnRefusal::AtCapacity));
        assert_eq!(engine.target_positions(), vec![120.0, 210.0, 300.0]);

        let spawned = count(&engine.bus().drain_events(), |e| {
            matches!(e, EngineEvent::BlockSpawned { .. })
        });
        assert_eq!(spawned, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clearance_guard() {
        let visuals = Arc::new(HeadlessVisuals::default());
        let engine = engine(
            ONE_HIT,
            EngineSettings {
                min_spawn_clearance: 80.0,
                ..settings()
            },
            visuals,
        );
        engine.start();
        engine.attempt_spawn().unwrap();
        assert_eq!(engine.attempt_spawn(), Err(SpawnRefusal::NotEnoughClearance));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(engine.attempt_spawn().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_hit_changes_nothing() {
        let engine = engine(THREE_HITS, settings(), Arc::new(HeadlessVisuals::default()));
        engine.start();
        engine.attempt_spawn().unwrap();

        let t0 = Instant::now();
        assert!(!engine.register_hit(t0));
        let before = engine.processing_state();
        assert!(!engine.register_hit(t0 + Duration::from_millis(100)));
        assert_eq!(engine.processing_state(), before);
        assert_eq!(engine.snapshot().frontmost().unwrap().current_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_on_empty_queue() {
        let engine = engine(THREE_HITS, settings(), Arc::new(HeadlessVisuals::default()));
        assert!(!engine.register_hit(Instant::now()));
        assert_eq!(engine.processing_state(), ProcessingState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sung_notes_compare_enharmonically() {
        let engine = engine(THREE_HITS, settings(), Arc::new(HeadlessVisuals::default()));
        engine.start();
        engine.attempt_spawn().unwrap();
        assert_eq!(engine.frontmost_note(), Some(note::parse("do4").unwrap()));

        let wrong = InputEvent::Sung {
            note: note::parse("re4").unwrap(),
            at: Instant::now(),
        };
        assert!(!engine.handle_input(wrong));
        assert_eq!(engine.snapshot().frontmost().unwrap().current_hits, 0);

        // si#3 is the same pitch as do4.
        let same = InputEvent::Sung {
            note: note::parse("si#3").unwrap(),
            at: Instant::now(),
        };
        assert!(!engine.handle_input(same));
        assert_eq!(engine.snapshot().frontmost().unwrap().current_hits, 1);

        assert!(!engine.handle_input(InputEvent::Lost));
        assert_eq!(engine.snapshot().frontmost().unwrap().current_hits, 0);
        let events = engine.bus().drain_events();
        assert_eq!(count(&events, |e| matches!(e, EngineEvent::ProgressReset { .. })), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_completes_on_tick() {
        let toml = r#"
[styles.long]
note_pool = ["sol4"]
required_time_ms = 800

[[levels]]
number = 1
allowed_styles = ["long"]
"#;
        let engine = engine(toml, settings(), Arc::new(HeadlessVisuals::default()));
        engine.start();
        engine.attempt_spawn().unwrap();

        assert!(!engine.register_hit(Instant::now()));
        assert!(engine.snapshot().frontmost().unwrap().holding);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!engine.tick(Instant::now()));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(engine.tick(Instant::now()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(engine.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_during_hold_breaks_it() {
        let toml = r#"
[styles.long]
note_pool = ["sol4"]
required_time_ms = 800

[[levels]]
number = 1
allowed_styles = ["long"]
"#;
        let engine = engine(toml, settings(), Arc::new(HeadlessVisuals::default()));
        engine.start();
        let older = engine.attempt_spawn().unwrap();
        assert!(!engine.register_hit(Instant::now()));

        let newer = engine.attempt_spawn().unwrap();
        assert_eq!(engine.frontmost(), Some(newer));
        let held = engine.snapshot();
        assert!(held.blocks.iter().all(|b| !b.holding));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!engine.register_hit(Instant::now()));
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(engine.tick(Instant::now()));
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(engine.frontmost(), Some(older));

        // No new hold on the older block: a tick must not credit it.
        assert!(!engine.tick(Instant::now()));
        let view = engine.snapshot();
        let front = view.frontmost().unwrap();
        assert_eq!(front.id, older);
        assert_eq!(front.current_hits, 0);
        assert!(!front.holding);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_frontmost_skips_leaving_block() {
        let engine = engine(ONE_HIT, settings(), Arc::new(HeadlessVisuals::default()));
        engine.start();
        let older = engine.attempt_spawn().unwrap();
        let newer = engine.attempt_spawn().unwrap();
        assert!(engine.register_hit(Instant::now()));

        let view = engine.snapshot();
        assert_eq!(view.blocks[0].id, newer);
        assert!(view.blocks[0].removing);
        assert_eq!(view.frontmost().map(|b| b.id), Some(older));
        assert_eq!(engine.frontmost(), Some(older));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_removal_keeps_processing_of_newer_completion() {
        let visuals = Arc::new(HeadlessVisuals::new(Some(Duration::from_secs(5))));
        let engine = engine(
            ONE_HIT,
            EngineSettings {
                removal_timeout_ms: 10_000,
                processing_timeout_ms: 20_000,
                ..settings()
            },
            visuals,
        );
        engine.start();
        let older = engine.attempt_spawn().unwrap();
        engine.attempt_spawn().unwrap();

        // The newer block completes, then a dropout clears processing.
        assert!(engine.register_hit(Instant::now()));
        engine.handle_input(InputEvent::Lost);
        assert!(!engine.processing_state().is_processing);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(engine.register_hit(Instant::now()));
        assert_eq!(engine.processing_state().owner, Some(older));

        // The newer block's removal finishes first and leaves the flag alone.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(engine.len(), 1);
        assert!(engine.processing_state().is_processing);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(engine.is_empty());
        assert!(!engine.processing_state().is_processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_everything_silently() {
        let visuals = Arc::new(HeadlessVisuals::default());
        let engine = engine(ONE_HIT, settings(), visuals.clone());
        engine.start();
        engine.attempt_spawn().unwrap();
        engine.attempt_spawn().unwrap();
        let interval = engine.spawn_interval();

        // One removal in flight when the queue is cleared.
        assert!(engine.register_hit(Instant::now()));
        engine.bus().drain_events();
        engine.clear();

        assert!(engine.is_empty());
        assert!(!engine.is_running());
        assert_eq!(visuals.attached_count(), 0);
        assert_eq!(engine.processing_state(), ProcessingState::default());
        assert_eq!(engine.spawn_interval(), interval);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(engine.bus().drain_events().is_empty());
        assert!(engine.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_front_runs_callback_once() {
        let visuals = Arc::new(HeadlessVisuals::default());
        let engine = engine(ONE_HIT, settings(), visuals.clone());
        engine.start();
        engine.attempt_spawn().unwrap();
        engine.attempt_spawn().unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            assert!(engine.remove_front(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(!engine.remove_front(|_| {}));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(engine.is_empty());
        let events = engine.bus().drain_events();
        assert_eq!(count(&events, |e| matches!(e, EngineEvent::BlockRemoved { .. })), 2);
        assert_eq!(count(&events, |e| matches!(e, EngineEvent::BlockCompleted { .. })), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changing_blocks_redraw_their_note() {
        let toml = r#"
[styles.shifty]
note_pool = ["do4", "re4", "mi4", "fa4"]
special = "changing"

[[levels]]
number = 1
allowed_styles = ["shifty"]
"#;
        let visuals = Arc::new(HeadlessVisuals::default());
        let engine = engine(toml, settings(), visuals.clone());
        engine.start();
        engine.attempt_spawn().unwrap();

        let handle = crate::models::block::VisualHandle(1);
        let mut seen = HashSet::new();
        for _ in 0..12 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            engine.tick(Instant::now());
            let note = engine.frontmost_note().unwrap();
            assert_eq!(visuals.node(handle).unwrap().note, Some(note));
            seen.insert(note);
        }
        assert!(seen.len() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_danger_reported_once_per_crossing() {
        let engine = engine(
            ONE_HIT,
            EngineSettings {
                danger_limit_y: 250.0,
                ..settings()
            },
            Arc::new(HeadlessVisuals::default()),
        );
        engine.start();
        for _ in 0..3 {
            engine.attempt_spawn().unwrap();
        }
        assert!(!engine.is_below_danger_limit());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(engine.is_below_danger_limit());
        engine.tick(Instant::now());
        engine.tick(Instant::now());
        assert!(engine.snapshot().in_danger);

        let events = engine.bus().drain_events();
        assert_eq!(count(&events, |e| *e == EngineEvent::DangerLimitReached), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_when_level_is_broken() {
        let toml = r#"
[[levels]]
number = 1
allowed_styles = ["missing"]
"#;
        let engine = engine(toml, settings(), Arc::new(HeadlessVisuals::default()));
        engine.start();
        engine.attempt_spawn().unwrap();
        assert_eq!(engine.frontmost_note(), None);

        // Anything sung counts on a placeholder.
        assert!(engine.handle_input(InputEvent::Sung {
            note: note::parse("la4").unwrap(),
            at: Instant::now(),
        }));
    }
}

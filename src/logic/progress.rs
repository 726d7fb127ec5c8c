//! Hit and hold progress of the frontmost block, behind the processing guard.
//!
//! The tracker is pure bookkeeping: it mutates a [`ProcessingState`] and a
//! block and reports what happened. Starting removals and arming timers is
//! left to the engine.

use crate::models::block::{BlockEntity, BlockId};
use crate::models::style::ProgressMode;
use std::time::Duration;
use tokio::time::Instant;

/// Guard state shared by every hit on one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingState {
    pub is_processing: bool,
    pub last_hit: Option<Instant>,
    pub processing_start: Option<Instant>,
    /// Block whose completion holds the flag until its removal finishes.
    pub owner: Option<BlockId>,
}

impl ProcessingState {
    /// Marks an accepted hit.
    fn accept(&mut self, at: Instant) {
        self.is_processing = true;
        self.last_hit = Some(at);
        self.processing_start = Some(at);
    }

    /// Enters processing without counting as a hit (hold completions).
    fn enter(&mut self, now: Instant) {
        self.is_processing = true;
        self.processing_start = Some(now);
    }

    /// Leaves processing; the debounce reference is kept.
    pub fn finish(&mut self) {
        self.is_processing = false;
        self.processing_start = None;
        self.owner = None;
    }

    /// Leaves processing only if `id` is the block holding it.
    pub fn finish_for(&mut self, id: BlockId) -> bool {
        if self.owner != Some(id) {
            return false;
        }
        self.finish();
        true
    }

    /// Back to the state of a fresh queue.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Force-clears processing once it has lasted `timeout`.
    ///
    /// Returns whether anything was cleared.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> bool {
        let stuck = self.is_processing
            && self
                .processing_start
                .is_some_and(|start| now.saturating_duration_since(start) >= timeout);
        if stuck {
            self.finish();
        }
        stuck
    }
}

/// Why a hit was ignored. Never an error, just "not completed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitRejection {
    /// A previous hit is still being processed.
    Busy,
    /// Too soon after the previous accepted hit.
    Debounced,
    /// Nothing to hit.
    NoBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    Rejected(HitRejection),
    /// Hit counted; the block still needs `remaining` more.
    Advanced { id: BlockId, remaining: u32 },
    /// A hold was started on a hold-style block.
    HoldStarted { id: BlockId },
    /// A hold is running but has not lasted long enough yet.
    Holding { id: BlockId },
    /// The block met its requirements. Processing stays set until the
    /// removal completes.
    Completed { id: BlockId },
    /// A tick found no running hold to check.
    Idle,
}

impl HitOutcome {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, HitOutcome::Rejected(_) | HitOutcome::Idle)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    pub min_interval: Duration,
    pub timeout: Duration,
}

impl ProgressTracker {
    pub fn new(min_interval: Duration, timeout: Duration) -> Self {
        Self {
            min_interval,
            timeout,
        }
    }

    /// Applies one "note matched" event at `at` to `block`.
    pub fn register_hit(
        &self,
        processing: &mut ProcessingState,
        block: Option<&mut BlockEntity>,
        at: Instant,
    ) -> HitOutcome {
        if processing.is_processing {
            return HitOutcome::Rejected(HitRejection::Busy);
        }
        if processing
            .last_hit
            .is_some_and(|last| at.saturating_duration_since(last) < self.min_interval)
        {
            return HitOutcome::Rejected(HitRejection::Debounced);
        }
        let Some(block) = block else {
            return HitOutcome::Rejected(HitRejection::NoBlock);
        };

        processing.accept(at);

        let outcome = match block.progress_mode() {
            ProgressMode::Hits => {
                block.current_hits += 1;
                if block.is_complete() {
                    HitOutcome::Completed { id: block.id }
                } else {
                    HitOutcome::Advanced {
                        id: block.id,
                        remaining: block.remaining_hits(),
                    }
                }
            }
            ProgressMode::Hold => match block.hold_start {
                None => {
                    block.hold_start = Some(at);
                    HitOutcome::HoldStarted { id: block.id }
                }
                Some(_) => Self::advance_hold(block, at),
            },
        };

        match outcome {
            HitOutcome::Completed { id } => processing.owner = Some(id),
            _ => processing.finish(),
        }
        outcome
    }

    /// Checks a running hold against its required time.
    ///
    /// Reports `Idle` while processing or when no hold is running.
    pub fn tick(
        &self,
        processing: &mut ProcessingState,
        block: Option<&mut BlockEntity>,
        now: Instant,
    ) -> HitOutcome {
        if processing.is_processing {
            return HitOutcome::Idle;
        }
        let Some(block) = block.filter(|b| b.hold_start.is_some()) else {
            return HitOutcome::Idle;
        };

        let outcome = Self::advance_hold(block, now);
        if let HitOutcome::Completed { id } = outcome {
            processing.enter(now);
            processing.owner = Some(id);
        }
        outcome
    }

    /// Drops the frontmost block's progress and force-clears processing.
    pub fn reset(&self, processing: &mut ProcessingState, block: Option<&mut BlockEntity>) {
        if let Some(block) = block {
            block.reset_progress();
        }
        processing.reset();
    }

    fn advance_hold(block: &mut BlockEntity, now: Instant) -> HitOutcome {
        let Some(start) = block.hold_start else {
            return HitOutcome::Holding { id: block.id };
        };
        if now.saturating_duration_since(start) < block.required_time {
            return HitOutcome::Holding { id: block.id };
        }

        block.current_hits += 1;
        block.hold_start = None;
        if block.is_complete() {
            HitOutcome::Completed { id: block.id }
        } else {
            HitOutcome::Advanced {
                id: block.id,
                remaining: block.remaining_hits(),
            }
        }
    }
}

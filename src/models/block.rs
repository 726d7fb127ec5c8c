//! A spawned block and its motion on the play field.

use super::note::MusicalNote;
use super::style::{BlockStyle, ProgressMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Engine-assigned identity of a block, unique for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

/// Opaque handle to the block's node in the visual layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualHandle(pub u64);

/// Linear vertical move from `from_y` to `to_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub from_y: f32,
    pub to_y: f32,
    pub started: Instant,
    pub duration: Duration,
}

impl Motion {
    pub fn at_rest(y: f32, now: Instant) -> Self {
        Self {
            from_y: y,
            to_y: y,
            started: now,
            duration: Duration::ZERO,
        }
    }

    pub fn position_at(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return self.to_y;
        }
        let elapsed = now.saturating_duration_since(self.started);
        let t = (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0);
        self.from_y + (self.to_y - self.from_y) * t
    }
}

#[derive(Debug, Clone)]
pub struct BlockEntity {
    pub id: BlockId,
    /// `None` only for the placeholder block.
    pub note: Option<MusicalNote>,
    pub style: Arc<BlockStyle>,
    pub required_hits: u32,
    pub required_time: Duration,
    pub current_hits: u32,
    pub hold_start: Option<Instant>,
    pub visual: VisualHandle,
    pub motion: Motion,
    /// Set once a removal sequence has been started for this block.
    pub removing: bool,
    /// Next note redraw, for changing blocks.
    pub next_note_change: Option<Instant>,
}

impl BlockEntity {
    pub fn new(
        id: BlockId,
        style: Arc<BlockStyle>,
        note: Option<MusicalNote>,
        visual: VisualHandle,
        now: Instant,
    ) -> Self {
        Self {
            id,
            note,
            required_hits: style.required_hits.max(1),
            required_time: style.required_time,
            style,
            current_hits: 0,
            hold_start: None,
            visual,
            motion: Motion::at_rest(0.0, now),
            removing: false,
            next_note_change: None,
        }
    }

    pub fn progress_mode(&self) -> ProgressMode {
        self.style.progress_mode()
    }

    pub fn remaining_hits(&self) -> u32 {
        self.required_hits.saturating_sub(self.current_hits)
    }

    pub fn is_complete(&self) -> bool {
        self.current_hits >= self.required_hits
    }

    pub fn position_at(&self, now: Instant) -> f32 {
        self.motion.position_at(now)
    }

    /// Drops accumulated hits and any hold in progress.
    pub fn reset_progress(&mut self) {
        self.current_hits = 0;
        self.hold_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motion_interpolates_and_clamps() {
        let start = Instant::now();
        let motion = Motion {
            from_y: 0.0,
            to_y: 100.0,
            started: start,
            duration: Duration::from_millis(400),
        };

        assert_eq!(motion.position_at(start), 0.0);
        assert!((motion.position_at(start + Duration::from_millis(100)) - 25.0).abs() < 1e-3);
        assert_eq!(motion.position_at(start + Duration::from_secs(5)), 100.0);
        assert_eq!(Motion::at_rest(42.0, start).position_at(start), 42.0);
    }

    #[test]
    fn test_progress_bookkeeping() {
        let mut style = BlockStyle::placeholder();
        style.required_hits = 3;
        let mut block = BlockEntity::new(
            BlockId(1),
            Arc::new(style),
            None,
            VisualHandle(9),
            Instant::now(),
        );

        assert_eq!(block.remaining_hits(), 3);
        block.current_hits = 2;
        block.hold_start = Some(Instant::now());
        assert_eq!(block.remaining_hits(), 1);
        assert!(!block.is_complete());

        block.reset_progress();
        assert_eq!(block.current_hits, 0);
        assert!(block.hold_start.is_none());
    }
}

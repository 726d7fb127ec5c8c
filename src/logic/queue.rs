//! Ordered collection of live blocks and their stacking layout.
//!
//! Index 0 is the most recently spawned block and sits in the top slot; older
//! blocks are pushed one slot further down on every insert. Hits apply to the
//! newest block that is not already being removed.

use crate::models::block::{BlockEntity, BlockId, Motion, VisualHandle};
use crate::models::settings::EngineSettings;
use crate::system::visuals::BlockVisuals;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is full ({0} blocks)")]
    Full(usize),
    #[error("visual handle {0:?} is already used by another block")]
    DuplicateHandle(VisualHandle),
}

/// Vertical layout of the stack. Y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueLayout {
    pub spawn_origin_y: f32,
    pub first_slot_y: f32,
    pub slot_spacing: f32,
    pub danger_limit_y: f32,
    pub reflow_duration: Duration,
}

impl QueueLayout {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            spawn_origin_y: settings.spawn_origin_y,
            first_slot_y: settings.first_slot_y,
            slot_spacing: settings.slot_spacing,
            danger_limit_y: settings.danger_limit_y,
            reflow_duration: settings.reflow_duration(),
        }
    }

    /// Target y of the block at `index`.
    pub fn slot_y(&self, index: usize) -> f32 {
        self.first_slot_y + index as f32 * self.slot_spacing
    }
}

pub struct BlockQueue {
    blocks: VecDeque<BlockEntity>,
    capacity: usize,
    layout: QueueLayout,
}

impl BlockQueue {
    pub fn new(capacity: usize, layout: QueueLayout) -> Self {
        Self {
            blocks: VecDeque::with_capacity(capacity),
            capacity,
            layout,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.blocks.len() >= self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockEntity> {
        self.blocks.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BlockEntity> {
        self.blocks.iter_mut()
    }

    /// Adds `entity` on top of the stack, starting at the spawn origin, and
    /// reflows before returning.
    pub fn insert(
        &mut self,
        mut entity: BlockEntity,
        visuals: &dyn BlockVisuals,
        now: Instant,
    ) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::Full(self.blocks.len()));
        }
        if self.blocks.iter().any(|b| b.visual == entity.visual) {
            return Err(QueueError::DuplicateHandle(entity.visual));
        }

        // The displaced block is no longer frontmost, so its hold is broken.
        if let Some(displaced) = self.frontmost_mut().filter(|b| b.hold_start.is_some()) {
            displaced.hold_start = None;
            log::debug!("QUEUE: Hold on {:?} broken by a newer block", displaced.id);
        }

        entity.motion = Motion::at_rest(self.layout.spawn_origin_y, now);
        self.blocks.push_front(entity);
        self.reflow(visuals, now);
        Ok(())
    }

    /// Sends every block towards the slot matching its index.
    pub fn reflow(&mut self, visuals: &dyn BlockVisuals, now: Instant) {
        let duration = self.layout.reflow_duration;
        for (index, block) in self.blocks.iter_mut().enumerate() {
            let target = self.layout.slot_y(index);
            block.motion = Motion {
                from_y: block.motion.position_at(now),
                to_y: target,
                started: now,
                duration,
            };
            visuals.move_to(block.visual, target, duration);
        }
    }

    /// Current move target of every block, by index.
    pub fn target_positions(&self) -> Vec<f32> {
        self.blocks.iter().map(|b| b.motion.to_y).collect()
    }

    /// The block hits apply to: the newest one not already being removed.
    pub fn frontmost(&self) -> Option<&BlockEntity> {
        self.blocks.iter().find(|b| !b.removing)
    }

    pub fn frontmost_mut(&mut self) -> Option<&mut BlockEntity> {
        self.blocks.iter_mut().find(|b| !b.removing)
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockEntity> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut BlockEntity> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    /// Removes a block without touching its visual or the layout.
    pub fn take(&mut self, id: BlockId) -> Option<BlockEntity> {
        let index = self.blocks.iter().position(|b| b.id == id)?;
        self.blocks.remove(index)
    }

    /// Distance the newest block has travelled from the spawn origin.
    pub fn newest_clearance(&self, now: Instant) -> Option<f32> {
        self.blocks
            .front()
            .map(|b| b.position_at(now) - self.layout.spawn_origin_y)
    }

    pub fn is_below_danger_limit(&self, now: Instant) -> bool {
        self.blocks
            .iter()
            .any(|b| b.position_at(now) > self.layout.danger_limit_y)
    }

    /// Detaches every visual and empties the queue. No animations.
    pub fn detach_all(&mut self, visuals: &dyn BlockVisuals) -> usize {
        let count = self.blocks.len();
        for block in self.blocks.drain(..) {
            visuals.detach(block.visual);
        }
        count
    }
}

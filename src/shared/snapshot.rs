//! Queue snapshots for the scoring and UI side.
//!
//! Snapshots are immutable captures of the engine state. They decouple the
//! engine lock from whoever draws the HUD.

use crate::models::block::BlockId;
use crate::models::note::MusicalNote;
use crate::models::style::StyleId;
use std::time::Duration;

/// One block as seen from outside the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockView {
    pub id: BlockId,
    pub note: Option<MusicalNote>,
    pub style: StyleId,
    /// Current y, growing downwards.
    pub y: f32,
    pub current_hits: u32,
    pub required_hits: u32,
    /// Whether a hold is currently running on this block.
    pub holding: bool,
    pub removing: bool,
}

/// Snapshot of the whole queue, newest block first.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueSnapshot {
    pub blocks: Vec<BlockView>,
    pub capacity: usize,
    pub spawn_interval: Duration,
    pub running: bool,
    pub is_processing: bool,
    pub in_danger: bool,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The block hits apply to, skipping blocks already being removed.
    pub fn frontmost(&self) -> Option<&BlockView> {
        self.blocks.iter().find(|b| !b.removing)
    }
}

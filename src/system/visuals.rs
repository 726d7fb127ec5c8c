//! Seam between the engine and whatever draws the blocks.
//!
//! The engine only issues commands through [`BlockVisuals`]; it never reads
//! positions back. `HeadlessVisuals` records every command and plays removal
//! animations on tokio timers, which is what the demo session and the tests
//! run against.

use crate::models::block::VisualHandle;
use crate::models::note::MusicalNote;
use crate::models::style::BlockStyle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Animation and scene-graph substrate.
pub trait BlockVisuals: Send + Sync {
    /// Creates the node for a new block and returns its handle.
    fn attach(&self, style: &BlockStyle, note: Option<&MusicalNote>) -> VisualHandle;

    /// Starts a move to `y`, replacing any move in flight on this node.
    fn move_to(&self, handle: VisualHandle, y: f32, duration: Duration);

    /// Updates the remaining-hits counter drawn on the block.
    fn show_remaining(&self, handle: VisualHandle, remaining: u32);

    /// Redraws the note label of a changing block.
    fn show_note(&self, handle: VisualHandle, note: Option<&MusicalNote>);

    /// Starts the fade/scale-out sequence.
    ///
    /// The receiver resolves when the animation finishes. A dropped sender
    /// means the animation will never report back.
    fn play_removal(&self, handle: VisualHandle) -> oneshot::Receiver<()>;

    /// Removes the node from its parent. Detaching twice is harmless.
    fn detach(&self, handle: VisualHandle);

    fn is_attached(&self, handle: VisualHandle) -> bool;
}

/// Everything the headless layer knows about one node.
#[derive(Debug, Clone, Default)]
pub struct NodeRecord {
    pub style: String,
    pub note: Option<MusicalNote>,
    pub attached: bool,
    /// Every move target, oldest first.
    pub moves: Vec<f32>,
    pub remaining: Option<u32>,
    pub removal_started: bool,
}

/// Recording visuals with timer-driven removal animations.
pub struct HeadlessVisuals {
    next_handle: AtomicU64,
    nodes: Mutex<HashMap<VisualHandle, NodeRecord>>,
    /// `None` keeps removal animations pending forever.
    removal_duration: Option<Duration>,
    stalled: Mutex<Vec<oneshot::Sender<()>>>,
}

impl HeadlessVisuals {
    pub fn new(removal_duration: Option<Duration>) -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            nodes: Mutex::new(HashMap::new()),
            removal_duration,
            stalled: Mutex::new(Vec::new()),
        }
    }

    fn nodes(&self) -> MutexGuard<'_, HashMap<VisualHandle, NodeRecord>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn node(&self, handle: VisualHandle) -> Option<NodeRecord> {
        self.nodes().get(&handle).cloned()
    }

    pub fn attached_count(&self) -> usize {
        self.nodes().values().filter(|n| n.attached).count()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().len()
    }
}

impl Default for HeadlessVisuals {
    fn default() -> Self {
        Self::new(Some(Duration::from_millis(300)))
    }
}

impl BlockVisuals for HeadlessVisuals {
    fn attach(&self, style: &BlockStyle, note: Option<&MusicalNote>) -> VisualHandle {
        let handle = VisualHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.nodes().insert(
            handle,
            NodeRecord {
                style: style.id.to_string(),
                note: note.copied(),
                attached: true,
                ..NodeRecord::default()
            },
        );
        handle
    }

    fn move_to(&self, handle: VisualHandle, y: f32, _duration: Duration) {
        if let Some(node) = self.nodes().get_mut(&handle) {
            node.moves.push(y);
        }
    }

    fn show_remaining(&self, handle: VisualHandle, remaining: u32) {
        if let Some(node) = self.nodes().get_mut(&handle) {
            node.remaining = Some(remaining);
        }
    }

    fn show_note(&self, handle: VisualHandle, note: Option<&MusicalNote>) {
        if let Some(node) = self.nodes().get_mut(&handle) {
            node.note = note.copied();
        }
    }

    fn play_removal(&self, handle: VisualHandle) -> oneshot::Receiver<()> {
        if let Some(node) = self.nodes().get_mut(&handle) {
            node.removal_started = true;
        }

        let (tx, rx) = oneshot::channel();
        match self.removal_duration {
            Some(duration) => {
                tokio::spawn(async move {
                    tokio::time::sleep(duration).await;
                    let _ = tx.send(());
                });
            }
            None => self
                .stalled
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(tx),
        }
        rx
    }

    fn detach(&self, handle: VisualHandle) {
        if let Some(node) = self.nodes().get_mut(&handle) {
            node.attached = false;
        }
    }

    fn is_attached(&self, handle: VisualHandle) -> bool {
        self.nodes().get(&handle).is_some_and(|n| n.attached)
    }
}

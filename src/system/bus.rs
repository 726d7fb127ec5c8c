//! Channels between the input side, the engine and the scoring/UI side.
//!
//! The `EngineBus` carries pitch input towards the engine and engine events
//! back out, over crossbeam channels so either end can live on its own thread.

use crate::input::events::InputEvent;
use crate::models::block::BlockId;
use crate::models::note::MusicalNote;
use crate::models::style::StyleId;
use crossbeam_channel::{Receiver, Sender, unbounded};

/// Events the engine publishes for scoring and UI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A block entered the queue.
    BlockSpawned {
        id: BlockId,
        note: Option<MusicalNote>,
        style: StyleId,
    },
    /// An accepted hit moved a block closer to completion.
    BlockProgress { id: BlockId, remaining_hits: u32 },
    /// The frontmost block lost its progress.
    ProgressReset { id: BlockId },
    /// A block reached its requirements and finished its removal.
    BlockCompleted {
        id: BlockId,
        note: Option<MusicalNote>,
        style: StyleId,
    },
    /// A block left the queue through a forced removal.
    BlockRemoved { id: BlockId },
    /// A block crossed the danger limit.
    DangerLimitReached,
    /// Processing was stuck and got force-cleared.
    ProcessingTimedOut,
}

#[derive(Clone)]
pub struct EngineBus {
    /// Input → Engine: pitch events.
    pub input_tx: Sender<InputEvent>,
    pub input_rx: Receiver<InputEvent>,

    /// Engine → Scoring/UI.
    pub event_tx: Sender<EngineEvent>,
    pub event_rx: Receiver<EngineEvent>,
}

impl EngineBus {
    pub fn new() -> Self {
        let (input_tx, input_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        Self {
            input_tx,
            input_rx,
            event_tx,
            event_rx,
        }
    }

    /// Publishes an event. Nobody listening is not an error.
    pub fn emit(&self, event: EngineEvent) {
        if self.event_tx.send(event).is_err() {
            log::trace!("BUS: Event dropped, no receiver");
        }
    }

    /// Drains every event published so far.
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        self.event_rx.try_iter().collect()
    }
}

impl Default for EngineBus {
    fn default() -> Self {
        Self::new()
    }
}

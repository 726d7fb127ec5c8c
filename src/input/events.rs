use crate::models::note::MusicalNote;
use tokio::time::Instant;

/// Output of the (external) pitch detector, as the engine consumes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// The detector already decided the player matched the frontmost note.
    Matched { at: Instant },
    /// The player produced `note`; it counts only if it matches the frontmost block.
    Sung { note: MusicalNote, at: Instant },
    /// The player stopped or drifted off the note.
    Lost,
}

//! Block lifecycle and progression engine for a sing-the-note game.
//!
//! Blocks carrying a musical note are spawned at a shrinking interval into a
//! bounded queue, advanced by pitch-match events and removed through an
//! animation raced against a safety timer. The visual layer, the level
//! configuration and the pitch detector are plugged in from outside.

pub mod input;
pub mod logic;
pub mod models;
pub mod shared;
pub mod system;

pub use logic::engine::BlocksEngine;
pub use models::level::{ConfigError, LevelBook, LevelConfig, LevelConfigSource};
pub use models::note::{MusicalNote, ParseError};
pub use models::settings::EngineSettings;
pub use system::bus::{EngineBus, EngineEvent};
pub use system::visuals::{BlockVisuals, HeadlessVisuals};

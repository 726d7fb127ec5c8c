//! Plain data: notes, styles, level configuration, blocks and settings.

pub mod block;
pub mod common;
pub mod level;
pub mod note;
pub mod settings;
pub mod style;

//! Block styles: requirement thresholds and special behaviors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of a style in the level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleId(pub String);

impl StyleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StyleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StyleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Optional special behavior of a style.
///
/// Ghost and explosive only change how the block is drawn. Changing blocks
/// redraw their note from the style's pool while they fall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialBehavior {
    Ghost,
    Changing,
    Explosive,
}

/// How a block of this style accumulates progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Every accepted hit counts once.
    Hits,
    /// Each hit is earned by holding the note for `required_time`.
    Hold,
}

/// Runtime description of a style, resolved from the level configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStyle {
    pub id: StyleId,
    pub required_hits: u32,
    pub required_time: Duration,
    pub weight: Option<f64>,
    pub special: Option<SpecialBehavior>,
    /// Unparsed note tokens; parsed on every draw.
    pub note_pool: Vec<String>,
}

impl BlockStyle {
    pub const PLACEHOLDER_ID: &'static str = "default";

    /// Style used when the configured ones cannot produce a block.
    pub fn placeholder() -> Self {
        Self {
            id: StyleId::new(Self::PLACEHOLDER_ID),
            required_hits: 1,
            required_time: Duration::ZERO,
            weight: None,
            special: None,
            note_pool: Vec::new(),
        }
    }

    pub fn progress_mode(&self) -> ProgressMode {
        if self.required_time.is_zero() {
            ProgressMode::Hits
        } else {
            ProgressMode::Hold
        }
    }

    pub fn is_changing(&self) -> bool {
        self.special == Some(SpecialBehavior::Changing)
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.as_str() == Self::PLACEHOLDER_ID && self.note_pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_mode() {
        let mut style = BlockStyle::placeholder();
        assert_eq!(style.progress_mode(), ProgressMode::Hits);
        style.required_time = Duration::from_millis(800);
        assert_eq!(style.progress_mode(), ProgressMode::Hold);
    }

    #[test]
    fn test_special_behavior_names() {
        #[derive(Deserialize)]
        struct Holder {
            special: SpecialBehavior,
        }

        let parsed: Holder = toml::from_str("special = \"changing\"").unwrap();
        assert_eq!(parsed.special, SpecialBehavior::Changing);
    }
}

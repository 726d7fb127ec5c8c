//! Level configuration: allowed styles, note pools and falling speed.
//!
//! A level book is a TOML file holding a shared style table and a list of
//! numbered levels:
//!
//! ```toml
//! [styles.basic]
//! note_pool = ["do4", "re4", "mi4"]
//! required_hits = 1
//!
//! [styles.long]
//! note_pool = ["sol4"]
//! required_hits = 2
//! required_time_ms = 800
//! weight = 0.5
//! special = "changing"
//!
//! [[levels]]
//! number = 1
//! allowed_styles = ["basic", "long"]
//! falling_speed = { initial_ms = 4000, decrement_ms = 100 }
//! ```

use super::common::load_toml;
use super::note::ParseError;
use super::style::{BlockStyle, SpecialBehavior, StyleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("level {0} is not defined")]
    UnknownLevel(u32),
    #[error("style {0} is not defined")]
    UnknownStyle(StyleId),
    #[error("style {0} is invalid: {1}")]
    InvalidStyle(StyleId, String),
    #[error("level allows no styles")]
    EmptyStyleSet,
    #[error("style {0} has an empty note pool")]
    EmptyNotePool(StyleId),
    #[error("style weights cannot form a distribution")]
    InvalidWeights,
    #[error("invalid note: {0}")]
    InvalidNote(#[from] ParseError),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Spawn-rate parameters of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallingSpeed {
    pub initial_ms: u64,
    pub decrement_ms: u64,
}

impl FallingSpeed {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn decrement(&self) -> Duration {
        Duration::from_millis(self.decrement_ms)
    }
}

impl Default for FallingSpeed {
    fn default() -> Self {
        Self {
            initial_ms: 4000,
            decrement_ms: 100,
        }
    }
}

/// One entry of the style table, as written in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleConfig {
    pub note_pool: Vec<String>,
    #[serde(default = "default_required_hits")]
    pub required_hits: u32,
    #[serde(default)]
    pub required_time_ms: u64,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub special: Option<SpecialBehavior>,
}

fn default_required_hits() -> u32 {
    1
}

impl StyleConfig {
    /// Validates the entry and resolves it into a runtime style.
    pub fn resolve(&self, id: &StyleId) -> Result<BlockStyle, ConfigError> {
        if self.required_hits == 0 {
            return Err(ConfigError::InvalidStyle(
                id.clone(),
                "required_hits must be at least 1".into(),
            ));
        }

        Ok(BlockStyle {
            id: id.clone(),
            required_hits: self.required_hits,
            required_time: Duration::from_millis(self.required_time_ms),
            weight: self.weight,
            special: self.special,
            note_pool: self.note_pool.clone(),
        })
    }
}

/// What the engine needs to know about the active level.
pub trait LevelConfigSource: Send + Sync {
    /// Styles that may spawn in this level, in declaration order.
    fn allowed_styles(&self) -> Vec<StyleId>;

    /// Resolves one style. Fails for unknown or invalid entries.
    fn style(&self, id: &StyleId) -> Result<BlockStyle, ConfigError>;

    fn falling_speed(&self) -> FallingSpeed;
}

/// A fully resolved level: its own styles plus the falling speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    pub number: u32,
    pub allowed_styles: Vec<StyleId>,
    #[serde(default)]
    pub styles: BTreeMap<StyleId, StyleConfig>,
    #[serde(default)]
    pub falling_speed: FallingSpeed,
}

impl LevelConfigSource for LevelConfig {
    fn allowed_styles(&self) -> Vec<StyleId> {
        self.allowed_styles.clone()
    }

    fn style(&self, id: &StyleId) -> Result<BlockStyle, ConfigError> {
        self.styles
            .get(id)
            .ok_or_else(|| ConfigError::UnknownStyle(id.clone()))?
            .resolve(id)
    }

    fn falling_speed(&self) -> FallingSpeed {
        self.falling_speed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelEntry {
    pub number: u32,
    pub allowed_styles: Vec<StyleId>,
    #[serde(default)]
    pub falling_speed: FallingSpeed,
}

/// Every level of the game, sharing one style table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelBook {
    #[serde(default)]
    pub styles: BTreeMap<StyleId, StyleConfig>,
    #[serde(default)]
    pub levels: Vec<LevelEntry>,
}

impl LevelBook {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let book: LevelBook = load_toml(path)?;
        log::info!(
            "CONFIG: Loaded {} levels and {} styles from {}",
            book.levels.len(),
            book.styles.len(),
            path.display()
        );
        Ok(book)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolves one level, copying only the styles it allows.
    ///
    /// Styles missing from the table are kept out of the copy; the engine
    /// reports them as `UnknownStyle` when they are drawn.
    pub fn level(&self, number: u32) -> Result<LevelConfig, ConfigError> {
        let entry = self
            .levels
            .iter()
            .find(|l| l.number == number)
            .ok_or(ConfigError::UnknownLevel(number))?;

        let styles = entry
            .allowed_styles
            .iter()
            .filter_map(|id| self.styles.get(id).map(|s| (id.clone(), s.clone())))
            .collect();

        Ok(LevelConfig {
            number,
            allowed_styles: entry.allowed_styles.clone(),
            styles,
            falling_speed: entry.falling_speed,
        })
    }

    /// Built-in book used when no level file is available.
    pub fn builtin() -> Self {
        let mut styles = BTreeMap::new();
        styles.insert(
            StyleId::new("basic"),
            StyleConfig {
                note_pool: ["do4", "re4", "mi4", "fa4", "sol4"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                required_hits: 1,
                required_time_ms: 0,
                weight: Some(3.0),
                special: None,
            },
        );
        styles.insert(
            StyleId::new("double"),
            StyleConfig {
                note_pool: ["la4", "si4", "do5"].iter().map(|s| s.to_string()).collect(),
                required_hits: 2,
                required_time_ms: 0,
                weight: Some(1.0),
                special: Some(SpecialBehavior::Ghost),
            },
        );
        styles.insert(
            StyleId::new("hold"),
            StyleConfig {
                note_pool: ["sol4", "la4"].iter().map(|s| s.to_string()).collect(),
                required_hits: 1,
                required_time_ms: 1000,
                weight: Some(1.0),
                special: Some(SpecialBehavior::Changing),
            },
        );

        Self {
            styles,
            levels: vec![
                LevelEntry {
                    number: 1,
                    allowed_styles: vec![StyleId::new("basic")],
                    falling_speed: FallingSpeed::default(),
                },
                LevelEntry {
                    number: 2,
                    allowed_styles: vec![
                        StyleId::new("basic"),
                        StyleId::new("double"),
                        StyleId::new("hold"),
                    ],
                    falling_speed: FallingSpeed {
                        initial_ms: 3500,
                        decrement_ms: 150,
                    },
                },
            ],
        }
    }
}

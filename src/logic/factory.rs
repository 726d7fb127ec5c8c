//! Draws the style and note of the next block from the level configuration.

use crate::models::level::{ConfigError, LevelConfigSource};
use crate::models::note::{self, MusicalNote};
use crate::models::style::BlockStyle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// What a new block is made of, before it gets an id and a visual.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockBlueprint {
    pub style: Arc<BlockStyle>,
    pub note: Option<MusicalNote>,
}

impl BlockBlueprint {
    pub fn placeholder() -> Self {
        Self {
            style: Arc::new(BlockStyle::placeholder()),
            note: None,
        }
    }
}

pub struct BlockFactory {
    rng: StdRng,
}

impl BlockFactory {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    /// Draws a style, then a note from that style's pool.
    pub fn draw(&mut self, level: &dyn LevelConfigSource) -> Result<BlockBlueprint, ConfigError> {
        let ids = level.allowed_styles();
        if ids.is_empty() {
            return Err(ConfigError::EmptyStyleSet);
        }

        let mut styles: Vec<Result<BlockStyle, ConfigError>> =
            ids.iter().map(|id| level.style(id)).collect();
        let index = self.pick_style(&styles)?;
        let style = styles.swap_remove(index)?;

        let note = self.draw_note(&style)?;
        Ok(BlockBlueprint {
            style: Arc::new(style),
            note: Some(note),
        })
    }

    /// Like [`BlockFactory::draw`], degrading to the placeholder block on any
    /// configuration problem.
    pub fn draw_or_placeholder(&mut self, level: &dyn LevelConfigSource) -> BlockBlueprint {
        match self.draw(level) {
            Ok(blueprint) => blueprint,
            Err(e) => {
                log::warn!("SPAWN: {}, spawning placeholder block", e);
                BlockBlueprint::placeholder()
            }
        }
    }

    /// Uniform draw from the style's note pool.
    pub fn draw_note(&mut self, style: &BlockStyle) -> Result<MusicalNote, ConfigError> {
        if style.note_pool.is_empty() {
            return Err(ConfigError::EmptyNotePool(style.id.clone()));
        }
        let token = &style.note_pool[self.rng.random_range(0..style.note_pool.len())];
        Ok(note::parse(token)?)
    }

    /// Uniform unless some style declares a weight; styles without one then
    /// weigh 1.0. Styles that failed to resolve stay in the draw so a bad
    /// entry only costs its own share of spawns.
    fn pick_style(&mut self, styles: &[Result<BlockStyle, ConfigError>]) -> Result<usize, ConfigError> {
        let weighted = styles
            .iter()
            .any(|s| s.as_ref().is_ok_and(|s| s.weight.is_some()));
        if !weighted {
            return Ok(self.rng.random_range(0..styles.len()));
        }

        let weights: Vec<f64> = styles
            .iter()
            .map(|s| s.as_ref().ok().and_then(|s| s.weight).unwrap_or(1.0))
            .collect();
        let sample: f64 = self.rng.random();
        pick_weighted(&weights, sample).ok_or(ConfigError::InvalidWeights)
    }
}

/// Maps a uniform sample in `[0, 1)` onto the cumulative distribution of
/// `weights`.
///
/// `None` when a weight is negative or not finite, or when they sum to zero.
pub fn pick_weighted(weights: &[f64], sample: f64) -> Option<usize> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return None;
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let target = sample.clamp(0.0, 1.0) * total;
    let mut cumulative = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if target < cumulative {
            return Some(index);
        }
    }
    // Rounding can leave `target` at the very top; fall back to the last
    // style that can be drawn at all.
    weights.iter().rposition(|w| *w > 0.0)
}

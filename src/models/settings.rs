//! Engine tuning: capacity, guard windows, layout and spawn pacing.

use super::common::load_toml;
use super::level::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine-wide settings. Durations are stored in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum number of blocks alive at once.
    pub capacity: usize,
    /// Debounce window between two accepted hits.
    pub min_hit_interval_ms: u64,
    /// Processing is force-cleared after this long.
    pub processing_timeout_ms: u64,
    /// Safety timer racing the removal animation.
    pub removal_timeout_ms: u64,
    /// Delay before the first spawn attempt after `start()`.
    pub initial_spawn_delay_ms: u64,
    /// The spawn interval never drops below this.
    pub spawn_interval_floor_ms: u64,

    /// Y coordinate (growing downwards) where new blocks appear.
    pub spawn_origin_y: f32,
    /// Target y of the block at index 0.
    pub first_slot_y: f32,
    pub slot_spacing: f32,
    /// Distance the newest block must travel before another can spawn.
    pub min_spawn_clearance: f32,
    /// Blocks below this y put the player in danger.
    pub danger_limit_y: f32,
    pub reflow_duration_ms: u64,

    /// Cadence of note changes for "changing" blocks.
    pub note_change_interval_ms: u64,
    /// Fixed seed for style/note draws. Random when unset.
    pub rng_seed: Option<u64>,
}

impl EngineSettings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    pub fn min_hit_interval(&self) -> Duration {
        Duration::from_millis(self.min_hit_interval_ms)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_millis(self.processing_timeout_ms)
    }

    pub fn removal_timeout(&self) -> Duration {
        Duration::from_millis(self.removal_timeout_ms)
    }

    pub fn initial_spawn_delay(&self) -> Duration {
        Duration::from_millis(self.initial_spawn_delay_ms)
    }

    pub fn spawn_interval_floor(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_floor_ms)
    }

    pub fn reflow_duration(&self) -> Duration {
        Duration::from_millis(self.reflow_duration_ms)
    }

    pub fn note_change_interval(&self) -> Duration {
        Duration::from_millis(self.note_change_interval_ms)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            capacity: 6,
            min_hit_interval_ms: 500,
            processing_timeout_ms: 2000,
            removal_timeout_ms: 1000,
            initial_spawn_delay_ms: 1000,
            spawn_interval_floor_ms: 1500,
            spawn_origin_y: 0.0,
            first_slot_y: 120.0,
            slot_spacing: 90.0,
            min_spawn_clearance: 80.0,
            danger_limit_y: 560.0,
            reflow_duration_ms: 400,
            note_change_interval_ms: 3000,
            rng_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: EngineSettings =
            toml::from_str("capacity = 5\nrng_seed = 42\nremoval_timeout_ms = 750").unwrap();
        assert_eq!(settings.capacity, 5);
        assert_eq!(settings.rng_seed, Some(42));
        assert_eq!(settings.removal_timeout(), Duration::from_millis(750));
        assert_eq!(settings.min_hit_interval(), Duration::from_millis(500));
        assert_eq!(settings.processing_timeout(), Duration::from_secs(2));
        assert_eq!(settings.spawn_interval_floor(), Duration::from_millis(1500));
    }
}

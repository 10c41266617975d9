//! Manager configuration.
//!
//! Defaults match production behavior; embedders (and simulator scenario
//! files) can override individual fields.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the video manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Visibility ratio at or above which a video counts as visible for
    /// autoplay and fullscreen ranking purposes.
    #[serde(default = "default_autoplay_min_visibility")]
    pub autoplay_min_visibility: f64,

    /// Interval of the shared seconds-played ticker.
    #[serde(default = "default_seconds_played_interval_ms")]
    pub seconds_played_interval_ms: u64,

    /// Percentage milestone granularity (milestones are multiples of this).
    #[serde(default = "default_percentage_interval")]
    pub percentage_interval: u32,

    /// Re-check frequency for paused videos and videos without a usable
    /// duration.
    #[serde(default = "default_percentage_frequency_when_paused_ms")]
    pub percentage_frequency_when_paused_ms: u64,

    /// Lower clamp for the duration-adaptive milestone tick frequency.
    #[serde(default = "default_percentage_frequency_min_ms")]
    pub percentage_frequency_min_ms: u64,

    /// Upper clamp for the duration-adaptive milestone tick frequency.
    #[serde(default = "default_percentage_frequency_max_ms")]
    pub percentage_frequency_max_ms: u64,

    /// Durations at or below this many seconds are treated as "not yet
    /// available" (a 1s duration is a common livestream placeholder).
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: f64,

    /// Visibility-ratio tolerance when ranking fullscreen candidates;
    /// within it the better-centered video wins.
    #[serde(default = "default_fullscreen_ranking_tolerance")]
    pub fullscreen_ranking_tolerance: f64,

    /// Settle delay after an orientation change before layout is measured
    /// for scroll adjustment.
    #[serde(default = "default_orientation_settle_ms")]
    pub orientation_settle_ms: u64,
}

fn default_autoplay_min_visibility() -> f64 {
    0.5
}

fn default_seconds_played_interval_ms() -> u64 {
    1000
}

fn default_percentage_interval() -> u32 {
    5
}

fn default_percentage_frequency_when_paused_ms() -> u64 {
    500
}

fn default_percentage_frequency_min_ms() -> u64 {
    250
}

fn default_percentage_frequency_max_ms() -> u64 {
    4000
}

fn default_min_duration_secs() -> f64 {
    1.0
}

fn default_fullscreen_ranking_tolerance() -> f64 {
    0.1
}

fn default_orientation_settle_ms() -> u64 {
    330
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            autoplay_min_visibility: default_autoplay_min_visibility(),
            seconds_played_interval_ms: default_seconds_played_interval_ms(),
            percentage_interval: default_percentage_interval(),
            percentage_frequency_when_paused_ms: default_percentage_frequency_when_paused_ms(),
            percentage_frequency_min_ms: default_percentage_frequency_min_ms(),
            percentage_frequency_max_ms: default_percentage_frequency_max_ms(),
            min_duration_secs: default_min_duration_secs(),
            fullscreen_ranking_tolerance: default_fullscreen_ranking_tolerance(),
            orientation_settle_ms: default_orientation_settle_ms(),
        }
    }
}

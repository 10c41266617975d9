//! Scenario file format.
//!
//! A scenario is a TOML document describing the simulated environment,
//! the videos on the page and a timeline of steps to drive through the
//! manager.

use marquee_common::{Orientation, Platform, Signal, VideoEvent};
use marquee_manager::ManagerConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Whether the simulated environment allows muted autoplay.
    #[serde(default = "default_true")]
    pub autoplay_supported: bool,

    #[serde(default = "default_true")]
    pub document_visible: bool,

    #[serde(default)]
    pub platform: Platform,

    #[serde(default)]
    pub viewport: ViewportSpec,

    /// Manager tuning overrides; omitted fields keep production defaults.
    #[serde(default)]
    pub config: ManagerConfig,

    #[serde(default)]
    pub videos: Vec<VideoSpec>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ViewportSpec {
    #[serde(default = "default_viewport_width")]
    pub width: f64,
    #[serde(default = "default_viewport_height")]
    pub height: f64,
}

impl Default for ViewportSpec {
    fn default() -> Self {
        Self {
            width: default_viewport_width(),
            height: default_viewport_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoSpec {
    pub id: String,

    #[serde(default)]
    pub autoplay: bool,

    /// Whether the video exposes user-facing controls.
    #[serde(default = "default_true")]
    pub interactive: bool,

    #[serde(default)]
    pub rotate_to_fullscreen: bool,

    #[serde(default)]
    pub no_audio: bool,

    /// Duration in seconds; omit for a video whose metadata never loads.
    pub duration: Option<f64>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default = "default_video_top")]
    pub top: f64,

    #[serde(default)]
    pub left: f64,

    #[serde(default = "default_video_width")]
    pub width: f64,

    #[serde(default = "default_video_height")]
    pub height: f64,
}

/// One timeline entry: what to do and when, relative to scenario start.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: StepAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum StepAction {
    /// Deliver a player lifecycle event.
    Event { video: String, event: VideoEvent },
    /// Report a new intersection ratio for a video.
    Visibility { video: String, ratio: f64 },
    /// Invoke a page-level action by name (play, pause, mute, unmute,
    /// fullscreen).
    Action { video: String, action: String },
    /// Rotate the simulated device.
    Orientation { orientation: Orientation },
    /// Raise a one-shot signal.
    Signal { video: String, signal: Signal },
}

fn default_true() -> bool {
    true
}

fn default_viewport_width() -> f64 {
    412.0
}

fn default_viewport_height() -> f64 {
    732.0
}

fn default_video_top() -> f64 {
    100.0
}

fn default_video_width() -> f64 {
    412.0
}

fn default_video_height() -> f64 {
    232.0
}

//! Common types for Marquee.
//!
//! This crate defines the host-facing contract shared between the manager
//! library (`marquee-manager`) and embedders such as the scenario simulator
//! (`marquee-sim`): the [`VideoPlayer`] trait that playback integrations
//! implement, the [`VideoEvent`] stream they report, and the analytics
//! events the manager emits back.
//!
//! # Event flow
//!
//! The host forwards player lifecycle events ([`VideoEvent`]) and viewport
//! visibility ratios into the manager; the manager reacts by calling back
//! into the [`VideoPlayer`] control surface (play/pause/mute/...) and by
//! emitting [`AnalyticsEvent`] records on its sink channel.
//!
//! # Examples
//!
//! ```
//! use marquee_common::{VideoAction, VideoEvent};
//!
//! // Page-level actions are parsed from their public names.
//! assert_eq!(VideoAction::parse("fullscreen"), Some(VideoAction::FullscreenEnter));
//!
//! // Events serialize for scenario files and logs.
//! let json = serde_json::to_string(&VideoEvent::Playing).unwrap();
//! assert_eq!(json, "\"playing\"");
//! ```

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the manager's public API.
///
/// All errors are serializable so the simulator can report them in its
/// JSON output.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum VideoError {
    #[error("no video registered under id {0}")]
    NotRegistered(String),

    #[error("seeking is not supported by this player")]
    SeekNotSupported,

    #[error("video {0} requires controls (interactive playback) for rotate-to-fullscreen")]
    FullscreenRequiresControls(String),

    #[error("scenario error: {0}")]
    Scenario(String),
}

/// Handle identifying a registered video inside a manager instance.
///
/// Ids are allocated by the manager at registration time and stay valid
/// until the manager is disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VideoId(pub u64);

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Playback state of a registered video as derived by the manager.
///
/// "Playing" is split by who initiated it: autoplay-initiated playback
/// keeps reporting [`PlayingState::PlayingAuto`] until the user interacts
/// with the video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayingState {
    Paused,
    PlayingAuto,
    PlayingManual,
}

impl PlayingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::PlayingAuto => "playing_auto",
            Self::PlayingManual => "playing_manual",
        }
    }
}

/// Lifecycle events reported by a player integration to the manager.
///
/// The host is responsible for translating whatever its underlying player
/// raises (media element events, SDK callbacks, scripted scenario steps)
/// into these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoEvent {
    /// The video element finished loading and is ready for playback.
    Load,
    /// Media metadata (notably the duration) became available.
    LoadedMetadata,
    /// A play request was observed (playback may not have started yet).
    Play,
    /// Playback actually started or resumed.
    Playing,
    Pause,
    Ended,
    Muted,
    Unmuted,
    /// An ad roll started; overlay decorations are hidden for its duration.
    AdStart,
    AdEnd,
    /// The element was torn down and rebuilt; treated like a fresh load.
    Reload,
    /// Player-defined analytics tick. Ignored when `event_type` is absent.
    CustomTick {
        event_type: Option<String>,
        #[serde(default)]
        vars: BTreeMap<String, String>,
    },
}

/// One-shot signals tracked per registered video.
///
/// Signals latch: once raised they stay raised, and waiters that subscribe
/// after the fact resolve immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// The video was accepted by the manager.
    Registered,
    /// The user interacted with the video (tap, action invocation, unmute).
    UserInteracted,
    /// An external component took over playback management.
    PlaybackDelegated,
}

/// Page-level actions the manager registers for every video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoAction {
    Play,
    Pause,
    Mute,
    Unmute,
    FullscreenEnter,
}

impl VideoAction {
    /// Parses an action from its public name. `"fullscreen"` is the
    /// user-facing alias for [`VideoAction::FullscreenEnter`].
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "mute" => Some(Self::Mute),
            "unmute" => Some(Self::Unmute),
            "fullscreen" | "fullscreen_enter" | "fullscreenenter" => Some(Self::FullscreenEnter),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::FullscreenEnter => "fullscreen",
        }
    }
}

/// Kinds of analytics events emitted on the manager's sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyticsEventKind {
    #[serde(rename = "video-play")]
    Play,
    #[serde(rename = "video-pause")]
    Pause,
    #[serde(rename = "video-ended")]
    Ended,
    /// A playback session (play to pause/end) concluded.
    #[serde(rename = "video-session")]
    Session,
    /// A visibility session (visible playback interval) concluded.
    #[serde(rename = "video-session-visible")]
    SessionVisible,
    #[serde(rename = "video-seconds-played")]
    SecondsPlayed,
    #[serde(rename = "video-percentage-played")]
    PercentagePlayed,
    #[serde(rename = "video-ad-start")]
    AdStart,
    #[serde(rename = "video-ad-end")]
    AdEnd,
    /// Player-defined event forwarded from [`VideoEvent::CustomTick`].
    #[serde(rename = "video-custom")]
    Custom,
    /// Fired once per video, on the first user-initiated playback.
    #[serde(rename = "video-first-play")]
    FirstPlay,
    /// Per-second progress event carrying `time` and `percent` vars.
    #[serde(rename = "video-time-update")]
    TimeUpdate,
}

impl AnalyticsEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "video-play",
            Self::Pause => "video-pause",
            Self::Ended => "video-ended",
            Self::Session => "video-session",
            Self::SessionVisible => "video-session-visible",
            Self::SecondsPlayed => "video-seconds-played",
            Self::PercentagePlayed => "video-percentage-played",
            Self::AdStart => "video-ad-start",
            Self::AdEnd => "video-ad-end",
            Self::Custom => "video-custom",
            Self::FirstPlay => "video-first-play",
            Self::TimeUpdate => "video-time-update",
        }
    }
}

/// Analytics record emitted by the manager.
///
/// `vars` always contains the standard details snapshot of the source
/// video (autoplay, currentTime, duration, width, height, id, muted,
/// playedTotal, playedRangesJson, state) plus event-specific entries such
/// as `normalizedPercentage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub kind: AnalyticsEventKind,
    /// The player-reported id of the source video.
    pub video_id: String,
    pub time: DateTime<Utc>,
    pub vars: BTreeMap<String, String>,
}

/// Media metadata used for media-session integration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub artwork: Vec<String>,
}

/// Viewport-relative layout box of a video element, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutRect {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    /// Vertical center, used by the auto-fullscreen ranking.
    pub fn center_y(&self) -> f64 {
        self.top + self.height / 2.0
    }
}

/// Host viewport dimensions, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// Device orientation as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Where to align a rect when scrolling it into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollPosition {
    Top,
    Bottom,
    Center,
}

/// Coarse platform flags the auto-fullscreen manager branches on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub android: bool,
    #[serde(default)]
    pub chrome: bool,
    #[serde(default)]
    pub ios: bool,
    #[serde(default)]
    pub safari: bool,
}

/// Optional cosmetic hooks for the autoplay overlay decorations.
///
/// When a muted autoplay video is installed the manager asks the player to
/// render an animated equalizer icon and, for interactive videos, a click
/// mask that captures the first tap. Hosts without a visual surface can
/// rely on the no-op defaults.
pub trait AutoplayUi {
    /// Installs the icon (and the click mask when `interactive`).
    fn install_autoplay_overlay(&self, _interactive: bool) {}

    /// Removes everything installed by `install_autoplay_overlay`.
    fn remove_autoplay_overlay(&self) {}

    /// Toggles the equalizer icon animation.
    fn set_autoplay_icon_playing(&self, _playing: bool) {}

    /// Hides or restores the overlay, used while an ad roll plays.
    fn set_autoplay_overlay_hidden(&self, _hidden: bool) {}
}

/// A playback integration the manager can coordinate.
///
/// Control methods are fire-and-forget: the player confirms outcomes by
/// reporting [`VideoEvent`]s back through the host. Implementations must
/// be callable from any thread; interior mutability is the player's
/// concern.
pub trait VideoPlayer: AutoplayUi + Send + Sync {
    /// Player-chosen stable identifier, reported in analytics.
    fn id(&self) -> &str;

    /// Whether this integration works on the current platform at all.
    /// Unsupported players are skipped by the manager (actions still work).
    fn supports_platform(&self) -> bool {
        true
    }

    /// Whether the video exposes user-facing controls.
    fn is_interactive(&self) -> bool;

    /// The video wants to start playing once sufficiently visible.
    fn has_autoplay(&self) -> bool {
        false
    }

    /// The video opts into fullscreen-on-landscape-rotation.
    fn has_rotate_to_fullscreen(&self) -> bool {
        false
    }

    /// The video declares it has no audio track, so no unmute affordance
    /// is needed during autoplay.
    fn has_no_audio(&self) -> bool {
        false
    }

    /// The underlying element is a native video surface (as opposed to a
    /// third-party embed in a frame).
    fn is_native_video(&self) -> bool {
        true
    }

    /// The integration manages the media session itself.
    fn preimplements_media_session(&self) -> bool {
        false
    }

    /// The integration manages rotate-to-fullscreen itself.
    fn preimplements_auto_fullscreen(&self) -> bool {
        false
    }

    /// Embeds that can enter fullscreen through their own player API even
    /// where the host cannot fullscreen arbitrary frames.
    fn has_fullscreen_api(&self) -> bool {
        true
    }

    /// Starts playback. `auto` is true when triggered by the autoplay
    /// policy rather than a user action.
    fn play(&self, auto: bool);

    fn pause(&self);

    fn mute(&self);

    fn unmute(&self);

    fn show_controls(&self);

    fn hide_controls(&self);

    fn fullscreen_enter(&self);

    fn fullscreen_exit(&self);

    fn is_fullscreen(&self) -> bool;

    /// Current playhead position in seconds.
    fn current_time(&self) -> f64;

    /// Duration in seconds. NaN, infinite or `<= 1.0` values are treated
    /// by the manager as "not yet available".
    fn duration(&self) -> f64;

    /// Played intervals as `(start, end)` pairs in seconds.
    fn played_ranges(&self) -> Vec<(f64, f64)> {
        Vec::new()
    }

    fn metadata(&self) -> Option<VideoMetadata> {
        None
    }

    /// Seeks to `seconds`. Players without seek support return
    /// [`VideoError::SeekNotSupported`].
    fn seek_to(&self, seconds: f64) -> Result<(), VideoError> {
        let _ = seconds;
        Err(VideoError::SeekNotSupported)
    }

    /// Viewport-relative layout box, used for fullscreen ranking and the
    /// analytics width/height vars.
    fn layout_rect(&self) -> LayoutRect;
}

/// The manager's window onto the embedding environment.
///
/// Implemented by the host; the manager only ever holds it behind an
/// `Arc<dyn HostEnvironment>`.
#[async_trait]
pub trait HostEnvironment: Send + Sync {
    /// Probes whether muted autoplay is allowed. Probe failures should be
    /// reported as `false`; the manager caches the first result.
    async fn supports_muted_autoplay(&self) -> bool;

    fn platform(&self) -> Platform;

    fn viewport(&self) -> Viewport;

    /// Whether the embedding document itself is visible (tab in
    /// foreground). Visibility transitions are ignored while hidden.
    fn is_document_visible(&self) -> bool;

    /// Scrolls the given rect into view with the requested alignment.
    fn scroll_into_view(&self, rect: LayoutRect, pos: ScrollPosition);

    /// Surfaces the metadata of the manually-playing video to the
    /// platform media session. Hosts without one can keep the no-op
    /// default.
    fn update_media_session(&self, metadata: VideoMetadata) {
        let _ = metadata;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_event_roundtrip() {
        let events = vec![
            VideoEvent::Load,
            VideoEvent::LoadedMetadata,
            VideoEvent::Play,
            VideoEvent::Playing,
            VideoEvent::Pause,
            VideoEvent::Ended,
            VideoEvent::Muted,
            VideoEvent::Unmuted,
            VideoEvent::AdStart,
            VideoEvent::AdEnd,
            VideoEvent::Reload,
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let back: VideoEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn test_custom_tick_roundtrip() {
        let mut vars = BTreeMap::new();
        vars.insert("loops".to_string(), "3".to_string());

        let event = VideoEvent::CustomTick {
            event_type: Some("loop".to_string()),
            vars,
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: VideoEvent = serde_json::from_str(&json).unwrap();

        match back {
            VideoEvent::CustomTick { event_type, vars } => {
                assert_eq!(event_type.as_deref(), Some("loop"));
                assert_eq!(vars.get("loops").map(String::as_str), Some("3"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(VideoAction::parse("play"), Some(VideoAction::Play));
        assert_eq!(VideoAction::parse("Pause"), Some(VideoAction::Pause));
        assert_eq!(VideoAction::parse("mute"), Some(VideoAction::Mute));
        assert_eq!(VideoAction::parse("unmute"), Some(VideoAction::Unmute));
        assert_eq!(
            VideoAction::parse("fullscreen"),
            Some(VideoAction::FullscreenEnter)
        );
        assert_eq!(VideoAction::parse("dock"), None);
    }

    #[test]
    fn test_action_names_parse_back() {
        for action in [
            VideoAction::Play,
            VideoAction::Pause,
            VideoAction::Mute,
            VideoAction::Unmute,
            VideoAction::FullscreenEnter,
        ] {
            assert_eq!(VideoAction::parse(action.name()), Some(action));
        }
    }

    #[test]
    fn test_analytics_kind_strings() {
        // The serialized form must match `as_str` so log output and JSON
        // output agree.
        for kind in [
            AnalyticsEventKind::Play,
            AnalyticsEventKind::Session,
            AnalyticsEventKind::SessionVisible,
            AnalyticsEventKind::SecondsPlayed,
            AnalyticsEventKind::PercentagePlayed,
            AnalyticsEventKind::Custom,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_layout_rect_helpers() {
        let rect = LayoutRect {
            top: 100.0,
            left: 20.0,
            width: 300.0,
            height: 200.0,
        };

        assert_eq!(rect.bottom(), 300.0);
        assert_eq!(rect.right(), 320.0);
        assert_eq!(rect.center_y(), 200.0);
    }

    #[test]
    fn test_analytics_event_serialization() {
        let mut vars = BTreeMap::new();
        vars.insert("state".to_string(), "playing_manual".to_string());

        let event = AnalyticsEvent {
            kind: AnalyticsEventKind::Pause,
            video_id: "hero".to_string(),
            time: Utc::now(),
            vars,
        };

        let json = serde_json::to_string(&event).unwrap();
        let back: AnalyticsEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, AnalyticsEventKind::Pause);
        assert_eq!(back.video_id, "hero");
        assert_eq!(
            back.vars.get("state").map(String::as_str),
            Some("playing_manual")
        );
    }

    #[test]
    fn test_error_display() {
        let err = VideoError::NotRegistered("hero".to_string());
        assert_eq!(err.to_string(), "no video registered under id hero");

        let err = VideoError::SeekNotSupported;
        assert!(err.to_string().contains("not supported"));
    }
}

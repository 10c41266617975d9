//! Scripted player implementation.
//!
//! Control calls from the manager mutate local playback state and are
//! confirmed back through the feedback channel as lifecycle events, the
//! way a real media element raises events after `play()` returns.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use marquee_common::{
    AutoplayUi, LayoutRect, VideoError, VideoEvent, VideoMetadata, VideoPlayer,
};
use tokio::sync::mpsc;

use crate::scenario::VideoSpec;

pub type FeedbackSender = mpsc::UnboundedSender<(String, VideoEvent)>;

pub struct ScriptedPlayer {
    spec: VideoSpec,
    feedback: FeedbackSender,
    state: Mutex<PlaybackState>,
}

struct PlaybackState {
    playing: bool,
    fullscreen: bool,
    controls_visible: bool,
    /// Playhead seconds accrued before the current play run.
    played_accum: f64,
    playing_since: Option<Instant>,
}

impl ScriptedPlayer {
    pub fn new(spec: VideoSpec, feedback: FeedbackSender) -> Arc<Self> {
        let controls_visible = spec.interactive;
        Arc::new(Self {
            spec,
            feedback,
            state: Mutex::new(PlaybackState {
                playing: false,
                fullscreen: false,
                controls_visible,
                played_accum: 0.0,
                playing_since: None,
            }),
        })
    }

    fn send(&self, event: VideoEvent) {
        let _ = self.feedback.send((self.spec.id.clone(), event));
    }
}

impl AutoplayUi for ScriptedPlayer {
    fn install_autoplay_overlay(&self, interactive: bool) {
        log::debug!(
            "[{}] autoplay overlay installed (mask={interactive})",
            self.spec.id
        );
    }

    fn remove_autoplay_overlay(&self) {
        log::debug!("[{}] autoplay overlay removed", self.spec.id);
    }

    fn set_autoplay_icon_playing(&self, playing: bool) {
        log::debug!("[{}] equalizer icon animating={playing}", self.spec.id);
    }

    fn set_autoplay_overlay_hidden(&self, hidden: bool) {
        log::debug!("[{}] autoplay overlay hidden={hidden}", self.spec.id);
    }
}

impl VideoPlayer for ScriptedPlayer {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn is_interactive(&self) -> bool {
        self.spec.interactive
    }

    fn has_autoplay(&self) -> bool {
        self.spec.autoplay
    }

    fn has_rotate_to_fullscreen(&self) -> bool {
        self.spec.rotate_to_fullscreen
    }

    fn has_no_audio(&self) -> bool {
        self.spec.no_audio
    }

    fn play(&self, auto: bool) {
        log::debug!("[{}] play (auto={auto})", self.spec.id);
        if let Ok(mut state) = self.state.lock()
            && !state.playing
        {
            state.playing = true;
            state.playing_since = Some(Instant::now());
        }
        self.send(VideoEvent::Play);
        self.send(VideoEvent::Playing);
    }

    fn pause(&self) {
        log::debug!("[{}] pause", self.spec.id);
        if let Ok(mut state) = self.state.lock()
            && state.playing
        {
            if let Some(since) = state.playing_since.take() {
                state.played_accum += since.elapsed().as_secs_f64();
            }
            state.playing = false;
        }
        self.send(VideoEvent::Pause);
    }

    fn mute(&self) {
        self.send(VideoEvent::Muted);
    }

    fn unmute(&self) {
        self.send(VideoEvent::Unmuted);
    }

    fn show_controls(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.controls_visible = true;
        }
        log::debug!("[{}] controls shown", self.spec.id);
    }

    fn hide_controls(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.controls_visible = false;
        }
        log::debug!("[{}] controls hidden", self.spec.id);
    }

    fn fullscreen_enter(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fullscreen = true;
        }
        log::info!("[{}] entered fullscreen", self.spec.id);
    }

    fn fullscreen_exit(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fullscreen = false;
        }
        log::info!("[{}] exited fullscreen", self.spec.id);
    }

    fn is_fullscreen(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.fullscreen)
    }

    fn current_time(&self) -> f64 {
        let Ok(state) = self.state.lock() else {
            return 0.0;
        };
        state.played_accum
            + state
                .playing_since
                .map(|since| since.elapsed().as_secs_f64())
                .unwrap_or(0.0)
    }

    fn duration(&self) -> f64 {
        self.spec.duration.unwrap_or(f64::NAN)
    }

    fn played_ranges(&self) -> Vec<(f64, f64)> {
        let played = self.current_time();
        if played > 0.0 {
            vec![(0.0, played)]
        } else {
            Vec::new()
        }
    }

    fn metadata(&self) -> Option<VideoMetadata> {
        self.spec.title.as_ref().map(|title| VideoMetadata {
            title: Some(title.clone()),
            ..VideoMetadata::default()
        })
    }

    fn seek_to(&self, seconds: f64) -> Result<(), VideoError> {
        if let Ok(mut state) = self.state.lock() {
            state.played_accum = seconds;
            if state.playing {
                state.playing_since = Some(Instant::now());
            }
        }
        Ok(())
    }

    fn layout_rect(&self) -> LayoutRect {
        LayoutRect {
            top: self.spec.top,
            left: self.spec.left,
            width: self.spec.width,
            height: self.spec.height,
        }
    }
}

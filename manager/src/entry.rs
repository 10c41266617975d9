//! Per-video bookkeeping.
//!
//! A `VideoEntry` owns everything the manager tracks for one registered
//! video: playback flags, one-shot signals, the action and visibility
//! session managers, and the lazy percentage tracker. Player control
//! calls are always made outside the entry's own locks.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::Utc;
use marquee_common::{
    AnalyticsEvent, AnalyticsEventKind, PlayingState, Signal, VideoEvent, VideoId, VideoPlayer,
};

use crate::manager::ManagerShared;
use crate::percentage::PercentageTracker;
use crate::session::SessionManager;
use crate::signals::SignalSet;

/// Manager-level reactions an event handler requests.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct EventOutcome {
    /// Pause every other managed, manually-playing video.
    pub pause_others: bool,
    /// Re-rank the rotate-to-fullscreen candidates.
    pub recompute_fullscreen: bool,
    /// Treat the event as a user interaction with this video.
    pub user_interacted: bool,
}

struct EntryState {
    /// One-way flag: cleared when playback is delegated to an external
    /// component, after which the autoplay policy keeps its hands off.
    manage_playback: bool,
    loaded: bool,
    is_playing: bool,
    is_rolling_ad: bool,
    is_visible: bool,
    latest_ratio: f64,
    muted: bool,
    play_called_by_autoplay: bool,
    pause_called_by_autoplay: bool,
    has_seen_play_event: bool,
    first_play_fired: bool,
    overlay_installed: bool,
}

impl Default for EntryState {
    fn default() -> Self {
        Self {
            manage_playback: true,
            loaded: false,
            is_playing: false,
            is_rolling_ad: false,
            is_visible: false,
            latest_ratio: 0.0,
            muted: false,
            play_called_by_autoplay: false,
            pause_called_by_autoplay: false,
            has_seen_play_event: false,
            first_play_fired: false,
            overlay_installed: false,
        }
    }
}

pub(crate) struct VideoEntry {
    id: VideoId,
    player: Arc<dyn VideoPlayer>,
    shared: Arc<ManagerShared>,
    signals: SignalSet,
    state: Mutex<EntryState>,
    action_session: Mutex<SessionManager>,
    visibility_session: Mutex<SessionManager>,
    tracker: OnceLock<Arc<PercentageTracker>>,
}

impl VideoEntry {
    pub fn new(id: VideoId, player: Arc<dyn VideoPlayer>, shared: Arc<ManagerShared>) -> Arc<Self> {
        let entry = Arc::new(Self {
            id,
            player,
            shared,
            signals: SignalSet::new(),
            state: Mutex::new(EntryState::default()),
            action_session: Mutex::new(SessionManager::new()),
            visibility_session: Mutex::new(SessionManager::new()),
            tracker: OnceLock::new(),
        });

        // Session endings are what analytics consumers bill against.
        let weak = Arc::downgrade(&entry);
        if let Ok(mut sessions) = entry.action_session.lock() {
            let weak = weak.clone();
            sessions.on_session_end(move || {
                if let Some(entry) = weak.upgrade() {
                    entry.analytics_event(AnalyticsEventKind::Session, BTreeMap::new());
                }
            });
        }
        if let Ok(mut sessions) = entry.visibility_session.lock() {
            sessions.on_session_end(move || {
                if let Some(entry) = weak.upgrade() {
                    entry.analytics_event(AnalyticsEventKind::SessionVisible, BTreeMap::new());
                }
            });
        }

        entry
    }

    pub fn id(&self) -> VideoId {
        self.id
    }

    pub fn player(&self) -> &Arc<dyn VideoPlayer> {
        &self.player
    }

    pub fn signals(&self) -> &SignalSet {
        &self.signals
    }

    fn tracker(self: &Arc<Self>) -> Arc<PercentageTracker> {
        self.tracker
            .get_or_init(|| {
                PercentageTracker::new(Arc::downgrade(self), self.shared.config.clone())
            })
            .clone()
    }

    pub fn playing_state(&self) -> PlayingState {
        let Ok(state) = self.state.lock() else {
            return PlayingState::Paused;
        };
        self.derive_state(&state)
    }

    /// Autoplay-initiated playback stays "auto" until the user interacts.
    fn derive_state(&self, state: &EntryState) -> PlayingState {
        if !state.is_playing {
            return PlayingState::Paused;
        }
        if state.play_called_by_autoplay && !self.signals.is_signaled(Signal::UserInteracted) {
            PlayingState::PlayingAuto
        } else {
            PlayingState::PlayingManual
        }
    }

    pub fn is_muted(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.muted)
    }

    pub fn is_rolling_ad(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.is_rolling_ad)
    }

    pub fn is_playback_managed(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.manage_playback)
    }

    pub fn user_interacted(&self) -> bool {
        self.signals.is_signaled(Signal::UserInteracted)
    }

    pub fn latest_ratio(&self) -> f64 {
        self.state
            .lock()
            .map(|state| state.latest_ratio)
            .unwrap_or(0.0)
    }

    pub(crate) async fn handle_event(self: &Arc<Self>, event: VideoEvent) -> EventOutcome {
        let mut outcome = EventOutcome::default();
        match event {
            VideoEvent::Load | VideoEvent::Reload => {
                let is_visible = {
                    let Ok(mut state) = self.state.lock() else {
                        return outcome;
                    };
                    state.loaded = true;
                    state.is_visible
                };
                self.tracker().start();
                if is_visible {
                    self.loaded_visibility_changed().await;
                }
            }
            VideoEvent::LoadedMetadata => {
                self.tracker().on_loaded_metadata();
            }
            VideoEvent::Play => {
                if let Ok(mut state) = self.state.lock() {
                    state.has_seen_play_event = true;
                }
                self.analytics_event(AnalyticsEventKind::Play, BTreeMap::new());
            }
            VideoEvent::Playing => {
                let (manual, fire_first_play, begin_visibility, emit_play, animate_icon) = {
                    let Ok(mut state) = self.state.lock() else {
                        return outcome;
                    };
                    state.is_playing = true;
                    let manual = self.derive_state(&state) == PlayingState::PlayingManual;
                    let first = manual && !state.first_play_fired;
                    if first {
                        state.first_play_fired = true;
                    }
                    (
                        manual,
                        first,
                        state.is_visible,
                        !state.has_seen_play_event,
                        state.overlay_installed,
                    )
                };
                if animate_icon {
                    self.player.set_autoplay_icon_playing(true);
                }
                if fire_first_play {
                    self.analytics_event(AnalyticsEventKind::FirstPlay, BTreeMap::new());
                }
                if manual {
                    outcome.pause_others = true;
                    self.update_media_session();
                }
                if let Ok(mut sessions) = self.action_session.lock() {
                    sessions.begin_session();
                }
                if begin_visibility && let Ok(mut sessions) = self.visibility_session.lock() {
                    sessions.begin_session();
                }
                if emit_play {
                    self.analytics_event(AnalyticsEventKind::Play, BTreeMap::new());
                }
                outcome.recompute_fullscreen = true;
            }
            VideoEvent::Pause => {
                self.analytics_event(AnalyticsEventKind::Pause, BTreeMap::new());
                let (end_action_session, stop_icon) = {
                    let Ok(mut state) = self.state.lock() else {
                        return outcome;
                    };
                    state.is_playing = false;
                    // Autoplay-initiated pauses do not end the user's
                    // playback session.
                    let end = if state.pause_called_by_autoplay {
                        state.pause_called_by_autoplay = false;
                        false
                    } else {
                        true
                    };
                    (end, state.overlay_installed)
                };
                if stop_icon {
                    self.player.set_autoplay_icon_playing(false);
                }
                if end_action_session && let Ok(mut sessions) = self.action_session.lock() {
                    sessions.end_session();
                }
                outcome.recompute_fullscreen = true;
            }
            VideoEvent::Ended => {
                if let Ok(mut state) = self.state.lock() {
                    state.is_rolling_ad = false;
                }
                if let Some(tracker) = self.tracker.get() {
                    tracker.on_ended();
                }
                self.analytics_event(AnalyticsEventKind::Ended, BTreeMap::new());
                outcome.recompute_fullscreen = true;
            }
            VideoEvent::Muted => {
                if let Ok(mut state) = self.state.lock() {
                    state.muted = true;
                }
            }
            VideoEvent::Unmuted => {
                let overlay_installed = {
                    let Ok(mut state) = self.state.lock() else {
                        return outcome;
                    };
                    state.muted = false;
                    state.overlay_installed
                };
                outcome.pause_others = true;
                // Unmuting a muted-autoplay video is how the user opts in.
                if overlay_installed {
                    outcome.user_interacted = true;
                }
            }
            VideoEvent::AdStart => {
                let overlay_installed = {
                    let Ok(mut state) = self.state.lock() else {
                        return outcome;
                    };
                    state.is_rolling_ad = true;
                    state.overlay_installed
                };
                if overlay_installed {
                    self.player.set_autoplay_overlay_hidden(true);
                    self.player.show_controls();
                }
                self.analytics_event(AnalyticsEventKind::AdStart, BTreeMap::new());
            }
            VideoEvent::AdEnd => {
                let overlay_installed = {
                    let Ok(mut state) = self.state.lock() else {
                        return outcome;
                    };
                    state.is_rolling_ad = false;
                    state.overlay_installed
                };
                if overlay_installed {
                    self.player.set_autoplay_overlay_hidden(false);
                    self.player.hide_controls();
                }
                self.analytics_event(AnalyticsEventKind::AdEnd, BTreeMap::new());
            }
            VideoEvent::CustomTick { event_type, vars } => {
                // Ticks without a type are player-internal; drop them.
                let Some(event_type) = event_type else {
                    return outcome;
                };
                let mut prefixed = BTreeMap::new();
                for (key, value) in vars {
                    prefixed.insert(format!("custom_{key}"), value);
                }
                prefixed.insert("eventType".to_string(), event_type);
                self.analytics_event(AnalyticsEventKind::Custom, prefixed);
            }
        }
        outcome
    }

    /// Observer callback: stores the ratio and, when the boolean
    /// visibility flipped, runs the load-gated visibility transition.
    pub(crate) async fn update_visibility(self: &Arc<Self>, ratio: f64, visible: bool) {
        let run_transition = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.latest_ratio = ratio;
            if state.is_visible == visible {
                false
            } else {
                state.is_visible = visible;
                state.loaded
            }
        };
        if run_transition {
            self.loaded_visibility_changed().await;
        }
    }

    async fn loaded_visibility_changed(self: &Arc<Self>) {
        if !self.shared.host.is_document_visible() {
            return;
        }
        let supports_autoplay = self.shared.supports_autoplay().await;
        let can_autoplay = self.player.has_autoplay() && !self.user_interacted();
        if can_autoplay && supports_autoplay {
            self.autoplay_visibility_changed();
        } else {
            self.non_autoplay_visibility_changed();
        }
    }

    fn autoplay_visibility_changed(&self) {
        let (managed, visible, was_playing) = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            (state.manage_playback, state.is_visible, state.is_playing)
        };
        if !managed {
            return;
        }
        if visible {
            if let Ok(mut sessions) = self.visibility_session.lock() {
                sessions.begin_session();
            }
            if let Ok(mut state) = self.state.lock() {
                state.play_called_by_autoplay = true;
            }
            self.player.play(true);
        } else {
            if was_playing && let Ok(mut sessions) = self.visibility_session.lock() {
                sessions.end_session();
            }
            if let Ok(mut state) = self.state.lock() {
                state.pause_called_by_autoplay = true;
            }
            self.player.pause();
        }
    }

    fn non_autoplay_visibility_changed(&self) {
        let (visible, playing) = {
            let Ok(state) = self.state.lock() else {
                return;
            };
            (state.is_visible, state.is_playing)
        };
        if visible {
            if let Ok(mut sessions) = self.visibility_session.lock() {
                sessions.begin_session();
            }
        } else if playing && let Ok(mut sessions) = self.visibility_session.lock() {
            sessions.end_session();
        }
    }

    /// Autoplay install path, run once at registration for videos with the
    /// autoplay attribute.
    pub(crate) async fn setup_autoplay(self: &Arc<Self>) {
        if self.player.is_interactive() {
            self.player.hide_controls();
        }
        if !self.shared.supports_autoplay().await {
            if self.player.is_interactive() {
                self.player.show_controls();
            }
            return;
        }
        self.player.mute();
        self.install_autoplay_decorations();
    }

    fn install_autoplay_decorations(&self) {
        if self.player.has_no_audio() || self.user_interacted() {
            return;
        }
        let rolling_ad = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.overlay_installed = true;
            state.is_rolling_ad
        };
        self.player
            .install_autoplay_overlay(self.player.is_interactive());
        if self.player.is_interactive() {
            self.player.hide_controls();
        }
        if rolling_ad {
            self.player.set_autoplay_overlay_hidden(true);
        }
    }

    /// Latches the interaction signal and, if the autoplay overlay is
    /// installed, tears it down and restores audible, user-facing playback.
    pub(crate) fn on_user_interaction(&self) {
        self.signals.signal(Signal::UserInteracted);
        let (installed, fire_first_play) = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let installed = state.overlay_installed;
            state.overlay_installed = false;
            let first = installed && !state.first_play_fired;
            if first {
                state.first_play_fired = true;
            }
            (installed, first)
        };
        if !installed {
            return;
        }
        if fire_first_play {
            self.analytics_event(AnalyticsEventKind::FirstPlay, BTreeMap::new());
        }
        if self.player.is_interactive() {
            self.player.show_controls();
        }
        self.player.unmute();
        self.player.remove_autoplay_overlay();
    }

    /// An external component took over; stop managing and stop current
    /// playback.
    pub(crate) fn delegate_playback(&self) {
        let was_playing = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if !state.manage_playback {
                return;
            }
            state.manage_playback = false;
            state.is_playing
        };
        log::info!("playback delegated for video {}", self.player.id());
        if was_playing {
            self.player.pause();
        }
    }

    fn update_media_session(&self) {
        if self.player.preimplements_media_session() {
            return;
        }
        let Some(metadata) = self.player.metadata() else {
            return;
        };
        if metadata.title.is_none() && metadata.artwork.is_empty() {
            return;
        }
        self.shared.host.update_media_session(metadata);
    }

    /// Standard details snapshot attached to every analytics event.
    pub(crate) fn analytics_details(&self) -> BTreeMap<String, String> {
        let rect = self.player.layout_rect();
        let ranges = self.player.played_ranges();
        let played_total: f64 = ranges.iter().map(|(start, end)| end - start).sum();
        let ranges_json = serde_json::to_string(&ranges).unwrap_or_else(|_| "[]".to_string());
        let autoplay_supported = self.shared.autoplay_probe_result().unwrap_or(false);

        let mut vars = BTreeMap::new();
        vars.insert(
            "autoplay".to_string(),
            (self.player.has_autoplay() && autoplay_supported).to_string(),
        );
        vars.insert(
            "currentTime".to_string(),
            self.player.current_time().to_string(),
        );
        vars.insert("duration".to_string(), self.player.duration().to_string());
        vars.insert("height".to_string(), rect.height.to_string());
        vars.insert("width".to_string(), rect.width.to_string());
        vars.insert("id".to_string(), self.player.id().to_string());
        vars.insert("muted".to_string(), self.is_muted().to_string());
        vars.insert("playedTotal".to_string(), played_total.to_string());
        vars.insert("playedRangesJson".to_string(), ranges_json);
        vars.insert("state".to_string(), self.playing_state().as_str().to_string());
        vars
    }

    pub(crate) fn analytics_event(&self, kind: AnalyticsEventKind, extra: BTreeMap<String, String>) {
        let mut vars = self.analytics_details();
        vars.extend(extra);
        let event = AnalyticsEvent {
            kind,
            video_id: self.player.id().to_string(),
            time: Utc::now(),
            vars,
        };
        if self.shared.sink.send(event).is_err() {
            log::debug!("analytics receiver dropped; discarding {}", kind.as_str());
        }
    }

    pub(crate) fn dispose(&self) {
        if let Some(tracker) = self.tracker.get() {
            tracker.stop();
        }
    }
}

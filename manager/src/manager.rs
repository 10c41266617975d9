//! The video manager facade.
//!
//! Owns the registry of entries, the cached autoplay-support probe, the
//! shared seconds-played ticker and the auto-fullscreen manager. Hosts
//! drive it by registering players and forwarding events, visibility
//! ratios and orientation changes; analytics come back on the receiver
//! returned by [`VideoManager::new`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use marquee_common::{
    AnalyticsEvent, AnalyticsEventKind, HostEnvironment, Orientation, PlayingState,
    ScrollPosition, Signal, VideoAction, VideoError, VideoEvent, VideoId, VideoPlayer,
};
use tokio::sync::OnceCell;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ManagerConfig;
use crate::entry::{EventOutcome, VideoEntry};
use crate::fullscreen::{AutoFullscreenManager, Candidate, RotationAction, requires_auto_fullscreen};

/// State shared between the manager and its entries.
pub(crate) struct ManagerShared {
    pub host: Arc<dyn HostEnvironment>,
    pub sink: mpsc::UnboundedSender<AnalyticsEvent>,
    pub config: ManagerConfig,
    autoplay_probe: OnceCell<bool>,
}

impl ManagerShared {
    pub fn new(
        host: Arc<dyn HostEnvironment>,
        sink: mpsc::UnboundedSender<AnalyticsEvent>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            host,
            sink,
            config,
            autoplay_probe: OnceCell::new(),
        }
    }

    /// Probes the host once; every later call returns the cached result.
    pub async fn supports_autoplay(&self) -> bool {
        *self
            .autoplay_probe
            .get_or_init(|| async { self.host.supports_muted_autoplay().await })
            .await
    }

    /// Cached probe result, `None` while the probe has not resolved yet.
    pub fn autoplay_probe_result(&self) -> Option<bool> {
        self.autoplay_probe.get().copied()
    }
}

/// A video that has actions registered; unlike entries, these exist even
/// for players whose platform is unsupported.
#[derive(Clone)]
struct ActionTarget {
    id: VideoId,
    player: Arc<dyn VideoPlayer>,
}

struct ManagerInner {
    shared: Arc<ManagerShared>,
    entries: Mutex<Vec<Arc<VideoEntry>>>,
    targets: Mutex<Vec<ActionTarget>>,
    fullscreen: Mutex<AutoFullscreenManager>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.ticker.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
    }
}

pub struct VideoManager {
    inner: Arc<ManagerInner>,
}

impl VideoManager {
    /// Creates a manager and the receiver its analytics events arrive on.
    ///
    /// Must be called within a tokio runtime; the seconds-played ticker is
    /// spawned immediately.
    pub fn new(
        host: Arc<dyn HostEnvironment>,
        config: ManagerConfig,
    ) -> (Self, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        let (sink, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(ManagerShared::new(host, sink, config));
        let inner = Arc::new(ManagerInner {
            shared,
            entries: Mutex::new(Vec::new()),
            targets: Mutex::new(Vec::new()),
            fullscreen: Mutex::new(AutoFullscreenManager::new()),
            ticker: Mutex::new(None),
            next_id: AtomicU64::new(1),
        });

        let ticker = tokio::spawn(seconds_ticker(Arc::downgrade(&inner)));
        if let Ok(mut slot) = inner.ticker.lock() {
            *slot = Some(ticker);
        }

        log::info!("video manager initialized");
        (Self { inner }, receiver)
    }

    /// Registers a video. Actions work from this point on even for
    /// unsupported platforms; full management (autoplay, analytics,
    /// fullscreen) only applies to supported ones. Registering the same
    /// player twice returns the original id.
    pub async fn register(&self, player: Arc<dyn VideoPlayer>) -> VideoId {
        if let Some(existing) = self.find_target_id(&player) {
            return existing;
        }
        let id = VideoId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut targets) = self.inner.targets.lock() {
            targets.push(ActionTarget {
                id,
                player: player.clone(),
            });
        }

        if !player.supports_platform() {
            log::info!(
                "video {} is not supported on this platform; only actions are wired",
                player.id()
            );
            return id;
        }

        let entry = VideoEntry::new(id, player.clone(), self.inner.shared.clone());
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.push(entry.clone());
        }

        match requires_auto_fullscreen(player.as_ref(), self.inner.shared.host.platform()) {
            Ok(true) => {
                if let Ok(mut fullscreen) = self.inner.fullscreen.lock() {
                    fullscreen.register(id);
                }
            }
            Ok(false) => {}
            Err(err) => log::error!("{err}"),
        }

        entry.signals().signal(Signal::Registered);
        log::info!("registered video {} as {id}", player.id());

        if player.has_autoplay() {
            entry.setup_autoplay().await;
        }
        id
    }

    /// Forwards a player event to its entry and applies the manager-level
    /// reactions it requests.
    pub async fn dispatch(&self, id: VideoId, event: VideoEvent) -> Result<(), VideoError> {
        let entry = self.entry(id)?;
        log::debug!("event {event:?} for video {}", entry.player().id());
        let outcome = entry.handle_event(event).await;
        self.apply_outcome(&entry, outcome);
        Ok(())
    }

    /// Invokes a page-level action. Every action counts as a user
    /// interaction with the video before the control call is made.
    pub fn execute(&self, id: VideoId, action: VideoAction) -> Result<(), VideoError> {
        let target = self
            .find_target(id)
            .ok_or_else(|| VideoError::NotRegistered(id.to_string()))?;
        log::info!("action {} on video {}", action.name(), target.player.id());

        if let Ok(entry) = self.entry(id) {
            self.user_interacted_with(&entry);
        }

        match action {
            VideoAction::Play => target.player.play(false),
            VideoAction::Pause => target.player.pause(),
            VideoAction::Mute => target.player.mute(),
            VideoAction::Unmute => target.player.unmute(),
            VideoAction::FullscreenEnter => target.player.fullscreen_enter(),
        }
        Ok(())
    }

    /// Observer input: latest intersection ratio for a video. The boolean
    /// visibility cutoff is applied here so entries only see flips.
    pub async fn update_visibility(&self, id: VideoId, ratio: f64) -> Result<(), VideoError> {
        let entry = self.entry(id)?;
        let visible = ratio >= self.inner.shared.config.autoplay_min_visibility;
        entry.update_visibility(ratio, visible).await;
        Ok(())
    }

    /// Device rotation handling for rotate-to-fullscreen videos. Waits for
    /// layout to settle before measuring for scroll adjustment.
    pub async fn orientation_changed(&self, orientation: Orientation) {
        tokio::time::sleep(Duration::from_millis(
            self.inner.shared.config.orientation_settle_ms,
        ))
        .await;

        let action = match self.inner.fullscreen.lock() {
            Ok(mut fullscreen) => fullscreen.on_rotation(orientation),
            Err(_) => return,
        };
        match action {
            RotationAction::Enter(id) => self.enter_fullscreen(id),
            RotationAction::Exit(id) => self.exit_fullscreen(id),
            RotationAction::None => {}
        }
    }

    /// The player left fullscreen on its own (back button, player chrome);
    /// release the slot without issuing further control calls.
    pub fn fullscreen_exited_natively(&self) {
        if let Ok(mut fullscreen) = self.inner.fullscreen.lock() {
            fullscreen.exited_natively();
        }
    }

    /// Raises a one-shot signal for a video.
    pub fn signal(&self, id: VideoId, signal: Signal) -> Result<(), VideoError> {
        let entry = self.entry(id)?;
        match signal {
            Signal::Registered => entry.signals().signal(Signal::Registered),
            Signal::UserInteracted => self.user_interacted_with(&entry),
            Signal::PlaybackDelegated => {
                entry.signals().signal(Signal::PlaybackDelegated);
                entry.delegate_playback();
            }
        }
        Ok(())
    }

    /// Resolves once the signal has been raised, immediately if it already
    /// was.
    pub async fn wait_for_signal(&self, id: VideoId, signal: Signal) -> Result<(), VideoError> {
        let entry = self.entry(id)?;
        entry.signals().when(signal).await;
        Ok(())
    }

    pub fn playing_state(&self, id: VideoId) -> Result<PlayingState, VideoError> {
        Ok(self.entry(id)?.playing_state())
    }

    pub fn is_muted(&self, id: VideoId) -> Result<bool, VideoError> {
        Ok(self.entry(id)?.is_muted())
    }

    pub fn is_rolling_ad(&self, id: VideoId) -> Result<bool, VideoError> {
        Ok(self.entry(id)?.is_rolling_ad())
    }

    pub fn user_interacted(&self, id: VideoId) -> Result<bool, VideoError> {
        Ok(self.entry(id)?.user_interacted())
    }

    /// Standard analytics details snapshot for a video.
    pub fn analytics_details(&self, id: VideoId) -> Result<BTreeMap<String, String>, VideoError> {
        Ok(self.entry(id)?.analytics_details())
    }

    /// Stops timers, disposes entries and empties the registry. No
    /// analytics are emitted afterwards.
    pub fn dispose(&self) {
        if let Ok(mut slot) = self.inner.ticker.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }
        let entries: Vec<Arc<VideoEntry>> = match self.inner.entries.lock() {
            Ok(mut entries) => entries.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for entry in &entries {
            entry.dispose();
        }
        if let Ok(mut targets) = self.inner.targets.lock() {
            targets.clear();
        }
        if let Ok(mut fullscreen) = self.inner.fullscreen.lock() {
            fullscreen.dispose();
        }
        log::info!("video manager disposed ({} videos)", entries.len());
    }

    fn apply_outcome(&self, entry: &Arc<VideoEntry>, outcome: EventOutcome) {
        if outcome.user_interacted {
            self.user_interacted_with(entry);
        }
        if outcome.pause_others {
            self.pause_other_videos(entry);
        }
        if outcome.recompute_fullscreen {
            self.select_best_centered();
        }
    }

    fn user_interacted_with(&self, entry: &Arc<VideoEntry>) {
        entry.on_user_interaction();
        self.select_best_centered();
    }

    fn pause_other_videos(&self, current: &Arc<VideoEntry>) {
        let others: Vec<Arc<VideoEntry>> = match self.inner.entries.lock() {
            Ok(entries) => entries
                .iter()
                .filter(|entry| {
                    entry.id() != current.id()
                        && entry.is_playback_managed()
                        && entry.playing_state() == PlayingState::PlayingManual
                })
                .cloned()
                .collect(),
            Err(_) => return,
        };
        for other in others {
            log::debug!("pausing video {}", other.player().id());
            other.player().pause();
        }
    }

    fn select_best_centered(&self) {
        let eligible: Vec<VideoId> = match self.inner.fullscreen.lock() {
            Ok(fullscreen) => fullscreen.eligible().to_vec(),
            Err(_) => return,
        };
        if eligible.is_empty() {
            return;
        }

        let mut candidates = Vec::new();
        if let Ok(entries) = self.inner.entries.lock() {
            for entry in entries.iter() {
                if !eligible.contains(&entry.id()) {
                    continue;
                }
                candidates.push(Candidate {
                    id: entry.id(),
                    ratio: entry.latest_ratio(),
                    rect: entry.player().layout_rect(),
                    state: entry.playing_state(),
                });
            }
        }

        let viewport = self.inner.shared.host.viewport();
        if let Ok(mut fullscreen) = self.inner.fullscreen.lock() {
            fullscreen.select_best_centered(candidates, viewport, &self.inner.shared.config);
        }
    }

    fn enter_fullscreen(&self, id: VideoId) {
        let Ok(entry) = self.entry(id) else {
            return;
        };
        log::info!("entering fullscreen for video {}", entry.player().id());
        let platform = self.inner.shared.host.platform();
        if platform.android && platform.chrome {
            // Chrome on Android scrolls and transitions on its own once
            // fullscreen is requested.
            entry.player().fullscreen_enter();
            return;
        }
        self.scroll_into_view_if_needed(&entry, None);
        entry.player().fullscreen_enter();
    }

    fn exit_fullscreen(&self, id: VideoId) {
        let Ok(entry) = self.entry(id) else {
            return;
        };
        log::info!("exiting fullscreen for video {}", entry.player().id());
        self.scroll_into_view_if_needed(&entry, Some(ScrollPosition::Center));
        entry.player().fullscreen_exit();
    }

    fn scroll_into_view_if_needed(&self, entry: &Arc<VideoEntry>, forced: Option<ScrollPosition>) {
        let rect = entry.player().layout_rect();
        let viewport = self.inner.shared.host.viewport();
        if rect.top >= 0.0 && rect.bottom() <= viewport.height {
            return;
        }
        let pos = forced.unwrap_or(if rect.bottom() > viewport.height {
            ScrollPosition::Bottom
        } else {
            ScrollPosition::Top
        });
        self.inner.shared.host.scroll_into_view(rect, pos);
    }

    fn entry(&self, id: VideoId) -> Result<Arc<VideoEntry>, VideoError> {
        self.inner
            .entries
            .lock()
            .ok()
            .and_then(|entries| entries.iter().find(|entry| entry.id() == id).cloned())
            .ok_or_else(|| VideoError::NotRegistered(id.to_string()))
    }

    fn find_target(&self, id: VideoId) -> Option<ActionTarget> {
        self.inner
            .targets
            .lock()
            .ok()?
            .iter()
            .find(|target| target.id == id)
            .cloned()
    }

    fn find_target_id(&self, player: &Arc<dyn VideoPlayer>) -> Option<VideoId> {
        self.inner
            .targets
            .lock()
            .ok()?
            .iter()
            .find(|target| Arc::ptr_eq(&target.player, player))
            .map(|target| target.id)
    }
}

/// Shared per-second ticker: emits `video-seconds-played` for every
/// non-paused video plus a time-update progress event when the duration
/// is known.
async fn seconds_ticker(inner: Weak<ManagerInner>) {
    loop {
        let interval_ms = {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            inner.shared.config.seconds_played_interval_ms
        };
        tokio::time::sleep(Duration::from_millis(interval_ms)).await;

        let Some(inner) = inner.upgrade() else {
            return;
        };
        let entries: Vec<Arc<VideoEntry>> = match inner.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => return,
        };
        for entry in entries {
            if entry.playing_state() == PlayingState::Paused {
                continue;
            }
            entry.analytics_event(AnalyticsEventKind::SecondsPlayed, BTreeMap::new());

            let duration = entry.player().duration();
            if duration.is_finite() && duration > 0.0 {
                let time = entry.player().current_time();
                let percent = time / duration * 100.0;
                let mut vars = BTreeMap::new();
                vars.insert("time".to_string(), time.to_string());
                vars.insert("percent".to_string(), percent.to_string());
                entry.analytics_event(AnalyticsEventKind::TimeUpdate, vars);
            }
        }
    }
}

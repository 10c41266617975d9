/// End-to-end tests driving a manager through scripted player and host
/// fakes: autoplay visibility transitions, session accounting, action
/// dispatch, fullscreen rotation and disposal.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use marquee_common::{
    AnalyticsEvent, AnalyticsEventKind, AutoplayUi, HostEnvironment, LayoutRect, Orientation,
    Platform, PlayingState, ScrollPosition, Signal, VideoAction, VideoEvent, VideoMetadata,
    VideoPlayer, Viewport,
};
use marquee_manager::{ManagerConfig, VideoManager};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Default)]
struct FakeHost {
    platform: Platform,
    autoplay_supported: bool,
    document_hidden: AtomicBool,
    scrolls: Mutex<Vec<ScrollPosition>>,
    media_sessions: Mutex<Vec<Option<String>>>,
}

impl FakeHost {
    fn supporting_autoplay() -> Arc<Self> {
        Arc::new(Self {
            autoplay_supported: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl HostEnvironment for FakeHost {
    async fn supports_muted_autoplay(&self) -> bool {
        self.autoplay_supported
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn viewport(&self) -> Viewport {
        Viewport {
            width: 400.0,
            height: 800.0,
        }
    }

    fn is_document_visible(&self) -> bool {
        !self.document_hidden.load(Ordering::SeqCst)
    }

    fn scroll_into_view(&self, _rect: LayoutRect, pos: ScrollPosition) {
        self.scrolls.lock().unwrap().push(pos);
    }

    fn update_media_session(&self, metadata: VideoMetadata) {
        self.media_sessions.lock().unwrap().push(metadata.title);
    }
}

struct FakePlayer {
    name: String,
    autoplay: bool,
    interactive: bool,
    rotate_to_fullscreen: bool,
    supported: bool,
    title: Option<String>,
    mutable: Mutex<PlayerState>,
}

struct PlayerState {
    calls: Vec<String>,
    current_time: f64,
    duration: f64,
    rect: LayoutRect,
}

impl FakePlayer {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            autoplay: false,
            interactive: true,
            rotate_to_fullscreen: false,
            supported: true,
            title: None,
            mutable: Mutex::new(PlayerState {
                calls: Vec::new(),
                current_time: 0.0,
                duration: 100.0,
                rect: LayoutRect {
                    top: 100.0,
                    left: 0.0,
                    width: 400.0,
                    height: 200.0,
                },
            }),
        })
    }

    fn autoplaying(name: &str) -> Arc<Self> {
        let mut player = Self::new(name);
        Arc::get_mut(&mut player).unwrap().autoplay = true;
        player
    }

    fn record(&self, call: &str) {
        self.mutable.lock().unwrap().calls.push(call.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.mutable.lock().unwrap().calls.clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn set_current_time(&self, time: f64) {
        self.mutable.lock().unwrap().current_time = time;
    }
}

impl AutoplayUi for FakePlayer {
    fn install_autoplay_overlay(&self, interactive: bool) {
        self.record(if interactive {
            "overlay_install:interactive"
        } else {
            "overlay_install"
        });
    }

    fn remove_autoplay_overlay(&self) {
        self.record("overlay_remove");
    }

    fn set_autoplay_icon_playing(&self, playing: bool) {
        self.record(if playing { "icon:on" } else { "icon:off" });
    }

    fn set_autoplay_overlay_hidden(&self, hidden: bool) {
        self.record(if hidden {
            "overlay_hidden"
        } else {
            "overlay_shown"
        });
    }
}

impl VideoPlayer for FakePlayer {
    fn id(&self) -> &str {
        &self.name
    }

    fn supports_platform(&self) -> bool {
        self.supported
    }

    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn has_autoplay(&self) -> bool {
        self.autoplay
    }

    fn has_rotate_to_fullscreen(&self) -> bool {
        self.rotate_to_fullscreen
    }

    fn play(&self, auto: bool) {
        self.record(if auto { "play:auto" } else { "play:user" });
    }

    fn pause(&self) {
        self.record("pause");
    }

    fn mute(&self) {
        self.record("mute");
    }

    fn unmute(&self) {
        self.record("unmute");
    }

    fn show_controls(&self) {
        self.record("show_controls");
    }

    fn hide_controls(&self) {
        self.record("hide_controls");
    }

    fn fullscreen_enter(&self) {
        self.record("fullscreen_enter");
    }

    fn fullscreen_exit(&self) {
        self.record("fullscreen_exit");
    }

    fn is_fullscreen(&self) -> bool {
        false
    }

    fn current_time(&self) -> f64 {
        self.mutable.lock().unwrap().current_time
    }

    fn duration(&self) -> f64 {
        self.mutable.lock().unwrap().duration
    }

    fn metadata(&self) -> Option<VideoMetadata> {
        self.title.as_ref().map(|title| VideoMetadata {
            title: Some(title.clone()),
            ..VideoMetadata::default()
        })
    }

    fn layout_rect(&self) -> LayoutRect {
        self.mutable.lock().unwrap().rect
    }
}

fn drain(receiver: &mut UnboundedReceiver<AnalyticsEvent>) -> Vec<AnalyticsEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

fn kinds(events: &[AnalyticsEvent]) -> Vec<AnalyticsEventKind> {
    events.iter().map(|event| event.kind).collect()
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_follows_visibility() {
    let host = FakeHost::supporting_autoplay();
    let (manager, mut analytics) = VideoManager::new(host, ManagerConfig::default());

    let player = FakePlayer::autoplaying("hero");
    let id = manager.register(player.clone()).await;

    // Registration mutes and decorates the video for autoplay.
    let calls = player.calls();
    assert!(calls.contains(&"hide_controls".to_string()));
    assert!(calls.contains(&"mute".to_string()));
    assert!(calls.contains(&"overlay_install:interactive".to_string()));

    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.dispatch(id, VideoEvent::Muted).await.unwrap();

    // Crossing the visibility threshold starts autoplay.
    manager.update_visibility(id, 0.6).await.unwrap();
    assert_eq!(player.count("play:auto"), 1);
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();
    assert_eq!(manager.playing_state(id).unwrap(), PlayingState::PlayingAuto);

    // Dropping below the threshold pauses again.
    manager.update_visibility(id, 0.3).await.unwrap();
    assert_eq!(player.count("pause"), 1);
    manager.dispatch(id, VideoEvent::Pause).await.unwrap();
    assert_eq!(manager.playing_state(id).unwrap(), PlayingState::Paused);

    let events = drain(&mut analytics);
    let kinds = kinds(&events);
    // The visibility session closed when the video was hidden...
    assert_eq!(
        kinds
            .iter()
            .filter(|k| **k == AnalyticsEventKind::SessionVisible)
            .count(),
        1
    );
    // ...but the autoplay-initiated pause must not close the playback
    // session.
    assert!(!kinds.contains(&AnalyticsEventKind::Session));
    assert!(kinds.contains(&AnalyticsEventKind::Play));
    assert!(kinds.contains(&AnalyticsEventKind::Pause));

    // State var reflects autoplay playback at emission time.
    let play = events
        .iter()
        .find(|e| e.kind == AnalyticsEventKind::Pause)
        .unwrap();
    assert_eq!(play.vars.get("autoplay").map(String::as_str), Some("true"));
    assert_eq!(play.vars.get("id").map(String::as_str), Some("hero"));
}

#[tokio::test(start_paused = true)]
async fn test_user_interaction_tears_down_autoplay() {
    let host = FakeHost::supporting_autoplay();
    let (manager, mut analytics) = VideoManager::new(host, ManagerConfig::default());

    let player = FakePlayer::autoplaying("hero");
    let id = manager.register(player.clone()).await;
    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.update_visibility(id, 0.8).await.unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();
    assert_eq!(manager.playing_state(id).unwrap(), PlayingState::PlayingAuto);

    // Any action counts as interaction and removes the overlay.
    manager.execute(id, VideoAction::Play).unwrap();
    assert!(manager.user_interacted(id).unwrap());
    assert_eq!(player.count("unmute"), 1);
    assert_eq!(player.count("overlay_remove"), 1);
    assert_eq!(player.count("show_controls"), 1);
    assert_eq!(player.count("play:user"), 1);

    // Playback is now attributed to the user.
    assert_eq!(
        manager.playing_state(id).unwrap(),
        PlayingState::PlayingManual
    );

    // first-play fires exactly once, even after another Playing event.
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();
    let events = drain(&mut analytics);
    assert_eq!(
        kinds(&events)
            .iter()
            .filter(|k| **k == AnalyticsEventKind::FirstPlay)
            .count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_unmute_counts_as_interaction() {
    let host = FakeHost::supporting_autoplay();
    let (manager, _analytics) = VideoManager::new(host, ManagerConfig::default());

    let player = FakePlayer::autoplaying("hero");
    let id = manager.register(player.clone()).await;
    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.update_visibility(id, 0.8).await.unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();

    manager.dispatch(id, VideoEvent::Unmuted).await.unwrap();
    assert!(manager.user_interacted(id).unwrap());
    assert_eq!(player.count("overlay_remove"), 1);
    assert_eq!(
        manager.playing_state(id).unwrap(),
        PlayingState::PlayingManual
    );
}

#[tokio::test(start_paused = true)]
async fn test_manual_playback_pauses_other_videos() {
    let host = FakeHost::supporting_autoplay();
    let (manager, _analytics) = VideoManager::new(host, ManagerConfig::default());

    let first = FakePlayer::new("first");
    let second = FakePlayer::new("second");
    let first_id = manager.register(first.clone()).await;
    let second_id = manager.register(second.clone()).await;

    manager.dispatch(first_id, VideoEvent::Load).await.unwrap();
    manager.dispatch(second_id, VideoEvent::Load).await.unwrap();

    manager.dispatch(first_id, VideoEvent::Playing).await.unwrap();
    assert_eq!(second.count("pause"), 0);

    // Second video starting manually pauses the first.
    manager.dispatch(second_id, VideoEvent::Playing).await.unwrap();
    assert_eq!(first.count("pause"), 1);
    assert_eq!(second.count("pause"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unmute_pauses_other_videos() {
    let host = FakeHost::supporting_autoplay();
    let (manager, _analytics) = VideoManager::new(host, ManagerConfig::default());

    let first = FakePlayer::new("first");
    let second = FakePlayer::new("second");
    let first_id = manager.register(first.clone()).await;
    let second_id = manager.register(second.clone()).await;
    manager.dispatch(first_id, VideoEvent::Load).await.unwrap();
    manager.dispatch(second_id, VideoEvent::Load).await.unwrap();

    // Both end up playing manually. The fakes never confirm control calls
    // with events, so the pause requested on the first video when the
    // second one started does not change its state.
    manager.dispatch(first_id, VideoEvent::Playing).await.unwrap();
    manager.dispatch(second_id, VideoEvent::Playing).await.unwrap();
    let pauses_before = first.count("pause");
    assert_eq!(
        manager.playing_state(first_id).unwrap(),
        PlayingState::PlayingManual
    );
    assert_eq!(
        manager.playing_state(second_id).unwrap(),
        PlayingState::PlayingManual
    );

    // Unmuting the second video arbitrates audibility again: the first
    // one is paused exactly once, the unmuted one is left alone.
    manager.dispatch(second_id, VideoEvent::Unmuted).await.unwrap();
    assert_eq!(first.count("pause"), pauses_before + 1);
    assert_eq!(second.count("pause"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_playback_updates_media_session() {
    let host = FakeHost::supporting_autoplay();
    let (manager, _analytics) = VideoManager::new(host.clone(), ManagerConfig::default());

    let mut player = FakePlayer::new("titled");
    Arc::get_mut(&mut player).unwrap().title = Some("Launch day".to_string());
    let id = manager.register(player.clone()).await;
    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();

    assert_eq!(
        host.media_sessions.lock().unwrap().as_slice(),
        [Some("Launch day".to_string())]
    );

    // A player without metadata never reaches the host hook.
    let bare = FakePlayer::new("bare");
    let bare_id = manager.register(bare.clone()).await;
    manager.dispatch(bare_id, VideoEvent::Load).await.unwrap();
    manager.dispatch(bare_id, VideoEvent::Playing).await.unwrap();
    assert_eq!(host.media_sessions.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_platform_gets_actions_only() {
    let host = FakeHost::supporting_autoplay();
    let (manager, _analytics) = VideoManager::new(host, ManagerConfig::default());

    let mut player = FakePlayer::new("legacy");
    Arc::get_mut(&mut player).unwrap().supported = false;
    let id = manager.register(player.clone()).await;

    // Actions still reach the player.
    manager.execute(id, VideoAction::Play).unwrap();
    assert_eq!(player.count("play:user"), 1);

    // But there is no managed entry behind the id.
    assert!(manager.playing_state(id).is_err());
    assert!(manager
        .dispatch(id, VideoEvent::Playing)
        .await
        .is_err());

    // Re-registering the same player returns the original id.
    assert_eq!(manager.register(player.clone()).await, id);
}

#[tokio::test(start_paused = true)]
async fn test_rotate_to_fullscreen_cycle() {
    let host = FakeHost::supporting_autoplay();
    let (manager, _analytics) = VideoManager::new(host.clone(), ManagerConfig::default());

    let mut player = FakePlayer::new("wide");
    Arc::get_mut(&mut player).unwrap().rotate_to_fullscreen = true;
    let id = manager.register(player.clone()).await;

    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.update_visibility(id, 0.9).await.unwrap();
    manager.execute(id, VideoAction::Play).unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();

    manager.orientation_changed(Orientation::Landscape).await;
    assert_eq!(player.count("fullscreen_enter"), 1);
    // Fully visible already, so no scroll adjustment was needed.
    assert!(host.scrolls.lock().unwrap().is_empty());

    manager.orientation_changed(Orientation::Portrait).await;
    assert_eq!(player.count("fullscreen_exit"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_barely_visible_video_is_not_sent_fullscreen() {
    let host = FakeHost::supporting_autoplay();
    let (manager, _analytics) = VideoManager::new(host, ManagerConfig::default());

    let mut player = FakePlayer::new("wide");
    Arc::get_mut(&mut player).unwrap().rotate_to_fullscreen = true;
    let id = manager.register(player.clone()).await;

    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.execute(id, VideoAction::Play).unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();
    // Mostly scrolled out of view.
    manager.update_visibility(id, 0.2).await.unwrap();
    manager.dispatch(id, VideoEvent::Pause).await.unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();

    manager.orientation_changed(Orientation::Landscape).await;
    assert_eq!(player.count("fullscreen_enter"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_percentage_milestones_and_ended() {
    let host = FakeHost::supporting_autoplay();
    let (manager, mut analytics) = VideoManager::new(host, ManagerConfig::default());

    let player = FakePlayer::new("long"); // 100s duration
    let id = manager.register(player.clone()).await;
    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.execute(id, VideoAction::Play).unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();

    player.set_current_time(10.0);
    tokio::time::sleep(Duration::from_millis(600)).await;

    player.set_current_time(47.0);
    tokio::time::sleep(Duration::from_millis(4100)).await;

    manager.dispatch(id, VideoEvent::Ended).await.unwrap();

    let milestones: Vec<String> = drain(&mut analytics)
        .into_iter()
        .filter(|event| event.kind == AnalyticsEventKind::PercentagePlayed)
        .map(|event| event.vars.get("normalizedPercentage").cloned().unwrap())
        .collect();
    assert_eq!(milestones, vec!["10", "45", "100"]);
}

#[tokio::test(start_paused = true)]
async fn test_seconds_played_ticker() {
    let host = FakeHost::supporting_autoplay();
    let (manager, mut analytics) = VideoManager::new(host, ManagerConfig::default());

    let player = FakePlayer::new("clip");
    let id = manager.register(player.clone()).await;
    manager.dispatch(id, VideoEvent::Load).await.unwrap();

    // Paused videos do not accrue seconds-played.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!kinds(&drain(&mut analytics)).contains(&AnalyticsEventKind::SecondsPlayed));

    manager.dispatch(id, VideoEvent::Playing).await.unwrap();
    player.set_current_time(30.0);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let events = drain(&mut analytics);
    let kinds = kinds(&events);
    assert!(kinds.contains(&AnalyticsEventKind::SecondsPlayed));
    // Progress event rides along when the duration is known.
    let progress = events
        .iter()
        .find(|e| e.kind == AnalyticsEventKind::TimeUpdate)
        .unwrap();
    assert_eq!(progress.vars.get("time").map(String::as_str), Some("30"));
    assert_eq!(progress.vars.get("percent").map(String::as_str), Some("30"));
}

#[tokio::test(start_paused = true)]
async fn test_playback_delegation_releases_the_video() {
    let host = FakeHost::supporting_autoplay();
    let (manager, _analytics) = VideoManager::new(host, ManagerConfig::default());

    let player = FakePlayer::autoplaying("hero");
    let id = manager.register(player.clone()).await;
    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.update_visibility(id, 0.8).await.unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();

    manager.signal(id, Signal::PlaybackDelegated).unwrap();
    let pauses = player.count("pause");
    assert_eq!(pauses, 1);
    manager.dispatch(id, VideoEvent::Pause).await.unwrap();

    // The autoplay policy no longer touches the video on visibility flips.
    manager.update_visibility(id, 0.1).await.unwrap();
    manager.update_visibility(id, 0.9).await.unwrap();
    assert_eq!(player.count("play:auto"), 1);
    assert_eq!(player.count("pause"), pauses);
}

#[tokio::test(start_paused = true)]
async fn test_hidden_document_suppresses_visibility_transitions() {
    let host = FakeHost::supporting_autoplay();
    host.document_hidden.store(true, Ordering::SeqCst);
    let (manager, _analytics) = VideoManager::new(host, ManagerConfig::default());

    let player = FakePlayer::autoplaying("hero");
    let id = manager.register(player.clone()).await;
    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.update_visibility(id, 0.9).await.unwrap();

    assert_eq!(player.count("play:auto"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_stops_timers_and_registry() {
    let host = FakeHost::supporting_autoplay();
    let (manager, mut analytics) = VideoManager::new(host, ManagerConfig::default());

    let player = FakePlayer::new("clip");
    let id = manager.register(player.clone()).await;
    manager.dispatch(id, VideoEvent::Load).await.unwrap();
    manager.dispatch(id, VideoEvent::Playing).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!drain(&mut analytics).is_empty());

    manager.dispose();
    drain(&mut analytics);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert!(drain(&mut analytics).is_empty());
    assert!(manager.dispatch(id, VideoEvent::Pause).await.is_err());
    assert!(manager.playing_state(id).is_err());
}

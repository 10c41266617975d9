//! Percentage-played milestone tracking.
//!
//! A timer loop per video fires `video-percentage-played` analytics when
//! playback crosses a new milestone (multiples of the configured
//! interval). The tick frequency adapts to the video duration so short
//! videos are sampled often enough and long videos cheaply.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use marquee_common::{AnalyticsEventKind, PlayingState};
use tokio::task::JoinHandle;

use crate::config::ManagerConfig;
use crate::entry::VideoEntry;

pub(crate) struct PercentageTracker {
    entry: Weak<VideoEntry>,
    config: ManagerConfig,
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    /// Bumped on every stop; ticks scheduled under an older id are stale
    /// and discarded.
    trigger_id: u64,
    /// Last milestone fired, so each fires at most once per start.
    last: u32,
    started: bool,
    warned_short: bool,
    task: Option<JoinHandle<()>>,
}

/// Whether a reported duration is usable for milestone math. Livestreams
/// and not-yet-loaded videos report NaN, infinity or a placeholder of one
/// second.
pub(crate) fn duration_usable(duration: f64, config: &ManagerConfig) -> bool {
    duration.is_finite() && duration > config.min_duration_secs
}

/// Duration-adaptive tick frequency: the time it takes to play one
/// milestone interval, clamped to the configured bounds.
pub(crate) fn tick_frequency_ms(duration_secs: f64, config: &ManagerConfig) -> u64 {
    let ideal = duration_secs * 10.0 * f64::from(config.percentage_interval);
    (ideal as u64).clamp(
        config.percentage_frequency_min_ms,
        config.percentage_frequency_max_ms,
    )
}

/// Rounds the current position down to its milestone.
pub(crate) fn normalize_percentage(current: f64, duration: f64, interval: u32) -> u32 {
    let percentage = current / duration * 100.0;
    ((percentage / f64::from(interval)).floor() as u32) * interval
}

impl PercentageTracker {
    pub fn new(entry: Weak<VideoEntry>, config: ManagerConfig) -> Arc<Self> {
        Arc::new(Self {
            entry,
            config,
            state: Mutex::new(TrackerState::default()),
        })
    }

    /// Arms the tracker and starts the timer if the duration is already
    /// known. Restarting resets milestone bookkeeping, so `start` is safe
    /// to call on reload.
    pub fn start(self: &Arc<Self>) {
        self.stop();
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.started = true;
            state.last = 0;
        }
        if self.has_usable_duration() {
            self.spawn_timer();
        }
    }

    /// Duration became available after `start`; begin ticking if we have
    /// not already.
    pub fn on_loaded_metadata(self: &Arc<Self>) {
        {
            let Ok(state) = self.state.lock() else {
                return;
            };
            if !state.started || state.task.is_some() {
                return;
            }
        }
        if self.has_usable_duration() {
            self.spawn_timer();
        }
    }

    /// Playback ended; force the 100% milestone when the duration is known.
    pub fn on_ended(&self) {
        {
            let Ok(state) = self.state.lock() else {
                return;
            };
            if !state.started {
                return;
            }
        }
        if !self.has_usable_duration() {
            return;
        }
        if let Some(entry) = self.entry.upgrade() {
            self.maybe_trigger(100, None, &entry);
        }
    }

    /// Disarms the tracker. Any tick already scheduled observes the bumped
    /// trigger id and discards itself.
    pub fn stop(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.started = false;
        state.trigger_id += 1;
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }

    fn has_usable_duration(&self) -> bool {
        let Some(entry) = self.entry.upgrade() else {
            return false;
        };
        let duration = entry.player().duration();
        if !duration_usable(duration, &self.config) {
            return false;
        }
        let ideal_ms = duration * 10.0 * f64::from(self.config.percentage_interval);
        if ideal_ms < self.config.percentage_frequency_min_ms as f64 {
            self.warn_short_video_once(entry.player().id());
        }
        true
    }

    fn warn_short_video_once(&self, video_id: &str) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.warned_short {
            return;
        }
        state.warned_short = true;
        let shortest_secs = (self.config.percentage_frequency_min_ms as f64
            * (100.0 / f64::from(self.config.percentage_interval))
            / 1000.0)
            .ceil();
        log::warn!(
            "video {video_id} is too short for accurate percentage-played reporting \
             (supported from {shortest_secs}s); milestones may be skipped"
        );
    }

    fn spawn_timer(self: &Arc<Self>) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.task.is_some() {
            return;
        }
        state.trigger_id += 1;
        let trigger_id = state.trigger_id;
        let tracker = Arc::downgrade(self);
        state.task = Some(tokio::spawn(run_timer(tracker, trigger_id)));
    }

    fn is_current(&self, trigger_id: u64) -> bool {
        self.state
            .lock()
            .is_ok_and(|state| state.trigger_id == trigger_id)
    }

    fn maybe_trigger(&self, milestone: u32, trigger_id: Option<u64>, entry: &Arc<VideoEntry>) {
        {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if !state.started {
                return;
            }
            if let Some(id) = trigger_id
                && state.trigger_id != id
            {
                return;
            }
            if milestone == 0 || milestone == state.last {
                return;
            }
            state.last = milestone;
        }
        let mut vars = BTreeMap::new();
        vars.insert("normalizedPercentage".to_string(), milestone.to_string());
        entry.analytics_event(AnalyticsEventKind::PercentagePlayed, vars);
    }
}

async fn run_timer(tracker: Weak<PercentageTracker>, trigger_id: u64) {
    loop {
        let sleep_ms = {
            let Some(tracker) = tracker.upgrade() else {
                return;
            };
            let Some(entry) = tracker.entry.upgrade() else {
                return;
            };
            if !tracker.is_current(trigger_id) {
                return;
            }
            if entry.playing_state() == PlayingState::Paused {
                tracker.config.percentage_frequency_when_paused_ms
            } else {
                let duration = entry.player().duration();
                if duration_usable(duration, &tracker.config) {
                    let milestone = normalize_percentage(
                        entry.player().current_time(),
                        duration,
                        tracker.config.percentage_interval,
                    );
                    tracker.maybe_trigger(milestone, Some(trigger_id), &entry);
                    tick_frequency_ms(duration, &tracker.config)
                } else {
                    // Duration can degrade mid-playback (livestream switch);
                    // keep polling cheaply until it comes back.
                    tracker.config.percentage_frequency_when_paused_ms
                }
            }
        };
        tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
    }
}

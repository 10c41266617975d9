//! Rotate-to-fullscreen coordination.
//!
//! Tracks which opted-in video is "best centered" in the viewport and, on
//! device rotation to landscape, sends it fullscreen; rotation back to
//! portrait exits. Only one video can hold the fullscreen slot.

use std::cmp::Ordering;

use marquee_common::{
    LayoutRect, Orientation, Platform, PlayingState, VideoError, VideoId, VideoPlayer, Viewport,
};

use crate::config::ManagerConfig;

/// Snapshot of a candidate video's geometry and state at ranking time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub id: VideoId,
    pub ratio: f64,
    pub rect: LayoutRect,
    pub state: PlayingState,
}

/// What a rotation requires the manager to do, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RotationAction {
    Enter(VideoId),
    Exit(VideoId),
    None,
}

/// Whether a video opting into rotate-to-fullscreen should be handled by
/// this manager.
///
/// Non-interactive videos cannot be exited by the user, which is a
/// caller-facing configuration error.
pub(crate) fn requires_auto_fullscreen(
    player: &dyn VideoPlayer,
    platform: Platform,
) -> Result<bool, VideoError> {
    if player.preimplements_auto_fullscreen() || !player.has_rotate_to_fullscreen() {
        return Ok(false);
    }
    if !player.is_interactive() {
        return Err(VideoError::FullscreenRequiresControls(
            player.id().to_string(),
        ));
    }
    Ok(can_fullscreen(player, platform))
}

/// Native video surfaces can always fullscreen; frames cannot on iOS and
/// Safari unless the embedded player exposes its own fullscreen API.
fn can_fullscreen(player: &dyn VideoPlayer, platform: Platform) -> bool {
    player.is_native_video() || !(platform.ios || platform.safari) || player.has_fullscreen_api()
}

/// Ranks two candidates: higher visibility ratio wins, but ratios within
/// the tolerance are treated as ties and broken by distance of the video's
/// vertical center from the viewport center, then by the smaller top.
pub(crate) fn compare_candidates(
    a: &Candidate,
    b: &Candidate,
    viewport_center: f64,
    tolerance: f64,
) -> Ordering {
    if (a.ratio - b.ratio).abs() > tolerance {
        return b.ratio.total_cmp(&a.ratio);
    }
    let a_distance = (viewport_center - a.rect.center_y()).abs();
    let b_distance = (viewport_center - b.rect.center_y()).abs();
    let by_center = a_distance.total_cmp(&b_distance);
    if by_center != Ordering::Equal {
        return by_center;
    }
    a.rect.top.total_cmp(&b.rect.top)
}

pub(crate) struct AutoFullscreenManager {
    eligible: Vec<VideoId>,
    currently_centered: Option<VideoId>,
    currently_in_fullscreen: Option<VideoId>,
    landscape: bool,
}

impl AutoFullscreenManager {
    pub fn new() -> Self {
        Self {
            eligible: Vec::new(),
            currently_centered: None,
            currently_in_fullscreen: None,
            landscape: false,
        }
    }

    pub fn register(&mut self, id: VideoId) {
        if !self.eligible.contains(&id) {
            self.eligible.push(id);
            log::debug!("video {id} registered for rotate-to-fullscreen");
        }
    }

    pub fn eligible(&self) -> &[VideoId] {
        &self.eligible
    }

    /// Re-ranks candidates and stores the best centered one. While in
    /// landscape the selection is frozen so the fullscreen video does not
    /// change under the user.
    pub fn select_best_centered(
        &mut self,
        candidates: Vec<Candidate>,
        viewport: Viewport,
        config: &ManagerConfig,
    ) -> Option<VideoId> {
        if self.landscape {
            return self.currently_centered;
        }
        let viewport_center = viewport.height / 2.0;
        let mut playing: Vec<&Candidate> = candidates
            .iter()
            .filter(|candidate| candidate.state == PlayingState::PlayingManual)
            .collect();
        playing.sort_by(|a, b| {
            compare_candidates(a, b, viewport_center, config.fullscreen_ranking_tolerance)
        });
        self.currently_centered = playing
            .first()
            .filter(|candidate| candidate.ratio > config.autoplay_min_visibility)
            .map(|candidate| candidate.id);
        self.currently_centered
    }

    pub fn on_rotation(&mut self, orientation: Orientation) -> RotationAction {
        match orientation {
            Orientation::Landscape => {
                self.landscape = true;
                if let Some(id) = self.currently_centered
                    && self.currently_in_fullscreen.is_none()
                {
                    self.currently_in_fullscreen = Some(id);
                    return RotationAction::Enter(id);
                }
            }
            Orientation::Portrait => {
                self.landscape = false;
                if let Some(id) = self.currently_in_fullscreen.take() {
                    return RotationAction::Exit(id);
                }
            }
        }
        RotationAction::None
    }

    /// The player reported a fullscreen exit of its own (back button,
    /// native chrome); just release the slot.
    pub fn exited_natively(&mut self) {
        self.currently_in_fullscreen = None;
    }

    pub fn dispose(&mut self) {
        self.eligible.clear();
        self.currently_centered = None;
        self.currently_in_fullscreen = None;
    }
}

impl Default for AutoFullscreenManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Simulated host environment, configured from the scenario file.

use async_trait::async_trait;
use marquee_common::{
    HostEnvironment, LayoutRect, Platform, ScrollPosition, VideoMetadata, Viewport,
};

use crate::scenario::Scenario;

pub struct SimHost {
    autoplay_supported: bool,
    document_visible: bool,
    platform: Platform,
    viewport: Viewport,
}

impl SimHost {
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            autoplay_supported: scenario.autoplay_supported,
            document_visible: scenario.document_visible,
            platform: scenario.platform,
            viewport: Viewport {
                width: scenario.viewport.width,
                height: scenario.viewport.height,
            },
        }
    }
}

#[async_trait]
impl HostEnvironment for SimHost {
    async fn supports_muted_autoplay(&self) -> bool {
        self.autoplay_supported
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn is_document_visible(&self) -> bool {
        self.document_visible
    }

    fn scroll_into_view(&self, rect: LayoutRect, pos: ScrollPosition) {
        log::info!("scrolling rect at top {} into view ({pos:?})", rect.top);
    }

    fn update_media_session(&self, metadata: VideoMetadata) {
        log::info!("media session: now playing {:?}", metadata.title);
    }
}

//! Marquee video manager.
//!
//! Coordinates every video on a page-like surface from one place:
//! visibility-gated autoplay (muted, with overlay decorations until the
//! user opts in), playback and visibility analytics sessions,
//! percentage-played milestones, a shared seconds-played ticker,
//! only-one-audible-video arbitration and rotate-to-fullscreen.
//!
//! Hosts implement [`marquee_common::VideoPlayer`] for each video and
//! [`marquee_common::HostEnvironment`] once, then drive a [`VideoManager`]:
//!
//! ```no_run
//! # async fn demo(host: std::sync::Arc<dyn marquee_common::HostEnvironment>,
//! #               player: std::sync::Arc<dyn marquee_common::VideoPlayer>) {
//! use marquee_manager::{ManagerConfig, VideoManager};
//! use marquee_common::VideoEvent;
//!
//! let (manager, mut analytics) = VideoManager::new(host, ManagerConfig::default());
//! let id = manager.register(player).await;
//! manager.dispatch(id, VideoEvent::Load).await.ok();
//! manager.update_visibility(id, 0.8).await.ok();
//!
//! while let Some(event) = analytics.recv().await {
//!     println!("{}", event.kind.as_str());
//! }
//! # }
//! ```

pub mod config;
mod entry;
mod fullscreen;
mod manager;
mod percentage;
mod session;
mod signals;

pub use config::ManagerConfig;
pub use manager::VideoManager;

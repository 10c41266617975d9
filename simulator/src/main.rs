//! Scenario driver for the marquee video manager.
//!
//! Loads a TOML scenario, registers scripted players with a manager and
//! replays the timeline against it, printing the resulting analytics
//! events as JSON.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use marquee_common::{AnalyticsEvent, VideoAction, VideoError, VideoEvent, VideoId};
use marquee_manager::VideoManager;
use tokio::sync::mpsc;

mod host;
mod player;
mod scenario;

use host::SimHost;
use player::ScriptedPlayer;
use scenario::{Scenario, Step, StepAction};

#[derive(Parser)]
#[command(name = "marquee-sim")]
#[command(about = "Scripted scenario driver for the marquee video manager", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the scenario file (TOML)
    scenario: String,

    /// How long to keep running after the last step, in milliseconds
    #[arg(short, long, default_value = "2000")]
    grace_ms: u64,

    /// Pretty-print analytics events instead of one JSON object per line
    #[arg(short, long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let raw = std::fs::read_to_string(&cli.scenario)
        .with_context(|| format!("Failed to read scenario file: {}", cli.scenario))?;
    let scenario: Scenario = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse scenario file: {}", cli.scenario))?;

    log::info!(
        "Loaded scenario: {} videos, {} steps",
        scenario.videos.len(),
        scenario.steps.len()
    );

    run(scenario, &cli).await
}

async fn run(scenario: Scenario, cli: &Cli) -> Result<()> {
    let host = Arc::new(SimHost::new(&scenario));
    let (manager, mut analytics) = VideoManager::new(host, scenario.config.clone());

    let (feedback, mut events) = mpsc::unbounded_channel();
    let mut ids: HashMap<String, VideoId> = HashMap::new();
    for spec in &scenario.videos {
        let player = ScriptedPlayer::new(spec.clone(), feedback.clone());
        let id = manager.register(player).await;
        ids.insert(spec.id.clone(), id);
    }

    let mut steps = scenario.steps;
    steps.sort_by_key(|step| step.at_ms);

    let start = tokio::time::Instant::now();
    for step in steps {
        let deadline = start + Duration::from_millis(step.at_ms);
        pump_until(&manager, &ids, &mut analytics, &mut events, deadline, cli).await?;
        apply_step(&manager, &ids, step).await?;
    }

    // Let timers and confirmation events settle before shutting down.
    let end = tokio::time::Instant::now() + Duration::from_millis(cli.grace_ms);
    pump_until(&manager, &ids, &mut analytics, &mut events, end, cli).await?;

    manager.dispose();
    while let Ok(event) = analytics.try_recv() {
        print_event(&event, cli.pretty)?;
    }
    Ok(())
}

/// Forwards player confirmations and prints analytics until the deadline.
async fn pump_until(
    manager: &VideoManager,
    ids: &HashMap<String, VideoId>,
    analytics: &mut mpsc::UnboundedReceiver<AnalyticsEvent>,
    events: &mut mpsc::UnboundedReceiver<(String, VideoEvent)>,
    deadline: tokio::time::Instant,
    cli: &Cli,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return Ok(()),
            Some(event) = analytics.recv() => print_event(&event, cli.pretty)?,
            Some((video, event)) = events.recv() => {
                if let Some(&id) = ids.get(&video) {
                    manager.dispatch(id, event).await?;
                }
            }
        }
    }
}

async fn apply_step(
    manager: &VideoManager,
    ids: &HashMap<String, VideoId>,
    step: Step,
) -> Result<()> {
    log::debug!("applying step at {}ms: {:?}", step.at_ms, step.action);
    match step.action {
        StepAction::Event { video, event } => {
            manager.dispatch(lookup(ids, &video)?, event).await?;
        }
        StepAction::Visibility { video, ratio } => {
            manager.update_visibility(lookup(ids, &video)?, ratio).await?;
        }
        StepAction::Action { video, action } => {
            let action = VideoAction::parse(&action)
                .ok_or_else(|| VideoError::Scenario(format!("unknown action '{action}'")))?;
            manager.execute(lookup(ids, &video)?, action)?;
        }
        StepAction::Orientation { orientation } => {
            manager.orientation_changed(orientation).await;
        }
        StepAction::Signal { video, signal } => {
            manager.signal(lookup(ids, &video)?, signal)?;
        }
    }
    Ok(())
}

fn lookup(ids: &HashMap<String, VideoId>, video: &str) -> Result<VideoId> {
    ids.get(video)
        .copied()
        .ok_or_else(|| VideoError::Scenario(format!("unknown video '{video}'")).into())
}

fn print_event(event: &AnalyticsEvent, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(event)?
    } else {
        serde_json::to_string(event)?
    };
    println!("{json}");
    Ok(())
}

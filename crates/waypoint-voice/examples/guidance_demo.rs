//! Example: Spoken guidance for a short drive
//!
//! Publishes a handful of guidance events through an in-process hub and lets
//! the console engine "speak" them into the log at a natural pace.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use waypoint_voice::{
    AnnouncerConfig, Capabilities, ConsoleSpeechEngine, FixedAudioMode, GuidanceAnnouncer,
    GuidanceEvent, GuidanceEventHub, GuidanceKind, LoggingFocusManager,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🧭 Waypoint guidance demo");

    let capabilities = Capabilities {
        engine: Arc::new(ConsoleSpeechEngine::new(240)),
        focus: Arc::new(LoggingFocusManager::new()),
        audio_mode: Arc::new(FixedAudioMode::default()),
    };
    let announcer = GuidanceAnnouncer::new(AnnouncerConfig::from_env(), capabilities)?;
    info!("Engine state: {:?}", announcer.announcer().wait_ready().await);

    let hub = Arc::new(GuidanceEventHub::new());
    let _subscription = announcer.start(hub.clone())?;

    let route = [
        GuidanceEvent::new("1", GuidanceKind::Depart).onto("Market Street"),
        GuidanceEvent::new("2", GuidanceKind::TurnRight).in_meters(350).onto("5th Avenue"),
        GuidanceEvent::new("3", GuidanceKind::Roundabout { exit: 2 }).in_meters(1200),
        GuidanceEvent::new("4", GuidanceKind::Arrive).non_interruptible(),
    ];
    for event in route {
        hub.publish(event);
        tokio::time::sleep(Duration::from_secs(3)).await;
    }

    announcer.shutdown();
    info!("👋 Arrived");
    Ok(())
}

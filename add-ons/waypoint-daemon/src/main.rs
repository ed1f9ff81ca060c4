//! Waypoint Guidance Daemon
//!
//! Replays a JSON-lines guidance script through the announcer. Each line is
//! `{"delay_ms": 1500, "event": {...}}` or `{"audio_mode": "in_call"}`; the
//! delay is waited before the line is applied. The script comes from
//! `WAYPOINT_GUIDANCE_SCRIPT` or stdin.

use anyhow::{Context, Result};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypoint_voice::{
    AnnouncerConfig, AudioMode, Capabilities, GuidanceAnnouncer, GuidanceEvent, GuidanceEventHub,
    LoggingFocusManager, SharedAudioMode, SpeechEngine,
};

const DRAIN_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
struct ScriptLine {
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    audio_mode: Option<AudioMode>,
    #[serde(default)]
    event: Option<GuidanceEvent>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any env::var calls)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[waypoint-daemon] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    let locale = config.locale.clone();
    let audio_mode = Arc::new(SharedAudioMode::default());
    let capabilities = Capabilities {
        engine: speech_engine()?,
        focus: Arc::new(LoggingFocusManager::new()),
        audio_mode: audio_mode.clone(),
    };

    let announcer = GuidanceAnnouncer::new(config, capabilities).context("create guidance announcer")?;
    let hub = Arc::new(GuidanceEventHub::new());
    let _subscription = announcer.start(hub.clone()).context("subscribe to guidance hub")?;

    let mut states = announcer.announcer().state_stream();
    let watcher = tokio::spawn(async move {
        while let Some(token) = states.next().await {
            tracing::info!(generation = token.generation, state = ?token.state, "announcer state");
        }
    });

    tracing::info!(locale = %locale, "Waypoint daemon started");

    tokio::select! {
        result = run_script(hub, audio_mode) => {
            match result {
                Ok(published) => tracing::info!(published, "guidance script finished"),
                Err(e) => tracing::warn!(error = %e, "guidance script aborted"),
            }
            tokio::select! {
                _ = drain(&announcer) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("CTRL-C received; skipping remaining announcements");
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("CTRL-C received; shutting down daemon");
        }
    }

    announcer.shutdown();
    watcher.abort();
    Ok(())
}

fn load_config() -> Result<AnnouncerConfig> {
    match std::env::var("WAYPOINT_CONFIG") {
        Ok(path) => AnnouncerConfig::load(&path).with_context(|| format!("load config from {}", path)),
        Err(_) => Ok(AnnouncerConfig::from_env()),
    }
}

/// Console engine paced by `WAYPOINT_WORDS_PER_MINUTE` (default 180).
#[cfg(not(feature = "playback"))]
fn speech_engine() -> Result<Arc<dyn SpeechEngine>> {
    let words_per_minute = std::env::var("WAYPOINT_WORDS_PER_MINUTE")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(180);
    Ok(Arc::new(waypoint_voice::ConsoleSpeechEngine::new(words_per_minute)))
}

#[cfg(feature = "playback")]
fn speech_engine() -> Result<Arc<dyn SpeechEngine>> {
    let backend = waypoint_voice::OpenAiTts::from_env().context("configure TTS backend")?;
    Ok(Arc::new(waypoint_voice::PlaybackSpeechEngine::new(Arc::new(backend))))
}

async fn script_reader() -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match std::env::var("WAYPOINT_GUIDANCE_SCRIPT") {
        Ok(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("open guidance script {}", path))?;
            Ok(Box::new(BufReader::new(file)))
        }
        Err(_) => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Apply every script line in order. Returns how many events were published.
async fn run_script(hub: Arc<GuidanceEventHub>, audio_mode: Arc<SharedAudioMode>) -> Result<usize> {
    let mut lines = script_reader().await?.lines();
    let mut published = 0;
    let mut line_no = 0usize;

    while let Some(raw) = lines.next_line().await.context("read guidance script")? {
        line_no += 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry: ScriptLine = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed script line");
                continue;
            }
        };

        if entry.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(entry.delay_ms)).await;
        }
        if let Some(mode) = entry.audio_mode {
            audio_mode.set(mode);
            tracing::info!(?mode, "audio mode changed");
        }
        if let Some(event) = entry.event {
            hub.publish(event);
            published += 1;
        }
    }
    Ok(published)
}

/// Wait for the queue to empty and the last utterance to finish.
async fn drain(announcer: &GuidanceAnnouncer) {
    let inner = announcer.announcer();
    loop {
        let state = inner.state();
        if state.is_terminal() || (inner.pending_messages() == 0 && !state.is_speaking()) {
            return;
        }
        tokio::time::sleep(DRAIN_POLL).await;
    }
}

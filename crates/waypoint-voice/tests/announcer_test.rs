//! Queue, state, and focus behaviour of the announcer against recording doubles.

mod common;

use common::{config, eventually, init_tracing, settle, Harness, RecordingEngine, RecordingFocus};
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use waypoint_voice::{
    Announcer, AnnouncerConfig, AnnouncerState, AudioAttributes, AudioMode, DiscardReason,
    FocusGain, LanguageAvailability, Locale, QueueMode, SpeakOutcome, SpokenMessage, StopPolicy,
    UtteranceResult, RELATIVE_TTS_VOLUME,
};

async fn ready(harness: &Harness, config: AnnouncerConfig) -> Announcer {
    init_tracing();
    let announcer = Announcer::new(config, harness.capabilities()).unwrap();
    let state = announcer.wait_ready().await;
    assert_eq!(state, AnnouncerState::Idle { last: None });
    announcer
}

#[tokio::test]
async fn configures_engine_on_ready() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;

    assert_eq!(harness.engine.languages(), vec!["en-US".parse::<Locale>().unwrap()]);
    assert_eq!(harness.engine.attributes(), Some(AudioAttributes::NAVIGATION_SPEECH));

    assert!(announcer.speak(SpokenMessage::new("1", "Turn left")).await.is_queued());
    eventually("first utterance", || harness.engine.calls().len() == 1).await;

    let call = &harness.engine.calls()[0];
    assert_eq!(call.text, "Turn left");
    assert_eq!(call.mode, QueueMode::Flush);
    assert_eq!(call.volume, RELATIVE_TTS_VOLUME);
    assert_eq!(harness.focus.last_gain(), Some(FocusGain::TransientMayDuck));
    assert!(announcer.is_speaking());
}

#[tokio::test]
async fn non_interruptible_messages_play_in_order_without_overlap() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;

    for id in ["a", "b", "c", "d"] {
        let outcome = announcer.enqueue(SpokenMessage::non_interruptible(id, format!("message {}", id)));
        assert_eq!(outcome, SpeakOutcome::Queued);
    }

    for (step, id) in ["a", "b", "c", "d"].into_iter().enumerate() {
        eventually("next utterance", || harness.engine.current().as_deref() == Some(id)).await;
        settle().await;
        assert_eq!(harness.engine.calls().len(), step + 1, "speak issued before {} finished", id);
        assert_eq!(announcer.pending_messages(), 3 - step);
        assert_eq!(harness.focus.held(), 1);
        harness.engine.complete();
    }

    eventually("idle", || announcer.state() == AnnouncerState::Idle { last: Some(UtteranceResult::Success) }).await;
    assert_eq!(harness.engine.spoken_ids(), vec!["a", "b", "c", "d"]);
    assert!(harness.engine.flushed().is_empty());
    assert_eq!(harness.focus.requests(), 4);
    assert_eq!(harness.focus.abandons(), 4);
}

#[tokio::test]
async fn error_callback_releases_the_queue() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;

    announcer.enqueue(SpokenMessage::non_interruptible("a", "first"));
    announcer.enqueue(SpokenMessage::non_interruptible("b", "second"));
    eventually("a speaking", || harness.engine.current().as_deref() == Some("a")).await;

    harness.engine.fail();
    eventually("b speaking", || harness.engine.current().as_deref() == Some("b")).await;
    assert_eq!(harness.focus.held(), 1);

    harness.engine.complete();
    eventually("idle", || !announcer.is_speaking()).await;
    assert_eq!(harness.focus.held(), 0);
}

#[tokio::test]
async fn phone_call_leaves_queue_untouched() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;

    announcer.enqueue(SpokenMessage::non_interruptible("a", "first"));
    announcer.enqueue(SpokenMessage::non_interruptible("b", "second"));
    eventually("a speaking", || harness.engine.current().as_deref() == Some("a")).await;
    let pending = announcer.pending_messages();

    for mode in [AudioMode::Ringtone, AudioMode::InCall, AudioMode::InCommunication, AudioMode::CallScreening] {
        harness.audio_mode.set(mode);
        let outcome = announcer.speak(SpokenMessage::new("call", "during call")).await;
        assert_eq!(outcome, SpeakOutcome::Discarded(DiscardReason::PhoneCall));
        assert_eq!(announcer.pending_messages(), pending);
    }

    harness.audio_mode.set(AudioMode::Normal);
    harness.engine.complete();
    eventually("b speaking", || harness.engine.current().as_deref() == Some("b")).await;
    harness.engine.complete();
    settle().await;
    assert!(!harness.engine.spoken_ids().contains(&"call".to_string()));
}

#[tokio::test]
async fn calls_are_ignored_when_dropping_is_disabled() {
    let harness = Harness::new();
    let announcer = ready(&harness, AnnouncerConfig { drop_during_calls: false, ..config() }).await;

    harness.audio_mode.set(AudioMode::InCall);
    assert!(announcer.speak(SpokenMessage::new("1", "Keep right")).await.is_queued());
    eventually("spoken", || harness.engine.calls().len() == 1).await;
}

#[tokio::test]
async fn late_done_for_superseded_utterance_is_ignored() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;

    announcer.enqueue(SpokenMessage::new("old", "first"));
    announcer.enqueue(SpokenMessage::new("new", "second"));
    eventually("new speaking", || announcer.state().is_speaking_id("new")).await;
    let before = announcer.snapshot();

    let old = harness.engine.calls()[0].utterance_id.clone();
    harness.engine.send_done(&old);
    settle().await;

    let after = announcer.snapshot();
    assert_eq!(after.state, AnnouncerState::Speaking { utterance_id: "new".to_string() });
    assert_eq!(after.generation, before.generation);
    assert_eq!(harness.engine.flushed(), vec!["old"]);
}

#[tokio::test]
async fn shutdown_stops_delivery_to_engine() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;

    announcer.enqueue(SpokenMessage::non_interruptible("a", "first"));
    announcer.enqueue(SpokenMessage::non_interruptible("b", "second"));
    eventually("a speaking", || harness.engine.calls().len() == 1).await;

    announcer.shutdown();
    announcer.shutdown();
    assert!(announcer.is_shut_down());
    assert!(harness.engine.is_shut_down());
    assert_eq!(announcer.pending_messages(), 0);

    let outcome = announcer.speak(SpokenMessage::new("c", "third")).await;
    assert_eq!(outcome, SpeakOutcome::Discarded(DiscardReason::ShutDown));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(harness.engine.spoken_ids(), vec!["a"]);
    assert_eq!(harness.focus.requests(), harness.focus.abandons());
}

#[tokio::test]
async fn dropping_the_announcer_shuts_down() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;
    announcer.enqueue(SpokenMessage::new("a", "first"));
    eventually("a speaking", || harness.engine.calls().len() == 1).await;

    drop(announcer);
    assert!(harness.engine.is_shut_down());
    assert_eq!(harness.focus.held(), 0);
}

#[tokio::test]
async fn interruptible_then_blocking_then_interruptible() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;

    announcer.enqueue(SpokenMessage::new("A", "first"));
    announcer.enqueue(SpokenMessage::non_interruptible("B", "second"));
    announcer.enqueue(SpokenMessage::new("C", "third"));

    eventually("A and B issued", || harness.engine.calls().len() == 2).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.engine.spoken_ids(), vec!["A", "B"]);
    assert_eq!(harness.engine.flushed(), vec!["A"]);

    harness.engine.complete();
    eventually("C issued", || harness.engine.calls().len() == 3).await;
    assert_eq!(harness.engine.spoken_ids(), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn reannounced_id_does_not_release_blocking_message() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;

    announcer.enqueue(SpokenMessage::new("turn-7", "Turn left"));
    announcer.enqueue(SpokenMessage::non_interruptible("turn-7", "Turn left now"));
    announcer.enqueue(SpokenMessage::new("next", "Then keep right"));

    eventually("both turn-7 issued", || harness.engine.calls().len() == 2).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(harness.engine.spoken_ids(), vec!["turn-7", "turn-7"]);
    assert_eq!(harness.engine.flushed(), vec!["turn-7"]);
    assert!(announcer.state().is_speaking_id("turn-7"));
    assert_eq!(harness.focus.held(), 1);

    let calls = harness.engine.calls();
    assert_ne!(calls[0].utterance_id, calls[1].utterance_id);

    harness.engine.complete();
    eventually("next issued", || harness.engine.calls().len() == 3).await;
    assert_eq!(harness.engine.spoken_ids(), vec!["turn-7", "turn-7", "next"]);
}

#[tokio::test]
async fn stop_keeps_pending_by_default() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;
    assert_eq!(announcer.config().stop_policy, StopPolicy::KeepPending);

    announcer.enqueue(SpokenMessage::non_interruptible("a", "first"));
    announcer.enqueue(SpokenMessage::non_interruptible("b", "second"));
    eventually("a speaking", || harness.engine.current().as_deref() == Some("a")).await;

    announcer.stop_speaking();
    assert_eq!(harness.engine.stop_count(), 1);
    eventually("b speaking", || harness.engine.current().as_deref() == Some("b")).await;
    assert_eq!(harness.focus.held(), 1);
}

#[tokio::test]
async fn stop_can_clear_pending() {
    let harness = Harness::new();
    let announcer = ready(
        &harness,
        AnnouncerConfig {
            stop_policy: StopPolicy::ClearPending,
            ..config()
        },
    )
    .await;

    announcer.enqueue(SpokenMessage::non_interruptible("a", "first"));
    announcer.enqueue(SpokenMessage::non_interruptible("b", "second"));
    announcer.enqueue(SpokenMessage::non_interruptible("c", "third"));
    eventually("a speaking", || harness.engine.current().as_deref() == Some("a")).await;

    announcer.stop_speaking();
    eventually("queue drained", || announcer.pending_messages() == 0).await;
    assert_eq!(announcer.state(), AnnouncerState::Idle { last: Some(UtteranceResult::Stopped) });
    assert_eq!(harness.engine.spoken_ids(), vec!["a"]);
    assert_eq!(harness.focus.held(), 0);

    announcer.enqueue(SpokenMessage::new("d", "after stop"));
    eventually("d speaking", || harness.engine.current().as_deref() == Some("d")).await;
    assert_eq!(harness.engine.spoken_ids(), vec!["a", "d"]);
}

#[tokio::test]
async fn init_failure_is_terminal() {
    let harness = Harness::with_engine(RecordingEngine::failing_init("no voices installed"));
    init_tracing();
    let announcer = Announcer::new(config(), harness.capabilities()).unwrap();

    match announcer.wait_ready().await {
        AnnouncerState::InitializationError { reason } => {
            assert!(reason.contains("Init listener returned error"), "{}", reason);
            assert!(reason.contains("no voices installed"), "{}", reason);
        }
        other => panic!("expected initialization error, got {:?}", other),
    }

    let outcome = announcer.speak(SpokenMessage::new("1", "Turn left")).await;
    assert_eq!(outcome, SpeakOutcome::Discarded(DiscardReason::InitializationFailed));
    announcer.stop_speaking();
    assert!(announcer.state().is_terminal());
    assert!(harness.engine.calls().is_empty());
}

#[tokio::test]
async fn language_problems_fail_initialization() {
    let cases = [
        (LanguageAvailability::MissingData, "Missing language data for en-US"),
        (LanguageAvailability::NotSupported, "Language not supported: en-US"),
        (LanguageAvailability::Unknown(-7), "Unknown setLanguage error"),
    ];
    for (availability, expected) in cases {
        let harness = Harness::with_engine(RecordingEngine::with_availability(availability));
        let announcer = Announcer::new(config(), harness.capabilities()).unwrap();
        match announcer.wait_ready().await {
            AnnouncerState::InitializationError { reason } => {
                assert!(reason.contains(expected), "{} vs {}", reason, expected)
            }
            other => panic!("expected initialization error, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn empty_text_is_discarded() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;
    let outcome = announcer.speak(SpokenMessage::new("1", "   ")).await;
    assert_eq!(outcome, SpeakOutcome::Discarded(DiscardReason::EmptyText));
    assert_eq!(announcer.pending_messages(), 0);
}

#[test]
fn construction_outside_a_runtime_fails() {
    let harness = Harness::new();
    assert!(Announcer::new(config(), harness.capabilities()).is_err());

    let state = tokio_test::block_on(async {
        let announcer = Announcer::new(config(), harness.capabilities()).unwrap();
        announcer.wait_ready().await
    });
    assert_eq!(state, AnnouncerState::Idle { last: None });
}

#[tokio::test]
async fn invalid_volume_is_rejected() {
    let harness = Harness::new();
    let result = Announcer::new(AnnouncerConfig { relative_volume: 1.5, ..config() }, harness.capabilities());
    assert!(result.is_err());
}

#[tokio::test]
async fn legacy_focus_path_pairs_requests() {
    let harness = Harness {
        focus: Arc::new(RecordingFocus::legacy()),
        ..Harness::new()
    };
    let announcer = ready(&harness, config()).await;

    announcer.enqueue(SpokenMessage::new("a", "first"));
    announcer.enqueue(SpokenMessage::new("b", "second"));
    eventually("b speaking", || harness.engine.current().as_deref() == Some("b")).await;
    harness.engine.complete();
    eventually("idle", || !announcer.is_speaking()).await;

    assert_eq!(harness.focus.requests(), 2);
    assert_eq!(harness.focus.abandons(), 2);
}

#[tokio::test]
async fn state_stream_reports_transitions() {
    let harness = Harness::new();
    let announcer = ready(&harness, config()).await;
    let mut states = announcer.state_stream();

    let first = states.next().await.unwrap();
    assert_eq!(first.state, AnnouncerState::Idle { last: None });

    announcer.enqueue(SpokenMessage::non_interruptible("a", "first"));
    let speaking = tokio::time::timeout(Duration::from_secs(1), states.next())
        .await
        .unwrap()
        .unwrap();
    assert!(speaking.state.is_speaking_id("a"));
    assert!(speaking.generation > first.generation);

    harness.engine.complete();
    let done = tokio::time::timeout(Duration::from_secs(1), states.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.state, AnnouncerState::Idle { last: Some(UtteranceResult::Success) });
    assert_eq!(done.generation, speaking.generation);
    assert!(done.changed_at >= speaking.changed_at);
}

/// Random interleavings of speak, completion, failure, stop, and late
/// callbacks. Focus must be requested once per start and abandoned once per
/// end, and never held by more than one utterance.
#[tokio::test]
async fn focus_pairs_across_random_interleavings() {
    init_tracing();
    let mut rng = StdRng::seed_from_u64(0x5eed_f0c5);

    for round in 0..100 {
        let harness = Harness::new();
        let policy = if rng.gen_bool(0.5) {
            StopPolicy::KeepPending
        } else {
            StopPolicy::ClearPending
        };
        let announcer = Announcer::new(
            AnnouncerConfig {
                stop_policy: policy,
                ..config()
            },
            harness.capabilities(),
        )
        .unwrap();
        announcer.wait_ready().await;

        let mut next_id = 0u32;
        for _ in 0..rng.gen_range(5..30) {
            match rng.gen_range(0..6) {
                0 | 1 => {
                    next_id += 1;
                    let id = format!("{}-{}", round, next_id);
                    let message = if rng.gen_bool(0.5) {
                        SpokenMessage::new(id, "interruptible")
                    } else {
                        SpokenMessage::non_interruptible(id, "blocking")
                    };
                    announcer.enqueue(message);
                }
                2 => {
                    harness.engine.complete();
                }
                3 => {
                    harness.engine.fail();
                }
                4 => announcer.stop_speaking(),
                _ => {
                    let calls = harness.engine.calls();
                    if !calls.is_empty() {
                        let stale = &calls[rng.gen_range(0..calls.len())].utterance_id;
                        harness.engine.send_done(stale);
                    }
                }
            }
            settle().await;
            assert!(harness.focus.held() <= 1, "round {}: focus held twice", round);
        }

        announcer.shutdown();
        let starts = harness.engine.calls().len();
        assert_eq!(harness.focus.requests(), starts, "round {}", round);
        assert_eq!(harness.focus.abandons(), starts, "round {}", round);
    }
}

//! End-to-end behaviour of the engine against the runtime's virtual clock.

use focusclock::prelude::*;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn engine() -> FocusclockEngine {
    FocusclockEngine::new(FocusclockConfig::default())
}

fn assert_near(actual: Duration, expected: Duration) {
    let tolerance = Duration::from_millis(20);
    assert!(
        actual + tolerance >= expected && actual <= expected + tolerance,
        "expected ~{:?}, got {:?}",
        expected,
        actual
    );
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_elapsed_and_remaining() {
    let engine = engine();
    engine.start(Duration::from_secs(60)).await;
    sleep(Duration::from_millis(500)).await;

    let paused = engine.pause().await;
    assert!(paused.to.is_paused());
    assert_near(engine.elapsed(), Duration::from_millis(500));
    assert_near(engine.remaining(), Duration::from_millis(59_500));

    sleep(Duration::from_secs(5)).await;
    assert_near(engine.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn running_session_finishes_on_its_own() {
    let engine = engine();
    let mut states = engine.subscribe();
    assert_eq!(states.recv().await, Some(TimerState::Idle));

    engine.start(Duration::from_millis(500)).await;
    sleep(Duration::from_millis(700)).await;

    assert_eq!(engine.current_state(), TimerState::Finished);
    assert_eq!(engine.remaining(), Duration::ZERO);
    assert!(!engine.is_ticking().await);

    let mut last = None;
    while let Ok(Some(state)) = timeout(Duration::from_millis(50), states.recv()).await {
        last = Some(state);
    }
    assert_eq!(last, Some(TimerState::Finished));
}

#[tokio::test(start_paused = true)]
async fn time_spent_paused_is_not_counted() {
    let engine = engine();
    engine.start(Duration::from_secs(60)).await;
    sleep(Duration::from_millis(300)).await;
    engine.pause().await;
    sleep(Duration::from_secs(1)).await;
    engine.resume().await;
    sleep(Duration::from_millis(300)).await;
    engine.pause().await;

    assert_near(engine.elapsed(), Duration::from_millis(600));
}

#[tokio::test(start_paused = true)]
async fn repeated_pause_resume_does_not_drift() {
    let engine = engine();
    engine.start(Duration::from_secs(600)).await;
    for _ in 0..25 {
        sleep(Duration::from_millis(130)).await;
        engine.pause().await;
        sleep(Duration::from_millis(70)).await;
        engine.resume().await;
    }
    engine.pause().await;

    assert_near(engine.elapsed(), Duration::from_millis(25 * 130));
}

#[tokio::test(start_paused = true)]
async fn skip_past_the_end_finishes() {
    let engine = engine();
    engine.start(Duration::from_secs(60)).await;
    let skipped = engine.skip(Duration::from_secs(90)).await;

    assert_eq!(skipped.to, TimerState::Finished);
    assert_eq!(engine.remaining(), Duration::ZERO);
    assert!(!engine.is_ticking().await);
}

#[tokio::test(start_paused = true)]
async fn skip_while_paused_stays_paused() {
    let engine = engine();
    engine.start(Duration::from_secs(60)).await;
    engine.pause().await;
    let skipped = engine.skip(Duration::from_secs(30)).await;

    assert!(skipped.to.is_paused());
    assert_near(engine.elapsed(), Duration::from_secs(30));
    assert!(!engine.is_ticking().await);
}

#[tokio::test(start_paused = true)]
async fn late_subscriber_sees_current_state_first() {
    let engine = engine();
    engine.start(Duration::from_secs(60)).await;
    sleep(Duration::from_secs(1)).await;
    let paused = engine.pause().await;

    let mut states = engine.subscribe();
    assert_eq!(states.recv().await, Some(paused.to));
}

#[tokio::test(start_paused = true)]
async fn no_ticks_reach_subscribers_while_paused() {
    let engine = engine();
    engine.start(Duration::from_secs(60)).await;
    engine.pause().await;

    let mut states = engine.subscribe();
    states.recv().await;
    assert!(timeout(Duration::from_secs(2), states.recv()).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn running_ticks_refresh_the_elapsed_hint() {
    let engine = engine();
    let mut states = engine.subscribe();
    states.recv().await;

    engine.start(Duration::from_secs(60)).await;
    let mut hints = Vec::new();
    while hints.len() < 4 {
        if let Some(TimerState::Running(running)) = states.recv().await {
            hints.push(running.elapsed_hint);
        }
    }
    assert!(hints.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test(start_paused = true)]
async fn lifecycle_events_follow_commands() {
    let engine = engine();
    let mut events = engine.subscribe_session_events();

    engine.start(Duration::from_secs(2)).await;
    sleep(Duration::from_millis(500)).await;
    engine.pause().await;
    engine.resume().await;
    sleep(Duration::from_secs(2)).await;

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.session, 1);
        kinds.push(event.kind);
    }
    assert!(matches!(kinds[0], SessionEventKind::Started { .. }));
    assert!(matches!(kinds[1], SessionEventKind::Paused { .. }));
    assert!(matches!(kinds[2], SessionEventKind::Resumed { .. }));
    assert!(matches!(
        kinds[3],
        SessionEventKind::Finished {
            cause: FinishCause::Elapsed,
            ..
        }
    ));
    assert_eq!(kinds.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn concurrent_commands_are_linearized() {
    let engine = engine();
    let mut handles = Vec::new();
    for i in 0..32u64 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            match i % 4 {
                0 => engine.start(Duration::from_secs(60 + i)).await,
                1 => engine.pause().await,
                2 => engine.resume().await,
                _ => engine.skip(Duration::from_secs(1)).await,
            }
        }));
    }

    let mut starts = Vec::new();
    for handle in handles {
        let applied = handle.await.unwrap();
        if let Command::Start(_) = applied.command {
            starts.push(applied.session);
        }
    }
    starts.sort_unstable();
    assert_eq!(starts, (1..=8).collect::<Vec<_>>());
    assert!(engine.current_state().is_active());
    assert_eq!(engine.is_ticking().await, engine.current_state().is_running());
}

#[tokio::test(start_paused = true)]
async fn stalled_subscriber_does_not_hold_up_commands() {
    let engine = engine();
    let _stalled = engine.subscribe();
    engine.start(Duration::from_secs(3_600)).await;
    for _ in 0..500 {
        engine.skip(Duration::from_millis(1)).await;
    }
    let paused = engine.pause().await;
    assert!(paused.to.elapsed(paused.at) >= Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn stop_returns_to_idle_and_reports_time_spent() {
    let engine = engine();
    engine.start(Duration::from_secs(60)).await;
    sleep(Duration::from_secs(12)).await;
    let stopped = engine.stop().await;

    assert_eq!(stopped.to, TimerState::Idle);
    assert_near(stopped.elapsed_before(), Duration::from_secs(12));
    assert_eq!(engine.elapsed(), Duration::ZERO);
    assert!(!engine.is_ticking().await);
}

//! Transport, clock and speed/pitch behaviour through the engine handle
//!
//! Runs on paused tokio time: the position clock follows virtual time, so
//! sleeping five seconds advances playback by exactly five seconds times
//! the speed.

mod helpers;

use helpers::TestPlayer;
use lyra_common::events::{PlayerEvent, PlayerState, TrackEndReason};
use std::time::Duration;
use tokio::time::sleep;

fn assert_near(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.05,
        "expected {:.3}, got {:.3}",
        expected,
        actual
    );
}

#[tokio::test(start_paused = true)]
async fn test_listen_speed_up_seek_and_finish() {
    let mut player = TestPlayer::start(&[]);
    let episode = player.wav("episode.wav", 180.0);

    let record = player.engine.load(episode).await.unwrap();
    assert!(record.is_none());
    let snapshot = player.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.player_state, PlayerState::Paused);
    assert_near(snapshot.duration, 180.0);

    player.engine.play().await.unwrap();
    sleep(Duration::from_secs(5)).await;
    assert_near(player.current_time().await, 5.0);

    assert_eq!(player.engine.set_speed(2.0).await.unwrap(), 2.0);
    sleep(Duration::from_secs(5)).await;
    assert_near(player.current_time().await, 15.0);

    assert_eq!(player.engine.seek(170.0).await.unwrap(), 170.0);
    assert_eq!(player.current_time().await, 170.0);

    sleep(Duration::from_secs(6)).await;
    let snapshot = player.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.player_state, PlayerState::Stopped);
    assert_eq!(snapshot.current_time, 0.0);

    let completed = player
        .take_events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                PlayerEvent::TrackEnded {
                    reason: TrackEndReason::Completed,
                    ..
                }
            )
        })
        .count();
    assert_eq!(completed, 1);
    assert_eq!(player.queue.advances(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_play_pause_stop_transitions() {
    let mut player = TestPlayer::start(&[]);
    let episode = player.wav("episode.wav", 60.0);
    player.engine.load(episode).await.unwrap();

    player.engine.play().await.unwrap();
    // Playing twice is a no-op
    player.engine.play().await.unwrap();
    sleep(Duration::from_secs(2)).await;

    player.engine.pause().await.unwrap();
    let paused_at = player.current_time().await;
    assert_near(paused_at, 2.0);
    sleep(Duration::from_secs(3)).await;
    assert_eq!(player.current_time().await, paused_at);

    player.engine.toggle().await.unwrap();
    sleep(Duration::from_secs(1)).await;
    assert_near(player.current_time().await, paused_at + 1.0);

    player.engine.stop().await.unwrap();
    let snapshot = player.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.player_state, PlayerState::Stopped);
    assert_eq!(snapshot.current_time, 0.0);
    assert!(snapshot.current_file.is_some());

    let states: Vec<PlayerState> = player
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            PlayerEvent::StateChanged { new_state, .. } => Some(new_state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            PlayerState::Paused,
            PlayerState::Buffering,
            PlayerState::Playing,
            PlayerState::Paused,
            PlayerState::Buffering,
            PlayerState::Playing,
            PlayerState::Stopped,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_pitch_does_not_change_clock_or_duration() {
    let player = TestPlayer::start(&[]);
    let episode = player.wav("episode.wav", 60.0);
    player.engine.load(episode).await.unwrap();
    player.engine.play().await.unwrap();

    assert_eq!(player.engine.set_pitch(1.5).await.unwrap(), 1.5);
    sleep(Duration::from_secs(2)).await;
    let snapshot = player.engine.snapshot().await.unwrap();
    assert_near(snapshot.current_time, 2.0);
    assert_near(snapshot.duration, 60.0);

    player.engine.set_speed(2.0).await.unwrap();
    let snapshot = player.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.pitch, 1.5);
    assert_eq!(snapshot.speed, 2.0);
    assert_near(snapshot.duration, 60.0);

    player.engine.set_pitch(1.0).await.unwrap();
    assert_eq!(player.engine.snapshot().await.unwrap().speed, 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_speed_pitch_and_volume_are_clamped() {
    let player = TestPlayer::start(&[]);

    assert_eq!(player.engine.set_speed(5.0).await.unwrap(), 3.0);
    assert_eq!(player.engine.set_speed(0.1).await.unwrap(), 0.5);
    assert_eq!(player.engine.set_pitch(0.1).await.unwrap(), 0.5);
    assert_eq!(player.engine.set_pitch(f64::NAN).await.unwrap(), 1.0);
    assert_eq!(player.engine.set_volume(1.7).await.unwrap(), 1.0);
    assert_eq!(player.engine.set_volume(-1.0).await.unwrap(), 0.0);

    // Settings made before a load apply to the loaded track
    let episode = player.wav("episode.wav", 10.0);
    player.engine.load(episode).await.unwrap();
    let snapshot = player.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.speed, 0.5);
    assert_eq!(snapshot.pitch, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_progress_never_goes_backwards() {
    let mut player = TestPlayer::start(&[]);
    let episode = player.wav("episode.wav", 60.0);
    player.engine.load(episode).await.unwrap();
    player.engine.play().await.unwrap();

    let mut last = 0.0;
    for step in 0..24 {
        if step == 8 {
            player.engine.set_speed(1.5).await.unwrap();
        }
        if step == 16 {
            player.engine.set_pitch(0.8).await.unwrap();
        }
        sleep(Duration::from_millis(250)).await;
        let now = player.current_time().await;
        assert!(now >= last, "position went from {} to {}", last, now);
        last = now;
    }

    let progress: Vec<f64> = player
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            PlayerEvent::PositionChanged { position, .. } => Some(position),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_state_watch_follows_transport() {
    let player = TestPlayer::start(&[]);
    let mut state = player.engine.subscribe_state();
    let episode = player.wav("episode.wav", 30.0);

    player.engine.load(episode).await.unwrap();
    player.engine.play().await.unwrap();
    state.changed().await.unwrap();
    let published = state.borrow_and_update().clone();
    assert_eq!(published.player_state, PlayerState::Playing);
    assert_eq!(
        published.current_file.map(|f| f.name),
        Some("episode.wav".to_string())
    );

    player.engine.unload().await.unwrap();
    let snapshot = player.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.player_state, PlayerState::Stopped);
    assert!(snapshot.current_file.is_none());
    assert!(snapshot.session_id.is_none());
}

//! Failure handling: missing files, undecodable files, failed reads, a
//! stopped output, invalid commands

mod helpers;

use helpers::{write_garbage_file, TestPlayer};
use lyra_ap::Error;
use lyra_common::events::{PlayerEvent, PlayerState};
use lyra_common::MediaFile;
use std::time::Duration;
use tokio::time::{sleep, timeout};

fn missing_file(player: &TestPlayer) -> MediaFile {
    let path = player.dir.path().join("gone.wav");
    MediaFile {
        name: "gone.wav".to_string(),
        path,
        size: 1024,
        modification_date: None,
        is_directory: false,
        file_extension: "wav".to_string(),
        identifier: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_file_freezes_previous_track() {
    let mut player = TestPlayer::start(&[]);
    let episode = player.wav("episode.wav", 60.0);
    player.engine.load(episode).await.unwrap();
    player.engine.play().await.unwrap();
    sleep(Duration::from_secs(3)).await;

    let result = player.engine.load(missing_file(&player)).await;
    assert!(matches!(result, Err(Error::FileNotFound(_))));

    let snapshot = player.engine.snapshot().await.unwrap();
    assert!(snapshot.player_state.is_error());
    assert!((snapshot.current_time - 3.0).abs() < 0.05);
    assert_eq!(
        snapshot.current_file.map(|f| f.name),
        Some("episode.wav".to_string())
    );

    sleep(Duration::from_secs(1)).await;
    assert_eq!(player.current_time().await, snapshot.current_time);
    assert!(player
        .take_events()
        .iter()
        .any(|e| matches!(e, PlayerEvent::Error { .. })));

    assert!(matches!(
        player.engine.play().await,
        Err(Error::InvalidState(_))
    ));
    assert!(player.engine.seek(10.0).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_engine_recovers_after_error() {
    let player = TestPlayer::start(&[]);
    assert!(player.engine.load(missing_file(&player)).await.is_err());

    let episode = player.wav("episode.wav", 10.0);
    player.engine.load(episode).await.unwrap();
    player.engine.play().await.unwrap();
    let snapshot = player.engine.snapshot().await.unwrap();
    assert!(snapshot.player_state.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_file_reports_decode_error() {
    let player = TestPlayer::start(&[]);
    let path = player.dir.path().join("broken.wav");
    write_garbage_file(&path).unwrap();
    let broken = MediaFile::from_path(&path).unwrap();

    let result = player.engine.load(broken.clone()).await;
    match result {
        Err(Error::Decode { identity, .. }) => assert_eq!(identity, broken.identity()),
        other => panic!("expected a decode error, got {:?}", other),
    }
    assert!(player
        .engine
        .snapshot()
        .await
        .unwrap()
        .player_state
        .is_error());
}

#[tokio::test]
async fn test_read_failure_mid_track_freezes_playback() {
    let mut player = TestPlayer::start(&[]);
    let episode = player.wav("episode.wav", 10.0);
    player.engine.load(episode.clone()).await.unwrap();
    player.engine.play().await.unwrap();
    player.engine.test_fail_next_read().await.unwrap();

    // The opening chunks play, then the read that follows them fails
    let mut seen = Vec::new();
    let failed = timeout(Duration::from_secs(5), async {
        loop {
            let event = player.events.recv().await.unwrap();
            let done = matches!(event, PlayerEvent::Error { .. });
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await;
    assert!(failed.is_ok(), "read failure never surfaced: {:?}", seen);
    match seen.last() {
        Some(PlayerEvent::Error { identity, message, .. }) => {
            assert_eq!(identity.as_ref(), Some(&episode.identity()));
            assert!(message.contains("Decode error"), "{}", message);
        }
        other => panic!("expected an error event, got {:?}", other),
    }

    let snapshot = player.engine.snapshot().await.unwrap();
    assert!(snapshot.player_state.is_error());
    assert!(snapshot.current_time > 0.0 && snapshot.current_time < 5.0);

    // No retry: the clock stays put and no further audio is scheduled
    sleep(Duration::from_millis(300)).await;
    assert_eq!(player.current_time().await, snapshot.current_time);
    assert!(player
        .engine
        .snapshot()
        .await
        .unwrap()
        .player_state
        .is_error());
    assert!(matches!(
        player.engine.play().await,
        Err(Error::InvalidState(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_output_failure_pauses_and_play_restarts() {
    let mut player = TestPlayer::start(&[]);
    let episode = player.wav("episode.wav", 60.0);
    player.engine.load(episode).await.unwrap();
    player.engine.play().await.unwrap();
    sleep(Duration::from_secs(2)).await;
    player.take_events();

    player.engine.test_fail_output().await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let snapshot = player.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.player_state, PlayerState::Paused);
    let paused_at = snapshot.current_time;
    assert!((paused_at - 2.0).abs() < 0.1, "paused at {}", paused_at);

    let events = player.take_events();
    let reported = events.iter().any(|e| match e {
        PlayerEvent::Error { message, .. } => message.contains("not running"),
        _ => false,
    });
    assert!(reported, "no output error in {:?}", events);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(player.current_time().await, paused_at);

    // The next play restarts the output and picks up where it stopped
    player.engine.play().await.unwrap();
    let snapshot = player.engine.snapshot().await.unwrap();
    assert_eq!(snapshot.player_state, PlayerState::Playing);
    sleep(Duration::from_secs(1)).await;
    let resumed = player.current_time().await;
    assert!((resumed - paused_at - 1.0).abs() < 0.1, "resumed at {}", resumed);
}

#[tokio::test(start_paused = true)]
async fn test_commands_without_a_track() {
    let player = TestPlayer::start(&[]);
    assert!(matches!(player.engine.play().await, Err(Error::InvalidState(_))));
    assert!(matches!(player.engine.pause().await, Err(Error::InvalidState(_))));
    assert!(player.engine.stop().await.is_ok());
    assert!(!player.engine.next().await.unwrap());
    assert!(!player.engine.previous().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_handle_fails_after_shutdown() {
    let player = TestPlayer::start(&[]);
    player.engine.shutdown().await.unwrap();
    assert!(matches!(
        player.engine.snapshot().await,
        Err(Error::ChannelClosed)
    ));
}

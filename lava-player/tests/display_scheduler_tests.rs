//! Display propagation tests
//!
//! Runs on paused tokio time so debounce windows are exact. Verifies the
//! player's display is rendered once per window with the latest state, and
//! that target replacement and loss are handled.

mod helpers;

use helpers::*;
use lava_common::events::BackendEvent;
use lava_common::LoopMode;
use lava_player::display::lyrics::parse_lrc;
use lava_player::display::{DisplayError, DisplayStatus, DisplayTarget, RequesterLabel};
use lava_player::player::PlayOptions;
use std::time::Duration;

const TARGET: DisplayTarget = DisplayTarget {
    channel_id: 10,
    message_id: 20,
};

#[tokio::test(start_paused = true)]
async fn test_update_without_target_is_nothing_to_update() {
    let h = Harness::new();
    let player = h.player().await;

    let result = player.update_display(None, Duration::ZERO).await;
    assert_eq!(result, Err(DisplayError::NothingToUpdate));

    // Commands still succeed without a display
    player.set_loop(LoopMode::Queue).await;
    player.add(track("a"), USER, None).await;
    player.play(PlayOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.surface.render_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_burst_inside_window_renders_latest_state_once() {
    let h = Harness::new();
    let player = h.player().await;
    player.set_connected(true).await;

    player
        .update_display(Some(TARGET), Duration::from_secs(5))
        .await
        .unwrap();
    player.set_loop(LoopMode::Track).await;
    player.set_shuffle(true).await;
    player.set_loop(LoopMode::Queue).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.surface.render_count(), 0, "zero-delay requests do not pull the deadline in");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.surface.render_count(), 1);

    let view = h.surface.last_view().unwrap();
    assert_eq!(view.loop_mode, LoopMode::Queue);
    assert!(view.shuffle);
}

#[tokio::test(start_paused = true)]
async fn test_events_trigger_renders() {
    let h = Harness::new();
    let player = h.player().await;
    player.set_connected(true).await;
    player.update_display(Some(TARGET), Duration::ZERO).await.unwrap();

    player.add(track("a"), USER, None).await;
    player.play(PlayOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.surface.last_view().unwrap().status, DisplayStatus::Loading);

    player
        .handle_event(BackendEvent::TrackStart {
            track_id: "a".to_string(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = h.surface.last_view().unwrap();
    assert_eq!(view.status, DisplayStatus::Playing);
    assert!(view.controls_enabled);
    let now_playing = view.now_playing.unwrap();
    assert_eq!(now_playing.title, "Song a");
    assert_eq!(now_playing.requester, RequesterLabel::User(USER));
}

#[tokio::test(start_paused = true)]
async fn test_replaced_target_is_deleted() {
    let h = Harness::new();
    let player = h.player().await;
    let next = DisplayTarget {
        channel_id: 10,
        message_id: 21,
    };

    player.update_display(Some(TARGET), Duration::ZERO).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    player.update_display(Some(next), Duration::ZERO).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.surface.deleted(), vec![TARGET]);
    assert_eq!(player.display().target().await, Some(next));
    let (last_target, _) = h.surface.renders().pop().unwrap();
    assert_eq!(last_target, next);
}

#[tokio::test(start_paused = true)]
async fn test_vanished_target_is_cleared() {
    let h = Harness::new();
    let player = h.player().await;
    h.surface.mark_gone(TARGET);

    player.update_display(Some(TARGET), Duration::ZERO).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(player.display().target().await, None);
    assert_eq!(
        player.update_display(None, Duration::ZERO).await,
        Err(DisplayError::NothingToUpdate)
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_drops_pending_render() {
    let h = Harness::new();
    let player = h.player().await;
    player
        .update_display(Some(TARGET), Duration::from_secs(10))
        .await
        .unwrap();

    assert!(h.manager.destroy(GUILD).await);
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(h.surface.render_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_view_reflects_queue_and_lyrics() {
    let h = HarnessBuilder::new()
        .config(|c| {
            c.queue_preview_len = 2;
            c.lyrics_window_ms = 5_000;
        })
        .build();
    let player = h.player().await;
    player.set_connected(true).await;
    for id in ["a", "b", "c", "d"] {
        player.add(track(id), USER, None).await;
    }
    player.play(PlayOptions::default()).await.unwrap();
    player
        .set_lyrics(Some(parse_lrc("[00:01.00] one\n[00:30.00] two\n[00:02.00] three")))
        .await;

    let view = player.view().await;
    assert_eq!(view.queue.entries, vec!["**[1]** Song b", "**[2]** Song c"]);
    assert!(view.queue.more);
    assert!(view.lyrics.is_empty(), "lyrics hidden until enabled");

    player.set_show_lyrics(true).await;
    let texts: Vec<String> = player
        .view()
        .await
        .lyrics
        .into_iter()
        .map(|l| l.text)
        .collect();
    assert_eq!(texts, vec!["one", "three"]);
}

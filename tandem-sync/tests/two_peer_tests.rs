//! Host and follower orchestrators linked in-process

use std::sync::Arc;
use std::time::Duration;

use tandem_common::{CorrectionKind, Role};
use tandem_sync::clock::WallClock;
use tandem_sync::config::SyncConfig;
use tandem_sync::player::{PlaybackEngine, PlayerCommand, SimulatedPlayer};
use tandem_sync::transport::{forward_inbound, ChannelTransport};
use tandem_sync::SyncHandle;
use tokio::time::sleep;

const T: i64 = 1_700_000_000_000;

struct Room {
    host: SyncHandle,
    host_player: Arc<SimulatedPlayer>,
    follower: SyncHandle,
    follower_player: Arc<SimulatedPlayer>,
}

async fn room() -> Room {
    let clock = Arc::new(WallClock::starting_at(T));
    let host_player = Arc::new(SimulatedPlayer::new(600_000));
    let follower_player = Arc::new(SimulatedPlayer::new(600_000));

    let (host_out, host_rx) = ChannelTransport::new();
    let (follower_out, follower_rx) = ChannelTransport::new();
    let (host, _) = tandem_sync::spawn(SyncConfig::default(), host_player.clone(), Arc::new(host_out), clock.clone());
    let (follower, _) = tandem_sync::spawn(SyncConfig::default(), follower_player.clone(), Arc::new(follower_out), clock);
    forward_inbound(host_rx, follower.clone());
    forward_inbound(follower_rx, host.clone());

    follower.start_as_follower().await.unwrap();
    host.start_as_host().await.unwrap();
    host.set_connected(true).unwrap();
    follower.set_connected(true).unwrap();
    sleep(Duration::from_millis(10)).await;

    Room {
        host,
        host_player,
        follower,
        follower_player,
    }
}

fn gap_ms(room: &Room) -> i64 {
    (room.host_player.snapshot().position_ms - room.follower_player.snapshot().position_ms).abs()
}

#[tokio::test(start_paused = true)]
async fn test_follower_tracks_host_play_seek_pause() {
    let room = room().await;

    room.host_player.play().unwrap();
    sleep(Duration::from_millis(2000)).await;
    assert!(room.follower_player.snapshot().is_playing);
    assert!(gap_ms(&room) <= 100, "gap {}ms", gap_ms(&room));

    room.host_player.seek_to(90_000).unwrap();
    room.host.notify_local_seek(90_000).unwrap();
    sleep(Duration::from_millis(1000)).await;
    assert!(room
        .follower_player
        .commands()
        .iter()
        .any(|c| matches!(c, PlayerCommand::SeekTo(ms) if *ms >= 90_000)));

    // The debounced Seek carries the position from when the user let go, so
    // the follower lands slightly behind and nudges the rest of the way
    sleep(Duration::from_millis(6000)).await;
    assert!(gap_ms(&room) <= 100, "gap {}ms", gap_ms(&room));

    room.host_player.pause().unwrap();
    sleep(Duration::from_millis(500)).await;
    assert!(!room.follower_player.snapshot().is_playing);
    assert!(gap_ms(&room) <= 300, "gap {}ms", gap_ms(&room));
}

#[tokio::test(start_paused = true)]
async fn test_follower_corrects_local_drift() {
    let room = room().await;
    room.host_player.play().unwrap();
    sleep(Duration::from_millis(1000)).await;

    // Follower falls 300ms behind on its own
    let position = room.follower_player.snapshot().position_ms;
    room.follower_player.scrub_to(position - 300);
    sleep(Duration::from_millis(600)).await;

    let diagnostics = room.follower.diagnostics().await.unwrap();
    assert_eq!(diagnostics.last_correction, Some(CorrectionKind::Nudge));
    assert!(diagnostics.corrections_applied >= 1);

    // Nudges keep running until the gap is inside the no-op band
    sleep(Duration::from_secs(15)).await;
    assert!(gap_ms(&room) <= 100, "gap {}ms", gap_ms(&room));
    assert!(!room.follower.diagnostics().await.unwrap().nudge_active);
}

#[tokio::test(start_paused = true)]
async fn test_rate_change_propagates() {
    let room = room().await;
    room.host_player.play().unwrap();
    room.host_player.set_rate(1.5).unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(room.follower_player.snapshot().rate, 1.5);
    sleep(Duration::from_millis(3000)).await;
    assert!(gap_ms(&room) <= 100, "gap {}ms", gap_ms(&room));
}

#[tokio::test(start_paused = true)]
async fn test_rtt_measured_both_ways() {
    let room = room().await;
    sleep(Duration::from_millis(100)).await;

    assert_eq!(room.host.current_rtt().await.unwrap(), Some(0));
    let diagnostics = room.follower.diagnostics().await.unwrap();
    assert_eq!(diagnostics.last_rtt_ms, Some(0));
    assert!(diagnostics.connected);
    assert_eq!(diagnostics.role, Some(Role::Follower));
}

#[tokio::test(start_paused = true)]
async fn test_roles_swap() {
    let room = room().await;
    room.host.update_role(Some(Role::Follower)).await.unwrap();
    room.follower.update_role(Some(Role::Host)).await.unwrap();

    room.follower_player.seek_to(45_000).unwrap();
    room.follower.notify_local_seek(45_000).unwrap();
    sleep(Duration::from_millis(500)).await;

    assert_eq!(room.host_player.snapshot().position_ms, 45_000);
    assert!(room.host.diagnostics().await.unwrap().session_id.is_some());
}

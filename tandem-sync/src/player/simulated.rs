//! Clock-driven in-process playback engine
//!
//! Stands in for a real media engine in the peer binary and in tests. Its
//! position advances with the tokio clock at the current rate, so paused-time
//! tests see exact positions.

use std::sync::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use super::{PlaybackEngine, PlaybackSnapshot};
use crate::error::{Error, Result};

/// Command received by the simulated engine, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Play,
    Pause,
    SeekTo(i64),
    SetRate(f32),
}

#[derive(Debug)]
struct Inner {
    playing: bool,
    /// Position at `anchor`
    anchor_position_ms: i64,
    anchor: Instant,
    duration_ms: i64,
    rate: f32,
    buffering: bool,
    error: Option<String>,
    reject_commands: bool,
    commands: Vec<PlayerCommand>,
}

impl Inner {
    fn position_ms(&self) -> i64 {
        if !self.playing {
            return self.anchor_position_ms;
        }
        let elapsed_ms = self.anchor.elapsed().as_millis() as f64;
        let position = self.anchor_position_ms + (elapsed_ms * self.rate as f64).round() as i64;
        position.min(self.duration_ms)
    }

    /// Fold elapsed playback into the anchor so rate/state changes start from here
    fn rebase(&mut self) {
        self.anchor_position_ms = self.position_ms();
        self.anchor = Instant::now();
    }

    /// Playing past the end stops at the end
    fn settle_end_of_media(&mut self) {
        if self.playing && self.position_ms() >= self.duration_ms {
            self.anchor_position_ms = self.duration_ms;
            self.anchor = Instant::now();
            self.playing = false;
        }
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            is_playing: self.playing,
            position_ms: self.position_ms(),
            duration_ms: self.duration_ms,
            rate: self.rate,
            buffering: self.buffering,
            error: self.error.clone(),
        }
    }
}

/// Simulated playback engine
pub struct SimulatedPlayer {
    inner: Mutex<Inner>,
    feed: watch::Sender<PlaybackSnapshot>,
}

impl SimulatedPlayer {
    /// Paused at 0 with media of the given length
    pub fn new(duration_ms: i64) -> Self {
        let inner = Inner {
            playing: false,
            anchor_position_ms: 0,
            anchor: Instant::now(),
            duration_ms,
            rate: 1.0,
            buffering: false,
            error: None,
            reject_commands: false,
            commands: Vec::new(),
        };
        let (feed, _) = watch::channel(inner.snapshot());
        Self {
            inner: Mutex::new(inner),
            feed,
        }
    }

    /// Commands received so far
    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.lock().commands.clone()
    }

    /// Drain the command log
    pub fn take_commands(&self) -> Vec<PlayerCommand> {
        std::mem::take(&mut self.lock().commands)
    }

    /// Set or clear the engine error (as a decoder failure would)
    pub fn set_error(&self, error: Option<String>) {
        self.update(|inner| inner.error = error);
    }

    /// Make subsequent commands fail with a playback error
    pub fn reject_commands(&self, reject: bool) {
        self.lock().reject_commands = reject;
    }

    /// Report a stall (network stream refilling)
    pub fn set_buffering(&self, buffering: bool) {
        self.update(|inner| inner.buffering = buffering);
    }

    /// Jump without recording a command (local user scrubbing the timeline)
    pub fn scrub_to(&self, position_ms: i64) {
        self.update(|inner| {
            inner.anchor_position_ms = position_ms.clamp(0, inner.duration_ms);
            inner.anchor = Instant::now();
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut Inner)) {
        let snapshot = {
            let mut inner = self.lock();
            inner.settle_end_of_media();
            f(&mut inner);
            inner.snapshot()
        };
        self.feed.send_replace(snapshot);
    }

    fn command(&self, command: PlayerCommand) -> Result<()> {
        let snapshot = {
            let mut inner = self.lock();
            inner.commands.push(command.clone());
            if inner.reject_commands {
                return Err(Error::Playback(format!("engine rejected {:?}", command)));
            }
            inner.settle_end_of_media();

            match &command {
                PlayerCommand::Play => {
                    if !inner.playing {
                        // Replay from start after end-of-media
                        if inner.anchor_position_ms >= inner.duration_ms {
                            inner.anchor_position_ms = 0;
                        }
                        inner.anchor = Instant::now();
                        inner.playing = true;
                    }
                }
                PlayerCommand::Pause => {
                    if inner.playing {
                        inner.rebase();
                        inner.playing = false;
                    }
                }
                PlayerCommand::SeekTo(position_ms) => {
                    inner.anchor_position_ms = (*position_ms).clamp(0, inner.duration_ms);
                    inner.anchor = Instant::now();
                }
                PlayerCommand::SetRate(rate) => {
                    inner.rebase();
                    inner.rate = *rate;
                }
            }
            inner.snapshot()
        };
        debug!("Simulated player: {:?} -> {}ms", command, snapshot.position_ms);
        self.feed.send_replace(snapshot);
        Ok(())
    }
}

impl PlaybackEngine for SimulatedPlayer {
    fn play(&self) -> Result<()> {
        self.command(PlayerCommand::Play)
    }

    fn pause(&self) -> Result<()> {
        self.command(PlayerCommand::Pause)
    }

    fn seek_to(&self, position_ms: i64) -> Result<()> {
        self.command(PlayerCommand::SeekTo(position_ms))
    }

    fn set_rate(&self, rate: f32) -> Result<()> {
        self.command(PlayerCommand::SetRate(rate))
    }

    fn snapshot(&self) -> PlaybackSnapshot {
        let mut inner = self.lock();
        let was_playing = inner.playing;
        inner.settle_end_of_media();
        let snapshot = inner.snapshot();
        drop(inner);
        if was_playing && !snapshot.is_playing {
            self.feed.send_replace(snapshot.clone());
        }
        snapshot
    }

    fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_position_advances_at_rate() {
        let player = SimulatedPlayer::new(120_000);
        player.play().unwrap();
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(player.snapshot().position_ms, 1000);

        player.set_rate(1.5).unwrap();
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(player.snapshot().position_ms, 2500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_position() {
        let player = SimulatedPlayer::new(120_000);
        player.seek_to(10_000).unwrap();
        player.play().unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        player.pause().unwrap();
        tokio::time::advance(Duration::from_millis(5000)).await;

        let snapshot = player.snapshot();
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.position_ms, 10_500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_of_media_then_replay() {
        let player = SimulatedPlayer::new(1_000);
        player.play().unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;

        let snapshot = player.snapshot();
        assert!(!snapshot.is_playing);
        assert_eq!(snapshot.position_ms, 1_000);

        player.play().unwrap();
        let snapshot = player.snapshot();
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.position_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_command_is_logged_and_fails() {
        let player = SimulatedPlayer::new(1_000);
        player.reject_commands(true);
        assert!(matches!(player.play(), Err(Error::Playback(_))));
        assert!(!player.snapshot().is_playing);
        assert_eq!(player.commands(), vec![PlayerCommand::Play]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_feed_publishes_changes() {
        let player = SimulatedPlayer::new(60_000);
        let mut rx = player.subscribe();
        player.set_error(Some("decode failed".to_string()));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().error.as_deref(), Some("decode failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffering_published_on_feed() {
        let player = SimulatedPlayer::new(60_000);
        let mut rx = player.subscribe();
        player.set_buffering(true);
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().buffering);

        player.set_buffering(false);
        rx.changed().await.unwrap();
        assert!(!player.snapshot().buffering);
    }
}

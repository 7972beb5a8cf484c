//! Host-side state: event sequencing, heartbeat, seek coalescing

use std::future::pending;
use std::time::Duration;
use tandem_common::time::ms_to_sec;
use tandem_common::{SyncEvent, WireMessage};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

use crate::player::{FeedUpdate, PlaybackSnapshot};

/// Latest unsent local seek and when it may go out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSeek {
    pub position_ms: i64,
    pub deadline: Instant,
}

/// State owned by the orchestrator while hosting
pub struct HostState {
    session_id: Uuid,
    next_seq: u64,
    heartbeat_period: Duration,
    heartbeat: Option<Interval>,
    seek_debounce: Duration,
    pending_seek: Option<PendingSeek>,
}

impl HostState {
    /// Fresh hosting session
    pub fn new(heartbeat_period: Duration, seek_debounce: Duration) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            next_seq: 1,
            heartbeat_period,
            heartbeat: None,
            seek_debounce,
            pending_seek: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Wrap an event with this session's id and the next sequence number
    pub fn envelope(&mut self, event: SyncEvent) -> WireMessage {
        let seq = self.next_seq;
        self.next_seq += 1;
        WireMessage::Sync {
            session_id: self.session_id,
            seq,
            event,
        }
    }

    // ------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_some()
    }

    /// First beat one period from now
    pub fn start_heartbeat(&mut self) {
        if self.heartbeat.is_none() {
            let mut timer = time::interval_at(Instant::now() + self.heartbeat_period, self.heartbeat_period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            self.heartbeat = Some(timer);
            debug!("Heartbeat started ({}ms)", self.heartbeat_period.as_millis());
        }
    }

    pub fn stop_heartbeat(&mut self) {
        if self.heartbeat.take().is_some() {
            debug!("Heartbeat stopped");
        }
    }

    /// Resolves on each heartbeat; never resolves while stopped
    pub async fn heartbeat_due(&mut self) {
        match self.heartbeat.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => pending::<()>().await,
        }
    }

    pub fn heartbeat_event(snapshot: &PlaybackSnapshot, now_ms: i64) -> SyncEvent {
        SyncEvent::TimeSync {
            position_sec: snapshot.position_sec(),
            host_timestamp_ms: now_ms,
            is_playing: snapshot.is_playing,
        }
    }

    // ------------------------------------------------------------------
    // Seek coalescing
    // ------------------------------------------------------------------

    /// Overwrite the pending seek and restart the debounce window
    pub fn queue_seek(&mut self, position_ms: i64) {
        let deadline = Instant::now() + self.seek_debounce;
        if let Some(previous) = self.pending_seek.replace(PendingSeek { position_ms, deadline }) {
            debug!("Local seek {}ms superseded by {}ms", previous.position_ms, position_ms);
        }
    }

    pub fn pending_seek(&self) -> Option<PendingSeek> {
        self.pending_seek
    }

    pub fn pending_seek_deadline(&self) -> Option<Instant> {
        self.pending_seek.map(|p| p.deadline)
    }

    /// Take the pending seek if its window has elapsed
    pub fn take_due_seek(&mut self, now: Instant) -> Option<PendingSeek> {
        match self.pending_seek {
            Some(pending) if pending.deadline <= now => self.pending_seek.take(),
            _ => None,
        }
    }

    pub fn seek_event(pending: PendingSeek, now_ms: i64) -> SyncEvent {
        SyncEvent::Seek {
            position_sec: ms_to_sec(pending.position_ms),
            host_timestamp_ms: now_ms,
        }
    }

    // ------------------------------------------------------------------
    // Engine observation
    // ------------------------------------------------------------------

    /// Events implied by an engine refresh; keeps the heartbeat in step with play state
    pub fn on_feed_update(&mut self, update: &FeedUpdate, now_ms: i64) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        let current = &update.current;

        if update.play_state_changed() {
            if current.is_playing {
                events.push(SyncEvent::Play {
                    position_sec: current.position_sec(),
                    host_timestamp_ms: now_ms,
                    rate: current.rate,
                });
                self.start_heartbeat();
            } else {
                events.push(SyncEvent::Pause {
                    position_sec: current.position_sec(),
                    host_timestamp_ms: now_ms,
                });
                self.stop_heartbeat();
            }
        }

        if update.rate_changed() {
            events.push(SyncEvent::RateChange { rate: current.rate });
        }

        events
    }

    /// Full state announcement: on becoming host and after a reconnect
    pub fn announce(&mut self, snapshot: &PlaybackSnapshot, now_ms: i64) -> Vec<SyncEvent> {
        let mut events = Vec::with_capacity(3);
        if snapshot.rate != 1.0 {
            events.push(SyncEvent::RateChange { rate: snapshot.rate });
        }
        if snapshot.is_playing {
            events.push(SyncEvent::Play {
                position_sec: snapshot.position_sec(),
                host_timestamp_ms: now_ms,
                rate: snapshot.rate,
            });
            self.start_heartbeat();
        } else {
            events.push(SyncEvent::Pause {
                position_sec: snapshot.position_sec(),
                host_timestamp_ms: now_ms,
            });
            self.stop_heartbeat();
        }
        events.push(Self::heartbeat_event(snapshot, now_ms));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostState {
        HostState::new(Duration::from_millis(500), Duration::from_millis(200))
    }

    fn snapshot(is_playing: bool, position_ms: i64, rate: f32) -> PlaybackSnapshot {
        PlaybackSnapshot {
            is_playing,
            position_ms,
            duration_ms: 600_000,
            rate,
            ..PlaybackSnapshot::default()
        }
    }

    #[test]
    fn test_envelope_sequence() {
        let mut host = host();
        let first = host.envelope(SyncEvent::RateChange { rate: 1.5 });
        let second = host.envelope(SyncEvent::RateChange { rate: 1.0 });
        match (first, second) {
            (
                WireMessage::Sync { session_id: a, seq: 1, .. },
                WireMessage::Sync { session_id: b, seq: 2, .. },
            ) => assert_eq!(a, b),
            other => panic!("unexpected envelopes {:?}", other),
        }
        assert_ne!(HostState::new(Duration::from_millis(500), Duration::from_millis(200)).session_id(), host.session_id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_coalescing_keeps_latest() {
        let mut host = host();
        let start = Instant::now();
        host.queue_seek(5_000);
        time::advance(Duration::from_millis(50)).await;
        host.queue_seek(8_000);
        time::advance(Duration::from_millis(50)).await;
        host.queue_seek(12_000);

        assert_eq!(host.pending_seek_deadline(), Some(start + Duration::from_millis(300)));
        assert_eq!(host.take_due_seek(Instant::now()), None);

        time::advance(Duration::from_millis(200)).await;
        let due = host.take_due_seek(Instant::now()).unwrap();
        assert_eq!(due.position_ms, 12_000);
        assert!(host.pending_seek().is_none());
        assert_eq!(
            HostState::seek_event(due, 42),
            SyncEvent::Seek { position_sec: 12.0, host_timestamp_ms: 42 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_transition_starts_heartbeat() {
        let mut host = host();
        let update = FeedUpdate {
            previous: snapshot(false, 1_000, 1.0),
            current: snapshot(true, 1_000, 1.0),
        };
        let events = host.on_feed_update(&update, 7);
        assert_eq!(
            events,
            vec![SyncEvent::Play { position_sec: 1.0, host_timestamp_ms: 7, rate: 1.0 }]
        );
        assert!(host.heartbeat_running());

        let start = Instant::now();
        host.heartbeat_due().await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));

        let update = FeedUpdate {
            previous: snapshot(true, 1_500, 1.0),
            current: snapshot(false, 1_500, 1.0),
        };
        let events = host.on_feed_update(&update, 9);
        assert_eq!(events, vec![SyncEvent::Pause { position_sec: 1.5, host_timestamp_ms: 9 }]);
        assert!(!host.heartbeat_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_change_emitted() {
        let mut host = host();
        let update = FeedUpdate {
            previous: snapshot(true, 0, 1.0),
            current: snapshot(true, 0, 1.25),
        };
        assert_eq!(host.on_feed_update(&update, 0), vec![SyncEvent::RateChange { rate: 1.25 }]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_paused_default_rate() {
        let mut host = host();
        let events = host.announce(&snapshot(false, 2_000, 1.0), 11);
        assert_eq!(
            events,
            vec![
                SyncEvent::Pause { position_sec: 2.0, host_timestamp_ms: 11 },
                SyncEvent::TimeSync { position_sec: 2.0, host_timestamp_ms: 11, is_playing: false },
            ]
        );
        assert!(!host.heartbeat_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_playing_non_default_rate() {
        let mut host = host();
        let events = host.announce(&snapshot(true, 2_000, 1.5), 11);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], SyncEvent::RateChange { rate: 1.5 });
        assert_eq!(events[1].name(), "Play");
        assert!(host.heartbeat_running());
    }
}

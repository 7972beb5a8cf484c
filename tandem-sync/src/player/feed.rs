//! Push + poll merge of the engine feed

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::{PlaybackEngine, PlaybackSnapshot};

/// Result of one refresh: what the orchestrator saw before and now
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    pub previous: PlaybackSnapshot,
    pub current: PlaybackSnapshot,
}

impl FeedUpdate {
    pub fn play_state_changed(&self) -> bool {
        self.previous.is_playing != self.current.is_playing
    }

    pub fn rate_changed(&self) -> bool {
        self.previous.rate != self.current.rate
    }

    pub fn error_changed(&self) -> bool {
        self.previous.error != self.current.error
    }
}

/// Single-writer view of the engine state
///
/// Owned by the orchestrator task. Both push notifications and poll ticks end
/// in [`PlayerFeed::refresh`], so there is exactly one place where the cached
/// snapshot is replaced.
pub struct PlayerFeed {
    engine: Arc<dyn PlaybackEngine>,
    push: watch::Receiver<PlaybackSnapshot>,
    push_open: bool,
    poll: Interval,
    last: PlaybackSnapshot,
}

impl PlayerFeed {
    pub fn new(engine: Arc<dyn PlaybackEngine>, poll_period: Duration) -> Self {
        let push = engine.subscribe();
        let last = engine.snapshot();
        let mut poll = time::interval(poll_period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            engine,
            push,
            push_open: true,
            poll,
            last,
        }
    }

    pub fn engine(&self) -> &dyn PlaybackEngine {
        self.engine.as_ref()
    }

    /// Last refreshed snapshot
    pub fn last(&self) -> &PlaybackSnapshot {
        &self.last
    }

    /// Wait until either a push notification arrives or the poll period elapses
    ///
    /// Cancel-safe; used as a `select!` branch.
    pub async fn wait(&mut self) {
        if self.push_open {
            tokio::select! {
                changed = self.push.changed() => {
                    if changed.is_err() {
                        warn!("Playback engine push feed closed, continuing on poll only");
                        self.push_open = false;
                    }
                }
                _ = self.poll.tick() => {}
            }
        } else {
            self.poll.tick().await;
        }
    }

    /// Re-read the engine and replace the cached snapshot
    pub fn refresh(&mut self) -> FeedUpdate {
        let current = self.engine.snapshot();
        self.push.borrow_and_update();
        let previous = std::mem::replace(&mut self.last, current.clone());
        if previous.is_playing != current.is_playing || previous.rate != current.rate {
            debug!(
                "Engine state: playing {} -> {}, rate {} -> {}, position {}ms",
                previous.is_playing, current.is_playing, previous.rate, current.rate, current.position_ms
            );
        }
        FeedUpdate { previous, current }
    }
}

//! Sync orchestrator actor
//!
//! One task owns every piece of mutable sync state: the role, the host or
//! follower state, the RTT estimator, the engine feed and all timers. The rest
//! of the program talks to it through a cloneable [`SyncHandle`], whose calls
//! become [`Command`]s on an unbounded channel. Role changes are commands too,
//! so a role switch can never interleave with the delivery of a remote event.
//!
//! Event sources multiplexed by the actor loop:
//! - commands from handles (role changes, local seeks, scrubs, inbound wire messages)
//! - engine feed (push notification or 250ms poll)
//! - host heartbeat (500ms, only while hosting and playing)
//! - RTT probe timer (5000ms, while a role is assigned)
//! - seek debounce deadline (host)
//! - nudge expiry deadline (follower)

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tandem_common::{Role, SyncEvent, WireMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::diagnostics::SyncDiagnostics;
use super::follower::{FollowerState, RemoteOutcome};
use super::host::HostState;
use super::rtt::RttEstimator;
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::player::{PlaybackEngine, PlayerFeed};
use crate::transport::Transport;

/// Messages accepted by the actor
#[derive(Debug)]
pub(crate) enum Command {
    SetRole {
        role: Option<Role>,
        ack: oneshot::Sender<()>,
    },
    /// Leave `role` if it is the current one
    LeaveRole {
        role: Role,
        ack: oneshot::Sender<()>,
    },
    LocalSeek(i64),
    RemoteEvent {
        envelope: Option<(Uuid, u64)>,
        event: SyncEvent,
    },
    Inbound(WireMessage),
    ScrubStart,
    ScrubEnd,
    StartProbing(Duration),
    StopProbing,
    ConnectionChanged(bool),
    Resync,
    Diagnostics(oneshot::Sender<SyncDiagnostics>),
    CurrentRtt(oneshot::Sender<Option<i64>>),
    Shutdown,
}

/// Cloneable front end of the orchestrator
#[derive(Debug, Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SyncHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::ChannelClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    // ------------------------------------------------------------------
    // Role
    // ------------------------------------------------------------------

    /// Switch role; returns once the old role is torn down and the new one wired
    pub async fn update_role(&self, role: Option<Role>) -> Result<()> {
        self.request(|ack| Command::SetRole { role, ack }).await
    }

    pub async fn start_as_host(&self) -> Result<()> {
        self.update_role(Some(Role::Host)).await
    }

    pub async fn stop_as_host(&self) -> Result<()> {
        self.request(|ack| Command::LeaveRole { role: Role::Host, ack }).await
    }

    pub async fn start_as_follower(&self) -> Result<()> {
        self.update_role(Some(Role::Follower)).await
    }

    pub async fn stop_as_follower(&self) -> Result<()> {
        self.request(|ack| Command::LeaveRole { role: Role::Follower, ack }).await
    }

    // ------------------------------------------------------------------
    // Host
    // ------------------------------------------------------------------

    /// Local user jumped to `position_ms`; coalesced before it is sent
    pub fn notify_local_seek(&self, position_ms: i64) -> Result<()> {
        self.send(Command::LocalSeek(position_ms))
    }

    /// Re-announce the full playback state (after a reconnect)
    pub fn resync(&self) -> Result<()> {
        self.send(Command::Resync)
    }

    // ------------------------------------------------------------------
    // Follower
    // ------------------------------------------------------------------

    /// Apply a host event that arrived without an envelope
    pub fn on_remote_event(&self, event: SyncEvent) -> Result<()> {
        self.send(Command::RemoteEvent { envelope: None, event })
    }

    pub fn on_local_scrub_start(&self) -> Result<()> {
        self.send(Command::ScrubStart)
    }

    pub fn on_local_scrub_end(&self) -> Result<()> {
        self.send(Command::ScrubEnd)
    }

    // ------------------------------------------------------------------
    // Transport and RTT
    // ------------------------------------------------------------------

    /// Hand over a message received from the peer
    pub fn deliver(&self, message: WireMessage) -> Result<()> {
        self.send(Command::Inbound(message))
    }

    pub fn set_connected(&self, connected: bool) -> Result<()> {
        self.send(Command::ConnectionChanged(connected))
    }

    pub fn start_probing(&self, interval: Duration) -> Result<()> {
        self.send(Command::StartProbing(interval))
    }

    pub fn stop_probing(&self) -> Result<()> {
        self.send(Command::StopProbing)
    }

    pub async fn current_rtt(&self) -> Result<Option<i64>> {
        self.request(Command::CurrentRtt).await
    }

    pub async fn diagnostics(&self) -> Result<SyncDiagnostics> {
        self.request(Command::Diagnostics).await
    }

    /// Stop the actor after tearing down the current role
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

enum RoleState {
    Idle,
    Host(HostState),
    Follower(FollowerState),
}

impl RoleState {
    fn role(&self) -> Option<Role> {
        match self {
            RoleState::Idle => None,
            RoleState::Host(_) => Some(Role::Host),
            RoleState::Follower(_) => Some(Role::Follower),
        }
    }
}

fn role_name(role: Option<Role>) -> String {
    role.map_or_else(|| "none".to_string(), |r| r.to_string())
}

struct SyncActor {
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
    feed: PlayerFeed,
    rtt: RttEstimator,
    role: RoleState,
    connected: bool,
    events_sent: u64,
    events_applied: u64,
    events_dropped: u64,
}

/// Start the orchestrator task; it begins with no role
pub fn spawn(
    config: SyncConfig,
    engine: Arc<dyn PlaybackEngine>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
) -> (SyncHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let actor = SyncActor {
        feed: PlayerFeed::new(engine, config.state_poll_interval()),
        rtt: RttEstimator::new(clock.clone(), config.rtt_probe_interval()),
        config,
        clock,
        transport,
        role: RoleState::Idle,
        connected: false,
        events_sent: 0,
        events_applied: 0,
        events_dropped: 0,
    };
    let task = tokio::spawn(actor.run(rx));
    (SyncHandle { commands: tx }, task)
}

async fn heartbeat_due(role: &mut RoleState) {
    match role {
        RoleState::Host(host) => host.heartbeat_due().await,
        _ => pending::<()>().await,
    }
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending::<()>().await,
    }
}

impl SyncActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Sync orchestrator started");
        loop {
            let seek_at = match &self.role {
                RoleState::Host(host) => host.pending_seek_deadline(),
                _ => None,
            };
            let nudge_at = match &self.role {
                RoleState::Follower(follower) => follower.corrector().nudge_deadline(),
                _ => None,
            };

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = self.feed.wait() => self.refresh_feed(),
                _ = heartbeat_due(&mut self.role) => self.on_heartbeat(),
                _ = self.rtt.probe_due() => self.send_probe(),
                _ = deadline(seek_at) => self.flush_seek(),
                _ = deadline(nudge_at) => self.expire_nudge(),
            }
        }

        self.teardown();
        info!("Sync orchestrator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetRole { role, ack } => {
                self.set_role(role);
                let _ = ack.send(());
            }
            Command::LeaveRole { role, ack } => {
                if self.role.role() == Some(role) {
                    self.set_role(None);
                } else {
                    debug!("Not leaving {}: current role is {}", role, role_name(self.role.role()));
                }
                let _ = ack.send(());
            }
            Command::LocalSeek(position_ms) => self.on_local_seek(position_ms),
            Command::RemoteEvent { envelope, event } => self.on_remote_event(envelope, event),
            Command::Inbound(message) => self.on_inbound(message),
            Command::ScrubStart => match &mut self.role {
                RoleState::Follower(follower) => follower.on_scrub_start(),
                _ => debug!("Ignoring scrub start outside follower role"),
            },
            Command::ScrubEnd => match &mut self.role {
                RoleState::Follower(follower) => follower.on_scrub_end(),
                _ => debug!("Ignoring scrub end outside follower role"),
            },
            Command::StartProbing(interval) => self.rtt.start_probing(interval),
            Command::StopProbing => self.rtt.stop_probing(),
            Command::ConnectionChanged(connected) => self.on_connection_changed(connected),
            Command::Resync => self.resync(),
            Command::Diagnostics(reply) => {
                let _ = reply.send(self.diagnostics());
            }
            Command::CurrentRtt(reply) => {
                let _ = reply.send(self.rtt.current_rtt());
            }
            Command::Shutdown => {}
        }
    }

    // ------------------------------------------------------------------
    // Role lifecycle
    // ------------------------------------------------------------------

    fn set_role(&mut self, role: Option<Role>) {
        let previous = self.role.role();
        if previous == role {
            debug!("Role unchanged ({})", role_name(role));
            return;
        }

        self.teardown();
        self.rtt.reset();
        // Teardown may have restored the engine rate; the new role starts from here
        self.feed.refresh();

        match role {
            Some(Role::Host) => {
                let mut host = HostState::new(self.config.heartbeat_interval(), self.config.seek_debounce());
                info!("Hosting session {}", host.session_id());
                let now_ms = self.clock.now_ms();
                let messages: Vec<WireMessage> = host
                    .announce(self.feed.last(), now_ms)
                    .into_iter()
                    .map(|event| host.envelope(event))
                    .collect();
                self.role = RoleState::Host(host);
                self.send_all(messages);
            }
            Some(Role::Follower) => {
                self.role = RoleState::Follower(FollowerState::new(&self.config, self.clock.clone()));
            }
            None => {}
        }

        if role.is_some() {
            self.rtt.restart_probing();
        } else {
            self.rtt.stop_probing();
        }
        info!("Role changed: {} -> {}", role_name(previous), role_name(role));
    }

    /// Stop everything the current role started
    fn teardown(&mut self) {
        match std::mem::replace(&mut self.role, RoleState::Idle) {
            RoleState::Host(mut host) => {
                host.stop_heartbeat();
                if let Some(pending) = host.pending_seek() {
                    debug!("Discarding unsent seek to {}ms", pending.position_ms);
                }
            }
            RoleState::Follower(mut follower) => {
                if let Err(e) = follower.teardown(self.feed.engine()) {
                    warn!("Failed to restore playback rate on teardown: {}", e);
                }
            }
            RoleState::Idle => {}
        }
    }

    // ------------------------------------------------------------------
    // Engine feed and host emission
    // ------------------------------------------------------------------

    /// Single refresh step for push notifications, polls and pre-evaluation reads
    fn refresh_feed(&mut self) {
        let update = self.feed.refresh();
        if update.error_changed() {
            match &update.current.error {
                Some(error) => warn!("Playback engine error, corrections paused: {}", error),
                None => info!("Playback engine error cleared, corrections resumed"),
            }
        }

        if let RoleState::Host(host) = &mut self.role {
            let now_ms = self.clock.now_ms();
            let messages: Vec<WireMessage> = host
                .on_feed_update(&update, now_ms)
                .into_iter()
                .map(|event| host.envelope(event))
                .collect();
            self.send_all(messages);
        }
    }

    fn on_heartbeat(&mut self) {
        self.refresh_feed();
        let now_ms = self.clock.now_ms();
        let message = match &mut self.role {
            RoleState::Host(host) if host.heartbeat_running() && self.feed.last().is_playing => {
                Some(host.envelope(HostState::heartbeat_event(self.feed.last(), now_ms)))
            }
            _ => None,
        };
        if let Some(message) = message {
            self.send(message);
        }
    }

    fn on_local_seek(&mut self, position_ms: i64) {
        match &mut self.role {
            RoleState::Host(host) => {
                debug!("Local seek to {}ms queued", position_ms);
                host.queue_seek(position_ms);
            }
            _ => debug!("Ignoring local seek outside host role"),
        }
    }

    fn flush_seek(&mut self) {
        let now_ms = self.clock.now_ms();
        let message = match &mut self.role {
            RoleState::Host(host) => host
                .take_due_seek(Instant::now())
                .map(|pending| host.envelope(HostState::seek_event(pending, now_ms))),
            _ => None,
        };
        if let Some(message) = message {
            self.send(message);
        }
    }

    fn resync(&mut self) {
        self.feed.refresh();
        let now_ms = self.clock.now_ms();
        let messages: Vec<WireMessage> = match &mut self.role {
            RoleState::Host(host) => {
                info!("Resynchronizing follower");
                host.announce(self.feed.last(), now_ms)
                    .into_iter()
                    .map(|event| host.envelope(event))
                    .collect()
            }
            _ => {
                debug!("Ignoring resync outside host role");
                Vec::new()
            }
        };
        self.send_all(messages);
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn on_inbound(&mut self, message: WireMessage) {
        match message {
            WireMessage::Sync { session_id, seq, event } => {
                self.on_remote_event(Some((session_id, seq)), event)
            }
            WireMessage::Probe { sent_at_ms } => self.send(RttEstimator::respond_to(sent_at_ms)),
            WireMessage::ProbeResponse { sent_at_ms } => {
                self.rtt.on_response(sent_at_ms);
            }
        }
    }

    fn on_remote_event(&mut self, envelope: Option<(Uuid, u64)>, event: SyncEvent) {
        if !matches!(self.role, RoleState::Follower(_)) {
            debug!("Ignoring remote {} ({})", event.name(), role_name(self.role.role()));
            return;
        }

        self.refresh_feed();
        let rtt_ms = self.rtt.current_rtt();
        let RoleState::Follower(follower) = &mut self.role else {
            return;
        };
        match follower.on_remote_event(envelope, &event, self.feed.last(), rtt_ms, self.feed.engine()) {
            Ok(outcome) if outcome.is_dropped() => self.events_dropped += 1,
            Ok(RemoteOutcome::Throttled) => {}
            Ok(_) => self.events_applied += 1,
            Err(e) => warn!("Failed to apply {}: {}", event.name(), e),
        }
    }

    fn expire_nudge(&mut self) {
        if let RoleState::Follower(follower) = &mut self.role {
            if let Err(e) = follower.corrector_mut().expire_nudge(self.feed.engine()) {
                warn!("Failed to restore rate after nudge: {}", e);
            }
        }
    }

    fn on_connection_changed(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        if connected {
            info!("Peer connected");
            self.rtt.reset();
            if self.rtt.is_probing() {
                self.rtt.restart_probing();
            }
            self.resync();
        } else {
            info!("Peer disconnected");
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    fn send_probe(&mut self) {
        let probe = self.rtt.make_probe();
        self.send(probe);
    }

    fn send_all(&mut self, messages: Vec<WireMessage>) {
        for message in messages {
            self.send(message);
        }
    }

    /// Fire and forget; failures are logged
    fn send(&mut self, message: WireMessage) {
        let label = match &message {
            WireMessage::Sync { seq, event, .. } => {
                self.events_sent += 1;
                debug!("Sending {} (seq {})", event.name(), seq);
                event.name()
            }
            WireMessage::Probe { .. } => "probe",
            WireMessage::ProbeResponse { .. } => "probe response",
        };
        if let Err(e) = self.transport.send(message) {
            if self.connected {
                warn!("Failed to send {}: {}", label, e);
            } else {
                debug!("Not sent ({}), peer not connected: {}", label, e);
            }
        }
    }

    fn diagnostics(&self) -> SyncDiagnostics {
        let mut diagnostics = SyncDiagnostics {
            role: self.role.role(),
            connected: self.connected,
            last_rtt_ms: self.rtt.current_rtt(),
            engine_error: self.feed.last().error.clone(),
            events_sent: self.events_sent,
            events_applied: self.events_applied,
            events_dropped: self.events_dropped,
            ..SyncDiagnostics::default()
        };
        match &self.role {
            RoleState::Host(host) => diagnostics.session_id = Some(host.session_id()),
            RoleState::Follower(follower) => {
                let corrector = follower.corrector();
                diagnostics.session_id = follower.session_id();
                diagnostics.last_correction = corrector.last_correction().map(|c| c.kind());
                diagnostics.last_drift_sec = corrector.last_correction().map(|c| c.drift_sec());
                diagnostics.nudge_active = corrector.nudge_active();
                diagnostics.scrub_active = follower.scrub().active;
                diagnostics.corrections_applied = corrector.corrections_applied();
            }
            RoleState::Idle => {}
        }
        diagnostics
    }
}

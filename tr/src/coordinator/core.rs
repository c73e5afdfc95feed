//! Session coordinator actor
//!
//! One coordinator task owns one session. Connections, client messages,
//! timer fires and delayed commands all arrive as [`SessionRequest`]s on a
//! single channel and are handled strictly in arrival order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep};
use tracing::{debug, info, warn};

use super::commands::{Command, Context};
use super::handle::SessionHandle;
use super::messages::{SessionMetrics, SessionRequest};
use super::outbox::{Effect, Outbox};
use super::replication::SessionView;
use super::sequencer::{self, BatchReport};
use crate::catalog::Catalog;
use crate::config::GameConfig;
use crate::domain::{PlayerId, RoomCode, Session};
use crate::net::ServerMessage;

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Owns a session and everything that touches it
pub struct SessionCoordinator {
    config: Arc<GameConfig>,
    catalog: Arc<Catalog>,
    tx: mpsc::Sender<SessionRequest>,
    rx: mpsc::Receiver<SessionRequest>,
    session: Session,
    rng: StdRng,
    connections: HashMap<PlayerId, mpsc::Sender<ServerMessage>>,
    round_timer: Option<JoinHandle<()>>,
    scheduled: Vec<JoinHandle<()>>,
    published: SessionView,
    metrics: SessionMetrics,
}

impl SessionCoordinator {
    pub fn new(room: RoomCode, config: Arc<GameConfig>, catalog: Arc<Catalog>, channel_buffer: usize) -> Self {
        debug!(%room, channel_buffer, "SessionCoordinator::new: called");
        let (tx, rx) = mpsc::channel(channel_buffer);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let session = Session::new(room, config.starting_health);
        let published = SessionView::capture(&session, &config);

        Self {
            config,
            catalog,
            tx,
            rx,
            session,
            rng,
            connections: HashMap::new(),
            round_timer: None,
            scheduled: Vec::new(),
            published,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn room(&self) -> &RoomCode {
        &self.session.room
    }

    /// Get a handle for talking to this session
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.session.room.clone(), self.tx.clone())
    }

    /// Process requests until shut down or the last player leaves
    pub async fn run(mut self) {
        info!(room = %self.session.room, "Session started");

        while let Some(request) = self.rx.recv().await {
            if !self.handle_request(request) {
                break;
            }
        }

        self.stop();
        let age = chrono::Utc::now() - self.session.created_at;
        info!(
            room = %self.session.room,
            age_secs = age.num_seconds(),
            batches = self.metrics.batches,
            commands = self.metrics.commands_executed,
            rejected = self.metrics.commands_rejected,
            "Session closed"
        );
    }

    /// Returns false once the session should close
    fn handle_request(&mut self, request: SessionRequest) -> bool {
        match request {
            SessionRequest::Connect { player_id, name, tx } => {
                debug!(%player_id, %name, "handle_request: Connect");
                self.connect(player_id, name, tx);
                true
            }

            SessionRequest::Disconnect { player_id } => {
                debug!(%player_id, "handle_request: Disconnect");
                self.connections.remove(&player_id);
                self.metrics.connections = self.connections.len();
                if self.session.player(&player_id).is_some() {
                    self.execute(vec![Command::Leave { player: player_id }]);
                }
                if self.session.players.is_empty() {
                    info!(room = %self.session.room, "Last player left");
                    return false;
                }
                true
            }

            SessionRequest::Client { player_id, message } => {
                if !self.connections.contains_key(&player_id) {
                    debug!(%player_id, "handle_request: message from unregistered connection, ignoring");
                    return true;
                }
                debug!(%player_id, ?message, "handle_request: Client");
                self.execute(vec![Command::from_client(player_id, message)]);
                true
            }

            SessionRequest::Tick { generation } => {
                self.execute(vec![Command::Tick { generation }]);
                true
            }

            SessionRequest::Scheduled(command) => {
                debug!(command = command.name(), "handle_request: Scheduled");
                self.execute(vec![command]);
                true
            }

            SessionRequest::GetSnapshot { reply_tx } => {
                let _ = reply_tx.send(self.published.clone());
                true
            }

            SessionRequest::GetMetrics { reply_tx } => {
                let _ = reply_tx.send(self.metrics.clone());
                true
            }

            SessionRequest::Shutdown => {
                info!(room = %self.session.room, "Shutdown requested");
                false
            }
        }
    }

    fn connect(&mut self, player_id: PlayerId, name: String, tx: mpsc::Sender<ServerMessage>) {
        let report = self.execute(vec![Command::Join {
            player: player_id.clone(),
            name,
        }]);

        if let Some((_, rejection)) = report.rejected.first() {
            info!(room = %self.session.room, %player_id, %rejection, "Join rejected");
            let _ = tx.try_send(ServerMessage::JoinRejected {
                reason: rejection.to_string(),
            });
            return;
        }

        self.connections.insert(player_id.clone(), tx);
        self.metrics.connections = self.connections.len();
        let welcome = ServerMessage::Welcome {
            room: self.session.room.clone(),
            player_id: player_id.clone(),
            state: self.published.clone(),
        };
        self.deliver(&player_id, welcome);
    }

    /// Run a batch, publish the state diff, then apply the batch's effects
    fn execute(&mut self, commands: Vec<Command>) -> BatchReport {
        let mut outbox = Outbox::new();
        let report = {
            let mut ctx = Context {
                config: &self.config,
                catalog: &self.catalog,
                rng: &mut self.rng,
                outbox: &mut outbox,
            };
            sequencer::run(&mut self.session, &mut ctx, commands)
        };

        self.metrics.batches += 1;
        self.metrics.commands_executed += report.executed_count() as u64;
        self.metrics.commands_rejected += report.rejected_count() as u64;

        self.publish();
        for effect in outbox.drain() {
            self.apply(effect);
        }
        report
    }

    fn publish(&mut self) {
        let next = SessionView::capture(&self.session, &self.config);
        let changes = self.published.diff(&next);
        self.published = next;

        if changes.is_empty() {
            return;
        }
        debug!(changes = changes.len(), "publish: broadcasting state changes");
        self.metrics.state_changes_published += changes.len() as u64;
        self.broadcast(ServerMessage::StateChanged { changes });
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Send { to, message } => self.deliver(&to, message),
            Effect::Broadcast(message) => self.broadcast(message),
            Effect::StartRoundTimer { generation } => self.start_round_timer(generation),
            Effect::CancelRoundTimer => self.cancel_round_timer(),
            Effect::Schedule { delay, command } => self.schedule(delay, command),
        }
    }

    /// Queue a message on one connection without waiting for delivery
    fn deliver(&mut self, to: &str, message: ServerMessage) {
        let Some(conn) = self.connections.get(to) else {
            debug!(player_id = %to, kind = message.kind(), "deliver: no connection");
            return;
        };

        match conn.try_send(message) {
            Ok(()) => self.metrics.messages_sent += 1,
            Err(TrySendError::Full(message)) => {
                warn!(player_id = %to, kind = message.kind(), "Connection backlogged, dropping message");
                self.metrics.messages_dropped += 1;
            }
            Err(TrySendError::Closed(message)) => {
                debug!(player_id = %to, kind = message.kind(), "deliver: connection closed");
                self.metrics.messages_dropped += 1;
            }
        }
    }

    fn broadcast(&mut self, message: ServerMessage) {
        let recipients: Vec<PlayerId> = self.connections.keys().cloned().collect();
        for player_id in recipients {
            self.deliver(&player_id, message.clone());
        }
    }

    fn start_round_timer(&mut self, generation: u64) {
        self.cancel_round_timer();
        debug!(generation, "start_round_timer: called");

        let tx = self.tx.clone();
        self.round_timer = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            loop {
                interval.tick().await;
                if tx.send(SessionRequest::Tick { generation }).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn cancel_round_timer(&mut self) {
        if let Some(timer) = self.round_timer.take() {
            debug!("cancel_round_timer: aborting clock");
            timer.abort();
        }
    }

    fn schedule(&mut self, delay: Duration, command: Command) {
        debug!(?delay, command = command.name(), "schedule: called");
        self.scheduled.retain(|handle| !handle.is_finished());

        let tx = self.tx.clone();
        self.scheduled.push(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(SessionRequest::Scheduled(command)).await;
        }));
    }

    fn stop(&mut self) {
        self.cancel_round_timer();
        for handle in self.scheduled.drain(..) {
            handle.abort();
        }
        self.connections.clear();
    }
}

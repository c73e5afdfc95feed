//! Cloneable handle to a running session

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{SessionMetrics, SessionRequest};
use super::replication::SessionView;
use crate::domain::{PlayerId, RoomCode};
use crate::net::{ClientMessage, ServerMessage};

/// Handle for talking to a session coordinator
#[derive(Debug, Clone)]
pub struct SessionHandle {
    room: RoomCode,
    tx: mpsc::Sender<SessionRequest>,
}

impl SessionHandle {
    pub fn new(room: RoomCode, tx: mpsc::Sender<SessionRequest>) -> Self {
        Self { room, tx }
    }

    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    /// True once the coordinator has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request(&self, request: SessionRequest) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| eyre!("Session {} channel closed", self.room))
    }

    /// Attach a connection; the session answers on `tx` with welcome or joinRejected
    pub async fn connect(&self, player_id: &str, name: &str, tx: mpsc::Sender<ServerMessage>) -> Result<()> {
        debug!(room = %self.room, %player_id, %name, "connect: called");
        self.request(SessionRequest::Connect {
            player_id: player_id.to_string(),
            name: name.to_string(),
            tx,
        })
        .await
    }

    pub async fn disconnect(&self, player_id: &str) -> Result<()> {
        debug!(room = %self.room, %player_id, "disconnect: called");
        self.request(SessionRequest::Disconnect {
            player_id: player_id.to_string(),
        })
        .await
    }

    /// Forward a client message on behalf of a player
    pub async fn send(&self, player_id: &PlayerId, message: ClientMessage) -> Result<()> {
        debug!(room = %self.room, %player_id, ?message, "send: called");
        self.request(SessionRequest::Client {
            player_id: player_id.clone(),
            message,
        })
        .await
    }

    /// Current replicated state
    pub async fn snapshot(&self) -> Result<SessionView> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(SessionRequest::GetSnapshot { reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| eyre!("Session {} dropped snapshot request", self.room))
    }

    pub async fn metrics(&self) -> Result<SessionMetrics> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(SessionRequest::GetMetrics { reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| eyre!("Session {} dropped metrics request", self.room))
    }

    pub async fn shutdown(&self) -> Result<()> {
        debug!(room = %self.room, "shutdown: called");
        self.request(SessionRequest::Shutdown).await
    }
}

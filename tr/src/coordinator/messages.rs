//! Message types for the session coordinator

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use super::commands::Command;
use super::replication::SessionView;
use crate::domain::{Phase, PlayerId, TaskId};
use crate::net::{ClientMessage, ServerMessage};

/// Requests to a session coordinator task
#[derive(Debug)]
pub enum SessionRequest {
    /// A connection joined the room
    Connect {
        player_id: PlayerId,
        name: String,
        tx: mpsc::Sender<ServerMessage>,
    },

    /// A connection left the room
    Disconnect { player_id: PlayerId },

    /// A message arrived from a player connection
    Client {
        player_id: PlayerId,
        message: ClientMessage,
    },

    /// Round clock fired (internal)
    Tick { generation: u64 },

    /// A delayed command came due (internal)
    Scheduled(Command),

    /// Get the current replicated state
    GetSnapshot { reply_tx: oneshot::Sender<SessionView> },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<SessionMetrics>,
    },

    /// Dispose of the session
    Shutdown,
}

/// Why a command was rejected without changing state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Game is over")]
    GameOver,

    #[error("Command not valid in phase {0}")]
    WrongPhase(Phase),

    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    #[error("Player already in session: {0}")]
    DuplicatePlayer(PlayerId),

    #[error("Room is full ({0} players)")]
    RoomFull(usize),

    #[error("Only the host may do that: {0}")]
    NotHost(PlayerId),

    #[error("Need {need} players to start, have {have}")]
    NotEnoughPlayers { have: usize, need: usize },

    #[error("Task not in the active set: {0}")]
    UnknownTask(TaskId),

    #[error("Task already resolved: {0}")]
    AlreadyResolved(TaskId),

    #[error("Task {task} is not held by {player}")]
    NotAssignee { task: TaskId, player: PlayerId },

    #[error("Player {player} already holds task {task}")]
    PlayerBusy { player: PlayerId, task: TaskId },

    #[error("Stale round generation {got}, current is {current}")]
    StaleGeneration { got: u64, current: u64 },
}

/// Session metrics for observability
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    pub connections: usize,
    pub batches: u64,
    pub commands_executed: u64,
    pub commands_rejected: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub state_changes_published: u64,
}

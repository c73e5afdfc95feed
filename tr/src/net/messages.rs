//! Wire message types
//!
//! Newline-delimited JSON. Each message is a single JSON object tagged by a
//! `type` field, followed by `\n`.

use serde::{Deserialize, Serialize};

use crate::coordinator::{SessionView, StateChange};
use crate::domain::{PlayerId, RoomCode, SessionStats, Task, TaskId};

/// First message on a new connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Hello {
    /// Open a new room and join it as host
    CreateRoom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },

    /// Join an existing room by code
    JoinRoom {
        room: RoomCode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// Messages from a player connection to its session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Host asks to begin the game
    StartGame,

    /// The assigned minigame was solved
    TaskCompleted {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },

    /// The assigned minigame was failed
    TaskFailed {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        #[serde(rename = "healthPenalty", default, skip_serializing_if = "Option::is_none")]
        health_penalty: Option<u32>,
    },

    /// A control was operated; ask for the task it resolves
    RequestTask { control: String },

    /// A distraction on the player's screen was clicked
    DistractionClicked,
}

/// Messages from a session to a player connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Join accepted; carries the full replicated state
    Welcome {
        room: RoomCode,
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        state: SessionView,
    },

    /// Join refused; the connection is closed afterwards
    JoinRejected { reason: String },

    /// A task was assigned to this player
    NewTask { task: Task },

    /// This player's task was resolved as completed
    TaskCompleted {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },

    /// This player's task was resolved as failed
    TaskFailed {
        #[serde(rename = "taskId")]
        task_id: TaskId,
    },

    /// Control tokens held this round
    Controls { controls: Vec<String> },

    /// A task exists for the requested control
    HasTaskForControl { task: Task },

    /// No task is waiting for the requested control
    NoTaskForControl { control: String },

    /// Broadcast: the game has started
    StartGame,

    /// Broadcast: the game has ended
    GameOver {
        stats: SessionStats,
        round: u32,
        health: u32,
    },

    /// Broadcast: field-level changes to the replicated state
    StateChanged { changes: Vec<StateChange> },
}

impl ServerMessage {
    /// Wire name of the message, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::JoinRejected { .. } => "joinRejected",
            ServerMessage::NewTask { .. } => "newTask",
            ServerMessage::TaskCompleted { .. } => "taskCompleted",
            ServerMessage::TaskFailed { .. } => "taskFailed",
            ServerMessage::Controls { .. } => "controls",
            ServerMessage::HasTaskForControl { .. } => "hasTaskForControl",
            ServerMessage::NoTaskForControl { .. } => "noTaskForControl",
            ServerMessage::StartGame => "startGame",
            ServerMessage::GameOver { .. } => "gameOver",
            ServerMessage::StateChanged { .. } => "stateChanged",
        }
    }
}

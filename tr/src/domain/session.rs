//! Session aggregate: players, round state, health and statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::id::{PlayerId, RoomCode, TaskId};
use crate::pool::TaskPool;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Lobby; players may join, the host may start
    AwaitingStart,
    /// A round is running and tasks are in play
    RoundActive,
    /// Between rounds
    RoundTransition,
    /// Terminal
    GameOver,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::AwaitingStart => "awaiting-start",
            Phase::RoundActive => "round-active",
            Phase::RoundTransition => "round-transition",
            Phase::GameOver => "game-over",
        };
        write!(f, "{}", name)
    }
}

/// A connected participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Control tokens held this round, in allocation order
    pub controls: Vec<String>,
    /// At most one task at a time
    pub active_task: Option<TaskId>,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            controls: Vec::new(),
            active_task: None,
        }
    }

    pub fn holds(&self, control: &str) -> bool {
        self.controls.iter().any(|c| c == control)
    }

    pub fn is_idle(&self) -> bool {
        self.active_task.is_none()
    }
}

/// Lifetime statistics, reported when the game ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_time_secs: u64,
    pub total_distraction_clicks: u64,
    pub rounds_played: u32,
}

/// Root aggregate for one room
///
/// Mutated only by commands run through the sequencer.
#[derive(Debug)]
pub struct Session {
    pub room: RoomCode,
    pub host: Option<PlayerId>,
    /// Join order; host transfer and allocation iterate in this order
    pub players: Vec<Player>,
    pub phase: Phase,
    pub round: u32,
    /// Bumped every time a round begins; stale timer callbacks carry an old value
    pub generation: u64,
    /// Seconds elapsed in the current round
    pub timer: u32,
    pub health: u32,
    pub tasks_done: u32,
    pub tasks_failed: u32,
    pub stats: SessionStats,
    pub pool: TaskPool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(room: RoomCode, starting_health: u32) -> Self {
        debug!(%room, starting_health, "Session::new: called");
        Self {
            room,
            host: None,
            players: Vec::new(),
            phase: Phase::AwaitingStart,
            round: 1,
            generation: 0,
            timer: 0,
            health: starting_health,
            tasks_done: 0,
            tasks_failed: 0,
            stats: SessionStats::default(),
            pool: TaskPool::new(),
            created_at: Utc::now(),
        }
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn is_host(&self, id: &str) -> bool {
        self.host.as_deref() == Some(id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    /// Add a player; the first player in an empty room becomes host
    pub fn add_player(&mut self, player: Player) {
        debug!(player_id = %player.id, name = %player.name, "Session::add_player: called");
        if self.host.is_none() {
            self.host = Some(player.id.clone());
        }
        self.players.push(player);
    }

    /// Remove a player, handing the host role to the first remaining player
    ///
    /// The player's tokens leave with them and any task they held stays in
    /// the active set until the round resets.
    pub fn remove_player(&mut self, id: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id == id)?;
        let removed = self.players.remove(index);

        if self.is_host(id) {
            self.host = self.players.first().map(|p| p.id.clone());
            debug!(old_host = %id, new_host = ?self.host, "Session::remove_player: host transferred");
        }

        Some(removed)
    }

    /// Drop every task and empty every player's task slot
    pub fn reset_tasks(&mut self) {
        self.pool.clear();
        for player in &mut self.players {
            player.active_task = None;
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == Phase::GameOver
    }
}

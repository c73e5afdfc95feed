//! Replicated session state
//!
//! Clients see a projection of the session, never the session itself. After
//! each batch the coordinator captures a fresh [`SessionView`], diffs it
//! against the last published one and broadcasts the field-level changes.
//! Task assignees are deliberately absent from the view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::GameConfig;
use crate::domain::{Phase, PlayerId, RoomCode, Session, Task, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub name: String,
    pub controls: Vec<String>,
}

/// Everything every connection may see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub room: RoomCode,
    pub host: Option<PlayerId>,
    pub phase: Phase,
    pub round: u32,
    pub timer: u32,
    pub health: u32,
    pub tasks_done: u32,
    pub quota: u32,
    pub players: BTreeMap<PlayerId, PlayerView>,
    /// The active task set
    pub tasks: BTreeMap<TaskId, Task>,
}

/// One field-level change to a [`SessionView`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum StateChange {
    Phase { value: Phase },
    Round { value: u32 },
    Timer { value: u32 },
    Health { value: u32 },
    TasksDone { value: u32 },
    Quota { value: u32 },
    Host { value: Option<PlayerId> },
    PlayerSet { id: PlayerId, player: PlayerView },
    PlayerRemoved { id: PlayerId },
    TaskSet { task: Task },
    TaskRemoved { id: TaskId },
}

impl SessionView {
    pub fn capture(session: &Session, config: &GameConfig) -> Self {
        let players = session
            .players
            .iter()
            .map(|p| {
                (
                    p.id.clone(),
                    PlayerView {
                        name: p.name.clone(),
                        controls: p.controls.clone(),
                    },
                )
            })
            .collect();
        let tasks = session
            .pool
            .active_tasks()
            .map(|active| (active.task.id, active.task.clone()))
            .collect();

        Self {
            room: session.room.clone(),
            host: session.host.clone(),
            phase: session.phase,
            round: session.round,
            timer: session.timer,
            health: session.health,
            tasks_done: session.tasks_done,
            quota: config.quota_for_round(session.round),
            players,
            tasks,
        }
    }

    /// Changes that turn `self` into `next`
    pub fn diff(&self, next: &SessionView) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if self.phase != next.phase {
            changes.push(StateChange::Phase { value: next.phase });
        }
        if self.round != next.round {
            changes.push(StateChange::Round { value: next.round });
        }
        if self.timer != next.timer {
            changes.push(StateChange::Timer { value: next.timer });
        }
        if self.health != next.health {
            changes.push(StateChange::Health { value: next.health });
        }
        if self.tasks_done != next.tasks_done {
            changes.push(StateChange::TasksDone { value: next.tasks_done });
        }
        if self.quota != next.quota {
            changes.push(StateChange::Quota { value: next.quota });
        }
        if self.host != next.host {
            changes.push(StateChange::Host {
                value: next.host.clone(),
            });
        }

        for id in self.players.keys().filter(|id| !next.players.contains_key(*id)) {
            changes.push(StateChange::PlayerRemoved { id: id.clone() });
        }
        for (id, player) in &next.players {
            if self.players.get(id) != Some(player) {
                changes.push(StateChange::PlayerSet {
                    id: id.clone(),
                    player: player.clone(),
                });
            }
        }

        for id in self.tasks.keys().filter(|id| !next.tasks.contains_key(*id)) {
            changes.push(StateChange::TaskRemoved { id: *id });
        }
        for (id, task) in &next.tasks {
            if self.tasks.get(id) != Some(task) {
                changes.push(StateChange::TaskSet { task: task.clone() });
            }
        }

        changes
    }

    /// Apply changes in order, as a client mirror would
    pub fn apply(&mut self, changes: &[StateChange]) {
        for change in changes {
            match change {
                StateChange::Phase { value } => self.phase = *value,
                StateChange::Round { value } => self.round = *value,
                StateChange::Timer { value } => self.timer = *value,
                StateChange::Health { value } => self.health = *value,
                StateChange::TasksDone { value } => self.tasks_done = *value,
                StateChange::Quota { value } => self.quota = *value,
                StateChange::Host { value } => self.host = value.clone(),
                StateChange::PlayerSet { id, player } => {
                    self.players.insert(id.clone(), player.clone());
                }
                StateChange::PlayerRemoved { id } => {
                    self.players.remove(id);
                }
                StateChange::TaskSet { task } => {
                    self.tasks.insert(task.id, task.clone());
                }
                StateChange::TaskRemoved { id } => {
                    self.tasks.remove(id);
                }
            }
        }
    }
}

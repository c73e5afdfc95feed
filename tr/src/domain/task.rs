//! Task records

use serde::{Deserialize, Serialize};

use super::id::TaskId;
use crate::catalog::TaskKind;

/// A unit of work handed to one player
///
/// The assignee is tracked by the pool, never on the task itself, so a task
/// can be replicated to every client without revealing who holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    pub control: String,
    pub completed: bool,
    #[serde(default)]
    pub multiplayer: bool,
    #[serde(default)]
    pub filler: bool,
}

impl Task {
    /// Create an unfinished task of the given kind
    pub fn new(id: TaskId, kind: &TaskKind) -> Self {
        Self {
            id,
            kind: kind.name.clone(),
            control: kind.control.clone(),
            completed: false,
            multiplayer: kind.multiplayer,
            filler: kind.filler,
        }
    }
}

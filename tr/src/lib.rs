//! TaskRelay - session coordinator for cooperative relay games
//!
//! Three to six players share a session. Each round every player is dealt a
//! handful of control tokens and a stream of tasks whose controls usually sit
//! on someone else's screen, so players have to talk each other through them.
//! Failures cost shared health; the game ends when health runs out or the
//! last round finishes.
//!
//! # Modules
//!
//! - [`coordinator`] - per-session actor, command sequencer and replication
//! - [`pool`] - task queue and active set for a round
//! - [`allocator`] - fair partition of control tokens across players
//! - [`assigner`] - binds tasks to players, including multiplayer helpers
//! - [`rooms`] - room code registry
//! - [`net`] - newline-delimited JSON transport over TCP
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod allocator;
pub mod assigner;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod net;
pub mod pool;
pub mod rooms;

// Re-export commonly used types
pub use catalog::{Catalog, TaskKind, TaskKindConfig};
pub use config::{Config, GameConfig, ServerConfig};
pub use coordinator::{
    BatchReport, Command, Rejection, SessionCoordinator, SessionHandle, SessionMetrics, SessionView, StateChange,
};
pub use domain::{Phase, Player, PlayerId, RoomCode, Session, SessionStats, Task, TaskId};
pub use net::{ClientMessage, Hello, RelayClient, ServerMessage};
pub use pool::TaskPool;
pub use rooms::RoomRegistry;

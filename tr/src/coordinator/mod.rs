//! Session coordination
//!
//! Every mutation of a session goes through one path: requests arrive on the
//! coordinator's channel, become [`Command`]s, and run through the sequencer
//! one at a time. Side effects are collected in an [`Outbox`] and applied
//! after the batch; state changes reach clients as [`StateChange`] diffs.

mod commands;
mod core;
mod handle;
mod messages;
mod outbox;
pub mod phase;
mod replication;
pub mod sequencer;

pub use commands::{Command, CommandResult, Context};
pub use self::core::SessionCoordinator;
pub use handle::SessionHandle;
pub use messages::{Rejection, SessionMetrics, SessionRequest};
pub use outbox::{Effect, Outbox};
pub use replication::{PlayerView, SessionView, StateChange};
pub use sequencer::BatchReport;

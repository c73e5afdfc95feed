//! Command sequencer
//!
//! Runs a batch of commands against one session, strictly one at a time.
//! Follow-up commands are appended to the back of the batch, so everything
//! already queued runs before anything a handler triggers. After each command
//! that changed state the round end check runs and may queue `EndRound`.

use std::collections::VecDeque;

use tracing::{debug, warn};

use super::commands::{Command, Context};
use super::messages::Rejection;
use super::phase;
use crate::domain::Session;

/// What happened to the commands in one batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Names of the commands that ran, in execution order
    pub executed: Vec<&'static str>,
    /// Commands that were refused without changing state
    pub rejected: Vec<(&'static str, Rejection)>,
}

impl BatchReport {
    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Run `commands` and every follow-up they produce until the queue is empty
pub fn run(session: &mut Session, ctx: &mut Context<'_>, commands: impl IntoIterator<Item = Command>) -> BatchReport {
    let mut queue: VecDeque<Command> = commands.into_iter().collect();
    let mut report = BatchReport::default();
    let mut round_end_queued: Option<u64> = None;

    debug!(room = %session.room, queued = queue.len(), "run: called");

    while let Some(command) = queue.pop_front() {
        let name = command.name();

        if session.is_game_over() && !command.runs_after_game_over() {
            debug!(command = name, "run: game over, ignoring");
            report.rejected.push((name, Rejection::GameOver));
            continue;
        }

        match command.execute(session, ctx) {
            Ok(follow_ups) => {
                debug!(command = name, follow_ups = follow_ups.len(), "run: executed");
                report.executed.push(name);
                queue.extend(follow_ups);

                if let Some(end) = phase::evaluate(session, ctx.config) {
                    let generation = session.generation;
                    if round_end_queued != Some(generation) {
                        debug!(generation, "run: round over, queueing end");
                        round_end_queued = Some(generation);
                        queue.push_back(end);
                    }
                }
            }
            Err(rejection) => {
                match rejection {
                    Rejection::StaleGeneration { .. } | Rejection::GameOver | Rejection::UnknownTask(_) => {
                        debug!(command = name, %rejection, "run: rejected")
                    }
                    _ => warn!(command = name, %rejection, "Command rejected"),
                }
                report.rejected.push((name, rejection));
            }
        }
    }

    report
}

//! Round end detection
//!
//! Checked after every command that changed state. A round ends when its
//! clock runs out or its quota of completed tasks is met, whichever first.

use super::commands::Command;
use crate::config::GameConfig;
use crate::domain::{Phase, Session};

/// Why a round is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEnd {
    TimeUp,
    QuotaMet,
}

pub fn round_end(session: &Session, config: &GameConfig) -> Option<RoundEnd> {
    if session.phase != Phase::RoundActive {
        return None;
    }
    if session.tasks_done >= config.quota_for_round(session.round) {
        Some(RoundEnd::QuotaMet)
    } else if session.timer >= config.round_time_secs {
        Some(RoundEnd::TimeUp)
    } else {
        None
    }
}

/// The command that closes the current round, if it should close
pub fn evaluate(session: &Session, config: &GameConfig) -> Option<Command> {
    round_end(session, config).map(|_| Command::EndRound {
        generation: session.generation,
    })
}

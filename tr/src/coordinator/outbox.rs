//! Side effects collected while a batch runs
//!
//! Commands never touch sockets or timers directly. They push effects here
//! and the coordinator applies them once the batch has finished.

use std::time::Duration;

use super::commands::Command;
use crate::domain::PlayerId;
use crate::net::ServerMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Push a message to one connection
    Send { to: PlayerId, message: ServerMessage },
    /// Push a message to every connection
    Broadcast(ServerMessage),
    /// Start the round clock for a generation, replacing any running clock
    StartRoundTimer { generation: u64 },
    /// Stop the round clock; a no-op when none is running
    CancelRoundTimer,
    /// Run a command later through the same queue
    Schedule { delay: Duration, command: Command },
}

#[derive(Debug, Default)]
pub struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, to: &str, message: ServerMessage) {
        self.effects.push(Effect::Send {
            to: to.to_string(),
            message,
        });
    }

    pub fn broadcast(&mut self, message: ServerMessage) {
        self.effects.push(Effect::Broadcast(message));
    }

    pub fn push(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn drain(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Messages addressed to one player, in order
    pub fn sent_to(&self, player: &str) -> Vec<&ServerMessage> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send { to, message } if to == player => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Broadcast messages, in order
    pub fn broadcasts(&self) -> Vec<&ServerMessage> {
        self.effects
            .iter()
            .filter_map(|e| match e {
                Effect::Broadcast(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

//! Control allocation
//!
//! At the start of every round the control-token universe is shuffled and
//! partitioned across players: each player gets `tokens / players` tokens,
//! the remainder goes one each to players in join order, and nobody exceeds
//! the per-player cap. Tokens left over because of the cap stay unheld for
//! the round.

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::domain::{PlayerId, Session};

/// Result of one allocation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Tokens per player, in player order
    pub assignments: Vec<(PlayerId, Vec<String>)>,
    /// Tokens nobody received
    pub undistributed: Vec<String>,
}

impl Allocation {
    pub fn distributed(&self) -> usize {
        self.assignments.iter().map(|(_, tokens)| tokens.len()).sum()
    }

    pub fn tokens_for(&self, player: &str) -> Option<&[String]> {
        self.assignments
            .iter()
            .find(|(id, _)| id == player)
            .map(|(_, tokens)| tokens.as_slice())
    }
}

/// Partition tokens across players in the order given, without shuffling
pub fn partition(tokens: &[String], players: &[PlayerId], cap: usize) -> Allocation {
    debug!(tokens = tokens.len(), players = players.len(), cap, "partition: called");
    if players.is_empty() {
        return Allocation {
            assignments: Vec::new(),
            undistributed: tokens.to_vec(),
        };
    }

    if tokens.len() < players.len() {
        warn!(
            tokens = tokens.len(),
            players = players.len(),
            "Fewer control tokens than players; some players get none"
        );
    }

    let even_share = tokens.len() / players.len();
    let remainder = tokens.len() % players.len();
    let mut remaining = tokens.iter();
    let mut assignments = Vec::with_capacity(players.len());

    for (index, player) in players.iter().enumerate() {
        let share = (even_share + usize::from(index < remainder)).min(cap);
        let held: Vec<String> = remaining.by_ref().take(share).cloned().collect();
        assignments.push((player.clone(), held));
    }

    let undistributed: Vec<String> = remaining.cloned().collect();
    if !undistributed.is_empty() {
        warn!(
            undistributed = undistributed.len(),
            cap, "Per-player cap left control tokens unallocated"
        );
    }

    Allocation {
        assignments,
        undistributed,
    }
}

/// Shuffle the universe and partition it across players
pub fn allocate<R: Rng + ?Sized>(universe: &[String], players: &[PlayerId], cap: usize, rng: &mut R) -> Allocation {
    let mut tokens = universe.to_vec();
    tokens.shuffle(rng);
    partition(&tokens, players, cap)
}

/// Clear every player's tokens, then hand out a fresh allocation
pub fn reallocate<R: Rng + ?Sized>(session: &mut Session, universe: &[String], cap: usize, rng: &mut R) -> Allocation {
    for player in &mut session.players {
        player.controls.clear();
    }

    let allocation = allocate(universe, &session.player_ids(), cap, rng);
    for (id, tokens) in &allocation.assignments {
        if let Some(player) = session.player_mut(id) {
            player.controls = tokens.clone();
        }
    }

    debug!(
        distributed = allocation.distributed(),
        undistributed = allocation.undistributed.len(),
        "reallocate: done"
    );
    allocation
}

//! Session registry — the players of one puzzle session and their standings.
//!
//! DESIGN
//! ======
//! Players are created on first join and never removed; a rejoin with a known
//! id only renames. Join order is kept so leaderboard ties list the earlier
//! player first. Ranks are derived from scores with skip counting and
//! recomputed whenever a score or the roster changes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frame::PlayerId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSession {
    pub player_id: PlayerId,
    pub name: String,
    /// Connect and fit credits.
    pub score: u32,
    /// 1-based; tied scores share a rank and the next rank skips.
    pub rank: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    New,
    Renamed { previous: String },
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    players: Vec<PlayerSession>,
    index: HashMap<PlayerId, usize>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player or rename a known one.
    pub fn join(&mut self, player_id: &str, name: &str) -> JoinOutcome {
        if let Some(&slot) = self.index.get(player_id) {
            let player = &mut self.players[slot];
            if player.name == name {
                return JoinOutcome::Unchanged;
            }
            let previous = std::mem::replace(&mut player.name, name.to_owned());
            return JoinOutcome::Renamed { previous };
        }

        self.index.insert(player_id.to_owned(), self.players.len());
        self.players.push(PlayerSession { player_id: player_id.to_owned(), name: name.to_owned(), score: 0, rank: 0 });
        self.recompute_ranks();
        JoinOutcome::New
    }

    #[must_use]
    pub fn is_known(&self, player_id: &str) -> bool {
        self.index.contains_key(player_id)
    }

    #[must_use]
    pub fn get(&self, player_id: &str) -> Option<&PlayerSession> {
        self.index.get(player_id).map(|&slot| &self.players[slot])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Players in join order.
    #[must_use]
    pub fn players(&self) -> &[PlayerSession] {
        &self.players
    }

    /// Award one credit. A player acting without having joined (trusted
    /// mode) is registered under their id first. Returns the new score.
    pub fn credit(&mut self, player_id: &str) -> u32 {
        if !self.is_known(player_id) {
            self.join(player_id, player_id);
        }
        let slot = self.index[player_id];
        self.players[slot].score += 1;
        let score = self.players[slot].score;
        self.recompute_ranks();
        score
    }

    /// Standings ordered by rank, ties in join order.
    #[must_use]
    pub fn leaderboard(&self) -> Vec<PlayerSession> {
        let mut standings = self.players.clone();
        standings.sort_by_key(|player| player.rank);
        standings
    }

    /// Replace the roster with one received in a session snapshot.
    pub fn restore(&mut self, players: &[PlayerSession]) {
        self.players = players.to_vec();
        self.index = self.players.iter().enumerate().map(|(slot, p)| (p.player_id.clone(), slot)).collect();
        self.recompute_ranks();
    }

    fn recompute_ranks(&mut self) {
        let scores: Vec<u32> = self.players.iter().map(|p| p.score).collect();
        for (player, rank) in self.players.iter_mut().zip(compute_ranks(&scores)) {
            player.rank = rank;
        }
    }
}

/// Competition ranking: `[10, 10, 7, 5, 5, 5]` → `[1, 1, 3, 4, 4, 4]`.
/// Output is index-aligned with the input, which need not be sorted.
#[must_use]
pub fn compute_ranks(scores: &[u32]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].cmp(&scores[a]));

    let mut ranks = vec![0; scores.len()];
    for (pos, &slot) in order.iter().enumerate() {
        ranks[slot] = match pos.checked_sub(1).map(|prev| order[prev]) {
            Some(prev) if scores[prev] == scores[slot] => ranks[prev],
            _ => u32::try_from(pos + 1).unwrap_or(u32::MAX),
        };
    }
    ranks
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

//! Hold timeouts — bound how long one player may keep a group held.
//!
//! DESIGN
//! ======
//! A deadline queue ordered by `(deadline, arm order)` plus a per-player index
//! for cancellation. Timers are keyed by player: arming for a player who
//! already has a live timer replaces it, so a player can be timed out on one
//! group at a time. That matches the rule that a player holds at most one
//! group; a replaced timer is reported to the caller so it can be logged.
//!
//! The queue is polled from the owner's tick with an explicit `now`, so tests
//! drive time directly. An expired timer is removed when it is reported and
//! never fires again.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crate::frame::{PieceId, PlayerId};

/// Default grace period before a held group is forcibly released.
pub const DEFAULT_HOLD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expired {
    pub player_id: PlayerId,
    pub root: PieceId,
}

#[derive(Debug)]
pub struct HoldTimers {
    timeout: Duration,
    queue: BTreeMap<(Instant, u64), Expired>,
    by_player: HashMap<PlayerId, (Instant, u64)>,
    armed: u64,
}

impl HoldTimers {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, queue: BTreeMap::new(), by_player: HashMap::new(), armed: 0 }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Start the grace period for `player` holding `root`. Returns the root
    /// of a timer this one replaced, if any. A deadline past the clock's
    /// range is never armed: that hold does not expire.
    pub fn arm_at(&mut self, player_id: &str, root: PieceId, now: Instant) -> Option<PieceId> {
        let replaced = self.cancel(player_id);
        let Some(deadline) = now.checked_add(self.timeout) else {
            return replaced;
        };
        self.armed += 1;
        let key = (deadline, self.armed);
        self.queue.insert(key, Expired { player_id: player_id.to_owned(), root });
        self.by_player.insert(player_id.to_owned(), key);
        replaced
    }

    /// Drop the live timer for `player`. Returns the root it guarded.
    pub fn cancel(&mut self, player_id: &str) -> Option<PieceId> {
        let key = self.by_player.remove(player_id)?;
        self.queue.remove(&key).map(|entry| entry.root)
    }

    /// Root guarded by the live timer for `player`.
    #[must_use]
    pub fn root_for(&self, player_id: &str) -> Option<PieceId> {
        let key = self.by_player.get(player_id)?;
        self.queue.get(key).map(|entry| entry.root)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every timer whose deadline is at or before `now`,
    /// earliest first.
    pub fn expired_at(&mut self, now: Instant) -> Vec<Expired> {
        let mut fired = Vec::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let expired = entry.remove();
            self.by_player.remove(&expired.player_id);
            fired.push(expired);
        }
        fired
    }
}

impl Default for HoldTimers {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_TIMEOUT)
    }
}

#[cfg(test)]
#[path = "hold_test.rs"]
mod tests;

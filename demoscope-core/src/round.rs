//! Round-scoped state and the lifecycle contract shared by the sub-engines.
//!
//! The [`RoundLifecycleController`](crate::lifecycle::RoundLifecycleController)
//! is the only caller of [`RoundHook`]: it opens a round, feeds typed events
//! to each sub-engine's own methods, and closes the round. Sub-engines never
//! reach into each other's state; whatever they need arrives through
//! [`RoundOpen`] / [`RoundClose`] or as method arguments.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{Identity, Side, Tick};

/// Lifecycle hooks implemented by every round-scoped sub-engine.
pub trait RoundHook {
    /// A fresh round has been opened.
    fn on_round_open(&mut self, round: &RoundOpen<'_>);

    /// The round has been finalized.
    fn on_round_close(&mut self, round: &RoundClose<'_>);
}

/// Everything a sub-engine may need when a round opens.
#[derive(Debug, Clone, Copy)]
pub struct RoundOpen<'a> {
    /// 1-based round number.
    pub number: u32,
    /// Anchor tick (freeze end, round start, or first gameplay event).
    pub tick: Tick,
    /// Side membership and alive sets at the start of the round.
    pub roster: &'a RoundRoster,
    /// Loadout value per player at the start of the round.
    pub start_values: &'a BTreeMap<Identity, u32>,
    /// Number of alive CT players carrying a defuse kit.
    pub ct_kits: usize,
}

/// Everything a sub-engine may need when a round closes.
#[derive(Debug, Clone, Copy)]
pub struct RoundClose<'a> {
    /// 1-based round number.
    pub number: u32,
    /// Tick at which the round-ending condition was met.
    pub tick: Tick,
    /// Winning side.
    pub winner: Side,
    /// Side membership and alive sets at the end of the round.
    pub roster: &'a RoundRoster,
    /// Whether the next round starts the second half.
    pub next_is_side_swap: bool,
}

/// The round-end condition, held back until garbage time is drained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRoundEnd {
    /// Winning side.
    pub winner: Side,
    /// Win-reason code, if the log had one.
    pub reason: Option<i64>,
    /// Tick of the `RoundEnd` event.
    pub end_tick: Tick,
}

/// Decide a round's winner: explicit winner first, then the win-reason code.
///
/// Reasons 9 (T eliminated CT) and 12 (target bombed) give T; 1 (bomb
/// defused), 7 (CT eliminated T) and 8 (target saved) give CT.
#[must_use]
pub fn decide_winner(winner: Option<Side>, reason: Option<i64>) -> Option<Side> {
    winner.or(match reason {
        Some(9 | 12) => Some(Side::T),
        Some(1 | 7 | 8) => Some(Side::CT),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Roster / alive sets
// ---------------------------------------------------------------------------

/// Per-round side membership and alive sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundRoster {
    members: BTreeMap<Identity, Side>,
    alive: [BTreeSet<Identity>; 2],
}

impl RoundRoster {
    /// Build a roster where every listed player starts alive.
    #[must_use]
    pub fn new(members: impl IntoIterator<Item = (Identity, Side)>) -> Self {
        let mut roster = Self::default();
        for (id, side) in members {
            roster.place(&id, side, true);
        }
        roster
    }

    /// The player's side this round.
    #[must_use]
    pub fn side_of(&self, player: &Identity) -> Option<Side> {
        self.members.get(player).copied()
    }

    /// Alive players on `side`.
    #[must_use]
    pub fn alive(&self, side: Side) -> &BTreeSet<Identity> {
        &self.alive[side.index()]
    }

    /// Number of alive players on `side`.
    #[must_use]
    pub fn alive_count(&self, side: Side) -> usize {
        self.alive[side.index()].len()
    }

    /// Whether the player is alive.
    #[must_use]
    pub fn is_alive(&self, player: &Identity) -> bool {
        self.side_of(player)
            .is_some_and(|side| self.alive[side.index()].contains(player))
    }

    /// Every player on `side`, alive or not.
    pub fn members_of(&self, side: Side) -> impl Iterator<Item = &Identity> {
        self.members
            .iter()
            .filter(move |(_, s)| **s == side)
            .map(|(id, _)| id)
    }

    /// All members with their sides.
    #[must_use]
    pub fn members(&self) -> &BTreeMap<Identity, Side> {
        &self.members
    }

    /// Put a player on `side`, moving them out of the other side's alive set.
    pub fn place(&mut self, player: &Identity, side: Side, alive: bool) {
        if player.is_bot() {
            return;
        }
        self.alive[side.opposite().index()].remove(player);
        self.members.insert(player.clone(), side);
        if alive {
            self.alive[side.index()].insert(player.clone());
        } else {
            self.alive[side.index()].remove(player);
        }
    }

    /// Remove a player from the alive sets. Returns `true` if they were alive.
    pub fn kill(&mut self, player: &Identity) -> bool {
        let mut was_alive = false;
        for set in &mut self.alive {
            was_alive |= set.remove(player);
        }
        was_alive
    }

    /// Drop a player from the round (moved to spectators).
    pub fn remove(&mut self, player: &Identity) {
        self.kill(player);
        self.members.remove(player);
    }

    /// Players to receive a spread credit or debit on `side`: the alive
    /// players, or every member when nobody on that side is alive.
    #[must_use]
    pub fn spread_targets(&self, side: Side) -> Vec<Identity> {
        let alive = self.alive(side);
        if alive.is_empty() {
            self.members_of(side).cloned().collect()
        } else {
            alive.iter().cloned().collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    #[test]
    fn place_moves_between_sides() {
        let mut roster = RoundRoster::new([(id("a"), Side::T), (id("b"), Side::CT)]);
        assert_eq!(roster.alive_count(Side::T), 1);

        roster.place(&id("a"), Side::CT, true);
        assert_eq!(roster.alive_count(Side::T), 0);
        assert_eq!(roster.alive_count(Side::CT), 2);
        assert_eq!(roster.side_of(&id("a")), Some(Side::CT));
    }

    #[test]
    fn kill_only_counts_once() {
        let mut roster = RoundRoster::new([(id("a"), Side::T)]);
        assert!(roster.kill(&id("a")));
        assert!(!roster.kill(&id("a")));
        assert!(!roster.is_alive(&id("a")));
    }

    #[test]
    fn spread_targets_fall_back_to_members() {
        let mut roster = RoundRoster::new([(id("a"), Side::T), (id("b"), Side::T)]);
        roster.kill(&id("a"));
        assert_eq!(roster.spread_targets(Side::T), vec![id("b")]);
        roster.kill(&id("b"));
        assert_eq!(roster.spread_targets(Side::T), vec![id("a"), id("b")]);
        assert!(roster.spread_targets(Side::CT).is_empty());
    }

    #[test]
    fn winner_priority() {
        assert_eq!(decide_winner(Some(Side::CT), Some(9)), Some(Side::CT));
        assert_eq!(decide_winner(None, Some(12)), Some(Side::T));
        assert_eq!(decide_winner(None, Some(8)), Some(Side::CT));
        assert_eq!(decide_winner(None, Some(10)), None);
        assert_eq!(decide_winner(None, None), None);
    }

    #[test]
    fn bots_are_never_placed() {
        let roster = RoundRoster::new([(Identity::bot(), Side::T)]);
        assert_eq!(roster.alive_count(Side::T), 0);
    }
}

//! Per-round health pools.
//!
//! Recorded damage is capped at the victim's remaining HP, so a single
//! 400-damage AWP body shot still only counts as the 100 (or fewer) HP the
//! victim actually had. Every damage consumer downstream uses the *applied*
//! value returned here, never the raw log value.

use std::collections::BTreeMap;

use crate::round::{RoundClose, RoundHook, RoundOpen};
use crate::types::Identity;

/// Starting HP for every player each round.
pub const FULL_HEALTH: u32 = 100;

/// Remaining HP per player for the current round.
#[derive(Debug, Clone, Default)]
pub struct HealthTracker {
    hp: BTreeMap<Identity, u32>,
}

impl HealthTracker {
    /// Create an empty tracker (everyone at full health).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining HP, defaulting to [`FULL_HEALTH`] for unseen players.
    #[must_use]
    pub fn current(&self, player: &Identity) -> u32 {
        self.hp.get(player).copied().unwrap_or(FULL_HEALTH)
    }

    /// Apply a damage event and return the damage that actually landed.
    pub fn record_damage(&mut self, victim: &Identity, raw_amount: u32) -> u32 {
        let current = self.current(victim);
        let applied = current.min(raw_amount);
        self.hp.insert(victim.clone(), current - applied);
        applied
    }

    /// Mark a player dead and return the HP they still had.
    pub fn record_death(&mut self, victim: &Identity) -> u32 {
        let remaining = self.current(victim);
        self.hp.insert(victim.clone(), 0);
        remaining
    }

    /// Reset every pool to full health.
    pub fn reset(&mut self) {
        self.hp.clear();
    }
}

impl RoundHook for HealthTracker {
    fn on_round_open(&mut self, _round: &RoundOpen<'_>) {
        self.reset();
    }

    fn on_round_close(&mut self, _round: &RoundClose<'_>) {}
}
